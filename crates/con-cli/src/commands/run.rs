//! `con run <agent>` — the per-agent drain loop.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use con_core::{cycle, Config, Layout, TrustClassifier};
use tracing::info;

/// How often a continuous agent re-checks its inbox.
const CONTINUOUS_INTERVAL: Duration = Duration::from_secs(5);

pub fn run(config: &Path, layout: &Layout, name: &str, continuous: bool) -> Result<()> {
    let cfg = Config::from_file(config)?;
    let agent = cfg
        .resolved_agent(name)
        .with_context(|| format!("agent {name:?} not found in config"))?;
    let classifier = TrustClassifier::new(&cfg.system.trusted_group);

    loop {
        let processed = cycle::drain(layout, &agent, &classifier)?;
        info!(agent = name, processed, "inbox drained");
        if !continuous {
            return Ok(());
        }
        std::thread::sleep(CONTINUOUS_INTERVAL);
    }
}
