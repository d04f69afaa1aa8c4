//! `con healthcheck` — one contract evaluation pass.

use std::path::PathBuf;

use anyhow::Result;
use con_core::healthcheck::run_healthcheck;
use con_core::{Layout, ShellExecutor};

pub fn healthcheck(layout: &Layout) -> Result<()> {
    let contracts_dir = match std::env::var("CON_CONTRACTS_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => layout.contracts_dir(),
    };

    let mut stdout = std::io::stdout();
    let result = run_healthcheck(layout, &contracts_dir, &ShellExecutor, &mut stdout)?;

    if result.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
