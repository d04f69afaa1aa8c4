//! `con route-inbox` — one outer-router pass.

use std::path::Path;

use anyhow::Result;
use con_core::mailbox::router::route_outer_inbox;
use con_core::{Config, Layout};
use tracing::info;

pub fn route_inbox(config: &Path, layout: &Layout) -> Result<()> {
    let cfg = Config::from_file(config)?;
    let dest = layout.agent_inbox(&cfg.system.router);
    let moved = route_outer_inbox(&layout.outer_inbox(), &dest)?;
    info!(moved, router = %cfg.system.router, "outer inbox routed");
    Ok(())
}
