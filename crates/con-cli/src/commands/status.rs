//! `con status` — per-agent unit activity and inbox depth.

use std::process::Command;

use anyhow::{Context, Result};
use con_core::layout::agent_unit;
use con_core::Layout;

use super::format::{count_pending, format_status_line};

pub fn status(layout: &Layout) -> Result<()> {
    let agents_root = layout.agents_root();
    let entries = std::fs::read_dir(&agents_root)
        .with_context(|| format!("cannot read agents dir {}", agents_root.display()))?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    for name in names {
        let pending = count_pending(&layout.agent_inbox(&name));
        let state = if unit_active(&name) { "active" } else { "inactive" };
        print!("{}", format_status_line(&name, state, pending));
    }
    Ok(())
}

/// Whether any of the agent's units reports active.
fn unit_active(name: &str) -> bool {
    for suffix in [".path", ".service", ".timer"] {
        let unit = format!("{}{suffix}", agent_unit(name));
        let active = Command::new("systemctl")
            .args(["is-active", "--quiet", &unit])
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if active {
            return true;
        }
    }
    false
}
