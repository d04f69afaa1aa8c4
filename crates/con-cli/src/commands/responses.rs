//! `con responses` — the latest response per agent.

use anyhow::{Context, Result};
use con_core::Layout;

use super::format::{format_response, latest_response};

/// Bytes of each response shown before truncation.
const PREVIEW_BYTES: usize = 500;

pub fn responses(layout: &Layout) -> Result<()> {
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
        let outbox = layout.agent_outbox(&name);
        let Ok(entries) = std::fs::read_dir(&outbox) else {
            continue;
        };
        let mut files: Vec<String> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();

        let Some(latest) = latest_response(&files) else {
            continue;
        };
        let Ok(content) = std::fs::read_to_string(outbox.join(latest)) else {
            continue;
        };

        println!("{}", format_response(&name, latest, &content, PREVIEW_BYTES));
        println!();
    }
    Ok(())
}
