//! `con task <message>` — drop a task into the outer inbox.
//!
//! File ownership decides the trust framing downstream: run as root or as a
//! member of the trusted group for verified handling.

use anyhow::{Context, Result};
use con_core::Layout;

pub fn drop_task(layout: &Layout, message: &str) -> Result<()> {
    let id = chrono::Utc::now().timestamp();
    let path = layout.outer_inbox().join(format!("{id}.task"));

    std::fs::write(&path, message)
        .with_context(|| format!("writing task {}", path.display()))?;
    println!("Task {id}.task dropped into inbox");
    Ok(())
}
