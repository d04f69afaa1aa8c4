//! `con logs` — tail of today's audit log.

use anyhow::Result;
use con_core::Layout;

use super::format::tail_lines;

const TAIL: usize = 20;

pub fn logs(layout: &Layout) -> Result<()> {
    let today = chrono::Local::now().format("%Y-%m-%d");
    let daily = layout.audit_dir().join(format!("{today}.log"));

    // Fall back to the contracts log when no agent ran today.
    let data = std::fs::read_to_string(&daily)
        .or_else(|_| std::fs::read_to_string(layout.contracts_log()));

    match data {
        Ok(data) => {
            for line in tail_lines(&data, TAIL) {
                println!("{line}");
            }
        }
        Err(_) => println!("No audit logs found for today"),
    }
    Ok(())
}
