//! Outer-inbox routing.
//!
//! External writers drop tasks into the public outer inbox; a path watcher
//! fires this one-shot pass, which hands every `.task` file to the router
//! agent's inbox. The pass never loses a task: an entry that cannot be moved
//! stays where it is and the batch continues.

use std::path::Path;

use tracing::{debug, warn};

use super::{MailboxError, TASK_SUFFIX};

/// Move every `.task` file from `outer` into `dest`.
///
/// Rename first; on failure (for example across devices) fall back to
/// read-then-write-then-unlink. If any step of the fallback fails the entry
/// is skipped, not the batch. Directories and non-`.task` files are
/// untouched. Returns the number of tasks moved.
///
/// # Errors
///
/// Only enumeration of `outer` can fail the call.
pub fn route_outer_inbox(outer: &Path, dest: &Path) -> Result<usize, MailboxError> {
    let entries = std::fs::read_dir(outer).map_err(|source| MailboxError::ReadDir {
        path: outer.to_path_buf(),
        source,
    })?;

    let mut moved = 0;
    for entry in entries.flatten() {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(true);
        let name = entry.file_name();
        if is_dir || !name.to_string_lossy().ends_with(TASK_SUFFIX) {
            continue;
        }

        let src = outer.join(&name);
        let dst = dest.join(&name);
        if std::fs::rename(&src, &dst).is_ok() {
            moved += 1;
            continue;
        }

        // Cross-device fallback: copy the bytes, then drop the original.
        let data = match std::fs::read(&src) {
            Ok(data) => data,
            Err(err) => {
                warn!(src = %src.display(), %err, "skipping unreadable task");
                continue;
            }
        };
        if let Err(err) = std::fs::write(&dst, data) {
            warn!(dst = %dst.display(), %err, "skipping unwritable destination");
            continue;
        }
        if let Err(err) = std::fs::remove_file(&src) {
            warn!(src = %src.display(), %err, "copied but could not unlink source");
            continue;
        }
        moved += 1;
    }

    debug!(moved, outer = %outer.display(), "outer inbox routed");
    Ok(moved)
}
