//! Agent mailboxes: task files and the deterministic inbox picker.
//!
//! A task is a file whose name ends in `.task`. Within one inbox, the
//! lexicographically smallest name is processed first; callers that want
//! chronological order must use fixed-width timestamp prefixes.

pub mod router;

use std::io;
use std::os::unix::fs::MetadataExt as _;
use std::path::{Path, PathBuf};

use crate::trust::{TrustClassifier, TrustLevel};

/// Filename suffix identifying a task.
pub const TASK_SUFFIX: &str = ".task";

/// Content above this size is replaced by an attachment reference.
pub const MAX_TASK_BYTES: u64 = 32 * 1024;

/// A picked task: where it came from, what it says, who wrote it.
#[derive(Debug, Clone)]
pub struct Task {
    /// Absolute path of the task file, still in the inbox.
    pub path: PathBuf,
    /// File content, or an attachment reference when oversized.
    pub content: String,
    /// Provenance classification from the file's owning uid.
    pub trust: TrustLevel,
}

/// Mailbox errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// The inbox holds no `.task` files. The drain loop terminates on this.
    #[error("no tasks in inbox")]
    Empty,

    /// The inbox directory could not be enumerated.
    #[error("reading inbox {path}: {source}")]
    ReadDir {
        /// Inbox path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A task file could not be read or statted.
    #[error("reading task {path}: {source}")]
    ReadTask {
        /// Task path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Pick the lexicographically first `.task` file from `inbox`.
///
/// Directories and files with other suffixes are ignored. Files larger than
/// [`MAX_TASK_BYTES`] are not read into memory; their content becomes
/// `[Attachment: file too large (<N> bytes). See: <path>]`. Ownership is
/// classified through `classifier` from file metadata at pick time.
///
/// # Errors
///
/// [`MailboxError::Empty`] when no task is present; I/O variants otherwise.
pub fn pick_oldest_task(
    inbox: &Path,
    classifier: &TrustClassifier,
) -> Result<Task, MailboxError> {
    let entries = std::fs::read_dir(inbox).map_err(|source| MailboxError::ReadDir {
        path: inbox.to_path_buf(),
        source,
    })?;

    let mut names: Vec<String> = Vec::new();
    for entry in entries.flatten() {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(true);
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_dir && name.ends_with(TASK_SUFFIX) {
            names.push(name);
        }
    }

    if names.is_empty() {
        return Err(MailboxError::Empty);
    }
    names.sort();

    let path = inbox.join(&names[0]);
    let meta = std::fs::metadata(&path).map_err(|source| MailboxError::ReadTask {
        path: path.clone(),
        source,
    })?;

    let content = if meta.len() > MAX_TASK_BYTES {
        // Oversized: hand the agent a reference, not the bytes.
        format!(
            "[Attachment: file too large ({} bytes). See: {}]",
            meta.len(),
            path.display()
        )
    } else {
        let data = std::fs::read(&path).map_err(|source| MailboxError::ReadTask {
            path: path.clone(),
            source,
        })?;
        String::from_utf8_lossy(&data).into_owned()
    };

    let trust = classifier.classify(meta.uid());

    Ok(Task {
        path,
        content,
        trust,
    })
}
