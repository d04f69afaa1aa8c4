//! Subprocess reasoner.
//!
//! Runs an external CLI in the agent's workspace, feeding the prompt on
//! stdin and capturing stdout. The child is launched in a new process group
//! so that deadline cancellation can SIGKILL the whole subtree — a plain
//! kill of the immediate child would leak its descendants.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;
use wait_timeout::ChildExt;

use super::ReasonerError;
use crate::exec::{kill_group, Deadline};

/// Stdout capture bound; bytes beyond are discarded.
pub const MAX_OUTPUT_BYTES: usize = 1 << 20;

/// An external CLI reasoner.
#[derive(Debug)]
pub struct ExecReasoner {
    /// Executable to run.
    pub command: String,
    /// Declared arguments.
    pub args: Vec<String>,
    /// Working directory (the agent's workspace).
    pub workspace: PathBuf,
}

impl ExecReasoner {
    /// Run the CLI once: prompt on stdin, response from stdout.
    ///
    /// External reasoners maintain their own session state, so no session
    /// key is forwarded.
    ///
    /// # Errors
    ///
    /// [`ReasonerError::Spawn`] when the command cannot start,
    /// [`ReasonerError::Cancelled`] on deadline expiry,
    /// [`ReasonerError::RunnerFailed`] with captured stderr on non-zero exit.
    pub fn invoke(&self, deadline: Deadline, prompt: &str) -> Result<String, ReasonerError> {
        if deadline.expired() {
            return Err(ReasonerError::Cancelled {
                command: self.command.clone(),
            });
        }

        debug!(command = %self.command, workspace = %self.workspace.display(), "spawning exec runner");

        let mut child = {
            use std::os::unix::process::CommandExt as _;
            Command::new(&self.command)
                .args(&self.args)
                .current_dir(&self.workspace)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .process_group(0)
                .spawn()
                .map_err(|source| ReasonerError::Spawn {
                    command: self.command.clone(),
                    source,
                })?
        };

        // Feed the prompt from a separate thread so a child that emits
        // output before draining stdin cannot deadlock against us.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.as_bytes().to_vec();
            std::thread::spawn(move || {
                let _ = stdin.write_all(&prompt);
            });
        }

        if let Some(limit) = deadline.remaining() {
            match child.wait_timeout(limit) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    kill_group(&child);
                    let _ = child.wait();
                    return Err(ReasonerError::Cancelled {
                        command: self.command.clone(),
                    });
                }
                Err(source) => {
                    return Err(ReasonerError::Io {
                        command: self.command.clone(),
                        source,
                    });
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|source| ReasonerError::Io {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ReasonerError::RunnerFailed {
                command: self.command.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut stdout = output.stdout;
        stdout.truncate(MAX_OUTPUT_BYTES);
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}
