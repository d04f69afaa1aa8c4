//! Shell command execution with deadline propagation.
//!
//! The contract evaluator and action dispatcher run commands through the
//! [`CommandExecutor`] seam so tests can substitute a recording executor.
//! The production [`ShellExecutor`] runs `sh -c` in a fresh process group
//! and, when the ambient [`Deadline`] expires, kills the whole group so
//! check scripts cannot leak children past their budget.

use std::io;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

/// A point in time past which work must not continue.
///
/// `Deadline::default()` is unbounded. Copies are cheap; functions take it
/// by value and derive tightened child deadlines with [`Deadline::tightened`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self(None)
    }

    /// A deadline `limit` from now.
    #[must_use]
    pub fn within(limit: Duration) -> Self {
        Self(Some(Instant::now() + limit))
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, or `None` when unbounded. Zero when already expired.
    #[must_use]
    pub fn remaining(self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The earlier of this deadline and `limit` from now.
    #[must_use]
    pub fn tightened(self, limit: Duration) -> Self {
        let candidate = Instant::now() + limit;
        Self(Some(self.0.map_or(candidate, |at| at.min(candidate))))
    }
}

/// Captured result of a completed command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Trimmed standard output.
    pub stdout: String,
    /// Exit code; `-1` when terminated by signal.
    pub exit_code: i32,
}

/// Errors from command execution.
///
/// A non-zero exit status is *not* an error; it is reported through
/// [`CommandOutput::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The command could not be spawned.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// The shell command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Waiting on the child failed.
    #[error("waiting on `{command}`: {source}")]
    Wait {
        /// The shell command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The ambient deadline expired; the process group was killed.
    #[error("`{command}` cancelled: deadline expired")]
    DeadlineExpired {
        /// The shell command line.
        command: String,
    },
}

impl ExecError {
    /// Whether this error indicates deadline cancellation.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::DeadlineExpired { .. })
    }
}

/// Shell execution seam.
pub trait CommandExecutor {
    /// Run `command` under `sh -c`, honouring `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] on spawn failure, wait failure, or deadline
    /// expiry. Non-zero exit is a successful execution.
    fn execute(&self, deadline: Deadline, command: &str) -> Result<CommandOutput, ExecError>;
}

/// The production executor: `sh -c` in its own process group.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl CommandExecutor for ShellExecutor {
    fn execute(&self, deadline: Deadline, command: &str) -> Result<CommandOutput, ExecError> {
        if deadline.expired() {
            return Err(ExecError::DeadlineExpired {
                command: command.to_string(),
            });
        }

        let mut child = {
            use std::os::unix::process::CommandExt as _;
            Command::new("sh")
                .arg("-c")
                .arg(command)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .process_group(0)
                .spawn()
                .map_err(|source| ExecError::Spawn {
                    command: command.to_string(),
                    source,
                })?
        };

        if let Some(limit) = deadline.remaining() {
            match child.wait_timeout(limit) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    kill_group(&child);
                    let _ = child.wait();
                    return Err(ExecError::DeadlineExpired {
                        command: command.to_string(),
                    });
                }
                Err(source) => {
                    return Err(ExecError::Wait {
                        command: command.to_string(),
                        source,
                    });
                }
            }
        }

        let output = child.wait_with_output().map_err(|source| ExecError::Wait {
            command: command.to_string(),
            source,
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// SIGKILL the child's process group. Descendants of a check script must not
/// outlive the deadline.
pub(crate) fn kill_group(child: &std::process::Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    let _ = killpg(pgid, Signal::SIGKILL);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = ShellExecutor
            .execute(Deadline::unbounded(), "echo hello")
            .unwrap();
        assert_eq!(out.stdout, "hello");
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn nonzero_exit_is_not_an_error() {
        let out = ShellExecutor
            .execute(Deadline::unbounded(), "exit 3")
            .unwrap();
        assert_eq!(out.exit_code, 3);
    }

    #[test]
    fn deadline_expiry_kills_and_reports_cancellation() {
        let err = ShellExecutor
            .execute(Deadline::within(Duration::from_millis(50)), "sleep 5")
            .unwrap_err();
        assert!(err.is_cancellation(), "got: {err}");
    }

    #[test]
    fn already_expired_deadline_short_circuits() {
        let err = ShellExecutor
            .execute(Deadline::within(Duration::ZERO), "echo never")
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn tightened_takes_the_earlier_bound() {
        let outer = Deadline::within(Duration::from_secs(60));
        let tight = outer.tightened(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(tight.expired());
        assert!(!outer.expired());
    }

    #[test]
    fn unbounded_never_expires() {
        let d = Deadline::unbounded();
        assert!(!d.expired());
        assert!(d.remaining().is_none());
    }
}
