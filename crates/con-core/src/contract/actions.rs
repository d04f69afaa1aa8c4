//! Failure action dispatch and escalation.
//!
//! A failed detective check maps its declared action to concrete OS effects
//! issued through the [`CommandExecutor`] seam, then delivers an optional
//! escalation task to a named agent's inbox. Escalation is attempted after
//! the primary effect whether or not that effect succeeded, and a failed
//! escalation never masks a successful primary effect.

use std::io;
use std::path::PathBuf;

use chrono::Local;
use tracing::warn;

use super::{agent_from_scope, FailAction};
use crate::exec::{CommandExecutor, Deadline, ExecError};
use crate::layout::{agent_unit, agent_user, Layout};

/// Process name matched by `kill_session` (the reasoner runs inside the
/// embedding binary).
pub const REASONER_PROCESS: &str = "con";

/// Action dispatch errors. Reported per action; never aborts the pass.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The action requires an `agent:<name>` scope.
    #[error("{action}: cannot determine agent from scope {scope:?}")]
    MissingAgentScope {
        /// The declared action.
        action: String,
        /// The contract scope.
        scope: String,
    },

    /// The action is not one of the known kinds.
    #[error("unknown action {action:?}")]
    Unknown {
        /// The declared action.
        action: String,
    },

    /// An issued command failed to execute.
    #[error("{action}: {source}")]
    Command {
        /// The declared action.
        action: String,
        /// Underlying execution error.
        #[source]
        source: ExecError,
    },

    /// The escalation task could not be written.
    #[error("escalation to {target}: {source}")]
    Escalation {
        /// Target agent.
        target: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// What a dispatch did: the commands it issued (in order) and its outcome.
#[derive(Debug)]
pub struct Dispatch {
    /// Shell commands issued, whether or not they succeeded.
    pub commands: Vec<String>,
    /// First error encountered, if any.
    pub result: Result<(), ActionError>,
}

/// Execute the failure action for a failed check.
///
/// `halt_agents` and `halt_workers` stop every agent service in one
/// wildcard command. `kill_session` and `quarantine` derive their target
/// from an `agent:<name>` scope; quarantine stops the service *and* revokes
/// the inbox ACLs, attempting both even if the first fails. `alert` has no
/// OS effect.
pub fn dispatch_action(
    deadline: Deadline,
    action: &FailAction,
    scope: &str,
    executor: &dyn CommandExecutor,
    layout: &Layout,
) -> Dispatch {
    let mut commands = Vec::new();

    let primary = match action.action.as_str() {
        "halt_agents" | "halt_workers" => {
            // Tier-scoped halting is deferred; both stop everything.
            let cmd = "systemctl stop 'con-*.service'".to_string();
            commands.push(cmd.clone());
            run(executor, deadline, &action.action, &cmd)
        }

        "kill_session" => match agent_from_scope(scope) {
            None => Err(ActionError::MissingAgentScope {
                action: action.action.clone(),
                scope: scope.to_string(),
            }),
            Some(agent) => {
                let cmd = format!("pkill -u {} {REASONER_PROCESS}", agent_user(agent));
                commands.push(cmd.clone());
                run(executor, deadline, &action.action, &cmd)
            }
        },

        "quarantine" => match agent_from_scope(scope) {
            None => Err(ActionError::MissingAgentScope {
                action: action.action.clone(),
                scope: scope.to_string(),
            }),
            Some(agent) => {
                let stop = format!("systemctl stop {}.service", agent_unit(agent));
                let acl = format!("setfacl -b {}/", layout.agent_inbox(agent).display());
                commands.push(stop.clone());
                commands.push(acl.clone());
                let stopped = run(executor, deadline, &action.action, &stop);
                let revoked = run(executor, deadline, &action.action, &acl);
                stopped.and(revoked)
            }
        },

        "alert" => Ok(()),

        other => Err(ActionError::Unknown {
            action: other.to_string(),
        }),
    };

    let result = if action.escalate.is_empty() {
        primary
    } else {
        match (primary, escalate(layout, &action.escalate, &action.message)) {
            (Err(primary_err), escalated) => {
                if let Err(escalation_err) = escalated {
                    warn!(%escalation_err, "escalation failed after failed action");
                }
                Err(primary_err)
            }
            (Ok(()), Err(escalation_err)) => Err(escalation_err),
            (Ok(()), Ok(_)) => Ok(()),
        }
    };

    Dispatch { commands, result }
}

fn run(
    executor: &dyn CommandExecutor,
    deadline: Deadline,
    action: &str,
    command: &str,
) -> Result<(), ActionError> {
    executor
        .execute(deadline, command)
        .map(|_| ())
        .map_err(|source| ActionError::Command {
            action: action.to_string(),
            source,
        })
}

/// Deliver `message` as a `<YYYYMMDD-HHMMSS>-healthcheck.task` in `agent`'s
/// inbox. Appends when the stamped name already exists so that two
/// escalations within one second both remain observable.
///
/// # Errors
///
/// [`ActionError::Escalation`] when the inbox write fails.
pub fn escalate(layout: &Layout, agent: &str, message: &str) -> Result<PathBuf, ActionError> {
    use std::io::Write as _;

    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let path = layout
        .agent_inbox(agent)
        .join(format!("{stamp}-healthcheck.task"));

    let deliver = || -> io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(message.as_bytes())
    };

    deliver().map_err(|source| ActionError::Escalation {
        target: agent.to_string(),
        source,
    })?;
    Ok(path)
}
