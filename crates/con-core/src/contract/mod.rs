//! Declarative contracts.
//!
//! A contract is a YAML document: detective contracts carry checks the
//! healthcheck evaluates; preventive contracts are registry-only, kept for
//! auditability and skipped during evaluation. Failed detective checks map
//! to remedial actions and optional escalation back into the fleet.

pub mod actions;
pub mod evaluator;
pub mod loader;

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::exec::ExecError;

/// Contract type executing checks.
pub const DETECTIVE: &str = "detective";

/// Registry-only contract type.
pub const PREVENTIVE: &str = "preventive";

/// Actions a failed check may declare.
pub const VALID_ACTIONS: [&str; 5] = [
    "halt_agents",
    "halt_workers",
    "kill_session",
    "quarantine",
    "alert",
];

/// One contract document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Contract {
    /// Unique identifier.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// `detective` or `preventive`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Advisory evaluation frequency.
    pub frequency: String,
    /// `system` or `agent:<name>`.
    pub scope: String,
    /// Ordered checks (detective only).
    pub checks: Vec<Check>,
    /// Preventive-only: enforcing mechanism.
    pub mechanism: String,
    /// Preventive-only: covered agent.
    pub agent: String,
    /// Preventive-only: enforcement description.
    pub enforcement: String,
}

impl Contract {
    /// Whether this contract is registry-only.
    #[must_use]
    pub fn is_preventive(&self) -> bool {
        self.kind == PREVENTIVE
    }
}

/// One check within a detective contract.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Check {
    /// Check name, unique within the contract.
    pub name: String,
    /// Inline command form; exactly one of `command`/`script` must be set.
    pub command: Option<CmdCheck>,
    /// Script form.
    pub script: Option<ScriptCheck>,
    /// What to do when the check fails.
    pub on_fail: FailAction,
}

/// Inline command check: a producer expression and a test over `$RESULT`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CmdCheck {
    /// Shell expression whose output becomes `$RESULT`.
    pub run: String,
    /// Test expression over `$RESULT`; its exit status is the check result.
    pub test: String,
}

/// External script check.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptCheck {
    /// Script path, resolved against the contracts directory when relative.
    pub path: String,
    /// Optional timeout (humantime syntax, e.g. `30s`).
    pub timeout: String,
}

/// Declared consequence of a failed check.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FailAction {
    /// One of [`VALID_ACTIONS`], or empty for no direct effect.
    pub action: String,
    /// Agent to receive an escalation task, or empty.
    pub escalate: String,
    /// Free-text message delivered with the escalation.
    pub message: String,
}

/// Extract the agent name from an `agent:<name>` scope.
#[must_use]
pub fn agent_from_scope(scope: &str) -> Option<&str> {
    scope.strip_prefix("agent:").filter(|name| !name.is_empty())
}

/// Outcome of one executed check.
#[derive(Debug)]
pub struct CheckResult {
    /// Owning contract.
    pub contract_id: String,
    /// Check name.
    pub check_name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Trimmed captured stdout.
    pub output: String,
    /// Execution error, when the command could not run to completion.
    pub error: Option<ExecError>,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// Aggregate outcome of one healthcheck run.
#[derive(Debug, Default)]
pub struct RunResult {
    /// Run start; `None` substitutes "now" when logging.
    pub timestamp: Option<DateTime<Local>>,
    /// Per-check results, in evaluation order.
    pub results: Vec<CheckResult>,
    /// Checks that passed.
    pub passed: usize,
    /// Checks that failed.
    pub failed: usize,
    /// Preventive contracts skipped.
    pub skipped: usize,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parsing() {
        assert_eq!(agent_from_scope("agent:sysadmin"), Some("sysadmin"));
        assert_eq!(agent_from_scope("system"), None);
        assert_eq!(agent_from_scope("agent:"), None);
    }

    #[test]
    fn preventive_detection() {
        let contract = Contract {
            kind: PREVENTIVE.to_string(),
            ..Default::default()
        };
        assert!(contract.is_preventive());
        assert!(!Contract::default().is_preventive());
    }
}
