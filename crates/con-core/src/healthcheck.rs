//! The healthcheck driver.
//!
//! One timer-fired pass: load contracts, evaluate every detective check
//! under a 30-second deadline, log to the contracts audit file and the
//! caller's writer, dispatch the failure action of every failed check, and
//! — when anything failed — deliver a single aggregate escalation to the
//! sysadmin agent. Recoverable failures inside the pass (one check, one
//! action, the escalation) are reported and never short-circuit it.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::contract::loader::{self, ContractError};
use crate::contract::{actions, evaluator, RunResult};
use crate::exec::{CommandExecutor, Deadline};
use crate::layout::Layout;

/// Budget for one full healthcheck pass.
pub const HEALTHCHECK_DEADLINE: Duration = Duration::from_secs(30);

/// Agent receiving the aggregate escalation.
pub const ESCALATION_AGENT: &str = "sysadmin";

/// Run one healthcheck pass. Returns the aggregate result; the caller maps
/// `failed > 0` to a non-zero exit.
///
/// # Errors
///
/// [`ContractError`] when the contract set cannot be loaded. Everything
/// past loading is reported, not propagated.
pub fn run_healthcheck(
    layout: &Layout,
    contracts_dir: &Path,
    executor: &dyn CommandExecutor,
    out: &mut dyn Write,
) -> Result<RunResult, ContractError> {
    let contracts = loader::load_dir(contracts_dir)?;
    if contracts.is_empty() {
        let _ = writeln!(out, "healthcheck: no contracts found");
        return Ok(RunResult {
            timestamp: Some(chrono::Local::now()),
            ..Default::default()
        });
    }

    let deadline = Deadline::within(HEALTHCHECK_DEADLINE);
    let result = evaluator::evaluate(deadline, &contracts, contracts_dir, executor);

    append_contract_log(layout, &result);
    let _ = evaluator::write_log(&result, out);

    for failed in result.results.iter().filter(|r| !r.passed) {
        // Locate the originating check to read its declared action.
        for contract in &contracts {
            for check in &contract.checks {
                if contract.id != failed.contract_id || check.name != failed.check_name {
                    continue;
                }
                let dispatch =
                    actions::dispatch_action(deadline, &check.on_fail, &contract.scope, executor, layout);
                if let Err(err) = &dispatch.result {
                    error!(contract = %contract.id, check = %check.name, %err, "action dispatch failed");
                }
                for command in &dispatch.commands {
                    let _ = writeln!(out, "  ACTION: {command}");
                }
            }
        }
    }

    if result.failed > 0 {
        let failures: Vec<String> = result
            .results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| format!("{}/{}", r.contract_id, r.check_name))
            .collect();
        let message = format!(
            "Healthcheck: {} contract check(s) failed: {}. Review audit log and fix.",
            result.failed,
            failures.join(", ")
        );
        match actions::escalate(layout, ESCALATION_AGENT, &message) {
            Ok(path) => info!(task = %path.display(), "aggregate escalation delivered"),
            Err(err) => error!(%err, "aggregate escalation failed"),
        }
    }

    Ok(result)
}

/// Append the run to the contracts audit log, creating it as needed.
fn append_contract_log(layout: &Layout, result: &RunResult) {
    let path = layout.contracts_log();
    let append = || -> std::io::Result<()> {
        std::fs::create_dir_all(layout.audit_dir())?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        evaluator::write_log(result, &mut file)
    };
    if let Err(err) = append() {
        warn!(path = %path.display(), %err, "contract log not written");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ShellExecutor;

    const PASSING: &str = r#"id: CON-X
description: threshold check
type: detective
scope: system
checks:
  - name: threshold
    command:
      run: "echo 50"
      test: "[ $RESULT -ge 15 ]"
    on_fail:
      action: alert
      message: "threshold breached"
"#;

    const FAILING: &str = r#"id: CON-Y
description: always failing
type: detective
scope: system
checks:
  - name: doomed
    command:
      run: "echo 5"
      test: "[ $RESULT -ge 15 ]"
    on_fail:
      action: alert
      escalate: sysadmin
      message: "disk low"
"#;

    const PREVENTIVE: &str = r#"id: CON-117
description: registry only
type: preventive
mechanism: nftables
"#;

    fn fixture(contracts: &[(&str, &str)]) -> (tempfile::TempDir, Layout) {
        let root = tempfile::tempdir().unwrap();
        let layout = Layout::under(root.path());
        std::fs::create_dir_all(layout.contracts_dir()).unwrap();
        std::fs::create_dir_all(layout.agent_inbox(ESCALATION_AGENT)).unwrap();
        for (name, content) in contracts {
            std::fs::write(layout.contracts_dir().join(name), content).unwrap();
        }
        (root, layout)
    }

    #[test]
    fn passing_run_logs_and_does_not_escalate() {
        let (_root, layout) = fixture(&[("con-x.yaml", PASSING), ("con-117.yaml", PREVENTIVE)]);

        let mut out = Vec::new();
        let result =
            run_healthcheck(&layout, &layout.contracts_dir(), &ShellExecutor, &mut out).unwrap();

        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.skipped, 1);

        let log = std::fs::read_to_string(layout.contracts_log()).unwrap();
        assert!(log.contains("CON-X PASS threshold"));
        assert!(log.contains("summary: 1 passed, 0 failed, 1 skipped"));

        let inbox: Vec<_> = std::fs::read_dir(layout.agent_inbox(ESCALATION_AGENT))
            .unwrap()
            .collect();
        assert!(inbox.is_empty(), "no escalation expected");
    }

    #[test]
    fn failing_run_dispatches_and_escalates_once() {
        let (_root, layout) = fixture(&[("con-x.yaml", PASSING), ("con-y.yaml", FAILING)]);

        let mut out = Vec::new();
        let result =
            run_healthcheck(&layout, &layout.contracts_dir(), &ShellExecutor, &mut out).unwrap();

        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 1);

        let stdout = String::from_utf8(out).unwrap();
        assert!(stdout.contains("CON-Y FAIL doomed"));

        let entries: Vec<_> = std::fs::read_dir(layout.agent_inbox(ESCALATION_AGENT))
            .unwrap()
            .flatten()
            .collect();
        assert!(!entries.is_empty(), "escalation task expected");
        for entry in &entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(name.ends_with("-healthcheck.task"), "got {name}");
        }
        // Both the per-check escalation and the aggregate land in the inbox
        // (in one task file or two, depending on the second boundary).
        let content: String = entries
            .iter()
            .map(|e| std::fs::read_to_string(e.path()).unwrap())
            .collect();
        assert!(content.contains("disk low"));
        assert!(content.contains("CON-Y/doomed"));
    }

    #[test]
    fn empty_contract_set_reports_and_succeeds() {
        let (_root, layout) = fixture(&[]);

        let mut out = Vec::new();
        let result =
            run_healthcheck(&layout, &layout.contracts_dir(), &ShellExecutor, &mut out).unwrap();

        assert_eq!(result.failed, 0);
        assert!(String::from_utf8(out).unwrap().contains("no contracts found"));
    }

    #[test]
    fn unreadable_contracts_dir_aborts() {
        let root = tempfile::tempdir().unwrap();
        let layout = Layout::under(root.path());
        let mut out = Vec::new();
        let err = run_healthcheck(
            &layout,
            Path::new("/nonexistent/contracts"),
            &ShellExecutor,
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::ReadDir { .. }));
    }

    #[test]
    fn malformed_contract_aborts_the_load() {
        let (_root, layout) = fixture(&[("bad.yaml", "id: CON-BAD\ntype: detective\n")]);
        let mut out = Vec::new();
        let err = run_healthcheck(&layout, &layout.contracts_dir(), &ShellExecutor, &mut out)
            .unwrap_err();
        assert!(matches!(err, ContractError::NoChecks { .. }));
    }
}
