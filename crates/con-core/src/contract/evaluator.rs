//! Detective check evaluation.
//!
//! Checks run sequentially through the [`CommandExecutor`] seam. Inline
//! checks become one shell invocation `RESULT=$(<run>); <test>`; script
//! checks run `sh <path>` with the path resolved against the contracts
//! directory and an optional per-check timeout tightening the ambient
//! deadline. A non-zero exit fails the check; an execution error fails it
//! with the error attached.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use chrono::{Local, SecondsFormat};
use tracing::debug;

use super::{Check, CheckResult, Contract, RunResult};
use crate::exec::{CommandExecutor, Deadline};

/// Run every detective check of `contracts`; preventive contracts count as
/// skipped and execute nothing.
#[must_use]
pub fn evaluate(
    deadline: Deadline,
    contracts: &[Contract],
    contracts_dir: &Path,
    executor: &dyn CommandExecutor,
) -> RunResult {
    let mut result = RunResult {
        timestamp: Some(Local::now()),
        ..Default::default()
    };

    for contract in contracts {
        if contract.is_preventive() {
            result.skipped += 1;
            continue;
        }

        for check in &contract.checks {
            let outcome = run_check(deadline, &contract.id, check, contracts_dir, executor);
            if outcome.passed {
                result.passed += 1;
            } else {
                result.failed += 1;
            }
            result.results.push(outcome);
        }
    }

    result
}

fn run_check(
    deadline: Deadline,
    contract_id: &str,
    check: &Check,
    contracts_dir: &Path,
    executor: &dyn CommandExecutor,
) -> CheckResult {
    let start = Instant::now();

    let (command, check_deadline) = if let Some(cmd) = &check.command {
        // Inline form runs under the ambient deadline only.
        (format!("RESULT=$({}); {}", cmd.run, cmd.test), deadline)
    } else if let Some(script) = &check.script {
        let path = Path::new(&script.path);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            contracts_dir.join(path)
        };
        let mut check_deadline = deadline;
        if !script.timeout.is_empty() {
            if let Ok(limit) = humantime::parse_duration(&script.timeout) {
                check_deadline = deadline.tightened(limit);
            }
        }
        (format!("sh {}", resolved.display()), check_deadline)
    } else {
        // Unreachable for validated contracts; fail loudly, not silently.
        (String::from("false"), deadline)
    };

    debug!(contract_id, check = %check.name, %command, "running check");

    match executor.execute(check_deadline, &command) {
        Ok(output) => CheckResult {
            contract_id: contract_id.to_string(),
            check_name: check.name.clone(),
            passed: output.exit_code == 0,
            output: output.stdout,
            error: None,
            duration: start.elapsed(),
        },
        Err(err) => CheckResult {
            contract_id: contract_id.to_string(),
            check_name: check.name.clone(),
            passed: false,
            output: String::new(),
            error: Some(err),
            duration: start.elapsed(),
        },
    }
}

/// Write the run to `w`, one line per check plus a summary line.
///
/// Format: `<ts> [healthcheck] <contract-id> <PASS|FAIL> <check-name> (<N>ms)`
/// then `<ts> [healthcheck] summary: <P> passed, <F> failed, <S> skipped`.
///
/// # Errors
///
/// I/O errors from the writer.
pub fn write_log(result: &RunResult, w: &mut dyn Write) -> std::io::Result<()> {
    let ts = result
        .timestamp
        .unwrap_or_else(Local::now)
        .to_rfc3339_opts(SecondsFormat::Secs, false);

    for check in &result.results {
        let status = if check.passed { "PASS" } else { "FAIL" };
        writeln!(
            w,
            "{ts} [healthcheck] {} {status} {} ({}ms)",
            check.contract_id,
            check.check_name,
            check.duration.as_millis()
        )?;
    }

    writeln!(
        w,
        "{ts} [healthcheck] summary: {} passed, {} failed, {} skipped",
        result.passed, result.failed, result.skipped
    )
}
