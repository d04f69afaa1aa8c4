//! Contract loading and validation.

use std::io;
use std::path::{Path, PathBuf};

use super::{Contract, DETECTIVE, PREVENTIVE, VALID_ACTIONS};

/// Contract loading errors. Any of these aborts a healthcheck load.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// The contracts directory could not be enumerated.
    #[error("reading contracts dir {path}: {source}")]
    ReadDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A contract file could not be read.
    #[error("reading {path}: {source}")]
    ReadFile {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A contract file is not valid YAML for this schema.
    #[error("parsing {file}: {source}")]
    Parse {
        /// Offending file name.
        file: String,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A contract has no id.
    #[error("validating {file}: contract missing id")]
    MissingId {
        /// Offending file name.
        file: String,
    },

    /// A contract declares an unknown type.
    #[error("validating {file}: contract {id}: type must be {DETECTIVE:?} or {PREVENTIVE:?}, got {kind:?}")]
    InvalidType {
        /// Offending file name.
        file: String,
        /// Contract id.
        id: String,
        /// The declared type.
        kind: String,
    },

    /// A detective contract has no checks.
    #[error("validating {file}: contract {id}: detective contract must have at least one check")]
    NoChecks {
        /// Offending file name.
        file: String,
        /// Contract id.
        id: String,
    },

    /// A check has neither or both of `command` and `script`.
    #[error("validating {file}: contract {id} check {index} ({name}): must have exactly one of command or script")]
    CheckShape {
        /// Offending file name.
        file: String,
        /// Contract id.
        id: String,
        /// Check position.
        index: usize,
        /// Check name.
        name: String,
    },

    /// A check declares an unknown failure action.
    #[error("validating {file}: contract {id} check {index} ({name}): invalid action {action:?}")]
    InvalidAction {
        /// Offending file name.
        file: String,
        /// Contract id.
        id: String,
        /// Check position.
        index: usize,
        /// Check name.
        name: String,
        /// The unknown action.
        action: String,
    },
}

/// Parse every `*.yaml` file in `dir`.
///
/// # Errors
///
/// Any read, parse, or validation failure aborts the whole load.
pub fn load_dir(dir: &Path) -> Result<Vec<Contract>, ContractError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ContractError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".yaml"))
        .collect();
    names.sort();

    let mut contracts = Vec::with_capacity(names.len());
    for name in names {
        contracts.push(load_file(&dir.join(name))?);
    }
    Ok(contracts)
}

/// Parse and validate a single contract document.
///
/// # Errors
///
/// [`ContractError`] naming the file and the offence.
pub fn load_file(path: &Path) -> Result<Contract, ContractError> {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let data = std::fs::read_to_string(path).map_err(|source| ContractError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let contract: Contract = serde_yaml::from_str(&data).map_err(|source| ContractError::Parse {
        file: file.clone(),
        source,
    })?;

    validate(&contract, &file)?;
    Ok(contract)
}

fn validate(contract: &Contract, file: &str) -> Result<(), ContractError> {
    if contract.id.is_empty() {
        return Err(ContractError::MissingId {
            file: file.to_string(),
        });
    }
    if contract.kind != DETECTIVE && contract.kind != PREVENTIVE {
        return Err(ContractError::InvalidType {
            file: file.to_string(),
            id: contract.id.clone(),
            kind: contract.kind.clone(),
        });
    }

    // Preventive contracts are registry-only; no checks required.
    if contract.is_preventive() {
        return Ok(());
    }

    if contract.checks.is_empty() {
        return Err(ContractError::NoChecks {
            file: file.to_string(),
            id: contract.id.clone(),
        });
    }

    for (index, check) in contract.checks.iter().enumerate() {
        if check.command.is_some() == check.script.is_some() {
            return Err(ContractError::CheckShape {
                file: file.to_string(),
                id: contract.id.clone(),
                index,
                name: check.name.clone(),
            });
        }
        if !check.on_fail.action.is_empty()
            && !VALID_ACTIONS.contains(&check.on_fail.action.as_str())
        {
            return Err(ContractError::InvalidAction {
                file: file.to_string(),
                id: contract.id.clone(),
                index,
                name: check.name.clone(),
                action: check.on_fail.action.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETECTIVE_YAML: &str = r#"id: CON-SYS-001
description: Disk free space check
type: detective
frequency: 60s
scope: system
checks:
  - name: disk_free
    command:
      run: "df /srv --output=pcent | tail -1 | tr -d ' %'"
      test: "[ $RESULT -ge 15 ]"
    on_fail:
      action: halt_agents
      escalate: sysadmin
      message: "disk below threshold"
"#;

    const PREVENTIVE_YAML: &str = r#"id: CON-117
description: watcher may only reach one API host
type: preventive
mechanism: nftables
agent: feed-watcher
enforcement: |
  nft add rule inet filter output meta skuid a-feed-watcher drop
"#;

    const SCRIPT_YAML: &str = r#"id: CON-042
description: custom script check
type: detective
frequency: 300s
scope: agent:researcher
checks:
  - name: custom_check
    script:
      path: scripts/check.sh
      timeout: 30s
    on_fail:
      action: alert
      escalate: sysadmin
      message: "custom check failed"
"#;

    fn write_contract(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_detective_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(dir.path(), "CON-SYS-001.yaml", DETECTIVE_YAML);

        let c = load_file(&path).unwrap();
        assert_eq!(c.id, "CON-SYS-001");
        assert_eq!(c.kind, DETECTIVE);
        assert_eq!(c.scope, "system");
        assert_eq!(c.checks.len(), 1);
        let check = &c.checks[0];
        assert_eq!(check.name, "disk_free");
        let cmd = check.command.as_ref().unwrap();
        assert!(!cmd.run.is_empty());
        assert!(!cmd.test.is_empty());
        assert_eq!(check.on_fail.action, "halt_agents");
        assert_eq!(check.on_fail.escalate, "sysadmin");
    }

    #[test]
    fn parses_preventive_contract_without_checks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(dir.path(), "CON-117.yaml", PREVENTIVE_YAML);

        let c = load_file(&path).unwrap();
        assert!(c.is_preventive());
        assert_eq!(c.mechanism, "nftables");
        assert_eq!(c.agent, "feed-watcher");
        assert!(!c.enforcement.is_empty());
    }

    #[test]
    fn parses_script_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(dir.path(), "CON-042.yaml", SCRIPT_YAML);

        let c = load_file(&path).unwrap();
        let script = c.checks[0].script.as_ref().unwrap();
        assert_eq!(script.path, "scripts/check.sh");
        assert_eq!(script.timeout, "30s");
    }

    #[test]
    fn detective_without_checks_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(
            dir.path(),
            "bad.yaml",
            "id: CON-BAD\ntype: detective\nscope: system\n",
        );
        assert!(matches!(
            load_file(&path),
            Err(ContractError::NoChecks { id, .. }) if id == "CON-BAD"
        ));
    }

    #[test]
    fn check_without_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(
            dir.path(),
            "bad2.yaml",
            r#"id: CON-BAD2
type: detective
scope: system
checks:
  - name: empty_check
    on_fail:
      action: alert
"#,
        );
        assert!(matches!(
            load_file(&path),
            Err(ContractError::CheckShape { name, .. }) if name == "empty_check"
        ));
    }

    #[test]
    fn check_with_both_bodies_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(
            dir.path(),
            "bad3.yaml",
            r#"id: CON-BAD3
type: detective
scope: system
checks:
  - name: double
    command:
      run: "echo 1"
      test: "[ 1 -eq 1 ]"
    script:
      path: scripts/x.sh
"#,
        );
        assert!(matches!(
            load_file(&path),
            Err(ContractError::CheckShape { .. })
        ));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(
            dir.path(),
            "bad4.yaml",
            r#"id: CON-BAD4
type: detective
scope: system
checks:
  - name: check
    command:
      run: "echo 1"
      test: "[ 1 -eq 1 ]"
    on_fail:
      action: destroy_everything
"#,
        );
        assert!(matches!(
            load_file(&path),
            Err(ContractError::InvalidAction { action, .. }) if action == "destroy_everything"
        ));
    }

    #[test]
    fn missing_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(dir.path(), "noid.yaml", "type: preventive\n");
        assert!(matches!(load_file(&path), Err(ContractError::MissingId { .. })));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_contract(dir.path(), "odd.yaml", "id: CON-ODD\ntype: reactive\n");
        assert!(matches!(
            load_file(&path),
            Err(ContractError::InvalidType { kind, .. }) if kind == "reactive"
        ));
    }

    #[test]
    fn load_dir_takes_only_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        write_contract(dir.path(), "CON-SYS-001.yaml", DETECTIVE_YAML);
        write_contract(dir.path(), "CON-117.yaml", PREVENTIVE_YAML);
        write_contract(dir.path(), "readme.txt", "not a contract");
        std::fs::create_dir(dir.path().join("scripts")).unwrap();

        let contracts = load_dir(dir.path()).unwrap();
        assert_eq!(contracts.len(), 2);
    }

    #[test]
    fn load_dir_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dir(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn one_bad_file_aborts_the_load() {
        let dir = tempfile::tempdir().unwrap();
        write_contract(dir.path(), "good.yaml", DETECTIVE_YAML);
        write_contract(dir.path(), "zzz-bad.yaml", "id: CON-BAD\ntype: detective\n");
        assert!(load_dir(dir.path()).is_err());
    }
}
