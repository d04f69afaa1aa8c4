//! Fleet configuration.
//!
//! One TOML document (`/etc/con/con.toml` by default, overridable through
//! `CON_CONFIG`) declares the system, its agents, and their defaults.
//! Reasoner settings resolve with precedence agent → tier → base → built-in;
//! an empty string always means "inherit", never "override with empty".

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Built-in runner used when nothing is configured anywhere.
pub const DEFAULT_RUNNER: &str = "picoclaw";

/// Providers the native reasoner understands.
pub const VALID_PROVIDERS: [&str; 3] = ["openrouter", "anthropic", "openai"];

/// Agent tier, which drives the hardening profile and default groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Officers coordinate other agents.
    Officer,
    /// Operators run day-to-day flows.
    Operator,
    /// Workers get the strictest lockdown.
    #[default]
    Worker,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Officer => write!(f, "officer"),
            Self::Operator => write!(f, "operator"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// How an agent is scheduled by the OS supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// A path watcher fires the agent when its inbox changes.
    #[default]
    OnDemand,
    /// The service runs long-lived and restarts on failure.
    Continuous,
    /// A calendar timer fires the agent, plus the inbox watcher.
    Cron,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnDemand => write!(f, "on-demand"),
            Self::Continuous => write!(f, "continuous"),
            Self::Cron => write!(f, "cron"),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// System identity.
    pub system: SystemConfig,
    /// Host infrastructure extras.
    pub infra: InfraConfig,
    /// Reasoner defaults, keyed by `base` or a tier name.
    pub defaults: HashMap<String, RunnerDefaults>,
    /// Contract engine settings.
    pub contracts: ContractsConfig,
    /// Status dashboard settings.
    pub dashboard: DashboardConfig,
    /// The fleet.
    pub agents: Vec<AgentConfig>,
}

/// `[system]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Human-readable system name.
    pub name: String,
    /// Group whose members' task files are treated as verified.
    pub trusted_group: String,
    /// Agent that receives all outer-inbox work first.
    pub router: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "con".to_string(),
            trusted_group: crate::trust::DEFAULT_TRUSTED_GROUP.to_string(),
            router: "concierge".to_string(),
        }
    }
}

/// `[infra]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InfraConfig {
    /// SSH public keys installed for root during provisioning.
    pub ssh_authorized_keys: Vec<String>,
}

/// Mode-neutral reasoner defaults for one tier (or the `base` layer).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunnerDefaults {
    /// Backend selector.
    pub runner: String,
    /// Provider name for the native backend.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable holding the provider API key.
    pub api_key_env: String,
}

/// `[contracts]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    /// System-wide contract settings.
    pub system: SystemContracts,
}

/// `[contracts.system]` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemContracts {
    /// Interval between healthcheck timer firings.
    pub healthcheck_interval: String,
}

impl Default for SystemContracts {
    fn default() -> Self {
        Self {
            healthcheck_interval: "60s".to_string(),
        }
    }
}

/// `[dashboard]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Whether the static status dashboard is served.
    pub enabled: bool,
    /// Listen port.
    pub port: u16,
    /// Bind address.
    pub bind: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
            bind: "0.0.0.0".to_string(),
        }
    }
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Unique lowercase identifier; used in paths, usernames, unit names.
    pub name: String,
    /// Tier.
    pub tier: Tier,
    /// Scheduling mode.
    pub mode: Mode,
    /// systemd `OnCalendar` expression; required when mode is `cron`.
    pub cron: String,
    /// Role layers (also grant skills and, for `sysadmin`, commissioning).
    pub roles: Vec<String>,
    /// Group layers.
    pub groups: Vec<String>,
    /// Scope layers.
    pub scopes: Vec<String>,
    /// Reasoner backend: `picoclaw`/empty for native, anything else is a
    /// command to exec.
    pub runner: String,
    /// Arguments passed to an exec runner.
    pub runner_args: Vec<String>,
    /// Provider name for the native backend.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable holding the provider API key.
    pub api_key_env: String,
    /// Inline instructions appended as the last context layer.
    pub instructions: String,
}

impl AgentConfig {
    /// Whether a role grants sudo-capable commissioning.
    #[must_use]
    pub fn has_sysadmin_role(&self) -> bool {
        self.roles.iter().any(|r| r == "sysadmin")
    }
}

/// Configuration errors. All of them abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The document is not valid TOML for this schema.
    #[error("parsing {path}: {source}")]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// An agent entry has no name.
    #[error("agent[{index}]: name is required")]
    MissingName {
        /// Position in the `[[agents]]` list.
        index: usize,
    },

    /// Two agents share a name.
    #[error("duplicate agent name {name:?}")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },

    /// A cron-mode agent has no cron expression.
    #[error("agent {agent:?}: cron mode requires a cron expression")]
    CronRequired {
        /// The offending agent.
        agent: String,
    },

    /// An unknown provider was configured.
    #[error("agent {agent:?}: invalid provider {provider:?} (must be one of openrouter/anthropic/openai)")]
    InvalidProvider {
        /// The offending agent.
        agent: String,
        /// The unknown provider.
        provider: String,
    },
}

impl Config {
    /// Load and validate a configuration document.
    ///
    /// `CON_SYSTEM_NAME` overrides the configured system name.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] on read, parse, or validation failure.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: Self = toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;

        if let Ok(name) = std::env::var("CON_SYSTEM_NAME") {
            if !name.is_empty() {
                cfg.system.name = name;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate the fleet declaration.
    ///
    /// # Errors
    ///
    /// The first violation found, as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for (index, agent) in self.agents.iter().enumerate() {
            if agent.name.is_empty() {
                return Err(ConfigError::MissingName { index });
            }
            if !seen.insert(&agent.name) {
                return Err(ConfigError::DuplicateName {
                    name: agent.name.clone(),
                });
            }
            if agent.mode == Mode::Cron && agent.cron.is_empty() {
                return Err(ConfigError::CronRequired {
                    agent: agent.name.clone(),
                });
            }
            if !agent.provider.is_empty() && !VALID_PROVIDERS.contains(&agent.provider.as_str()) {
                return Err(ConfigError::InvalidProvider {
                    agent: agent.name.clone(),
                    provider: agent.provider.clone(),
                });
            }
        }
        Ok(())
    }

    /// Look up an agent and apply default resolution.
    ///
    /// Precedence per field: the agent's own value, then the tier defaults,
    /// then the `base` defaults, then built-ins.
    #[must_use]
    pub fn resolved_agent(&self, name: &str) -> Option<AgentConfig> {
        let mut resolved = self.agents.iter().find(|a| a.name == name)?.clone();

        let tier_key = resolved.tier.to_string();
        for layer in [self.defaults.get(&tier_key), self.defaults.get("base")] {
            let Some(defaults) = layer else { continue };
            inherit(&mut resolved.runner, &defaults.runner);
            inherit(&mut resolved.provider, &defaults.provider);
            inherit(&mut resolved.model, &defaults.model);
            inherit(&mut resolved.api_key_env, &defaults.api_key_env);
        }

        if resolved.runner.is_empty() {
            resolved.runner = DEFAULT_RUNNER.to_string();
        }

        Some(resolved)
    }
}

/// Fill `field` from `value` only when the field is empty.
fn inherit(field: &mut String, value: &str) {
    if field.is_empty() && !value.is_empty() {
        *field = value.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[system]
name = "testbed"
trusted_group = "operators"
router = "frontdesk"

[defaults.base]
runner = "picoclaw"
model = "base/model"

[defaults.worker]
model = "worker/model"

[contracts.system]
healthcheck_interval = "120s"

[dashboard]
enabled = true
port = 9090

[[agents]]
name = "frontdesk"
tier = "operator"
mode = "on-demand"
roles = ["router"]

[[agents]]
name = "digger"
tier = "worker"
mode = "cron"
cron = "*-*-* 09:00:00"
runner = "claude"
runner_args = ["-p"]

[[agents]]
name = "keeper"
tier = "worker"
model = "keeper/model"
"#;

    fn parse(content: &str) -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("con.toml");
        std::fs::write(&path, content).unwrap();
        Config::from_file(&path).unwrap()
    }

    #[test]
    fn parses_full_document() {
        let cfg = parse(SAMPLE);
        assert_eq!(cfg.system.name, "testbed");
        assert_eq!(cfg.system.trusted_group, "operators");
        assert_eq!(cfg.system.router, "frontdesk");
        assert_eq!(cfg.contracts.system.healthcheck_interval, "120s");
        assert!(cfg.dashboard.enabled);
        assert_eq!(cfg.dashboard.port, 9090);
        assert_eq!(cfg.agents.len(), 3);
        assert_eq!(cfg.agents[1].mode, Mode::Cron);
    }

    #[test]
    fn tier_defaults_shadow_base_defaults() {
        let cfg = parse(SAMPLE);
        let keeper = cfg.resolved_agent("keeper").unwrap();
        // Agent value wins over both default layers.
        assert_eq!(keeper.model, "keeper/model");

        let digger = cfg.resolved_agent("digger").unwrap();
        // Tier layer wins over base.
        assert_eq!(digger.model, "worker/model");
        // Agent's own runner survives resolution.
        assert_eq!(digger.runner, "claude");

        let frontdesk = cfg.resolved_agent("frontdesk").unwrap();
        // No operator tier defaults: base layer applies.
        assert_eq!(frontdesk.model, "base/model");
        assert_eq!(frontdesk.runner, "picoclaw");
    }

    #[test]
    fn empty_string_means_inherit() {
        let cfg = parse(
            r#"
[defaults.base]
model = "base/model"

[[agents]]
name = "quiet"
model = ""
"#,
        );
        let quiet = cfg.resolved_agent("quiet").unwrap();
        assert_eq!(quiet.model, "base/model");
        assert_eq!(quiet.runner, DEFAULT_RUNNER);
    }

    #[test]
    fn unknown_agent_resolves_to_none() {
        let cfg = parse(SAMPLE);
        assert!(cfg.resolved_agent("nobody").is_none());
    }

    #[test]
    fn cron_mode_requires_expression() {
        let cfg: Config = toml::from_str(
            r#"
[[agents]]
name = "late"
mode = "cron"
"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::CronRequired { agent }) if agent == "late"
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let cfg: Config = toml::from_str(
            r#"
[[agents]]
name = "twin"

[[agents]]
name = "twin"
"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateName { name }) if name == "twin"
        ));
    }

    #[test]
    fn invalid_provider_is_rejected() {
        let cfg: Config = toml::from_str(
            r#"
[[agents]]
name = "odd"
provider = "acme"
"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidProvider { provider, .. }) if provider == "acme"
        ));
    }

    #[test]
    fn invalid_tier_fails_at_parse() {
        let err = toml::from_str::<Config>(
            r#"
[[agents]]
name = "odd"
tier = "general"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("general"));
    }

    #[test]
    fn sysadmin_role_detection() {
        let agent = AgentConfig {
            roles: vec!["researcher".into(), "sysadmin".into()],
            ..Default::default()
        };
        assert!(agent.has_sysadmin_role());
        assert!(!AgentConfig::default().has_sysadmin_role());
    }
}
