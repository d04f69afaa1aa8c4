//! Filesystem layout.
//!
//! Every path the core touches is derived from three roots: the read-only
//! outer configuration root (`/etc/con`), the mutable state root
//! (`/srv/con`), and the home root (`/home`). Tests construct a [`Layout`]
//! over temporary directories; production code uses [`Layout::default`].

use std::path::{Path, PathBuf};

/// Prefix for agent system usernames (`a-<name>`).
pub const USER_PREFIX: &str = "a-";

/// Prefix for agent unit names (`con-<name>`).
pub const UNIT_PREFIX: &str = "con-";

/// Shared primary group for all agent users.
pub const AGENTS_GROUP: &str = "agents";

/// The three filesystem roots the fleet lives under.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Read-only configuration root (`/etc/con`).
    pub config_root: PathBuf,
    /// Mutable state root (`/srv/con`).
    pub state_root: PathBuf,
    /// Root under which agent home directories are created (`/home`).
    pub home_root: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            config_root: PathBuf::from("/etc/con"),
            state_root: PathBuf::from("/srv/con"),
            home_root: PathBuf::from("/home"),
        }
    }
}

/// System username for an agent.
#[must_use]
pub fn agent_user(name: &str) -> String {
    format!("{USER_PREFIX}{name}")
}

/// Base unit name for an agent (no suffix).
#[must_use]
pub fn agent_unit(name: &str) -> String {
    format!("{UNIT_PREFIX}{name}")
}

impl Layout {
    /// Layout rooted under a single directory, for tests.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            config_root: root.join("etc"),
            state_root: root.join("srv"),
            home_root: root.join("home"),
        }
    }

    /// The public outer inbox where external writers drop tasks.
    #[must_use]
    pub fn outer_inbox(&self) -> PathBuf {
        self.state_root.join("inbox")
    }

    /// Root of all per-agent state directories.
    #[must_use]
    pub fn agents_root(&self) -> PathBuf {
        self.state_root.join("agents")
    }

    /// An agent's state directory.
    #[must_use]
    pub fn agent_dir(&self, name: &str) -> PathBuf {
        self.agents_root().join(name)
    }

    /// An agent's inbox.
    #[must_use]
    pub fn agent_inbox(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join("inbox")
    }

    /// An agent's outbox.
    #[must_use]
    pub fn agent_outbox(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join("outbox")
    }

    /// An agent's archive of processed tasks.
    #[must_use]
    pub fn agent_archive(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join("processed")
    }

    /// An agent's workspace.
    #[must_use]
    pub fn agent_workspace(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join("workspace")
    }

    /// An agent's skills directory inside the workspace.
    #[must_use]
    pub fn agent_skills(&self, name: &str) -> PathBuf {
        self.agent_workspace(name).join("skills")
    }

    /// An agent's reasoner session store.
    #[must_use]
    pub fn agent_sessions(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join("sessions")
    }

    /// An agent's home directory.
    #[must_use]
    pub fn agent_home(&self, name: &str) -> PathBuf {
        self.home_root.join(agent_user(name))
    }

    /// The pre-compiled instruction document for an agent.
    #[must_use]
    pub fn agent_instructions(&self, name: &str) -> PathBuf {
        self.agent_home(name).join("AGENTS.md")
    }

    /// Directory of daily audit logs.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.state_root.join("logs").join("audit")
    }

    /// The contract healthcheck audit log.
    #[must_use]
    pub fn contracts_log(&self) -> PathBuf {
        self.audit_dir().join("contracts.log")
    }

    /// Installed contract documents.
    #[must_use]
    pub fn contracts_dir(&self) -> PathBuf {
        self.state_root.join("contracts")
    }

    /// The inner (mutable) configuration overlay.
    #[must_use]
    pub fn inner_config_root(&self) -> PathBuf {
        self.state_root.join("config")
    }

    /// Static status dashboard directory.
    #[must_use]
    pub fn status_dir(&self) -> PathBuf {
        self.state_root.join("status")
    }

    /// Shared artifacts directory.
    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.state_root.join("artifacts")
    }

    /// Policy documents directory.
    #[must_use]
    pub fn policy_dir(&self) -> PathBuf {
        self.state_root.join("policy")
    }

    /// Ledger directory.
    #[must_use]
    pub fn ledger_dir(&self) -> PathBuf {
        self.state_root.join("ledger")
    }

    /// The root-owned environment file injected into agent services.
    #[must_use]
    pub fn env_file(&self) -> PathBuf {
        self.config_root.join("env")
    }
}
