//! Layered instruction composition.
//!
//! An agent's instruction document is concatenated from `AGENTS.md`
//! fragments found along a fixed layer order: base, then each group, role,
//! and scope, then the agent-specific fragment, then inline instructions
//! from the agent descriptor. Every layer is looked up first in the
//! read-only outer configuration root and then in the mutable inner overlay;
//! missing fragments are silently skipped.

use std::path::{Path, PathBuf};

/// Separator between fragments in the composed document.
pub const FRAGMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Inputs to one composition.
#[derive(Debug, Clone, Default)]
pub struct Layers {
    /// Read-only configuration root (`/etc/con`).
    pub outer_root: PathBuf,
    /// Mutable overlay root (`/srv/con/config`); `None` disables the overlay.
    pub inner_root: Option<PathBuf>,
    /// Group layer names, in order.
    pub groups: Vec<String>,
    /// Role layer names, in order.
    pub roles: Vec<String>,
    /// Scope layer names, in order.
    pub scopes: Vec<String>,
    /// Agent name for the agent-specific layer.
    pub agent_name: String,
    /// Inline instructions from the agent descriptor.
    pub inline_instructions: String,
}

/// Assembly errors.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    /// No fragment exists in any layer.
    #[error("no instruction fragments found for agent {agent:?}")]
    NoContext {
        /// The agent being assembled.
        agent: String,
    },
}

/// Compose the instruction document for one agent.
///
/// Fragments are whitespace-trimmed, joined with [`FRAGMENT_SEPARATOR`], and
/// terminated with a newline.
///
/// # Errors
///
/// [`AssembleError::NoContext`] when every layer is empty.
pub fn assemble(layers: &Layers) -> Result<String, AssembleError> {
    let mut parts: Vec<String> = Vec::new();

    let mut read = |dir: PathBuf| {
        if let Ok(data) = std::fs::read_to_string(dir.join("AGENTS.md")) {
            parts.push(data.trim().to_string());
        }
    };

    let mut both = |relative: PathBuf| {
        read(layers.outer_root.join(&relative));
        if let Some(inner) = &layers.inner_root {
            read(inner.join(&relative));
        }
    };

    both(PathBuf::from("base"));
    for group in &layers.groups {
        both(Path::new("groups").join(group));
    }
    for role in &layers.roles {
        both(Path::new("roles").join(role));
    }
    for scope in &layers.scopes {
        both(Path::new("scopes").join(scope));
    }
    both(Path::new("agents").join(&layers.agent_name));

    if !layers.inline_instructions.is_empty() {
        parts.push(layers.inline_instructions.trim().to_string());
    }

    if parts.is_empty() {
        return Err(AssembleError::NoContext {
            agent: layers.agent_name.clone(),
        });
    }

    Ok(parts.join(FRAGMENT_SEPARATOR) + "\n")
}
