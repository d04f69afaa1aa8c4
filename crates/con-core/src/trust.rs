//! Task provenance classification.
//!
//! A task file's owning uid decides how much the fleet trusts its content.
//! Root-owned files and files owned by a member of the configured trusted
//! group are verified (user or system origin); anything else is unverified —
//! the writing agent may have been influenced by external content.

use std::ffi::CString;
use std::fmt;

use nix::unistd::{getgrouplist, Gid, Group, Uid, User};

/// Default name of the trusted group.
pub const DEFAULT_TRUSTED_GROUP: &str = "trusted";

/// Provenance of a task, derived from file ownership at pick time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    /// Root-owned or trusted-group-owned: user or system origin.
    Verified,
    /// Agent-owned: may carry external influence.
    Unverified,
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => write!(f, "verified"),
            Self::Unverified => write!(f, "unverified"),
        }
    }
}

/// Classifies file-owner uids against a configured trusted group.
///
/// Uid 0 is always verified regardless of the group. Any resolution failure
/// (unknown uid, missing group, membership lookup error) yields
/// [`TrustLevel::Unverified`]. Lookups are cheap and classification runs
/// once per pick, so nothing is cached.
#[derive(Debug, Clone)]
pub struct TrustClassifier {
    trusted_group: String,
}

impl Default for TrustClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRUSTED_GROUP)
    }
}

impl TrustClassifier {
    /// Classifier for the given trusted group name.
    pub fn new(trusted_group: impl Into<String>) -> Self {
        Self {
            trusted_group: trusted_group.into(),
        }
    }

    /// The configured trusted group name.
    #[must_use]
    pub fn trusted_group(&self) -> &str {
        &self.trusted_group
    }

    /// Classify an owning uid.
    #[must_use]
    pub fn classify(&self, uid: u32) -> TrustLevel {
        if uid == 0 {
            return TrustLevel::Verified;
        }
        if self.uid_in_trusted_group(uid).unwrap_or(false) {
            TrustLevel::Verified
        } else {
            TrustLevel::Unverified
        }
    }

    /// Whether `uid` belongs to the trusted group. `None` on any resolution
    /// failure.
    fn uid_in_trusted_group(&self, uid: u32) -> Option<bool> {
        let user = User::from_uid(Uid::from_raw(uid)).ok()??;
        let group = Group::from_name(&self.trusted_group).ok()??;
        let name = CString::new(user.name).ok()?;
        let memberships: Vec<Gid> = getgrouplist(&name, user.gid).ok()?;
        Some(memberships.contains(&group.gid))
    }
}
