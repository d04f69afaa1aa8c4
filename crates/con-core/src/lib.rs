//! # con-core
//!
//! Core library for `con`, a host-local agent fleet orchestrator.
//!
//! A fleet of autonomous agents shares one host. Each agent is an OS user
//! with a filesystem mailbox (`inbox/`, `outbox/`, `processed/`); the only
//! transport between agents is files on disk, guarded by ownership and ACLs.
//! systemd path units fire a one-shot `con run <agent>` process whenever an
//! inbox changes; a timer fires the contract healthcheck, which can halt,
//! kill, or quarantine misbehaving agents and escalate back into the fleet.
//!
//! The crate provides:
//!
//! - **Mailbox pipeline**: deterministic task picking with provenance
//!   classification ([`mailbox`], [`trust`]) and outer-inbox routing.
//! - **Context assembly**: layered instruction composition ([`assembler`])
//!   and skills loading ([`skills`]).
//! - **Agent cycle**: the per-invocation drain loop ([`cycle`]) over a
//!   pluggable reasoner backend ([`reasoner`]).
//! - **Contract engine**: YAML contract loading, detective check evaluation,
//!   and failure-action dispatch ([`contract`], [`healthcheck`]).
//! - **Provisioning**: systemd unit synthesis ([`units`]) and the ordered
//!   shell-command plan that installs users, directories, ACLs, and watchers
//!   ([`provision`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod config;
pub mod contract;
pub mod cycle;
pub mod exec;
pub mod healthcheck;
pub mod layout;
pub mod mailbox;
pub mod provision;
pub mod reasoner;
pub mod skills;
pub mod trust;
pub mod units;

pub use config::{AgentConfig, Config};
pub use exec::{CommandExecutor, Deadline, ShellExecutor};
pub use layout::Layout;
pub use mailbox::Task;
pub use trust::{TrustClassifier, TrustLevel};
