//! CLI command implementations.

pub mod format;
pub mod healthcheck;
pub mod logs;
pub mod provision;
pub mod responses;
pub mod route;
pub mod run;
pub mod status;
pub mod task;
