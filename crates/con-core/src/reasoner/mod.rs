//! Reasoner backends.
//!
//! The cycle treats the reasoner as a black box:
//! `(deadline, prompt, session key) → text`. Two backends exist behind one
//! variant type: the native in-process provider client, and a subprocess
//! wrapping an external CLI. Selection follows the agent's `runner` field —
//! `picoclaw` or empty picks the native backend, anything else is exec'd as
//! a command.

mod exec;
mod native;

use std::io;

pub use exec::{ExecReasoner, MAX_OUTPUT_BYTES};
pub use native::{NativeConfig, NativeReasoner, Provider, DEFAULT_MODEL};

use crate::config::AgentConfig;
use crate::exec::Deadline;
use crate::layout::Layout;

/// Errors from a reasoner invocation.
///
/// The cycle logs these and routes whatever text was produced; they never
/// abort task archival.
#[derive(Debug, thiserror::Error)]
pub enum ReasonerError {
    /// No provider API key is available in the environment.
    #[error(
        "no provider API key configured (set CON_OPENROUTER_API_KEY, \
         CON_AUTH_ANTHROPIC, or CON_AUTH_OPENAI)"
    )]
    NoProvider,

    /// The provider request failed at the transport level.
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-success status.
    #[error("provider returned status {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The provider response carried no assistant text.
    #[error("provider response had no assistant message")]
    EmptyResponse,

    /// The exec runner could not be spawned.
    #[error("exec runner {command}: {source}")]
    Spawn {
        /// The configured command.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The exec runner exited non-zero.
    #[error("exec runner {command}: exit code {code}\nstderr: {stderr}")]
    RunnerFailed {
        /// The configured command.
        command: String,
        /// Exit code (`-1` when signalled).
        code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The ambient deadline expired; the runner's process group was killed.
    #[error("exec runner {command}: cancelled by deadline")]
    Cancelled {
        /// The configured command.
        command: String,
    },

    /// I/O towards the exec runner failed.
    #[error("exec runner {command}: {source}")]
    Io {
        /// The configured command.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// A configured reasoner backend.
#[derive(Debug)]
pub enum Reasoner {
    /// In-process provider client.
    Native(NativeReasoner),
    /// External CLI subprocess.
    Exec(ExecReasoner),
}

impl Reasoner {
    /// Select and configure the backend for a resolved agent.
    #[must_use]
    pub fn for_agent(agent: &AgentConfig, layout: &Layout) -> Self {
        match agent.runner.as_str() {
            "" | "picoclaw" => Self::Native(NativeReasoner::new(NativeConfig::for_agent(
                agent, layout,
            ))),
            command => Self::Exec(ExecReasoner {
                command: command.to_string(),
                args: agent.runner_args.clone(),
                workspace: layout.agent_workspace(&agent.name),
            }),
        }
    }

    /// Produce a response for `prompt`.
    ///
    /// The session key keeps per-agent conversational state in the native
    /// backend; external runners maintain their own state and do not
    /// receive it.
    ///
    /// # Errors
    ///
    /// [`ReasonerError`] describing the backend failure.
    pub fn invoke(
        &self,
        deadline: Deadline,
        prompt: &str,
        session_key: &str,
    ) -> Result<String, ReasonerError> {
        match self {
            Self::Native(native) => native.invoke(deadline, prompt, session_key),
            Self::Exec(exec) => exec.invoke(deadline, prompt),
        }
    }
}
