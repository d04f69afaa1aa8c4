//! Native in-process reasoner.
//!
//! A blocking chat-completion client over the configured provider. The
//! provider is chosen from the agent's explicit `api_key_env` declaration
//! when that variable is set, otherwise by environment precedence:
//! `CON_OPENROUTER_API_KEY`, then `CON_AUTH_ANTHROPIC`, then
//! `CON_AUTH_OPENAI`. Conversation state is kept per session key as a
//! bounded transcript under the agent's `sessions/` directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::ReasonerError;
use crate::config::AgentConfig;
use crate::exec::Deadline;
use crate::layout::Layout;

/// Model used when neither the agent nor any default layer names one.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.6";

/// Response token budget per completion.
pub const MAX_TOKENS: u32 = 8192;

/// Upper bound on assistant rounds within one invocation.
pub const MAX_TOOL_ITERATIONS: u32 = 50;

/// Messages retained in a session transcript.
const SESSION_WINDOW: usize = 40;

/// Request timeout when the ambient deadline is unbounded.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A provider the native backend can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// OpenRouter (OpenAI-compatible).
    OpenRouter,
    /// Anthropic messages API.
    Anthropic,
    /// OpenAI chat completions.
    OpenAi,
}

impl Provider {
    fn endpoint(self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "anthropic" => Self::Anthropic,
            "openai" => Self::OpenAi,
            _ => Self::OpenRouter,
        }
    }
}

/// Resolved configuration for one native invocation.
#[derive(Debug, Clone)]
pub struct NativeConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Response token budget.
    pub max_tokens: u32,
    /// Bound on assistant rounds within one invocation.
    pub max_tool_iterations: u32,
    /// Agent workspace, recorded for diagnostics.
    pub workspace: PathBuf,
    /// Session transcript directory.
    pub sessions_dir: PathBuf,
    /// Selected provider and its API key, if any key is available.
    pub provider: Option<(Provider, String)>,
}

impl NativeConfig {
    /// Build the configuration for a resolved agent.
    #[must_use]
    pub fn for_agent(agent: &AgentConfig, layout: &Layout) -> Self {
        let model = if agent.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            agent.model.clone()
        };
        Self {
            model,
            max_tokens: MAX_TOKENS,
            max_tool_iterations: MAX_TOOL_ITERATIONS,
            workspace: layout.agent_workspace(&agent.name),
            sessions_dir: layout.agent_sessions(&agent.name),
            provider: select_provider(agent),
        }
    }
}

/// Provider selection: explicit agent declaration first, then environment
/// precedence.
fn select_provider(agent: &AgentConfig) -> Option<(Provider, String)> {
    if !agent.api_key_env.is_empty() {
        if let Ok(key) = std::env::var(&agent.api_key_env) {
            if !key.is_empty() {
                return Some((Provider::from_name(&agent.provider), key));
            }
        }
    }

    for (var, provider) in [
        ("CON_OPENROUTER_API_KEY", Provider::OpenRouter),
        ("CON_AUTH_ANTHROPIC", Provider::Anthropic),
        ("CON_AUTH_OPENAI", Provider::OpenAi),
    ] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                return Some((provider, key));
            }
        }
    }
    None
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }
}

/// The native backend.
#[derive(Debug)]
pub struct NativeReasoner {
    config: NativeConfig,
}

impl NativeReasoner {
    /// Wrap a resolved configuration.
    #[must_use]
    pub const fn new(config: NativeConfig) -> Self {
        Self { config }
    }

    /// Run one completion round-trip, updating the session transcript.
    ///
    /// # Errors
    ///
    /// [`ReasonerError::NoProvider`] when no API key is available, transport
    /// and API errors otherwise.
    pub fn invoke(
        &self,
        deadline: Deadline,
        prompt: &str,
        session_key: &str,
    ) -> Result<String, ReasonerError> {
        let Some((provider, key)) = self.config.provider.clone() else {
            return Err(ReasonerError::NoProvider);
        };

        debug!(
            model = %self.config.model,
            workspace = %self.config.workspace.display(),
            %session_key,
            "invoking native reasoner"
        );

        let mut transcript = self.load_session(session_key);
        transcript.push(ChatMessage::user(prompt));

        let client = reqwest::blocking::Client::builder()
            .timeout(deadline.remaining().unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .build()?;

        let text = match provider {
            Provider::Anthropic => self.complete_anthropic(&client, &key, &transcript)?,
            Provider::OpenRouter | Provider::OpenAi => {
                self.complete_openai(&client, provider.endpoint(), &key, &transcript)?
            }
        };

        transcript.push(ChatMessage::assistant(&text));
        self.save_session(session_key, transcript);
        Ok(text)
    }

    /// OpenAI-compatible chat completion, bounded by the tool-iteration cap.
    ///
    /// No tools are offered, so the model should answer in one round; if a
    /// provider nevertheless emits `tool_calls`, each call is answered with
    /// an unavailability note and the round repeats.
    fn complete_openai(
        &self,
        client: &reqwest::blocking::Client,
        url: &str,
        key: &str,
        transcript: &[ChatMessage],
    ) -> Result<String, ReasonerError> {
        let mut messages: Vec<serde_json::Value> = transcript
            .iter()
            .map(|m| json!({ "role": &m.role, "content": &m.content }))
            .collect();

        for _ in 0..self.config.max_tool_iterations {
            let body = json!({
                "model": &self.config.model,
                "messages": &messages,
                "max_tokens": self.config.max_tokens,
            });
            let response = client.post(url).bearer_auth(key).json(&body).send()?;
            let status = response.status();
            if !status.is_success() {
                return Err(ReasonerError::Api {
                    status: status.as_u16(),
                    body: response.text().unwrap_or_default(),
                });
            }

            let parsed: OpenAiResponse = response.json()?;
            let choice = parsed
                .choices
                .into_iter()
                .next()
                .ok_or(ReasonerError::EmptyResponse)?;

            if choice.finish_reason.as_deref() == Some("tool_calls") {
                let calls = choice.message["tool_calls"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                messages.push(choice.message);
                for call in calls {
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": call["id"].clone(),
                        "content": "tool execution is not available in this session",
                    }));
                }
                continue;
            }

            return Ok(choice.message["content"]
                .as_str()
                .unwrap_or_default()
                .to_string());
        }

        Err(ReasonerError::EmptyResponse)
    }

    /// Anthropic messages API completion.
    fn complete_anthropic(
        &self,
        client: &reqwest::blocking::Client,
        key: &str,
        transcript: &[ChatMessage],
    ) -> Result<String, ReasonerError> {
        let body = json!({
            "model": &self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": transcript
                .iter()
                .map(|m| json!({ "role": &m.role, "content": &m.content }))
                .collect::<Vec<_>>(),
        });

        let response = client
            .post(Provider::Anthropic.endpoint())
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReasonerError::Api {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let parsed: AnthropicResponse = response.json()?;
        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();
        if text.is_empty() {
            return Err(ReasonerError::EmptyResponse);
        }
        Ok(text)
    }

    fn session_path(&self, session_key: &str) -> PathBuf {
        self.config
            .sessions_dir
            .join(format!("{}.json", sanitize_session_key(session_key)))
    }

    fn load_session(&self, session_key: &str) -> Vec<ChatMessage> {
        let path = self.session_path(session_key);
        std::fs::read(&path)
            .ok()
            .and_then(|data| serde_json::from_slice(&data).ok())
            .unwrap_or_default()
    }

    fn save_session(&self, session_key: &str, mut transcript: Vec<ChatMessage>) {
        if transcript.len() > SESSION_WINDOW {
            transcript.drain(..transcript.len() - SESSION_WINDOW);
        }
        if let Err(err) = std::fs::create_dir_all(&self.config.sessions_dir) {
            warn!(%err, "cannot create sessions dir; transcript not persisted");
            return;
        }
        match serde_json::to_vec_pretty(&transcript) {
            Ok(data) => {
                if let Err(err) = std::fs::write(self.session_path(session_key), data) {
                    warn!(%err, "transcript not persisted");
                }
            }
            Err(err) => warn!(%err, "transcript not serializable"),
        }
    }
}

/// Session keys contain `:`; map everything outside `[A-Za-z0-9._-]` to `-`.
fn sanitize_session_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: serde_json::Value,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> AgentConfig {
        AgentConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn config_carries_model_fallback_and_limits() {
        let layout = Layout::default();
        let cfg = NativeConfig::for_agent(&agent("scout"), &layout);
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.max_tokens, MAX_TOKENS);
        assert_eq!(cfg.max_tool_iterations, MAX_TOOL_ITERATIONS);
        assert_eq!(cfg.workspace, layout.agent_workspace("scout"));
        assert_eq!(cfg.sessions_dir, layout.agent_sessions("scout"));

        let mut named = agent("scout");
        named.model = "openai/gpt-4.1".into();
        let cfg = NativeConfig::for_agent(&named, &Layout::default());
        assert_eq!(cfg.model, "openai/gpt-4.1");
    }

    // One test mutates the provider environment variables sequentially to
    // avoid races between parallel tests.
    #[test]
    fn provider_selection_precedence() {
        let vars = [
            "CON_OPENROUTER_API_KEY",
            "CON_AUTH_ANTHROPIC",
            "CON_AUTH_OPENAI",
            "SCOUT_KEY",
        ];
        for var in vars {
            std::env::remove_var(var);
        }

        assert!(select_provider(&agent("scout")).is_none());

        std::env::set_var("CON_AUTH_OPENAI", "k-openai");
        assert_eq!(
            select_provider(&agent("scout")).map(|(p, _)| p),
            Some(Provider::OpenAi)
        );

        std::env::set_var("CON_AUTH_ANTHROPIC", "k-anthropic");
        assert_eq!(
            select_provider(&agent("scout")).map(|(p, _)| p),
            Some(Provider::Anthropic)
        );

        std::env::set_var("CON_OPENROUTER_API_KEY", "k-openrouter");
        assert_eq!(
            select_provider(&agent("scout")).map(|(p, _)| p),
            Some(Provider::OpenRouter)
        );

        // Explicit declaration wins over the precedence chain.
        let mut declared = agent("scout");
        declared.provider = "anthropic".into();
        declared.api_key_env = "SCOUT_KEY".into();
        std::env::set_var("SCOUT_KEY", "k-scout");
        let (provider, key) = select_provider(&declared).unwrap();
        assert_eq!(provider, Provider::Anthropic);
        assert_eq!(key, "k-scout");

        // Empty declared variable falls back to the chain.
        std::env::set_var("SCOUT_KEY", "");
        assert_eq!(
            select_provider(&declared).map(|(p, _)| p),
            Some(Provider::OpenRouter)
        );

        for var in vars {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn no_provider_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = NativeReasoner::new(NativeConfig {
            model: DEFAULT_MODEL.into(),
            max_tokens: MAX_TOKENS,
            max_tool_iterations: MAX_TOOL_ITERATIONS,
            workspace: dir.path().join("workspace"),
            sessions_dir: dir.path().join("sessions"),
            provider: None,
        });
        let err = reasoner
            .invoke(Deadline::unbounded(), "hello", "con:scout")
            .unwrap_err();
        assert!(matches!(err, ReasonerError::NoProvider));
    }

    #[test]
    fn session_keys_become_safe_filenames() {
        assert_eq!(sanitize_session_key("con:scout"), "con-scout");
        assert_eq!(sanitize_session_key("a/b c"), "a-b-c");
        assert_eq!(sanitize_session_key("plain-1.2_x"), "plain-1.2_x");
    }

    #[test]
    fn session_transcript_round_trips_and_stays_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let reasoner = NativeReasoner::new(NativeConfig {
            model: DEFAULT_MODEL.into(),
            max_tokens: MAX_TOKENS,
            max_tool_iterations: MAX_TOOL_ITERATIONS,
            workspace: dir.path().join("workspace"),
            sessions_dir: dir.path().join("sessions"),
            provider: None,
        });

        let long: Vec<ChatMessage> = (0..SESSION_WINDOW + 10)
            .map(|i| ChatMessage::user(&format!("message {i}")))
            .collect();
        reasoner.save_session("con:scout", long);

        let loaded = reasoner.load_session("con:scout");
        assert_eq!(loaded.len(), SESSION_WINDOW);
        assert_eq!(loaded[0].content, "message 10");
        assert!(reasoner.load_session("con:other").is_empty());
    }
}
