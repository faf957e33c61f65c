//! Context budget management and predictive tool orchestration for LLM
//! coding agents.
//!
//! `tether-rs` sits between a conversational front end and a reply-generating
//! model. Every user turn flows through one pipeline, driven by the
//! [`Orchestrator`](agent::orchestrator::Orchestrator):
//!
//! 1. **Budget check.** [`context::budget`] estimates the token cost of the
//!    running conversation and decides whether it must shrink now, or soon.
//! 2. **Reduction.** [`context::manager`] extracts salient knowledge from the
//!    full history into a bounded [`KnowledgeStore`](context::knowledge::KnowledgeStore),
//!    then [`context::reducer`] filters, deduplicates, compresses and
//!    summarizes the message list under a [`ReductionPolicy`](context::reducer::ReductionPolicy).
//! 3. **Prediction.** [`predict::intent`] classifies the user's goal,
//!    [`predict::selector`] ranks registered tools for it, and
//!    [`predict::planner`] synthesizes a prioritized execution plan.
//! 4. **Execution.** Confident plans are executed step by step through the
//!    [`ToolSet`](tools::core::ToolSet); results are appended as tool messages.
//! 5. **Reply.** A [`ReplyClient`](api::ReplyClient) generates the answer.
//!
//! ```ignore
//! use tether_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").map_err(|e| e.to_string())?;
//!     let client = OpenRouterClient::new(api_key)?;
//!     let tools = ToolSet::new().with_common_tools(".");
//!     let config = OrchestratorConfig::new("anthropic/claude-sonnet-4");
//!
//!     let mut orchestrator = Orchestrator::new(&client, &tools, config)
//!         .map_err(|e| e.to_string())?
//!         .with_event_handler(&LoggingHandler);
//!
//!     let outcome = orchestrator
//!         .handle_turn("Why does the login service return 500?", &CancellationToken::new())
//!         .await?;
//!     println!("{}", outcome.reply);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | [`Orchestrator`](agent::orchestrator::Orchestrator) state machine, config, events, periodic monitor |
//! | [`context`] | Budget monitor, knowledge extraction and store, reduction strategies, cleanup manager |
//! | [`predict`] | Intent classifier, tool selector, execution planner |
//! | [`tools`] | [`Tool`](tools::core::Tool) trait, [`ToolSet`](tools::core::ToolSet), built-in file and shell tools |
//! | [`api`] | [`ReplyClient`](api::ReplyClient) seam and retry policy |
//! | [`error`] | [`PipelineError`](error::PipelineError) |
//!
//! Token counts everywhere are estimates; intent classification is a
//! deterministic keyword heuristic, not model inference.

pub mod agent;
pub mod api;
pub mod context;
pub mod error;
pub mod predict;
pub mod prelude;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for reply generation.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

/// Default completion length for replies.
pub const DEFAULT_REPLY_MAX_TOKENS: u32 = 2048;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Tool parameter schemas are built with this and
/// validated with `jsonschema` before each invocation.
///
/// # Example
///
/// ```
/// use tether_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct GrepArgs {
///     pattern: String,
///     #[serde(default)]
///     path: Option<String>,
/// }
///
/// let schema = json_schema_for::<GrepArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"pattern".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Model => write!(f, "model"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation: a role and an ordered list of text parts.
///
/// Messages are never edited after they are appended to a conversation.
/// Reduction produces new messages instead.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<String>,
}

impl Message {
    pub fn new(role: MessageRole, parts: Vec<String>) -> Self {
        Self { role, parts }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![text.into()])
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Model, vec![text.into()])
    }

    pub fn tool(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Tool, vec![text.into()])
    }

    /// All parts joined with newlines.
    pub fn text(&self) -> String {
        self.parts.join("\n")
    }

    /// Total character count across parts.
    pub fn char_count(&self) -> usize {
        self.parts.iter().map(|p| p.chars().count()).sum()
    }
}

// ── Chat wire types ────────────────────────────────────────────────

/// Chat completion request body for the OpenRouter API.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// A message in OpenAI chat format. Our `model` role is sent as `assistant`;
/// tool output is sent as a `user` message prefixed with `[tool]` since no
/// function-call ids exist on our side.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        let (role, content) = match msg.role {
            MessageRole::User => ("user", msg.text()),
            MessageRole::Model => ("assistant", msg.text()),
            MessageRole::Tool => ("user", format!("[tool]\n{}", msg.text())),
        };
        Self {
            role: role.to_string(),
            content,
        }
    }
}

#[derive(Deserialize)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    usage: Option<UsageInfo>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Deserialize)]
struct RawMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Token usage reported by the API.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
    pub(crate) system_prompt: Option<String>,
    pub(crate) retry: api::RetryConfig,
}

impl OpenRouterClient {
    /// Create a new client for [`DEFAULT_MODEL`].
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("tether-rs/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_REPLY_MAX_TOKENS,
            system_prompt: None,
            retry: api::RetryConfig::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Prepend a system message to every request.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_retry(mut self, retry: api::RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The model identifier requests are sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the request body for a conversation.
    pub fn build_request(&self, messages: &[Message]) -> ChatRequest {
        let mut wire: Vec<ChatMessage> = Vec::with_capacity(messages.len() + 1);
        if let Some(ref system) = self.system_prompt {
            wire.push(ChatMessage {
                role: "system".into(),
                content: system.clone(),
            });
        }
        wire.extend(messages.iter().map(ChatMessage::from));
        ChatRequest {
            model: self.model.clone(),
            messages: wire,
            max_tokens: self.max_tokens,
            temperature: 0.3,
        }
    }

    /// Send a chat completion request and return the reply text.
    pub async fn chat(&self, body: &ChatRequest) -> Result<String, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "tether-rs")
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("OpenRouter API error: {}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| "Empty LLM response".to_string())
    }
}
