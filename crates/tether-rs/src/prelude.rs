//! Convenience re-exports for common `tether-rs` types.
//!
//! ```ignore
//! use tether_rs::prelude::*;
//! ```
//!
//! Covers what a front end needs to run turns: the client, messages, the
//! orchestrator and its config, event handlers, and the tool set.
//! Reduction strategies and scoring tables are left to their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::api::ReplyClient;
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::{Message, MessageRole, OpenRouterClient, json_schema_for};

// ── Orchestration ───────────────────────────────────────────────────
pub use crate::agent::{
    CompositeEventHandler, ContextConfig, EventHandler, EventResponse, ExecutionReport,
    FnEventHandler, LoggingHandler, NoopHandler, Orchestrator, OrchestratorConfig,
    OrchestratorEvent, StepOutcome, Toggle, TurnOutcome, TurnState,
};

// ── Context and prediction ──────────────────────────────────────────
pub use crate::context::knowledge::{KnowledgeEntry, KnowledgeStore, SharedKnowledgeStore};
pub use crate::predict::{ExecutionPlan, Intent, IntentType};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{FnTool, Tool, ToolCategory, ToolDef, ToolFuture, ToolSet, parse_tool_args};

pub use tokio_util::sync::CancellationToken;
