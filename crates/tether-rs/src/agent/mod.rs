//! Turn orchestration: the [`Orchestrator`] state machine and its
//! supporting modules.
//!
//! - [`orchestrator::Orchestrator`]: one user turn from budget check to
//!   reply. Start here.
//! - [`config::OrchestratorConfig`]: thresholds, model limits, scoring
//!   tables, confidence gate, mutation policy, monitor toggle.
//! - [`events`]: [`EventHandler`] trait and [`OrchestratorEvent`] enum for
//!   observing turns. Includes [`LoggingHandler`], [`CompositeEventHandler`]
//!   and [`FnEventHandler`].
//! - [`execution`]: sequential plan execution with per-step results.
//! - [`monitor`]: [`PeriodicMonitor`], background budget checks delivered
//!   over a channel.

pub mod config;
pub mod events;
pub mod execution;
pub mod monitor;
pub mod orchestrator;

pub use config::{
    ContextConfig, ModelLimit, ModelLimits, MonitorConfig, OrchestratorConfig, Toggle,
};
pub use events::{
    CompositeEventHandler, EventHandler, EventResponse, FnEventHandler, LoggingHandler,
    NoopHandler, OrchestratorEvent,
};
pub use execution::{ExecutionReport, StepOutcome, StepResult};
pub use monitor::{MonitorReport, PeriodicMonitor, Snapshot};
pub use orchestrator::{Orchestrator, TurnOutcome, TurnState};
