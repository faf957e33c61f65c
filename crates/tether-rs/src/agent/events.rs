//! Events and handlers for the [`Orchestrator`](super::orchestrator::Orchestrator).
//!
//! Every state transition and decision of a turn is reported as an
//! [`OrchestratorEvent`]. Callers implement [`EventHandler`] to observe them
//! for logging, metrics or approval workflows.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget turns |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | Custom `impl EventHandler` | Full control (approval gates, metrics) |

use super::execution::{StepOutcome, StepResult};
use super::orchestrator::TurnState;
use crate::context::budget::{BudgetState, BudgetVerdict};
use crate::context::reducer::ReductionStats;
use crate::error::PipelineError;
use crate::predict::{ExecutionPlan, ExecutionStep, Intent, RankedTool};
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the orchestrator during a turn.
#[derive(Debug)]
pub enum OrchestratorEvent<'a> {
    /// The turn state machine moved to a new state.
    StateChanged { from: TurnState, to: TurnState },
    /// Budget checked at the start of a turn.
    BudgetChecked {
        state: &'a BudgetState,
        verdict: BudgetVerdict,
    },
    /// Knowledge was extracted from the pre-reduction history.
    KnowledgeExtracted { extracted: usize, store_len: usize },
    /// The message list was replaced by a reduced one.
    ContextReduced { stats: &'a ReductionStats },
    /// Reduction failed; the turn continues with the unreduced list.
    ReductionFailed { error: &'a PipelineError },
    IntentClassified { intent: &'a Intent },
    ToolsRanked { ranked: &'a [RankedTool] },
    PlanCreated { plan: &'a ExecutionPlan },
    /// The plan was below the confidence gate and will not execute.
    PlanSkipped { confidence: f64, gate: f64 },
    /// Classification, selection or planning failed; the reply is generated
    /// without a plan.
    PredictionFailed {
        stage: TurnState,
        error: &'a PipelineError,
    },
    /// A step is about to run. Handlers may return
    /// [`EventResponse::Deny`] to skip it.
    ApprovalRequired {
        index: usize,
        step: &'a ExecutionStep,
    },
    StepStarted {
        index: usize,
        step: &'a ExecutionStep,
    },
    StepFinished { result: &'a StepResult },
    /// A periodic monitor report replaced the message list.
    MonitorReportApplied {
        generation: u64,
        stats: &'a ReductionStats,
    },
    /// A monitor report was computed for an older list and dropped.
    MonitorReportDiscarded {
        report_generation: u64,
        current_generation: u64,
    },
    ReplyGenerated { reply: &'a str },
}

/// Response from an event handler for events that support feedback.
///
/// Only [`OrchestratorEvent::ApprovalRequired`] reads the response; `None`
/// approves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventResponse {
    Approve,
    /// Skip the step with a reason, recorded in its result.
    Deny(String),
}

/// Handler for orchestrator events.
///
/// The default implementation returns `None` (approve, no side effects).
///
/// # Example
///
/// ```ignore
/// struct NoShell;
///
/// impl EventHandler for NoShell {
///     fn on_event(&self, event: &OrchestratorEvent<'_>) -> Option<EventResponse> {
///         if let OrchestratorEvent::ApprovalRequired { step, .. } = event
///             && step.tool == "shell"
///         {
///             return Some(EventResponse::Deny("shell disabled".into()));
///         }
///         None
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &OrchestratorEvent<'_>) -> Option<EventResponse> {
        let _ = event;
        None
    }
}

/// A no-op event handler that approves everything.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let OrchestratorEvent::PlanCreated { plan } = event {
///         println!("{}", plan.summary());
///     }
///     None
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&OrchestratorEvent<'_>) -> Option<EventResponse> + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&OrchestratorEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&OrchestratorEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    fn on_event(&self, event: &OrchestratorEvent<'_>) -> Option<EventResponse> {
        (self.0)(event)
    }
}

/// Delegates to multiple inner handlers in registration order.
///
/// Every handler sees every event; the first non-`None` response wins.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(interactive, ApprovalPrompt::new());
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &OrchestratorEvent<'_>) -> Option<EventResponse> {
        let mut response = None;
        for handler in &self.handlers {
            let r = handler.on_event(event);
            if response.is_none() {
                response = r;
            }
        }
        response
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &OrchestratorEvent<'_>) -> Option<EventResponse> {
        match event {
            OrchestratorEvent::StateChanged { from, to } => {
                debug!("State: {from} → {to}");
            }
            OrchestratorEvent::BudgetChecked { state, verdict } => {
                info!("Budget {verdict:?}: {}", state.to_log_string());
            }
            OrchestratorEvent::KnowledgeExtracted {
                extracted,
                store_len,
            } => {
                debug!("Extracted {extracted} knowledge entries (store: {store_len})");
            }
            OrchestratorEvent::ContextReduced { stats } => {
                info!("Context reduced: {}", stats.to_log_string());
            }
            OrchestratorEvent::ReductionFailed { error } => {
                warn!("Context reduction failed, keeping full history: {error}");
            }
            OrchestratorEvent::IntentClassified { intent } => {
                info!(
                    "Intent: {} ({:.2}), targets: [{}]",
                    intent.intent_type,
                    intent.confidence,
                    intent.targets.iter().cloned().collect::<Vec<_>>().join(", ")
                );
            }
            OrchestratorEvent::ToolsRanked { ranked } => {
                debug!(
                    "Top tools: {}",
                    ranked
                        .iter()
                        .map(|r| format!("{}={:.2}", r.tool.name, r.effectiveness))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            OrchestratorEvent::PlanCreated { plan } => {
                info!("Plan: {}", plan.summary());
            }
            OrchestratorEvent::PlanSkipped { confidence, gate } => {
                info!("Plan not executed: confidence {confidence:.2} ≤ gate {gate:.2}");
            }
            OrchestratorEvent::PredictionFailed { stage, error } => {
                warn!("Prediction failed in {stage}, replying without a plan: {error}");
            }
            OrchestratorEvent::ApprovalRequired { index, step } => {
                debug!("Step {index} ({}) awaiting approval", step.tool);
            }
            OrchestratorEvent::StepStarted { index, step } => {
                debug!("Step {index}: {} {}", step.tool, step.parameters);
            }
            OrchestratorEvent::StepFinished { result } => match &result.outcome {
                StepOutcome::Succeeded(output) => debug!(
                    "Step {} ({}) ok: {} bytes in {:.0}ms",
                    result.index,
                    result.tool,
                    output.len(),
                    result.elapsed.as_secs_f64() * 1000.0
                ),
                StepOutcome::Failed(error) => {
                    warn!("Step {} ({}) failed: {error}", result.index, result.tool)
                }
                StepOutcome::Skipped(reason) => {
                    debug!("Step {} ({}) skipped: {reason}", result.index, result.tool)
                }
                StepOutcome::Cancelled => {
                    debug!("Step {} ({}) cancelled", result.index, result.tool)
                }
            },
            OrchestratorEvent::MonitorReportApplied { generation, stats } => {
                info!(
                    "Applied background reduction for generation {generation}: {}",
                    stats.to_log_string()
                );
            }
            OrchestratorEvent::MonitorReportDiscarded {
                report_generation,
                current_generation,
            } => {
                debug!(
                    "Discarded stale monitor report (generation {report_generation}, current {current_generation})"
                );
            }
            OrchestratorEvent::ReplyGenerated { reply } => {
                let preview: String = reply.chars().take(200).collect();
                debug!(
                    "Reply: {preview}{}",
                    if reply.chars().count() > 200 { "..." } else { "" }
                );
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state_event() -> OrchestratorEvent<'static> {
        OrchestratorEvent::StateChanged {
            from: TurnState::Idle,
            to: TurnState::BudgetCheck,
        }
    }

    #[test]
    fn noop_handler_approves() {
        assert!(NoopHandler.on_event(&state_event()).is_none());
    }

    #[test]
    fn fn_handler_calls_closure() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handler = FnEventHandler::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            None
        });
        handler.on_event(&state_event());
        handler.on_event(&state_event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn composite_dispatches_to_all_and_returns_first_response() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(|_| Some(EventResponse::Deny("first".into()))))
            .with(FnEventHandler::new(|_| Some(EventResponse::Approve)))
            .with(FnEventHandler::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                None
            }));
        assert_eq!(
            handler.on_event(&state_event()),
            Some(EventResponse::Deny("first".into()))
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composite_conditional_builders() {
        let handler = CompositeEventHandler::new()
            .with(LoggingHandler)
            .with_if(false, NoopHandler)
            .with_opt(None::<NoopHandler>)
            .with_opt(Some(NoopHandler));
        assert_eq!(handler.len(), 2);
        assert!(CompositeEventHandler::default().is_empty());
    }

    #[test]
    fn logging_handler_never_responds() {
        let stats = ReductionStats::default();
        assert!(
            LoggingHandler
                .on_event(&OrchestratorEvent::ContextReduced { stats: &stats })
                .is_none()
        );
        assert!(
            LoggingHandler
                .on_event(&OrchestratorEvent::ReplyGenerated { reply: "done" })
                .is_none()
        );
    }
}
