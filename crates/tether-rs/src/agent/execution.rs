//! Sequential execution of plan steps.
//!
//! Every step produces a [`StepResult`]; nothing here returns an error. A
//! failing, panicking, timed-out or unknown tool is recorded and the next
//! step runs. Cancellation marks the current and all remaining steps
//! [`StepOutcome::Cancelled`].

use super::events::{EventHandler, EventResponse, OrchestratorEvent};
use crate::Message;
use crate::predict::{ExecutionPlan, ExecutionStep};
use crate::tools::core::ToolSet;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded(String),
    Failed(String),
    Skipped(String),
    Cancelled,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// Position of the step in the plan.
    pub index: usize,
    pub tool: String,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

impl StepResult {
    /// The tool message appended to the conversation, if the step ran.
    ///
    /// Skipped and cancelled steps leave no trace in the history.
    pub fn to_message(&self) -> Option<Message> {
        match &self.outcome {
            StepOutcome::Succeeded(output) => {
                Some(Message::tool(format!("[{}] {output}", self.tool)))
            }
            StepOutcome::Failed(error) => {
                Some(Message::tool(format!("[{}] Error: {error}", self.tool)))
            }
            StepOutcome::Skipped(_) | StepOutcome::Cancelled => None,
        }
    }
}

/// Results of executing one plan, in step order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub results: Vec<StepResult>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Succeeded(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Skipped(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Cancelled))
    }

    pub fn total_elapsed(&self) -> Duration {
        self.results.iter().map(|r| r.elapsed).sum()
    }

    /// Tool messages for every step that ran.
    pub fn messages(&self) -> Vec<Message> {
        self.results.iter().filter_map(StepResult::to_message).collect()
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "{} ok, {} failed, {} skipped, {} cancelled in {:.1}s",
            self.succeeded(),
            self.failed(),
            self.skipped(),
            self.cancelled(),
            self.total_elapsed().as_secs_f64()
        )
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Run every step of `plan` in order through `tools`.
pub(crate) async fn execute_plan(
    plan: &ExecutionPlan,
    tools: &ToolSet,
    allow_mutations: bool,
    cancel: &CancellationToken,
    event_handler: &dyn EventHandler,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    for (index, step) in plan.steps.iter().enumerate() {
        let result = if cancel.is_cancelled() {
            StepResult {
                index,
                tool: step.tool.clone(),
                outcome: StepOutcome::Cancelled,
                elapsed: Duration::ZERO,
            }
        } else {
            run_step(index, step, tools, allow_mutations, cancel, event_handler).await
        };
        event_handler.on_event(&OrchestratorEvent::StepFinished { result: &result });
        report.results.push(result);
    }
    debug!("Plan executed: {}", report.to_log_string());
    report
}

async fn run_step(
    index: usize,
    step: &ExecutionStep,
    tools: &ToolSet,
    allow_mutations: bool,
    cancel: &CancellationToken,
    event_handler: &dyn EventHandler,
) -> StepResult {
    let finish = |outcome, elapsed| StepResult {
        index,
        tool: step.tool.clone(),
        outcome,
        elapsed,
    };

    if step.mutation && !allow_mutations {
        return finish(
            StepOutcome::Skipped("mutating steps are disabled".into()),
            Duration::ZERO,
        );
    }
    if let Some(EventResponse::Deny(reason)) =
        event_handler.on_event(&OrchestratorEvent::ApprovalRequired { index, step })
    {
        return finish(StepOutcome::Skipped(format!("denied: {reason}")), Duration::ZERO);
    }

    event_handler.on_event(&OrchestratorEvent::StepStarted { index, step });
    let start = Instant::now();
    let call = tools.invoke(&step.tool, step.parameters.clone(), cancel);
    let outcome = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(output)) => StepOutcome::Succeeded(output),
        Ok(Err(_)) if cancel.is_cancelled() => StepOutcome::Cancelled,
        Ok(Err(error)) => StepOutcome::Failed(error),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!("Tool {} panicked: {message}", step.tool);
            StepOutcome::Failed(format!("tool '{}' panicked: {message}", step.tool))
        }
    };
    finish(outcome, start.elapsed())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
