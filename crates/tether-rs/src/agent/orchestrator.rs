//! The per-turn state machine.
//!
//! ```text
//! Idle → BudgetCheck → (ReduceContext)? → Classify → SelectTools → Plan
//!      → (Execute)? → Reply → Idle
//! ```
//!
//! The [`Orchestrator`] owns the conversation and is its only writer. A
//! turn checks the budget and reduces the history if needed, predicts what
//! the user wants, runs the predicted tool steps when the plan is
//! confident enough, and finally asks the [`ReplyClient`] for the answer.
//!
//! Failures before the reply never abort the turn. A reduction error means
//! no reduction this turn. A classification, selection or planning error
//! means the reply is generated without a plan. Tool failures are recorded
//! per step. Only the reply client's error is returned to the caller.

use super::config::OrchestratorConfig;
use super::events::{EventHandler, NoopHandler, OrchestratorEvent};
use super::execution::{self, ExecutionReport};
use super::monitor::{MonitorReport, PeriodicMonitor, Snapshot};
use crate::Message;
use crate::api::ReplyClient;
use crate::context::budget::{BudgetState, BudgetVerdict};
use crate::context::knowledge::SharedKnowledgeStore;
use crate::context::manager::ContextManager;
use crate::context::reducer::ReductionStats;
use crate::error::{PipelineError, PipelineResult};
use crate::predict::{
    ExecutionPlan, ExecutionPlanner, Intent, IntentClassifier, RankedTool, ToolSelector,
};
use crate::tools::core::ToolSet;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// ── Turn state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    BudgetCheck,
    ReduceContext,
    Classify,
    SelectTools,
    Plan,
    Execute,
    Reply,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::BudgetCheck => "budget-check",
            TurnState::ReduceContext => "reduce-context",
            TurnState::Classify => "classify",
            TurnState::SelectTools => "select-tools",
            TurnState::Plan => "plan",
            TurnState::Execute => "execute",
            TurnState::Reply => "reply",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Turn outcome ───────────────────────────────────────────────────

/// Everything that happened during one [`Orchestrator::handle_turn`].
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    /// Budget at the start of the turn, before any reduction.
    pub budget: BudgetState,
    pub reduction: Option<ReductionStats>,
    pub intent: Option<Intent>,
    pub plan: Option<ExecutionPlan>,
    /// Present only when the plan passed the confidence gate.
    pub execution: Option<ExecutionReport>,
}

impl TurnOutcome {
    pub fn plan_executed(&self) -> bool {
        self.execution.is_some()
    }
}

/// Prediction results, kept even when a later stage fails.
#[derive(Default)]
struct Prediction {
    intent: Option<Intent>,
    ranked: Option<Vec<RankedTool>>,
    plan: Option<ExecutionPlan>,
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Drives one user turn at a time through the pipeline.
///
/// ```ignore
/// let mut orchestrator = Orchestrator::new(&client, &tools, config)?
///     .with_event_handler(&LoggingHandler);
/// let outcome = orchestrator.handle_turn("fix the bug in src/auth.rs", &cancel).await?;
/// ```
pub struct Orchestrator<'a> {
    client: &'a dyn ReplyClient,
    tools: &'a ToolSet,
    event_handler: &'a dyn EventHandler,
    config: OrchestratorConfig,
    manager: ContextManager,
    classifier: IntentClassifier,
    selector: ToolSelector,
    planner: ExecutionPlanner,
    model_limit: usize,
    messages: Vec<Message>,
    generation: u64,
    state: TurnState,
    snapshots: watch::Sender<Snapshot>,
    monitor: Option<(PeriodicMonitor, mpsc::Receiver<MonitorReport>)>,
}

impl<'a> Orchestrator<'a> {
    /// Build an orchestrator. Fails when the classifier patterns or the
    /// selector weights are invalid.
    ///
    /// The context limit is resolved from the client's model.
    pub fn new(
        client: &'a dyn ReplyClient,
        tools: &'a ToolSet,
        config: OrchestratorConfig,
    ) -> PipelineResult<Self> {
        let classifier = IntentClassifier::new(config.classifier.clone())?;
        let selector = ToolSelector::new(config.selector.clone())?;
        let planner = ExecutionPlanner::new(config.planner.clone());
        let manager = ContextManager::new(&config.context)
            .with_force_on_projection(config.preempt_on_projection);
        let model_limit = config.model_limits.resolve(client.model());
        let (snapshots, _) = watch::channel(Snapshot::default());
        debug!(
            "Orchestrator ready: model {}, limit {model_limit}, {} tools",
            client.model(),
            tools.len()
        );

        Ok(Self {
            client,
            tools,
            event_handler: &NoopHandler,
            config,
            manager,
            classifier,
            selector,
            planner,
            model_limit,
            messages: Vec::new(),
            generation: 0,
            state: TurnState::Idle,
            snapshots,
            monitor: None,
        })
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Start from an existing history.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self.bump_generation();
        self
    }

    /// Share a knowledge store (e.g. one loaded from a snapshot file).
    pub fn with_knowledge_store(mut self, store: SharedKnowledgeStore) -> Self {
        self.manager = self.manager.with_store(store);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Incremented every time the message list changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn model_limit(&self) -> usize {
        self.model_limit
    }

    pub fn knowledge(&self) -> SharedKnowledgeStore {
        self.manager.store()
    }

    pub fn budget(&self) -> BudgetState {
        self.manager.usage(&self.messages, self.model_limit)
    }

    /// Receiver of conversation snapshots, published after every change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// Run the budget-triggered cleanup now.
    ///
    /// Returns the reduction statistics when the list was replaced. A
    /// failing reduction, or one that changes nothing, leaves the list and
    /// its generation untouched and returns `None`.
    pub fn check_and_cleanup(&mut self) -> Option<ReductionStats> {
        match self.manager.cleanup_if_needed(&self.messages, self.model_limit) {
            Ok(Some(outcome)) => {
                let store_len = self.store_len();
                self.event_handler
                    .on_event(&OrchestratorEvent::KnowledgeExtracted {
                        extracted: outcome.knowledge.len(),
                        store_len,
                    });
                if !outcome.stats.changed {
                    debug!("Cleanup left the history unchanged");
                    return None;
                }
                self.event_handler
                    .on_event(&OrchestratorEvent::ContextReduced {
                        stats: &outcome.stats,
                    });
                self.replace_messages(outcome.messages);
                Some(outcome.stats)
            }
            Ok(None) => None,
            Err(error) => {
                self.event_handler
                    .on_event(&OrchestratorEvent::ReductionFailed { error: &error });
                None
            }
        }
    }

    /// Handle one user turn.
    ///
    /// On success the history ends with the user message followed by the
    /// model reply. On a reply client error the user message is not
    /// appended; tool results from this turn stay in the history.
    pub async fn handle_turn(
        &mut self,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, String> {
        self.ensure_monitor();
        self.drain_monitor_reports();

        self.transition(TurnState::BudgetCheck);
        let budget = self.budget();
        let verdict = self.manager.monitor().verdict(&budget);
        self.event_handler
            .on_event(&OrchestratorEvent::BudgetChecked {
                state: &budget,
                verdict,
            });

        let reduce = match verdict {
            BudgetVerdict::Exceeded => true,
            BudgetVerdict::Projected => self.config.preempt_on_projection,
            BudgetVerdict::Within => false,
        };
        let reduction = if reduce {
            self.transition(TurnState::ReduceContext);
            self.check_and_cleanup()
        } else {
            None
        };

        // Prediction failures fall back to a plain reply.
        let prediction = self.predict(user_text);

        let execution = match &prediction.plan {
            Some(plan) if plan.confidence > self.config.plan_confidence_gate => {
                self.transition(TurnState::Execute);
                let report = execution::execute_plan(
                    plan,
                    self.tools,
                    self.config.allow_mutating_steps,
                    cancel,
                    self.event_handler,
                )
                .await;
                info!("Plan executed: {}", report.to_log_string());
                let tool_messages = report.messages();
                if !tool_messages.is_empty() {
                    self.messages.extend(tool_messages);
                    self.bump_generation();
                }
                Some(report)
            }
            Some(plan) => {
                self.event_handler.on_event(&OrchestratorEvent::PlanSkipped {
                    confidence: plan.confidence,
                    gate: self.config.plan_confidence_gate,
                });
                None
            }
            None => None,
        };

        self.transition(TurnState::Reply);
        let reply = match self.client.generate(&self.messages, user_text).await {
            Ok(reply) => reply,
            Err(e) => {
                self.transition(TurnState::Idle);
                return Err(e);
            }
        };
        self.event_handler
            .on_event(&OrchestratorEvent::ReplyGenerated { reply: &reply });

        self.messages.push(Message::user(user_text));
        self.messages.push(Message::model(reply.clone()));
        self.bump_generation();
        self.transition(TurnState::Idle);

        Ok(TurnOutcome {
            reply,
            budget,
            reduction,
            intent: prediction.intent,
            plan: prediction.plan,
            execution,
        })
    }

    /// Stop the periodic monitor, if running.
    pub async fn shutdown(&mut self) {
        if let Some((monitor, _)) = self.monitor.take() {
            monitor.stop().await;
        }
    }

    // ── Stages ──

    fn predict(&mut self, user_text: &str) -> Prediction {
        let mut prediction = Prediction::default();
        if let Err((stage, error)) = self.run_prediction(user_text, &mut prediction) {
            self.event_handler
                .on_event(&OrchestratorEvent::PredictionFailed {
                    stage,
                    error: &error,
                });
        }
        prediction
    }

    fn run_prediction(
        &mut self,
        user_text: &str,
        out: &mut Prediction,
    ) -> Result<(), (TurnState, PipelineError)> {
        self.transition(TurnState::Classify);
        let intent = self
            .classifier
            .classify(user_text, &self.messages)
            .map_err(|e| (TurnState::Classify, e))?;
        self.event_handler
            .on_event(&OrchestratorEvent::IntentClassified { intent: &intent });
        let intent = out.intent.insert(intent);

        self.transition(TurnState::SelectTools);
        let window = self.config.classifier.context_window;
        let mut recent: Vec<Message> =
            self.messages[self.messages.len().saturating_sub(window)..].to_vec();
        recent.push(Message::user(user_text));
        let ranked = self
            .selector
            .select_top(intent, &recent, &self.tools.list())
            .map_err(|e| (TurnState::SelectTools, e))?;
        self.event_handler
            .on_event(&OrchestratorEvent::ToolsRanked { ranked: &ranked });
        let ranked = out.ranked.insert(ranked);

        self.transition(TurnState::Plan);
        let plan = self
            .planner
            .plan(intent, ranked, user_text)
            .map_err(|e| (TurnState::Plan, e))?;
        self.event_handler
            .on_event(&OrchestratorEvent::PlanCreated { plan: &plan });
        out.plan = Some(plan);
        Ok(())
    }

    // ── Monitor ──

    fn ensure_monitor(&mut self) {
        if self.monitor.is_some() {
            return;
        }
        if let Some(config) = self.config.monitor.active() {
            let (monitor, reports) = PeriodicMonitor::spawn(
                self.manager.clone(),
                self.snapshots.subscribe(),
                self.model_limit,
                config,
            );
            self.monitor = Some((monitor, reports));
        }
    }

    /// Apply pending monitor reports computed for the current generation.
    fn drain_monitor_reports(&mut self) {
        let mut pending = Vec::new();
        if let Some((_, reports)) = self.monitor.as_mut() {
            while let Ok(report) = reports.try_recv() {
                pending.push(report);
            }
        }
        for report in pending {
            self.apply_monitor_report(report);
        }
    }

    /// Swap in a monitor report if it matches the current generation.
    ///
    /// Returns whether the report was applied.
    pub fn apply_monitor_report(&mut self, report: MonitorReport) -> bool {
        if report.generation != self.generation {
            self.event_handler
                .on_event(&OrchestratorEvent::MonitorReportDiscarded {
                    report_generation: report.generation,
                    current_generation: self.generation,
                });
            return false;
        }
        self.event_handler
            .on_event(&OrchestratorEvent::MonitorReportApplied {
                generation: report.generation,
                stats: &report.outcome.stats,
            });
        self.replace_messages(report.outcome.messages);
        true
    }

    // ── Helpers ──

    fn transition(&mut self, to: TurnState) {
        let from = self.state;
        self.state = to;
        self.event_handler
            .on_event(&OrchestratorEvent::StateChanged { from, to });
    }

    fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.bump_generation();
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        self.snapshots.send_replace(Snapshot {
            generation: self.generation,
            messages: Arc::new(self.messages.clone()),
        });
    }

    fn store_len(&self) -> usize {
        self.manager
            .store()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
