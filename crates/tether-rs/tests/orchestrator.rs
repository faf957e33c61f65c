//! End-to-end turns through the orchestrator with in-process doubles for
//! the reply client and the tools.

use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tether_rs::agent::{
    ContextConfig, EventResponse, FnEventHandler, Orchestrator, OrchestratorConfig,
    OrchestratorEvent, StepOutcome, TurnState,
};
use tether_rs::api::{ReplyClient, ReplyFuture};
use tether_rs::predict::IntentType;
use tether_rs::tools::{FnTool, ToolCategory, ToolDef, ToolSet};
use tether_rs::{Message, MessageRole};
use tokio_util::sync::CancellationToken;

// ── Doubles ────────────────────────────────────────────────────────

/// Records what it was asked and answers with a fixed reply.
#[derive(Default)]
struct RecordingClient {
    calls: Mutex<Vec<(Vec<Message>, String)>>,
    fail: bool,
}

impl RecordingClient {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn last_messages(&self) -> Vec<Message> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|(m, _)| m.clone())
            .unwrap_or_default()
    }
}

impl ReplyClient for RecordingClient {
    fn generate<'a>(&'a self, messages: &'a [Message], user_text: &'a str) -> ReplyFuture<'a> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((messages.to_vec(), user_text.to_string()));
            if self.fail {
                Err("API error (503): overloaded".to_string())
            } else {
                Ok(format!("answer to: {user_text}"))
            }
        })
    }

    fn model(&self) -> &str {
        "anthropic/claude-sonnet-4"
    }
}

fn path_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "path": { "type": "string" } },
        "required": ["path"]
    })
}

fn read_tool(calls: Arc<Mutex<Vec<String>>>, result: Result<String, String>) -> FnTool {
    FnTool::new(
        ToolDef::new("read_file", "Read a file", path_schema()),
        move |args: Value| {
            let calls = calls.clone();
            let result = result.clone();
            async move {
                calls
                    .lock()
                    .unwrap()
                    .push(args["path"].as_str().unwrap_or_default().to_string());
                result
            }
        },
    )
    .with_category(ToolCategory::Read)
}

fn write_tool(calls: Arc<Mutex<Vec<String>>>) -> FnTool {
    FnTool::new(
        ToolDef::new("write_file", "Write a file", path_schema()),
        move |args: Value| {
            let calls = calls.clone();
            async move {
                calls
                    .lock()
                    .unwrap()
                    .push(args["path"].as_str().unwrap_or_default().to_string());
                Ok::<_, String>("written".to_string())
            }
        },
    )
    .with_category(ToolCategory::Edit)
    .mutation(true)
}

/// Debug intent with a single file target: one read step, confidence
/// 0.95 * 0.9 * 0.9 ≈ 0.77.
const DEBUG_PROMPT: &str = "Why does src/lib.rs panic?";

/// Code-change intent: an edit step and a read step on src/server.rs.
const CHANGE_PROMPT: &str = "Add logging to src/server.rs";

// ── Turns ──────────────────────────────────────────────────────────

#[tokio::test]
async fn confident_plan_executes_and_feeds_reply() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tools = ToolSet::new().with(read_tool(calls.clone(), Ok("pub fn run() {}".into())));
    let client = RecordingClient::default();
    let mut orch = Orchestrator::new(&client, &tools, OrchestratorConfig::default()).unwrap();

    let outcome = orch
        .handle_turn(DEBUG_PROMPT, &CancellationToken::new())
        .await
        .unwrap();

    let intent = outcome.intent.as_ref().unwrap();
    assert_eq!(intent.intent_type, IntentType::Debug);
    assert!(intent.targets.contains("src/lib.rs"));
    let plan = outcome.plan.as_ref().unwrap();
    assert!(plan.confidence > 0.6);
    let report = outcome.execution.as_ref().unwrap();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(*calls.lock().unwrap(), vec!["src/lib.rs".to_string()]);

    // The reply saw the tool result; the history ends user, model.
    let seen = client.last_messages();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].role, MessageRole::Tool);
    assert!(seen[0].text().contains("pub fn run() {}"));

    let history = orch.messages();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1], Message::user(DEBUG_PROMPT));
    assert_eq!(history[2].role, MessageRole::Model);
    assert_eq!(outcome.reply, format!("answer to: {DEBUG_PROMPT}"));
}

#[tokio::test]
async fn failing_tool_is_recorded_and_reply_still_generated() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tools = ToolSet::new().with(read_tool(calls, Err("permission denied".into())));
    let client = RecordingClient::default();
    let mut orch = Orchestrator::new(&client, &tools, OrchestratorConfig::default()).unwrap();

    let outcome = orch
        .handle_turn(DEBUG_PROMPT, &CancellationToken::new())
        .await
        .unwrap();

    let report = outcome.execution.unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(
        report.results[0].outcome,
        StepOutcome::Failed("permission denied".into())
    );
    let seen = client.last_messages();
    assert_eq!(seen[0].text(), "[read_file] Error: permission denied");
    assert!(!outcome.reply.is_empty());
}

#[tokio::test]
async fn plan_below_gate_is_not_executed() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tools = ToolSet::new().with(read_tool(calls.clone(), Ok("x".into())));
    let client = RecordingClient::default();
    let config = OrchestratorConfig::default().with_plan_confidence_gate(0.99);
    let skipped = Arc::new(Mutex::new(None));
    let seen = skipped.clone();
    let handler = FnEventHandler::new(move |event| {
        if let OrchestratorEvent::PlanSkipped { confidence, gate } = event {
            *seen.lock().unwrap() = Some((*confidence, *gate));
        }
        None
    });
    let mut orch = Orchestrator::new(&client, &tools, config)
        .unwrap()
        .with_event_handler(&handler);

    let outcome = orch
        .handle_turn(DEBUG_PROMPT, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.plan.is_some());
    assert!(!outcome.plan_executed());
    assert!(calls.lock().unwrap().is_empty());
    let (confidence, gate) = skipped.lock().unwrap().unwrap();
    assert!(confidence <= gate);
    assert_eq!(orch.messages().len(), 2);
}

#[tokio::test]
async fn blank_input_falls_back_to_plain_reply() {
    let tools = ToolSet::new();
    let client = RecordingClient::default();
    let failed_stage = Arc::new(Mutex::new(None));
    let seen = failed_stage.clone();
    let handler = FnEventHandler::new(move |event| {
        if let OrchestratorEvent::PredictionFailed { stage, .. } = event {
            *seen.lock().unwrap() = Some(*stage);
        }
        None
    });
    let mut orch = Orchestrator::new(&client, &tools, OrchestratorConfig::default())
        .unwrap()
        .with_event_handler(&handler);

    let outcome = orch.handle_turn("   ", &CancellationToken::new()).await.unwrap();

    assert!(outcome.intent.is_none());
    assert!(outcome.plan.is_none());
    assert!(outcome.execution.is_none());
    assert_eq!(*failed_stage.lock().unwrap(), Some(TurnState::Classify));
    assert_eq!(orch.messages().len(), 2);
}

#[tokio::test]
async fn mutating_steps_need_opt_in() {
    let reads = Arc::new(Mutex::new(Vec::new()));
    let writes = Arc::new(Mutex::new(Vec::new()));
    let tools = ToolSet::new()
        .with(read_tool(reads.clone(), Ok("fn serve() {}".into())))
        .with(write_tool(writes.clone()));
    let client = RecordingClient::default();
    let config = OrchestratorConfig::default().with_plan_confidence_gate(0.3);

    let mut orch = Orchestrator::new(&client, &tools, config.clone()).unwrap();
    let outcome = orch
        .handle_turn(CHANGE_PROMPT, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.intent.as_ref().unwrap().intent_type, IntentType::CodeChange);
    let report = outcome.execution.unwrap();
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.succeeded(), 1);
    assert!(writes.lock().unwrap().is_empty());
    assert_eq!(*reads.lock().unwrap(), vec!["src/server.rs".to_string()]);

    let mut orch =
        Orchestrator::new(&client, &tools, config.with_allow_mutating_steps(true)).unwrap();
    let outcome = orch
        .handle_turn(CHANGE_PROMPT, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.execution.unwrap().succeeded(), 2);
    assert_eq!(*writes.lock().unwrap(), vec!["src/server.rs".to_string()]);
}

#[tokio::test]
async fn handler_denial_skips_step() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tools = ToolSet::new().with(read_tool(calls.clone(), Ok("x".into())));
    let client = RecordingClient::default();
    let handler = FnEventHandler::new(|event| match event {
        OrchestratorEvent::ApprovalRequired { .. } => Some(EventResponse::Deny("review".into())),
        _ => None,
    });
    let mut orch = Orchestrator::new(&client, &tools, OrchestratorConfig::default())
        .unwrap()
        .with_event_handler(&handler);

    let outcome = orch
        .handle_turn(DEBUG_PROMPT, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.execution.unwrap().skipped(), 1);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_turn_skips_tools_but_replies() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tools = ToolSet::new().with(read_tool(calls.clone(), Ok("x".into())));
    let client = RecordingClient::default();
    let mut orch = Orchestrator::new(&client, &tools, OrchestratorConfig::default()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = orch.handle_turn(DEBUG_PROMPT, &cancel).await.unwrap();

    let report = outcome.execution.unwrap();
    assert_eq!(report.cancelled(), 1);
    assert!(calls.lock().unwrap().is_empty());
    assert!(client.last_messages().is_empty());
    assert_eq!(orch.messages().len(), 2);
}

#[tokio::test]
async fn reply_error_is_returned_without_appending_turn() {
    let tools = ToolSet::new();
    let client = RecordingClient::failing();
    let mut orch = Orchestrator::new(&client, &tools, OrchestratorConfig::default())
        .unwrap()
        .with_messages(vec![Message::user("earlier"), Message::model("reply")]);

    let err = orch
        .handle_turn("what next?", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.contains("503"));
    assert_eq!(orch.messages().len(), 2);
    assert_eq!(orch.state(), TurnState::Idle);
}

#[tokio::test]
async fn states_follow_the_pipeline() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tools = ToolSet::new().with(read_tool(calls, Ok("x".into())));
    let client = RecordingClient::default();
    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = states.clone();
    let handler = FnEventHandler::new(move |event| {
        if let OrchestratorEvent::StateChanged { to, .. } = event {
            seen.lock().unwrap().push(*to);
        }
        None
    });
    let mut orch = Orchestrator::new(&client, &tools, OrchestratorConfig::default())
        .unwrap()
        .with_event_handler(&handler);

    orch.handle_turn(DEBUG_PROMPT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        *states.lock().unwrap(),
        vec![
            TurnState::BudgetCheck,
            TurnState::Classify,
            TurnState::SelectTools,
            TurnState::Plan,
            TurnState::Execute,
            TurnState::Reply,
            TurnState::Idle,
        ]
    );
}

// ── Budget ─────────────────────────────────────────────────────────

/// Ten messages with two bulky tool listings the standard policy can excerpt.
fn long_history() -> Vec<Message> {
    (0..10)
        .map(|i| match i % 4 {
            0 | 2 => Message::user(format!(
                "Step {i}: Important: keep the retry budget at {i}. I need the tests to pass."
            )),
            1 => Message::tool(format!("listing {i}\n{}", "line\n".repeat(300))),
            _ => Message::model(format!("Acknowledged step {i}. Decision: proceed with plan {i}.")),
        })
        .collect()
}

fn tight_config() -> OrchestratorConfig {
    OrchestratorConfig::default().with_context(ContextConfig {
        fixed_token_threshold: 50,
        percentage_threshold: 0.1,
        ..ContextConfig::default()
    })
}

#[tokio::test]
async fn over_budget_history_is_reduced_before_prediction() {
    let tools = ToolSet::new();
    let client = RecordingClient::default();
    let mut orch = Orchestrator::new(&client, &tools, tight_config())
        .unwrap()
        .with_messages(long_history());

    let outcome = orch
        .handle_turn("what was decided?", &CancellationToken::new())
        .await
        .unwrap();

    let stats = outcome.reduction.expect("history should be reduced");
    assert_eq!(stats.messages_before, 10);
    assert!(stats.messages_after <= 10);
    assert!(outcome.budget.tokens_used > 50);
    assert!(!orch.knowledge().lock().unwrap().is_empty());
    assert!(orch.messages().len() <= 12);
}

#[tokio::test]
async fn check_and_cleanup_is_a_no_op_under_budget() {
    let tools = ToolSet::new();
    let client = RecordingClient::default();
    let mut orch = Orchestrator::new(&client, &tools, OrchestratorConfig::default())
        .unwrap()
        .with_messages(vec![Message::user("hi"), Message::model("hello")]);
    let generation = orch.generation();

    assert!(orch.check_and_cleanup().is_none());
    assert_eq!(orch.generation(), generation);
    assert_eq!(orch.messages().len(), 2);
}

#[tokio::test]
async fn check_and_cleanup_replaces_list_when_over_budget() {
    let tools = ToolSet::new();
    let client = RecordingClient::default();
    let mut orch = Orchestrator::new(&client, &tools, tight_config())
        .unwrap()
        .with_messages(long_history());
    let generation = orch.generation();

    let stats = orch.check_and_cleanup().expect("cleanup should run");
    assert_eq!(stats.messages_after, orch.messages().len());
    assert_eq!(orch.generation(), generation + 1);
}

#[tokio::test]
async fn check_and_cleanup_keeps_generation_when_nothing_reduces() {
    let tools = ToolSet::new();
    let client = RecordingClient::default();
    let mut orch = Orchestrator::new(&client, &tools, tight_config())
        .unwrap()
        .with_messages(vec![Message::user("x".repeat(400))]);
    let generation = orch.generation();

    assert!(orch.check_and_cleanup().is_none());
    assert_eq!(orch.generation(), generation);
    assert_eq!(orch.messages()[0].text().len(), 400);
}

#[tokio::test]
async fn failed_reduction_keeps_full_history() {
    use tether_rs::context::ReductionPolicy;

    let tools = ToolSet::new();
    let client = RecordingClient::default();
    let config = OrchestratorConfig::default().with_context(ContextConfig {
        fixed_token_threshold: 50,
        percentage_threshold: 0.1,
        reduction: ReductionPolicy {
            compress_min_len: 10,
            excerpt_chars: 100,
            ..ReductionPolicy::standard()
        },
        ..ContextConfig::default()
    });
    let failures = Arc::new(Mutex::new(0usize));
    let seen = failures.clone();
    let handler = FnEventHandler::new(move |event| {
        if let OrchestratorEvent::ReductionFailed { .. } = event {
            *seen.lock().unwrap() += 1;
        }
        None
    });
    let mut orch = Orchestrator::new(&client, &tools, config)
        .unwrap()
        .with_event_handler(&handler)
        .with_messages(long_history());

    let outcome = orch
        .handle_turn("what was decided?", &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.reduction.is_none());
    assert_eq!(*failures.lock().unwrap(), 1);
    assert_eq!(orch.messages().len(), 12);
    assert_eq!(client.last_messages().len(), 10);
}

// ── Periodic monitor ───────────────────────────────────────────────

/// A pasted log whose only marked line survives compression.
fn pasted_log(label: &str) -> String {
    format!(
        "Important: the {label} log follows\n{}",
        format!("{label} line\n").repeat(150)
    )
}

#[tokio::test(start_paused = true)]
async fn monitor_reports_are_swapped_in_by_generation() {
    let tools = ToolSet::new();
    let client = RecordingClient::default();
    let applied = Arc::new(Mutex::new(Vec::new()));
    let discarded = Arc::new(Mutex::new(Vec::new()));
    let (seen_applied, seen_discarded) = (applied.clone(), discarded.clone());
    let handler = FnEventHandler::new(move |event| {
        match event {
            OrchestratorEvent::MonitorReportApplied { generation, .. } => {
                seen_applied.lock().unwrap().push(*generation);
            }
            OrchestratorEvent::MonitorReportDiscarded {
                report_generation,
                current_generation,
            } => {
                seen_discarded
                    .lock()
                    .unwrap()
                    .push((*report_generation, *current_generation));
            }
            _ => {}
        }
        None
    });
    let mut orch = Orchestrator::new(&client, &tools, tight_config().with_monitor_interval(1))
        .unwrap()
        .with_event_handler(&handler);
    let cancel = CancellationToken::new();

    // The first turn starts the monitor and leaves the history over budget.
    let build_log = pasted_log("build");
    let outcome = orch.handle_turn(&build_log, &cancel).await.unwrap();
    assert!(outcome.reduction.is_none());
    let over_budget = orch.generation();

    // The monitor reduces that generation in the background.
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    orch.handle_turn("what failed?", &cancel).await.unwrap();
    assert_eq!(*applied.lock().unwrap(), vec![over_budget]);
    assert_eq!(orch.messages().len(), 4);
    assert!(orch.messages()[0].text().len() < build_log.len());
    assert!(orch.messages()[0].text().contains("Important: the build log follows"));
    assert_eq!(orch.messages()[2], Message::user("what failed?"));

    // A report computed for a generation that has since changed is dropped.
    orch.handle_turn(&pasted_log("deploy"), &cancel).await.unwrap();
    let reported = orch.generation();
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    assert!(orch.check_and_cleanup().is_some());
    let current = orch.generation();
    let before = orch.messages().to_vec();

    orch.handle_turn("ok", &cancel).await.unwrap();
    assert_eq!(*discarded.lock().unwrap(), vec![(reported, current)]);
    assert_eq!(*applied.lock().unwrap(), vec![over_budget]);
    assert_eq!(orch.messages()[..before.len()], before[..]);

    orch.shutdown().await;
}
