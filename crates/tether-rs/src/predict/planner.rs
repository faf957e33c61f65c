//! Execution plans from an intent and ranked tools.
//!
//! A plan is a short, priority-ordered list of tool invocations the
//! orchestrator may run before generating its reply. Each intent type has its
//! own generator; a step is only emitted when a ranked tool of the right
//! category is available.

use super::intent::{Intent, IntentType};
use super::selector::RankedTool;
use crate::error::{PipelineError, PipelineResult};
use crate::tools::ToolCategory;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Priority of the fallback step when no generator matched.
pub const DEFAULT_STEP_PRIORITY: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_steps: usize,
    /// Shell command proposed as a diagnostic step for debug intents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_command: Option<String>,
    /// Availability factor when at least one tool is ranked.
    pub tools_available_factor: f64,
    pub no_tools_factor: f64,
    /// Confidence lost per step, floored at `min_step_penalty`.
    pub per_step_penalty: f64,
    pub min_step_penalty: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            diagnostic_command: None,
            tools_available_factor: 0.9,
            no_tools_factor: 0.5,
            per_step_penalty: 0.1,
            min_step_penalty: 0.5,
        }
    }
}

impl PlannerConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_diagnostic_command(mut self, command: impl Into<String>) -> Self {
        self.diagnostic_command = Some(command.into());
        self
    }
}

/// One predicted tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub tool: String,
    pub parameters: Value,
    pub expected_outcome: String,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    pub mutation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub predicted_intent: Intent,
    pub selected_tools: Vec<RankedTool>,
    /// Sorted by priority, descending; equal priorities keep generation order.
    pub steps: Vec<ExecutionStep>,
    pub confidence: f64,
    pub predicted_outcome: String,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Distinct tool names in step order.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !names.contains(&step.tool.as_str()) {
                names.push(&step.tool);
            }
        }
        names
    }

    pub fn summary(&self) -> String {
        let steps = self
            .steps
            .iter()
            .map(|s| format!("{}(p{})", s.tool, s.priority))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} plan, confidence {:.2}: [{steps}]",
            self.predicted_intent.intent_type, self.confidence
        )
    }
}

// ── Planner ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanner {
    config: PlannerConfig,
}

/// Collects steps, resolving categories against the ranked tools.
struct StepBuilder<'a> {
    tools: &'a [RankedTool],
    steps: Vec<ExecutionStep>,
}

impl<'a> StepBuilder<'a> {
    fn new(tools: &'a [RankedTool]) -> Self {
        Self {
            tools,
            steps: Vec::new(),
        }
    }

    /// Best-ranked tool of the category.
    fn tool_for(&self, category: ToolCategory) -> Option<&'a RankedTool> {
        self.tools.iter().find(|t| t.category == category)
    }

    fn push(
        &mut self,
        category: ToolCategory,
        parameters: Value,
        expected_outcome: String,
        priority: u8,
    ) {
        if let Some(ranked) = self.tool_for(category) {
            self.steps.push(ExecutionStep {
                tool: ranked.tool.name.clone(),
                parameters,
                expected_outcome,
                priority: priority.clamp(1, 10),
                mutation: ranked.tool.mutation,
            });
        }
    }

    fn read(&mut self, file: &str, priority: u8) {
        self.push(
            ToolCategory::Read,
            json!({ "path": file }),
            format!("Contents of {file}"),
            priority,
        );
    }

    fn search(&mut self, keyword: &str, priority: u8) {
        self.push(
            ToolCategory::Search,
            json!({ "pattern": keyword }),
            format!("Locations mentioning '{keyword}'"),
            priority,
        );
    }

    fn edit(&mut self, file: &str, instruction: &str, priority: u8) {
        self.push(
            ToolCategory::Edit,
            json!({ "path": file, "instruction": instruction }),
            format!("{file} updated"),
            priority,
        );
    }
}

impl ExecutionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Build a plan for `intent` from the ranked tools.
    ///
    /// Fails with [`PipelineError::InvalidIntent`] when the intent confidence
    /// is NaN or outside `[0, 1]`.
    pub fn plan(
        &self,
        intent: &Intent,
        ranked_tools: &[RankedTool],
        user_input: &str,
    ) -> PipelineResult<ExecutionPlan> {
        if !(0.0..=1.0).contains(&intent.confidence) {
            return Err(PipelineError::InvalidIntent(format!(
                "confidence must be within [0, 1], got {}",
                intent.confidence
            )));
        }

        let files = intent.file_targets();
        let keywords = intent.keyword_targets();
        let mut builder = StepBuilder::new(ranked_tools);

        match intent.intent_type {
            IntentType::CodeChange => {
                for (i, file) in files.iter().enumerate() {
                    builder.edit(file, user_input, if i == 0 { 10 } else { 9 });
                    builder.read(file, 7);
                }
                for keyword in &keywords {
                    builder.search(keyword, 8);
                }
            }
            IntentType::Query => {
                for file in &files {
                    builder.read(file, 9);
                }
                for keyword in &keywords {
                    builder.search(keyword, 8);
                }
            }
            IntentType::Debug => {
                for keyword in &keywords {
                    builder.search(keyword, 9);
                }
                for file in &files {
                    builder.read(file, 8);
                }
                if let Some(command) = &self.config.diagnostic_command {
                    builder.push(
                        ToolCategory::Shell,
                        json!({ "command": command }),
                        "Diagnostic output".to_string(),
                        6,
                    );
                }
            }
            IntentType::Refactor => {
                for file in &files {
                    builder.edit(file, user_input, 9);
                    builder.read(file, 8);
                }
                for keyword in &keywords {
                    builder.search(keyword, 7);
                }
            }
            IntentType::Research => {
                builder.push(
                    ToolCategory::Web,
                    json!({ "query": user_input }),
                    "Relevant external sources".to_string(),
                    9,
                );
                for keyword in &keywords {
                    builder.search(keyword, 7);
                }
            }
            IntentType::Other => {}
        }

        let mut steps = builder.steps;
        if steps.is_empty()
            && let Some(top) = ranked_tools.first()
        {
            steps.push(default_step(top, user_input));
        }

        steps.sort_by(|a, b| b.priority.cmp(&a.priority));
        steps.truncate(self.config.max_steps);

        let availability = if ranked_tools.is_empty() {
            self.config.no_tools_factor
        } else {
            self.config.tools_available_factor
        };
        let step_penalty = (1.0 - self.config.per_step_penalty * steps.len() as f64)
            .max(self.config.min_step_penalty);
        let confidence = (intent.confidence * availability * step_penalty).clamp(0.0, 1.0);

        let mut plan = ExecutionPlan {
            predicted_intent: intent.clone(),
            selected_tools: ranked_tools.to_vec(),
            steps,
            confidence,
            predicted_outcome: String::new(),
        };
        plan.predicted_outcome = predicted_outcome(intent.intent_type, &plan.tool_names());
        debug!("Planned {}", plan.summary());
        Ok(plan)
    }
}

/// A generic step on the top-ranked tool, with parameters shaped by its
/// category.
fn default_step(top: &RankedTool, user_input: &str) -> ExecutionStep {
    let parameters = match top.category {
        ToolCategory::Search => json!({ "pattern": user_input }),
        ToolCategory::Shell => json!({ "command": user_input }),
        _ => json!({ "query": user_input }),
    };
    ExecutionStep {
        tool: top.tool.name.clone(),
        parameters,
        expected_outcome: "Context relevant to the request".to_string(),
        priority: DEFAULT_STEP_PRIORITY,
        mutation: top.tool.mutation,
    }
}

fn predicted_outcome(intent_type: IntentType, tools: &[&str]) -> String {
    let phrase = intent_type
        .expected_outcome()
        .unwrap_or("No specific outcome predicted");
    if tools.is_empty() {
        phrase.to_string()
    } else {
        format!("{phrase} using {}", tools.join(", "))
    }
}
