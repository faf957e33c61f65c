//! Tool ranking for a classified intent.
//!
//! Each available tool gets two scores: how well its category fits the intent
//! type, and how relevant it is to what the recent context talks about
//! (files, commands). The weighted sum is its effectiveness:
//!
//! ```text
//! effectiveness = intent_weight * intent_fit + context_weight * context_relevance
//! ```
//!
//! A tool's category comes from its registration when declared; otherwise it
//! is looked up in an exact name table, then guessed from substring hints,
//! then defaults to [`ToolCategory::Other`].

use super::intent::{Intent, IntentType};
use crate::Message;
use crate::context::knowledge::file_references;
use crate::error::{PipelineError, PipelineResult};
use crate::tools::names::{
    EDIT_FILE, FIND_FILES, GREP, LIST_DIR, READ_FILE, SHELL, WEB_SEARCH, WRITE_FILE,
};
use crate::tools::{ToolCategory, ToolDescriptor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ── Configuration ──────────────────────────────────────────────────

/// Fit of one intent type for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentFit {
    pub intent: IntentType,
    pub fit: f64,
}

/// Fit row for one category: per-intent overrides plus a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFit {
    pub category: ToolCategory,
    #[serde(default)]
    pub by_intent: Vec<IntentFit>,
    pub otherwise: f64,
}

impl CategoryFit {
    pub fn new(category: ToolCategory, otherwise: f64) -> Self {
        Self {
            category,
            by_intent: Vec::new(),
            otherwise,
        }
    }

    pub fn with(mut self, intent: IntentType, fit: f64) -> Self {
        self.by_intent.push(IntentFit { intent, fit });
        self
    }

    pub fn fit_for(&self, intent: IntentType) -> f64 {
        self.by_intent
            .iter()
            .find(|f| f.intent == intent)
            .map(|f| f.fit)
            .unwrap_or(self.otherwise)
    }
}

/// Maps a tool name (exactly, or by substring) to a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRule {
    pub pattern: String,
    pub category: ToolCategory,
}

impl NameRule {
    pub fn new(pattern: &str, category: ToolCategory) -> Self {
        Self {
            pattern: pattern.to_string(),
            category,
        }
    }
}

/// Scoring tables and weights for the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub fits: Vec<CategoryFit>,
    /// Fit for a category missing from `fits`.
    pub default_fit: f64,
    pub exact_names: Vec<NameRule>,
    /// Substring hints, tested in order against the lowercased name.
    pub name_hints: Vec<NameRule>,
    pub intent_weight: f64,
    pub context_weight: f64,
    /// Relevance of a file-oriented tool when the context mentions files.
    pub file_relevance: f64,
    /// Relevance of a shell tool when the context talks about commands.
    pub shell_relevance: f64,
    pub base_relevance: f64,
    pub shell_vocabulary: Vec<String>,
    pub top_k: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        use IntentType::*;
        use ToolCategory as C;
        Self {
            fits: vec![
                CategoryFit::new(C::Edit, 0.2).with(CodeChange, 0.9),
                CategoryFit::new(C::Read, 0.5).with(Query, 0.8).with(Debug, 0.8),
                CategoryFit::new(C::Search, 0.4)
                    .with(Research, 0.8)
                    .with(Query, 0.7)
                    .with(Debug, 0.7),
                CategoryFit::new(C::Shell, 0.3).with(Debug, 0.7),
                CategoryFit::new(C::Web, 0.2).with(Research, 0.9).with(Query, 0.6),
                CategoryFit::new(C::Other, 0.3),
            ],
            default_fit: 0.3,
            exact_names: vec![
                NameRule::new(READ_FILE, C::Read),
                NameRule::new(LIST_DIR, C::Read),
                NameRule::new(EDIT_FILE, C::Edit),
                NameRule::new(WRITE_FILE, C::Edit),
                NameRule::new(GREP, C::Search),
                NameRule::new(FIND_FILES, C::Search),
                NameRule::new(SHELL, C::Shell),
                NameRule::new(WEB_SEARCH, C::Web),
            ],
            name_hints: vec![
                NameRule::new("web", C::Web),
                NameRule::new("http", C::Web),
                NameRule::new("fetch", C::Web),
                NameRule::new("edit", C::Edit),
                NameRule::new("write", C::Edit),
                NameRule::new("patch", C::Edit),
                NameRule::new("search", C::Search),
                NameRule::new("grep", C::Search),
                NameRule::new("find", C::Search),
                NameRule::new("read", C::Read),
                NameRule::new("view", C::Read),
                NameRule::new("list", C::Read),
                NameRule::new("shell", C::Shell),
                NameRule::new("exec", C::Shell),
                NameRule::new("command", C::Shell),
                NameRule::new("bash", C::Shell),
            ],
            intent_weight: 0.7,
            context_weight: 0.3,
            file_relevance: 0.9,
            shell_relevance: 0.8,
            base_relevance: 0.5,
            shell_vocabulary: [
                "run", "command", "execute", "shell", "terminal", "script", "bash", "cargo",
                "npm", "make", "git",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            top_k: 3,
        }
    }
}

impl SelectorConfig {
    pub fn with_weights(mut self, intent_weight: f64, context_weight: f64) -> Self {
        self.intent_weight = intent_weight;
        self.context_weight = context_weight;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Weights must be finite and non-negative; table scores must lie in
    /// `[0, 1]`.
    pub fn validate(&self) -> PipelineResult<()> {
        for (name, w) in [
            ("intent_weight", self.intent_weight),
            ("context_weight", self.context_weight),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(PipelineError::InvalidScoring(format!(
                    "{name} must be finite and non-negative, got {w}"
                )));
            }
        }
        let scores = self
            .fits
            .iter()
            .flat_map(|row| {
                std::iter::once(row.otherwise).chain(row.by_intent.iter().map(|f| f.fit))
            })
            .chain([
                self.default_fit,
                self.file_relevance,
                self.shell_relevance,
                self.base_relevance,
            ]);
        for score in scores {
            if !(0.0..=1.0).contains(&score) {
                return Err(PipelineError::InvalidScoring(format!(
                    "table score must be within [0, 1], got {score}"
                )));
            }
        }
        Ok(())
    }
}

// ── Ranking ────────────────────────────────────────────────────────

/// A tool with its scores for one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTool {
    pub tool: ToolDescriptor,
    /// Resolved category (declared, or inferred from the name).
    pub category: ToolCategory,
    pub effectiveness: f64,
    pub intent_fit: f64,
    pub context_relevance: f64,
    pub reasoning: String,
}

/// Signals pulled from the recent context once per ranking.
#[derive(Debug, Clone, Copy, Default)]
struct ContextSignals {
    mentions_files: bool,
    mentions_commands: bool,
}

/// Ranks tools for an intent.
///
/// # Example
///
/// ```
/// use tether_rs::predict::intent::{Intent, IntentType};
/// use tether_rs::predict::selector::{SelectorConfig, ToolSelector};
/// use tether_rs::tools::ToolDescriptor;
///
/// let selector = ToolSelector::new(SelectorConfig::default()).unwrap();
/// let intent = Intent::new(IntentType::Research, 0.7, Default::default());
/// let tools = vec![
///     ToolDescriptor::new("read_file", "Read a file"),
///     ToolDescriptor::new("web_search", "Search the web"),
/// ];
/// let ranked = selector.rank(&intent, &[], &tools).unwrap();
/// assert_eq!(ranked[0].tool.name, "web_search");
/// ```
pub struct ToolSelector {
    config: SelectorConfig,
    shell_vocabulary: Option<Regex>,
}

impl fmt::Debug for ToolSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSelector")
            .field("config", &self.config)
            .finish()
    }
}

impl ToolSelector {
    pub fn new(config: SelectorConfig) -> PipelineResult<Self> {
        config.validate()?;
        let shell_vocabulary = if config.shell_vocabulary.is_empty() {
            None
        } else {
            let alternation = config
                .shell_vocabulary
                .iter()
                .map(|w| regex::escape(&w.to_lowercase()))
                .collect::<Vec<_>>()
                .join("|");
            let re = Regex::new(&format!(r"\b(?:{alternation})\b")).map_err(|source| {
                PipelineError::InvalidPattern {
                    family: "shell-vocabulary".into(),
                    source,
                }
            })?;
            Some(re)
        };
        Ok(Self {
            config,
            shell_vocabulary,
        })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Resolve a tool's category: declared, exact name, substring hint, other.
    pub fn category_of(&self, tool: &ToolDescriptor) -> ToolCategory {
        if let Some(category) = tool.category {
            return category;
        }
        if let Some(rule) = self.config.exact_names.iter().find(|r| r.pattern == tool.name) {
            return rule.category;
        }
        let lower = tool.name.to_lowercase();
        self.config
            .name_hints
            .iter()
            .find(|r| lower.contains(&r.pattern))
            .map(|r| r.category)
            .unwrap_or(ToolCategory::Other)
    }

    fn intent_fit(&self, category: ToolCategory, intent: IntentType) -> f64 {
        self.config
            .fits
            .iter()
            .find(|row| row.category == category)
            .map(|row| row.fit_for(intent))
            .unwrap_or(self.config.default_fit)
    }

    fn signals(&self, intent: &Intent, context: &[Message]) -> ContextSignals {
        let mut signals = ContextSignals {
            mentions_files: !intent.file_targets().is_empty(),
            mentions_commands: false,
        };
        for message in context {
            let text = message.text();
            if !signals.mentions_files && !file_references(&text).is_empty() {
                signals.mentions_files = true;
            }
            if !signals.mentions_commands
                && let Some(re) = &self.shell_vocabulary
                && re.is_match(&text.to_lowercase())
            {
                signals.mentions_commands = true;
            }
        }
        signals
    }

    fn context_relevance(&self, category: ToolCategory, signals: ContextSignals) -> f64 {
        if signals.mentions_files && category.is_file_oriented() {
            self.config.file_relevance
        } else if signals.mentions_commands && category == ToolCategory::Shell {
            self.config.shell_relevance
        } else {
            self.config.base_relevance
        }
    }

    /// Score every tool and sort by effectiveness, descending.
    ///
    /// Ties keep the input order.
    pub fn rank(
        &self,
        intent: &Intent,
        context: &[Message],
        tools: &[ToolDescriptor],
    ) -> PipelineResult<Vec<RankedTool>> {
        if !intent.confidence.is_finite() {
            return Err(PipelineError::InvalidIntent(format!(
                "confidence is not finite: {}",
                intent.confidence
            )));
        }
        let signals = self.signals(intent, context);
        let mut ranked: Vec<RankedTool> = tools
            .iter()
            .map(|tool| {
                let category = self.category_of(tool);
                let intent_fit = self.intent_fit(category, intent.intent_type);
                let context_relevance = self.context_relevance(category, signals);
                let effectiveness = self.config.intent_weight * intent_fit
                    + self.config.context_weight * context_relevance;
                RankedTool {
                    reasoning: format!(
                        "{category} tool: fit {intent_fit:.2} for {} intent, context relevance {context_relevance:.2}",
                        intent.intent_type
                    ),
                    tool: tool.clone(),
                    category,
                    effectiveness,
                    intent_fit,
                    context_relevance,
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.effectiveness.total_cmp(&a.effectiveness));
        debug!(
            "Ranked {} tools for {}: {}",
            ranked.len(),
            intent.intent_type,
            ranked
                .iter()
                .map(|r| format!("{}={:.2}", r.tool.name, r.effectiveness))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(ranked)
    }

    /// The top `k` of [`rank`](Self::rank).
    pub fn select(
        &self,
        intent: &Intent,
        context: &[Message],
        tools: &[ToolDescriptor],
        k: usize,
    ) -> PipelineResult<Vec<RankedTool>> {
        let mut ranked = self.rank(intent, context, tools)?;
        ranked.truncate(k);
        Ok(ranked)
    }

    /// [`select`](Self::select) with the configured `top_k`.
    pub fn select_top(
        &self,
        intent: &Intent,
        context: &[Message],
        tools: &[ToolDescriptor],
    ) -> PipelineResult<Vec<RankedTool>> {
        self.select(intent, context, tools, self.config.top_k)
    }
}
