//! Configuration types for the [`Orchestrator`](super::orchestrator::Orchestrator).
//!
//! Every struct has a `Default` and deserializes with `#[serde(default)]`, so
//! a JSON file can override any subset of fields. Common settings have
//! `with_*` builder methods; the rest are public fields.
//!
//! # Examples
//!
//! ```ignore
//! let config = OrchestratorConfig::new("anthropic/claude-sonnet-4")
//!     .with_plan_confidence_gate(0.7)
//!     .with_allow_mutating_steps(true);
//! ```
//!
//! Struct update syntax for nested modules:
//!
//! ```ignore
//! let config = OrchestratorConfig {
//!     context: ContextConfig {
//!         fixed_token_threshold: 8_000,
//!         ..ContextConfig::default()
//!     },
//!     monitor: Toggle::enabled(MonitorConfig::default()),
//!     ..OrchestratorConfig::new("google/gemini-2.5-pro")
//! };
//! ```

use crate::context::reducer::ReductionPolicy;
use crate::error::PipelineResult;
use crate::predict::intent::ClassifierConfig;
use crate::predict::planner::PlannerConfig;
use crate::predict::selector::SelectorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ── Generic toggle ────────────────────────────────────────────────

/// Enabled/disabled wrapper for optional modules.
///
/// When `enabled` is `false`, the module is skipped regardless of the inner
/// config values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggle<T: Default> {
    pub enabled: bool,
    pub config: T,
}

impl<T: Default> Toggle<T> {
    pub fn enabled(config: T) -> Self {
        Self {
            enabled: true,
            config,
        }
    }

    /// Create a disabled instance with default inner config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: T::default(),
        }
    }

    /// The inner config when enabled.
    pub fn active(&self) -> Option<&T> {
        self.enabled.then_some(&self.config)
    }
}

impl<T: Default> Default for Toggle<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            config: T::default(),
        }
    }
}

// ── Context ────────────────────────────────────────────────────────

/// Budget thresholds, knowledge store size and reduction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Reduce when the estimated token count is strictly above this.
    pub fixed_token_threshold: usize,
    /// Reduce when usage reaches this fraction of the model limit.
    pub percentage_threshold: f64,
    pub max_knowledge_entries: usize,
    pub auto_extract_knowledge: bool,
    /// Use [`ReductionPolicy::aggressive`] instead of `reduction`.
    pub aggressive_reduction: bool,
    /// Growth assumed for the next turn when projecting usage.
    pub projection_growth_factor: f64,
    pub reduction: ReductionPolicy,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            fixed_token_threshold: 4000,
            percentage_threshold: 0.8,
            max_knowledge_entries: 100,
            auto_extract_knowledge: true,
            aggressive_reduction: false,
            projection_growth_factor: crate::context::budget::PROJECTION_GROWTH_FACTOR,
            reduction: ReductionPolicy::standard(),
        }
    }
}

// ── Model limits ──────────────────────────────────────────────────

/// Context limit for models whose identifier contains `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimit {
    pub pattern: String,
    pub limit: usize,
}

impl ModelLimit {
    pub fn new(pattern: impl Into<String>, limit: usize) -> Self {
        Self {
            pattern: pattern.into(),
            limit,
        }
    }
}

/// Resolves a model identifier to its context limit in tokens.
///
/// Patterns are matched in order, case-insensitively, as substrings; put
/// more specific patterns first (`gpt-4o` before `gpt-4`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelLimits {
    pub limits: Vec<ModelLimit>,
    pub default_limit: usize,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            limits: vec![
                ModelLimit::new("claude", 200_000),
                ModelLimit::new("gemini", 1_000_000),
                ModelLimit::new("gpt-4o", 128_000),
                ModelLimit::new("gpt-4", 8_192),
                ModelLimit::new("llama", 8_192),
            ],
            default_limit: 32_000,
        }
    }
}

impl ModelLimits {
    pub fn resolve(&self, model: &str) -> usize {
        let model = model.to_lowercase();
        self.limits
            .iter()
            .find(|l| model.contains(&l.pattern.to_lowercase()))
            .map(|l| l.limit)
            .unwrap_or(self.default_limit)
    }

    /// Put a limit ahead of the existing ones.
    pub fn with_limit(mut self, pattern: impl Into<String>, limit: usize) -> Self {
        self.limits.insert(0, ModelLimit::new(pattern, limit));
        self
    }
}

// ── Periodic monitor ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    /// Capacity of the report channel.
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            channel_capacity: 8,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

// ── Orchestrator ──────────────────────────────────────────────────

/// Configuration for an [`Orchestrator`](super::orchestrator::Orchestrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Model identifier, used to resolve the context limit.
    pub model: String,
    pub context: ContextConfig,
    pub model_limits: ModelLimits,
    pub classifier: ClassifierConfig,
    pub selector: SelectorConfig,
    pub planner: PlannerConfig,
    /// Plans execute only when their confidence is strictly above this.
    pub plan_confidence_gate: f64,
    /// Clean up when reduction is projected for the next turn, not only when
    /// it is already due.
    pub preempt_on_projection: bool,
    /// Run plan steps whose tool mutates state. Off by default.
    pub allow_mutating_steps: bool,
    /// Background budget monitor. Disabled by default.
    pub monitor: Toggle<MonitorConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            context: ContextConfig::default(),
            model_limits: ModelLimits::default(),
            classifier: ClassifierConfig::default(),
            selector: SelectorConfig::default(),
            planner: PlannerConfig::default(),
            plan_confidence_gate: 0.6,
            preempt_on_projection: true,
            allow_mutating_steps: false,
            monitor: Toggle::disabled(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    pub fn with_fixed_token_threshold(mut self, threshold: usize) -> Self {
        self.context.fixed_token_threshold = threshold;
        self
    }

    pub fn with_percentage_threshold(mut self, threshold: f64) -> Self {
        self.context.percentage_threshold = threshold;
        self
    }

    pub fn with_aggressive_reduction(mut self, aggressive: bool) -> Self {
        self.context.aggressive_reduction = aggressive;
        self
    }

    pub fn with_plan_confidence_gate(mut self, gate: f64) -> Self {
        self.plan_confidence_gate = gate;
        self
    }

    pub fn with_allow_mutating_steps(mut self, allow: bool) -> Self {
        self.allow_mutating_steps = allow;
        self
    }

    pub fn with_monitor_interval(mut self, interval_secs: u64) -> Self {
        self.monitor = Toggle::enabled(MonitorConfig {
            interval_secs,
            ..self.monitor.config
        });
        self
    }

    /// Context limit of the configured model.
    pub fn model_limit(&self) -> usize {
        self.model_limits.resolve(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_limits_resolve_by_substring() {
        let limits = ModelLimits::default();
        assert_eq!(limits.resolve("anthropic/claude-sonnet-4"), 200_000);
        assert_eq!(limits.resolve("google/Gemini-2.5-Pro"), 1_000_000);
        assert_eq!(limits.resolve("openai/gpt-4o-mini"), 128_000);
        assert_eq!(limits.resolve("openai/gpt-4"), 8_192);
        assert_eq!(limits.resolve("meta-llama/llama-3-70b"), 8_192);
        assert_eq!(limits.resolve("mistral/mixtral"), 32_000);
    }

    #[test]
    fn custom_limit_takes_precedence() {
        let limits = ModelLimits::default().with_limit("claude-instant", 100_000);
        assert_eq!(limits.resolve("anthropic/claude-instant-1"), 100_000);
        assert_eq!(limits.resolve("anthropic/claude-3"), 200_000);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.context.fixed_token_threshold, 4000);
        assert!((config.context.percentage_threshold - 0.8).abs() < 1e-9);
        assert_eq!(config.context.max_knowledge_entries, 100);
        assert!(config.context.auto_extract_knowledge);
        assert!(!config.context.aggressive_reduction);
        assert!((config.plan_confidence_gate - 0.6).abs() < 1e-9);
        assert!(!config.allow_mutating_steps);
        assert!(!config.monitor.enabled);
        assert_eq!(config.selector.top_k, 3);
        assert_eq!(config.planner.max_steps, 6);
    }

    #[test]
    fn toggle_defaults_enabled_and_disabled_is_inactive() {
        let on: Toggle<MonitorConfig> = Toggle::default();
        assert!(on.active().is_some());
        let off: Toggle<MonitorConfig> = Toggle::disabled();
        assert!(off.active().is_none());
    }

    #[test]
    fn monitor_interval_builder_enables_monitor() {
        let config = OrchestratorConfig::new("x").with_monitor_interval(2);
        assert!(config.monitor.enabled);
        assert_eq!(config.monitor.config.interval(), Duration::from_secs(2));
        assert_eq!(config.monitor.config.channel_capacity, 8);
    }

    #[test]
    fn json_file_overrides_subset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.json");
        std::fs::write(
            &path,
            r#"{
                "model": "openai/gpt-4o",
                "context": { "fixed_token_threshold": 1234 },
                "monitor": { "enabled": true },
                "allow_mutating_steps": true
            }"#,
        )
        .unwrap();
        let config = OrchestratorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.model, "openai/gpt-4o");
        assert_eq!(config.model_limit(), 128_000);
        assert_eq!(config.context.fixed_token_threshold, 1234);
        assert!((config.context.percentage_threshold - 0.8).abs() < 1e-9);
        assert!(config.monitor.enabled);
        assert_eq!(config.monitor.config.interval_secs, 5);
        assert!(config.allow_mutating_steps);
    }

    #[test]
    fn missing_json_file_is_io_error() {
        let err = OrchestratorConfig::from_json_file("/nonexistent/tether.json").unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::Io(_)));
    }
}
