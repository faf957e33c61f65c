//! Predictive tool orchestration: intent, tool ranking, execution plan.
//!
//! Each stage is a pure function of its inputs plus configuration tables:
//!
//! 1. [`intent::IntentClassifier`] turns the user's text and recent context
//!    into an [`Intent`].
//! 2. [`selector::ToolSelector`] ranks the available tools for that intent.
//! 3. [`planner::ExecutionPlanner`] turns intent and ranking into an
//!    [`ExecutionPlan`] of prioritized steps.
//!
//! Any stage may fail with a [`PipelineError`](crate::error::PipelineError);
//! the orchestrator then replies without a plan.

pub mod intent;
pub mod planner;
pub mod selector;

pub use intent::{ClassifierConfig, Intent, IntentClassifier, IntentFamily, IntentType};
pub use planner::{ExecutionPlan, ExecutionPlanner, ExecutionStep, PlannerConfig};
pub use selector::{RankedTool, SelectorConfig, ToolSelector};
