//! Budget-triggered cleanup: check, extract, reduce.
//!
//! [`ContextManager`] is the one place where the budget monitor, the
//! knowledge extractor and the reducer meet. Knowledge is always extracted
//! from the list as it was *before* reduction, so anything a strategy drops
//! is still queryable from the shared store afterward.

use super::budget::{BudgetMonitor, BudgetState};
use super::knowledge::{self, KnowledgeEntry, KnowledgeStore, SharedKnowledgeStore};
use super::reducer::{ContextReducer, ReductionPolicy, ReductionStats};
use crate::Message;
use crate::agent::config::ContextConfig;
use crate::error::PipelineResult;
use tracing::{debug, info};

/// Tag attached to every entry extracted during cleanup.
pub const CLEANUP_TAG: &str = "context-cleanup";

/// Result of a cleanup pass that actually ran.
#[derive(Debug, Clone)]
pub struct CleanupOutcome {
    pub messages: Vec<Message>,
    /// Entries extracted during this pass (including ones the store already
    /// held).
    pub knowledge: Vec<KnowledgeEntry>,
    pub stats: ReductionStats,
    pub budget_before: BudgetState,
}

/// Budget monitor + extractor + reducer sharing one knowledge store.
///
/// Cheap to clone; clones share the store.
#[derive(Debug, Clone)]
pub struct ContextManager {
    monitor: BudgetMonitor,
    reducer: ContextReducer,
    store: SharedKnowledgeStore,
    auto_extract: bool,
    force_on_projection: bool,
    source: Option<String>,
}

impl ContextManager {
    pub fn new(config: &ContextConfig) -> Self {
        let policy = if config.aggressive_reduction {
            ReductionPolicy::aggressive()
        } else {
            config.reduction.clone()
        };
        Self {
            monitor: BudgetMonitor::new(config.percentage_threshold, config.fixed_token_threshold)
                .with_growth_factor(config.projection_growth_factor),
            reducer: ContextReducer::new(policy),
            store: KnowledgeStore::shared(config.max_knowledge_entries),
            auto_extract: config.auto_extract_knowledge,
            force_on_projection: false,
            source: None,
        }
    }

    /// Use an existing store (e.g. one restored from a snapshot).
    pub fn with_store(mut self, store: SharedKnowledgeStore) -> Self {
        self.store = store;
        self
    }

    /// Also clean up when reduction is merely projected for the next turn.
    pub fn with_force_on_projection(mut self, enabled: bool) -> Self {
        self.force_on_projection = enabled;
        self
    }

    /// Job identifier recorded as the source of extracted entries.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn monitor(&self) -> &BudgetMonitor {
        &self.monitor
    }

    pub fn reducer(&self) -> &ContextReducer {
        &self.reducer
    }

    pub fn store(&self) -> SharedKnowledgeStore {
        self.store.clone()
    }

    pub fn usage(&self, messages: &[Message], model_limit: usize) -> BudgetState {
        self.monitor.usage(messages, model_limit)
    }

    /// Whether a cleanup pass would run for this list.
    pub fn needs_cleanup(&self, messages: &[Message], model_limit: usize) -> bool {
        let state = self.monitor.usage(messages, model_limit);
        self.monitor.should_reduce(messages, model_limit)
            || (self.force_on_projection && self.monitor.reduction_projected(&state))
    }

    /// Run a cleanup pass if the budget calls for one.
    pub fn cleanup_if_needed(
        &self,
        messages: &[Message],
        model_limit: usize,
    ) -> PipelineResult<Option<CleanupOutcome>> {
        if !self.needs_cleanup(messages, model_limit) {
            debug!(
                "No cleanup needed ({})",
                self.monitor.usage(messages, model_limit).to_log_string()
            );
            return Ok(None);
        }
        self.cleanup(messages, model_limit).map(Some)
    }

    /// Extract knowledge (when enabled) and reduce, unconditionally.
    pub fn cleanup(
        &self,
        messages: &[Message],
        model_limit: usize,
    ) -> PipelineResult<CleanupOutcome> {
        let budget_before = self.monitor.usage(messages, model_limit);
        info!("Context cleanup starting: {}", budget_before.to_log_string());

        let extracted = if self.auto_extract {
            let entries =
                knowledge::extract_messages(messages, &[CLEANUP_TAG], self.source.as_deref());
            let added = self
                .store
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(entries.iter().cloned());
            debug!("Knowledge store: {added} new of {} extracted", entries.len());
            entries
        } else {
            Vec::new()
        };

        let outcome = self.reducer.reduce(messages)?;
        Ok(CleanupOutcome {
            messages: outcome.messages,
            knowledge: extracted,
            stats: outcome.stats,
            budget_before,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<Message> {
        (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!(
                        "Step {i}: Important: keep the retry budget at {i}. I need the tests to pass."
                    ))
                } else {
                    Message::model(format!("Acknowledged step {i}. Decision: proceed with plan {i}."))
                }
            })
            .collect()
    }

    fn small_config() -> ContextConfig {
        ContextConfig {
            fixed_token_threshold: 50,
            percentage_threshold: 0.1,
            ..ContextConfig::default()
        }
    }

    #[test]
    fn end_to_end_cleanup_shrinks_and_extracts() {
        let manager = ContextManager::new(&small_config());
        let messages = history();
        let outcome = manager
            .cleanup_if_needed(&messages, 32_000)
            .unwrap()
            .expect("cleanup should run");
        assert!(outcome.messages.len() <= messages.len());
        assert!(!outcome.knowledge.is_empty());
        assert!(!manager.store().lock().unwrap().is_empty());
        assert!(outcome.knowledge.iter().all(|e| e.has_tag(CLEANUP_TAG)));
    }

    #[test]
    fn no_cleanup_under_thresholds() {
        let manager = ContextManager::new(&ContextConfig::default());
        let messages = vec![Message::user("hi")];
        assert!(manager.cleanup_if_needed(&messages, 200_000).unwrap().is_none());
    }

    #[test]
    fn extraction_can_be_disabled() {
        let config = ContextConfig {
            auto_extract_knowledge: false,
            ..small_config()
        };
        let manager = ContextManager::new(&config);
        let outcome = manager.cleanup(&history(), 32_000).unwrap();
        assert!(outcome.knowledge.is_empty());
        assert!(manager.store().lock().unwrap().is_empty());
    }

    #[test]
    fn repeated_cleanup_does_not_duplicate_knowledge() {
        let manager = ContextManager::new(&small_config());
        let messages = history();
        manager.cleanup(&messages, 32_000).unwrap();
        let first = manager.store().lock().unwrap().len();
        manager.cleanup(&messages, 32_000).unwrap();
        assert_eq!(manager.store().lock().unwrap().len(), first);
    }

    #[test]
    fn projection_forces_cleanup_when_enabled() {
        let config = ContextConfig {
            fixed_token_threshold: usize::MAX,
            percentage_threshold: 0.8,
            ..ContextConfig::default()
        };
        // 70 tokens of 100.
        let messages = vec![Message::user("x".repeat(280))];
        let plain = ContextManager::new(&config);
        assert!(!plain.needs_cleanup(&messages, 100));
        let eager = ContextManager::new(&config).with_force_on_projection(true);
        assert!(eager.needs_cleanup(&messages, 100));
    }

    #[test]
    fn clones_share_the_store() {
        let manager = ContextManager::new(&small_config());
        let clone = manager.clone();
        clone.cleanup(&history(), 32_000).unwrap();
        assert!(!manager.store().lock().unwrap().is_empty());
    }

    #[test]
    fn source_is_recorded() {
        let manager = ContextManager::new(&small_config()).with_source("job-42");
        let outcome = manager.cleanup(&history(), 32_000).unwrap();
        assert!(
            outcome
                .knowledge
                .iter()
                .all(|e| e.source.as_deref() == Some("job-42"))
        );
    }
}
