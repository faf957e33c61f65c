//! Context window management: budgets, knowledge, and reduction.
//!
//! 1. **[`budget`]**: token estimation and the reduce-now / reduce-soon
//!    decision.
//! 2. **[`knowledge`]**: salience extraction into a bounded, deduplicated
//!    [`KnowledgeStore`].
//! 3. **[`reducer`]**: one [`ContextReducer`] driven by a
//!    [`ReductionPolicy`] that toggles the strategies in [`eviction`],
//!    [`compress`] and [`summarizer`], followed by an invariant repair pass.
//! 4. **[`manager`]**: [`ContextManager`] ties the three together:
//!    check, extract from the unreduced list, reduce.

pub mod budget;
pub mod compress;
pub mod eviction;
pub mod knowledge;
pub mod manager;
pub mod reducer;
pub mod summarizer;

pub use budget::{BudgetMonitor, BudgetState, BudgetVerdict, CHARS_PER_TOKEN};
pub use knowledge::{KnowledgeEntry, KnowledgeStore, SharedKnowledgeStore};
pub use manager::{CleanupOutcome, ContextManager};
pub use reducer::{ContextReducer, ReductionOutcome, ReductionPolicy, ReductionStats};
