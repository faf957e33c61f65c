//! Token budget monitoring: estimates how much of the model's context window
//! a conversation occupies and decides when it must be reduced.
//!
//! Estimation is deliberately coarse: every text part costs
//! `ceil(chars / CHARS_PER_TOKEN)` tokens. Reduction is due when either the
//! absolute token count exceeds a fixed threshold **or** the fraction of the
//! window in use reaches a percentage threshold. A growth projection lets
//! callers act one turn early.

use crate::Message;
use serde::{Deserialize, Serialize};

/// Characters per token used for estimation.
pub const CHARS_PER_TOKEN: usize = 4;

/// Default multiplier applied to current usage to project the next turn.
pub const PROJECTION_GROWTH_FACTOR: f64 = 1.2;

/// Estimated token cost of one text part.
pub fn estimate_part_tokens(part: &str) -> usize {
    part.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimated token cost of a message list.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .map(|p| estimate_part_tokens(p))
        .sum()
}

/// Snapshot of budget consumption. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub tokens_used: usize,
    pub tokens_limit: usize,
    /// Fraction of the window in use; may exceed 1.0.
    pub percentage_used: f64,
}

impl BudgetState {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.tokens_used,
            self.percentage_used * 100.0,
            self.tokens_limit,
        )
    }
}

/// Outcome of a combined threshold + projection check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetVerdict {
    Within,
    /// Under threshold now, but the projected next turn is not.
    Projected,
    Exceeded,
}

/// Compute usage for a message list against a model's context window.
pub fn usage(messages: &[Message], model_limit: usize) -> BudgetState {
    let tokens_used = estimate_tokens(messages);
    let percentage_used = if model_limit > 0 {
        tokens_used as f64 / model_limit as f64
    } else if tokens_used > 0 {
        1.0
    } else {
        0.0
    };
    BudgetState {
        tokens_used,
        tokens_limit: model_limit,
        percentage_used,
    }
}

/// Whether the conversation must be reduced now.
///
/// True when `tokens_used > fixed_threshold` or
/// `percentage_used >= percent_threshold`; either alone suffices.
pub fn should_reduce(
    messages: &[Message],
    model_limit: usize,
    percent_threshold: f64,
    fixed_threshold: usize,
) -> bool {
    let state = usage(messages, model_limit);
    exceeds(&state, percent_threshold, fixed_threshold)
}

fn exceeds(state: &BudgetState, percent_threshold: f64, fixed_threshold: usize) -> bool {
    state.tokens_used > fixed_threshold || state.percentage_used >= percent_threshold
}

/// Threshold configuration plus the projection factor.
///
/// # Example
///
/// ```
/// use tether_rs::context::budget::{BudgetMonitor, BudgetVerdict};
/// use tether_rs::Message;
///
/// let monitor = BudgetMonitor::new(0.8, 4000);
/// let messages = vec![Message::user("hello")];
/// assert_eq!(monitor.check(&messages, 200_000), BudgetVerdict::Within);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BudgetMonitor {
    pub percent_threshold: f64,
    pub fixed_threshold: usize,
    pub growth_factor: f64,
}

impl BudgetMonitor {
    pub fn new(percent_threshold: f64, fixed_threshold: usize) -> Self {
        Self {
            percent_threshold,
            fixed_threshold,
            growth_factor: PROJECTION_GROWTH_FACTOR,
        }
    }

    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    pub fn usage(&self, messages: &[Message], model_limit: usize) -> BudgetState {
        usage(messages, model_limit)
    }

    pub fn should_reduce(&self, messages: &[Message], model_limit: usize) -> bool {
        should_reduce(
            messages,
            model_limit,
            self.percent_threshold,
            self.fixed_threshold,
        )
    }

    /// `percentage_used * growth_factor`.
    pub fn projected_percentage(&self, state: &BudgetState) -> f64 {
        state.percentage_used * self.growth_factor
    }

    /// Whether the projected usage reaches the percentage threshold.
    pub fn reduction_projected(&self, state: &BudgetState) -> bool {
        self.projected_percentage(state) >= self.percent_threshold
    }

    pub fn verdict(&self, state: &BudgetState) -> BudgetVerdict {
        if exceeds(state, self.percent_threshold, self.fixed_threshold) {
            BudgetVerdict::Exceeded
        } else if self.reduction_projected(state) {
            BudgetVerdict::Projected
        } else {
            BudgetVerdict::Within
        }
    }

    pub fn check(&self, messages: &[Message], model_limit: usize) -> BudgetVerdict {
        self.verdict(&usage(messages, model_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> Message {
        Message::user(text)
    }

    #[test]
    fn empty_input_is_zero_usage() {
        let state = usage(&[], 1000);
        assert_eq!(state.tokens_used, 0);
        assert_eq!(state.percentage_used, 0.0);
    }

    #[test]
    fn tokens_round_up_per_part() {
        assert_eq!(estimate_part_tokens(""), 0);
        assert_eq!(estimate_part_tokens("a"), 1);
        assert_eq!(estimate_part_tokens("abcd"), 1);
        assert_eq!(estimate_part_tokens("abcde"), 2);
        let two_parts = Message::new(crate::MessageRole::User, vec!["a".into(), "b".into()]);
        assert_eq!(estimate_tokens(&[two_parts]), 2);
    }

    #[test]
    fn usage_is_monotonic_as_text_is_appended() {
        let mut messages = Vec::new();
        let mut last = 0;
        for i in 0..20 {
            messages.push(msg(&"word ".repeat(i)));
            let now = usage(&messages, 10_000).tokens_used;
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn fixed_threshold_alone_triggers() {
        // 400 chars = 100 tokens against a huge window: percentage is tiny.
        let messages = vec![msg(&"x".repeat(400))];
        assert!(should_reduce(&messages, 10_000_000, 0.99, 50));
    }

    #[test]
    fn percentage_threshold_alone_triggers() {
        // 100 tokens of a 200 token window = 50%, fixed threshold unreachable.
        let messages = vec![msg(&"x".repeat(400))];
        assert!(should_reduce(&messages, 200, 0.5, usize::MAX));
        assert!(!should_reduce(&messages, 200, 0.51, usize::MAX));
    }

    #[test]
    fn fixed_threshold_is_strict() {
        let messages = vec![msg(&"x".repeat(400))];
        assert!(!should_reduce(&messages, 10_000_000, 0.99, 100));
        assert!(should_reduce(&messages, 10_000_000, 0.99, 99));
    }

    #[test]
    fn zero_limit_counts_as_full() {
        let state = usage(&[msg("hi")], 0);
        assert_eq!(state.percentage_used, 1.0);
        assert_eq!(usage(&[], 0).percentage_used, 0.0);
    }

    #[test]
    fn projection_flags_before_threshold() {
        let monitor = BudgetMonitor::new(0.8, usize::MAX);
        // 70 tokens / 100 = 0.7; projected 0.84.
        let messages = vec![msg(&"x".repeat(280))];
        let state = monitor.usage(&messages, 100);
        assert!(!monitor.should_reduce(&messages, 100));
        assert!(monitor.reduction_projected(&state));
        assert_eq!(monitor.check(&messages, 100), BudgetVerdict::Projected);
        assert_eq!(monitor.check(&messages, 1000), BudgetVerdict::Within);
        assert_eq!(monitor.check(&messages, 70), BudgetVerdict::Exceeded);
    }

    #[test]
    fn log_string_format() {
        let state = usage(&[msg("hello world")], 1000);
        let log = state.to_log_string();
        assert!(log.contains("context:"));
        assert!(log.contains("of 1000"));
    }
}
