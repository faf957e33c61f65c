//! Policy-driven context reduction.
//!
//! A single [`ContextReducer`] applies the strategies enabled in its
//! [`ReductionPolicy`], always in the same order:
//!
//! 1. tool-response eviction ([`eviction`](super::eviction))
//! 2. redundancy removal ([`compress::remove_redundant`])
//! 3. text compression ([`compress::compress_part`])
//! 4. synthetic summarization ([`summarizer::summarize_part`])
//!
//! A repair pass then runs unconditionally: the most recent user message and
//! the model reply immediately after it are always present in the output,
//! reinserted from the input if a strategy dropped them. Every message keeps
//! the index it had in the input so relative order is preserved.

use super::budget::estimate_tokens;
use super::compress;
use super::eviction;
use super::summarizer::{self, SummarizerConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::{Message, MessageRole};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A message paired with its index in the reducer's input.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked {
    pub origin: usize,
    pub message: Message,
}

// ── Policy ─────────────────────────────────────────────────────────

/// Which reduction strategies run, and their limits.
///
/// # Example
///
/// ```
/// use tether_rs::context::reducer::ReductionPolicy;
///
/// let policy = ReductionPolicy::standard().with_tool_eviction(1500);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionPolicy {
    pub evict_tool_responses: bool,
    /// Tool messages longer than this (characters) are evicted unless they
    /// mention an outcome keyword.
    pub tool_response_cap: usize,
    pub remove_redundancy: bool,
    pub compress: bool,
    /// Parts longer than this (characters) are compressed.
    pub compress_min_len: usize,
    /// Head and tail length kept by the excerpt fallback.
    pub excerpt_chars: usize,
    pub summarize: bool,
    pub summarize_threshold: usize,
    pub fragment_chars: usize,
}

impl ReductionPolicy {
    /// Redundancy removal, compression and summarization.
    pub fn standard() -> Self {
        Self {
            evict_tool_responses: false,
            tool_response_cap: 2000,
            remove_redundancy: true,
            compress: true,
            compress_min_len: 1000,
            excerpt_chars: 200,
            summarize: true,
            summarize_threshold: summarizer::DEFAULT_SUMMARIZE_THRESHOLD,
            fragment_chars: summarizer::DEFAULT_FRAGMENT_CHARS,
        }
    }

    /// Every strategy, with tighter limits.
    pub fn aggressive() -> Self {
        Self {
            evict_tool_responses: true,
            tool_response_cap: 500,
            remove_redundancy: true,
            compress: true,
            compress_min_len: 400,
            excerpt_chars: 100,
            summarize: true,
            summarize_threshold: 1200,
            fragment_chars: 100,
        }
    }

    /// No strategies; only the repair pass runs.
    pub fn none() -> Self {
        Self {
            evict_tool_responses: false,
            remove_redundancy: false,
            compress: false,
            summarize: false,
            ..Self::standard()
        }
    }

    pub fn with_tool_eviction(mut self, cap: usize) -> Self {
        self.evict_tool_responses = true;
        self.tool_response_cap = cap;
        self
    }

    /// Check that enabled strategies have usable limits.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.compress {
            if self.excerpt_chars == 0 {
                return Err(PipelineError::InvalidPolicy(
                    "excerpt_chars must be positive when compression is enabled".into(),
                ));
            }
            if self.compress_min_len <= self.excerpt_chars * 2 {
                return Err(PipelineError::InvalidPolicy(format!(
                    "compress_min_len ({}) must exceed twice excerpt_chars ({})",
                    self.compress_min_len, self.excerpt_chars
                )));
            }
        }
        if self.summarize && self.summarize_threshold <= self.fragment_chars * 2 {
            return Err(PipelineError::InvalidPolicy(format!(
                "summarize_threshold ({}) must exceed twice fragment_chars ({})",
                self.summarize_threshold, self.fragment_chars
            )));
        }
        Ok(())
    }

    fn summarizer_config(&self) -> SummarizerConfig {
        SummarizerConfig {
            threshold: self.summarize_threshold,
            fragment_chars: self.fragment_chars,
        }
    }
}

impl Default for ReductionPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

// ── Results ────────────────────────────────────────────────────────

/// What a reduction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionStats {
    pub messages_before: usize,
    pub messages_after: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub tool_messages_dropped: usize,
    pub duplicate_parts_removed: usize,
    pub parts_compressed: usize,
    pub parts_summarized: usize,
    /// Messages reinserted by the repair pass.
    pub repaired: usize,
    /// Whether the output differs from the input at all.
    pub changed: bool,
}

impl ReductionStats {
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }

    pub fn to_log_string(&self) -> String {
        format!(
            "{} -> {} messages, ~{} -> ~{} tokens",
            self.messages_before, self.messages_after, self.tokens_before, self.tokens_after
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReductionOutcome {
    pub messages: Vec<Message>,
    pub stats: ReductionStats,
}

// ── Reducer ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ContextReducer {
    policy: ReductionPolicy,
}

impl ContextReducer {
    pub fn new(policy: ReductionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReductionPolicy {
        &self.policy
    }

    /// Produce a reduced copy of `messages`.
    ///
    /// Fails only when the policy does not validate.
    pub fn reduce(&self, messages: &[Message]) -> PipelineResult<ReductionOutcome> {
        self.policy.validate()?;

        let mut stats = ReductionStats {
            messages_before: messages.len(),
            tokens_before: estimate_tokens(messages),
            ..Default::default()
        };

        let mut working: Vec<Tracked> = messages
            .iter()
            .cloned()
            .enumerate()
            .map(|(origin, message)| Tracked { origin, message })
            .collect();

        if self.policy.evict_tool_responses {
            stats.tool_messages_dropped =
                eviction::evict_tool_responses(&mut working, self.policy.tool_response_cap);
        }

        if self.policy.remove_redundancy {
            stats.duplicate_parts_removed = compress::remove_redundant(&mut working);
        }

        if self.policy.compress {
            stats.parts_compressed = rewrite_parts(&mut working, |part| {
                compress::compress_part(part, self.policy.compress_min_len, self.policy.excerpt_chars)
            });
        }

        if self.policy.summarize {
            let config = self.policy.summarizer_config();
            stats.parts_summarized =
                rewrite_parts(&mut working, |part| summarizer::summarize_part(part, &config));
        }

        stats.repaired = repair(&mut working, messages);

        let reduced: Vec<Message> = working.into_iter().map(|t| t.message).collect();
        stats.messages_after = reduced.len();
        stats.tokens_after = estimate_tokens(&reduced);
        stats.changed = reduced != messages;

        info!("Context reduced: {}", stats.to_log_string());
        debug!(
            "  dropped={} dedup={} compressed={} summarized={} repaired={}",
            stats.tool_messages_dropped,
            stats.duplicate_parts_removed,
            stats.parts_compressed,
            stats.parts_summarized,
            stats.repaired,
        );

        Ok(ReductionOutcome {
            messages: reduced,
            stats,
        })
    }
}

/// Replace every part for which `rewrite` returns a value. Returns how many
/// parts changed.
fn rewrite_parts(working: &mut [Tracked], rewrite: impl Fn(&str) -> Option<String>) -> usize {
    let mut changed = 0;
    for t in working.iter_mut() {
        for part in t.message.parts.iter_mut() {
            if let Some(replacement) = rewrite(part) {
                *part = replacement;
                changed += 1;
            }
        }
    }
    changed
}

/// Reinsert the most recent user message and the model reply that directly
/// follows it, if either was dropped. Returns how many were reinserted.
fn repair(working: &mut Vec<Tracked>, original: &[Message]) -> usize {
    let Some(last_user) = original.iter().rposition(|m| m.role == MessageRole::User) else {
        return 0;
    };

    let mut required = vec![last_user];
    if original
        .get(last_user + 1)
        .is_some_and(|m| m.role == MessageRole::Model)
    {
        required.push(last_user + 1);
    }

    let mut reinserted = 0;
    for origin in required {
        if working.iter().any(|t| t.origin == origin) {
            continue;
        }
        let at = working.partition_point(|t| t.origin < origin);
        working.insert(
            at,
            Tracked {
                origin,
                message: original[origin].clone(),
            },
        );
        debug!("Repair reinserted message #{origin}");
        reinserted += 1;
    }
    reinserted
}
