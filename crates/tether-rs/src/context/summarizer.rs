//! Synthetic summarization of very long parts.
//!
//! No model call is made. A part over the threshold is replaced with its
//! opening and closing sentence fragments plus a pointer to the knowledge
//! store, which received the full text during extraction.

use super::knowledge::{split_sentences, truncate_chars};

/// Parts longer than this (in characters) are summarized by default.
pub const DEFAULT_SUMMARIZE_THRESHOLD: usize = 2000;

/// Default length of each sentence fragment kept in a summary.
pub const DEFAULT_FRAGMENT_CHARS: usize = 150;

/// Text appended to every summary.
pub const RETAINED_POINTER: &str = "[full content retained in the knowledge store]";

/// Configuration for synthetic summarization.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub threshold: usize,
    pub fragment_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SUMMARIZE_THRESHOLD,
            fragment_chars: DEFAULT_FRAGMENT_CHARS,
        }
    }
}

/// Summarize a part longer than `config.threshold` characters.
pub fn summarize_part(text: &str, config: &SummarizerConfig) -> Option<String> {
    let len = text.chars().count();
    if len <= config.threshold {
        return None;
    }

    let sentences = split_sentences(text);
    let first = sentences.first().copied().unwrap_or("");
    let last = sentences.last().copied().unwrap_or("");

    let mut summary = format!("[Summary of {len} chars] ");
    summary.push_str(&truncate_chars(first, config.fragment_chars));
    if sentences.len() > 1 {
        summary.push_str(" ... ");
        summary.push_str(&truncate_chars(last, config.fragment_chars));
    }
    summary.push(' ');
    summary.push_str(RETAINED_POINTER);

    (summary.chars().count() < len).then_some(summary)
}
