//! Redundancy removal and rule-based text compression.
//!
//! Redundancy removal compares parts by a normalized form (lowercase, no
//! punctuation, collapsed whitespace) and keeps only the first occurrence
//! across the whole list. Compression shortens a long part to its marked
//! lines (`Important:`, `Decision:`, `Result:` ...) or, when none are
//! present, to a head and tail excerpt.

use super::reducer::Tracked;
use crate::MessageRole;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Maximum marked lines kept when compressing.
pub const MAX_MARKED_LINES: usize = 5;

static RE_MARKED_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:important|critical|note|warning|decision|result|outcome)\s*:[^\n]*",
    )
    .ok()
});

/// Normalize a part for duplicate detection.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stand-in part for a user or model message whose parts were all duplicates.
pub const DUPLICATE_MARKER: &str = "[duplicate of earlier message]";

/// Drop every part whose normalized form already appeared earlier in the
/// list. Parts that normalize to nothing are never considered duplicates.
///
/// Only tool messages are removed when they lose all their parts. A user or
/// model message keeps its first part, or [`DUPLICATE_MARKER`] when that is
/// shorter, so the conversation's turn structure survives.
///
/// Returns the number of parts removed or replaced.
pub fn remove_redundant(messages: &mut Vec<Tracked>) -> usize {
    let mut seen: HashSet<String> = HashSet::new();
    let mut removed = 0;
    messages.retain_mut(|t| {
        let before = t.message.parts.len();
        let first = t.message.parts.first().cloned();
        t.message.parts.retain(|part| {
            let key = normalize(part);
            key.is_empty() || seen.insert(key)
        });
        removed += before - t.message.parts.len();

        if t.message.parts.is_empty()
            && t.message.role != MessageRole::Tool
            && let Some(first) = first
        {
            if first.chars().count() <= DUPLICATE_MARKER.chars().count() {
                removed -= 1;
                t.message.parts.push(first);
            } else {
                t.message.parts.push(DUPLICATE_MARKER.to_string());
            }
        }
        before == 0 || !t.message.parts.is_empty()
    });
    removed
}

/// Compress one part if it is longer than `min_len` characters.
///
/// Returns `None` when the part is short enough or no candidate is strictly
/// shorter than the original.
pub fn compress_part(text: &str, min_len: usize, excerpt_chars: usize) -> Option<String> {
    let len = text.chars().count();
    if len <= min_len {
        return None;
    }

    let marked: Vec<&str> = RE_MARKED_LINE
        .as_ref()
        .map(|re| {
            re.find_iter(text)
                .map(|m| m.as_str().trim())
                .take(MAX_MARKED_LINES)
                .collect()
        })
        .unwrap_or_default();

    let candidate = if marked.is_empty() {
        head_tail_excerpt(text, excerpt_chars)?
    } else {
        marked.join("\n")
    };

    (candidate.chars().count() < len).then_some(candidate)
}

/// First and last `excerpt_chars` characters around an elision marker.
fn head_tail_excerpt(text: &str, excerpt_chars: usize) -> Option<String> {
    let len = text.chars().count();
    if len <= excerpt_chars * 2 {
        return None;
    }
    let head: String = text.chars().take(excerpt_chars).collect();
    let tail: String = text.chars().skip(len - excerpt_chars).collect();
    let elided = len - excerpt_chars * 2;
    Some(format!(
        "{}\n[... {elided} chars elided ...]\n{}",
        head.trim_end(),
        tail.trim_start()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    fn tracked(messages: Vec<Message>) -> Vec<Tracked> {
        messages
            .into_iter()
            .enumerate()
            .map(|(origin, message)| Tracked { origin, message })
            .collect()
    }

    #[test]
    fn normalize_ignores_case_punctuation_and_spacing() {
        assert_eq!(normalize("  Hello,   World!  "), "hello world");
        assert_eq!(normalize("hello world"), normalize("HELLO... world"));
        assert_eq!(normalize("?!"), "");
    }

    #[test]
    fn duplicates_are_removed_across_messages() {
        let mut list = tracked(vec![
            Message::user("Run the tests."),
            Message::tool("run the tests"),
            Message::new(
                MessageRole::Model,
                vec!["RUN THE TESTS!".into(), "Done.".into()],
            ),
        ]);
        let removed = remove_redundant(&mut list);
        assert_eq!(removed, 2);
        // The tool message lost its only part and is gone.
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].message.parts, vec!["Done.".to_string()]);
        assert_eq!(list[1].origin, 2);
    }

    #[test]
    fn repeated_short_user_turn_is_kept() {
        let mut list = tracked(vec![
            Message::user("ok"),
            Message::model("Plan A drafted."),
            Message::user("ok"),
            Message::model("Plan B drafted."),
        ]);
        assert_eq!(remove_redundant(&mut list), 0);
        let roles: Vec<_> = list.iter().map(|t| t.message.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Model,
                MessageRole::User,
                MessageRole::Model
            ]
        );
        assert_eq!(list[2].message.parts, vec!["ok".to_string()]);
    }

    #[test]
    fn long_duplicate_model_message_becomes_marker() {
        let answer = "The parser accepts trailing commas in every list form.";
        let mut list = tracked(vec![
            Message::model(answer),
            Message::user("again?"),
            Message::model(answer),
        ]);
        assert_eq!(remove_redundant(&mut list), 1);
        assert_eq!(list.len(), 3);
        assert_eq!(list[2].message.role, MessageRole::Model);
        assert_eq!(list[2].message.parts, vec![DUPLICATE_MARKER.to_string()]);
    }

    #[test]
    fn punctuation_only_parts_are_not_duplicates() {
        let mut list = tracked(vec![Message::user("..."), Message::user("...")]);
        assert_eq!(remove_redundant(&mut list), 0);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn compress_prefers_marked_lines() {
        let mut text = "filler line\n".repeat(100);
        text.push_str("Decision: adopt tokio\nResult: 3x throughput\n");
        let out = compress_part(&text, 100, 50).unwrap();
        assert_eq!(out, "Decision: adopt tokio\nResult: 3x throughput");
    }

    #[test]
    fn compress_caps_marked_lines() {
        let text = (0..10)
            .map(|i| format!("Note: item {i} {}", "pad ".repeat(20)))
            .collect::<Vec<_>>()
            .join("\n");
        let out = compress_part(&text, 100, 50).unwrap();
        assert_eq!(out.lines().count(), MAX_MARKED_LINES);
    }

    #[test]
    fn compress_falls_back_to_head_and_tail() {
        let text = format!("BEGIN {} END", "m".repeat(1000));
        let out = compress_part(&text, 100, 20).unwrap();
        assert!(out.starts_with("BEGIN"));
        assert!(out.ends_with("END"));
        assert!(out.contains("chars elided"));
        assert!(out.chars().count() < text.chars().count());
    }

    #[test]
    fn short_parts_are_left_alone() {
        assert!(compress_part("short", 100, 20).is_none());
    }
}
