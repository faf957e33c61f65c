//! Tool-response eviction: drop oversized tool output that carries no
//! outcome signal.
//!
//! Tool results are the largest context consumer in an agent conversation. A
//! directory listing or a file dump is useful for one turn and dead weight
//! afterward. Any `tool` message longer than the cap is removed unless its
//! text mentions an outcome keyword such as `error` or `success`, in which
//! case it may still explain what happened and is kept for the later
//! strategies to compress.
//!
//! Only `tool` messages are ever dropped here.

use super::reducer::Tracked;
use crate::MessageRole;
use tracing::trace;

/// Keywords that mark a tool result as worth keeping regardless of size.
pub const ESSENTIAL_KEYWORDS: &[&str] = &[
    "error",
    "fail",
    "success",
    "done",
    "critical",
    "warning",
    "exception",
    "panic",
    "passed",
    "complete",
];

/// Whether text mentions any essential keyword (case-insensitive).
pub fn is_essential(text: &str) -> bool {
    let lower = text.to_lowercase();
    ESSENTIAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Drop `tool` messages whose text exceeds `cap` characters and lacks an
/// essential keyword. Returns the number of messages dropped.
pub fn evict_tool_responses(messages: &mut Vec<Tracked>, cap: usize) -> usize {
    let before = messages.len();
    messages.retain(|t| {
        if t.message.role != MessageRole::Tool {
            return true;
        }
        let text = t.message.text();
        let keep = text.chars().count() <= cap || is_essential(&text);
        if !keep {
            trace!(
                "Evicting tool response #{} ({} chars)",
                t.origin,
                text.chars().count()
            );
        }
        keep
    });
    before - messages.len()
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
    fn drops_large_plain_tool_output() {
        let mut list = tracked(vec![
            Message::user("list the repo"),
            Message::tool("a.txt\n".repeat(100)),
            Message::model("here it is"),
        ]);
        assert_eq!(evict_tool_responses(&mut list, 200), 1);
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].origin, 2);
    }

    #[test]
    fn keeps_large_output_with_outcome_keyword() {
        let mut body = "x".repeat(500);
        body.push_str(" Build FAILED ");
        let mut list = tracked(vec![Message::tool(body)]);
        assert_eq!(evict_tool_responses(&mut list, 200), 0);
    }

    #[test]
    fn never_touches_user_or_model_messages() {
        let mut list = tracked(vec![
            Message::user("y".repeat(1000)),
            Message::model("z".repeat(1000)),
        ]);
        assert_eq!(evict_tool_responses(&mut list, 10), 0);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn small_tool_output_survives() {
        let mut list = tracked(vec![Message::tool("ok")]);
        assert_eq!(evict_tool_responses(&mut list, 10), 0);
    }
}
