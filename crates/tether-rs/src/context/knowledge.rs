//! Knowledge extraction and the bounded knowledge store.
//!
//! Before any message is dropped or rewritten, the text of the conversation is
//! scanned for salient fragments: definitions, requirements, decisions,
//! notes, stated preferences, file references, TODO markers and `key = value`
//! settings. Each match becomes a tagged [`KnowledgeEntry`] in a
//! [`KnowledgeStore`], so facts survive even when the message carrying them
//! does not.
//!
//! The store is FIFO-bounded by extraction order and never holds two entries
//! with the same `(content, tags)` pair.

use crate::Message;
use crate::error::PipelineResult;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex};
use tracing::{debug, trace};

/// Default store capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Texts shorter than this are not considered for fallback extraction.
const FALLBACK_MIN_CHARS: usize = 100;

/// Sentences longer than this are kept by the fallback even without an
/// importance word.
const FALLBACK_LONG_SENTENCE: usize = 80;

/// Upper bound on a fallback entry's length.
const FALLBACK_MAX_CHARS: usize = 200;

/// Tag given to fallback entries.
pub const GENERAL_TAG: &str = "general";

const IMPORTANCE_WORDS: &[&str] = &[
    "important",
    "key",
    "must",
    "critical",
    "remember",
    "always",
    "never",
    "decided",
    "because",
    "note",
];

// ── Patterns ───────────────────────────────────────────────────────

macro_rules! salience_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

salience_pattern!(
    RE_DEFINITION,
    r"(?i)\b[\w\-]+(?:\s+[\w\-]+){0,3}\s+(?:is defined as|refers to|means|is an?)\s+[^.\n]{1,200}"
);
salience_pattern!(
    RE_REQUIREMENT,
    r"(?i)\b(?:must|should|shall|(?:is|are) required to|needs? to)\b[^.\n]{1,200}"
);
salience_pattern!(
    RE_DECISION,
    r"(?i)\b(?:decision|decided|conclusion|we will|we'll|going with)\b[^.\n]{0,200}"
);
salience_pattern!(
    RE_IMPORTANT_NOTE,
    r"(?i)\b(?:important|note|warning|caution|critical)\s*:[^.\n]{1,200}"
);
salience_pattern!(
    RE_PREFERENCE,
    r"(?i)\bI\s+(?:need|want|prefer|would like|like)\b[^.\n]{1,200}"
);
salience_pattern!(
    RE_FILE_REFERENCE,
    r"\b[\w\-./]*\w\.(?:rs|toml|py|js|ts|tsx|jsx|go|java|kt|c|h|cpp|hpp|cs|rb|php|swift|md|json|ya?ml|sh|sql|html|css|lock|txt|cfg|ini)\b"
);
salience_pattern!(RE_TODO, r"\b(?:TODO|FIXME|HACK|XXX)\b:?[^\n]{0,200}");
salience_pattern!(
    RE_CONFIGURATION,
    r"\b[A-Za-z_][\w.\-]*\s*=\s*[^\s,;]+"
);

/// A labeled salience pattern.
struct SaliencePattern {
    label: &'static str,
    regex: &'static LazyLock<Option<Regex>>,
}

/// Patterns in application order.
static PATTERNS: &[SaliencePattern] = &[
    SaliencePattern {
        label: "technical-definition",
        regex: &RE_DEFINITION,
    },
    SaliencePattern {
        label: "requirement",
        regex: &RE_REQUIREMENT,
    },
    SaliencePattern {
        label: "decision",
        regex: &RE_DECISION,
    },
    SaliencePattern {
        label: "important-note",
        regex: &RE_IMPORTANT_NOTE,
    },
    SaliencePattern {
        label: "preference",
        regex: &RE_PREFERENCE,
    },
    SaliencePattern {
        label: "file-reference",
        regex: &RE_FILE_REFERENCE,
    },
    SaliencePattern {
        label: "todo",
        regex: &RE_TODO,
    },
    SaliencePattern {
        label: "configuration",
        regex: &RE_CONFIGURATION,
    },
];

/// Labels of every salience pattern, in application order.
pub fn pattern_labels() -> Vec<&'static str> {
    PATTERNS.iter().map(|p| p.label).collect()
}

/// Path-shaped tokens with a known source or config extension.
pub fn file_references(text: &str) -> Vec<&str> {
    RE_FILE_REFERENCE
        .as_ref()
        .map(|re| re.find_iter(text).map(|m| m.as_str()).collect())
        .unwrap_or_default()
}

/// Whether the whole token is a file reference.
pub fn is_file_reference(token: &str) -> bool {
    file_references(token).first().is_some_and(|m| *m == token)
}

// ── Entries ────────────────────────────────────────────────────────

/// A salient fragment lifted out of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    /// Identifier of the job or session that produced the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl KnowledgeEntry {
    pub fn new(content: impl Into<String>, tags: BTreeSet<String>, source: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            tags,
            source,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    fn dedup_key(&self) -> (String, BTreeSet<String>) {
        (self.content.clone(), self.tags.clone())
    }
}

// ── Extraction ─────────────────────────────────────────────────────

/// Extract knowledge entries from a single text.
///
/// Every pattern match yields an entry tagged with the pattern label plus
/// `tags`. When nothing matches and the text is longer than 100 characters,
/// sentences containing an importance word (or longer than 80 characters)
/// become `general` entries; failing that, the first 200 characters do.
pub fn extract_text(text: &str, tags: &[&str], source: Option<&str>) -> Vec<KnowledgeEntry> {
    let mut entries = Vec::new();
    let make = |content: &str, label: &str| {
        let mut set: BTreeSet<String> = tags.iter().map(|t| (*t).to_string()).collect();
        set.insert(label.to_string());
        KnowledgeEntry::new(content, set, source.map(str::to_string))
    };

    for pattern in PATTERNS {
        let Some(regex) = &**pattern.regex else {
            continue;
        };
        for m in regex.find_iter(text) {
            let content = m.as_str().trim();
            if !content.is_empty() {
                trace!("knowledge match [{}]: {content}", pattern.label);
                entries.push(make(content, pattern.label));
            }
        }
    }

    if entries.is_empty() && text.chars().count() > FALLBACK_MIN_CHARS {
        for sentence in split_sentences(text) {
            let lower = sentence.to_lowercase();
            if IMPORTANCE_WORDS.iter().any(|w| lower.contains(w))
                || sentence.chars().count() > FALLBACK_LONG_SENTENCE
            {
                entries.push(make(&truncate_chars(sentence, FALLBACK_MAX_CHARS), GENERAL_TAG));
            }
        }
        if entries.is_empty() {
            entries.push(make(
                &truncate_chars(text.trim(), FALLBACK_MAX_CHARS),
                GENERAL_TAG,
            ));
        }
    }

    entries
}

/// Extract knowledge entries from every text part of every message.
pub fn extract_messages(
    messages: &[Message],
    tags: &[&str],
    source: Option<&str>,
) -> Vec<KnowledgeEntry> {
    let entries: Vec<KnowledgeEntry> = messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .flat_map(|part| extract_text(part, tags, source))
        .collect();
    debug!(
        "Extracted {} knowledge entries from {} messages",
        entries.len(),
        messages.len()
    );
    entries
}

/// Split on sentence terminators and line breaks, trimming each piece.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ── Store ──────────────────────────────────────────────────────────

/// Size-bounded knowledge store with FIFO eviction.
///
/// # Example
///
/// ```
/// use tether_rs::context::knowledge::{KnowledgeStore, extract_text};
///
/// let mut store = KnowledgeStore::new(10);
/// store.extend(extract_text("Decision: ship on Friday", &[], None));
/// assert_eq!(store.by_tag("decision").len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    entries: VecDeque<KnowledgeEntry>,
    keys: HashSet<(String, BTreeSet<String>)>,
    max_entries: usize,
}

/// A store shared between the orchestrator and the periodic monitor.
pub type SharedKnowledgeStore = Arc<Mutex<KnowledgeStore>>;

impl KnowledgeStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            keys: HashSet::new(),
            max_entries,
        }
    }

    /// Wrap a new store for sharing across tasks.
    pub fn shared(max_entries: usize) -> SharedKnowledgeStore {
        Arc::new(Mutex::new(Self::new(max_entries)))
    }

    /// Insert an entry. Returns `false` if an entry with the same content and
    /// tags is already held. Evicts the oldest entries beyond capacity.
    pub fn insert(&mut self, entry: KnowledgeEntry) -> bool {
        if self.max_entries == 0 {
            return false;
        }
        let key = entry.dedup_key();
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.insert(key);
        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            if let Some(evicted) = self.entries.pop_front() {
                self.keys.remove(&evicted.dedup_key());
                trace!("knowledge store evicted {}", evicted.id);
            }
        }
        true
    }

    /// Insert many entries; returns how many were new.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = KnowledgeEntry>) -> usize {
        entries
            .into_iter()
            .map(|e| self.insert(e))
            .filter(|inserted| *inserted)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Entries in extraction order, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &KnowledgeEntry> {
        self.entries.iter()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&KnowledgeEntry> {
        self.entries.iter().filter(|e| e.has_tag(tag)).collect()
    }

    /// Case-insensitive substring search over entry content.
    pub fn search(&self, query: &str) -> Vec<&KnowledgeEntry> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.content.to_lowercase().contains(&needle))
            .collect()
    }

    /// The `n` most recently inserted entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<&KnowledgeEntry> {
        self.entries.iter().rev().take(n).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    /// Write all entries as pretty JSON (temp file + rename).
    pub fn save_json(&self, path: &Path) -> PipelineResult<()> {
        let entries: Vec<&KnowledgeEntry> = self.entries.iter().collect();
        let json = serde_json::to_string_pretty(&entries)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        debug!("Saved {} knowledge entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a snapshot written by [`save_json`](Self::save_json). A missing
    /// file yields an empty store.
    pub fn load_json(path: &Path, max_entries: usize) -> PipelineResult<Self> {
        let mut store = Self::new(max_entries);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<KnowledgeEntry> = serde_json::from_str(&content)?;
        store.extend(entries);
        debug!("Loaded {} knowledge entries from {}", store.len(), path.display());
        Ok(store)
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(entries: &[KnowledgeEntry]) -> BTreeSet<String> {
        entries.iter().flat_map(|e| e.tags.iter().cloned()).collect()
    }

    #[test]
    fn extracts_note_decision_and_preference() {
        let entries = extract_text("Important: X. Decision: Y. I need Z.", &[], None);
        let tags = labels(&entries);
        assert!(tags.contains("important-note"));
        assert!(tags.contains("decision"));
        assert!(tags.contains("preference"));
    }

    #[test]
    fn caller_tags_and_source_are_attached() {
        let entries = extract_text("Decision: use sqlite", &["session"], Some("job-7"));
        assert_eq!(entries.len(), 1);
        assert!(entries[0].has_tag("session"));
        assert!(entries[0].has_tag("decision"));
        assert_eq!(entries[0].source.as_deref(), Some("job-7"));
    }

    #[test]
    fn recognizes_files_todos_and_config() {
        let text = "Edit src/auth/login.rs\nTODO: handle expiry\ntimeout_ms = 3000";
        let tags = labels(&extract_text(text, &[], None));
        assert!(tags.contains("file-reference"));
        assert!(tags.contains("todo"));
        assert!(tags.contains("configuration"));
    }

    #[test]
    fn definition_pattern() {
        let entries = extract_text("A token refers to a chunk of text", &[], None);
        assert!(entries.iter().any(|e| e.has_tag("technical-definition")));
    }

    #[test]
    fn short_unmatched_text_yields_nothing() {
        assert!(extract_text("hello there", &[], None).is_empty());
    }

    #[test]
    fn long_unmatched_text_falls_back_to_general() {
        let text = "the quick brown fox jumps over the lazy dog again and again \
                    while the farmer watches from the porch with a cup of tea";
        let entries = extract_text(text, &[], None);
        assert!(!entries.is_empty());
        assert!(entries.iter().all(|e| e.has_tag(GENERAL_TAG)));
        assert!(entries.iter().all(|e| e.content.chars().count() <= 200));
    }

    #[test]
    fn fallback_prefers_sentences_with_importance_words() {
        let text = "Lunch was fine today. Remember the cache is cold after deploys. \
                    Then we went for a walk around the block and came back";
        let entries = extract_text(text, &[], None);
        assert!(
            entries
                .iter()
                .any(|e| e.content == "Remember the cache is cold after deploys")
        );
        assert!(!entries.iter().any(|e| e.content == "Lunch was fine today"));
    }

    #[test]
    fn reinserting_identical_extraction_does_not_grow_store() {
        let mut store = KnowledgeStore::new(50);
        let text = "Important: X. Decision: Y. I need Z.";
        let first = store.extend(extract_text(text, &["t"], None));
        let len = store.len();
        let second = store.extend(extract_text(text, &["t"], None));
        assert!(first > 0);
        assert_eq!(second, 0);
        assert_eq!(store.len(), len);
    }

    #[test]
    fn same_content_with_different_tags_is_distinct() {
        let mut store = KnowledgeStore::new(10);
        let a: BTreeSet<String> = ["a".to_string()].into();
        let b: BTreeSet<String> = ["b".to_string()].into();
        assert!(store.insert(KnowledgeEntry::new("x", a.clone(), None)));
        assert!(store.insert(KnowledgeEntry::new("x", b, None)));
        assert!(!store.insert(KnowledgeEntry::new("x", a, None)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn fifo_eviction_at_capacity() {
        let mut store = KnowledgeStore::new(2);
        for c in ["one", "two", "three"] {
            store.insert(KnowledgeEntry::new(c, BTreeSet::new(), None));
        }
        let contents: Vec<&str> = store.entries().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
        // Evicted content may be inserted again.
        assert!(store.insert(KnowledgeEntry::new("one", BTreeSet::new(), None)));
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut store = KnowledgeStore::new(0);
        assert!(!store.insert(KnowledgeEntry::new("x", BTreeSet::new(), None)));
        assert!(store.is_empty());
    }

    #[test]
    fn queries() {
        let mut store = KnowledgeStore::new(10);
        store.extend(extract_text("Decision: use Postgres", &[], None));
        store.extend(extract_text("Warning: disk nearly full", &[], None));
        assert_eq!(store.search("postgres").len(), 1);
        assert_eq!(store.by_tag("important-note").len(), 1);
        assert_eq!(store.recent(1)[0].content, "Warning: disk nearly full");
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/knowledge.json");

        let missing = KnowledgeStore::load_json(&path, 10).unwrap();
        assert!(missing.is_empty());

        let mut store = KnowledgeStore::new(10);
        store.extend(extract_text("Decision: keep the cache", &["s"], Some("j1")));
        store.save_json(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = KnowledgeStore::load_json(&path, 10).unwrap();
        assert_eq!(loaded.len(), store.len());
        let original: Vec<_> = store.entries().collect();
        let restored: Vec<_> = loaded.entries().collect();
        assert_eq!(original, restored);
    }
}
