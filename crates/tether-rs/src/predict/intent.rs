//! Rule-based intent classification.
//!
//! This is a deterministic keyword heuristic, not model inference. The
//! lowercased input is tested against keyword families in priority order
//! (debug vocabulary before generic change vocabulary, since bug-fix language
//! is more specific); the first family that matches decides the
//! [`IntentType`] and its base confidence. Auxiliary technical keywords add a
//! small boost each. Targets (domain keywords, file paths, named symbols) are
//! collected from the input and the most recent context messages.

use crate::Message;
use crate::context::knowledge::{file_references, is_file_reference};
use crate::error::{PipelineError, PipelineResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static RE_SYMBOL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(?:function|class|method|fn|struct|trait|enum)\s+([A-Za-z_][A-Za-z0-9_]*)").ok()
});

// ── Types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentType {
    CodeChange,
    Query,
    Debug,
    Refactor,
    Research,
    Other,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::CodeChange => "code-change",
            IntentType::Query => "query",
            IntentType::Debug => "debug",
            IntentType::Refactor => "refactor",
            IntentType::Research => "research",
            IntentType::Other => "other",
        }
    }

    /// Canned outcome phrase for the type.
    pub fn expected_outcome(&self) -> Option<&'static str> {
        match self {
            IntentType::CodeChange => Some("Added new functionality"),
            IntentType::Query => Some("Answered the question"),
            IntentType::Debug => Some("Fixed an issue or error"),
            IntentType::Refactor => Some("Improved code structure without changing behavior"),
            IntentType::Research => Some("Gathered information on the topic"),
            IntentType::Other => None,
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The predicted goal of one user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub confidence: f64,
    /// File paths, symbol names and domain keywords, deduplicated.
    pub targets: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
}

impl Intent {
    pub fn new(intent_type: IntentType, confidence: f64, targets: BTreeSet<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            intent_type,
            confidence,
            targets,
            expected_outcome: intent_type.expected_outcome().map(str::to_string),
        }
    }

    /// Targets that look like file paths.
    pub fn file_targets(&self) -> Vec<&str> {
        self.targets
            .iter()
            .map(String::as_str)
            .filter(|t| is_file_reference(t))
            .collect()
    }

    /// Targets that are not file paths (keywords and symbols).
    pub fn keyword_targets(&self) -> Vec<&str> {
        self.targets
            .iter()
            .map(String::as_str)
            .filter(|t| !is_file_reference(t))
            .collect()
    }
}

// ── Configuration ──────────────────────────────────────────────────

/// One keyword family: its patterns decide membership, its base confidence
/// seeds the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentFamily {
    pub intent: IntentType,
    pub base_confidence: f64,
    pub patterns: Vec<String>,
}

impl IntentFamily {
    pub fn new(intent: IntentType, base_confidence: f64, patterns: &[&str]) -> Self {
        Self {
            intent,
            base_confidence,
            patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

/// Keyword tables for the classifier. Families are tested in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub families: Vec<IntentFamily>,
    /// Confidence assigned when no family matches.
    pub fallback_confidence: f64,
    /// Words whose presence raises confidence by `keyword_boost` each.
    pub technical_keywords: Vec<String>,
    pub keyword_boost: f64,
    /// Domain vocabulary recorded as targets on a word-prefix match.
    pub domain_keywords: Vec<String>,
    /// How many trailing context messages are scanned for targets.
    pub context_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            families: vec![
                IntentFamily::new(
                    IntentType::Debug,
                    0.9,
                    &[
                        r"\b(?:fix(?:es|ed|ing)?|bugs?|buggy|errors?|issues?|crash(?:es|ed|ing)?)\b",
                        r"\b(?:fail(?:s|ed|ing|ure)?|broken|debug(?:ging)?|exceptions?|panic(?:s|ked)?)\b",
                        r"\b(?:not working|doesn'?t work|stack ?trace|regression)\b",
                    ],
                ),
                IntentFamily::new(
                    IntentType::Refactor,
                    0.85,
                    &[
                        r"\b(?:refactor(?:ing|ed)?|restructure|reorganize|simplify|rename|deduplicate)\b",
                        r"\b(?:clean ?up|extract (?:a )?(?:method|function|module))\b",
                    ],
                ),
                IntentFamily::new(
                    IntentType::CodeChange,
                    0.8,
                    &[
                        r"\b(?:add|implement|create|write|change|modify|update|build|introduce)\b",
                        r"\b(?:remove|delete|replace|make|support)\b",
                    ],
                ),
                IntentFamily::new(
                    IntentType::Research,
                    0.7,
                    &[
                        r"\b(?:research|investigate|compare|alternatives?|best practices?)\b",
                        r"\b(?:learn about|look up|documentation|docs|state of the art)\b",
                    ],
                ),
                IntentFamily::new(
                    IntentType::Query,
                    0.6,
                    &[
                        r"\b(?:what|how|why|where|when|which|who)\b",
                        r"\b(?:explain|show|describe|tell me|list|find)\b",
                        r"\?",
                    ],
                ),
            ],
            fallback_confidence: 0.4,
            technical_keywords: [
                "function", "class", "method", "struct", "module", "api", "endpoint", "async",
                "await", "error", "exception", "test", "type", "trait",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            keyword_boost: 0.05,
            domain_keywords: [
                "auth", "login", "logout", "session", "token", "user", "service", "api",
                "database", "cache", "config", "server", "client", "parser", "router",
                "handler", "payment", "search", "deploy", "build", "cli", "ui",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            context_window: 5,
        }
    }
}

// ── Classifier ─────────────────────────────────────────────────────

struct CompiledFamily {
    intent: IntentType,
    base_confidence: f64,
    patterns: Vec<Regex>,
}

/// Compiled classifier. Build once, classify every turn.
///
/// # Example
///
/// ```
/// use tether_rs::predict::intent::{ClassifierConfig, IntentClassifier, IntentType};
///
/// let classifier = IntentClassifier::new(ClassifierConfig::default()).unwrap();
/// let intent = classifier.classify("Why is the cache cold?", &[]).unwrap();
/// assert_eq!(intent.intent_type, IntentType::Query);
/// ```
pub struct IntentClassifier {
    families: Vec<CompiledFamily>,
    technical: Vec<Regex>,
    domain: Vec<(String, Regex)>,
    fallback_confidence: f64,
    keyword_boost: f64,
    context_window: usize,
}

impl fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentClassifier")
            .field(
                "families",
                &self.families.iter().map(|fam| fam.intent).collect::<Vec<_>>(),
            )
            .field("technical_keywords", &self.technical.len())
            .field("domain_keywords", &self.domain.len())
            .finish()
    }
}

fn compile(family: &str, pattern: &str) -> PipelineResult<Regex> {
    Regex::new(pattern).map_err(|source| PipelineError::InvalidPattern {
        family: family.to_string(),
        source,
    })
}

fn check_unit(name: &str, value: f64) -> PipelineResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidScoring(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

impl IntentClassifier {
    pub fn new(config: ClassifierConfig) -> PipelineResult<Self> {
        let mut families = Vec::with_capacity(config.families.len());
        for family in &config.families {
            check_unit(family.intent.as_str(), family.base_confidence)?;
            let patterns = family
                .patterns
                .iter()
                .map(|p| compile(family.intent.as_str(), p))
                .collect::<PipelineResult<Vec<_>>>()?;
            families.push(CompiledFamily {
                intent: family.intent,
                base_confidence: family.base_confidence,
                patterns,
            });
        }
        check_unit("fallback_confidence", config.fallback_confidence)?;
        check_unit("keyword_boost", config.keyword_boost)?;

        let technical = config
            .technical_keywords
            .iter()
            .map(|k| compile("technical", &format!(r"\b{}", regex::escape(&k.to_lowercase()))))
            .collect::<PipelineResult<Vec<_>>>()?;
        let domain = config
            .domain_keywords
            .iter()
            .map(|k| {
                let k = k.to_lowercase();
                compile("domain", &format!(r"\b{}\w*", regex::escape(&k))).map(|re| (k, re))
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            families,
            technical,
            domain,
            fallback_confidence: config.fallback_confidence,
            keyword_boost: config.keyword_boost,
            context_window: config.context_window,
        })
    }

    /// Classify a user turn.
    ///
    /// Returns [`PipelineError::EmptyInput`] for blank input.
    pub fn classify(&self, text: &str, recent_context: &[Message]) -> PipelineResult<Intent> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let lower = text.to_lowercase();

        let (intent_type, base) = self
            .families
            .iter()
            .find(|fam| fam.patterns.iter().any(|re| re.is_match(&lower)))
            .map(|fam| (fam.intent, fam.base_confidence))
            .unwrap_or((IntentType::Other, self.fallback_confidence));

        let mut hits = self.technical.iter().filter(|re| re.is_match(&lower)).count();
        if !file_references(text).is_empty() {
            hits += 1;
        }
        let confidence = (base + self.keyword_boost * hits as f64).min(1.0);

        let targets = self.extract_targets(text, recent_context);
        let intent = Intent::new(intent_type, confidence, targets);
        debug!(
            "Classified intent: {} (confidence {:.2}, {} technical hits, targets {:?})",
            intent.intent_type, intent.confidence, hits, intent.targets
        );
        Ok(intent)
    }

    /// Domain keywords, file paths and named symbols from the input and the
    /// trailing context window.
    pub fn extract_targets(&self, text: &str, recent_context: &[Message]) -> BTreeSet<String> {
        let start = recent_context.len().saturating_sub(self.context_window);
        let mut sources: Vec<String> = vec![text.to_string()];
        sources.extend(recent_context[start..].iter().map(Message::text));

        let mut targets = BTreeSet::new();
        for source in &sources {
            let lower = source.to_lowercase();
            for (keyword, re) in &self.domain {
                if re.is_match(&lower) {
                    targets.insert(keyword.clone());
                }
            }
            for path in file_references(source) {
                targets.insert(path.to_string());
            }
            if let Some(re) = RE_SYMBOL.as_ref() {
                for caps in re.captures_iter(source) {
                    if let Some(name) = caps.get(1) {
                        targets.insert(name.as_str().to_string());
                    }
                }
            }
        }
        targets
    }
}
