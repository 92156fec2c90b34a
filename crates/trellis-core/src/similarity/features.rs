//! Feature Extraction
//!
//! Turns a node's content into the bundle the similarity metrics compare:
//! keywords, named entities, concept phrases, sentiment, topics, an embedding
//! and a language guess. Missing or empty content yields a neutral bundle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::graph::GraphNode;

/// Keywords kept per node
pub const DEFAULT_TOP_KEYWORDS: usize = 10;

/// Concept phrases kept per node
const MAX_CONCEPTS: usize = 10;

/// Words before a sentiment term that can flip it
const NEGATION_WINDOW: usize = 3;

/// Topics taken from keywords when nothing explicit is present
const FALLBACK_TOPICS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as",
    "at", "be", "been", "before", "being", "below", "between", "both", "but", "by", "can",
    "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his", "how",
    "i", "if", "in", "into", "is", "it", "its", "just", "me", "more", "most", "my", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "through", "to", "too", "under", "until",
    "up", "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "why",
    "will", "with", "would", "you", "your",
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "won't", "can't", "couldn't",
    "shouldn't", "isn't", "wasn't", "without", "hardly",
];

const SENTIMENT_LEXICON: &[(&str, f64)] = &[
    ("good", 0.6),
    ("great", 0.8),
    ("excellent", 0.9),
    ("amazing", 0.9),
    ("love", 0.8),
    ("like", 0.4),
    ("happy", 0.7),
    ("glad", 0.6),
    ("success", 0.7),
    ("successful", 0.7),
    ("win", 0.6),
    ("solved", 0.6),
    ("fixed", 0.5),
    ("easy", 0.4),
    ("helpful", 0.6),
    ("thanks", 0.5),
    ("productive", 0.6),
    ("bad", -0.6),
    ("terrible", -0.9),
    ("awful", -0.9),
    ("hate", -0.8),
    ("sad", -0.6),
    ("angry", -0.7),
    ("fail", -0.7),
    ("failed", -0.7),
    ("failure", -0.7),
    ("broken", -0.6),
    ("bug", -0.4),
    ("error", -0.5),
    ("problem", -0.5),
    ("difficult", -0.4),
    ("slow", -0.3),
    ("annoying", -0.6),
    ("blocked", -0.5),
    ("late", -0.3),
];

/// Function words used to guess the language
const LANGUAGE_MARKERS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "is", "of", "to", "with", "this", "that", "for", "are"]),
    ("es", &["el", "la", "los", "las", "y", "es", "con", "para", "que", "una"]),
    ("fr", &["le", "la", "les", "et", "est", "avec", "pour", "que", "une", "des"]),
    ("de", &["der", "die", "das", "und", "ist", "mit", "für", "nicht", "ein", "eine"]),
];

// ============================================================================
// FEATURE BUNDLE
// ============================================================================

/// Everything the similarity metrics need about one node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureBundle {
    /// Stemmed, frequency ranked
    pub keywords: Vec<String>,
    /// Lowercased capitalized spans
    pub entities: Vec<String>,
    /// Runs of adjacent content words
    pub concepts: Vec<String>,
    /// -1.0 (negative) to 1.0 (positive)
    pub sentiment: f64,
    pub topics: Vec<String>,
    pub embedding: Vec<f32>,
    /// ISO 639-1 code, `und` when unknown
    pub language: String,
}

impl FeatureBundle {
    /// Bundle for a node with no usable text
    pub fn neutral(dimensions: usize) -> Self {
        Self {
            embedding: vec![0.0; dimensions],
            language: "und".to_string(),
            ..Default::default()
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.keywords.is_empty()
            && self.entities.is_empty()
            && self.concepts.is_empty()
            && self.topics.is_empty()
    }
}

// ============================================================================
// TEXT HELPERS
// ============================================================================

/// Flatten string leaves of a JSON payload into one text
pub fn content_text(value: &serde_json::Value) -> String {
    fn collect(value: &serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::String(s) => out.push(s.clone()),
            serde_json::Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            serde_json::Value::Object(map) => map.values().for_each(|v| collect(v, out)),
            _ => {}
        }
    }
    let mut parts = Vec::new();
    collect(value, &mut parts);
    parts.join(". ")
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Light suffix stripping; plurals first so `meetings` and `meeting` agree
pub fn stem(word: &str) -> String {
    let mut w = word.to_lowercase();
    if w.chars().count() > 4 && w.ends_with("ies") {
        w.truncate(w.len() - 3);
        w.push('y');
    } else if w.chars().count() > 3 && w.ends_with('s') && !w.ends_with("ss") && !w.ends_with("us") {
        w.truncate(w.len() - 1);
    }

    let len = w.chars().count();
    if len > 5 && w.ends_with("ing") {
        w.truncate(w.len() - 3);
    } else if len > 4 && w.ends_with("ed") && !w.ends_with("eed") {
        w.truncate(w.len() - 2);
    } else if len > 4 && w.ends_with("ly") {
        w.truncate(w.len() - 2);
    }
    w
}

/// Phrases split on punctuation, each a list of words in original case
fn phrases(text: &str) -> Vec<Vec<&str>> {
    text.split(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '\n' | '(' | ')'))
        .map(|phrase| {
            phrase
                .split_whitespace()
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '#'))
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|p| !p.is_empty())
        .collect()
}

fn words_lower(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !value.is_empty() && !out.contains(&value) {
        out.push(value);
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Computes feature bundles with a pluggable embedding provider
#[derive(Clone)]
pub struct FeatureExtractor {
    embedder: Arc<dyn EmbeddingProvider>,
    top_keywords: usize,
}

impl FeatureExtractor {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, top_keywords: usize) -> Self {
        Self {
            embedder,
            top_keywords: top_keywords.max(1),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Features for a stored node, reusing its persisted embedding when compatible
    pub fn extract(&self, node: &GraphNode) -> Result<FeatureBundle> {
        let text = content_text(&node.content);
        let stored = (node.embedding.len() == self.embedder.dimensions())
            .then(|| node.embedding.clone());
        let mut bundle = self.bundle(&text, stored)?;

        let explicit = explicit_topics(&text, &node.metadata);
        if !explicit.is_empty() {
            bundle.topics = explicit;
        }
        Ok(bundle)
    }

    /// Features for raw text
    pub fn extract_text(&self, text: &str) -> Result<FeatureBundle> {
        self.bundle(text, None)
    }

    fn bundle(&self, text: &str, embedding: Option<Vec<f32>>) -> Result<FeatureBundle> {
        if text.trim().is_empty() {
            return Ok(FeatureBundle::neutral(self.embedder.dimensions()));
        }

        let keywords = self.keywords(text);
        let topics = {
            let explicit = explicit_topics(text, &serde_json::Map::new());
            if explicit.is_empty() {
                keywords.iter().take(FALLBACK_TOPICS).cloned().collect()
            } else {
                explicit
            }
        };
        let embedding = match embedding {
            Some(v) => v,
            None => self.embedder.embed(text)?,
        };

        Ok(FeatureBundle {
            entities: entities(text),
            concepts: concepts(text),
            sentiment: sentiment(text),
            language: detect_language(text).to_string(),
            embedding,
            keywords,
            topics,
        })
    }

    /// Top stemmed content words by frequency; ties keep first appearance
    pub fn keywords(&self, text: &str) -> Vec<String> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, word) in words_lower(text).iter().enumerate() {
            if word.len() < 3
                || is_stop_word(word)
                || word.chars().all(|c| c.is_ascii_digit())
            {
                continue;
            }
            let entry = counts.entry(stem(word)).or_insert((0, position));
            entry.0 += 1;
        }

        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
        ranked
            .into_iter()
            .take(self.top_keywords)
            .map(|(word, _)| word)
            .collect()
    }
}

/// Capitalized spans; a lone capitalized word opening a phrase is skipped
fn entities(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for phrase in phrases(text) {
        let mut span: Vec<&str> = Vec::new();
        let mut span_start = 0usize;
        for (i, word) in phrase.iter().enumerate() {
            let capitalized = word.chars().next().is_some_and(|c| c.is_uppercase())
                && !is_stop_word(&word.to_lowercase());
            if capitalized {
                if span.is_empty() {
                    span_start = i;
                }
                span.push(word);
                continue;
            }
            flush_entity(&mut out, &mut span, span_start);
        }
        flush_entity(&mut out, &mut span, span_start);
    }
    out
}

fn flush_entity(out: &mut Vec<String>, span: &mut Vec<&str>, start: usize) {
    if span.len() > 1 || (span.len() == 1 && start > 0) {
        push_unique(out, span.join(" ").to_lowercase());
    }
    span.clear();
}

/// Runs of two or more adjacent content words
fn concepts(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for phrase in phrases(text) {
        let mut run: Vec<String> = Vec::new();
        for word in phrase.iter().map(|w| w.trim_start_matches('#').to_lowercase()) {
            if word.len() >= 3 && !is_stop_word(&word) && !word.chars().all(|c| c.is_ascii_digit()) {
                run.push(word);
                continue;
            }
            if run.len() >= 2 {
                push_unique(&mut out, run.join(" "));
            }
            run.clear();
        }
        if run.len() >= 2 {
            push_unique(&mut out, run.join(" "));
        }
    }
    out.truncate(MAX_CONCEPTS);
    out
}

/// Lexicon average with a negation window
pub fn sentiment(text: &str) -> f64 {
    let words = words_lower(text);
    let mut total = 0.0;
    let mut hits = 0usize;
    for (i, word) in words.iter().enumerate() {
        let Some(&(_, valence)) = SENTIMENT_LEXICON.iter().find(|(w, _)| w == word) else {
            continue;
        };
        let negated = (i.saturating_sub(NEGATION_WINDOW)..i)
            .any(|j| NEGATIONS.contains(&words[j].as_str()));
        total += if negated { -valence * 0.7 } else { valence };
        hits += 1;
    }
    if hits == 0 {
        0.0
    } else {
        (total / hits as f64).clamp(-1.0, 1.0)
    }
}

/// Topics from metadata, `#hashtags` and `topic:` markers
fn explicit_topics(text: &str, metadata: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(topic) = metadata.get("topic").and_then(|v| v.as_str()) {
        push_unique(&mut out, topic.trim().to_lowercase());
    }
    if let Some(topics) = metadata.get("topics").and_then(|v| v.as_array()) {
        for topic in topics.iter().filter_map(|v| v.as_str()) {
            push_unique(&mut out, topic.trim().to_lowercase());
        }
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    for (i, token) in tokens.iter().enumerate() {
        let clean = |s: &str| {
            s.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
                .to_lowercase()
        };
        if let Some(tag) = token.strip_prefix('#') {
            push_unique(&mut out, clean(tag));
        }
        let lower = token.to_lowercase();
        if let Some(rest) = lower.strip_prefix("topic:") {
            if rest.is_empty() {
                if let Some(next) = tokens.get(i + 1) {
                    push_unique(&mut out, clean(next));
                }
            } else {
                push_unique(&mut out, clean(rest));
            }
        }
    }
    out
}

/// Guess among en/es/fr/de by function-word hits
pub fn detect_language(text: &str) -> &'static str {
    let words: HashSet<String> = words_lower(text).into_iter().collect();
    let mut best = ("und", 0usize);
    for (code, markers) in LANGUAGE_MARKERS {
        let hits = markers.iter().filter(|m| words.contains(**m)).count();
        if hits > best.1 {
            best = (code, hits);
        }
    }
    if best.1 >= 2 { best.0 } else { "und" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::HashedPositionalEmbedder;
    use serde_json::json;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(Arc::new(HashedPositionalEmbedder::default()), DEFAULT_TOP_KEYWORDS)
    }

    #[test]
    fn test_empty_content_is_neutral() {
        let bundle = extractor().extract_text("   ").unwrap();
        assert!(bundle.is_neutral());
        assert_eq!(bundle.language, "und");
        assert_eq!(bundle.sentiment, 0.0);
        assert!(bundle.embedding.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_keywords_stemmed_and_ranked() {
        let keywords = extractor().keywords("Meetings about the project. The project meeting with Sarah");
        assert_eq!(keywords[0], "meet");
        assert_eq!(keywords[1], "project");
        assert!(keywords.contains(&"sarah".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
    }

    #[test]
    fn test_entities_and_concepts() {
        let text = "Lunch with Sarah Connor at Cyberdyne Systems. We discussed the neural network training";
        assert_eq!(entities(text), vec!["sarah connor", "cyberdyne systems"]);
        let c = concepts(text);
        assert!(c.contains(&"neural network training".to_string()));
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("meetings"), stem("meeting"));
        assert_eq!(stem("queries"), "query");
        assert_eq!(stem("status"), "status");
    }

    #[test]
    fn test_sentiment_negation() {
        assert!(sentiment("this was a great success") > 0.5);
        assert!(sentiment("the build is not good") < 0.0);
        assert_eq!(sentiment("nothing emotional here"), 0.0);
    }

    #[test]
    fn test_topics() {
        let t = explicit_topics("notes #Rust and topic: databases", &serde_json::Map::new());
        assert_eq!(t, vec!["rust", "databases"]);

        let mut meta = serde_json::Map::new();
        meta.insert("topics".into(), json!(["Planning"]));
        assert_eq!(explicit_topics("", &meta), vec!["planning"]);
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language("the cat and the dog are with us"), "en");
        assert_eq!(detect_language("el gato y la casa con una mesa"), "es");
        assert_eq!(detect_language("der Hund und die Katze ist hier"), "de");
        assert_eq!(detect_language("xyz"), "und");
    }

    #[test]
    fn test_content_text_flattens_json() {
        let text = content_text(&json!({ "subject": "Hello", "body": ["a", 3, "b"] }));
        assert!(text.contains("Hello"));
        assert!(text.contains('a') && text.contains('b'));
    }
}
