//! Query characterization
//!
//! Cheap heuristics over normalized query text that feed the adaptive
//! weight policy. No models, no I/O: the same text always yields the same
//! [`QueryFeatures`].

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Double-quoted phrase: `"rank fusion"`.
static QUOTED_PHRASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]+)""#).unwrap());

const INTERROGATIVES: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "whom", "whose", "which", "is", "are", "can",
    "does", "do", "should", "could", "would", "will",
];

/// Features extracted from one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFeatures {
    /// Whitespace-separated token count
    pub token_count: usize,
    /// Contents of `"..."` phrases, quotes stripped
    pub quoted_phrases: Vec<String>,
    /// Acronyms, identifiers, tokens with digits, out-of-vocabulary words
    pub specific_tokens: Vec<String>,
    /// Starts with an interrogative word or ends with `?`
    pub is_question: bool,
    /// Token count at or below the short-query threshold
    pub is_short: bool,
}

impl QueryFeatures {
    pub fn has_quoted_phrase(&self) -> bool {
        !self.quoted_phrases.is_empty()
    }

    /// Exact-match intent: a specific token or a quoted phrase.
    pub fn is_specific(&self) -> bool {
        !self.specific_tokens.is_empty() || self.has_quoted_phrase()
    }

    /// A longer query phrased as a question.
    pub const fn is_natural_question(&self) -> bool {
        self.is_question && !self.is_short
    }
}

/// Extracts [`QueryFeatures`] from normalized query text.
#[derive(Debug, Clone)]
pub struct QueryCharacterizer {
    short_query_tokens: usize,
    vocabulary: Option<HashSet<String>>,
}

impl Default for QueryCharacterizer {
    fn default() -> Self {
        Self::new(2)
    }
}

impl QueryCharacterizer {
    pub const fn new(short_query_tokens: usize) -> Self {
        Self {
            short_query_tokens,
            vocabulary: None,
        }
    }

    /// Common-word list. When set, alphabetic tokens missing from it count
    /// as specific.
    #[must_use]
    pub fn with_vocabulary<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.vocabulary = Some(
            words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        );
        self
    }

    pub fn characterize(&self, text: &str) -> QueryFeatures {
        let tokens: Vec<&str> = text.split_whitespace().collect();

        let quoted_phrases = QUOTED_PHRASE
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let mut specific_tokens = Vec::new();
        for raw in &tokens {
            let token = strip_punctuation(raw);
            if !token.is_empty() && self.is_specific_token(token) {
                specific_tokens.push(token.to_string());
            }
        }

        let first_word = tokens
            .first()
            .map(|t| strip_punctuation(t).to_lowercase())
            .unwrap_or_default();
        let is_question =
            INTERROGATIVES.contains(&first_word.as_str()) || text.trim_end().ends_with('?');

        QueryFeatures {
            token_count: tokens.len(),
            quoted_phrases,
            specific_tokens,
            is_question,
            is_short: tokens.len() <= self.short_query_tokens,
        }
    }

    fn is_specific_token(&self, token: &str) -> bool {
        if is_acronym(token) || token.chars().any(|c| c.is_ascii_digit()) || is_identifier(token)
        {
            return true;
        }
        match &self.vocabulary {
            Some(vocab) => {
                token.chars().all(char::is_alphabetic) && !vocab.contains(&token.to_lowercase())
            }
            None => false,
        }
    }
}

/// Trim surrounding punctuation but keep identifier characters.
fn strip_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
}

/// All-caps with at least two letters: `RRF`, `BM25`, `HTTP/2`.
fn is_acronym(token: &str) -> bool {
    let letters: Vec<char> = token.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
}

/// snake_case, `a::b` paths, dotted names, camelCase.
fn is_identifier(token: &str) -> bool {
    if token.contains('_') || token.contains("::") {
        return true;
    }
    if token.contains('.') && !token.ends_with('.') {
        return true;
    }
    // camelCase or PascalCase: a capital after the first character
    let has_lower = token.chars().any(char::is_lowercase);
    let inner_upper = token.chars().skip(1).any(char::is_uppercase);
    has_lower && inner_upper
}
