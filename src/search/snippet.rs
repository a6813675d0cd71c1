//! Result snippets with highlighted query terms

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::search::embeddings::tokenize;

/// Default maximum snippet length in characters.
pub const DEFAULT_SNIPPET_CHARS: usize = 160;

const ELLIPSIS: char = '…';

/// A window of document text. Highlights are `[start, end)` char offsets
/// into `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<(usize, usize)>,
}

impl Snippet {
    /// Wrap every highlight in `prefix`/`postfix`.
    pub fn render(&self, prefix: &str, postfix: &str) -> String {
        let chars: Vec<char> = self.text.chars().collect();
        let mut out = String::with_capacity(self.text.len() + self.highlights.len() * 8);
        let mut cursor = 0;
        for &(start, end) in &self.highlights {
            let (start, end) = (start.min(chars.len()), end.min(chars.len()));
            if start < cursor {
                continue;
            }
            out.extend(&chars[cursor..start]);
            out.push_str(prefix);
            out.extend(&chars[start..end]);
            out.push_str(postfix);
            cursor = end;
        }
        out.extend(&chars[cursor..]);
        out
    }
}

/// Builds snippets around the window holding the most query-term matches.
#[derive(Debug, Clone, Copy)]
pub struct SnippetBuilder {
    max_chars: usize,
}

impl Default for SnippetBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SNIPPET_CHARS)
    }
}

impl SnippetBuilder {
    pub const fn new(max_chars: usize) -> Self {
        Self {
            max_chars: if max_chars == 0 { 1 } else { max_chars },
        }
    }

    /// Snippet of `text` for `query`. `None` for blank text.
    ///
    /// Each match is tried as a window anchor; the window covering the
    /// most matches wins, the earliest on ties. Without any term match the
    /// snippet is the leading window.
    pub fn build(&self, text: &str, query: &str) -> Option<Snippet> {
        let chars: Vec<char> = text
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        if chars.iter().all(|c| *c == ' ') {
            return None;
        }

        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        let words = word_spans(&chars);
        let matches: Vec<(usize, usize)> = words
            .into_iter()
            .filter(|&(start, end)| {
                let word: String = chars[start..end].iter().collect();
                terms.contains(&word.to_lowercase())
            })
            .collect();

        let len = chars.len();
        let lead = self.max_chars / 4;
        let window_at = |anchor: usize| {
            let start = anchor
                .saturating_sub(lead)
                .min(len.saturating_sub(self.max_chars));
            (start, (start + self.max_chars).min(len))
        };

        let mut start = 0;
        let mut best_hits = 0;
        for &(anchor, _) in &matches {
            let (ws, we) = window_at(anchor);
            let hits = matches
                .iter()
                .filter(|&&(s, e)| s >= ws && e <= we)
                .count();
            if hits > best_hits {
                best_hits = hits;
                start = ws;
            }
        }
        let end = (start + self.max_chars).min(len);

        let mut snippet: String = String::new();
        let mut shift = 0;
        if start > 0 {
            snippet.push(ELLIPSIS);
            shift = 1;
        }
        snippet.extend(&chars[start..end]);
        if end < len {
            snippet.push(ELLIPSIS);
        }

        let highlights = matches
            .into_iter()
            .filter(|&(s, e)| s >= start && e <= end)
            .map(|(s, e)| (s - start + shift, e - start + shift))
            .collect();

        Some(Snippet {
            text: snippet,
            highlights,
        })
    }
}

/// `[start, end)` char spans of alphanumeric runs.
fn word_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in chars.iter().enumerate() {
        let is_word = c.is_alphanumeric() || *c == '+' || *c == '#';
        match (is_word, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, chars.len()));
    }
    spans
}
