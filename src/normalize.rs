//! Narrative text normalization.
//!
//! Turns one raw narrative into a stream of clean tokens. The stages run in a
//! fixed order: stop words go before punctuation, punctuation before digits,
//! and digits before the ordinal residue (`16th` → `th` → nothing).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::stopwords;

static ENGLISH: LazyLock<Normalizer> = LazyLock::new(|| {
    Normalizer::new(stopwords::ENGLISH.iter().copied(), stopwords::RESIDUE.iter().copied())
        .expect("built-in word lists compile")
});

#[derive(Debug, Clone)]
pub struct Normalizer {
    line_breaks: Regex,
    stop_words: Option<Regex>,
    punctuation: Regex,
    digits: Regex,
    residue: Option<Regex>,
}

impl Normalizer {
    /// Normalizer over the built-in English stop-word list. The patterns are
    /// compiled once and shared.
    pub fn english() -> Self {
        ENGLISH.clone()
    }

    /// Normalizer over a caller-chosen stop-word list and residue set.
    pub fn new<'s, 'r>(
        stop_words: impl IntoIterator<Item = &'s str>,
        residue: impl IntoIterator<Item = &'r str>,
    ) -> Result<Self> {
        Ok(Normalizer {
            line_breaks: Regex::new(r"(?:\\r)?\\n|\\r|\r?\n|\r").map_err(config_error)?,
            stop_words: word_alternation(stop_words)?,
            punctuation: Regex::new(r"[\p{P}\p{S}]").map_err(config_error)?,
            digits: Regex::new(r"\p{Nd}").map_err(config_error)?,
            residue: word_alternation(residue)?,
        })
    }

    /// English normalizer that also drops `extra` (e.g. domain words present in
    /// nearly every narrative).
    pub fn with_extra_stop_words<'a>(extra: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let base: Vec<&'a str> = stopwords::ENGLISH.to_vec();
        Self::new(base.into_iter().chain(extra), stopwords::RESIDUE.iter().copied())
    }

    /// Normalize `raw` and split it into tokens.
    pub fn normalize(&self, raw: &str) -> Vec<String> {
        self.normalize_text(raw)
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Normalize `raw` into a single space-separated string.
    pub fn normalize_text(&self, raw: &str) -> String {
        let text = self.line_breaks.replace_all(raw, " ");
        let text = text.to_lowercase();
        let text = blank_out(self.stop_words.as_ref(), text);
        let text = self.strip_punctuation(&text);
        let text = self.digits.replace_all(&text, "").into_owned();
        let text = blank_out(self.residue.as_ref(), text);
        // digit and punctuation removal can leave a bare stop word (`a1` → `a`)
        let text = blank_out(self.stop_words.as_ref(), text);
        tidy_whitespace(&text)
    }

    /// Drop punctuation and symbols, keeping a dash with word characters on
    /// both sides.
    fn strip_punctuation(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in self.punctuation.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            if m.as_str() == "-" {
                let before = text[..m.start()].chars().next_back();
                let after = text[m.end()..].chars().next();
                if before.is_some_and(is_word_char) && after.is_some_and(is_word_char) {
                    out.push('-');
                }
            }
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::english()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn blank_out(pattern: Option<&Regex>, text: String) -> String {
    match pattern {
        Some(re) => re.replace_all(&text, " ").into_owned(),
        None => text,
    }
}

fn config_error(err: regex::Error) -> Error {
    Error::InvalidConfig(err.to_string())
}

/// `\b(?:w1|w2|...)\b`, longest words first so `it's` wins over `it`.
fn word_alternation<'a>(words: impl IntoIterator<Item = &'a str>) -> Result<Option<Regex>> {
    let mut words: Vec<String> = words
        .into_iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if words.is_empty() {
        return Ok(None);
    }
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b"))
        .map(Some)
        .map_err(config_error)
}

/// Collapse whitespace and drop dashes that no longer join two word pieces
/// (`b-52` loses its digits and becomes `b`).
fn tidy_whitespace(text: &str) -> String {
    text.split_whitespace()
        .map(|token| {
            token
                .split('-')
                .filter(|piece| !piece.is_empty())
                .collect::<Vec<_>>()
                .join("-")
        })
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
