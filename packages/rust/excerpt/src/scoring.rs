//! Sentence splitting, normalization, and candidate scoring.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use numsheet_shared::{ScoringWeights, SectionKind};
use regex::Regex;

/// Spans up to this many characters get the full concision weight.
const CONCISE_CHARS: usize = 100;

/// Uniqueness of a span with no recognizable term.
const NO_TERM_UNIQUENESS: f64 = 4.0;

static CAPITALIZED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{Lu}[\p{Ll}\p{Lu}]+(?:\s+\p{Lu}[\p{Ll}\p{Lu}]+)*").expect("valid regex")
});
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["“『「]([^"”』」]{2,60})["”』」]"#).expect("valid regex"));
static STANDARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:ISO|JIS)\s*[A-Z]?\s*\d{3,6}(?:-\d+)*").expect("valid regex"));

/// A scored span of section text.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteCandidate {
    pub section: SectionKind,
    pub raw_text: String,
    pub normalized_text: String,
    pub score: f64,
    pub pinned: bool,
    /// Position in the section, for stable ordering.
    pub position: usize,
}

/// Split plain text into sentence-like spans.
///
/// Boundaries: `.`, `!`, `?` followed by whitespace; `。`, `！`, `？`
/// anywhere; line breaks. Spans are trimmed and empty spans dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => flush(&mut current, &mut spans),
            '。' | '！' | '？' => {
                current.push(c);
                flush(&mut current, &mut spans);
            }
            '.' | '!' | '?' => {
                current.push(c);
                if chars.peek().is_none_or(|next| next.is_whitespace()) {
                    flush(&mut current, &mut spans);
                }
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut spans);
    spans
}

fn flush(current: &mut String, spans: &mut Vec<String>) {
    let span = current.trim();
    if !span.is_empty() {
        spans.push(span.to_string());
    }
    current.clear();
}

/// Lowercase, fold punctuation to spaces, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `number` appears as its own token, not inside `1042`, `4.2`, or `1,042`.
pub fn contains_number_token(text: &str, number: u16) -> bool {
    let needle = number.to_string();
    let bytes = text.as_bytes();

    text.match_indices(&needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = start.checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(end).copied();
        let after_next = bytes.get(end + 1).copied();

        let joined_before = match before {
            Some(b) if b.is_ascii_alphanumeric() => true,
            Some(b'.') | Some(b',') => start >= 2 && bytes[start - 2].is_ascii_digit(),
            _ => false,
        };
        let joined_after = match after {
            Some(b) if b.is_ascii_alphanumeric() => true,
            Some(b'.') | Some(b',') => after_next.is_some_and(|b| b.is_ascii_digit()),
            _ => false,
        };
        !joined_before && !joined_after
    })
}

/// Distinct capitalized terms past the first word, plus quoted titles.
fn named_entities(text: &str) -> usize {
    let mut found = BTreeSet::new();
    for m in CAPITALIZED_RE.find_iter(text) {
        if m.start() > 0 {
            found.insert(m.as_str().to_string());
        }
    }
    for caps in QUOTED_RE.captures_iter(text) {
        found.insert(caps[1].to_string());
    }
    found.len()
}

/// The short term a span is about: a quoted title, else a standard code,
/// else the first capitalized term past the first word. Normalized.
pub fn scoring_term(text: &str) -> Option<String> {
    let raw = QUOTED_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .or_else(|| STANDARD_RE.find(text))
        .or_else(|| CAPITALIZED_RE.find_iter(text).find(|m| m.start() > 0))?;
    let term = normalize(raw.as_str());
    (!term.is_empty()).then_some(term)
}

// ---------------------------------------------------------------------------
// Term frequency across numbers
// ---------------------------------------------------------------------------

/// How many numbers' sections mention each scoring term.
///
/// Built once per run from cached article text; a term seen on a single
/// number is a strong hint the span is specific to it.
#[derive(Debug, Clone, Default)]
pub struct TermFrequency {
    numbers: BTreeMap<String, usize>,
}

impl TermFrequency {
    /// Count the distinct terms of one number's plain text.
    pub fn add_number_text(&mut self, text: &str) {
        let terms: BTreeSet<String> = split_sentences(text)
            .iter()
            .filter_map(|span| scoring_term(span))
            .collect();
        for term in terms {
            *self.numbers.entry(term).or_default() += 1;
        }
    }

    /// Numbers mentioning `term` (already normalized).
    pub fn count(&self, term: &str) -> usize {
        self.numbers.get(term).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// `10` for a term on at most one number, `7` around ten numbers, `4`
    /// around a hundred, floored at `1`.
    pub fn uniqueness(&self, term: Option<&str>) -> f64 {
        let Some(term) = term else {
            return NO_TERM_UNIQUENESS;
        };
        let spread = ((self.count(term) + 1) as f64).log10();
        (11.0 - (spread * 3.0).ceil()).clamp(1.0, 10.0)
    }
}

/// Distinct section keywords present in the normalized text.
fn keyword_hits(normalized: &str, keywords: &[String]) -> usize {
    let words: BTreeSet<&str> = normalized.split(' ').collect();
    keywords
        .iter()
        .filter(|kw| {
            let kw = kw.to_lowercase();
            if kw.contains(' ') {
                normalized.contains(&kw)
            } else {
                words.contains(kw.as_str()) || words.contains(format!("{kw}s").as_str())
            }
        })
        .count()
}

/// `1.0` up to [`CONCISE_CHARS`], falling linearly to `0.0` at `max_chars`.
fn concision(len: usize, max_chars: usize) -> f64 {
    if len <= CONCISE_CHARS {
        return 1.0;
    }
    if max_chars <= CONCISE_CHARS || len >= max_chars {
        return 0.0;
    }
    (max_chars - len) as f64 / (max_chars - CONCISE_CHARS) as f64
}

/// Weighted importance of one span.
pub fn score(
    text: &str,
    normalized: &str,
    number: u16,
    section: SectionKind,
    weights: &ScoringWeights,
    terms: &TermFrequency,
    max_chars: usize,
) -> f64 {
    let mut total = 0.0;
    if contains_number_token(text, number) {
        total += weights.number_token;
    }
    total += weights.named_entity * named_entities(text).min(weights.named_entity_cap) as f64;
    total += weights.keyword
        * keyword_hits(normalized, weights.keywords(section)).min(weights.keyword_cap) as f64;
    total += weights.concision * concision(text.chars().count(), max_chars);
    total += weights.uniqueness * terms.uniqueness(scoring_term(text).as_deref());
    total * weights.section_weight(section)
}
