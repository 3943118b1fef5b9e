//! Excerpt selection: turn article sections into at most a couple of short,
//! attributed quotes per section.
//!
//! Pipeline per section: wikitext cleanup → sentence split → length filter
//! → scoring → pin promotion → threshold → dedup → budget → shortening.

pub mod rules;
pub mod scoring;
pub mod wikitext;

use std::collections::{BTreeMap, HashSet};

use numsheet_shared::{Article, ExcerptConfig, SectionKind};
use tracing::debug;

pub use rules::{ImportanceOverride, PinRule, RuleBook};
pub use scoring::{QuoteCandidate, TermFrequency, normalize, split_sentences};

/// Hard upper bound on quotes per section.
pub const QUOTE_BUDGET: usize = 2;

/// Marker appended to shortened quotes.
pub const ELLIPSIS: char = '…';

/// A selected quote, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub text: String,
    pub score: f64,
    pub pinned: bool,
    /// The source sentence was cut to fit the quote length limit.
    pub shortened: bool,
}

/// Selected quotes per section kind. A missing or empty entry means
/// "no excerpt available".
pub type SectionExcerpts = BTreeMap<SectionKind, Vec<Quote>>;

/// Scores and selects quotes under the configured policy and rule book.
#[derive(Debug, Clone)]
pub struct ExcerptSelector {
    config: ExcerptConfig,
    rules: RuleBook,
    terms: TermFrequency,
}

impl ExcerptSelector {
    pub fn new(config: ExcerptConfig, rules: RuleBook) -> Self {
        Self {
            config,
            rules,
            terms: TermFrequency::default(),
        }
    }

    /// Score uniqueness against `terms` instead of an empty table.
    pub fn with_term_frequency(mut self, terms: TermFrequency) -> Self {
        self.terms = terms;
        self
    }

    /// Count the terms of one article's sections into `terms`.
    pub fn count_article_terms(terms: &mut TermFrequency, article: &Article) {
        let text: Vec<String> = article
            .sections
            .iter()
            .map(|s| wikitext::to_plain_text(&s.wikitext))
            .collect();
        terms.add_number_text(&text.join("\n"));
    }

    /// Effective per-section budget.
    pub fn budget(&self) -> usize {
        self.config.quotes_per_section.min(QUOTE_BUDGET)
    }

    /// Clean and select every section of an article.
    pub fn select_article(&self, number: u16, article: &Article) -> SectionExcerpts {
        SectionKind::ALL
            .into_iter()
            .map(|kind| {
                let quotes = article
                    .section(kind)
                    .map(|s| self.select(number, kind, &wikitext::to_plain_text(&s.wikitext)))
                    .unwrap_or_default();
                (kind, quotes)
            })
            .collect()
    }

    /// Select quotes from one section's plain text. An empty result is valid.
    pub fn select(&self, number: u16, section: SectionKind, text: &str) -> Vec<Quote> {
        let ranked = self.rank(number, section, text);
        let threshold = self
            .rules
            .threshold_for(number, section)
            .unwrap_or(self.config.default_threshold);

        let mut seen = HashSet::new();
        let quotes: Vec<Quote> = ranked
            .into_iter()
            .filter(|c| c.pinned || c.score >= threshold)
            .filter(|c| seen.insert(c.normalized_text.clone()))
            .take(self.budget())
            .map(|c| self.to_quote(c))
            .collect();

        debug!(number, %section, threshold, selected = quotes.len(), "excerpts selected");
        quotes
    }

    /// Candidates of a section within the length bounds, pinned first, then by
    /// score, then by position. Pins never rescue an out-of-length span.
    pub fn rank(&self, number: u16, section: SectionKind, text: &str) -> Vec<QuoteCandidate> {
        let pins = self.rules.pins_for(number, section);

        let mut candidates: Vec<QuoteCandidate> = split_sentences(text)
            .into_iter()
            .enumerate()
            .filter(|(_, raw_text)| {
                let len = raw_text.chars().count();
                len >= self.config.min_chars && len <= self.config.max_chars
            })
            .map(|(position, raw_text)| {
                let normalized_text = normalize(&raw_text);
                let pinned = pins.iter().any(|p| normalized_text.contains(p));
                let score = scoring::score(
                    &raw_text,
                    &normalized_text,
                    number,
                    section,
                    &self.config.weights,
                    &self.terms,
                    self.config.max_chars,
                );
                QuoteCandidate {
                    section,
                    raw_text,
                    normalized_text,
                    score,
                    pinned,
                    position,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then(b.score.total_cmp(&a.score))
                .then(a.position.cmp(&b.position))
        });
        candidates
    }

    fn to_quote(&self, candidate: QuoteCandidate) -> Quote {
        let (text, shortened) = shorten(&candidate.raw_text, self.config.quote_max_chars);
        Quote {
            text,
            score: candidate.score,
            pinned: candidate.pinned,
            shortened,
        }
    }
}

/// Cut `text` to at most `max_chars` characters (ellipsis included),
/// preferring a word boundary near the end.
pub fn shorten(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars || max_chars < 2 {
        return (text.to_string(), false);
    }

    let cut: String = text.chars().take(max_chars - 1).collect();
    let boundary = cut
        .rfind(char::is_whitespace)
        .filter(|&i| cut[i..].chars().count() <= 20)
        .unwrap_or(cut.len());

    let kept = cut[..boundary].trim_end_matches(|c: char| c.is_whitespace() || ",;:-".contains(c));
    (format!("{kept}{ELLIPSIS}"), true)
}
