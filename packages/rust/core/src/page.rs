//! The page model: everything a rendered number page shows, assembled
//! from facts, cached payloads, and selected excerpts.
//!
//! [`build`] is pure. Given the same inputs it produces the same page,
//! including `generated_at`, which is taken from the inputs rather than
//! the clock.

use chrono::{DateTime, Utc};
use numsheet_excerpt::SectionExcerpts;
use numsheet_shared::{
    Article, CacheEntry, CodeTable, EntityRef, MAX_NUMBER, NumberItem, Payload, SectionKind,
};

use crate::facts::NumberFacts;

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// The six navigation links a page may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NavKind {
    Previous,
    Next,
    MinusTen,
    PlusTen,
    MinusHundred,
    PlusHundred,
}

impl NavKind {
    /// Rendering order.
    pub const ALL: [NavKind; 6] = [
        NavKind::Previous,
        NavKind::Next,
        NavKind::MinusTen,
        NavKind::PlusTen,
        NavKind::MinusHundred,
        NavKind::PlusHundred,
    ];

    pub fn offset(&self) -> i32 {
        match self {
            Self::Previous => -1,
            Self::Next => 1,
            Self::MinusTen => -10,
            Self::PlusTen => 10,
            Self::MinusHundred => -100,
            Self::PlusHundred => 100,
        }
    }

    /// Label used in the navigation block.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Previous => "previous",
            Self::Next => "next",
            Self::MinusTen => "-10",
            Self::PlusTen => "+10",
            Self::MinusHundred => "-100",
            Self::PlusHundred => "+100",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }

    /// The link the target page must declare back.
    pub fn inverse(&self) -> Self {
        match self {
            Self::Previous => Self::Next,
            Self::Next => Self::Previous,
            Self::MinusTen => Self::PlusTen,
            Self::PlusTen => Self::MinusTen,
            Self::MinusHundred => Self::PlusHundred,
            Self::PlusHundred => Self::MinusHundred,
        }
    }

    /// `origin + offset`, if it stays inside `0..=999`.
    pub fn target(&self, origin: u16) -> Option<u16> {
        let target = i32::from(origin) + self.offset();
        (0..=i32::from(MAX_NUMBER))
            .contains(&target)
            .then_some(target as u16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavLink {
    pub kind: NavKind,
    pub target: u16,
}

/// Navigation for `n`, with out-of-range links left out.
pub fn navigation(n: u16) -> Vec<NavLink> {
    NavKind::ALL
        .into_iter()
        .filter_map(|kind| kind.target(n).map(|target| NavLink { kind, target }))
        .collect()
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// A page field backed by an external source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Value(T),
    /// The source answered and has nothing for this number.
    Absent,
    /// Nothing cached and nothing fetched, or the source is disabled.
    Unavailable,
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// The parts of an article a page shows besides the excerpts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRef {
    pub title: String,
    pub url: String,
    pub intro: String,
}

/// Cache entries a page is built from. `None` means unavailable.
#[derive(Debug, Clone, Default)]
pub struct CacheView {
    pub structured: Option<CacheEntry>,
    pub prose: Option<CacheEntry>,
    pub iso3166: Option<CacheEntry>,
    pub calling_codes: Option<CacheEntry>,
}

impl CacheView {
    fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        [
            &self.structured,
            &self.prose,
            &self.iso3166,
            &self.calling_codes,
        ]
        .into_iter()
        .flatten()
    }
}

/// One fully assembled page.
#[derive(Debug, Clone)]
pub struct NumberPage {
    pub id: u16,
    pub facts: NumberFacts,
    pub structured: Field<NumberItem>,
    pub iso3166: Field<Vec<EntityRef>>,
    pub calling_codes: Field<Vec<EntityRef>>,
    pub article: Field<ArticleRef>,
    /// One entry per [`SectionKind`]; empty means no excerpt.
    pub excerpts: SectionExcerpts,
    pub navigation: Vec<NavLink>,
    /// Newest `fetched_at` among the entries used.
    pub generated_at: Option<DateTime<Utc>>,
    /// Payloads that could not be used, for the caller to report.
    pub issues: Vec<String>,
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Whether an article intro reads like an article about a number rather
/// than a namesake.
pub fn is_number_article(article: &Article) -> bool {
    let intro = article.intro.to_lowercase();
    intro.contains("number") || intro.contains("integer")
}

/// Assemble the page for `id`.
pub fn build(id: u16, facts: NumberFacts, view: &CacheView, excerpts: SectionExcerpts) -> NumberPage {
    let mut issues = Vec::new();

    let structured = match view.structured.as_ref().map(|e| &e.payload) {
        None => Field::Unavailable,
        Some(Payload::NumberItem(item)) => Field::Value(item.clone()),
        Some(Payload::Missing) => Field::Absent,
        Some(other) => {
            issues.push(format!("structured data: unexpected {} payload", kind_name(other)));
            Field::Unavailable
        }
    };

    let article = match view.prose.as_ref().map(|e| &e.payload) {
        None => Field::Unavailable,
        Some(Payload::Article(article)) if is_number_article(article) => Field::Value(ArticleRef {
            title: article.title.clone(),
            url: article.url.clone(),
            intro: article.intro.clone(),
        }),
        Some(Payload::Article(_)) | Some(Payload::Missing) => Field::Absent,
        Some(other) => {
            issues.push(format!("article: unexpected {} payload", kind_name(other)));
            Field::Unavailable
        }
    };

    let iso3166 = code_refs(id, view.iso3166.as_ref(), "ISO 3166-1 numeric", &mut issues);
    let calling_codes = code_refs(id, view.calling_codes.as_ref(), "calling codes", &mut issues);

    let mut excerpts = if matches!(article, Field::Value(_)) {
        excerpts
    } else {
        SectionExcerpts::new()
    };
    for kind in SectionKind::ALL {
        excerpts.entry(kind).or_default();
    }

    NumberPage {
        id,
        facts,
        structured,
        iso3166,
        calling_codes,
        article,
        excerpts,
        navigation: navigation(id),
        generated_at: view.entries().map(|e| e.fetched_at).max(),
        issues,
    }
}

fn code_refs(
    id: u16,
    entry: Option<&CacheEntry>,
    what: &str,
    issues: &mut Vec<String>,
) -> Field<Vec<EntityRef>> {
    match entry.map(|e| &e.payload) {
        None => Field::Unavailable,
        Some(Payload::CodeTable(table)) => lookup(table, id),
        Some(Payload::Missing) => Field::Absent,
        Some(other) => {
            issues.push(format!("{what}: unexpected {} payload", kind_name(other)));
            Field::Unavailable
        }
    }
}

fn lookup(table: &CodeTable, id: u16) -> Field<Vec<EntityRef>> {
    match table.lookup(id) {
        [] => Field::Absent,
        refs => Field::Value(refs.to_vec()),
    }
}

fn kind_name(payload: &Payload) -> &'static str {
    match payload {
        Payload::NumberItem(_) => "number-item",
        Payload::CodeTable(_) => "code-table",
        Payload::Article(_) => "article",
        Payload::Missing => "missing",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use numsheet_excerpt::Quote;
    use numsheet_shared::{ResourceId, Source};

    use super::*;
    use crate::facts;

    fn entry(source: Source, payload: Payload, hour: u32) -> CacheEntry {
        CacheEntry {
            resource: ResourceId::number(source, 42),
            fingerprint: payload.fingerprint().unwrap(),
            payload,
            fetched_at: Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap(),
        }
    }

    fn kinds(n: u16) -> Vec<NavKind> {
        navigation(n).into_iter().map(|l| l.kind).collect()
    }

    #[test]
    fn navigation_is_clipped_at_the_edges() {
        assert_eq!(kinds(0), vec![NavKind::Next, NavKind::PlusTen, NavKind::PlusHundred]);
        assert_eq!(
            kinds(999),
            vec![NavKind::Previous, NavKind::MinusTen, NavKind::MinusHundred]
        );
        assert_eq!(kinds(500), NavKind::ALL.to_vec());

        let targets: Vec<u16> = navigation(500).into_iter().map(|l| l.target).collect();
        assert_eq!(targets, vec![499, 501, 490, 510, 400, 600]);
        assert_eq!(kinds(95), vec![
            NavKind::Previous,
            NavKind::Next,
            NavKind::MinusTen,
            NavKind::PlusTen,
            NavKind::PlusHundred,
        ]);
    }

    #[test]
    fn inverse_pairs() {
        for kind in NavKind::ALL {
            assert_eq!(kind.inverse().inverse(), kind);
            assert_eq!(kind.inverse().offset(), -kind.offset());
            assert_eq!(NavKind::from_label(kind.label()), Some(kind));
        }
    }

    #[test]
    fn empty_view_yields_placeholders() {
        let page = build(42, facts::compute(42), &CacheView::default(), BTreeMap::new());
        assert_eq!(page.structured, Field::Unavailable);
        assert_eq!(page.article, Field::Unavailable);
        assert_eq!(page.iso3166, Field::Unavailable);
        assert_eq!(page.generated_at, None);
        assert!(page.excerpts.values().all(Vec::is_empty));
        assert_eq!(page.excerpts.len(), SectionKind::ALL.len());
        assert!(page.issues.is_empty());
    }

    #[test]
    fn generated_at_is_newest_entry() {
        let view = CacheView {
            structured: Some(entry(
                Source::StructuredData,
                Payload::NumberItem(NumberItem {
                    qid: "Q713".into(),
                    label: Some("42".into()),
                    description: None,
                }),
                3,
            )),
            prose: Some(entry(Source::ProseArticle, Payload::Missing, 7)),
            ..CacheView::default()
        };
        let page = build(42, facts::compute(42), &view, BTreeMap::new());
        assert_eq!(page.generated_at, Some(Utc.with_ymd_and_hms(2026, 1, 1, 7, 0, 0).unwrap()));
        assert!(matches!(page.structured, Field::Value(ref item) if item.qid == "Q713"));
        assert_eq!(page.article, Field::Absent);
    }

    #[test]
    fn namesake_article_is_not_used() {
        let article = Article {
            title: "42 (band)".into(),
            url: "https://en.wikipedia.org/wiki/42_(band)".into(),
            intro: "42 is a rock band from Leeds.".into(),
            sections: Vec::new(),
        };
        let view = CacheView {
            prose: Some(entry(Source::ProseArticle, Payload::Article(article), 1)),
            ..CacheView::default()
        };
        let quotes = BTreeMap::from([(
            SectionKind::Properties,
            vec![Quote {
                text: "x".into(),
                score: 1.0,
                pinned: false,
                shortened: false,
            }],
        )]);
        let page = build(42, facts::compute(42), &view, quotes);
        assert_eq!(page.article, Field::Absent);
        assert!(page.excerpts[&SectionKind::Properties].is_empty());
    }

    #[test]
    fn wrong_payload_kind_is_an_issue() {
        let view = CacheView {
            structured: Some(entry(Source::StructuredData, Payload::CodeTable(CodeTable::default()), 1)),
            ..CacheView::default()
        };
        let page = build(42, facts::compute(42), &view, BTreeMap::new());
        assert_eq!(page.structured, Field::Unavailable);
        assert_eq!(page.issues.len(), 1);
    }

    #[test]
    fn code_lookup() {
        let mut table = CodeTable::default();
        table.codes.insert(
            42,
            vec![EntityRef {
                label: "Somewhere".into(),
                qid: "Q1".into(),
            }],
        );
        let view = CacheView {
            iso3166: Some(entry(Source::StructuredData, Payload::CodeTable(table.clone()), 1)),
            calling_codes: Some(entry(Source::StructuredData, Payload::CodeTable(table), 1)),
            ..CacheView::default()
        };
        let page = build(42, facts::compute(42), &view, BTreeMap::new());
        assert_eq!(page.iso3166.value().map(Vec::len), Some(1));

        let other = build(43, facts::compute(43), &view, BTreeMap::new());
        assert_eq!(other.calling_codes, Field::Absent);
    }
}
