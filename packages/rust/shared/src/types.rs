//! Core domain types for numsheet: resource identities, cached payloads,
//! refresh policies, and the run mode.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{NumsheetError, Result};

/// Largest number that gets a page.
pub const MAX_NUMBER: u16 = 999;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// The external knowledge backends a resource can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Structured data (Wikidata, CC0).
    StructuredData,
    /// Prose articles (Wikipedia, CC BY-SA).
    ProseArticle,
}

impl Source {
    /// Every source, in a stable order.
    pub const ALL: [Source; 2] = [Source::StructuredData, Source::ProseArticle];

    /// Storage key for the cache table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredData => "structured-data",
            Self::ProseArticle => "prose-article",
        }
    }

    /// Human-readable backend name used in logs and attribution.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::StructuredData => "Wikidata",
            Self::ProseArticle => "Wikipedia",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = NumsheetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured-data" | "wikidata" => Ok(Self::StructuredData),
            "prose-article" | "wikipedia" => Ok(Self::ProseArticle),
            other => Err(NumsheetError::validation(format!(
                "unknown source '{other}': expected 'structured-data' or 'prose-article'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ResourceId
// ---------------------------------------------------------------------------

/// The per-source part of a resource identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKey {
    /// A number in `0..=999`.
    Number(u16),
    /// An external identifier, e.g. `iso3166-numeric`.
    External(String),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::External(name) => f.write_str(name),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = NumsheetError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(NumsheetError::validation("empty resource key"));
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            let n: u16 = s
                .parse()
                .map_err(|_| NumsheetError::validation(format!("number '{s}' out of range")))?;
            if n > MAX_NUMBER {
                return Err(NumsheetError::validation(format!(
                    "number {n} out of range 0-{MAX_NUMBER}"
                )));
            }
            return Ok(Self::Number(n));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(NumsheetError::validation(format!(
                "invalid external identifier '{s}'"
            )));
        }
        Ok(Self::External(s.to_string()))
    }
}

/// Immutable `(source, key)` pair identifying one cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub source: Source,
    pub key: ResourceKey,
}

impl ResourceId {
    /// Resource for a single number.
    pub fn number(source: Source, n: u16) -> Self {
        Self {
            source,
            key: ResourceKey::Number(n),
        }
    }

    /// Resource addressed by an external identifier.
    pub fn external(source: Source, name: impl Into<String>) -> Self {
        Self {
            source,
            key: ResourceKey::External(name.into()),
        }
    }

    /// The number this resource describes, if any.
    pub fn as_number(&self) -> Option<u16> {
        match self.key {
            ResourceKey::Number(n) => Some(n),
            ResourceKey::External(_) => None,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.key)
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A Wikidata item describing one number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberItem {
    /// Item id, e.g. `Q713`.
    pub qid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NumberItem {
    pub fn url(&self) -> String {
        format!("https://www.wikidata.org/wiki/{}", self.qid)
    }
}

/// A labelled reference to a Wikidata entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub label: String,
    pub qid: String,
}

impl EntityRef {
    pub fn url(&self) -> String {
        format!("https://www.wikidata.org/wiki/{}", self.qid)
    }
}

/// A bulk table mapping numeric codes to the entities that carry them
/// (ISO 3166-1 numeric, international calling codes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTable {
    pub codes: BTreeMap<u16, Vec<EntityRef>>,
}

impl CodeTable {
    /// Entities registered under `code`, sorted by label.
    pub fn lookup(&self, code: u16) -> &[EntityRef] {
        self.codes.get(&code).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Named article sections excerpts are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Mathematical properties of the number.
    Properties,
    /// Everything else: culture, technology, science.
    Miscellany,
}

impl SectionKind {
    pub const ALL: [SectionKind; 2] = [SectionKind::Properties, SectionKind::Miscellany];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Properties => "properties",
            Self::Miscellany => "miscellany",
        }
    }

    /// Heading used in rendered pages.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Properties => "Properties",
            Self::Miscellany => "Miscellany",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = NumsheetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "properties" | "property" => Ok(Self::Properties),
            "miscellany" | "other" => Ok(Self::Miscellany),
            other => Err(NumsheetError::validation(format!(
                "unknown section '{other}': expected 'properties' or 'miscellany'"
            ))),
        }
    }
}

/// One section of an article, as raw wikitext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSection {
    pub kind: SectionKind,
    /// The heading the section was found under.
    pub heading: String,
    pub wikitext: String,
}

/// A Wikipedia article about one number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    /// Plain-text lead section.
    pub intro: String,
    #[serde(default)]
    pub sections: Vec<ArticleSection>,
}

impl Article {
    pub fn section(&self, kind: SectionKind) -> Option<&ArticleSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

/// Data fetched for a resource. Opaque to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    NumberItem(NumberItem),
    CodeTable(CodeTable),
    Article(Article),
    /// The backend answered, but has nothing for this resource.
    Missing,
}

impl Payload {
    /// Canonical JSON encoding (field order fixed by the types, maps sorted).
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| NumsheetError::parse(format!("payload serialization failed: {e}")))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| NumsheetError::parse(format!("malformed cached payload: {e}")))
    }

    /// SHA-256 over the canonical encoding.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(fingerprint(self.to_json()?.as_bytes()))
    }
}

/// Hex SHA-256 of arbitrary bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// The last successfully fetched payload for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub resource: ResourceId,
    pub payload: Payload,
    pub fetched_at: DateTime<Utc>,
    pub fingerprint: String,
}

// ---------------------------------------------------------------------------
// Policies and run mode
// ---------------------------------------------------------------------------

/// How the cache may satisfy a request for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Serve the stored entry; fetch only when nothing is stored.
    UseCache,
    /// Refetch when the entry is missing or older than `max_age`.
    RefreshIfStale { max_age: Duration },
    /// Always refetch.
    ForceRefresh,
}

impl Policy {
    pub fn is_refreshing(&self) -> bool {
        !matches!(self, Self::UseCache)
    }

    /// The policy used for an online run that elevates cache-only sources.
    pub fn elevated(self) -> Self {
        match self {
            Self::UseCache => Self::RefreshIfStale {
                max_age: Duration::ZERO,
            },
            other => other,
        }
    }
}

/// Whether the network may be used during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Online,
    Offline,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

// ---------------------------------------------------------------------------
// Id selection
// ---------------------------------------------------------------------------

/// Parse an id selection such as `444`, `0-99`, or `444,42,100-120`.
///
/// Reversed ranges are normalized; values outside `0..=999` are dropped.
/// The result is sorted and deduplicated.
pub fn parse_id_spec(spec: &str) -> Result<Vec<u16>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(NumsheetError::validation("empty id selection"));
    }

    let parse_one = |s: &str| -> Result<u32> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| NumsheetError::validation(format!("invalid number '{}' in '{spec}'", s.trim())))
    };

    let mut out = BTreeSet::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => {
                let (a, b) = (parse_one(a)?, parse_one(b)?);
                (a.min(b), a.max(b))
            }
            None => {
                let n = parse_one(part)?;
                (n, n)
            }
        };
        for n in start..=end.min(u32::from(MAX_NUMBER)) {
            out.insert(n as u16);
        }
    }

    Ok(out.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_display_and_key_parse() {
        let id = ResourceId::number(Source::ProseArticle, 42);
        assert_eq!(id.to_string(), "prose-article:42");
        assert_eq!(id.as_number(), Some(42));

        let ext = ResourceId::external(Source::StructuredData, "iso3166-numeric");
        assert_eq!(ext.to_string(), "structured-data:iso3166-numeric");
        assert_eq!(ext.as_number(), None);

        assert_eq!("7".parse::<ResourceKey>().unwrap(), ResourceKey::Number(7));
        assert!("1000".parse::<ResourceKey>().is_err());
        assert!("Bad Key".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn source_aliases() {
        assert_eq!("wikidata".parse::<Source>().unwrap(), Source::StructuredData);
        assert_eq!("prose-article".parse::<Source>().unwrap(), Source::ProseArticle);
        assert!("oeis".parse::<Source>().is_err());
    }

    #[test]
    fn fingerprint_is_stable_for_equal_payloads() {
        let mut codes = BTreeMap::new();
        codes.insert(
            392,
            vec![EntityRef {
                label: "Japan".into(),
                qid: "Q17".into(),
            }],
        );
        let a = Payload::CodeTable(CodeTable { codes: codes.clone() });
        let b = Payload::CodeTable(CodeTable { codes });
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let c = Payload::Missing;
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn payload_json_roundtrip_keeps_kind_tag() {
        let payload = Payload::NumberItem(NumberItem {
            qid: "Q713".into(),
            label: Some("42".into()),
            description: None,
        });
        let json = payload.to_json().unwrap();
        assert!(json.contains(r#""kind":"number_item""#));
        assert_eq!(Payload::from_json(&json).unwrap(), payload);
        assert!(Payload::from_json("{\"kind\":\"nope\"}").is_err());
    }

    #[test]
    fn elevated_policy_only_changes_use_cache() {
        assert!(Policy::UseCache.elevated().is_refreshing());
        assert_eq!(Policy::ForceRefresh.elevated(), Policy::ForceRefresh);
    }

    #[test]
    fn id_spec_parsing() {
        assert_eq!(parse_id_spec("444").unwrap(), vec![444]);
        assert_eq!(parse_id_spec("3-1").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_id_spec("5, 2,4-5").unwrap(), vec![2, 4, 5]);
        assert_eq!(parse_id_spec("998-1200").unwrap(), vec![998, 999]);
        assert_eq!(parse_id_spec("0-999").unwrap().len(), 1000);
        assert!(parse_id_spec("").is_err());
        assert!(parse_id_spec("4x").is_err());
    }
}
