//! Application configuration for numsheet.
//!
//! User config lives at `~/.numsheet/numsheet.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NumsheetError, Result};
use crate::types::{Policy, SectionKind, Source};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "numsheet.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".numsheet";

// ---------------------------------------------------------------------------
// Config structs (matching numsheet.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub excerpt: ExcerptConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Corpus root; pages land under `<output_dir>/numbers/`.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// libSQL cache database file.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            cache_path: default_cache_path(),
        }
    }
}

fn default_output_dir() -> String {
    "docs".into()
}
fn default_cache_path() -> String {
    "~/.numsheet/cache.db".into()
}

/// `[network]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Per-request timeout. Clamped to 1-9 seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for the reachability probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Extra attempts for a refreshing fetch after the first failure.
    #[serde(default)]
    pub retry_attempts: u32,

    /// Base backoff between retries; doubles per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Contact string appended to the User-Agent.
    #[serde(default = "default_contact")]
    pub contact: String,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, 9))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.clamp(1, 9))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            retry_attempts: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            contact: default_contact(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    8
}
fn default_probe_timeout_secs() -> u64 {
    5
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_contact() -> String {
    "https://github.com/numsheet/numsheet".into()
}

/// Cache policy as written in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    UseCache,
    Refresh,
    Force,
}

impl PolicyKind {
    /// Resolve into a runtime [`Policy`]; `max_age_hours` only applies to `Refresh`.
    pub fn into_policy(self, max_age_hours: u64) -> Policy {
        match self {
            Self::UseCache => Policy::UseCache,
            Self::Refresh => Policy::RefreshIfStale {
                max_age: Duration::from_secs(max_age_hours.saturating_mul(3600)),
            },
            Self::Force => Policy::ForceRefresh,
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = NumsheetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "use-cache" | "cache" => Ok(Self::UseCache),
            "refresh" => Ok(Self::Refresh),
            "force" => Ok(Self::Force),
            other => Err(NumsheetError::config(format!(
                "unknown policy '{other}': expected use-cache, refresh, or force"
            ))),
        }
    }
}

/// `[sources]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub wikidata: WikidataConfig,

    #[serde(default)]
    pub wikipedia: WikipediaConfig,
}

impl SourcesConfig {
    pub fn is_enabled(&self, source: Source) -> bool {
        match source {
            Source::StructuredData => self.wikidata.enabled,
            Source::ProseArticle => self.wikipedia.enabled,
        }
    }

    pub fn policy(&self, source: Source) -> Policy {
        match source {
            Source::StructuredData => self
                .wikidata
                .policy
                .into_policy(self.wikidata.max_age_hours),
            Source::ProseArticle => self
                .wikipedia
                .policy
                .into_policy(self.wikipedia.max_age_hours),
        }
    }
}

/// `[sources.wikidata]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikidataConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_policy")]
    pub policy: PolicyKind,

    #[serde(default)]
    pub max_age_hours: u64,

    /// Wikibase action API.
    #[serde(default = "default_wikidata_api")]
    pub api_endpoint: String,

    /// SPARQL query service.
    #[serde(default = "default_sparql_endpoint")]
    pub sparql_endpoint: String,

    /// Site whose article titles map numbers to items, e.g. `enwiki`.
    #[serde(default = "default_site")]
    pub site: String,

    /// Language for labels and descriptions.
    #[serde(default = "default_language")]
    pub language: String,

    /// Title of the article describing a number; `{n}` is replaced.
    #[serde(default = "default_title_template")]
    pub title_template: String,
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: default_policy(),
            max_age_hours: 0,
            api_endpoint: default_wikidata_api(),
            sparql_endpoint: default_sparql_endpoint(),
            site: default_site(),
            language: default_language(),
            title_template: default_title_template(),
        }
    }
}

/// `[sources.wikipedia]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikipediaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_policy")]
    pub policy: PolicyKind,

    #[serde(default)]
    pub max_age_hours: u64,

    /// MediaWiki action API, e.g. `https://en.wikipedia.org/w/api.php`.
    #[serde(default = "default_wikipedia_api")]
    pub api_endpoint: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_title_template")]
    pub title_template: String,

    /// Section headings treated as `properties`, in priority order.
    #[serde(default = "default_property_sections")]
    pub property_sections: Vec<String>,

    /// Section headings treated as `miscellany`, in priority order.
    #[serde(default = "default_miscellany_sections")]
    pub miscellany_sections: Vec<String>,
}

impl WikipediaConfig {
    pub fn section_names(&self, kind: SectionKind) -> &[String] {
        match kind {
            SectionKind::Properties => &self.property_sections,
            SectionKind::Miscellany => &self.miscellany_sections,
        }
    }
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: default_policy(),
            max_age_hours: 0,
            api_endpoint: default_wikipedia_api(),
            language: default_language(),
            title_template: default_title_template(),
            property_sections: default_property_sections(),
            miscellany_sections: default_miscellany_sections(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_policy() -> PolicyKind {
    PolicyKind::UseCache
}
fn default_wikidata_api() -> String {
    "https://www.wikidata.org/w/api.php".into()
}
fn default_sparql_endpoint() -> String {
    "https://query.wikidata.org/sparql".into()
}
fn default_wikipedia_api() -> String {
    "https://en.wikipedia.org/w/api.php".into()
}
fn default_site() -> String {
    "enwiki".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_title_template() -> String {
    "{n} (number)".into()
}
fn default_property_sections() -> Vec<String> {
    vec!["In mathematics".into(), "Mathematics".into(), "Properties".into()]
}
fn default_miscellany_sections() -> Vec<String> {
    vec![
        "In other fields".into(),
        "Other fields".into(),
        "In science".into(),
        "In technology".into(),
        "In other uses".into(),
    ]
}

/// `[excerpt]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcerptConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `[[pin]]` table file. Missing file means no pins.
    #[serde(default = "default_pins_path")]
    pub pins_path: String,

    /// `[[threshold]]` table file. Missing file means no overrides.
    #[serde(default = "default_thresholds_path")]
    pub thresholds_path: String,

    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    /// Lowered to the hard budget of two when larger.
    #[serde(default = "default_quotes_per_section")]
    pub quotes_per_section: usize,

    #[serde(default = "default_min_chars")]
    pub min_chars: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Quotes longer than this are shortened with an ellipsis.
    #[serde(default = "default_quote_max_chars")]
    pub quote_max_chars: usize,

    #[serde(default)]
    pub weights: ScoringWeights,
}

impl Default for ExcerptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pins_path: default_pins_path(),
            thresholds_path: default_thresholds_path(),
            default_threshold: default_threshold(),
            quotes_per_section: default_quotes_per_section(),
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            quote_max_chars: default_quote_max_chars(),
            weights: ScoringWeights::default(),
        }
    }
}

fn default_pins_path() -> String {
    "config/pins.toml".into()
}
fn default_thresholds_path() -> String {
    "config/thresholds.toml".into()
}
fn default_threshold() -> f64 {
    30.0
}
fn default_quotes_per_section() -> usize {
    2
}
fn default_min_chars() -> usize {
    24
}
fn default_max_chars() -> usize {
    280
}
fn default_quote_max_chars() -> usize {
    140
}

/// `[excerpt.weights]`: scoring policy for quote candidates.
///
/// Scores are additive. A candidate mentioning its number (25) plus one
/// keyword (6) and a tight sentence (up to 20) clears the default
/// threshold of 30.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Subject number present as a standalone token.
    #[serde(default = "default_number_token")]
    pub number_token: f64,

    /// Per capitalized term or quoted title.
    #[serde(default = "default_named_entity")]
    pub named_entity: f64,

    #[serde(default = "default_entity_cap")]
    pub named_entity_cap: usize,

    /// Per section keyword hit.
    #[serde(default = "default_keyword")]
    pub keyword: f64,

    #[serde(default = "default_keyword_cap")]
    pub keyword_cap: usize,

    /// Scales the concision term in `[0, 1]`.
    #[serde(default = "default_concision")]
    pub concision: f64,

    /// Per point of term uniqueness across numbers (`1..=10`).
    #[serde(default = "default_uniqueness")]
    pub uniqueness: f64,

    #[serde(default = "default_properties_section")]
    pub properties_section: f64,

    #[serde(default = "default_miscellany_section")]
    pub miscellany_section: f64,

    #[serde(default = "default_property_keywords")]
    pub property_keywords: Vec<String>,

    #[serde(default = "default_miscellany_keywords")]
    pub miscellany_keywords: Vec<String>,
}

impl ScoringWeights {
    pub fn section_weight(&self, kind: SectionKind) -> f64 {
        match kind {
            SectionKind::Properties => self.properties_section,
            SectionKind::Miscellany => self.miscellany_section,
        }
    }

    pub fn keywords(&self, kind: SectionKind) -> &[String] {
        match kind {
            SectionKind::Properties => &self.property_keywords,
            SectionKind::Miscellany => &self.miscellany_keywords,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            number_token: default_number_token(),
            named_entity: default_named_entity(),
            named_entity_cap: default_entity_cap(),
            keyword: default_keyword(),
            keyword_cap: default_keyword_cap(),
            concision: default_concision(),
            uniqueness: default_uniqueness(),
            properties_section: default_properties_section(),
            miscellany_section: default_miscellany_section(),
            property_keywords: default_property_keywords(),
            miscellany_keywords: default_miscellany_keywords(),
        }
    }
}

fn default_number_token() -> f64 {
    25.0
}
fn default_named_entity() -> f64 {
    8.0
}
fn default_entity_cap() -> usize {
    3
}
fn default_keyword() -> f64 {
    6.0
}
fn default_keyword_cap() -> usize {
    3
}
fn default_concision() -> f64 {
    20.0
}
fn default_uniqueness() -> f64 {
    1.0
}
fn default_properties_section() -> f64 {
    1.0
}
fn default_miscellany_section() -> f64 {
    0.9
}
fn default_property_keywords() -> Vec<String> {
    [
        "prime",
        "composite",
        "square",
        "cube",
        "divisor",
        "factor",
        "sum",
        "product",
        "perfect",
        "abundant",
        "deficient",
        "palindrome",
        "fibonacci",
        "triangular",
        "sequence",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_miscellany_keywords() -> Vec<String> {
    [
        "code",
        "year",
        "atomic",
        "telephone",
        "country",
        "route",
        "album",
        "film",
        "song",
        "model",
        "street",
        "number",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.numsheet/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| NumsheetError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.numsheet/numsheet.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load from an explicit path when given (which must exist), else the default location.
pub fn load_config_at(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => load_config_from(p),
        None => load_config(),
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NumsheetError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| NumsheetError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| NumsheetError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| NumsheetError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| NumsheetError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("use-cache"));
        assert!(toml_str.contains("query.wikidata.org"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.network.timeout_secs, 8);
        assert_eq!(parsed.excerpt.quotes_per_section, 2);
        assert_eq!(parsed.sources.wikipedia.title_template, "{n} (number)");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/corpus"

[sources.wikipedia]
enabled = false
policy = "refresh"
max_age_hours = 24

[excerpt.weights]
keyword = 10.0
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/corpus");
        assert_eq!(config.defaults.cache_path, "~/.numsheet/cache.db");
        assert!(!config.sources.is_enabled(Source::ProseArticle));
        assert!(config.sources.is_enabled(Source::StructuredData));
        assert_eq!(
            config.sources.policy(Source::ProseArticle),
            Policy::RefreshIfStale {
                max_age: Duration::from_secs(24 * 3600)
            }
        );
        assert_eq!(config.excerpt.weights.keyword, 10.0);
        assert_eq!(config.excerpt.weights.number_token, 25.0);
    }

    #[test]
    fn unknown_policy_is_config_error() {
        let toml_str = r#"
[sources.wikidata]
policy = "sometimes"
"#;
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
        assert!("sometimes".parse::<PolicyKind>().is_err());
        assert_eq!("force".parse::<PolicyKind>().unwrap(), PolicyKind::Force);
    }

    #[test]
    fn timeouts_are_clamped() {
        let net = NetworkConfig {
            timeout_secs: 60,
            probe_timeout_secs: 0,
            ..NetworkConfig::default()
        };
        assert_eq!(net.timeout(), Duration::from_secs(9));
        assert_eq!(net.probe_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn init_config_at_writes_loadable_file() {
        let dir = std::env::temp_dir().join(format!("ns_cfg_{}", std::process::id()));
        let path = dir.join("nested").join(CONFIG_FILE_NAME);
        init_config_at(&path).expect("init");
        let loaded = load_config_at(Some(&path)).expect("load");
        assert_eq!(loaded.excerpt.default_threshold, 30.0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
