//! Shared types, error model, and configuration for numsheet.
//!
//! This crate is the foundation depended on by all other numsheet crates.
//! It provides:
//! - [`NumsheetError`]: the unified error type
//! - Domain types ([`ResourceId`], [`Payload`], [`CacheEntry`], [`Policy`], [`RunMode`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, ExcerptConfig, NetworkConfig, PolicyKind, ScoringWeights,
    SourcesConfig, WikidataConfig, WikipediaConfig, config_dir, config_file_path, init_config,
    expand_home, init_config_at, load_config, load_config_at, load_config_from,
};
pub use error::{NumsheetError, Result};
pub use types::{
    Article, ArticleSection, CacheEntry, CodeTable, EntityRef, MAX_NUMBER, NumberItem, Payload,
    Policy, ResourceId, ResourceKey, RunMode, SectionKind, Source, fingerprint, parse_id_spec,
};
