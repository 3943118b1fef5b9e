//! External sources for numsheet: the Wikidata and Wikipedia clients and
//! the policy-driven cache store in front of them.
//!
//! The generator only ever talks to [`CacheStore`]; the store decides when
//! a [`SourceClient`] is called.

pub mod cache;
pub mod client;
pub mod hub;
pub mod wikidata;
pub mod wikipedia;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use cache::{CacheSettings, CacheStats, CacheStore, Resolved};
pub use client::{FetchCause, FetchError, Http, SourceClient, USER_AGENT};
pub use hub::SourceHub;
pub use wikidata::{CALLING_CODES, ISO3166_NUMERIC, WikidataClient};
pub use wikipedia::WikipediaClient;

#[cfg(any(test, feature = "test-util"))]
pub use fake::StaticClient;
