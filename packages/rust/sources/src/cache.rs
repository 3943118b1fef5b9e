//! Policy-driven cache resolution over [`Storage`] and a [`SourceClient`].
//!
//! The store decides, per request, whether to serve the stored entry or
//! fetch. A fetched payload only replaces the stored one when its
//! fingerprint changed, so an identical refresh leaves `fetched_at` alone.
//! In offline mode every policy degrades to `UseCache` and the client is
//! never called.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use numsheet_shared::{CacheEntry, NumsheetError, Payload, Policy, ResourceId, Result, RunMode};
use numsheet_storage::Storage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::{FetchError, SourceClient};

/// Result of resolving one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Available(CacheEntry),
    /// Nothing stored and nothing fetched. Not an error.
    Unavailable,
}

impl Resolved {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Self::Available(entry) => Some(entry),
            Self::Unavailable => None,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.entry().map(|e| &e.payload)
    }
}

/// Outcome counters for a run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Served from storage without fetching.
    pub hits: u32,
    /// Fetched and stored (new or changed).
    pub fetched: u32,
    /// Fetched but identical to the stored entry.
    pub unchanged: u32,
    /// Fetch failed; stored entry served instead.
    pub fallbacks: u32,
    pub unavailable: u32,
}

/// Network behaviour of a [`CacheStore`] for one run.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub mode: RunMode,
    /// Extra attempts after a failed fetch.
    pub retry_attempts: u32,
    /// Base delay, doubled after each failed attempt.
    pub retry_backoff: Duration,
}

impl CacheSettings {
    pub fn offline() -> Self {
        Self {
            mode: RunMode::Offline,
            retry_attempts: 0,
            retry_backoff: Duration::ZERO,
        }
    }

    pub fn online() -> Self {
        Self {
            mode: RunMode::Online,
            ..Self::offline()
        }
    }
}

/// Resolves resources for one run. Create a fresh store per range.
pub struct CacheStore<'a, C> {
    storage: &'a Storage,
    client: &'a C,
    settings: CacheSettings,
    memo: HashMap<ResourceId, Resolved>,
    stats: CacheStats,
}

impl<'a, C: SourceClient> CacheStore<'a, C> {
    pub fn new(storage: &'a Storage, client: &'a C, settings: CacheSettings) -> Self {
        Self {
            storage,
            client,
            settings,
            memo: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn mode(&self) -> RunMode {
        self.settings.mode
    }

    /// Resolve `id` under `policy`. Repeated calls within a run return the
    /// first resolution without touching storage or network again.
    ///
    /// Only storage failures are errors; fetch failures degrade to the
    /// stored entry or [`Resolved::Unavailable`].
    pub async fn resolve(&mut self, id: &ResourceId, policy: Policy) -> Result<Resolved> {
        if let Some(hit) = self.memo.get(id) {
            return Ok(hit.clone());
        }

        let resolved = self.resolve_uncached(id, policy).await?;
        if matches!(resolved, Resolved::Unavailable) {
            self.stats.unavailable += 1;
        }
        self.memo.insert(id.clone(), resolved.clone());
        Ok(resolved)
    }

    async fn resolve_uncached(&mut self, id: &ResourceId, policy: Policy) -> Result<Resolved> {
        let stored = self.load_stored(id).await?;

        let policy = match self.settings.mode {
            RunMode::Offline => Policy::UseCache,
            RunMode::Online => policy,
        };

        match policy {
            Policy::UseCache => match stored {
                Some(entry) => {
                    self.stats.hits += 1;
                    debug!(resource = %id, "cache hit");
                    Ok(Resolved::Available(entry))
                }
                None if self.settings.mode == RunMode::Offline => {
                    debug!(resource = %id, "cache miss (offline)");
                    Ok(Resolved::Unavailable)
                }
                None => self.refresh(id, None).await,
            },
            Policy::RefreshIfStale { max_age } => match stored {
                Some(entry) if is_fresh(&entry, max_age) => {
                    self.stats.hits += 1;
                    debug!(resource = %id, "cache entry still fresh");
                    Ok(Resolved::Available(entry))
                }
                stored => self.refresh(id, stored).await,
            },
            Policy::ForceRefresh => self.refresh(id, stored).await,
        }
    }

    /// A stored payload that no longer decodes is treated as absent.
    async fn load_stored(&self, id: &ResourceId) -> Result<Option<CacheEntry>> {
        match self.storage.get_entry(id).await {
            Ok(entry) => Ok(entry),
            Err(NumsheetError::Parse { message }) => {
                warn!(resource = %id, %message, "ignoring undecodable cache entry");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&mut self, id: &ResourceId, stored: Option<CacheEntry>) -> Result<Resolved> {
        let payload = match self.fetch_with_retry(id).await {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(match stored {
                    Some(entry) => {
                        warn!(resource = %id, error = %err, "fetch failed, serving cached entry");
                        self.stats.fallbacks += 1;
                        Resolved::Available(entry)
                    }
                    None => {
                        warn!(resource = %id, error = %err, "fetch failed, nothing cached");
                        Resolved::Unavailable
                    }
                });
            }
        };

        let fingerprint = payload.fingerprint()?;
        if let Some(entry) = stored {
            if entry.fingerprint == fingerprint {
                self.stats.unchanged += 1;
                debug!(resource = %id, "refetched payload unchanged");
                return Ok(Resolved::Available(entry));
            }
        }

        let entry = CacheEntry {
            resource: id.clone(),
            payload,
            fetched_at: Utc::now(),
            fingerprint,
        };
        self.storage.put_entry(&entry).await?;
        self.stats.fetched += 1;
        debug!(resource = %id, "stored fetched payload");
        Ok(Resolved::Available(entry))
    }

    async fn fetch_with_retry(&self, id: &ResourceId) -> std::result::Result<Payload, FetchError> {
        let mut delay = self.settings.retry_backoff;
        let mut attempt = 0;
        loop {
            match self.client.fetch(id).await {
                Ok(payload) => return Ok(payload),
                Err(err) if attempt < self.settings.retry_attempts => {
                    attempt += 1;
                    debug!(resource = %id, attempt, error = %err, "retrying fetch");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_fresh(entry: &CacheEntry, max_age: Duration) -> bool {
    let age = Utc::now().signed_duration_since(entry.fetched_at);
    match age.to_std() {
        Ok(age) => age < max_age,
        // fetched_at in the future: clock skew, treat as fresh
        Err(_) => true,
    }
}
