//! In-memory [`SourceClient`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use numsheet_shared::{Payload, ResourceId, Source};

use crate::client::{FetchCause, FetchError, SourceClient};

/// Serves payloads from a map and counts every call.
///
/// Unknown resources answer `Payload::Missing`; resources registered with
/// [`StaticClient::fail`] answer the given cause.
#[derive(Debug, Default)]
pub struct StaticClient {
    responses: Mutex<HashMap<ResourceId, Result<Payload, FetchCause>>>,
    reachable: Mutex<HashMap<Source, bool>>,
    fetches: AtomicUsize,
    probes: AtomicUsize,
}

impl StaticClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, id: ResourceId, payload: Payload) -> &Self {
        self.lock_responses().insert(id, Ok(payload));
        self
    }

    pub fn fail(&self, id: ResourceId, cause: FetchCause) -> &Self {
        self.lock_responses().insert(id, Err(cause));
        self
    }

    /// Make `probe(source)` answer `reachable`. Sources default to reachable.
    pub fn set_reachable(&self, source: Source, reachable: bool) -> &Self {
        if let Ok(mut map) = self.reachable.lock() {
            map.insert(source, reachable);
        }
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, HashMap<ResourceId, Result<Payload, FetchCause>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SourceClient for StaticClient {
    async fn fetch(&self, id: &ResourceId) -> Result<Payload, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let response = self.lock_responses().get(id).cloned();
        match response {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(cause)) => Err(FetchError::new(id, cause, "scripted failure")),
            None => Ok(Payload::Missing),
        }
    }

    async fn probe(&self, source: Source) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable
            .lock()
            .map(|map| map.get(&source).copied().unwrap_or(true))
            .unwrap_or(false)
    }
}
