//! The fetch boundary: [`SourceClient`], [`FetchError`], and the shared
//! HTTP plumbing used by both backends.
//!
//! A client performs exactly one request sequence per call. It never
//! retries and never caches; both are the cache store's job.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use numsheet_shared::{NumsheetError, NetworkConfig, Payload, ResourceId, Result, Source};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// User-Agent prefix for every request.
pub const USER_AGENT: &str = concat!("numsheet/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// FetchError
// ---------------------------------------------------------------------------

/// Why a fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCause {
    /// Connection refused, DNS failure, TLS failure.
    Unreachable,
    Timeout,
    /// Non-success HTTP status.
    Status(u16),
    /// The response arrived but could not be understood.
    Malformed,
}

impl fmt::Display for FetchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => f.write_str("unreachable"),
            Self::Timeout => f.write_str("timeout"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Malformed => f.write_str("malformed response"),
        }
    }
}

/// A non-fatal failure to fetch one resource.
#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch {resource} failed ({cause}): {detail}")]
pub struct FetchError {
    pub resource: ResourceId,
    pub cause: FetchCause,
    pub detail: String,
}

impl FetchError {
    pub fn new(resource: &ResourceId, cause: FetchCause, detail: impl Into<String>) -> Self {
        Self {
            resource: resource.clone(),
            cause,
            detail: detail.into(),
        }
    }

    pub fn malformed(resource: &ResourceId, detail: impl Into<String>) -> Self {
        Self::new(resource, FetchCause::Malformed, detail)
    }

    /// Classify a transport-level `reqwest` error.
    pub fn from_reqwest(resource: &ResourceId, err: &reqwest::Error) -> Self {
        let cause = if err.is_timeout() {
            FetchCause::Timeout
        } else if let Some(status) = err.status() {
            FetchCause::Status(status.as_u16())
        } else if err.is_decode() {
            FetchCause::Malformed
        } else {
            FetchCause::Unreachable
        };
        Self::new(resource, cause, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// SourceClient
// ---------------------------------------------------------------------------

/// Fetches payloads from the external backends.
pub trait SourceClient {
    /// Fetch the current payload for `id`.
    fn fetch(&self, id: &ResourceId) -> impl Future<Output = std::result::Result<Payload, FetchError>> + Send;

    /// Cheap reachability check for one backend.
    fn probe(&self, source: Source) -> impl Future<Output = bool> + Send;
}

// ---------------------------------------------------------------------------
// HTTP plumbing
// ---------------------------------------------------------------------------

/// A configured `reqwest` client plus the probe timeout.
#[derive(Debug, Clone)]
pub struct Http {
    client: Client,
    probe_timeout: Duration,
}

impl Http {
    /// Build a client with the configured timeout and a declared User-Agent.
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let user_agent = format!("{USER_AGENT} ({})", network.contact);
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(network.timeout())
            .build()
            .map_err(|e| NumsheetError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            probe_timeout: network.probe_timeout(),
        })
    }

    /// GET `url` with `query` and decode a JSON body.
    pub async fn get_json(
        &self,
        resource: &ResourceId,
        url: &str,
        query: &[(&str, &str)],
        accept: &str,
    ) -> std::result::Result<Value, FetchError> {
        debug!(%resource, url, "GET");
        let response = self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(resource, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                resource,
                FetchCause::Status(status.as_u16()),
                format!("{url}: HTTP {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(resource, &e))?;

        serde_json::from_str(&body)
            .map_err(|e| FetchError::malformed(resource, format!("{url}: invalid JSON: {e}")))
    }

    /// One `siteinfo` request against a MediaWiki API under the probe timeout.
    pub async fn probe_mediawiki(&self, api_endpoint: &str) -> bool {
        let result = self
            .client
            .get(api_endpoint)
            .query(&[("action", "query"), ("meta", "siteinfo"), ("format", "json")])
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(body) => body.get("query").is_some(),
                Err(e) => {
                    debug!(api_endpoint, error = %e, "probe returned non-JSON body");
                    false
                }
            },
            Ok(resp) => {
                debug!(api_endpoint, status = %resp.status(), "probe failed");
                false
            }
            Err(e) => {
                debug!(api_endpoint, error = %e, "probe failed");
                false
            }
        }
    }
}

/// Read a string field, treating absence and wrong types alike.
pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_display_names_resource_and_cause() {
        let id = ResourceId::number(Source::ProseArticle, 42);
        let err = FetchError::new(&id, FetchCause::Status(503), "service unavailable");
        let text = err.to_string();
        assert!(text.contains("prose-article:42"));
        assert!(text.contains("HTTP 503"));
    }

    #[tokio::test]
    async fn get_json_classifies_status_and_malformed() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/down"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::path("/garbage"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let http = Http::new(&NetworkConfig::default()).unwrap();
        let id = ResourceId::number(Source::StructuredData, 1);

        let err = http
            .get_json(&id, &format!("{}/down", server.uri()), &[], "application/json")
            .await
            .unwrap_err();
        assert_eq!(err.cause, FetchCause::Status(500));

        let err = http
            .get_json(&id, &format!("{}/garbage", server.uri()), &[], "application/json")
            .await
            .unwrap_err();
        assert_eq!(err.cause, FetchCause::Malformed);
    }

    #[tokio::test]
    async fn unreachable_host_is_classified() {
        let http = Http::new(&NetworkConfig::default()).unwrap();
        let id = ResourceId::number(Source::StructuredData, 1);
        // Port 9 (discard) on localhost is closed in test environments.
        let err = http
            .get_json(&id, "http://127.0.0.1:9/api", &[], "application/json")
            .await
            .unwrap_err();
        assert!(matches!(err.cause, FetchCause::Unreachable | FetchCause::Timeout));
    }

    #[tokio::test]
    async fn probe_requires_siteinfo_json() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::query_param("meta", "siteinfo"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(r#"{"query":{"general":{"sitename":"Wikipedia"}}}"#),
            )
            .mount(&server)
            .await;

        let http = Http::new(&NetworkConfig::default()).unwrap();
        assert!(http.probe_mediawiki(&format!("{}/w/api.php", server.uri())).await);
        assert!(!http.probe_mediawiki("http://127.0.0.1:9/w/api.php").await);
    }
}
