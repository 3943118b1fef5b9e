//! Wikidata backend (CC0 structured data).
//!
//! Numbers resolve to items through the configured wiki's article title
//! (`wbgetentities` with `sites` + `titles`). The two bulk code tables come
//! from the SPARQL query service.

use std::collections::BTreeMap;

use numsheet_shared::{CodeTable, EntityRef, NumberItem, Payload, ResourceId, ResourceKey, WikidataConfig};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::{FetchError, Http, str_field};

/// External key of the ISO 3166-1 numeric code table (property P299).
pub const ISO3166_NUMERIC: &str = "iso3166-numeric";

/// External key of the telephone calling code table (property P474).
pub const CALLING_CODES: &str = "calling-codes";

const SPARQL_ACCEPT: &str = "application/sparql-results+json";

const ISO3166_QUERY: &str = r#"SELECT ?code ?country ?countryLabel WHERE {
  ?country wdt:P299 ?code .
  FILTER(REGEX(STR(?code), "^[0-9]{1,3}$"))
  SERVICE wikibase:label { bd:serviceParam wikibase:language "{lang},en". }
}"#;

const CALLING_CODE_QUERY: &str = r#"SELECT ?code ?country ?countryLabel WHERE {
  ?country wdt:P474 ?code .
  FILTER(REGEX(STR(?code), "^\\+?[0-9]{1,3}$"))
  SERVICE wikibase:label { bd:serviceParam wikibase:language "{lang},en". }
}"#;

/// Client for the Wikidata action API and query service.
#[derive(Debug, Clone)]
pub struct WikidataClient {
    http: Http,
    config: WikidataConfig,
}

impl WikidataClient {
    pub fn new(http: Http, config: WikidataConfig) -> Self {
        Self { http, config }
    }

    #[instrument(skip_all, fields(resource = %id))]
    pub async fn fetch(&self, id: &ResourceId) -> Result<Payload, FetchError> {
        match &id.key {
            ResourceKey::Number(n) => self.fetch_number_item(id, *n).await,
            ResourceKey::External(name) if name == ISO3166_NUMERIC => {
                self.fetch_code_table(id, ISO3166_QUERY).await
            }
            ResourceKey::External(name) if name == CALLING_CODES => {
                self.fetch_code_table(id, CALLING_CODE_QUERY).await
            }
            ResourceKey::External(name) => Err(FetchError::malformed(
                id,
                format!("no Wikidata query for '{name}'"),
            )),
        }
    }

    pub async fn probe(&self) -> bool {
        self.http.probe_mediawiki(&self.config.api_endpoint).await
    }

    async fn fetch_number_item(&self, id: &ResourceId, n: u16) -> Result<Payload, FetchError> {
        let title = self.config.title_template.replace("{n}", &n.to_string());
        let body = self
            .http
            .get_json(
                id,
                &self.config.api_endpoint,
                &[
                    ("action", "wbgetentities"),
                    ("format", "json"),
                    ("formatversion", "2"),
                    ("sites", &self.config.site),
                    ("titles", &title),
                    ("props", "labels|descriptions"),
                    ("languages", &self.config.language),
                    ("maxlag", "5"),
                ],
                "application/json",
            )
            .await?;

        let payload = parse_entities(id, &body, &self.config.language)?;
        debug!(found = !matches!(payload, Payload::Missing), "wbgetentities");
        Ok(payload)
    }

    async fn fetch_code_table(&self, id: &ResourceId, query: &str) -> Result<Payload, FetchError> {
        let query = query.replace("{lang}", &self.config.language);
        let body = self
            .http
            .get_json(
                id,
                &self.config.sparql_endpoint,
                &[("format", "json"), ("query", &query)],
                SPARQL_ACCEPT,
            )
            .await?;

        let table = parse_code_bindings(id, &body)?;
        debug!(codes = table.codes.len(), "code table fetched");
        Ok(Payload::CodeTable(table))
    }
}

/// Parse a `wbgetentities` response into a number item, or `Missing`.
fn parse_entities(id: &ResourceId, body: &Value, language: &str) -> Result<Payload, FetchError> {
    if let Some(err) = body.get("error") {
        let info = str_field(err, "info").unwrap_or("unknown API error");
        return Err(FetchError::malformed(id, info.to_string()));
    }

    let entities = body
        .get("entities")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::malformed(id, "response has no 'entities' object"))?;

    let entity = entities.values().find(|e| {
        e.get("missing").is_none() && str_field(e, "id").is_some_and(|q| q.starts_with('Q'))
    });

    let Some(entity) = entity else {
        return Ok(Payload::Missing);
    };

    let localized = |field: &str| {
        entity
            .get(field)
            .and_then(|m| m.get(language))
            .and_then(|v| str_field(v, "value"))
            .map(str::to_string)
    };

    Ok(Payload::NumberItem(NumberItem {
        qid: str_field(entity, "id").unwrap_or_default().to_string(),
        label: localized("labels"),
        description: localized("descriptions"),
    }))
}

/// Collect `?code ?country ?countryLabel` bindings into a code table.
///
/// Codes may carry a leading `+` (calling codes); anything outside
/// `0..=999` or without an entity URI is skipped.
fn parse_code_bindings(id: &ResourceId, body: &Value) -> Result<CodeTable, FetchError> {
    let bindings = body
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::malformed(id, "SPARQL response has no bindings"))?;

    let mut codes: BTreeMap<u16, Vec<EntityRef>> = BTreeMap::new();
    for row in bindings {
        let value = |key: &str| row.get(key).and_then(|v| str_field(v, "value"));
        let (Some(code), Some(uri), Some(label)) =
            (value("code"), value("country"), value("countryLabel"))
        else {
            continue;
        };

        let digits = code.trim().trim_start_matches('+');
        let Ok(n) = digits.parse::<u16>() else {
            continue;
        };
        if n > numsheet_shared::MAX_NUMBER {
            continue;
        }
        let Some(qid) = entity_uri_to_qid(uri) else {
            continue;
        };

        let entry = EntityRef {
            label: label.to_string(),
            qid: qid.to_string(),
        };
        let refs = codes.entry(n).or_default();
        if !refs.contains(&entry) {
            refs.push(entry);
        }
    }

    for refs in codes.values_mut() {
        refs.sort();
    }

    Ok(CodeTable { codes })
}

/// `http://www.wikidata.org/entity/Q17` → `Q17`.
fn entity_uri_to_qid(uri: &str) -> Option<&str> {
    let (_, qid) = uri.rsplit_once("/entity/")?;
    qid.starts_with('Q').then_some(qid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use numsheet_shared::{NetworkConfig, Source};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WikidataClient {
        let config = WikidataConfig {
            api_endpoint: format!("{}/w/api.php", server.uri()),
            sparql_endpoint: format!("{}/sparql", server.uri()),
            ..WikidataConfig::default()
        };
        WikidataClient::new(Http::new(&NetworkConfig::default()).unwrap(), config)
    }

    #[test]
    fn qid_from_entity_uri() {
        assert_eq!(entity_uri_to_qid("http://www.wikidata.org/entity/Q17"), Some("Q17"));
        assert_eq!(entity_uri_to_qid("http://www.wikidata.org/prop/P299"), None);
    }

    #[tokio::test]
    async fn number_item_by_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("action", "wbgetentities"))
            .and(query_param("titles", "42 (number)"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"entities":{"Q713":{"id":"Q713",
                    "labels":{"en":{"language":"en","value":"42"}},
                    "descriptions":{"en":{"language":"en","value":"natural number"}}}}}"#,
            ))
            .mount(&server)
            .await;

        let id = ResourceId::number(Source::StructuredData, 42);
        let payload = client_for(&server).fetch(&id).await.expect("fetch");
        match payload {
            Payload::NumberItem(item) => {
                assert_eq!(item.qid, "Q713");
                assert_eq!(item.description.as_deref(), Some("natural number"));
                assert_eq!(item.url(), "https://www.wikidata.org/wiki/Q713");
            }
            other => panic!("expected NumberItem, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_title_yields_missing_payload() {
        let server = MockServer::start().await;
        Mock::given(query_param("action", "wbgetentities"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"entities":{"-1":{"site":"enwiki","title":"998 (number)","missing":true}}}"#,
            ))
            .mount(&server)
            .await;

        let id = ResourceId::number(Source::StructuredData, 998);
        let payload = client_for(&server).fetch(&id).await.expect("fetch");
        assert_eq!(payload, Payload::Missing);
    }

    #[tokio::test]
    async fn calling_codes_from_sparql() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sparql"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results":{"bindings":[
                  {"code":{"value":"+81"},"country":{"value":"http://www.wikidata.org/entity/Q17"},"countryLabel":{"value":"Japan"}},
                  {"code":{"value":"1"},"country":{"value":"http://www.wikidata.org/entity/Q30"},"countryLabel":{"value":"United States"}},
                  {"code":{"value":"1"},"country":{"value":"http://www.wikidata.org/entity/Q16"},"countryLabel":{"value":"Canada"}},
                  {"code":{"value":"1234"},"country":{"value":"http://www.wikidata.org/entity/Q1"},"countryLabel":{"value":"Nowhere"}},
                  {"code":{"value":"44"},"countryLabel":{"value":"No URI"}}
                ]}}"#,
            ))
            .mount(&server)
            .await;

        let id = ResourceId::external(Source::StructuredData, CALLING_CODES);
        let payload = client_for(&server).fetch(&id).await.expect("fetch");
        let Payload::CodeTable(table) = payload else {
            panic!("expected CodeTable");
        };
        assert_eq!(table.codes.len(), 2);
        assert_eq!(table.lookup(81)[0].label, "Japan");
        let ones: Vec<&str> = table.lookup(1).iter().map(|r| r.label.as_str()).collect();
        assert_eq!(ones, vec!["Canada", "United States"]);
        assert!(table.lookup(44).is_empty());
    }

    #[tokio::test]
    async fn unknown_external_key_is_malformed() {
        let server = MockServer::start().await;
        let id = ResourceId::external(Source::StructuredData, "zip-codes");
        let err = client_for(&server).fetch(&id).await.unwrap_err();
        assert_eq!(err.cause, crate::client::FetchCause::Malformed);
    }
}
