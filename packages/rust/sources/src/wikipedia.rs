//! Wikipedia backend (CC BY-SA prose).
//!
//! One article fetch is three kinds of MediaWiki action API calls: the
//! plain-text intro extract, the section list, and the raw wikitext of each
//! section whose heading matches a configured name.

use numsheet_shared::{Article, ArticleSection, Payload, ResourceId, ResourceKey, SectionKind, WikipediaConfig};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::client::{FetchError, Http, str_field};

const JSON: &str = "application/json";

/// Client for a MediaWiki action API.
#[derive(Debug, Clone)]
pub struct WikipediaClient {
    http: Http,
    config: WikipediaConfig,
}

/// A `(index, heading)` pair from `action=parse&prop=sections`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SectionRef {
    index: String,
    line: String,
}

impl WikipediaClient {
    pub fn new(http: Http, config: WikipediaConfig) -> Self {
        Self { http, config }
    }

    #[instrument(skip_all, fields(resource = %id))]
    pub async fn fetch(&self, id: &ResourceId) -> Result<Payload, FetchError> {
        let n = match &id.key {
            ResourceKey::Number(n) => *n,
            ResourceKey::External(name) => {
                return Err(FetchError::malformed(
                    id,
                    format!("articles are addressed by number, not '{name}'"),
                ));
            }
        };

        let requested = self.config.title_template.replace("{n}", &n.to_string());
        let Some((title, intro)) = self.fetch_intro(id, &requested).await? else {
            debug!(title = %requested, "article missing");
            return Ok(Payload::Missing);
        };

        let available = self.fetch_sections(id, &title).await?;
        let mut sections = Vec::new();
        for kind in SectionKind::ALL {
            let Some(found) = match_section(&available, self.config.section_names(kind)) else {
                continue;
            };
            let wikitext = self.fetch_section_wikitext(id, &title, &found.index).await?;
            sections.push(ArticleSection {
                kind,
                heading: found.line.clone(),
                wikitext,
            });
        }

        debug!(%title, sections = sections.len(), "article fetched");
        Ok(Payload::Article(Article {
            url: self.article_url(&title),
            title,
            intro,
            sections,
        }))
    }

    pub async fn probe(&self) -> bool {
        self.http.probe_mediawiki(&self.config.api_endpoint).await
    }

    /// Returns the resolved title (after redirects) and the intro text.
    async fn fetch_intro(
        &self,
        id: &ResourceId,
        title: &str,
    ) -> Result<Option<(String, String)>, FetchError> {
        let body = self
            .http
            .get_json(
                id,
                &self.config.api_endpoint,
                &[
                    ("action", "query"),
                    ("format", "json"),
                    ("formatversion", "2"),
                    ("prop", "extracts"),
                    ("exintro", "1"),
                    ("explaintext", "1"),
                    ("exsectionformat", "plain"),
                    ("redirects", "1"),
                    ("titles", title),
                ],
                JSON,
            )
            .await?;

        let page = body
            .pointer("/query/pages/0")
            .ok_or_else(|| FetchError::malformed(id, "query response has no pages"))?;

        if page.get("missing").is_some() || page.get("invalid").is_some() {
            return Ok(None);
        }

        let resolved = str_field(page, "title").unwrap_or(title).to_string();
        let intro = str_field(page, "extract").map(collapse_whitespace).unwrap_or_default();
        Ok(Some((resolved, intro)))
    }

    async fn fetch_sections(&self, id: &ResourceId, title: &str) -> Result<Vec<SectionRef>, FetchError> {
        let body = self
            .http
            .get_json(
                id,
                &self.config.api_endpoint,
                &[
                    ("action", "parse"),
                    ("format", "json"),
                    ("formatversion", "2"),
                    ("prop", "sections"),
                    ("redirects", "1"),
                    ("page", title),
                ],
                JSON,
            )
            .await?;

        let sections = body
            .pointer("/parse/sections")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::malformed(id, "parse response has no sections"))?;

        Ok(sections
            .iter()
            .filter_map(|s| {
                Some(SectionRef {
                    index: str_field(s, "index")?.to_string(),
                    line: str_field(s, "line")?.to_string(),
                })
            })
            .collect())
    }

    async fn fetch_section_wikitext(
        &self,
        id: &ResourceId,
        title: &str,
        index: &str,
    ) -> Result<String, FetchError> {
        let body = self
            .http
            .get_json(
                id,
                &self.config.api_endpoint,
                &[
                    ("action", "parse"),
                    ("format", "json"),
                    ("formatversion", "2"),
                    ("prop", "wikitext"),
                    ("redirects", "1"),
                    ("page", title),
                    ("section", index),
                ],
                JSON,
            )
            .await?;

        body.pointer("/parse/wikitext")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FetchError::malformed(id, format!("section {index} has no wikitext")))
    }

    /// `https://en.wikipedia.org/wiki/42_(number)`, derived from the API host.
    fn article_url(&self, title: &str) -> String {
        let page = title.replace(' ', "_");
        match Url::parse(&self.config.api_endpoint) {
            Ok(mut url) => {
                url.set_query(None);
                url.set_path(&format!("/wiki/{page}"));
                url.to_string()
            }
            Err(_) => format!("https://{}.wikipedia.org/wiki/{page}", self.config.language),
        }
    }
}

/// First configured name (in priority order) that some section heading
/// matches, ignoring case and surrounding markup.
fn match_section<'a>(available: &'a [SectionRef], names: &[String]) -> Option<&'a SectionRef> {
    names.iter().find_map(|name| {
        let want = name.trim().to_lowercase();
        available
            .iter()
            .find(|s| strip_markup(&s.line).to_lowercase() == want)
    })
}

/// Headings from `prop=sections` may contain inline HTML such as `<i>`.
fn strip_markup(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use numsheet_shared::{NetworkConfig, Source};
    use wiremock::matchers::{path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WikipediaClient {
        let config = WikipediaConfig {
            api_endpoint: format!("{}/w/api.php", server.uri()),
            ..WikipediaConfig::default()
        };
        WikipediaClient::new(Http::new(&NetworkConfig::default()).unwrap(), config)
    }

    #[test]
    fn section_matching_follows_priority_and_ignores_markup() {
        let available = vec![
            SectionRef { index: "1".into(), line: "In <i>mathematics</i>".into() },
            SectionRef { index: "2".into(), line: "Properties".into() },
        ];
        let names = vec!["Mathematics".to_string(), "In mathematics".into(), "Properties".into()];
        assert_eq!(match_section(&available, &names).unwrap().index, "1");
        assert!(match_section(&available, &["History".to_string()]).is_none());
    }

    #[tokio::test]
    async fn article_with_matched_sections() {
        let server = MockServer::start().await;
        Mock::given(path("/w/api.php"))
            .and(query_param("prop", "extracts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"query":{"pages":[{"pageid":1,"title":"42 (number)","extract":"42 is the\nnatural number."}]}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(path("/w/api.php"))
            .and(query_param("prop", "sections"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"parse":{"title":"42 (number)","sections":[
                    {"index":"1","line":"Mathematics"},
                    {"index":"2","line":"Science"},
                    {"index":"3","line":"In other fields"}]}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(path("/w/api.php"))
            .and(query_param("prop", "wikitext"))
            .and(query_param("section", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"parse":{"wikitext":"== Mathematics ==\n42 is a [[pronic number]]."}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(path("/w/api.php"))
            .and(query_param("prop", "wikitext"))
            .and(query_param("section", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"parse":{"wikitext":"42 is the answer in ''The Hitchhiker's Guide''."}}"#,
            ))
            .mount(&server)
            .await;

        let id = ResourceId::number(Source::ProseArticle, 42);
        let payload = client_for(&server).fetch(&id).await.expect("fetch");
        let Payload::Article(article) = payload else {
            panic!("expected Article");
        };
        assert_eq!(article.title, "42 (number)");
        assert_eq!(article.intro, "42 is the natural number.");
        assert!(article.url.ends_with("/wiki/42_(number)"));
        assert_eq!(article.sections.len(), 2);
        let props = article.section(SectionKind::Properties).unwrap();
        assert!(props.wikitext.contains("pronic"));
        assert_eq!(article.section(SectionKind::Miscellany).unwrap().heading, "In other fields");
    }

    #[tokio::test]
    async fn missing_article() {
        let server = MockServer::start().await;
        Mock::given(query_param("prop", "extracts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"query":{"pages":[{"ns":0,"title":"997 (number)","missing":true}]}}"#,
            ))
            .mount(&server)
            .await;

        let id = ResourceId::number(Source::ProseArticle, 997);
        assert_eq!(client_for(&server).fetch(&id).await.unwrap(), Payload::Missing);
    }

    #[tokio::test]
    async fn server_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let id = ResourceId::number(Source::ProseArticle, 7);
        let err = client_for(&server).fetch(&id).await.unwrap_err();
        assert_eq!(err.cause, crate::client::FetchCause::Status(503));
    }
}
