//! Dispatch by source to the matching backend.

use numsheet_shared::{AppConfig, Payload, ResourceId, Result, Source};

use crate::client::{FetchError, Http, SourceClient};
use crate::wikidata::WikidataClient;
use crate::wikipedia::WikipediaClient;

/// The production [`SourceClient`]: Wikidata for structured data,
/// Wikipedia for prose.
#[derive(Debug, Clone)]
pub struct SourceHub {
    wikidata: WikidataClient,
    wikipedia: WikipediaClient,
}

impl SourceHub {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = Http::new(&config.network)?;
        Ok(Self {
            wikidata: WikidataClient::new(http.clone(), config.sources.wikidata.clone()),
            wikipedia: WikipediaClient::new(http, config.sources.wikipedia.clone()),
        })
    }
}

impl SourceClient for SourceHub {
    async fn fetch(&self, id: &ResourceId) -> std::result::Result<Payload, FetchError> {
        match id.source {
            Source::StructuredData => self.wikidata.fetch(id).await,
            Source::ProseArticle => self.wikipedia.fetch(id).await,
        }
    }

    async fn probe(&self, source: Source) -> bool {
        match source {
            Source::StructuredData => self.wikidata.probe().await,
            Source::ProseArticle => self.wikipedia.probe().await,
        }
    }
}
