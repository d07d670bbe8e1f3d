//! Semantic Scholar API client
//!
//! # API Reference
//! - Endpoints: /graph/v1/paper/search, /v1/paper/{id}
//! - Documentation: https://api.semanticscholar.org/api-docs/graph
//! - Rate Limit: 100 requests / 5 minutes without a key (kept at 1/second)

use super::http::{provider_error, Backoff, ProviderHttp};
use colrev_common::record::fields::{ABSTRACT, AUTHOR, DOI, JOURNAL, SEMANTIC_SCHOLAR_ID, TITLE, YEAR};
use colrev_common::Record;
use serde::Deserialize;
use std::time::Duration;

pub const SEMANTIC_SCHOLAR_BASE_URL: &str = "https://api.semanticscholar.org";
const SEARCH_FIELDS: &str = "title,authors,year,venue,externalIds,abstract";

provider_error!(SemanticScholarError, "semantic_scholar");

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    paper_id: String,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<PaperAuthor>,
    year: Option<u32>,
    venue: Option<String>,
    #[serde(rename = "abstract")]
    abstract_: Option<String>,
    external_ids: Option<ExternalIds>,
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaperAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

fn family_first(name: &str) -> String {
    match name.rsplit_once(' ') {
        Some((given, family)) => format!("{}, {}", family, given),
        None => name.to_string(),
    }
}

impl Paper {
    fn into_record(self) -> Option<Record> {
        let mut record = Record::new(self.paper_id.clone(), "article");
        record.set_raw(TITLE, self.title?);
        let authors: Vec<String> = self.authors.iter().map(|a| family_first(&a.name)).collect();
        if !authors.is_empty() {
            record.set_raw(AUTHOR, authors.join(" and "));
        }
        if let Some(year) = self.year {
            record.set_raw(YEAR, year.to_string());
        }
        if let Some(venue) = self.venue.filter(|v| !v.is_empty()) {
            record.set_raw(JOURNAL, venue);
        }
        if let Some(abstract_) = self.abstract_.filter(|v| !v.is_empty()) {
            record.set_raw(ABSTRACT, abstract_);
        }
        let doi = self.external_ids.and_then(|e| e.doi).or(self.doi);
        if let Some(doi) = doi {
            record.set_raw(DOI, doi.to_uppercase());
        }
        record.set_raw(SEMANTIC_SCHOLAR_ID, self.paper_id);
        Some(record)
    }
}

pub struct SemanticScholarClient {
    http: ProviderHttp,
    base_url: String,
}

impl SemanticScholarClient {
    pub fn new() -> Result<Self, SemanticScholarError> {
        Self::with_base_url(SEMANTIC_SCHOLAR_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, SemanticScholarError> {
        Ok(Self {
            http: ProviderHttp::new("semantic_scholar", 1, Backoff::Fixed(Duration::from_secs(2)))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Title search
    pub async fn search(&self, title: &str, limit: usize) -> Result<Vec<Record>, SemanticScholarError> {
        let url = format!("{}/graph/v1/paper/search", self.base_url);
        let query = [
            ("query", title.to_string()),
            ("limit", limit.to_string()),
            ("fields", SEARCH_FIELDS.to_string()),
        ];
        let response: SearchResponse = self
            .http
            .get_json(title, |c| c.get(&url).query(&query))
            .await?;
        Ok(response.data.into_iter().filter_map(Paper::into_record).collect())
    }

    /// Full paper by Semantic Scholar id
    pub async fn paper(&self, paper_id: &str) -> Result<Record, SemanticScholarError> {
        let url = format!("{}/v1/paper/{}", self.base_url, paper_id);
        let paper: Paper = self.http.get_json(paper_id, |c| c.get(&url)).await?;
        paper
            .into_record()
            .ok_or_else(|| SemanticScholarError::ParseError(format!("paper {} has no title", paper_id)))
    }
}
