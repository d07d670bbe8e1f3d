//! Crossref API client
//!
//! Bibliographic queries for preparation, DOI lookups, and journal feeds
//! (works by ISSN) for the search operation.
//!
//! # API Reference
//! - Endpoint: https://api.crossref.org/works
//! - Documentation: https://api.crossref.org/swagger-ui/index.html
//! - Rate Limit: polite pool, a few requests per second

use super::csl::record_from_item;
use super::http::{provider_error, Backoff, ProviderHttp};
use colrev_common::record::fields::{AUTHOR, TITLE, YEAR};
use colrev_common::Record;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const CROSSREF_BASE_URL: &str = "https://api.crossref.org";

provider_error!(CrossrefError, "crossref");

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: WorksMessage,
}

#[derive(Debug, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(rename = "total-results", default)]
    total_results: usize,
}

#[derive(Debug, Deserialize)]
struct WorkResponse {
    message: Value,
}

/// One page of a journal feed
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub records: Vec<Record>,
    pub total_results: usize,
}

pub struct CrossrefClient {
    http: ProviderHttp,
    base_url: String,
    mailto: Option<String>,
}

impl CrossrefClient {
    pub fn new(mailto: Option<String>) -> Result<Self, CrossrefError> {
        Self::with_base_url(CROSSREF_BASE_URL, mailto)
    }

    pub fn with_base_url(base_url: &str, mailto: Option<String>) -> Result<Self, CrossrefError> {
        Self::with_backoff(base_url, mailto, Backoff::Exponential(Duration::from_millis(500)))
    }

    pub fn with_backoff(
        base_url: &str,
        mailto: Option<String>,
        backoff: Backoff,
    ) -> Result<Self, CrossrefError> {
        Ok(Self {
            http: ProviderHttp::new("crossref", 5, backoff)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto,
        })
    }

    fn polite(&self, mut query: Vec<(String, String)>) -> Vec<(String, String)> {
        if let Some(mailto) = &self.mailto {
            query.push(("mailto".to_string(), mailto.clone()));
        }
        query
    }

    /// Query `/works` with the record's title, year, container and authors
    pub async fn query_bibliographic(&self, record: &Record, rows: usize) -> Result<Vec<Record>, CrossrefError> {
        let container = record.container_title();
        let bibliographic = [
            record.get(TITLE).unwrap_or(""),
            record.get(YEAR).unwrap_or(""),
            container.as_str(),
        ]
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        if bibliographic.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = vec![
            ("query.bibliographic".to_string(), bibliographic),
            ("rows".to_string(), rows.to_string()),
        ];
        if let Some(author) = record.get(AUTHOR) {
            query.push(("query.author".to_string(), author.to_string()));
        }
        if !container.is_empty() {
            query.push(("query.container-title".to_string(), container));
        }
        let query = self.polite(query);
        let url = format!("{}/works", self.base_url);

        debug!(id = %record.id, "Crossref bibliographic query");
        let response: WorksResponse = self
            .http
            .get_json("works", |c| c.get(&url).query(&query))
            .await?;
        Ok(response.message.items.iter().filter_map(record_from_item).collect())
    }

    /// Look up a single work by DOI
    pub async fn get_by_doi(&self, doi: &str) -> Result<Record, CrossrefError> {
        let url = format!("{}/works/{}", self.base_url, doi);
        let query = self.polite(Vec::new());
        let response: WorkResponse = self
            .http
            .get_json(doi, |c| c.get(&url).query(&query))
            .await?;
        record_from_item(&response.message)
            .ok_or_else(|| CrossrefError::ParseError(format!("work {} has no title", doi)))
    }

    /// Works of a journal, oldest first, `rows` at a time
    pub async fn journal_works(&self, issn: &str, offset: usize, rows: usize) -> Result<FeedPage, CrossrefError> {
        let url = format!("{}/journals/{}/works", self.base_url, issn);
        let query = self.polite(vec![
            ("rows".to_string(), rows.to_string()),
            ("offset".to_string(), offset.to_string()),
            ("sort".to_string(), "published".to_string()),
            ("order".to_string(), "asc".to_string()),
        ]);
        let response: WorksResponse = self
            .http
            .get_json(issn, |c| c.get(&url).query(&query))
            .await?;
        Ok(FeedPage {
            records: response.message.items.iter().filter_map(record_from_item).collect(),
            total_results: response.message.total_results,
        })
    }
}
