//! DOI resolution and link inspection
//!
//! # API Reference
//! - Endpoint: https://doi.org/{doi} with `Accept: application/vnd.citationstyles.csl+json`
//! - Documentation: https://citation.crosscite.org/docs.html
//! - Rate Limit: none published; kept at 5 requests/second

use super::csl::record_from_item;
use super::http::{provider_error, Backoff, ProviderHttp};
use colrev_common::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub const DOI_BASE_URL: &str = "https://doi.org";
const CSL_JSON: &str = "application/vnd.citationstyles.csl+json";

static DOI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"10\.\d{4,9}/[-._;()/:A-Za-z0-9]+"#).unwrap());
static DOI_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(https?://)?(dx\.)?doi\.org/").unwrap());

provider_error!(DoiError, "doi");

/// Strip resolver prefixes and upper-case a DOI
pub fn normalize_doi(doi: &str) -> String {
    DOI_PREFIX.replace(doi.trim(), "").trim_end_matches('.').to_uppercase()
}

/// The DOI mentioned most often in `text`
pub fn majority_doi(text: &str) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for m in DOI_PATTERN.find_iter(text) {
        let doi = m.as_str().trim_end_matches(['.', ';', ')', ',']).to_uppercase();
        *counts.entry(doi).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(doi, _)| doi)
}

pub struct DoiClient {
    http: ProviderHttp,
    base_url: String,
}

impl DoiClient {
    pub fn new() -> Result<Self, DoiError> {
        Self::with_base_url(DOI_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, DoiError> {
        Ok(Self {
            http: ProviderHttp::new("doi", 5, Backoff::Fixed(Duration::from_millis(200)))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// CSL-JSON metadata of a DOI as a record
    pub async fn resolve(&self, doi: &str) -> Result<Record, DoiError> {
        let doi = normalize_doi(doi);
        let url = format!("{}/{}", self.base_url, doi);
        let item: Value = self
            .http
            .get_json(&doi, |c| c.get(&url).header(header::ACCEPT, CSL_JSON))
            .await?;
        record_from_item(&item).ok_or_else(|| DoiError::ParseError(format!("{} has no title", doi)))
    }

    /// Fetch a landing page and pick the DOI it mentions most often
    pub async fn harvest_doi(&self, url: &str) -> Result<Option<String>, DoiError> {
        let text = self.http.get_text(url, |c| c.get(url)).await?;
        Ok(majority_doi(&text))
    }

    /// HTTP status of a link (used to drop dead URLs)
    pub async fn link_status(&self, url: &str) -> Result<u16, DoiError> {
        match self.http.client().get(url).send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) => Err(DoiError::NetworkError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn normalizes_resolver_prefixes() {
        assert_eq!(normalize_doi("http://dx.doi.org/10.2307/4132319"), "10.2307/4132319");
        assert_eq!(normalize_doi("https://doi.org/10.1/abc."), "10.1/ABC");
    }

    #[test]
    fn majority_vote() {
        let page = "see 10.1000/abc and 10.1000/xyz; cite as doi:10.1000/abc.";
        assert_eq!(majority_doi(page).as_deref(), Some("10.1000/ABC"));
        assert_eq!(majority_doi("no identifiers here"), None);
    }

    #[tokio::test]
    async fn resolves_csl_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/10.1/X"))
            .and(header_matcher("accept", CSL_JSON))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "article-journal",
                "title": "On X",
                "container-title": "X Journal",
                "DOI": "10.1/x",
                "issued": {"date-parts": [[2020]]}
            })))
            .mount(&server)
            .await;
        let client = DoiClient::with_base_url(&server.uri()).unwrap();
        let record = client.resolve("10.1/x").await.unwrap();
        assert_eq!(record.get("journal"), Some("X Journal"));
        assert_eq!(record.get("doi"), Some("10.1/X"));
    }
}
