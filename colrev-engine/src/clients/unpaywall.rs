//! Unpaywall API client
//!
//! # API Reference
//! - Endpoint: https://api.unpaywall.org/v2/{doi}?email=...
//! - Documentation: https://unpaywall.org/products/api
//! - Rate Limit: 100,000 calls/day (kept at 5/second)

use super::http::{provider_error, Backoff, ProviderHttp};
use serde::Deserialize;
use std::time::Duration;

pub const UNPAYWALL_BASE_URL: &str = "https://api.unpaywall.org";

provider_error!(UnpaywallError, "unpaywall");

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

pub struct UnpaywallClient {
    http: ProviderHttp,
    base_url: String,
    email: String,
}

impl UnpaywallClient {
    pub fn new(email: &str) -> Result<Self, UnpaywallError> {
        Self::with_base_url(UNPAYWALL_BASE_URL, email)
    }

    pub fn with_base_url(base_url: &str, email: &str) -> Result<Self, UnpaywallError> {
        Ok(Self {
            http: ProviderHttp::new("unpaywall", 5, Backoff::Fixed(Duration::from_millis(500)))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
        })
    }

    /// Open-access PDF link for a DOI (best location first)
    pub async fn pdf_url(&self, doi: &str) -> Result<Option<String>, UnpaywallError> {
        let url = format!("{}/v2/{}", self.base_url, doi);
        let query = [("email", self.email.as_str())];
        let response: UnpaywallResponse = match self
            .http
            .get_json(doi, |c| c.get(&url).query(&query))
            .await
        {
            Ok(r) => r,
            Err(super::http::RequestError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(response
            .best_oa_location
            .and_then(|l| l.url_for_pdf)
            .or_else(|| response.oa_locations.into_iter().find_map(|l| l.url_for_pdf)))
    }

    /// Download a file
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, UnpaywallError> {
        Ok(self.http.get_bytes(url, |c| c.get(url)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn finds_best_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/10.1/x"))
            .and(query_param("email", "me@example.org"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "best_oa_location": {"url_for_pdf": "https://example.org/x.pdf"},
                "oa_locations": []
            })))
            .mount(&server)
            .await;
        let client = UnpaywallClient::with_base_url(&server.uri(), "me@example.org").unwrap();
        assert_eq!(
            client.pdf_url("10.1/x").await.unwrap().as_deref(),
            Some("https://example.org/x.pdf")
        );
    }

    #[tokio::test]
    async fn unknown_doi_has_no_pdf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let client = UnpaywallClient::with_base_url(&server.uri(), "me@example.org").unwrap();
        assert_eq!(client.pdf_url("10.1/unknown").await.unwrap(), None);
    }
}
