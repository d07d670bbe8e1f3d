//! GROBID client
//!
//! Recovers metadata for PDF-only records. Responses are requested as
//! BibTeX and parsed with the dataset parser.
//!
//! # API Reference
//! - Endpoints: /api/isalive, /api/processHeaderDocument,
//!   /api/processReferences, /api/processCitation
//! - Documentation: https://grobid.readthedocs.io/en/latest/Grobid-service/
//! - Rate Limit: local service, kept at 10 requests/second

use super::http::{provider_error, Backoff, ProviderHttp};
use crate::dataset::bibtex::{parse_entries, record_from_entry};
use colrev_common::Record;
use reqwest::header;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::debug;

pub const GROBID_BASE_URL: &str = "http://localhost:8070";
const BIBTEX: &str = "application/x-bibtex";

provider_error!(GrobidError, "grobid");

pub struct GrobidClient {
    http: ProviderHttp,
    base_url: String,
}

fn pdf_form(bytes: &[u8]) -> Form {
    let part = Part::bytes(bytes.to_vec()).file_name("input.pdf");
    Form::new().part("input", part)
}

fn records_from_bibtex(text: &str) -> Result<Vec<Record>, GrobidError> {
    let entries = parse_entries(text).map_err(|e| GrobidError::ParseError(e.to_string()))?;
    entries
        .iter()
        .map(|e| record_from_entry(e).map_err(|e| GrobidError::ParseError(e.to_string())))
        .collect()
}

impl GrobidClient {
    pub fn new() -> Result<Self, GrobidError> {
        Self::with_base_url(GROBID_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, GrobidError> {
        Ok(Self {
            http: ProviderHttp::new("grobid", 10, Backoff::Fixed(Duration::from_secs(1)))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Whether the service answers `/api/isalive`
    pub async fn is_alive(&self) -> bool {
        let url = format!("{}/api/isalive", self.base_url);
        match self.http.client().get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "GROBID not reachable");
                false
            }
        }
    }

    /// Header metadata of a PDF
    pub async fn process_header(&self, pdf: &[u8]) -> Result<Option<Record>, GrobidError> {
        let url = format!("{}/api/processHeaderDocument", self.base_url);
        let text = self
            .http
            .get_text("processHeaderDocument", |c| {
                c.post(&url)
                    .header(header::ACCEPT, BIBTEX)
                    .multipart(pdf_form(pdf))
            })
            .await?;
        Ok(records_from_bibtex(&text)?.into_iter().next())
    }

    /// Reference list of a PDF
    pub async fn process_references(&self, pdf: &[u8]) -> Result<Vec<Record>, GrobidError> {
        let url = format!("{}/api/processReferences", self.base_url);
        let text = self
            .http
            .get_text("processReferences", |c| {
                c.post(&url)
                    .header(header::ACCEPT, BIBTEX)
                    .multipart(pdf_form(pdf).text("consolidateCitations", "0"))
            })
            .await?;
        records_from_bibtex(&text)
    }

    /// Parse a free-text citation
    pub async fn process_citation(&self, citation: &str) -> Result<Option<Record>, GrobidError> {
        let url = format!("{}/api/processCitation", self.base_url);
        let form = [("citations", citation)];
        let text = self
            .http
            .get_text("processCitation", |c| {
                c.post(&url).header(header::ACCEPT, BIBTEX).form(&form)
            })
            .await?;
        Ok(records_from_bibtex(&text)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn header_document_as_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/isalive"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/processHeaderDocument"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "@article{-1,\n  author = {Smith, John},\n  title = {On X},\n  year = {2020}\n}\n",
            ))
            .mount(&server)
            .await;

        let client = GrobidClient::with_base_url(&server.uri()).unwrap();
        assert!(client.is_alive().await);
        let record = client.process_header(b"%PDF-1.4").await.unwrap().unwrap();
        assert_eq!(record.get("title"), Some("On X"));
        assert_eq!(record.get("author"), Some("Smith, John"));
    }

    #[tokio::test]
    async fn unreachable_service_is_not_alive() {
        let client = GrobidClient::with_base_url("http://127.0.0.1:9").unwrap();
        assert!(!client.is_alive().await);
    }
}
