//! Open Library client (book metadata by ISBN)
//!
//! # API Reference
//! - Endpoint: https://openlibrary.org/isbn/{isbn}.json
//! - Documentation: https://openlibrary.org/dev/docs/api/books
//! - Rate Limit: 1 request/second

use super::http::{provider_error, Backoff, ProviderHttp};
use colrev_common::record::fields::{PUBLISHER, TITLE, YEAR};
use colrev_common::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

pub const OPEN_LIBRARY_BASE_URL: &str = "https://openlibrary.org";

static YEAR_IN_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(1[5-9]|20)\d{2}\b").unwrap());

provider_error!(OpenLibraryError, "open_library");

#[derive(Debug, Deserialize)]
struct Edition {
    title: String,
    subtitle: Option<String>,
    #[serde(default)]
    publishers: Vec<String>,
    publish_date: Option<String>,
}

pub struct OpenLibraryClient {
    http: ProviderHttp,
    base_url: String,
}

impl OpenLibraryClient {
    pub fn new() -> Result<Self, OpenLibraryError> {
        Self::with_base_url(OPEN_LIBRARY_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, OpenLibraryError> {
        Ok(Self {
            http: ProviderHttp::new("open_library", 1, Backoff::Fixed(Duration::from_secs(1)))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Book metadata for an ISBN
    pub async fn by_isbn(&self, isbn: &str) -> Result<Record, OpenLibraryError> {
        let isbn: String = isbn.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        let url = format!("{}/isbn/{}.json", self.base_url, isbn);
        let edition: Edition = self.http.get_json(&isbn, |c| c.get(&url)).await?;

        let mut record = Record::new(isbn.clone(), "book");
        let title = match edition.subtitle {
            Some(subtitle) => format!("{}: {}", edition.title, subtitle),
            None => edition.title,
        };
        record.set_raw(TITLE, title);
        if let Some(publisher) = edition.publishers.into_iter().next() {
            record.set_raw(PUBLISHER, publisher);
        }
        if let Some(year) = edition
            .publish_date
            .as_deref()
            .and_then(|d| YEAR_IN_DATE.find(d))
        {
            record.set_raw(YEAR, year.as_str());
        }
        record.set_raw("isbn", isbn);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn book_by_isbn() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/isbn/9780262033848.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Introduction to Algorithms",
                "publishers": ["MIT Press"],
                "publish_date": "July 31, 2009"
            })))
            .mount(&server)
            .await;
        let client = OpenLibraryClient::with_base_url(&server.uri()).unwrap();
        let record = client.by_isbn("978-0-262-03384-8").await.unwrap();
        assert_eq!(record.get("title"), Some("Introduction to Algorithms"));
        assert_eq!(record.get("publisher"), Some("MIT Press"));
        assert_eq!(record.get("year"), Some("2009"));
    }
}
