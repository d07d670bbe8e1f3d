//! DBLP API client
//!
//! # API Reference
//! - Endpoint: https://dblp.org/search/publ/api?q=...&format=json
//! - Documentation: https://dblp.org/faq/How+to+use+the+dblp+search+API.html
//! - Rate Limit: 1 request/second recommended

use super::http::{provider_error, Backoff, ProviderHttp};
use colrev_common::record::fields::{
    AUTHOR, BOOKTITLE, DBLP_KEY, DOI, JOURNAL, NUMBER, PAGES, TITLE, URL, VOLUME, YEAR,
};
use colrev_common::text::unify_pages;
use colrev_common::Record;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const DBLP_BASE_URL: &str = "https://dblp.org";

provider_error!(DblpError, "dblp");

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hit: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    info: HitInfo,
}

#[derive(Debug, Deserialize)]
struct HitInfo {
    title: String,
    authors: Option<Authors>,
    venue: Option<Value>,
    year: Option<String>,
    volume: Option<String>,
    number: Option<String>,
    pages: Option<String>,
    doi: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    key: Option<String>,
    ee: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Authors {
    author: Value,
}

/// DBLP author names carry disambiguation numbers (`Jane Webster 0001`)
fn author_name(value: &Value) -> Option<String> {
    let text = value.get("text").and_then(Value::as_str).or_else(|| value.as_str())?;
    let name: Vec<&str> = text
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .collect();
    let (last, given) = name.split_last()?;
    if given.is_empty() {
        return Some(last.to_string());
    }
    Some(format!("{}, {}", last, given.join(" ")))
}

fn first_text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

impl HitInfo {
    fn into_record(self) -> Record {
        let entry_type = match self.kind.as_deref() {
            Some("Journal Articles") => "article",
            Some("Conference and Workshop Papers") => "inproceedings",
            Some("Books and Theses") => "book",
            Some("Parts in Books or Collections") => "inbook",
            _ => "misc",
        };
        let key = self.key.clone().unwrap_or_else(|| self.title.clone());
        let mut record = Record::new(key, entry_type);
        record.set_raw(TITLE, self.title.trim_end_matches('.'));
        if let Some(authors) = self.authors {
            let names: Vec<String> = match &authors.author {
                Value::Array(list) => list.iter().filter_map(author_name).collect(),
                single => author_name(single).into_iter().collect(),
            };
            if !names.is_empty() {
                record.set_raw(AUTHOR, names.join(" and "));
            }
        }
        if let Some(venue) = first_text(&self.venue) {
            let container = if entry_type == "inproceedings" { BOOKTITLE } else { JOURNAL };
            record.set_raw(container, venue);
        }
        let optional = [
            (YEAR, self.year),
            (VOLUME, self.volume),
            (NUMBER, self.number),
            (PAGES, self.pages.map(|p| unify_pages(&p))),
            (DOI, self.doi.map(|d| d.to_uppercase())),
            (URL, first_text(&self.ee)),
            (DBLP_KEY, self.key),
        ];
        for (field, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                record.set_raw(field, value);
            }
        }
        record
    }
}

pub struct DblpClient {
    http: ProviderHttp,
    base_url: String,
}

impl DblpClient {
    pub fn new() -> Result<Self, DblpError> {
        Self::with_base_url(DBLP_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, DblpError> {
        Ok(Self {
            http: ProviderHttp::new("dblp", 1, Backoff::Fixed(Duration::from_secs(1)))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Publication search (`q` is a title or a venue query)
    pub async fn search(&self, q: &str, hits: usize, first: usize) -> Result<Vec<Record>, DblpError> {
        let url = format!("{}/search/publ/api", self.base_url);
        let query = [
            ("q", q.to_string()),
            ("format", "json".to_string()),
            ("h", hits.to_string()),
            ("f", first.to_string()),
        ];
        let response: SearchResponse = self
            .http
            .get_json(q, |c| c.get(&url).query(&query))
            .await?;
        Ok(response
            .result
            .hits
            .hit
            .into_iter()
            .map(|h| h.info.into_record())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_maps_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/publ/api"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"hits": {"hit": [{"info": {
                    "title": "Platform ecosystems.",
                    "authors": {"author": [{"text": "Ann Lee 0001"}, {"text": "Bo Chen"}]},
                    "venue": "ICIS",
                    "year": "2019",
                    "type": "Conference and Workshop Papers",
                    "key": "conf/icis/LeeC19"
                }}]}}
            })))
            .mount(&server)
            .await;
        let client = DblpClient::with_base_url(&server.uri()).unwrap();
        let found = client.search("Platform ecosystems", 5, 0).await.unwrap();
        assert_eq!(found.len(), 1);
        let record = &found[0];
        assert_eq!(record.entry_type, "inproceedings");
        assert_eq!(record.get("title"), Some("Platform ecosystems"));
        assert_eq!(record.get("author"), Some("Lee, Ann and Chen, Bo"));
        assert_eq!(record.get("booktitle"), Some("ICIS"));
        assert_eq!(record.get("dblp_key"), Some("conf/icis/LeeC19"));
    }

    #[tokio::test]
    async fn single_author_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/publ/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"hits": {"hit": [{"info": {
                    "title": "Solo",
                    "authors": {"author": {"text": "Ann Lee"}},
                    "type": "Journal Articles",
                    "venue": "MIS Q."
                }}]}}
            })))
            .mount(&server)
            .await;
        let client = DblpClient::with_base_url(&server.uri()).unwrap();
        let found = client.search("Solo", 1, 0).await.unwrap();
        assert_eq!(found[0].get("author"), Some("Lee, Ann"));
        assert_eq!(found[0].get("journal"), Some("MIS Q."));
    }
}
