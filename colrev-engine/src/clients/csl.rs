//! Crossref / CSL-JSON items as records
//!
//! Crossref `/works` items and DOI content negotiation (CSL-JSON) share most
//! of their shape; titles and container titles are arrays in one and strings
//! in the other.

use colrev_common::record::fields::{
    ABSTRACT, AUTHOR, BOOKTITLE, DOI, JOURNAL, LANGUAGE, NUMBER, PAGES, PUBLISHER, TITLE, URL,
    VOLUME, YEAR,
};
use colrev_common::text::{collapse_whitespace, unify_pages};
use colrev_common::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static JATS_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?jats:[^>]*>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// First string of a value that may be a string or an array of strings
fn text(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().find_map(|v| v.as_str())?.to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let s = collapse_whitespace(&s);
    (!s.is_empty()).then_some(s)
}

/// Strip JATS markup from a Crossref abstract
pub fn dejats(input: &str) -> String {
    let without_jats = JATS_TAG.replace_all(input, " ");
    let without_tags = ANY_TAG.replace_all(&without_jats, " ");
    collapse_whitespace(&without_tags)
}

fn entry_type(kind: &str) -> &'static str {
    match kind {
        "journal-article" | "article-journal" | "article" => "article",
        "proceedings-article" | "paper-conference" => "inproceedings",
        "book-chapter" | "chapter" => "inbook",
        "book" | "monograph" | "edited-book" => "book",
        "dissertation" | "thesis" => "phdthesis",
        "report" => "techreport",
        _ => "misc",
    }
}

/// Family name followed by initials, e.g. `Webster, J. R.`
fn author_name(author: &Value) -> Option<String> {
    let family = author.get("family").and_then(Value::as_str);
    let given = author.get("given").and_then(Value::as_str);
    match (family, given) {
        (Some(family), Some(given)) => {
            let initials: Vec<String> = given
                .split(|c: char| c.is_whitespace() || c == '.' || c == '-')
                .filter_map(|w| w.chars().next())
                .map(|c| format!("{}.", c))
                .collect();
            Some(format!("{}, {}", family.trim(), initials.join(" ")))
        }
        (Some(family), None) => Some(family.trim().to_string()),
        _ => author.get("name").and_then(Value::as_str).map(str::to_string),
    }
}

fn year(item: &Value) -> Option<String> {
    ["published-print", "published", "issued", "published-online", "created"]
        .iter()
        .find_map(|key| {
            item.get(key)?
                .get("date-parts")?
                .get(0)?
                .get(0)?
                .as_i64()
                .map(|y| y.to_string())
        })
}

/// Convert a Crossref or CSL item into a record (ID from the DOI)
pub fn record_from_item(item: &Value) -> Option<Record> {
    let title = text(item.get("title"))?;
    let kind = item.get("type").and_then(Value::as_str).unwrap_or("");
    let entry_type = entry_type(kind);
    let doi = text(item.get("DOI")).map(|d| d.to_uppercase());
    let id = doi.clone().unwrap_or_else(|| title.clone());

    let mut record = Record::new(id, entry_type);
    record.set_raw(TITLE, title.trim_end_matches('.'));

    let authors: Vec<String> = item
        .get("author")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(author_name).collect())
        .unwrap_or_default();
    if !authors.is_empty() {
        record.set_raw(AUTHOR, authors.join(" and "));
    }
    if let Some(container) = text(item.get("container-title")) {
        let key = if entry_type == "inproceedings" || entry_type == "inbook" {
            BOOKTITLE
        } else {
            JOURNAL
        };
        record.set_raw(key, container);
    }
    if let Some(year) = year(item) {
        record.set_raw(YEAR, year);
    }
    if let Some(volume) = text(item.get("volume")) {
        record.set_raw(VOLUME, volume);
    }
    if let Some(issue) = text(item.get("issue")) {
        record.set_raw(NUMBER, issue);
    }
    if let Some(page) = text(item.get("page")) {
        record.set_raw(PAGES, unify_pages(&page));
    }
    if let Some(doi) = doi {
        record.set_raw(DOI, doi);
    }
    if let Some(publisher) = text(item.get("publisher")) {
        if entry_type == "book" || entry_type == "inbook" {
            record.set_raw(PUBLISHER, publisher);
        }
    }
    if let Some(abstract_) = text(item.get("abstract")) {
        record.set_raw(ABSTRACT, dejats(&abstract_));
    }
    if let Some(language) = text(item.get("language")) {
        record.set_raw(LANGUAGE, language);
    }
    if let Some(url) = text(item.get("URL")) {
        record.set_raw(URL, url);
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn crossref_item() {
        let item = json!({
            "DOI": "10.2307/4132319",
            "type": "journal-article",
            "title": ["Analyzing the Past to Prepare for the Future: Writing a Literature Review"],
            "author": [
                {"given": "Jane", "family": "Webster"},
                {"given": "Richard T.", "family": "Watson"}
            ],
            "container-title": ["MIS Quarterly"],
            "volume": "26",
            "issue": "2",
            "page": "xiii-xxiii",
            "published-print": {"date-parts": [[2002, 6]]},
            "abstract": "<jats:p>Reviews matter.</jats:p>"
        });
        let record = record_from_item(&item).unwrap();
        assert_eq!(record.entry_type, "article");
        assert_eq!(record.get("author"), Some("Webster, J. and Watson, R. T."));
        assert_eq!(record.get("journal"), Some("MIS Quarterly"));
        assert_eq!(record.get("year"), Some("2002"));
        assert_eq!(record.get("number"), Some("2"));
        assert_eq!(record.get("pages"), Some("xiii--xxiii"));
        assert_eq!(record.get("abstract"), Some("Reviews matter."));
        assert_eq!(record.get("doi"), Some("10.2307/4132319"));
    }

    #[test]
    fn csl_item_with_string_titles() {
        let item = json!({
            "type": "paper-conference",
            "title": "Platform ecosystems",
            "container-title": "ICIS 2019 Proceedings",
            "issued": {"date-parts": [[2019]]}
        });
        let record = record_from_item(&item).unwrap();
        assert_eq!(record.entry_type, "inproceedings");
        assert_eq!(record.get("booktitle"), Some("ICIS 2019 Proceedings"));
        assert_eq!(record.get("year"), Some("2019"));
        assert!(record_from_item(&json!({"type": "book"})).is_none());
    }
}
