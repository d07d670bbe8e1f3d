//! Agreement of a PDF's text with record metadata

use super::document;
use colrev_common::record::fields::{AUTHOR, FILE, TITLE};
use colrev_common::text::remove_accents;
use colrev_common::Record;
use std::path::Path;
use tracing::debug;

/// Share of title words that must appear in the first pages
pub const TITLE_WORD_SHARE: f64 = 0.9;
/// Share of author family names that must appear in the first pages
pub const AUTHOR_SHARE: f64 = 0.8;
/// Pages searched for title and authors
pub const VALIDATION_PAGES: usize = 2;

/// Letters only, lowercased, without accents or spacing
fn letters(text: &str) -> String {
    remove_accents(text)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect()
}

fn fold_umlauts(text: &str) -> String {
    text.replace("ue", "u").replace("ae", "a").replace("oe", "o")
}

/// Hints explaining why the text does not match the record (empty: it does)
pub fn metadata_hints(text: &str, record: &Record) -> Vec<&'static str> {
    let text = letters(text);
    let title_words: Vec<String> = record
        .known(TITLE)
        .map(|t| {
            remove_accents(t)
                .to_lowercase()
                .split_whitespace()
                .map(|w| w.chars().filter(|c| c.is_ascii_alphabetic()).collect::<String>())
                .filter(|w| !w.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if title_words.is_empty() {
        return vec!["title_not_in_record"];
    }
    let Some(author) = record.known(AUTHOR) else {
        return vec!["author_not_in_record"];
    };

    let mut hints = Vec::new();
    let found = title_words.iter().filter(|w| text.contains(w.as_str())).count();
    if (found as f64) / (title_words.len() as f64) < TITLE_WORD_SHARE {
        hints.push("title_not_in_first_pages");
    }

    if !title_words.iter().any(|w| w == "editorial") {
        let text = fold_umlauts(&text);
        let authors: Vec<&str> = author.split(" and ").collect();
        let found = authors
            .iter()
            .map(|a| fold_umlauts(&letters(a.split(',').next().unwrap_or(a))))
            .filter(|name| !name.is_empty() && text.contains(name.as_str()))
            .count();
        if (found as f64) / (authors.len() as f64) < AUTHOR_SHARE {
            hints.push("author_not_in_first_pages");
        }
    }
    hints
}

/// Whether the PDF attached to `pdf_record` shows `candidate`'s metadata
///
/// Unreadable or missing files do not match.
pub fn pdf_matches_record(root: &Path, pdf_record: &Record, candidate: &Record) -> bool {
    let Some(file) = pdf_record.known(FILE) else {
        return false;
    };
    match document::first_pages_text(&root.join(file), VALIDATION_PAGES) {
        Ok(text) => {
            let hints = metadata_hints(&text, candidate);
            debug!(pdf = %pdf_record.id, candidate = %candidate.id, ?hints, "Validated PDF against record");
            hints.is_empty()
        }
        Err(e) => {
            debug!(pdf = %pdf_record.id, error = %e, "Cannot read PDF for validation");
            false
        }
    }
}
