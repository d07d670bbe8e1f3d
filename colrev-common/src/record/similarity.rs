//! Record similarity
//!
//! Weighted composite of per-field scores:
//!
//! | pair type | author | title | year | container | volume | number |
//! |---|---|---|---|---|---|---|
//! | article | 0.2 | 0.25 | 0.13 | 0.2 | 0.12 | 0.1 |
//! | article, generic title | 0.175 | 0 | 0.175 | 0.175 | 0.275 | 0.2 |
//! | other | 0.15 | 0.75 | 0.05 | 0.05 | | |
//!
//! Author, title and container are compared by token-set ratio; year,
//! volume and number by exact match. Missing and `UNKNOWN` values compare as
//! empty strings.

use super::fields::{self, AUTHOR, BOOKTITLE, JOURNAL, NUMBER, PAGES, TITLE, VOLUME, YEAR};
use super::Record;
use crate::text::{ratio, remove_accents, round4, token_set_ratio};

const ARTICLE_WEIGHTS: [f64; 6] = [0.2, 0.25, 0.13, 0.2, 0.12, 0.1];
const GENERIC_TITLE_WEIGHTS: [f64; 6] = [0.175, 0.0, 0.175, 0.175, 0.275, 0.2];
const OTHER_WEIGHTS: [f64; 4] = [0.15, 0.75, 0.05, 0.05];

/// Per-field scores behind a similarity value
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityDetails {
    pub author: f64,
    pub title: f64,
    pub year: f64,
    pub container: f64,
    pub volume: f64,
    pub number: f64,
    pub score: f64,
}

fn value<'a>(record: &'a Record, key: &str) -> &'a str {
    record.known(key).unwrap_or("")
}

fn exact(a: &str, b: &str) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

fn normalized_title(title: &str) -> String {
    title.to_lowercase().replace([':', '-'], "")
}

fn is_generic_title(title: &str) -> bool {
    fields::GENERIC_TITLES.contains(&title.trim().to_lowercase().as_str())
}

/// Detailed similarity of two records
pub fn similarity_detailed(a: &Record, b: &Record) -> SimilarityDetails {
    similarity_of(a, b, &a.container_title(), &b.container_title())
}

fn similarity_of(a: &Record, b: &Record, container_a: &str, container_b: &str) -> SimilarityDetails {
    let author = token_set_ratio(value(a, AUTHOR), value(b, AUTHOR));
    let title = token_set_ratio(
        &normalized_title(value(a, TITLE)),
        &normalized_title(value(b, TITLE)),
    );
    let year = exact(value(a, YEAR), value(b, YEAR));
    let container = token_set_ratio(container_a, container_b);
    let volume = exact(value(a, VOLUME), value(b, VOLUME));
    let number = exact(value(a, NUMBER), value(b, NUMBER));

    let both_articles = a.entry_type == "article" && b.entry_type == "article";
    let score = if both_articles {
        let weights = if is_generic_title(value(a, TITLE)) && is_generic_title(value(b, TITLE)) {
            GENERIC_TITLE_WEIGHTS
        } else {
            ARTICLE_WEIGHTS
        };
        [author, title, year, container, volume, number]
            .iter()
            .zip(weights.iter())
            .map(|(s, w)| s * w)
            .sum::<f64>()
    } else {
        [author, title, year, container]
            .iter()
            .zip(OTHER_WEIGHTS.iter())
            .map(|(s, w)| s * w)
            .sum::<f64>()
    };

    SimilarityDetails {
        author,
        title,
        year,
        container,
        volume,
        number,
        score: round4(score),
    }
}

/// Similarity of two records in [0, 1], symmetric, 1.0 for identical records
pub fn similarity(a: &Record, b: &Record) -> f64 {
    similarity_detailed(a, b).score
}

/// How much a record changed: `1 - ratio` of the citation strings
pub fn change_score(before: &Record, after: &Record) -> f64 {
    let citation = |r: &Record| {
        format!(
            "{} ({}) {}. {} {}, {} ({})",
            r.get(AUTHOR).unwrap_or(""),
            r.get(YEAR).unwrap_or(""),
            r.get(TITLE).unwrap_or(""),
            r.get(JOURNAL).unwrap_or(""),
            r.get(BOOKTITLE).unwrap_or(""),
            r.get(VOLUME).unwrap_or(""),
            r.get(NUMBER).unwrap_or(""),
        )
    };
    round4(1.0 - ratio(&citation(before), &citation(after)))
}

fn container_is_abbreviated(record: &Record) -> bool {
    [JOURNAL, BOOKTITLE].iter().any(|k| {
        record.get(k).is_some_and(|v| {
            v.matches('.').count() > 2 || (v.chars().any(|c| c.is_alphabetic()) && v.to_uppercase() == *v)
        })
    })
}

fn abbreviation_length(record: &Record) -> Option<usize> {
    [BOOKTITLE, JOURNAL]
        .iter()
        .find_map(|k| record.get(k))
        .and_then(|v| v.replace('.', "").split_whitespace().map(|w| w.chars().count()).min())
}

fn abbreviate(container: &str, len: usize) -> String {
    container
        .split(' ')
        .map(|w| w.chars().take(len).collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Author string for comparison: lowercase `last f m` tokens
fn author_for_comparison(author: &str) -> String {
    let author = remove_accents(&author.to_lowercase());
    let mut out = Vec::new();
    for name in author.split(" and ") {
        match name.split_once(',') {
            Some((last, given)) => {
                let initials: Vec<String> = given
                    .split_whitespace()
                    .filter_map(|w| w.chars().next())
                    .map(|c| c.to_string())
                    .collect();
                out.push(format!("{} {}", last.trim(), initials.join(" ")));
            }
            None => out.push(name.trim().to_string()),
        }
    }
    out.join(" ")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ',' || *c == ' ')
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn truncate(value: &str, len: usize) -> String {
    value.chars().take(len).collect()
}

/// Similarity between a local record and a provider response
///
/// Titles are cut to 90 and authors to 45 characters, abbreviated
/// containers are compared at the abbreviation length, and volume, number
/// and pages only count when both records carry them. Records of different
/// entry types never match, and an editorial without volume and number
/// scores 0.
pub fn retrieval_similarity(record: &Record, retrieved: &Record) -> f64 {
    if record.entry_type != retrieved.entry_type {
        return 0.0;
    }
    if value(record, TITLE).to_lowercase().contains("editorial")
        && !(record.has(VOLUME) && record.has(NUMBER))
    {
        return 0.0;
    }

    let mut a = record.clone();
    let mut b = retrieved.clone();

    let mut container_a = a.container_title();
    let mut container_b = b.container_title();
    for source in [record, retrieved] {
        if container_is_abbreviated(source) {
            if let Some(len) = abbreviation_length(source) {
                container_a = abbreviate(&container_a, len);
                container_b = abbreviate(&container_b, len);
            }
        }
    }

    for r in [&mut a, &mut b] {
        if let Some(title) = r.get(TITLE).map(|t| truncate(t, 90)) {
            r.set_raw(TITLE, title);
        }
        if let Some(author) = r.get(AUTHOR).map(|t| truncate(&author_for_comparison(t), 45)) {
            r.set_raw(AUTHOR, author);
        }
    }
    for key in [VOLUME, NUMBER, PAGES] {
        if !(a.has(key) && b.has(key)) {
            a.fields.remove(key);
            b.fields.remove(key);
        }
    }
    if a.get(YEAR) == Some("forthcoming") {
        if let Some(year) = b.get(YEAR).map(str::to_string) {
            a.set_raw(YEAR, year);
        }
    }
    if b.get(YEAR) == Some("forthcoming") {
        if let Some(year) = a.get(YEAR).map(str::to_string) {
            b.set_raw(YEAR, year);
        }
    }

    similarity_of(&a, &b, &container_a, &container_b).score
}
