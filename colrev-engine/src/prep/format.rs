//! Homogenization endpoints
//!
//! Pure field rewrites: whitespace, braces, capitalization, page ranges,
//! DOI prefixes and legacy field names.

use super::lexicon;
use super::record_type;
use crate::clients::doi::normalize_doi;
use colrev_common::record::fields::{
    self, AUTHOR, BOOKTITLE, DOI, FULLTEXT, ISSUE, JOURNAL, LANGUAGE, NUMBER, PAGES, PUBLISHER,
    TITLE, URL, VOLUME, YEAR,
};
use colrev_common::text::{
    collapse_whitespace, format_author_field, format_if_mostly_upper, mostly_upper_words,
    unify_pages, Case,
};
use colrev_common::Record;
use once_cell::sync::Lazy;
use regex::Regex;

const SOURCE: &str = "format";

static FOUR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());
static ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}(st|nd|rd|th)\b").unwrap());
static ACRONYM_PARENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([A-Z]{3,6}\)").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").unwrap());
static NICKNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static PAGE_SHAPES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d*|\d*--\d*|[xivXIV]*--[xivXIV]*)$").unwrap());

fn strip_braces(value: &str) -> String {
    value.replace(['{', '}'], "")
}

fn set(record: &mut Record, key: &str, value: String) {
    record.update_field(key, &value, SOURCE, "");
}

/// The main homogenization endpoint
pub fn format(record: &mut Record) -> Vec<String> {
    let mut lines = Vec::new();

    let keys: Vec<String> = record.fields.keys().cloned().collect();
    for key in &keys {
        if let Some(value) = record.get(key) {
            let cleaned = collapse_whitespace(&strip_braces(value));
            if cleaned != value {
                set(record, key, cleaned);
            }
        }
    }

    if let Some(author) = record.known(AUTHOR).map(str::to_string) {
        let without_digits = FOUR_DIGITS.replace_all(&author, "").to_string();
        let needs_reformat = author.split(' ').next().is_some_and(|w| w.chars().count() == 1)
            || !author.contains(", ")
            || mostly_upper_words(&author.replace(" and ", " "));
        let formatted = if needs_reformat {
            format_author_field(&without_digits)
        } else {
            collapse_whitespace(&without_digits)
        };
        set(record, AUTHOR, formatted);
    }

    if let Some(title) = record.known(TITLE).map(str::to_string) {
        let title = title.trim_end_matches('.').to_string();
        set(record, TITLE, format_if_mostly_upper(&title, Case::Capitalize));
    }

    if let Some(booktitle) = record.known(BOOKTITLE).map(str::to_string) {
        let booktitle = format_if_mostly_upper(&booktitle, Case::Title);
        let stripped = FOUR_DIGITS.replace_all(&booktitle, "");
        let stripped = ORDINAL.replace_all(&stripped, "");
        let stripped = ACRONYM_PARENS.replace_all(&stripped, "");
        let stripped = stripped
            .replace("Proceedings of the", "")
            .replace("Proceedings", "");
        let stripped = collapse_whitespace(&stripped);
        let stripped = lexicon::canonical_conference(&stripped)
            .map(str::to_string)
            .unwrap_or(stripped);
        if !stripped.is_empty() {
            set(record, BOOKTITLE, stripped);
        }
    }

    if !record.has(YEAR) {
        if let Some(year) = record
            .get("date")
            .and_then(|d| FOUR_DIGITS.find(d))
            .map(|m| m.as_str().to_string())
        {
            set(record, YEAR, year);
        }
    }

    if let Some(journal) = record.known(JOURNAL).map(str::to_string) {
        let journal = if journal.chars().count() > 10 {
            format_if_mostly_upper(&journal, Case::Title)
        } else {
            journal
        };
        let journal = lexicon::canonical_journal(&journal)
            .map(str::to_string)
            .unwrap_or(journal);
        set(record, JOURNAL, journal);
    }

    if let Some(pages) = record.known(PAGES).map(str::to_string) {
        if pages == "N.PAG" || pages == "n/a" {
            record.remove_field(PAGES);
        } else {
            let unified = unify_pages(&pages);
            if !PAGE_SHAPES.is_match(&unified) {
                lines.push(format!("Unusual pages: {}", unified));
            }
            set(record, PAGES, unified);
        }
    }

    if let Some(language) = record.get(LANGUAGE).map(str::to_string) {
        record.set_raw(LANGUAGE, super::exclusions::normalize_language_code(&language));
    }

    if let Some(doi) = record.get(DOI).map(str::to_string) {
        set(record, DOI, normalize_doi(&doi));
    }

    if !record.has(NUMBER) && record.has(ISSUE) {
        record.rename_field(ISSUE, NUMBER);
    }

    if let Some(volume) = record.known(VOLUME).map(str::to_string) {
        set(record, VOLUME, volume.replace("Volume ", ""));
    }

    if record.get(URL).is_some() && record.get(URL) == record.get(FULLTEXT) {
        record.remove_field(FULLTEXT);
    }

    if let Some(howpublished) = record.get("howpublished").map(str::to_string) {
        if !record.has(URL) && howpublished.contains("url") {
            let url = howpublished.replace("\\url{", "").trim_end_matches('}').to_string();
            record.remove_field("howpublished");
            record.set_raw(URL, url);
        }
    }
    if record.entry_type == "webpage" || (record.entry_type == "misc" && record.has(URL)) {
        record.entry_type = "online".to_string();
    }
    record_type::reclassify_by_container(record, &mut lines);
    lines
}

/// Whitespace and HTML remnants in the main text fields
pub fn format_minor(record: &mut Record) {
    for key in [AUTHOR, TITLE, JOURNAL] {
        if let Some(value) = record.get(key) {
            let cleaned = collapse_whitespace(&HTML_TAG.replace_all(value, ""));
            record.set_raw(key, cleaned);
        }
    }
    for key in [VOLUME, NUMBER] {
        if record.get(key) == Some("ahead-of-print") {
            record.remove_field(key);
        }
    }
}

/// Nicknames in parentheses ("Smith, Robert (Bob)")
pub fn remove_nicknames(record: &mut Record) {
    if let Some(author) = record.get(AUTHOR) {
        let cleaned = collapse_whitespace(&NICKNAME.replace_all(author, ""));
        record.set_raw(AUTHOR, cleaned);
    }
}

/// Fields kept regardless of the project's `fields_to_keep`
const DEFAULT_FIELDS_TO_KEEP: &[&str] = &[
    AUTHOR, TITLE, YEAR, JOURNAL, BOOKTITLE, VOLUME, NUMBER, PAGES, DOI, URL, FULLTEXT,
    "abstract", "isbn", "issn", "editor", "publisher", "school", "institution", "series",
    "chapter", "address", "edition", "type", "keywords", LANGUAGE, "file", "note",
    fields::DBLP_KEY, fields::SEMANTIC_SCHOLAR_ID, fields::PRESCREEN_EXCLUSION,
    fields::SCREENING_CRITERIA, fields::MANUAL_DUPLICATE, fields::MANUAL_NON_DUPLICATE,
    fields::CROSSMARK, "crossref", "cited_by", "link",
];

/// Drop fields outside the kept set and empty placeholders
pub fn drop_fields(record: &mut Record, fields_to_keep: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let keys: Vec<String> = record.fields.keys().cloned().collect();
    for key in keys {
        let keep = DEFAULT_FIELDS_TO_KEEP.contains(&key.as_str()) || fields_to_keep.contains(&key);
        if !keep {
            record.remove_field(&key);
            lines.push(format!("Dropped {} field", key));
        } else if matches!(record.get(&key), Some("") | Some("NA")) {
            record.remove_field(&key);
        }
    }
    if record.get(PUBLISHER) == Some("researchgate.net") {
        record.remove_field(PUBLISHER);
    }
    lines
}

/// Journal and booktitle naming the same outlet
pub fn remove_redundant_fields(record: &mut Record) {
    let (Some(journal), Some(booktitle)) = (record.get(JOURNAL), record.get(BOOKTITLE)) else {
        return;
    };
    let same = colrev_common::text::partial_ratio(&journal.to_lowercase(), &booktitle.to_lowercase()) > 0.9;
    if !same {
        return;
    }
    match record.entry_type.as_str() {
        "article" => {
            record.remove_field(BOOKTITLE);
        }
        "inproceedings" => {
            record.remove_field(JOURNAL);
        }
        _ => {}
    }
}

/// Curated records imported unchanged are prepared already
pub fn prep_curated(record: &mut Record) {
    if record.is_curated() && record.status == colrev_common::RecordState::MdImported {
        record.set_status(colrev_common::RecordState::MdPrepared);
    }
}

/// Fill missing fields from the record named in `crossref`
pub fn resolve_crossrefs(record: &mut Record, records: &crate::dataset::Records) {
    let Some(target) = record.get("crossref").map(str::to_string) else {
        return;
    };
    if let Some(parent) = records.get(&target) {
        for (key, value) in &parent.fields {
            if !record.has(key) {
                record.update_field(key, value, &format!("crossref:{}", target), "");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn homogenizes_fields() {
        let mut record = Record::new("A", "article")
            .with_field("author", "WEBSTER, JANE  and WATSON, RICHARD T.")
            .with_field("title", "ANALYZING THE PAST TO PREPARE FOR THE FUTURE.")
            .with_field("journal", "MISQ")
            .with_field("issue", "2")
            .with_field("pages", "13-23")
            .with_field("doi", "http://dx.doi.org/10.2307/4132319");
        format(&mut record);

        assert_eq!(record.get("title"), Some("Analyzing the past to prepare for the future"));
        assert_eq!(record.get("journal"), Some("MIS Quarterly"));
        assert_eq!(record.get("number"), Some("2"));
        assert!(!record.has("issue"));
        assert_eq!(record.get("pages"), Some("13--23"));
        assert_eq!(record.get("doi"), Some("10.2307/4132319"));
        assert!(record.masterdata_provenance.contains("journal"));
    }

    #[test]
    fn booktitle_loses_years_and_ordinals() {
        let mut record = Record::new("A", "inproceedings")
            .with_field("booktitle", "Proceedings of the 40th International Conference on Information Systems 2019");
        format(&mut record);
        assert_eq!(
            record.get("booktitle"),
            Some("International Conference on Information Systems")
        );
    }

    #[test]
    fn drops_unknown_fields() {
        let mut record = Record::new("A", "article")
            .with_field("title", "x")
            .with_field("unique-id", "ISI:000")
            .with_field("note", "NA");
        let lines = drop_fields(&mut record, &[]);
        assert!(!record.has("unique-id"));
        assert!(!record.has("note"));
        assert_eq!(lines, vec!["Dropped unique-id field".to_string()]);
    }

    #[test]
    fn nicknames() {
        let mut record = Record::new("A", "article").with_field("author", "Smith, Robert (Bob) and Lee, K.");
        remove_nicknames(&mut record);
        assert_eq!(record.get("author"), Some("Smith, Robert and Lee, K."));
    }
}
