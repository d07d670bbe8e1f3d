//! Exclusion endpoints of the first preparation round
//!
//! Records outside the review's scope (non-Latin script, other languages,
//! whole proceedings volumes) go straight to `rev_prescreen_excluded`.

use crate::language;
use colrev_common::record::fields::{AUTHOR, BOOKTITLE, JOURNAL, LANGUAGE, PRESCREEN_EXCLUSION, TITLE};
use colrev_common::{Record, RecordState};

/// Titles shorter than this are too short to classify reliably
const MIN_TITLE_LENGTH: usize = 30;

pub fn prescreen_exclude(record: &mut Record, reason: &str) {
    record.set_raw(PRESCREEN_EXCLUSION, reason);
    record.status = RecordState::RevPrescreenExcluded;
}

pub fn exclude_non_latin_alphabets(record: &mut Record) -> Vec<String> {
    let text = [TITLE, AUTHOR, JOURNAL, BOOKTITLE]
        .iter()
        .filter_map(|k| record.get(k))
        .collect::<Vec<_>>()
        .join(" ");
    if language::mostly_non_latin(&text) {
        prescreen_exclude(record, "non_latin_alphabet");
        return vec!["Excluded (non-latin alphabet)".to_string()];
    }
    Vec::new()
}

/// Exclude records whose title language is not in `languages_to_include`
///
/// A `language` field wins over detection. Short titles are assumed to be
/// English; the detected language is always stored for deduplication.
pub fn exclude_languages(record: &mut Record, languages_to_include: &[String]) -> Vec<String> {
    let included = |code: &str| languages_to_include.iter().any(|l| l == code);
    let reason = format!("language of title not in [{}]", languages_to_include.join(","));

    if let Some(lang) = record.get(LANGUAGE).map(normalize_language_code) {
        record.set_raw(LANGUAGE, lang.clone());
        if !included(&lang) {
            prescreen_exclude(record, &reason);
            return vec![format!("Excluded ({})", reason)];
        }
        return Vec::new();
    }

    let title = record.get(TITLE).unwrap_or("").to_string();
    if title.chars().count() < MIN_TITLE_LENGTH {
        record.set_raw(LANGUAGE, "en");
        return Vec::new();
    }
    match language::detect(&title) {
        Some(detected) if detected.confidence > 0.5 => {
            record.set_raw(LANGUAGE, detected.code);
            if !included(detected.code) {
                prescreen_exclude(record, &reason);
                return vec![format!("Excluded ({}, detected {})", reason, detected.code)];
            }
        }
        _ => record.set_raw(LANGUAGE, "en"),
    }
    Vec::new()
}

/// Map free-text language values to ISO 639-1 codes
pub fn normalize_language_code(value: &str) -> String {
    match value.trim().to_lowercase().as_str() {
        "english" | "eng" | "en" => "en".to_string(),
        "german" | "deutsch" | "ger" | "deu" | "de" => "de".to_string(),
        "french" | "fre" | "fra" | "fr" => "fr".to_string(),
        "spanish" | "spa" | "es" => "es".to_string(),
        "portuguese" | "por" | "pt" => "pt".to_string(),
        "italian" | "ita" | "it" => "it".to_string(),
        "dutch" | "nld" | "dut" | "nl" => "nl".to_string(),
        other => other.to_string(),
    }
}

pub fn exclude_collections(record: &mut Record) -> Vec<String> {
    if record.entry_type == "proceedings" {
        prescreen_exclude(record, "collection/proceedings");
        return vec!["Excluded (collection/proceedings)".to_string()];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_titles_pass() {
        let mut record = Record::new("A", "article").with_field(
            "title",
            "Analyzing the Past to Prepare for the Future: Writing a Literature Review",
        );
        assert!(exclude_languages(&mut record, &["en".to_string()]).is_empty());
        assert_eq!(record.get("language"), Some("en"));
        assert_ne!(record.status, RecordState::RevPrescreenExcluded);
    }

    #[test]
    fn language_field_excludes() {
        let mut record = Record::new("A", "article")
            .with_field("title", "Zur Theorie")
            .with_field("language", "German");
        exclude_languages(&mut record, &["en".to_string()]);
        assert_eq!(record.status, RecordState::RevPrescreenExcluded);
        assert_eq!(record.get("language"), Some("de"));
        assert!(record.get("prescreen_exclusion").unwrap().contains("[en]"));
    }

    #[test]
    fn proceedings_are_excluded() {
        let mut record = Record::new("A", "proceedings");
        exclude_collections(&mut record);
        assert_eq!(record.status, RecordState::RevPrescreenExcluded);
    }
}
