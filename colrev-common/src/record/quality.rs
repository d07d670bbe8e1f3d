//! Masterdata quality checks

use super::fields::{self, AUTHOR, BOOKTITLE, JOURNAL, TITLE};
use super::Record;
use crate::text::{percent_upper, remove_accents};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static AUTHOR_SANITIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z, ;1]+").unwrap());
static AUTHOR_NAME_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w .'’-]*, [\w .'’-]*$").unwrap());
static SPACED_CAPITALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z] [A-Z] [A-Z] [A-Z]").unwrap());

/// Per-field findings of the quality checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    pub missing: BTreeSet<String>,
    pub inconsistent: BTreeSet<String>,
    pub incomplete: BTreeSet<String>,
    pub defects: BTreeSet<String>,
}

impl QualityReport {
    pub fn of(record: &Record) -> Self {
        Self {
            missing: missing_fields(record),
            inconsistent: inconsistent_fields(record),
            incomplete: incomplete_fields(record),
            defects: quality_defects(record),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
            && self.inconsistent.is_empty()
            && self.incomplete.is_empty()
            && self.defects.is_empty()
    }
}

/// Required fields that are absent, empty or `UNKNOWN`
///
/// Fields whose provenance carries `not_missing` are accepted as absent.
pub fn missing_fields(record: &Record) -> BTreeSet<String> {
    fields::required_fields(&record.entry_type)
        .iter()
        .filter(|k| record.known(k).is_none())
        .filter(|k| !record.masterdata_provenance.has_note(k, "not_missing"))
        .map(|k| k.to_string())
        .collect()
}

/// Fields that contradict the entry type
pub fn inconsistent_fields(record: &Record) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = fields::inconsistent_fields(&record.entry_type)
        .iter()
        .filter(|k| record.has(k))
        .map(|k| k.to_string())
        .collect();
    if fields::is_thesis(&record.entry_type)
        && record.get(AUTHOR).is_some_and(|a| a.contains(" and "))
    {
        keys.insert(AUTHOR.to_string());
    }
    keys
}

/// Truncated values
pub fn incomplete_fields(record: &Record) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for key in [TITLE, JOURNAL, BOOKTITLE, AUTHOR] {
        if let Some(value) = record.get(key) {
            if value.ends_with("...") || value.ends_with('…') {
                keys.insert(key.to_string());
            }
        }
    }
    if let Some(author) = record.get(AUTHOR) {
        if author_is_incomplete(author) {
            keys.insert(AUTHOR.to_string());
        }
    }
    keys
}

/// "and others", "et al." and trailing commas signal missing authors
pub fn author_is_incomplete(author: &str) -> bool {
    let lower = author.to_lowercase();
    lower.ends_with("and others")
        || lower.contains("et al")
        || author.contains(", and ")
        || author.trim_end().ends_with(',')
}

/// Fields whose values look implausible
pub fn quality_defects(record: &Record) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for (key, value) in &record.fields {
        if value == fields::UNKNOWN {
            continue;
        }
        if key == AUTHOR && author_has_defects(value) {
            keys.insert(key.clone());
        }
        if key == TITLE && title_has_defects(value) {
            keys.insert(key.clone());
        }
        if [TITLE, AUTHOR, JOURNAL, BOOKTITLE].contains(&key.as_str())
            && (percent_upper(value) > 0.8 || value.contains('�'))
        {
            keys.insert(key.clone());
        }
    }
    for (key, entry) in record.masterdata_provenance.iter() {
        if entry.notes.iter().any(|n| n.starts_with("disagreement")) {
            keys.insert(key.clone());
        }
    }
    keys
}

/// Author strings that are not a list of `Last, First` names
pub fn author_has_defects(author: &str) -> bool {
    let sanitized = AUTHOR_SANITIZE.replace_all(&remove_accents(author), "").to_string();
    let names: Vec<&str> = sanitized.split(" and ").collect();
    if !names.iter().all(|n| AUTHOR_NAME_SHAPE.is_match(n)) {
        return true;
    }
    if !names
        .iter()
        .flat_map(|n| n.split(','))
        .all(|part| part.chars().any(|c| c.is_ascii_uppercase()))
    {
        return true;
    }
    SPACED_CAPITALS.is_match(author)
        || author.chars().count() < 5
        || ["�", "http", "University", "™"].iter().any(|x| author.contains(x))
}

fn title_has_defects(title: &str) -> bool {
    (!title.contains(' ')
        && (title.contains('_') || title.contains('.') || title.chars().any(|c| c.is_ascii_digit())))
        || title.contains('�')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RecordState;

    #[test]
    fn author_shapes() {
        assert!(!author_has_defects("Webster, J. and Watson, R."));
        assert!(!author_has_defects("Müller, Jörg"));
        assert!(author_has_defects("Webster J Watson R"));
        assert!(author_has_defects("Smith, john"));
        assert!(author_has_defects("I N T R O, D U C T"));
    }

    #[test]
    fn thesis_must_be_single_authored() {
        let record = Record::new("A2020", "phdthesis")
            .with_field("author", "A, B and C, D")
            .with_field("journal", "J");
        let inconsistent = inconsistent_fields(&record);
        assert!(inconsistent.contains("author"));
        assert!(inconsistent.contains("journal"));
    }

    #[test]
    fn not_missing_note_accepts_absence() {
        let mut record = Record::new("A2020", "article")
            .with_field("author", "A, B")
            .with_field("title", "T")
            .with_field("journal", "J")
            .with_field("year", "2020")
            .with_field("volume", "1")
            .with_status(RecordState::MdImported);
        assert_eq!(missing_fields(&record).into_iter().collect::<Vec<_>>(), vec!["number"]);
        record.masterdata_provenance.set("number", "manual", "not_missing");
        assert!(missing_fields(&record).is_empty());
    }

    #[test]
    fn truncated_fields_are_incomplete() {
        let record = Record::new("A2020", "article")
            .with_field("author", "Smith, J. and others")
            .with_field("title", "A very long title…");
        let incomplete = incomplete_fields(&record);
        assert!(incomplete.contains("author"));
        assert!(incomplete.contains("title"));
    }
}
