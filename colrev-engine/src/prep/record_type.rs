//! Entry-type correction

use super::lexicon;
use colrev_common::record::fields::{
    self, ABSTRACT, BOOKTITLE, FULLTEXT, JOURNAL, SCHOOL, SERIES, URL,
};
use colrev_common::record::quality;
use colrev_common::Record;

/// Tokens that mark a container as conference proceedings
const CONFERENCE_TOKENS: [&str; 9] = [
    "conference",
    "proceedings",
    "symposium",
    "workshop",
    "congress",
    "colloquium",
    "annual meeting",
    "international conference",
    "tagung",
];

pub fn is_conference_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    CONFERENCE_TOKENS.iter().any(|t| lower.contains(t)) || lexicon::is_known_conference(name)
}

fn retype(record: &mut Record, entry_type: &str, reason: &str, lines: &mut Vec<String>) {
    if record.entry_type != entry_type {
        lines.push(format!(
            "Set from {} to {} ({})",
            record.entry_type, entry_type, reason
        ));
        record.entry_type = entry_type.to_string();
    }
}

fn move_field(record: &mut Record, from: &str, to: &str) {
    if record.has(to) {
        return;
    }
    record.rename_field(from, to);
}

/// Reclassify articles published in conference proceedings and vice versa
pub fn reclassify_by_container(record: &mut Record, lines: &mut Vec<String>) {
    match record.entry_type.as_str() {
        "article" => {
            let conference = record.get(JOURNAL).filter(|j| is_conference_name(j)).is_some();
            if conference {
                move_field(record, JOURNAL, BOOKTITLE);
                retype(record, "inproceedings", "conference name in journal field", lines);
            }
        }
        "inproceedings" => {
            let journal_only = record.has(JOURNAL)
                && !record.has(BOOKTITLE)
                && record.get(JOURNAL).is_some_and(|j| !is_conference_name(j));
            if journal_only {
                retype(record, "article", "journal without booktitle", lines);
            }
        }
        "book" | "inbook" => {
            if !record.has(BOOKTITLE) && record.has(SERIES) && record.entry_type == "inbook" {
                move_field(record, SERIES, BOOKTITLE);
            }
        }
        _ => {}
    }
}

/// Detect theses from links and abstracts
pub fn detect_thesis(record: &mut Record, lines: &mut Vec<String>) {
    if fields::is_thesis(&record.entry_type) {
        return;
    }
    let link = record
        .get(FULLTEXT)
        .or_else(|| record.get(URL))
        .unwrap_or("")
        .to_lowercase();
    if link.contains("dissertation") {
        retype(record, "phdthesis", "\"dissertation\" in fulltext link", lines);
    } else if link.contains("thesis") {
        retype(record, "phdthesis", "\"thesis\" in fulltext link", lines);
    } else if record
        .get(ABSTRACT)
        .is_some_and(|a| a.to_lowercase().contains("this thesis"))
    {
        retype(record, "phdthesis", "\"thesis\" in abstract", lines);
    }
    if record.entry_type == "phdthesis" && !record.has(SCHOOL) {
        if let Some(publisher) = record.get("publisher").map(str::to_string) {
            record.set_raw(SCHOOL, publisher);
            record.remove_field("publisher");
        }
    }
}

/// Repair records whose fields contradict the entry type
///
/// Applied to uncurated records with inconsistent fields, and only in
/// rounds below 0.9 similarity (a coarse fix is a last resort).
pub fn correct_recordtype(record: &mut Record, similarity: f64) -> Vec<String> {
    let mut lines = Vec::new();
    if record.is_curated() || quality::inconsistent_fields(record).is_empty() {
        return lines;
    }
    reclassify_by_container(record, &mut lines);
    if similarity > 0.9 {
        return lines;
    }
    detect_thesis(record, &mut lines);

    if record.entry_type == "article" && !record.has(JOURNAL) {
        if record.has(BOOKTITLE) {
            move_field(record, BOOKTITLE, JOURNAL);
        } else if record.has(SERIES) {
            move_field(record, SERIES, JOURNAL);
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_in_conference_becomes_inproceedings() {
        let mut record = Record::new("A", "article")
            .with_field("journal", "Proceedings of the International Conference on Information Systems");
        let mut lines = Vec::new();
        reclassify_by_container(&mut record, &mut lines);
        assert_eq!(record.entry_type, "inproceedings");
        assert!(record.has("booktitle"));
        assert!(!record.has("journal"));
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn thesis_from_link() {
        let mut record = Record::new("A", "article")
            .with_field("fulltext", "https://repo.example.org/dissertation/123")
            .with_field("journal", "x")
            .with_field("booktitle", "y");
        let lines = correct_recordtype(&mut record, 0.8);
        assert_eq!(record.entry_type, "phdthesis");
        assert!(!lines.is_empty());
    }

    #[test]
    fn consistent_records_are_left_alone() {
        let mut record = Record::new("A", "article").with_field("journal", "MIS Quarterly");
        assert!(correct_recordtype(&mut record, 0.8).is_empty());
        assert_eq!(record.entry_type, "article");
    }
}
