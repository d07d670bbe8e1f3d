//! Field provenance
//!
//! On disk, provenance is a newline-separated list of `field:source;note;`
//! entries. Notes are comma-joined. In memory it is a map from field name to
//! [`ProvenanceEntry`], ordered by field name so serialization is stable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Source and notes of one field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceEntry {
    pub source: String,
    pub notes: BTreeSet<String>,
}

impl ProvenanceEntry {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            notes: BTreeSet::new(),
        }
    }

    pub fn has_note(&self, note: &str) -> bool {
        self.notes.contains(note)
    }

    /// Comma-joined notes
    pub fn note_string(&self) -> String {
        self.notes.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// Provenance of a record's fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    entries: BTreeMap<String, ProvenanceEntry>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the on-disk form
    ///
    /// Lines without a `field:source` head are skipped.
    pub fn parse(value: &str) -> Self {
        let mut provenance = Self::new();
        for line in value.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let line = line.strip_suffix(';').unwrap_or(line);
            let (key_source, note) = line.rsplit_once(';').unwrap_or((line, ""));
            let Some((key, source)) = key_source.split_once(':') else {
                tracing::warn!(entry = %line, "Skipping malformed provenance entry");
                continue;
            };
            let entry = provenance
                .entries
                .entry(key.trim().to_string())
                .or_insert_with(|| ProvenanceEntry::new(source.trim()));
            entry.notes.extend(
                note.split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
            );
        }
        provenance
    }

    /// One `field:source;note;` line per field
    pub fn to_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(key, entry)| format!("{}:{};{};", key, entry.source, entry.note_string()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&ProvenanceEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProvenanceEntry)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Set the source of a field, replacing its notes
    pub fn set(&mut self, key: &str, source: &str, note: &str) {
        let mut entry = ProvenanceEntry::new(source);
        if !note.is_empty() {
            entry.notes.insert(note.to_string());
        }
        self.entries.insert(key.to_string(), entry);
    }

    /// Add a note, creating an `ORIGINAL` entry when the field has none
    ///
    /// A `quality_defect` note is dropped when the field is already flagged
    /// as missing or in disagreement.
    pub fn add_note(&mut self, key: &str, note: &str) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| ProvenanceEntry::new(super::fields::ORIGINAL));
        if !note.is_empty() {
            entry.notes.insert(note.to_string());
        }
        if entry.notes.iter().any(|n| n == "missing" || n.starts_with("disagreement")) {
            entry.notes.remove("quality_defect");
        }
    }

    pub fn remove_note(&mut self, key: &str, note: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.notes.remove(note);
        }
    }

    /// Remove a note from every field
    pub fn remove_note_everywhere(&mut self, note: &str) {
        for entry in self.entries.values_mut() {
            entry.notes.remove(note);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<ProvenanceEntry> {
        self.entries.remove(key)
    }

    pub fn rename(&mut self, key: &str, new_key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.entries.insert(new_key.to_string(), entry);
        }
    }

    /// Whether the field carries `note`
    pub fn has_note(&self, key: &str, note: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.has_note(note))
    }

    /// Fields carrying `note`
    pub fn fields_with_note(&self, note: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.has_note(note))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// All (field, note) pairs, for hint statistics
    pub fn all_notes(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .flat_map(|(k, e)| e.notes.iter().map(move |n| (k.clone(), n.clone())))
            .collect()
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_lines().join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_and_writes_entries() {
        let raw = "author:https://api.crossref.org/works/10.1;;\n\
                   volume:ORIGINAL;missing;\n\
                   number:ORIGINAL;missing,quality_defect;";
        let provenance = Provenance::parse(raw);
        assert_eq!(provenance.len(), 3);
        assert_eq!(
            provenance.get("author").map(|e| e.source.as_str()),
            Some("https://api.crossref.org/works/10.1")
        );
        assert!(provenance.has_note("volume", "missing"));
        assert!(provenance.has_note("number", "quality_defect"));
        assert_eq!(
            provenance.to_lines(),
            vec![
                "author:https://api.crossref.org/works/10.1;;".to_string(),
                "number:ORIGINAL;missing,quality_defect;".to_string(),
                "volume:ORIGINAL;missing;".to_string(),
            ]
        );
    }

    #[test]
    fn curated_marker_has_url_source() {
        let provenance = Provenance::parse("CURATED:https://github.com/x/y;;");
        assert!(provenance.contains("CURATED"));
        assert_eq!(provenance.get("CURATED").map(|e| e.source.as_str()), Some("https://github.com/x/y"));
    }

    #[test]
    fn missing_note_suppresses_quality_defect() {
        let mut provenance = Provenance::new();
        provenance.add_note("volume", "quality_defect");
        provenance.add_note("volume", "missing");
        assert!(!provenance.has_note("volume", "quality_defect"));
        assert_eq!(provenance.get("volume").map(|e| e.source.as_str()), Some("ORIGINAL"));
    }
}
