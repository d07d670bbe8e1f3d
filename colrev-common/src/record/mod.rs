//! Record model
//!
//! A [`Record`] is a bibliographic entry with typed state fields:
//! - `status`: the lifecycle state
//! - `origin`: `<source_file>/<source_id>` tokens, only ever growing
//! - `masterdata_provenance` / `data_provenance`: per-field sources and notes
//! - `colrev_id`: content identifiers derived from the identifying fields
//! - `colrev_pdf_id`: hash of the linked PDF's first page
//!
//! All remaining BibTeX fields live in an ordered map. Writes to identifying
//! fields go through [`Record::update_field`], which records provenance and
//! refuses to touch curated masterdata.

pub mod fields;
pub mod identifier;
pub mod merge;
pub mod provenance;
pub mod quality;
pub mod similarity;

pub use identifier::{create_colrev_id, toc_key};
pub use merge::merge;
pub use provenance::{Provenance, ProvenanceEntry};
pub use similarity::{change_score, retrieval_similarity, similarity};

use crate::state::RecordState;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub entry_type: String,
    pub status: RecordState,
    pub origin: Vec<String>,
    pub masterdata_provenance: Provenance,
    pub data_provenance: Provenance,
    pub colrev_id: Vec<String>,
    pub colrev_pdf_id: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(id: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_type: entry_type.into().to_lowercase(),
            status: RecordState::MdRetrieved,
            origin: Vec::new(),
            masterdata_provenance: Provenance::new(),
            data_provenance: Provenance::new(),
            colrev_id: Vec::new(),
            colrev_pdf_id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment without provenance
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_status(mut self, status: RecordState) -> Self {
        self.status = status;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin.push(origin.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Field value, treating `UNKNOWN` and empty values as absent
    pub fn known(&self, key: &str) -> Option<&str> {
        self.get(key)
            .filter(|v| !v.trim().is_empty() && *v != fields::UNKNOWN)
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Set a field without provenance bookkeeping
    pub fn set_raw(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn is_curated(&self) -> bool {
        self.masterdata_provenance.contains(fields::CURATED)
    }

    /// Update a field and record where the value came from
    ///
    /// Identifying fields of curated records are immutable except that a
    /// missing `pages` value may be filled. Returns whether the record changed.
    pub fn update_field(&mut self, key: &str, value: &str, source: &str, note: &str) -> bool {
        if self.is_curated() && fields::is_identifying(key) {
            let blocked = fields::is_curated_immutable(key) || self.has(key);
            if blocked {
                debug!(id = %self.id, field = key, "Ignoring update of curated masterdata");
                return false;
            }
        }
        if self.get(key) == Some(value) {
            return false;
        }
        self.fields.insert(key.to_string(), value.to_string());
        if fields::is_identifying(key) {
            if !self.is_curated() {
                self.masterdata_provenance.set(key, source, note);
            }
        } else {
            self.data_provenance.set(key, source, note);
        }
        true
    }

    /// Remove a field together with its provenance
    pub fn remove_field(&mut self, key: &str) -> Option<String> {
        self.masterdata_provenance.remove(key);
        self.data_provenance.remove(key);
        self.fields.remove(key)
    }

    /// Remove a field and mark it as legitimately absent
    pub fn remove_field_not_missing(&mut self, key: &str, source: &str) -> Option<String> {
        let removed = self.fields.remove(key);
        if fields::is_identifying(key) && !self.is_curated() {
            self.masterdata_provenance.set(key, source, "not_missing");
        }
        removed
    }

    pub fn rename_field(&mut self, key: &str, new_key: &str) {
        if let Some(value) = self.fields.remove(key) {
            self.fields.insert(new_key.to_string(), value);
            self.masterdata_provenance.rename(key, new_key);
            self.data_provenance.rename(key, new_key);
            if fields::is_identifying(new_key) && !self.masterdata_provenance.contains(new_key) {
                self.masterdata_provenance.set(new_key, fields::ORIGINAL, "");
            }
        }
    }

    /// Source of a field's value, defaulting to `default_source`
    pub fn field_source(&self, key: &str, default_source: &str) -> (String, String) {
        let provenance = if fields::is_identifying(key) {
            &self.masterdata_provenance
        } else {
            &self.data_provenance
        };
        match provenance.get(key) {
            Some(entry) => (entry.source.clone(), entry.note_string()),
            None => (default_source.to_string(), String::new()),
        }
    }

    /// Journal, booktitle and series concatenated
    pub fn container_title(&self) -> String {
        [fields::JOURNAL, fields::BOOKTITLE, fields::SERIES]
            .iter()
            .filter_map(|k| self.known(k))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Add origin tokens, keeping the list sorted and unique
    pub fn add_origins<'a>(&mut self, origins: impl IntoIterator<Item = &'a String>) {
        self.origin.extend(origins.into_iter().cloned());
        self.origin.sort();
        self.origin.dedup();
    }

    pub fn add_colrev_id(&mut self, colrev_id: &str) {
        if !self.colrev_id.iter().any(|c| c == colrev_id) {
            self.colrev_id.push(colrev_id.to_string());
            self.colrev_id.sort();
        }
    }

    /// Source files the record was imported from
    pub fn origin_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self
            .origin
            .iter()
            .filter_map(|o| o.rsplit_once('/').map(|(s, _)| s))
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Transition to `target`, guarding colrev_id existence at md_prepared
    ///
    /// When no colrev_id can be built from the identifying fields, the record
    /// lands in `md_needs_manual_preparation` instead. Returns the state set.
    pub fn set_status(&mut self, target: RecordState) -> RecordState {
        let target = if target == RecordState::MdPrepared {
            match create_colrev_id(self) {
                Ok(cid) => {
                    self.add_colrev_id(&cid);
                    target
                }
                Err(e) => {
                    debug!(id = %self.id, error = %e, "Cannot identify record, needs manual preparation");
                    RecordState::MdNeedsManualPreparation
                }
            }
        } else {
            target
        };
        self.status = target;
        target
    }

    /// Recompute the provenance hints and decide prepared vs. manual
    ///
    /// Notes `missing`, `inconsistent with ENTRYTYPE`, `incomplete` and
    /// `quality_defect` are attached per field. A record without any hint is
    /// moved to `md_prepared`; otherwise to `md_needs_manual_preparation`.
    pub fn update_masterdata_provenance(&mut self) -> RecordState {
        if self.is_curated() {
            return self.set_status(RecordState::MdPrepared);
        }
        let report = quality::QualityReport::of(self);
        let defects_found = !report.is_clean();

        for key in fields::IDENTIFYING_FIELDS {
            self.masterdata_provenance.remove_note(key, "missing");
            self.masterdata_provenance.remove_note(key, "inconsistent with ENTRYTYPE");
            self.masterdata_provenance.remove_note(key, "incomplete");
            self.masterdata_provenance.remove_note(key, "quality_defect");
        }
        for key in &report.missing {
            self.masterdata_provenance.add_note(key, "missing");
        }
        for key in &report.inconsistent {
            self.masterdata_provenance.add_note(key, "inconsistent with ENTRYTYPE");
        }
        for key in &report.incomplete {
            self.masterdata_provenance.add_note(key, "incomplete");
        }
        for key in &report.defects {
            self.masterdata_provenance.add_note(key, "quality_defect");
        }
        // Provenance coverage for identifying fields
        let present: Vec<String> = fields::IDENTIFYING_FIELDS
            .iter()
            .filter(|k| self.has(k) && !self.masterdata_provenance.contains(k))
            .map(|k| k.to_string())
            .collect();
        for key in present {
            self.masterdata_provenance.set(&key, fields::ORIGINAL, "");
        }

        if defects_found {
            self.set_status(RecordState::MdNeedsManualPreparation)
        } else {
            self.set_status(RecordState::MdPrepared)
        }
    }

    /// Identifying fields present without a provenance entry
    pub fn provenance_gaps(&self) -> Vec<&'static str> {
        if self.is_curated() || !self.status.is_post_md_prepared() {
            return Vec::new();
        }
        fields::IDENTIFYING_FIELDS
            .iter()
            .copied()
            .filter(|k| self.has(k) && !self.masterdata_provenance.contains(k))
            .collect()
    }

    /// One-line citation used in reports
    pub fn format_bib_style(&self) -> String {
        format!(
            "{} ({}) {}. {}",
            self.get(fields::AUTHOR).unwrap_or(""),
            self.get(fields::YEAR).unwrap_or(""),
            self.get(fields::TITLE).unwrap_or(""),
            self.container_title(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Record {
        Record::new("Webster2002", "article")
            .with_field("author", "Webster, J. and Watson, R.")
            .with_field(
                "title",
                "Analyzing the Past to Prepare for the Future: Writing a Literature Review",
            )
            .with_field("year", "2002")
            .with_field("journal", "MIS Quarterly")
            .with_origin("search/lr.bib/Webster2002")
            .with_status(RecordState::MdImported)
    }

    #[test]
    fn missing_volume_and_number_need_manual_preparation() {
        let mut record = article();
        let state = record.update_masterdata_provenance();
        assert_eq!(state, RecordState::MdNeedsManualPreparation);
        assert!(record.masterdata_provenance.has_note("volume", "missing"));
        assert!(record.masterdata_provenance.has_note("number", "missing"));
        assert!(record.colrev_id.is_empty());
    }

    #[test]
    fn complete_record_is_prepared_with_colrev_id() {
        let mut record = article().with_field("volume", "26").with_field("number", "2");
        let state = record.update_masterdata_provenance();
        assert_eq!(state, RecordState::MdPrepared);
        assert_eq!(record.colrev_id.len(), 1);
        assert!(record.provenance_gaps().is_empty());
    }

    #[test]
    fn curated_masterdata_is_immutable() {
        let mut record = article();
        record.masterdata_provenance.set("CURATED", "https://github.com/x/y", "");
        assert!(!record.update_field("title", "Other", "crossref", ""));
        assert!(record.update_field("pages", "13--23", "crossref", ""));
        assert!(!record.update_field("pages", "1--2", "crossref", ""));
        assert!(record.update_field("doi", "10.2307/4132319", "crossref", ""));
        assert!(record.data_provenance.contains("doi"));
    }

    #[test]
    fn update_records_provenance() {
        let mut record = article();
        assert!(record.update_field("volume", "26", "https://api.crossref.org", ""));
        assert_eq!(
            record.masterdata_provenance.get("volume").map(|e| e.source.as_str()),
            Some("https://api.crossref.org")
        );
        assert!(!record.update_field("volume", "26", "other", ""));
    }
}
