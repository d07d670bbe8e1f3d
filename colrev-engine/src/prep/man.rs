//! Manual preparation support
//!
//! Summarizes why records need manual preparation and re-evaluates them
//! after the user edited `records.bib`.

use crate::commit::CommitRequest;
use crate::dataset::Records;
use crate::review_manager::ReviewManager;
use colrev_common::paths::RECORDS_FILE;
use colrev_common::record::fields::{self, UNKNOWN};
use colrev_common::{ProcessType, Record, RecordState, Result};
use std::collections::BTreeMap;
use tracing::info;

/// Counts of provenance hints among records needing manual preparation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepManStats {
    pub records: usize,
    /// `field:note` -> count
    pub hints: BTreeMap<String, usize>,
    /// Entry type -> count
    pub entry_types: BTreeMap<String, usize>,
}

impl PrepManStats {
    pub fn of(records: &Records) -> Self {
        let mut stats = Self::default();
        for record in records
            .values()
            .filter(|r| r.status == RecordState::MdNeedsManualPreparation)
        {
            stats.records += 1;
            *stats.entry_types.entry(record.entry_type.clone()).or_default() += 1;
            for (key, note) in record.masterdata_provenance.all_notes() {
                *stats.hints.entry(format!("{}:{}", key, note)).or_default() += 1;
            }
        }
        stats
    }

    pub fn report(&self) -> String {
        let mut out = format!("Records to prepare manually: {}\n", self.records);
        for (hint, count) in &self.hints {
            out.push_str(&format!("  {:<40} {}\n", hint, count));
        }
        for (entry_type, count) in &self.entry_types {
            out.push_str(&format!("  ENTRYTYPE {:<30} {}\n", entry_type, count));
        }
        out
    }
}

/// Re-evaluate a manually edited record
///
/// An explicit `UNKNOWN` value accepts the field as missing; the status is
/// then recomputed from the provenance hints.
pub fn reevaluate(record: &mut Record) -> RecordState {
    let unknown: Vec<String> = record
        .fields
        .iter()
        .filter(|(k, v)| fields::is_identifying(k) && v.as_str() == UNKNOWN)
        .map(|(k, _)| k.clone())
        .collect();
    for key in unknown {
        record.remove_field_not_missing(&key, "manual");
    }
    record.update_masterdata_provenance()
}

/// `colrev prep_man`
///
/// Returns the statistics before re-evaluation.
pub fn run(review: &mut ReviewManager) -> Result<PrepManStats> {
    review.check_precondition(ProcessType::PrepMan)?;
    let mut records = review.load_records()?;
    let stats = PrepManStats::of(&records);
    info!(records = stats.records, "Records needing manual preparation");

    let mut prepared = 0;
    for record in records
        .values_mut()
        .filter(|r| r.status == RecordState::MdNeedsManualPreparation)
    {
        if reevaluate(record) == RecordState::MdPrepared {
            prepared += 1;
            review.report.record(&record.id, "Prepared manually");
        }
    }
    if prepared > 0 {
        review.save_records(&records)?;
        review.create_commit(
            CommitRequest::new(ProcessType::PrepMan, "Prepare records (manual)")
                .manual()
                .path(RECORDS_FILE),
        )?;
    }
    Ok(stats)
}
