//! Status aggregation
//!
//! Folds per-record state summaries into the frequency tables written to
//! `status.toml` and embedded in every commit message.

use crate::record::fields;
use crate::state::{self, ProcessType, RecordState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What the aggregator needs to know about one record
///
/// Built from the record header stream; `screening_criteria` is only
/// available when the full record was parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub id: String,
    pub status: RecordState,
    pub origin: Vec<String>,
    pub screening_criteria: Option<String>,
    pub curated: bool,
}

impl RecordSummary {
    pub fn of(record: &crate::Record) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            origin: record.origin.clone(),
            screening_criteria: record
                .get(fields::SCREENING_CRITERIA)
                .or_else(|| record.get(fields::EXCL_CRITERIA))
                .map(str::to_string),
            curated: record.is_curated(),
        }
    }
}

/// Number of records currently in each state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCurrently {
    pub md_retrieved: usize,
    pub md_imported: usize,
    pub md_needs_manual_preparation: usize,
    pub md_prepared: usize,
    pub md_processed: usize,
    pub rev_prescreen_excluded: usize,
    pub rev_prescreen_included: usize,
    pub pdf_needs_manual_retrieval: usize,
    pub pdf_imported: usize,
    pub pdf_not_available: usize,
    pub pdf_needs_manual_preparation: usize,
    pub pdf_prepared: usize,
    pub rev_excluded: usize,
    pub rev_included: usize,
    pub rev_synthesized: usize,
    /// Records not yet in a terminal state
    pub non_completed: usize,
    /// Exclusions per screening criterion
    pub exclusion: BTreeMap<String, usize>,
}

impl StatusCurrently {
    pub fn get(&self, state: RecordState) -> usize {
        match state {
            RecordState::MdRetrieved => self.md_retrieved,
            RecordState::MdImported => self.md_imported,
            RecordState::MdNeedsManualPreparation => self.md_needs_manual_preparation,
            RecordState::MdPrepared => self.md_prepared,
            RecordState::MdProcessed => self.md_processed,
            RecordState::RevPrescreenExcluded => self.rev_prescreen_excluded,
            RecordState::RevPrescreenIncluded => self.rev_prescreen_included,
            RecordState::PdfNeedsManualRetrieval => self.pdf_needs_manual_retrieval,
            RecordState::PdfImported => self.pdf_imported,
            RecordState::PdfNotAvailable => self.pdf_not_available,
            RecordState::PdfNeedsManualPreparation => self.pdf_needs_manual_preparation,
            RecordState::PdfPrepared => self.pdf_prepared,
            RecordState::RevExcluded => self.rev_excluded,
            RecordState::RevIncluded => self.rev_included,
            RecordState::RevSynthesized => self.rev_synthesized,
        }
    }

    fn slot(&mut self, state: RecordState) -> &mut usize {
        match state {
            RecordState::MdRetrieved => &mut self.md_retrieved,
            RecordState::MdImported => &mut self.md_imported,
            RecordState::MdNeedsManualPreparation => &mut self.md_needs_manual_preparation,
            RecordState::MdPrepared => &mut self.md_prepared,
            RecordState::MdProcessed => &mut self.md_processed,
            RecordState::RevPrescreenExcluded => &mut self.rev_prescreen_excluded,
            RecordState::RevPrescreenIncluded => &mut self.rev_prescreen_included,
            RecordState::PdfNeedsManualRetrieval => &mut self.pdf_needs_manual_retrieval,
            RecordState::PdfImported => &mut self.pdf_imported,
            RecordState::PdfNotAvailable => &mut self.pdf_not_available,
            RecordState::PdfNeedsManualPreparation => &mut self.pdf_needs_manual_preparation,
            RecordState::PdfPrepared => &mut self.pdf_prepared,
            RecordState::RevExcluded => &mut self.rev_excluded,
            RecordState::RevIncluded => &mut self.rev_included,
            RecordState::RevSynthesized => &mut self.rev_synthesized,
        }
    }
}

/// Number of records that reached (or passed) each stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOverall {
    pub md_retrieved: usize,
    pub md_imported: usize,
    pub md_prepared: usize,
    pub md_processed: usize,
    pub rev_prescreen: usize,
    pub rev_prescreen_excluded: usize,
    pub rev_prescreen_included: usize,
    pub pdf_imported: usize,
    pub pdf_not_available: usize,
    pub pdf_prepared: usize,
    pub rev_screen: usize,
    pub rev_excluded: usize,
    pub rev_included: usize,
    pub rev_synthesized: usize,
}

/// Status statistics of a repository (`status.toml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusStats {
    pub currently: StatusCurrently,
    pub overall: StatusOverall,
    pub duplicates_removed: usize,
    pub nr_origins: usize,
    pub nr_curated_records: usize,
    pub perc_curated: usize,
    /// Origins whose record is not in a terminal state
    pub nr_incomplete: usize,
    pub completeness_condition: bool,
    pub atomic_steps: usize,
    pub completed_atomic_steps: usize,
}

/// Operations a record in each state still has to pass
fn completed_steps(state: RecordState) -> usize {
    match state {
        RecordState::MdRetrieved => 1,
        RecordState::MdImported | RecordState::MdNeedsManualPreparation => 2,
        RecordState::MdPrepared => 3,
        RecordState::MdProcessed => 4,
        RecordState::RevPrescreenIncluded
        | RecordState::RevPrescreenExcluded
        | RecordState::PdfNeedsManualRetrieval => 5,
        RecordState::PdfImported | RecordState::PdfNeedsManualPreparation => 6,
        RecordState::PdfNotAvailable | RecordState::PdfPrepared => 7,
        RecordState::RevExcluded | RecordState::RevIncluded => 8,
        RecordState::RevSynthesized => 9,
    }
}

/// States equal to or reachable from `state`
fn at_or_after(state: RecordState) -> BTreeSet<RecordState> {
    RecordState::ALL
        .into_iter()
        .filter(|s| *s == state || state::preceding_states(*s).contains(&state))
        .collect()
}

impl StatusStats {
    /// Aggregate the record summaries
    ///
    /// `retrieved_in_sources` is the number of records in the search source
    /// files (imported or not), `criteria` the configured screening criteria.
    pub fn compute(
        records: &[RecordSummary],
        retrieved_in_sources: usize,
        criteria: &[String],
        curated_repo: bool,
    ) -> Self {
        let mut currently = StatusCurrently::default();
        for record in records {
            *currently.slot(record.status) += 1;
        }
        currently.non_completed = records.iter().filter(|r| !r.status.is_terminal()).count();
        currently.exclusion = exclusion_histogram(records, criteria);

        let cumulative = |state: RecordState| {
            let later = at_or_after(state);
            records.iter().filter(|r| later.contains(&r.status)).count()
        };

        let origins: Vec<(&String, RecordState)> = records
            .iter()
            .flat_map(|r| r.origin.iter().map(move |o| (o, r.status)))
            .collect();
        let nr_origins = origins.len();
        let duplicates_removed = records
            .iter()
            .map(|r| r.origin.len().saturating_sub(1))
            .sum::<usize>();

        let md_retrieved = retrieved_in_sources.max(nr_origins);
        currently.md_retrieved = md_retrieved - nr_origins;

        let overall = StatusOverall {
            md_retrieved,
            md_imported: records.len(),
            md_prepared: cumulative(RecordState::MdPrepared) + duplicates_removed,
            md_processed: cumulative(RecordState::MdProcessed),
            rev_prescreen: cumulative(RecordState::MdProcessed),
            rev_prescreen_excluded: currently.rev_prescreen_excluded,
            rev_prescreen_included: cumulative(RecordState::RevPrescreenIncluded),
            pdf_imported: cumulative(RecordState::PdfImported),
            pdf_not_available: currently.pdf_not_available,
            pdf_prepared: cumulative(RecordState::PdfPrepared),
            rev_screen: cumulative(RecordState::PdfPrepared),
            rev_excluded: currently.rev_excluded,
            rev_included: cumulative(RecordState::RevIncluded),
            rev_synthesized: cumulative(RecordState::RevSynthesized),
        };

        let nr_incomplete = origins.iter().filter(|(_, s)| !s.is_terminal()).count();

        let mut nr_curated_records = records.iter().filter(|r| r.curated).count();
        if curated_repo {
            nr_curated_records = overall.md_processed;
        }
        let denominator = overall.md_processed
            + currently.md_prepared
            + currently.md_needs_manual_preparation
            + currently.md_imported;
        let perc_curated = if denominator > 0 {
            nr_curated_records * 100 / denominator
        } else {
            0
        };

        let completed_atomic_steps = records
            .iter()
            .map(|r| completed_steps(r.status))
            .sum::<usize>()
            + 4 * duplicates_removed
            + currently.md_retrieved;
        let atomic_steps = (9 * overall.md_retrieved).saturating_sub(
            5 * duplicates_removed
                + 4 * currently.rev_prescreen_excluded
                + 3 * currently.pdf_not_available
                + currently.rev_excluded,
        );

        Self {
            completeness_condition: nr_incomplete == 0 && currently.md_retrieved == 0,
            currently,
            overall,
            duplicates_removed,
            nr_origins,
            nr_curated_records,
            perc_curated,
            nr_incomplete,
            atomic_steps,
            completed_atomic_steps,
        }
    }

    /// Operations that should run next, earliest pipeline stage first
    pub fn next_operations(&self) -> Vec<ProcessType> {
        if self.currently.md_retrieved > 0 {
            return vec![ProcessType::Load];
        }
        let present: BTreeSet<RecordState> = RecordState::ALL
            .into_iter()
            .filter(|s| self.currently.get(*s) > 0)
            .collect();
        next_operations_for(&present)
    }

    /// Human-readable status report
    pub fn report(&self) -> String {
        self.to_string()
    }
}

/// Processes that advance the earliest states present in the repository
pub fn next_operations_for(present: &BTreeSet<RecordState>) -> Vec<ProcessType> {
    let earliest: BTreeSet<RecordState> = present
        .iter()
        .copied()
        .filter(|s| {
            let preceding = state::preceding_states(*s);
            !present.iter().any(|p| preceding.contains(p))
        })
        .collect();
    let mut operations = Vec::new();
    for transition in state::TRANSITIONS {
        if earliest.contains(&transition.source) && !operations.contains(&transition.trigger) {
            operations.push(transition.trigger);
        }
    }
    operations
}

fn exclusion_histogram(records: &[RecordSummary], criteria: &[String]) -> BTreeMap<String, usize> {
    let mut histogram: BTreeMap<String, usize> =
        criteria.iter().map(|c| (c.clone(), 0)).collect();
    for record in records {
        let Some(value) = record.screening_criteria.as_deref() else {
            continue;
        };
        if value.is_empty() || value == "NA" {
            continue;
        }
        for item in value.split(';') {
            match item.trim().split_once('=') {
                Some((name, "out")) => *histogram.entry(name.trim().to_string()).or_insert(0) += 1,
                Some(_) => {}
                None => tracing::debug!(id = %record.id, item, "Malformed screening criterion"),
            }
        }
    }
    histogram
}

impl fmt::Display for StatusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.currently;
        let o = &self.overall;
        let line = |f: &mut fmt::Formatter<'_>, label: &str, count: usize, note: String| {
            if note.is_empty() {
                writeln!(f, "    {:<22}{:>6}", label, count)
            } else {
                writeln!(f, "    {:<22}{:>6}    {}", label, count, note)
            }
        };
        let pending = |items: &[(usize, &str)]| {
            items
                .iter()
                .filter(|(n, _)| *n > 0)
                .map(|(n, what)| format!("{} {}", n, what))
                .collect::<Vec<_>>()
                .join(", ")
        };

        writeln!(f, "Status")?;
        line(f, "metadata retrieved", o.md_retrieved, pending(&[(c.md_retrieved, "to load")]))?;
        line(
            f,
            "metadata prepared",
            o.md_prepared,
            pending(&[
                (c.md_imported, "to prepare"),
                (c.md_needs_manual_preparation, "to prepare manually"),
            ]),
        )?;
        line(
            f,
            "metadata processed",
            o.md_processed,
            pending(&[
                (c.md_prepared, "to deduplicate"),
                (self.duplicates_removed, "duplicates removed"),
            ]),
        )?;
        line(
            f,
            "prescreen included",
            o.rev_prescreen_included,
            pending(&[(c.md_processed, "to prescreen"), (c.rev_prescreen_excluded, "excluded")]),
        )?;
        line(
            f,
            "pdfs imported",
            o.pdf_imported,
            pending(&[
                (c.rev_prescreen_included, "to retrieve"),
                (c.pdf_needs_manual_retrieval, "to retrieve manually"),
                (c.pdf_not_available, "not available"),
            ]),
        )?;
        line(
            f,
            "pdfs prepared",
            o.pdf_prepared,
            pending(&[
                (c.pdf_imported, "to prepare"),
                (c.pdf_needs_manual_preparation, "to prepare manually"),
            ]),
        )?;
        line(
            f,
            "screen included",
            o.rev_included,
            pending(&[(c.pdf_prepared, "to screen"), (c.rev_excluded, "excluded")]),
        )?;
        line(f, "synthesized", o.rev_synthesized, pending(&[(c.rev_included, "to synthesize")]))?;
        if c.exclusion.values().any(|n| *n > 0) {
            writeln!(f, "  Exclusion criteria")?;
            for (criterion, count) in &c.exclusion {
                writeln!(f, "    {:<22}{:>6}", criterion, count)?;
            }
        }
        if self.completeness_condition {
            writeln!(f, "  Review iteration completed")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(id: &str, status: RecordState, origins: &[&str]) -> RecordSummary {
        RecordSummary {
            id: id.to_string(),
            status,
            origin: origins.iter().map(|o| o.to_string()).collect(),
            screening_criteria: None,
            curated: false,
        }
    }

    #[test]
    fn empty_repository_is_complete() {
        let stats = StatusStats::compute(&[], 0, &[], false);
        assert!(stats.completeness_condition);
        assert_eq!(stats.atomic_steps, 0);
        assert!(stats.next_operations().is_empty());
    }

    #[test]
    fn unloaded_records_are_counted_as_retrieved() {
        let records = vec![summary("A", RecordState::MdImported, &["s.bib/1"])];
        let stats = StatusStats::compute(&records, 3, &[], false);
        assert_eq!(stats.overall.md_retrieved, 3);
        assert_eq!(stats.currently.md_retrieved, 2);
        assert!(!stats.completeness_condition);
        assert_eq!(stats.next_operations(), vec![ProcessType::Load]);
    }

    #[test]
    fn cumulative_counts_follow_the_state_order() {
        let records = vec![
            summary("A", RecordState::MdProcessed, &["s.bib/1", "t.bib/4"]),
            summary("B", RecordState::RevIncluded, &["s.bib/2"]),
            summary("C", RecordState::RevPrescreenExcluded, &["s.bib/3"]),
            summary("D", RecordState::MdNeedsManualPreparation, &["t.bib/5"]),
        ];
        let stats = StatusStats::compute(&records, 5, &[], false);
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(stats.overall.md_imported, 4);
        assert_eq!(stats.overall.md_prepared, 4);
        assert_eq!(stats.overall.md_processed, 3);
        assert_eq!(stats.overall.rev_prescreen_included, 1);
        assert_eq!(stats.overall.rev_included, 1);
        assert_eq!(stats.currently.non_completed, 3);
        assert!(!stats.completeness_condition);
        assert_eq!(stats.next_operations(), vec![ProcessType::PrepMan]);
    }

    #[test]
    fn removed_duplicates_count_as_prepared() {
        let records = vec![
            summary("A", RecordState::MdProcessed, &["s.bib/1", "t.bib/4"]),
            summary("B", RecordState::MdProcessed, &["s.bib/2"]),
        ];
        let stats = StatusStats::compute(&records, 3, &[], false);
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(stats.overall.md_prepared, 3);
        assert_eq!(stats.overall.md_processed, 2);
    }

    #[test]
    fn terminal_states_complete_the_review() {
        let records = vec![
            summary("A", RecordState::RevSynthesized, &["s.bib/1"]),
            summary("B", RecordState::PdfNotAvailable, &["s.bib/2"]),
            summary("C", RecordState::RevExcluded, &["s.bib/3"]),
        ];
        let stats = StatusStats::compute(&records, 3, &[], false);
        assert!(stats.completeness_condition);
        assert!(stats.report().contains("Review iteration completed"));
    }

    #[test]
    fn exclusion_histogram_counts_out_decisions() {
        let mut a = summary("A", RecordState::RevExcluded, &["s.bib/1"]);
        a.screening_criteria = Some("scope=out;method=in".to_string());
        let mut b = summary("B", RecordState::RevExcluded, &["s.bib/2"]);
        b.screening_criteria = Some("scope=out;method=out".to_string());
        let c = summary("C", RecordState::RevIncluded, &["s.bib/3"]);
        let criteria = vec!["scope".to_string(), "method".to_string(), "venue".to_string()];
        let stats = StatusStats::compute(&[a, b, c], 3, &criteria, false);
        assert_eq!(stats.currently.exclusion.get("scope"), Some(&2));
        assert_eq!(stats.currently.exclusion.get("method"), Some(&1));
        assert_eq!(stats.currently.exclusion.get("venue"), Some(&0));
    }

    #[test]
    fn status_toml_round_trip() {
        let records = vec![summary("A", RecordState::MdPrepared, &["s.bib/1"])];
        let stats = StatusStats::compute(&records, 1, &[], false);
        let text = toml::to_string(&stats).unwrap();
        let parsed: StatusStats = toml::from_str(&text).unwrap();
        assert_eq!(parsed, stats);
    }
}
