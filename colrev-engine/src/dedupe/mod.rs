//! Deduplication engine
//!
//! Identifies records referring to the same work and merges them.
//!
//! # Architecture
//! - **Variants** (`dedupe.scripts`): simple (queue with two thresholds),
//!   active learning (trained pair classifier plus clustering) and curation
//!   (within table-of-contents groups). Each variant only produces
//!   [`Decision`]s.
//! - **Merge application**: [`apply_merges`] is shared by all variants. It
//!   follows merge chains, keeps propagated and curated IDs, refuses
//!   cross-level and (by default) same-source merges, fuses the records and
//!   moves the survivors to `md_processed`.
//! - **Manual decisions**: `manual_duplicate` / `manual_non_duplicate` fields
//!   carry user verdicts between runs.

pub mod active_learning;
pub mod curation;
pub mod fix_errors;
pub mod labeler;
pub mod simple;

use crate::commit::CommitRequest;
use crate::dataset::{ids, Records};
use crate::report::ReportLog;
use crate::review_manager::ReviewManager;
use colrev_common::paths::{DEDUPE_DIR, RECORDS_FILE};
use colrev_common::record::fields::{MANUAL_DUPLICATE, MANUAL_NON_DUPLICATE};
use colrev_common::record::merge;
use colrev_common::settings::{DedupeScript, SameSourceMerges};
use colrev_common::{ProcessType, Record, RecordState, Result};
use labeler::{ColrevIdLabeler, PairLabeler};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

/// Verdict of a deduplication variant
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NoDuplicate {
        id: String,
    },
    Duplicate {
        id1: String,
        id2: String,
        score: Option<f64>,
    },
    /// Needs confirmation; the record stays in `md_prepared`
    PotentialDuplicate {
        id1: String,
        id2: String,
        score: f64,
    },
}

/// A verdict given by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualDecision {
    pub id1: String,
    pub id2: String,
    pub duplicate: bool,
}

/// What merge application did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeSummary {
    /// `(surviving ID, removed ID)`
    pub merged: Vec<(String, String)>,
    /// `(ID1, ID2, reason)`
    pub skipped: Vec<(String, String, String)>,
    /// Records advanced to `md_processed` as non-duplicates
    pub processed: usize,
}

/// IDs listed in a `;`-separated decision field
pub fn listed_ids(record: &Record, key: &str) -> Vec<String> {
    record
        .get(key)
        .map(|v| {
            v.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn add_listed_id(record: &mut Record, key: &str, id: &str) {
    let mut ids = listed_ids(record, key);
    if !ids.iter().any(|i| i == id) {
        ids.push(id.to_string());
        ids.sort();
        record.set_raw(key, ids.join(";"));
    }
}

/// Whether the user declared the records distinct
pub fn marked_distinct(a: &Record, b: &Record) -> bool {
    listed_ids(a, MANUAL_NON_DUPLICATE).contains(&b.id)
        || listed_ids(b, MANUAL_NON_DUPLICATE).contains(&a.id)
}

// ============================================================================
// Merge application
// ============================================================================

/// Choose `(surviving, merged)` IDs for a duplicate pair
///
/// Propagated IDs survive; two propagated IDs cannot be merged. Then curated
/// masterdata, records processed earlier and IDs without a letter suffix win.
/// Otherwise the first record survives.
fn select_primary(
    a: &Record,
    b: &Record,
    propagated: &HashSet<String>,
) -> std::result::Result<(String, String), String> {
    let keep_a = Ok((a.id.clone(), b.id.clone()));
    let keep_b = Ok((b.id.clone(), a.id.clone()));
    match (propagated.contains(&a.id), propagated.contains(&b.id)) {
        (true, true) => return Err("both IDs propagated".to_string()),
        (true, false) => return keep_a,
        (false, true) => return keep_b,
        _ => {}
    }
    match (a.is_curated(), b.is_curated()) {
        (true, false) => return keep_a,
        (false, true) => return keep_b,
        _ => {}
    }
    if a.status != b.status {
        if a.status == RecordState::MdPrepared {
            return keep_b;
        }
        if b.status == RecordState::MdPrepared {
            return keep_a;
        }
    }
    match (ids::has_letter_suffix(&a.id), ids::has_letter_suffix(&b.id)) {
        (true, false) => keep_b,
        _ => keep_a,
    }
}

fn resolve<'a>(moved: &'a HashMap<String, String>, mut id: &'a str) -> &'a str {
    while let Some(next) = moved.get(id) {
        id = next;
    }
    id
}

/// Settings consulted while merging
#[derive(Debug, Clone)]
pub struct MergeRules<'a> {
    pub propagated: &'a HashSet<String>,
    pub same_source_merges: SameSourceMerges,
}

/// Apply the decisions of a deduplication variant
///
/// # Arguments
/// * `records` - All records; merged records are removed
/// * `decisions` - Verdicts in application order
/// * `rules` - Propagated IDs and the same-source policy
/// * `report` - Receives one line per merge and per skipped pair
pub fn apply_merges(
    records: &mut Records,
    decisions: &[Decision],
    rules: &MergeRules<'_>,
    report: &mut ReportLog,
) -> MergeSummary {
    let mut summary = MergeSummary::default();
    let mut moved: HashMap<String, String> = HashMap::new();

    for decision in decisions {
        match decision {
            Decision::NoDuplicate { id } => {
                if let Some(record) = records.get_mut(id) {
                    if record.status == RecordState::MdPrepared {
                        record.set_status(RecordState::MdProcessed);
                        summary.processed += 1;
                    }
                }
            }
            Decision::PotentialDuplicate { id1, id2, score } => {
                report.record(id1, format!("Potential duplicate of {} ({:.3})", id2, score));
            }
            Decision::Duplicate { id1, id2, score } => {
                let a = resolve(&moved, id1).to_string();
                let b = resolve(&moved, id2).to_string();
                if a == b {
                    continue;
                }
                let (Some(rec_a), Some(rec_b)) = (records.get(&a), records.get(&b)) else {
                    warn!(id1 = %a, id2 = %b, "Duplicate pair refers to unknown records");
                    continue;
                };

                let (main_id, dupe_id) = match select_primary(rec_a, rec_b, rules.propagated) {
                    Ok(pair) => pair,
                    Err(reason) => {
                        error!(id1 = %a, id2 = %b, "Cannot merge: {}", reason);
                        summary.skipped.push((a, b, reason));
                        continue;
                    }
                };
                let (main, dupe) = (&records[&main_id], &records[&dupe_id]);

                if main.entry_type == "proceedings" || dupe.entry_type == "proceedings" {
                    debug!(main = %main_id, dupe = %dupe_id, "Skipping cross-level merge");
                    summary.skipped.push((main_id, dupe_id, "cross-level merge".to_string()));
                    continue;
                }

                let main_sources: HashSet<&str> = main.origin_sources().into_iter().collect();
                let same_source = dupe
                    .origin_sources()
                    .iter()
                    .any(|s| main_sources.contains(s));
                if same_source {
                    match rules.same_source_merges {
                        SameSourceMerges::Prevent => {
                            warn!(main = %main_id, dupe = %dupe_id, "Prevented same-source merge");
                            report.general(format!(
                                "Prevented same-source merge: ({},{})",
                                main_id, dupe_id
                            ));
                            summary.skipped.push((main_id, dupe_id, "same source".to_string()));
                            continue;
                        }
                        SameSourceMerges::Warn => {
                            warn!(main = %main_id, dupe = %dupe_id, "Applying same-source merge");
                        }
                        SameSourceMerges::Apply => {}
                    }
                }

                let dupe = dupe.clone();
                let Some(main) = records.get_mut(&main_id) else { continue };
                if let Err(e) = merge(main, &dupe, "merged") {
                    warn!(main = %main_id, dupe = %dupe_id, error = %e, "Merge refused");
                    summary.skipped.push((main_id, dupe_id, e.to_string()));
                    continue;
                }
                if main.status.ordinal() < RecordState::MdProcessed.ordinal() {
                    main.set_status(RecordState::MdProcessed);
                }
                records.shift_remove(&dupe_id);

                let confidence = score
                    .map(|s| format!(" (confidence: {:.3})", s))
                    .unwrap_or_default();
                report.record(&main_id, format!("Merged with {}{}", dupe_id, confidence));
                debug!(main = %main_id, dupe = %dupe_id, "Removed duplicate");
                moved.insert(dupe_id.clone(), main_id.clone());
                summary.merged.push((main_id, dupe_id));
            }
        }
    }
    summary
}

/// Advance remaining `md_prepared` records to `md_processed`
///
/// Records with an unresolved potential duplicate stay behind.
pub fn complete_non_duplicates(records: &mut Records, decisions: &[Decision]) -> usize {
    let pending: HashSet<&str> = decisions
        .iter()
        .filter_map(|d| match d {
            Decision::PotentialDuplicate { id1, id2, .. } => Some([id1.as_str(), id2.as_str()]),
            _ => None,
        })
        .flatten()
        .collect();
    let mut processed = 0;
    for record in records.values_mut() {
        if record.status == RecordState::MdPrepared && !pending.contains(record.id.as_str()) {
            record.set_status(RecordState::MdProcessed);
            processed += 1;
        }
    }
    processed
}

// ============================================================================
// Manual decisions
// ============================================================================

/// Apply user verdicts
///
/// Duplicates are merged (the survivor lists the removed ID in
/// `manual_duplicate`); non-duplicates list each other in
/// `manual_non_duplicate` so later runs do not pair them again.
pub fn apply_manual_deduplication_decisions(
    records: &mut Records,
    decisions: &[ManualDecision],
    propagated: &HashSet<String>,
    report: &mut ReportLog,
) -> MergeSummary {
    let mut summary = MergeSummary::default();
    let mut moved: HashMap<String, String> = HashMap::new();

    for decision in decisions {
        let a = resolve(&moved, &decision.id1).to_string();
        let b = resolve(&moved, &decision.id2).to_string();
        if a == b || !records.contains_key(&a) || !records.contains_key(&b) {
            continue;
        }

        if !decision.duplicate {
            for (id, other) in [(&a, &b), (&b, &a)] {
                if let Some(record) = records.get_mut(id) {
                    add_listed_id(record, MANUAL_NON_DUPLICATE, other);
                }
            }
            report.record(&a, format!("Marked as non-duplicate of {}", b));
            continue;
        }

        let (main_id, dupe_id) = match select_primary(&records[&a], &records[&b], propagated) {
            Ok(pair) => pair,
            Err(reason) => {
                error!(id1 = %a, id2 = %b, "Cannot merge: {}", reason);
                summary.skipped.push((a, b, reason));
                continue;
            }
        };
        let dupe = records[&dupe_id].clone();
        let Some(main) = records.get_mut(&main_id) else { continue };
        if let Err(e) = merge(main, &dupe, "merged") {
            warn!(main = %main_id, dupe = %dupe_id, error = %e, "Manual merge refused");
            summary.skipped.push((main_id, dupe_id, e.to_string()));
            continue;
        }
        add_listed_id(main, MANUAL_DUPLICATE, &dupe_id);
        if main.status.ordinal() < RecordState::MdProcessed.ordinal() {
            main.set_status(RecordState::MdProcessed);
        }
        records.shift_remove(&dupe_id);
        report.record(&main_id, format!("Merged with {} (manual)", dupe_id));
        moved.insert(dupe_id.clone(), main_id.clone());
        summary.merged.push((main_id, dupe_id));
    }
    summary
}

/// Verdicts the user entered in `manual_duplicate` fields
///
/// Only IDs of existing records count; after a merge the field keeps the
/// removed ID, which is ignored on later runs.
pub fn manual_decisions_from_fields(records: &Records) -> Vec<ManualDecision> {
    let mut decisions = Vec::new();
    for record in records.values() {
        for other in listed_ids(record, MANUAL_DUPLICATE) {
            if other != record.id && records.contains_key(&other) {
                decisions.push(ManualDecision {
                    id1: record.id.clone(),
                    id2: other,
                    duplicate: true,
                });
            }
        }
    }
    decisions
}

// ============================================================================
// Driver
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DedupeOptions {
    /// Apply the corrections marked in the validation spreadsheets
    pub fix_errors: bool,
    /// Only describe the settings and training data
    pub view: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupeSummary {
    pub merged: usize,
    pub non_duplicates: usize,
    pub potential_duplicates: usize,
    pub skipped: usize,
    pub commit: Option<String>,
}

/// Settings and training data counts (`dedupe -v`)
pub fn view_info(review: &ReviewManager) -> Result<String> {
    let mut out = review.settings.section_toml(ProcessType::Dedupe);
    let training = active_learning::training::TrainingData::load(&review.path)?;
    out.push_str(&format!(
        "\nTraining data: {} match, {} distinct\n",
        training.matches.len(),
        training.distinct.len()
    ));

    let records = review.load_records()?;
    let same_source: Vec<String> = records
        .values()
        .filter(|r| {
            let sources = r.origin_sources();
            sources.len() < r.origin.len()
        })
        .map(|r| format!("{} ({})", r.id, r.origin.join(";")))
        .collect();
    if !same_source.is_empty() {
        out.push_str("Records merged from the same source:\n");
        for line in same_source {
            out.push_str(&format!("  {}\n", line));
        }
    }
    Ok(out)
}

/// `colrev dedupe` with the automated labeler
pub fn run(review: &mut ReviewManager, options: DedupeOptions) -> Result<DedupeSummary> {
    run_with_labeler(review, options, &mut ColrevIdLabeler)
}

/// `colrev dedupe`
///
/// Runs each configured variant in order over the current records and
/// commits once.
pub fn run_with_labeler(
    review: &mut ReviewManager,
    options: DedupeOptions,
    labeler: &mut dyn PairLabeler,
) -> Result<DedupeSummary> {
    if options.fix_errors {
        let commit = fix_errors::run(review)?;
        return Ok(DedupeSummary {
            commit,
            ..DedupeSummary::default()
        });
    }

    review.check_precondition(ProcessType::Dedupe)?;
    let mut records = review.load_records()?;
    let propagated = review.dataset.propagated_ids()?;
    let mut summary = DedupeSummary::default();

    let manual = manual_decisions_from_fields(&records);
    if !manual.is_empty() {
        let applied =
            apply_manual_deduplication_decisions(&mut records, &manual, &propagated, &mut review.report);
        summary.merged += applied.merged.len();
    }

    let rules = MergeRules {
        propagated: &propagated,
        same_source_merges: review.settings.dedupe.same_source_merges,
    };
    let mut wrote_dedupe_files = false;

    for script in review.settings.dedupe.scripts.clone() {
        review.check_cancelled()?;
        let decisions = match &script {
            DedupeScript::SimpleDedupe {
                merging_non_dup_threshold,
                merging_dup_threshold,
            } => {
                let result = simple::decisions(
                    &records,
                    *merging_non_dup_threshold,
                    *merging_dup_threshold,
                    labeler,
                );
                info!(comparisons = result.comparisons, "Compared records in the dedupe queue");
                result.decisions
            }
            DedupeScript::ActiveLearningTraining => {
                let stats = active_learning::train(&review.path, &records, labeler)?;
                review.report.general(format!(
                    "Active learning: {} match, {} distinct labels",
                    stats.matches, stats.distinct
                ));
                wrote_dedupe_files = true;
                continue;
            }
            DedupeScript::ActiveLearningAutomated {
                merge_threshold,
                partition_threshold,
            } => {
                let outcome = active_learning::cluster(
                    &review.path,
                    &records,
                    *merge_threshold,
                    *partition_threshold,
                )?;
                wrote_dedupe_files |= outcome.exported;
                outcome.decisions
            }
            DedupeScript::CurationFullOutletDedupe { selected_source } => {
                let root = review.path.clone();
                curation::full_outlet(
                    &records,
                    &review.settings,
                    selected_source.as_deref(),
                    &|pdf_record: &Record, candidate: &Record| {
                        crate::pdf::validation::pdf_matches_record(&root, pdf_record, candidate)
                    },
                )
            }
            DedupeScript::CurationMissingDedupe { selected_source } => {
                curation::missing(&records, selected_source)
            }
        };

        let applied = apply_merges(&mut records, &decisions, &rules, &mut review.report);
        summary.merged += applied.merged.len();
        summary.skipped += applied.skipped.len();
        summary.non_duplicates += applied.processed;
        summary.potential_duplicates += decisions
            .iter()
            .filter(|d| matches!(d, Decision::PotentialDuplicate { .. }))
            .count();

        let complete = !matches!(
            script,
            DedupeScript::CurationMissingDedupe { .. } | DedupeScript::ActiveLearningTraining
        );
        if complete {
            summary.non_duplicates += complete_non_duplicates(&mut records, &decisions);
        }
    }

    info!(
        merged = summary.merged,
        non_duplicates = summary.non_duplicates,
        potential = summary.potential_duplicates,
        "Deduplication finished"
    );
    review.save_records(&records)?;
    let mut request = CommitRequest::new(ProcessType::Dedupe, "Merge duplicate records")
        .path(RECORDS_FILE);
    if wrote_dedupe_files {
        request = request.path(DEDUPE_DIR);
    }
    summary.commit = review.create_commit(request)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prepared(id: &str, source: &str) -> Record {
        Record::new(id, "article")
            .with_field("author", "Webster, J. and Watson, R.")
            .with_field(
                "title",
                "Analyzing the past to prepare for the future: Writing a literature review",
            )
            .with_field("journal", "MIS Quarterly")
            .with_field("year", "2002")
            .with_field("volume", "26")
            .with_field("number", "2")
            .with_origin(format!("{}/{}", source, id))
            .with_status(RecordState::MdPrepared)
    }

    fn records_of(list: Vec<Record>) -> Records {
        list.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    fn duplicate(id1: &str, id2: &str) -> Decision {
        Decision::Duplicate {
            id1: id1.to_string(),
            id2: id2.to_string(),
            score: Some(1.0),
        }
    }

    #[test]
    fn merge_keeps_id_without_letter_suffix() {
        let mut records = records_of(vec![
            prepared("Webster2002a", "crossref.bib"),
            prepared("WebsterWatson2002", "scopus.bib"),
        ]);
        let propagated = HashSet::new();
        let rules = MergeRules {
            propagated: &propagated,
            same_source_merges: SameSourceMerges::Prevent,
        };
        let mut report = ReportLog::new();
        let summary = apply_merges(
            &mut records,
            &[duplicate("Webster2002a", "WebsterWatson2002")],
            &rules,
            &mut report,
        );

        assert_eq!(
            summary.merged,
            vec![("WebsterWatson2002".to_string(), "Webster2002a".to_string())]
        );
        assert_eq!(records.len(), 1);
        let survivor = &records["WebsterWatson2002"];
        assert_eq!(survivor.status, RecordState::MdProcessed);
        assert_eq!(
            survivor.origin,
            vec![
                "crossref.bib/Webster2002a".to_string(),
                "scopus.bib/WebsterWatson2002".to_string()
            ]
        );
    }

    #[test]
    fn chains_follow_earlier_merges() {
        let mut records = records_of(vec![
            prepared("A2002", "a.bib"),
            prepared("B2002", "b.bib"),
            prepared("C2002", "c.bib"),
        ]);
        let propagated = HashSet::new();
        let rules = MergeRules {
            propagated: &propagated,
            same_source_merges: SameSourceMerges::Prevent,
        };
        let summary = apply_merges(
            &mut records,
            &[duplicate("A2002", "B2002"), duplicate("B2002", "C2002")],
            &rules,
            &mut ReportLog::new(),
        );
        assert_eq!(summary.merged.len(), 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records["A2002"].origin.len(), 3);
    }

    #[test]
    fn same_source_merges_are_prevented_by_default() {
        let mut records = records_of(vec![prepared("A2002", "a.bib"), prepared("B2002", "a.bib")]);
        let propagated = HashSet::new();
        let rules = MergeRules {
            propagated: &propagated,
            same_source_merges: SameSourceMerges::Prevent,
        };
        let summary =
            apply_merges(&mut records, &[duplicate("A2002", "B2002")], &rules, &mut ReportLog::new());
        assert!(summary.merged.is_empty());
        assert_eq!(records.len(), 2);

        let rules = MergeRules {
            propagated: &propagated,
            same_source_merges: SameSourceMerges::Apply,
        };
        let summary =
            apply_merges(&mut records, &[duplicate("A2002", "B2002")], &rules, &mut ReportLog::new());
        assert_eq!(summary.merged.len(), 1);
    }

    #[test]
    fn propagated_ids_survive_and_cannot_both_merge() {
        let mut records = records_of(vec![
            prepared("Webster2002", "a.bib"),
            prepared("Webster2002a", "b.bib"),
            prepared("Webster2002b", "c.bib"),
        ]);
        let propagated: HashSet<String> = ["Webster2002a".to_string(), "Webster2002b".to_string()]
            .into_iter()
            .collect();
        let rules = MergeRules {
            propagated: &propagated,
            same_source_merges: SameSourceMerges::Prevent,
        };
        let summary = apply_merges(
            &mut records,
            &[
                duplicate("Webster2002", "Webster2002a"),
                duplicate("Webster2002a", "Webster2002b"),
            ],
            &rules,
            &mut ReportLog::new(),
        );
        assert_eq!(
            summary.merged,
            vec![("Webster2002a".to_string(), "Webster2002".to_string())]
        );
        assert_eq!(summary.skipped.len(), 1);
        assert!(records.contains_key("Webster2002b"));
    }

    #[test]
    fn potential_duplicates_stay_prepared() {
        let mut records = records_of(vec![prepared("A2002", "a.bib"), prepared("B2002", "b.bib")]);
        let decisions = vec![
            Decision::NoDuplicate { id: "A2002".to_string() },
            Decision::PotentialDuplicate {
                id1: "B2002".to_string(),
                id2: "A2002".to_string(),
                score: 0.8,
            },
        ];
        let propagated = HashSet::new();
        let rules = MergeRules {
            propagated: &propagated,
            same_source_merges: SameSourceMerges::Prevent,
        };
        apply_merges(&mut records, &decisions, &rules, &mut ReportLog::new());
        complete_non_duplicates(&mut records, &decisions);
        assert_eq!(records["A2002"].status, RecordState::MdProcessed);
        assert_eq!(records["B2002"].status, RecordState::MdPrepared);
    }

    #[test]
    fn manual_non_duplicates_are_recorded_on_both_records() {
        let mut records = records_of(vec![prepared("A2002", "a.bib"), prepared("B2002", "b.bib")]);
        apply_manual_deduplication_decisions(
            &mut records,
            &[ManualDecision {
                id1: "A2002".to_string(),
                id2: "B2002".to_string(),
                duplicate: false,
            }],
            &HashSet::new(),
            &mut ReportLog::new(),
        );
        assert_eq!(records["A2002"].get("manual_non_duplicate"), Some("B2002"));
        assert_eq!(records["B2002"].get("manual_non_duplicate"), Some("A2002"));
        assert!(marked_distinct(&records["A2002"], &records["B2002"]));
    }

    #[test]
    fn manual_duplicate_fields_are_merged() {
        let mut records = records_of(vec![
            prepared("A2002", "a.bib").with_field("manual_duplicate", "B2002"),
            prepared("B2002", "a.bib"),
        ]);
        let decisions = manual_decisions_from_fields(&records);
        assert_eq!(decisions.len(), 1);
        let summary = apply_manual_deduplication_decisions(
            &mut records,
            &decisions,
            &HashSet::new(),
            &mut ReportLog::new(),
        );
        assert_eq!(summary.merged.len(), 1);
        assert_eq!(records.len(), 1);
        assert!(manual_decisions_from_fields(&records).is_empty());
    }
}
