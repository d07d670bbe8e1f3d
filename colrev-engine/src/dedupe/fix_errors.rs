//! Corrections from the validation spreadsheets (`dedupe --fix_errors`)
//!
//! Flagged clusters of `duplicates_to_validate.xlsx` were merged wrongly and
//! are restored from the records history. Flagged clusters of
//! `non_duplicates_to_validate.xlsx` and the pairs in `dedupe/dupes.txt` are
//! merged.

use super::active_learning::export;
use super::{add_listed_id, apply_manual_deduplication_decisions, ManualDecision};
use crate::commit::CommitRequest;
use crate::dataset::Records;
use crate::review_manager::ReviewManager;
use colrev_common::paths::{
    DEDUPE_DIR, DUPES_FILE, DUPLICATES_TO_VALIDATE, NON_DUPLICATES_TO_VALIDATE, RECORDS_FILE,
};
use colrev_common::record::fields::MANUAL_NON_DUPLICATE;
use colrev_common::{ProcessType, RecordState, Result};
use std::path::Path;
use tracing::{info, warn};

fn read_flagged(path: &Path) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    export::flagged_clusters(path)
}

/// `ID1,ID2` lines of the manual merge list
pub fn read_dupes_file(path: &Path) -> Result<Vec<ManualDecision>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(std::fs::read_to_string(path)?
        .lines()
        .filter_map(|line| {
            let (a, b) = line.split_once(',')?;
            let (a, b) = (a.trim(), b.trim());
            (!a.is_empty() && !b.is_empty()).then(|| ManualDecision {
                id1: a.to_string(),
                id2: b.to_string(),
                duplicate: true,
            })
        })
        .collect())
}

/// Restore the records of a wrongly merged cluster
///
/// `history` holds committed record versions, newest first. The newest one
/// containing every ID of the cluster supplies the restored records, which
/// replace the merged survivor and are marked as non-duplicates of each
/// other. Returns `false` when no version contains the whole cluster.
pub fn unmerge(records: &mut Records, cluster: &[String], history: &[Records]) -> bool {
    let Some(version) = history
        .iter()
        .find(|v| cluster.iter().all(|id| v.contains_key(id)))
    else {
        return false;
    };
    for id in cluster {
        records.shift_remove(id);
    }
    for id in cluster {
        let Some(mut record) = version.get(id).cloned() else { continue };
        for other in cluster.iter().filter(|o| *o != id) {
            add_listed_id(&mut record, MANUAL_NON_DUPLICATE, other);
        }
        record.set_status(RecordState::MdProcessed);
        records.insert(id.clone(), record);
    }
    true
}

/// Merge decisions for flagged non-duplicate clusters
fn cluster_merges(clusters: &[Vec<String>]) -> Vec<ManualDecision> {
    clusters
        .iter()
        .filter_map(|c| c.split_first())
        .flat_map(|(first, rest)| {
            rest.iter().map(move |other| ManualDecision {
                id1: first.clone(),
                id2: other.clone(),
                duplicate: true,
            })
        })
        .collect()
}

/// Apply the corrections and commit; `None` when nothing changed
pub fn run(review: &mut ReviewManager) -> Result<Option<String>> {
    let wrong_merges = read_flagged(&review.path.join(DUPLICATES_TO_VALIDATE))?;
    let mut merges = cluster_merges(&read_flagged(&review.path.join(NON_DUPLICATES_TO_VALIDATE))?);
    merges.extend(read_dupes_file(&review.path.join(DUPES_FILE))?);
    if wrong_merges.is_empty() && merges.is_empty() {
        info!("No corrections marked");
        return Ok(None);
    }

    let mut records = review.load_records()?;
    if !wrong_merges.is_empty() {
        let history: Vec<Records> = review
            .dataset
            .records_history(&review.git, None)?
            .into_iter()
            .map(|(_, records)| records)
            .collect();
        for cluster in &wrong_merges {
            if unmerge(&mut records, cluster, &history) {
                review
                    .report
                    .general(format!("Restored wrongly merged records: {}", cluster.join(",")));
            } else {
                warn!(ids = ?cluster, "No committed version contains all records of the cluster");
            }
        }
    }

    let propagated = review.dataset.propagated_ids()?;
    let applied =
        apply_manual_deduplication_decisions(&mut records, &merges, &propagated, &mut review.report);
    info!(
        restored = wrong_merges.len(),
        merged = applied.merged.len(),
        "Applied duplicate corrections"
    );

    review.save_records(&records)?;
    review.create_commit(
        CommitRequest::new(ProcessType::Dedupe, "Validate and correct duplicates")
            .args("--fix_errors")
            .manual()
            .path(RECORDS_FILE)
            .path(DEDUPE_DIR),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use colrev_common::Record;
    use pretty_assertions::assert_eq;

    fn records(ids: &[&str]) -> Records {
        ids.iter()
            .map(|id| {
                (
                    id.to_string(),
                    Record::new(*id, "article")
                        .with_field("title", format!("Title {}", id))
                        .with_status(RecordState::MdProcessed),
                )
            })
            .collect()
    }

    #[test]
    fn unmerge_restores_prior_versions() {
        let mut current = records(&["A", "C"]);
        current["A"].set_raw("title", "Merged title");
        let history = vec![records(&["A", "C"]), records(&["A", "B", "C"])];

        assert!(unmerge(&mut current, &["A".into(), "B".into()], &history));
        assert_eq!(current["A"].get("title"), Some("Title A"));
        assert_eq!(current["B"].get(MANUAL_NON_DUPLICATE), Some("A"));
        assert_eq!(current["A"].get(MANUAL_NON_DUPLICATE), Some("B"));
        assert_eq!(current.len(), 3);
    }

    #[test]
    fn unmerge_without_history_changes_nothing() {
        let mut current = records(&["A"]);
        assert!(!unmerge(&mut current, &["A".into(), "B".into()], &[records(&["A"])]));
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn dupes_file_lines_become_merges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dupes.txt");
        std::fs::write(&path, "A,B\n\nmalformed\n C , D \n").unwrap();
        let decisions = read_dupes_file(&path).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!((decisions[1].id1.as_str(), decisions[1].id2.as_str()), ("C", "D"));
    }

    #[test]
    fn flagged_clusters_merge_into_first_member() {
        let merges = cluster_merges(&[vec!["A".into(), "B".into(), "C".into()]]);
        assert_eq!(merges.len(), 2);
        assert!(merges.iter().all(|m| m.id1 == "A" && m.duplicate));
    }
}
