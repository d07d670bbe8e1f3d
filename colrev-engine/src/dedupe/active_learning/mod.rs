//! Active-learning deduplication
//!
//! Training labels candidate pairs (by uncertainty sampling) into
//! `dedupe/training_data.json`. Clustering fits a classifier on those labels,
//! scores the blocked candidate pairs and partitions the records. Clusters
//! above the merge threshold become duplicates; both merged and unmerged
//! clusters are exported for validation.

pub mod blocking;
pub mod cluster;
pub mod export;
pub mod features;
pub mod model;
pub mod training;

use super::labeler::PairLabeler;
use super::{simple, Decision};
use crate::dataset::Records;
use colrev_common::paths::{DUPLICATES_TO_VALIDATE, NON_DUPLICATES_TO_VALIDATE};
use colrev_common::{Error, Record, Result};
use rayon::prelude::*;
use std::path::Path;
use tracing::info;
use training::{TrainingData, TrainingStats};

/// Extend the stored training data with new labels
pub fn train(
    root: &Path,
    records: &Records,
    labeler: &mut dyn PairLabeler,
) -> Result<TrainingStats> {
    let data = TrainingData::load(root)?;
    let queue = simple::queue(records);
    let candidates: Vec<(usize, usize)> = blocking::candidate_pairs(&queue).into_iter().collect();
    info!(records = queue.len(), candidates = candidates.len(), "Blocked candidate pairs");

    let (data, stats) = training::label_pairs(data, &queue, &candidates, labeler);
    data.save(root)?;
    Ok(stats)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterOutcome {
    pub decisions: Vec<Decision>,
    /// Whether validation spreadsheets were written
    pub exported: bool,
}

/// Cluster the records with the trained model
///
/// # Arguments
/// * `root` - Repository root holding the training data
/// * `merge_threshold` - Clusters scoring above this are merged
/// * `partition_threshold` - Pairs scoring above this are linked
pub fn cluster(
    root: &Path,
    records: &Records,
    merge_threshold: f64,
    partition_threshold: f64,
) -> Result<ClusterOutcome> {
    let data = TrainingData::load(root)?;
    if data.matches.is_empty() || data.distinct.is_empty() {
        return Err(Error::Settings(
            "active-learning clustering needs labeled match and distinct pairs; run the training script first"
                .to_string(),
        ));
    }
    let model = data.fit();

    let queue = simple::queue(records);
    let candidates: Vec<(usize, usize)> = blocking::candidate_pairs(&queue).into_iter().collect();
    let scored: Vec<(usize, usize, f64)> = candidates
        .par_iter()
        .map(|&(i, j)| {
            let x = features::features(
                &features::pair_fields(queue[i]),
                &features::pair_fields(queue[j]),
            );
            (i, j, model.predict(&x))
        })
        .collect();

    let clusters = cluster::partition(queue.len(), &scored, partition_threshold);
    let (merged, unmerged): (Vec<_>, Vec<_>) = clusters
        .into_iter()
        .partition(|c| c.score > merge_threshold);
    info!(
        candidates = scored.len(),
        merged = merged.len(),
        unmerged = unmerged.len(),
        "Clustered records"
    );

    let mut decisions = Vec::new();
    for c in &merged {
        let Some((&first, rest)) = c.members.split_first() else {
            continue;
        };
        for &other in rest {
            decisions.push(Decision::Duplicate {
                id1: queue[first].id.clone(),
                id2: queue[other].id.clone(),
                score: Some(c.score),
            });
        }
    }

    let with_records = |clusters: Vec<cluster::Cluster>| -> Vec<(cluster::Cluster, Vec<&Record>)> {
        clusters
            .into_iter()
            .map(|c| {
                let members = c.members.iter().map(|&i| queue[i]).collect();
                (c, members)
            })
            .collect()
    };
    let wrote_dupes = export::write_clusters(&root.join(DUPLICATES_TO_VALIDATE), &with_records(merged))?;
    let wrote_non_dupes =
        export::write_clusters(&root.join(NON_DUPLICATES_TO_VALIDATE), &with_records(unmerged))?;

    Ok(ClusterOutcome {
        decisions,
        exported: wrote_dupes || wrote_non_dupes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::labeler::{PairLabel, ScriptedLabeler};
    use colrev_common::RecordState;

    fn record(id: &str, author: &str, title: &str, year: &str) -> Record {
        Record::new(id, "article")
            .with_field("author", author)
            .with_field("title", title)
            .with_field("journal", "MIS Quarterly")
            .with_field("year", year)
            .with_origin(format!("src{}.bib/{}", id, id))
            .with_status(RecordState::MdPrepared)
    }

    fn records() -> Records {
        let mut records = Records::new();
        for r in [
            record("A", "Webster, J.", "Analyzing the past to prepare for the future", "2002"),
            record("B", "Webster, Jane", "Analyzing the past to prepare for the future.", "2002"),
            record("C", "Webster, J.", "A completely different topic in information systems", "2002"),
            record("D", "Watson, R.", "Analyzing blockchain adoption", "2002"),
        ] {
            records.insert(r.id.clone(), r);
        }
        records
    }

    #[test]
    fn clustering_requires_training_data() {
        let dir = tempfile::tempdir().unwrap();
        let err = cluster(dir.path(), &records(), 0.8, 0.5).unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }

    #[test]
    fn trained_model_merges_near_identical_records() {
        let dir = tempfile::tempdir().unwrap();
        let records = records();
        let mut labeler = ScriptedLabeler::new(vec![
            ("A".into(), "B".into(), PairLabel::Match),
            ("A".into(), "C".into(), PairLabel::Distinct),
            ("B".into(), "C".into(), PairLabel::Distinct),
            ("A".into(), "D".into(), PairLabel::Distinct),
        ]);
        let stats = train(dir.path(), &records, &mut labeler).unwrap();
        assert_eq!(stats.matches, 1);
        assert!(stats.distinct >= 1);

        let outcome = cluster(dir.path(), &records, 0.5, 0.4).unwrap();
        assert!(outcome.decisions.iter().any(|d| matches!(
            d,
            Decision::Duplicate { id1, id2, .. } if id1 == "A" && id2 == "B"
        )));
        assert!(!outcome.decisions.iter().any(|d| matches!(
            d,
            Decision::Duplicate { id2, .. } if id2 == "C"
        )));
        assert!(outcome.exported);
        assert!(dir.path().join(DUPLICATES_TO_VALIDATE).exists());
    }
}
