//! Simple deduplication for small corpora
//!
//! Records are queued with processed records first and newly prepared records
//! after them. Every prepared record is compared with all records before it
//! in the queue, so processed records are never paired with each other. The
//! best match decides:
//!
//! | best similarity | decision |
//! |---|---|
//! | ≤ non-duplicate threshold | no duplicate |
//! | between the thresholds | ask the labeler, else potential duplicate |
//! | ≥ duplicate threshold | duplicate |

use super::labeler::{PairLabel, PairLabeler};
use super::{marked_distinct, Decision};
use crate::dataset::Records;
use colrev_common::record::similarity;
use colrev_common::{Record, RecordState};
use rayon::prelude::*;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleResult {
    pub decisions: Vec<Decision>,
    /// Similarity evaluations, not counting pairs marked distinct
    pub comparisons: usize,
}

/// The dedupe queue: processed records, then `md_prepared` records
///
/// Records excluded during preparation never enter the queue.
pub fn queue(records: &Records) -> Vec<&Record> {
    let processed = records.values().filter(|r| {
        r.status.is_post_md_prepared()
            && r.status != RecordState::MdPrepared
            && r.status != RecordState::RevPrescreenExcluded
    });
    let prepared = records
        .values()
        .filter(|r| r.status == RecordState::MdPrepared);
    processed.chain(prepared).collect()
}

/// Best match among the queue entries before `position`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Predecessors {
    best: Option<(usize, f64)>,
    compared: usize,
}

fn best_predecessor(queue: &[&Record], position: usize) -> Predecessors {
    let record = queue[position];
    let mut found = Predecessors {
        best: None,
        compared: 0,
    };
    for (j, other) in queue[..position].iter().enumerate() {
        if marked_distinct(record, other) {
            continue;
        }
        let score = similarity(record, other);
        found.compared += 1;
        match found.best {
            Some((_, top)) if top >= score => {}
            _ => found.best = Some((j, score)),
        }
    }
    found
}

/// Decide every queued record
pub fn decisions(
    records: &Records,
    non_dup_threshold: f64,
    dup_threshold: f64,
    labeler: &mut dyn PairLabeler,
) -> SimpleResult {
    let queue = queue(records);
    let first_prepared = queue
        .iter()
        .position(|r| r.status == RecordState::MdPrepared)
        .unwrap_or(queue.len());

    let found: Vec<Predecessors> = (first_prepared..queue.len())
        .into_par_iter()
        .map(|i| best_predecessor(&queue, i))
        .collect();

    let mut result = SimpleResult {
        decisions: Vec::new(),
        comparisons: found.iter().map(|p| p.compared).sum(),
    };
    for (i, predecessors) in (first_prepared..).zip(found) {
        let record = queue[i];
        let Some((j, score)) = predecessors.best else {
            result.decisions.push(Decision::NoDuplicate {
                id: record.id.clone(),
            });
            continue;
        };
        let other = queue[j];
        debug!(id = %record.id, best = %other.id, score, "Best match in queue");

        let decision = if score >= dup_threshold {
            Decision::Duplicate {
                id1: record.id.clone(),
                id2: other.id.clone(),
                score: Some(score),
            }
        } else if score <= non_dup_threshold {
            Decision::NoDuplicate {
                id: record.id.clone(),
            }
        } else {
            match labeler.label(record, other) {
                Some(PairLabel::Match) => Decision::Duplicate {
                    id1: record.id.clone(),
                    id2: other.id.clone(),
                    score: Some(score),
                },
                Some(PairLabel::Distinct) => Decision::NoDuplicate {
                    id: record.id.clone(),
                },
                None => Decision::PotentialDuplicate {
                    id1: record.id.clone(),
                    id2: other.id.clone(),
                    score,
                },
            }
        };
        result.decisions.push(decision);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::labeler::{ColrevIdLabeler, ScriptedLabeler};
    use pretty_assertions::assert_eq;

    fn article(id: &str, title: &str, status: RecordState) -> Record {
        Record::new(id, "article")
            .with_field("author", "Webster, J. and Watson, R.")
            .with_field("title", title)
            .with_field("journal", "MIS Quarterly")
            .with_field("year", "2002")
            .with_field("volume", "26")
            .with_field("number", "2")
            .with_status(status)
    }

    fn records_of(list: Vec<Record>) -> Records {
        list.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    const TITLE: &str = "Analyzing the past to prepare for the future: Writing a literature review";

    #[test]
    fn processed_records_lead_the_queue() {
        let records = records_of(vec![
            article("New", TITLE, RecordState::MdPrepared),
            article("Old", TITLE, RecordState::MdProcessed),
            article("Excluded", TITLE, RecordState::RevPrescreenExcluded),
        ]);
        let ids: Vec<&str> = queue(&records).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Old", "New"]);
    }

    #[test]
    fn casing_differences_are_duplicates() {
        let records = records_of(vec![
            article("WebsterWatson2002", TITLE, RecordState::MdPrepared),
            article("Webster2002a", &TITLE.replace("literature review", "Literature Review"), RecordState::MdPrepared),
        ]);
        let result = decisions(&records, 0.7, 0.95, &mut ColrevIdLabeler);
        assert_eq!(
            result.decisions,
            vec![
                Decision::NoDuplicate {
                    id: "WebsterWatson2002".to_string()
                },
                Decision::Duplicate {
                    id1: "Webster2002a".to_string(),
                    id2: "WebsterWatson2002".to_string(),
                    score: Some(1.0),
                },
            ]
        );
    }

    #[test]
    fn different_works_are_not_duplicates() {
        let records = records_of(vec![
            article("A", TITLE, RecordState::MdProcessed),
            Record::new("B", "article")
                .with_field("author", "Smith, K.")
                .with_field("title", "Blockchain governance in public administration")
                .with_field("journal", "Government Information Quarterly")
                .with_field("year", "2019")
                .with_field("volume", "36")
                .with_field("number", "4")
                .with_status(RecordState::MdPrepared),
        ]);
        let result = decisions(&records, 0.7, 0.95, &mut ColrevIdLabeler);
        assert_eq!(
            result.decisions,
            vec![Decision::NoDuplicate { id: "B".to_string() }]
        );
    }

    #[test]
    fn every_record_is_compared_with_its_predecessors() {
        let other = |id: &str, author: &str, topic: &str, year: &str| {
            Record::new(id, "article")
                .with_field("author", author)
                .with_field("title", topic)
                .with_field("journal", "Government Information Quarterly")
                .with_field("year", year)
                .with_status(RecordState::MdPrepared)
        };
        let late = article("Zeta2002", TITLE, RecordState::MdPrepared)
            .with_field("manual_non_duplicate", "Beta2019");
        let records = records_of(vec![
            article("Alpha2002", TITLE, RecordState::MdProcessed),
            other("Beta2019", "Smith, K.", "Blockchain governance in public administration", "2019"),
            other("Gamma2019", "Olsen, T.", "Open data portals in municipalities", "2017"),
            other("Delta2019", "Jones, M.", "Citizen participation in e-government", "2015"),
            late,
        ]);
        let queue: Vec<&str> = queue(&records).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(queue, vec!["Alpha2002", "Beta2019", "Gamma2019", "Delta2019", "Zeta2002"]);

        let result = decisions(&records, 0.7, 0.95, &mut ColrevIdLabeler);
        // 1 + 2 + 3 predecessors, plus 4 for Zeta2002 minus the distinct pair
        assert_eq!(result.comparisons, 9);
        assert!(result.decisions.contains(&Decision::Duplicate {
            id1: "Zeta2002".to_string(),
            id2: "Alpha2002".to_string(),
            score: Some(1.0),
        }));
    }

    #[test]
    fn deduplicated_records_are_not_decided_again() {
        let records = records_of(vec![
            article("Webster2002", TITLE, RecordState::MdProcessed),
            article("WebsterWatson2002", TITLE, RecordState::RevPrescreenIncluded),
        ]);
        let result = decisions(&records, 0.7, 0.95, &mut ColrevIdLabeler);
        assert!(result.decisions.is_empty());
        assert_eq!(result.comparisons, 0);
    }

    #[test]
    fn uncertain_pairs_are_asked() {
        let records = records_of(vec![
            article("A", TITLE, RecordState::MdProcessed),
            article("B", TITLE, RecordState::MdPrepared).with_field("year", "2003"),
        ]);
        // year mismatch: 1 - 0.13
        let mut labeler = ScriptedLabeler::new(vec![("A".into(), "B".into(), PairLabel::Distinct)]);
        let result = decisions(&records, 0.7, 0.95, &mut labeler);
        assert_eq!(labeler.asked, 1);
        assert_eq!(result.decisions, vec![Decision::NoDuplicate { id: "B".to_string() }]);

        let result = decisions(&records, 0.7, 0.95, &mut ColrevIdLabeler);
        assert!(matches!(
            result.decisions[0],
            Decision::PotentialDuplicate { ref id1, .. } if id1 == "B"
        ));
    }
}
