//! Training data and uncertainty sampling
//!
//! Labeled pairs persist in `dedupe/training_data.json` as snapshots of the
//! compared fields, so labels survive later merges and ID changes.

use super::features::{self, PairFields, FEATURE_COUNT};
use super::model::Model;
use crate::dedupe::labeler::{identical_colrev_ids, PairLabel, PairLabeler};
use colrev_common::paths::TRAINING_DATA_FILE;
use colrev_common::{Record, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Labeling stops at this many pairs
pub const MAX_TRAINING_PAIRS: usize = 1000;

/// Distinct labels may outnumber matches at most this many times
pub const MAX_DISTINCT_RATIO: usize = 3;

/// The model is refit after this many new labels
const REFIT_INTERVAL: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPair {
    pub id1: String,
    pub id2: String,
    pub record1: PairFields,
    pub record2: PairFields,
}

impl LabeledPair {
    pub fn of(a: &Record, b: &Record) -> Self {
        Self {
            id1: a.id.clone(),
            id2: b.id.clone(),
            record1: features::pair_fields(a),
            record2: features::pair_fields(b),
        }
    }

    fn same_ids(&self, other: &LabeledPair) -> bool {
        (self.id1 == other.id1 && self.id2 == other.id2)
            || (self.id1 == other.id2 && self.id2 == other.id1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    #[serde(rename = "match")]
    pub matches: Vec<LabeledPair>,
    pub distinct: Vec<LabeledPair>,
}

impl TrainingData {
    /// The stored training data (empty when the file does not exist)
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(TRAINING_DATA_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(TRAINING_DATA_FILE);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.matches.len() + self.distinct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pair: &LabeledPair) -> bool {
        self.matches.iter().chain(&self.distinct).any(|p| p.same_ids(pair))
    }

    /// Whether another distinct label keeps the set balanced
    pub fn accepts_distinct(&self) -> bool {
        self.distinct.len() < MAX_DISTINCT_RATIO * self.matches.len().max(1)
    }

    /// Add a label; `false` when it would unbalance the set or the set is full
    pub fn add(&mut self, pair: LabeledPair, label: PairLabel) -> bool {
        if self.len() >= MAX_TRAINING_PAIRS || self.contains(&pair) {
            return false;
        }
        match label {
            PairLabel::Match => self.matches.push(pair),
            PairLabel::Distinct => {
                if !self.accepts_distinct() {
                    return false;
                }
                self.distinct.push(pair);
            }
        }
        true
    }

    /// Examples for model fitting
    pub fn examples(&self) -> Vec<(Vec<f64>, bool)> {
        self.matches
            .iter()
            .map(|p| (features::features(&p.record1, &p.record2), true))
            .chain(
                self.distinct
                    .iter()
                    .map(|p| (features::features(&p.record1, &p.record2), false)),
            )
            .collect()
    }

    pub fn fit(&self) -> Model {
        Model::fit(&self.examples(), FEATURE_COUNT)
    }
}

/// Labeling state with a one-step undo buffer
pub struct TrainingSession {
    pub data: TrainingData,
    last: Option<(LabeledPair, PairLabel)>,
}

impl TrainingSession {
    pub fn new(data: TrainingData) -> Self {
        Self { data, last: None }
    }

    pub fn label(&mut self, pair: LabeledPair, label: PairLabel) -> bool {
        let added = self.data.add(pair.clone(), label);
        if added {
            self.last = Some((pair, label));
        }
        added
    }

    /// Revert the most recent label; `false` when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        let Some((pair, label)) = self.last.take() else {
            return false;
        };
        let list = match label {
            PairLabel::Match => &mut self.data.matches,
            PairLabel::Distinct => &mut self.data.distinct,
        };
        if let Some(pos) = list.iter().rposition(|p| p.same_ids(&pair)) {
            list.remove(pos);
        }
        true
    }
}

/// Index of the candidate the model is least sure about (closest to 0.5)
pub fn most_uncertain(model: &Model, vectors: &[Vec<f64>], skip: &BTreeSet<usize>) -> Option<usize> {
    vectors
        .iter()
        .enumerate()
        .filter(|(k, _)| !skip.contains(k))
        .map(|(k, x)| (k, (model.predict(x) - 0.5).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(k, _)| k)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingStats {
    pub matches: usize,
    pub distinct: usize,
    /// Pairs presented to the labeler
    pub asked: usize,
}

/// Label candidate pairs by uncertainty sampling
///
/// Pairs sharing a colrev_id are matches without asking. Stops when the
/// training set is full or every candidate was considered.
pub fn label_pairs(
    data: TrainingData,
    records: &[&Record],
    candidates: &[(usize, usize)],
    labeler: &mut dyn PairLabeler,
) -> (TrainingData, TrainingStats) {
    let mut session = TrainingSession::new(data);
    let vectors: Vec<Vec<f64>> = candidates
        .iter()
        .map(|&(i, j)| {
            features::features(
                &features::pair_fields(records[i]),
                &features::pair_fields(records[j]),
            )
        })
        .collect();
    let mut seen: BTreeSet<usize> = BTreeSet::new();
    let mut model = session.data.fit();
    let mut since_fit = 0;
    let mut stats = TrainingStats::default();

    while session.data.len() < MAX_TRAINING_PAIRS {
        let Some(k) = most_uncertain(&model, &vectors, &seen) else {
            break;
        };
        seen.insert(k);
        let (i, j) = candidates[k];
        let (a, b) = (records[i], records[j]);
        let pair = LabeledPair::of(a, b);
        if session.data.contains(&pair) {
            continue;
        }

        let label = if identical_colrev_ids(a, b) {
            Some(PairLabel::Match)
        } else {
            stats.asked += 1;
            labeler.label(a, b)
        };
        let Some(label) = label else { continue };
        if session.label(pair, label) {
            debug!(id1 = %a.id, id2 = %b.id, ?label, "Labeled pair");
            since_fit += 1;
        }
        if since_fit >= REFIT_INTERVAL {
            model = session.data.fit();
            since_fit = 0;
        }
    }

    stats.matches = session.data.matches.len();
    stats.distinct = session.data.distinct.len();
    info!(matches = stats.matches, distinct = stats.distinct, "Training data");
    (session.data, stats)
}
