//! Pair labeling
//!
//! Training and the simple variant's potential duplicates need a verdict on
//! a record pair. The automated default only answers when the records share a
//! colrev_id; everything else stays undecided.

use colrev_common::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairLabel {
    /// Both records refer to the same work
    Match,
    Distinct,
}

/// Source of pair verdicts
pub trait PairLabeler {
    /// `None` when the labeler cannot decide (the pair is skipped)
    fn label(&mut self, a: &Record, b: &Record) -> Option<PairLabel>;
}

/// Whether the records share a colrev_id
pub fn identical_colrev_ids(a: &Record, b: &Record) -> bool {
    a.colrev_id.iter().any(|cid| b.colrev_id.contains(cid))
}

/// Non-interactive labeler: shared colrev_ids are a match
#[derive(Debug, Default, Clone, Copy)]
pub struct ColrevIdLabeler;

impl PairLabeler for ColrevIdLabeler {
    fn label(&mut self, a: &Record, b: &Record) -> Option<PairLabel> {
        identical_colrev_ids(a, b).then_some(PairLabel::Match)
    }
}

/// Labeler answering from a fixed list of `(id1, id2, label)` verdicts
///
/// Pairs are looked up in both orders; unknown pairs are undecided.
#[derive(Debug, Default, Clone)]
pub struct ScriptedLabeler {
    verdicts: Vec<(String, String, PairLabel)>,
    /// Pairs asked so far
    pub asked: usize,
}

impl ScriptedLabeler {
    pub fn new(verdicts: Vec<(String, String, PairLabel)>) -> Self {
        Self { verdicts, asked: 0 }
    }
}

impl PairLabeler for ScriptedLabeler {
    fn label(&mut self, a: &Record, b: &Record) -> Option<PairLabel> {
        self.asked += 1;
        self.verdicts
            .iter()
            .find(|(x, y, _)| (*x == a.id && *y == b.id) || (*x == b.id && *y == a.id))
            .map(|(_, _, label)| *label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colrev_id_overlap_is_a_match() {
        let mut a = Record::new("A", "article");
        let mut b = Record::new("B", "article");
        a.add_colrev_id("colrev_id1:|a|x|1|1|2020|smith|t");
        b.add_colrev_id("colrev_id1:|a|x|1|1|2020|smith|t");
        assert_eq!(ColrevIdLabeler.label(&a, &b), Some(PairLabel::Match));

        let c = Record::new("C", "article");
        assert_eq!(ColrevIdLabeler.label(&a, &c), None);
    }

    #[test]
    fn scripted_verdicts_in_both_orders() {
        let mut labeler =
            ScriptedLabeler::new(vec![("A".into(), "B".into(), PairLabel::Distinct)]);
        let a = Record::new("A", "article");
        let b = Record::new("B", "article");
        assert_eq!(labeler.label(&b, &a), Some(PairLabel::Distinct));
        assert_eq!(labeler.asked, 1);
    }
}
