//! Blocking: candidate pairs sharing a predicate key
//!
//! Scoring every pair is quadratic; only records agreeing on at least one
//! cheap key (year, first title token, first author surname, TOC key or a
//! colrev_id) are compared.

use crate::dedupe::marked_distinct;
use colrev_common::record::toc_key;
use colrev_common::text::{family_names, robust_token};
use colrev_common::Record;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Blocks larger than this are too unspecific to be useful
const MAX_BLOCK_SIZE: usize = 1000;

/// Predicate keys of a record
pub fn predicate_keys(record: &Record) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(year) = record.known("year") {
        keys.push(format!("year:{}", year));
    }
    if let Some(token) = record
        .known("title")
        .and_then(|t| t.split_whitespace().next())
        .map(robust_token)
        .filter(|t| !t.is_empty())
    {
        keys.push(format!("title:{}", token));
    }
    if let Some(surname) = record
        .known("author")
        .and_then(|a| family_names(a).into_iter().next())
        .map(|s| robust_token(&s))
        .filter(|s| !s.is_empty())
    {
        keys.push(format!("author:{}", surname));
    }
    if let Some(toc) = toc_key(record) {
        keys.push(format!("toc:{}", toc));
    }
    keys.extend(record.colrev_id.iter().map(|cid| format!("cid:{}", cid)));
    keys
}

/// Index pairs `(i, j)` with `i < j` sharing a predicate key
///
/// Pairs the user marked as distinct are left out.
pub fn candidate_pairs(records: &[&Record]) -> BTreeSet<(usize, usize)> {
    let mut blocks: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        for key in predicate_keys(record) {
            blocks.entry(key).or_default().push(i);
        }
    }

    let mut pairs = BTreeSet::new();
    for (key, members) in &blocks {
        if members.len() > MAX_BLOCK_SIZE {
            debug!(key = %key, size = members.len(), "Skipping oversized block");
            continue;
        }
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                if !marked_distinct(records[i], records[j]) {
                    pairs.insert((i.min(j), i.max(j)));
                }
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_keys_make_candidates() {
        let a = Record::new("A", "article")
            .with_field("author", "Webster, J.")
            .with_field("title", "Analyzing the past")
            .with_field("year", "2002");
        let b = Record::new("B", "article")
            .with_field("author", "Webster, Jane")
            .with_field("title", "Analysing the past")
            .with_field("year", "2003");
        let c = Record::new("C", "article")
            .with_field("author", "Smith, K.")
            .with_field("title", "Blockchain")
            .with_field("year", "2019");
        let pairs = candidate_pairs(&[&a, &b, &c]);
        assert_eq!(pairs.into_iter().collect::<Vec<_>>(), vec![(0, 1)]);
    }

    #[test]
    fn distinct_marks_remove_pairs() {
        let a = Record::new("A", "article")
            .with_field("year", "2002")
            .with_field("manual_non_duplicate", "B");
        let b = Record::new("B", "article").with_field("year", "2002");
        assert!(candidate_pairs(&[&a, &b]).is_empty());
    }
}
