//! Pair features for the duplicate classifier
//!
//! Each compared field contributes a similarity in [0, 1] and a missing
//! indicator; a constant bias feature comes first.

use colrev_common::record::fields::{AUTHOR, NUMBER, PAGES, TITLE, VOLUME, YEAR};
use colrev_common::text::{ratio, token_set_ratio};
use colrev_common::Record;
use std::collections::BTreeMap;

/// How a field is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Long text, token-set similarity
    String,
    /// Short codes, edit distance
    ShortString,
    /// Years, closeness within five years
    Date,
}

pub const CONTAINER_TITLE: &str = "container_title";

/// Compared fields and their comparators
pub const FIELDS: [(&str, Comparator); 7] = [
    (AUTHOR, Comparator::String),
    (TITLE, Comparator::String),
    (CONTAINER_TITLE, Comparator::String),
    (YEAR, Comparator::Date),
    (VOLUME, Comparator::ShortString),
    (NUMBER, Comparator::ShortString),
    (PAGES, Comparator::ShortString),
];

/// Bias, then one score and one missing indicator per field
pub const FEATURE_COUNT: usize = 1 + 2 * FIELDS.len();

/// The compared fields of a record, lower-cased
pub type PairFields = BTreeMap<String, String>;

pub fn pair_fields(record: &Record) -> PairFields {
    let mut fields = PairFields::new();
    for (key, _) in FIELDS {
        let value = if key == CONTAINER_TITLE {
            record.container_title()
        } else {
            record.known(key).unwrap_or("").to_string()
        };
        let value = value.trim().to_lowercase();
        if !value.is_empty() {
            fields.insert(key.to_string(), value);
        }
    }
    fields
}

fn compare(comparator: Comparator, a: &str, b: &str) -> f64 {
    match comparator {
        Comparator::String => token_set_ratio(a, b),
        Comparator::ShortString => ratio(a, b),
        Comparator::Date => match (a.parse::<i32>(), b.parse::<i32>()) {
            (Ok(x), Ok(y)) => 1.0 - f64::from((x - y).abs().min(5)) / 5.0,
            _ => ratio(a, b),
        },
    }
}

/// Feature vector of a record pair
pub fn features(a: &PairFields, b: &PairFields) -> Vec<f64> {
    let mut out = Vec::with_capacity(FEATURE_COUNT);
    out.push(1.0);
    for (key, comparator) in FIELDS {
        match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => {
                out.push(compare(comparator, x, y));
                out.push(0.0);
            }
            _ => {
                out.push(0.0);
                out.push(1.0);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_records_score_one_everywhere() {
        let record = Record::new("A", "article")
            .with_field("author", "Webster, J.")
            .with_field("title", "Writing a literature review")
            .with_field("journal", "MIS Quarterly")
            .with_field("year", "2002")
            .with_field("volume", "26")
            .with_field("number", "2")
            .with_field("pages", "13--23");
        let fields = pair_fields(&record);
        let vector = features(&fields, &fields);
        assert_eq!(vector.len(), FEATURE_COUNT);
        for i in 0..FIELDS.len() {
            assert_eq!(vector[1 + 2 * i], 1.0);
            assert_eq!(vector[2 + 2 * i], 0.0);
        }
    }

    #[test]
    fn years_decay_with_distance() {
        assert_eq!(compare(Comparator::Date, "2002", "2003"), 0.8);
        assert_eq!(compare(Comparator::Date, "2002", "2012"), 0.0);
    }

    #[test]
    fn missing_fields_are_flagged() {
        let a = pair_fields(&Record::new("A", "article").with_field("title", "x"));
        let b = pair_fields(&Record::new("B", "article").with_field("title", "x"));
        let vector = features(&a, &b);
        // author missing
        assert_eq!(vector[1], 0.0);
        assert_eq!(vector[2], 1.0);
    }
}
