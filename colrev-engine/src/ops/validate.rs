//! `colrev validate`: review what a commit did to the records
//!
//! Nothing is changed. The `prepare` scope lists records whose citation
//! changed noticeably, the `merge` scope lists merges with the similarity of
//! the records that were combined.

use crate::review_manager::ReviewManager;
use crate::dataset::Records;
use colrev_common::record::similarity::{change_score, similarity};
use colrev_common::{Error, Record, Result};
use std::collections::BTreeSet;
use std::fmt::Write;
use tracing::info;

/// Change scores at or below this are not reported
pub const CHANGE_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationScope {
    Prepare,
    Merge,
    All,
}

impl std::str::FromStr for ValidationScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prepare" => Ok(ValidationScope::Prepare),
            "merge" => Ok(ValidationScope::Merge),
            "all" => Ok(ValidationScope::All),
            other => Err(Error::Settings(format!("Unknown validation scope: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Prepared,
    Merged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationItem {
    pub kind: ValidationKind,
    pub id: String,
    /// Change score (prepared) or the lowest pairwise similarity (merged)
    pub score: f64,
    pub details: String,
}

/// Prior version of `record`: same ID, else one sharing an origin
fn prior_version<'a>(before: &'a Records, record: &Record) -> Option<&'a Record> {
    before.get(&record.id).or_else(|| {
        before
            .values()
            .find(|b| b.origin.iter().any(|o| record.origin.contains(o)))
    })
}

fn changed_fields(before: &Record, after: &Record) -> Vec<String> {
    let keys: BTreeSet<&String> = before.fields.keys().chain(after.fields.keys()).collect();
    keys.into_iter()
        .filter(|k| before.fields.get(*k) != after.fields.get(*k))
        .cloned()
        .collect()
}

/// Records whose citation changed by more than [`CHANGE_THRESHOLD`]
pub fn validate_preparation(before: &Records, after: &Records) -> Vec<ValidationItem> {
    let mut items: Vec<ValidationItem> = after
        .values()
        .filter_map(|record| {
            let prior = prior_version(before, record)?;
            let score = change_score(prior, record);
            (score > CHANGE_THRESHOLD).then(|| ValidationItem {
                kind: ValidationKind::Prepared,
                id: record.id.clone(),
                score,
                details: changed_fields(prior, record).join(", "),
            })
        })
        .collect();
    items.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    items
}

/// Records that absorbed other records, least similar merge first
pub fn validate_merges(before: &Records, after: &Records) -> Vec<ValidationItem> {
    let mut items = Vec::new();
    for record in after.values().filter(|r| r.origin.len() > 1) {
        let mut parts: Vec<&Record> = Vec::new();
        for origin in &record.origin {
            if let Some(part) = before.values().find(|b| b.origin.contains(origin)) {
                if !parts.iter().any(|p| p.id == part.id) {
                    parts.push(part);
                }
            }
        }
        if parts.len() < 2 {
            continue;
        }
        let mut lowest = 1.0_f64;
        for (i, a) in parts.iter().enumerate() {
            for b in &parts[i + 1..] {
                lowest = lowest.min(similarity(a, b));
            }
        }
        let ids: Vec<&str> = parts.iter().map(|p| p.id.as_str()).collect();
        items.push(ValidationItem {
            kind: ValidationKind::Merged,
            id: record.id.clone(),
            score: lowest,
            details: format!("merged {}", ids.join(", ")),
        });
    }
    items.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.id.cmp(&b.id)));
    items
}

/// `colrev validate`
pub fn run(review: &ReviewManager, scope: ValidationScope, commit: Option<&str>) -> Result<Vec<ValidationItem>> {
    let target = review.git.resolve(commit.unwrap_or("HEAD"))?;
    let Some(parent) = review.git.parent_of(&target)? else {
        info!(commit = %target, "Initial commit, nothing to validate");
        return Ok(Vec::new());
    };
    let before = review.dataset.load_records_from_history(&review.git, &parent)?;
    let after = review.dataset.load_records_from_history(&review.git, &target)?;

    let mut items = Vec::new();
    if matches!(scope, ValidationScope::Prepare | ValidationScope::All) {
        items.extend(validate_preparation(&before, &after));
    }
    if matches!(scope, ValidationScope::Merge | ValidationScope::All) {
        items.extend(validate_merges(&before, &after));
    }
    info!(commit = %target, items = items.len(), "Validated");
    Ok(items)
}

pub fn format_items(items: &[ValidationItem]) -> String {
    if items.is_empty() {
        return "No changes to validate\n".to_string();
    }
    let mut out = String::new();
    for item in items {
        let label = match item.kind {
            ValidationKind::Prepared => "change",
            ValidationKind::Merged => "similarity",
        };
        let _ = writeln!(out, "{:<24} {} {:.2}  {}", item.id, label, item.score, item.details);
    }
    out
}
