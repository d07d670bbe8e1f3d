//! `colrev trace --id ID`: how a record changed, commit by commit

use crate::review_manager::ReviewManager;
use colrev_common::{Error, Record, Result};
use std::collections::BTreeSet;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    Added { field: String, value: String },
    Removed { field: String, value: String },
    Changed { field: String, before: String, after: String },
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldChange::Added { field, value } => write!(f, "+ {}: {}", field, value),
            FieldChange::Removed { field, value } => write!(f, "- {}: {}", field, value),
            FieldChange::Changed { field, before, after } => write!(f, "~ {}: {} -> {}", field, before, after),
        }
    }
}

/// Changes of one commit to the traced record
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStep {
    pub commit: String,
    pub date: String,
    pub summary: String,
    pub changes: Vec<FieldChange>,
}

/// Fields of a record as they appear in the records file
fn flat(record: &Record) -> Vec<(String, String)> {
    let mut fields = vec![
        ("ID".to_string(), record.id.clone()),
        ("ENTRYTYPE".to_string(), record.entry_type.clone()),
        ("colrev_status".to_string(), record.status.to_string()),
        ("colrev_origin".to_string(), record.origin.join(";")),
    ];
    fields.extend(record.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    fields
}

pub fn diff(before: Option<&Record>, after: &Record) -> Vec<FieldChange> {
    let after_fields = flat(after);
    let Some(before) = before else {
        return after_fields
            .into_iter()
            .map(|(field, value)| FieldChange::Added { field, value })
            .collect();
    };
    let before_fields = flat(before);
    let lookup = |list: &[(String, String)], key: &str| {
        list.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    };
    let mut keys: Vec<&String> = before_fields.iter().map(|(k, _)| k).collect();
    for (k, _) in &after_fields {
        if !keys.contains(&k) {
            keys.push(k);
        }
    }
    let mut changes = Vec::new();
    for key in keys {
        match (lookup(&before_fields, key), lookup(&after_fields, key)) {
            (Some(b), Some(a)) if a != b => changes.push(FieldChange::Changed {
                field: key.clone(),
                before: b,
                after: a,
            }),
            (None, Some(value)) => changes.push(FieldChange::Added { field: key.clone(), value }),
            (Some(value), None) => changes.push(FieldChange::Removed { field: key.clone(), value }),
            _ => {}
        }
    }
    changes
}

/// Locate the traced record in one version: by ID, else by a shared origin
fn find<'a>(records: &'a crate::dataset::Records, id: &str, origins: &BTreeSet<String>) -> Option<&'a Record> {
    records
        .get(id)
        .or_else(|| records.values().find(|r| r.origin.iter().any(|o| origins.contains(o))))
}

/// `colrev trace`
pub fn run(review: &ReviewManager, id: &str) -> Result<Vec<TraceStep>> {
    let mut history = review.dataset.records_history(&review.git, None)?;
    history.reverse();

    let origins: BTreeSet<String> = history
        .iter()
        .rev()
        .find_map(|(_, records)| records.get(id))
        .map(|r| r.origin.iter().cloned().collect())
        .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;

    let mut steps = Vec::new();
    let mut previous: Option<Record> = None;
    for (commit, records) in &history {
        let Some(current) = find(records, id, &origins) else {
            continue;
        };
        let changes = diff(previous.as_ref(), current);
        if !changes.is_empty() {
            steps.push(TraceStep {
                commit: commit.id.chars().take(8).collect(),
                date: commit.date.format("%Y-%m-%d %H:%M").to_string(),
                summary: commit.message.lines().next().unwrap_or_default().to_string(),
                changes,
            });
        }
        previous = Some(current.clone());
    }
    Ok(steps)
}

pub fn format_steps(steps: &[TraceStep]) -> String {
    let mut out = String::new();
    for step in steps {
        let _ = writeln!(out, "{} {} {}", step.commit, step.date, step.summary);
        for change in &step.changes {
            let _ = writeln!(out, "    {}", change);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use colrev_common::RecordState;
    use pretty_assertions::assert_eq;

    #[test]
    fn diff_lists_field_changes() {
        let before = Record::new("A", "article")
            .with_field("title", "analyzing the past")
            .with_field("keywords", "lr")
            .with_status(RecordState::MdImported);
        let after = Record::new("A", "article")
            .with_field("title", "Analyzing the Past")
            .with_field("volume", "26")
            .with_status(RecordState::MdPrepared);
        let changes = diff(Some(&before), &after);
        assert_eq!(
            changes,
            vec![
                FieldChange::Changed {
                    field: "colrev_status".into(),
                    before: "md_imported".into(),
                    after: "md_prepared".into(),
                },
                FieldChange::Removed { field: "keywords".into(), value: "lr".into() },
                FieldChange::Changed {
                    field: "title".into(),
                    before: "analyzing the past".into(),
                    after: "Analyzing the Past".into(),
                },
                FieldChange::Added { field: "volume".into(), value: "26".into() },
            ]
        );
        assert_eq!(changes[3].to_string(), "+ volume: 26");
        assert_eq!(diff(None, &after).len(), 6);
    }
}
