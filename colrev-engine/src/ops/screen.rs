//! `colrev screen`: full-text screening of `pdf_prepared` records
//!
//! Decisions are kept per criterion in `screening_criteria` as
//! `name=in;other=out`. A record is included iff no criterion is `out`;
//! `TODO` marks a criterion that still needs a decision.

use super::prescreen::TableFormat;
use super::{balanced_splits, parse_decision, parse_split, resolve_path};
use crate::commit::CommitRequest;
use crate::dataset::Records;
use crate::process;
use crate::review_manager::ReviewManager;
use crate::tables::{self, Table};
use colrev_common::paths::{RECORDS_FILE, SCREEN_DIR, SETTINGS_FILE};
use colrev_common::record::fields::SCREENING_CRITERIA;
use colrev_common::settings::{CriterionType, ScreenCriterion, ScreenScript};
use colrev_common::{Error, ProcessType, Record, RecordState, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

const TODO: &str = "TODO";
/// `screening_criteria` value when no criteria are configured
const NO_CRITERIA: &str = "NA";
const INFO_COLUMNS: [&str; 5] = ["ID", "author", "title", "container_title", "year"];

#[derive(Debug, Clone, Default)]
pub struct ScreenOptions {
    pub include_all: bool,
    /// `name,explanation`
    pub add_criterion: Option<String>,
    pub delete_criterion: Option<String>,
    pub export: Option<TableFormat>,
    pub import: Option<PathBuf>,
    pub create_split: Option<usize>,
    pub split: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenSummary {
    pub included: usize,
    pub excluded: usize,
    pub exported: Option<PathBuf>,
    pub splits: Vec<PathBuf>,
    pub commit: Option<String>,
}

// ============================================================================
// Criteria values
// ============================================================================

/// Parse `name=in;other=out` into an ordered map
pub fn parse_criteria(value: &str) -> BTreeMap<String, String> {
    if value.trim() == NO_CRITERIA {
        return BTreeMap::new();
    }
    value
        .split(';')
        .filter_map(|item| item.split_once('='))
        .map(|(name, decision)| (name.trim().to_string(), decision.trim().to_string()))
        .collect()
}

pub fn format_criteria(criteria: &BTreeMap<String, String>) -> String {
    if criteria.is_empty() {
        return NO_CRITERIA.to_string();
    }
    criteria
        .iter()
        .map(|(name, decision)| format!("{}={}", name, decision))
        .collect::<Vec<_>>()
        .join(";")
}

/// Screening outcome of a complete set of decisions (`None` while any is open)
pub fn screen_outcome(criteria: &BTreeMap<String, String>) -> Option<RecordState> {
    if criteria.values().any(|d| d != "in" && d != "out") {
        return None;
    }
    if criteria.values().any(|d| d == "out") {
        Some(RecordState::RevExcluded)
    } else {
        Some(RecordState::RevIncluded)
    }
}

fn apply_decisions(record: &mut Record, criteria: &BTreeMap<String, String>) -> Option<RecordState> {
    record.set_raw(SCREENING_CRITERIA, format_criteria(criteria));
    let outcome = screen_outcome(criteria)?;
    record.status = outcome;
    Some(outcome)
}

fn pending<'a>(records: &'a mut Records, selected: &'a HashSet<String>) -> impl Iterator<Item = &'a mut Record> {
    records
        .values_mut()
        .filter(|r| r.status == RecordState::PdfPrepared)
        .filter(move |r| selected.is_empty() || selected.contains(&r.id))
}

// ============================================================================
// Criteria maintenance
// ============================================================================

/// Register a criterion and reopen screened records for it
///
/// Included and synthesized records return to `pdf_prepared` with the new
/// criterion marked `TODO`; excluded records stay excluded.
pub fn add_criterion(review: &mut ReviewManager, definition: &str) -> Result<Option<String>> {
    let (name, explanation) = definition
        .split_once(',')
        .map(|(n, e)| (n.trim(), e.trim()))
        .unwrap_or((definition.trim(), ""));
    if name.is_empty() || name.contains(['=', ';']) {
        return Err(Error::Settings(format!("Invalid criterion name: {:?}", name)));
    }
    if review.settings.screen.criteria.contains_key(name) {
        return Err(Error::Settings(format!("Screening criterion {} already exists", name)));
    }
    process::require_clean_repo(&review.git, &[])?;

    review.settings.screen.criteria.insert(
        name.to_string(),
        ScreenCriterion {
            explanation: explanation.to_string(),
            criterion_type: CriterionType::InclusionCriterion,
            comment: String::new(),
        },
    );
    review.save_settings()?;

    let mut records = review.load_records()?;
    for record in records.values_mut() {
        let Some(value) = record.get(SCREENING_CRITERIA) else {
            continue;
        };
        let mut criteria = parse_criteria(value);
        criteria.insert(name.to_string(), TODO.to_string());
        record.set_raw(SCREENING_CRITERIA, format_criteria(&criteria));
        if matches!(record.status, RecordState::RevIncluded | RecordState::RevSynthesized) {
            record.status = RecordState::PdfPrepared;
            review.report.record(&record.id.clone(), format!("Reopened for criterion {}", name));
        }
    }
    review.save_records(&records)?;
    info!(criterion = name, "Added screening criterion");
    review.create_commit(
        CommitRequest::new(ProcessType::Screen, format!("Screen: add criterion {}", name))
            .args(format!("--add_criterion '{}'", definition))
            .manual()
            .path(RECORDS_FILE)
            .path(SETTINGS_FILE),
    )
}

/// Drop a criterion and settle the records it kept open or excluded
pub fn delete_criterion(review: &mut ReviewManager, name: &str) -> Result<Option<String>> {
    if review.settings.screen.criteria.remove(name).is_none() {
        return Err(Error::Settings(format!("No screening criterion named {}", name)));
    }
    process::require_clean_repo(&review.git, &[])?;
    review.save_settings()?;

    let mut records = review.load_records()?;
    for record in records.values_mut() {
        let Some(value) = record.get(SCREENING_CRITERIA) else {
            continue;
        };
        let mut criteria = parse_criteria(value);
        if criteria.remove(name).is_none() {
            continue;
        }
        let before = record.status;
        if matches!(before, RecordState::RevExcluded | RecordState::PdfPrepared) {
            apply_decisions(record, &criteria);
        } else {
            record.set_raw(SCREENING_CRITERIA, format_criteria(&criteria));
        }
        if record.status != before {
            let line = format!("Screen {} after removing {}", record.status, name);
            review.report.record(&record.id.clone(), line);
        }
    }
    review.save_records(&records)?;
    info!(criterion = name, "Deleted screening criterion");
    review.create_commit(
        CommitRequest::new(ProcessType::Screen, format!("Screen: delete criterion {}", name))
            .args(format!("--delete_criterion {}", name))
            .manual()
            .path(RECORDS_FILE)
            .path(SETTINGS_FILE),
    )
}

// ============================================================================
// Exchange table
// ============================================================================

pub fn table_path(root: &Path, format: TableFormat) -> PathBuf {
    root.join(SCREEN_DIR).join(format!("screen.{}", format.extension()))
}

/// Write pending records with one decision column per criterion
///
/// Decisions already recorded (for example after a criterion was added)
/// are prefilled; open ones read `TODO`.
pub fn export_table(
    root: &Path,
    records: &Records,
    selected: &HashSet<String>,
    criteria: &[String],
    format: TableFormat,
) -> Result<PathBuf> {
    let mut table = Table::new(INFO_COLUMNS.iter().map(|c| c.to_string()).chain(criteria.iter().cloned()));
    for record in records
        .values()
        .filter(|r| r.status == RecordState::PdfPrepared)
        .filter(|r| selected.is_empty() || selected.contains(&r.id))
    {
        let decided = record.get(SCREENING_CRITERIA).map(parse_criteria).unwrap_or_default();
        let info = INFO_COLUMNS.iter().map(|column| match *column {
            "ID" => record.id.clone(),
            "container_title" => record.container_title(),
            field => record.get(field).unwrap_or_default().to_string(),
        });
        let decisions = criteria
            .iter()
            .map(|c| decided.get(c).cloned().unwrap_or_else(|| TODO.to_string()));
        table.push(info.chain(decisions));
    }
    let path = table_path(root, format);
    tables::write(&path, &table)?;
    info!(path = %path.display(), records = table.rows.len(), "Exported screening table");
    Ok(path)
}

/// Apply per-criterion decisions from an exchange table
///
/// Rows with any undecided criterion keep their record pending but store
/// the decisions made so far.
pub fn import_table(table: &Table, records: &mut Records, criteria: &[String]) -> Result<Vec<(String, String)>> {
    if let Some(missing) = criteria.iter().find(|c| table.column(c).is_none()) {
        return Err(Error::DataFile(format!("screening table lacks the {} column", missing)));
    }
    let mut lines = Vec::new();
    for row in &table.rows {
        let id = table.get(row, "ID");
        let Some(record) = records.get_mut(id) else {
            continue;
        };
        if record.status != RecordState::PdfPrepared {
            continue;
        }
        let decisions: BTreeMap<String, String> = criteria
            .iter()
            .map(|c| {
                let decision = match parse_decision(table.get(row, c)) {
                    Some(true) => "in",
                    Some(false) => "out",
                    None => TODO,
                };
                (c.clone(), decision.to_string())
            })
            .collect();
        if let Some(outcome) = apply_decisions(record, &decisions) {
            lines.push((id.to_string(), format!("Screen {} ({})", outcome, format_criteria(&decisions))));
        }
    }
    Ok(lines)
}

// ============================================================================
// Operation
// ============================================================================

fn include_all(records: &mut Records, selected: &HashSet<String>, criteria: &[String], how: &str) -> Vec<(String, String)> {
    let decisions: BTreeMap<String, String> = criteria.iter().map(|c| (c.clone(), "in".to_string())).collect();
    pending(records, selected)
        .map(|record| {
            apply_decisions(record, &decisions);
            (record.id.clone(), format!("Screen included ({})", how))
        })
        .collect()
}

fn args_of(options: &ScreenOptions) -> String {
    let mut args = Vec::new();
    if options.include_all {
        args.push("--include_all".to_string());
    }
    if let Some(path) = &options.import {
        args.push(format!("--import {}", path.display()));
    }
    if let Some(split) = &options.split {
        args.push(format!("--split {}", split));
    }
    args.join(" ")
}

/// `colrev screen`
pub fn run(review: &mut ReviewManager, options: ScreenOptions) -> Result<ScreenSummary> {
    let mut summary = ScreenSummary::default();
    if let Some(definition) = &options.add_criterion {
        summary.commit = add_criterion(review, definition)?;
        return Ok(summary);
    }
    if let Some(name) = &options.delete_criterion {
        summary.commit = delete_criterion(review, name)?;
        return Ok(summary);
    }

    review.check_precondition(ProcessType::Screen)?;
    let mut records = review.load_records()?;
    let criteria: Vec<String> = review.settings.screen.criteria.keys().cloned().collect();
    let selected = match &options.split {
        Some(split) => parse_split(&review.path, split)?,
        None => HashSet::new(),
    };

    if let Some(n) = options.create_split {
        let ids: Vec<String> = records
            .values()
            .filter(|r| r.status == RecordState::PdfPrepared)
            .map(|r| r.id.clone())
            .collect();
        std::fs::create_dir_all(review.path.join(SCREEN_DIR))?;
        for (i, split) in balanced_splits(&ids, n).into_iter().enumerate() {
            let path = review.path.join(SCREEN_DIR).join(format!("split_{}.txt", i + 1));
            std::fs::write(&path, split.join("\n") + "\n")?;
            summary.splits.push(path);
        }
        return Ok(summary);
    }
    if let Some(format) = options.export {
        summary.exported = Some(export_table(&review.path, &records, &selected, &criteria, format)?);
        return Ok(summary);
    }

    let (lines, manual) = if options.include_all {
        (include_all(&mut records, &selected, &criteria, "include_all"), false)
    } else if let Some(path) = &options.import {
        let table = tables::read(&resolve_path(&review.path, path))?;
        (import_table(&table, &mut records, &criteria)?, true)
    } else {
        let mut lines = Vec::new();
        for script in review.settings.screen.scripts.clone() {
            match script {
                ScreenScript::ConditionalScreen => {
                    lines.extend(include_all(&mut records, &selected, &criteria, "conditional"));
                }
                ScreenScript::TableScreen => {
                    if pending(&mut records, &selected).next().is_some() {
                        let path = export_table(&review.path, &records, &selected, &criteria, TableFormat::Csv)?;
                        info!(
                            path = %path.display(),
                            "Enter in/out per criterion, then run colrev screen --import {}",
                            path.display()
                        );
                        summary.exported = Some(path);
                    }
                }
            }
        }
        (lines, false)
    };

    let touched: HashSet<&str> = lines.iter().map(|(id, _)| id.as_str()).collect();
    for record in records.values().filter(|r| touched.contains(r.id.as_str())) {
        match record.status {
            RecordState::RevIncluded => summary.included += 1,
            RecordState::RevExcluded => summary.excluded += 1,
            _ => {}
        }
    }
    if lines.is_empty() {
        info!("No screening decisions to record");
        return Ok(summary);
    }
    for (id, line) in lines {
        review.report.record(&id, line);
    }
    info!(included = summary.included, excluded = summary.excluded, "Screen");
    review.save_records(&records)?;
    let mut request = CommitRequest::new(ProcessType::Screen, "Screen")
        .args(args_of(&options))
        .path(RECORDS_FILE);
    if manual {
        request = request.manual();
    }
    summary.commit = review.create_commit(request)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prepared(id: &str) -> Record {
        Record::new(id, "article")
            .with_field("title", "Digital platforms")
            .with_field("year", "2020")
            .with_status(RecordState::PdfPrepared)
    }

    fn records(list: Vec<Record>) -> Records {
        list.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[test]
    fn criteria_values() {
        let parsed = parse_criteria("scope=in;method=out");
        assert_eq!(parsed.get("method").map(String::as_str), Some("out"));
        assert_eq!(format_criteria(&parsed), "method=out;scope=in");
        assert_eq!(screen_outcome(&parsed), Some(RecordState::RevExcluded));
        assert_eq!(screen_outcome(&parse_criteria("scope=in;method=TODO")), None);
        assert_eq!(screen_outcome(&parse_criteria("NA")), Some(RecordState::RevIncluded));
        assert_eq!(format_criteria(&BTreeMap::new()), "NA");
    }

    #[test]
    fn include_all_marks_every_criterion_in() {
        let mut recs = records(vec![prepared("A2020"), prepared("B2020")]);
        let criteria = vec!["method".to_string(), "scope".to_string()];
        let lines = include_all(&mut recs, &HashSet::new(), &criteria, "include_all");
        assert_eq!(lines.len(), 2);
        assert_eq!(recs["A2020"].status, RecordState::RevIncluded);
        assert_eq!(recs["A2020"].get("screening_criteria"), Some("method=in;scope=in"));

        let mut recs = records(vec![prepared("C2020")]);
        include_all(&mut recs, &HashSet::new(), &[], "include_all");
        assert_eq!(recs["C2020"].get("screening_criteria"), Some("NA"));
    }

    #[test]
    fn table_decisions_per_criterion() {
        let dir = tempfile::tempdir().unwrap();
        let mut recs = records(vec![prepared("A2020"), prepared("B2020"), prepared("C2020")]);
        let criteria = vec!["method".to_string(), "scope".to_string()];
        let path = export_table(dir.path(), &recs, &HashSet::new(), &criteria, TableFormat::Csv).unwrap();
        assert!(path.ends_with("screen/screen.csv"));

        let mut table = tables::read(&path).unwrap();
        let (method, scope) = (table.column("method").unwrap(), table.column("scope").unwrap());
        table.rows[0][method] = "in".to_string();
        table.rows[0][scope] = "yes".to_string();
        table.rows[1][method] = "in".to_string();
        table.rows[1][scope] = "out".to_string();
        table.rows[2][method] = "in".to_string();

        let lines = import_table(&table, &mut recs, &criteria).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(recs["A2020"].status, RecordState::RevIncluded);
        assert_eq!(recs["B2020"].status, RecordState::RevExcluded);
        assert_eq!(recs["B2020"].get("screening_criteria"), Some("method=in;scope=out"));
        assert_eq!(recs["C2020"].status, RecordState::PdfPrepared);
        assert_eq!(recs["C2020"].get("screening_criteria"), Some("method=in;scope=TODO"));
    }
}
