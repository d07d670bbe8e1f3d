//! `colrev prescreen`: title/abstract screening of `md_processed` records
//!
//! The configured endpoints run in order. `scope_prescreen` excludes
//! records outside the time, language or outlet scope (and includes the
//! rest when it is the only endpoint), `conditional_prescreen` includes
//! everything left, and `table_prescreen` hands the remaining decisions to
//! the user through `prescreen/prescreen.csv|xlsx`.

use super::{balanced_splits, parse_decision, parse_split, resolve_path};
use crate::commit::CommitRequest;
use crate::dataset::Records;
use crate::prep::exclusions::{normalize_language_code, prescreen_exclude};
use crate::review_manager::ReviewManager;
use crate::tables::{self, Table};
use colrev_common::paths::{PRESCREEN_DIR, RECORDS_FILE};
use colrev_common::record::fields::{LANGUAGE, PRESCREEN_EXCLUSION, TITLE, YEAR};
use colrev_common::settings::{PrescreenScript, TimeScope};
use colrev_common::{Error, ProcessType, Record, RecordState, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Decision column of the exchange table
pub const INCLUSION_COLUMN: &str = "inclusion";
const TABLE_COLUMNS: [&str; 7] = ["ID", "author", "title", "container_title", "year", "abstract", INCLUSION_COLUMN];

/// Titles of issue front matter and similar non-papers
const COMPLEMENTARY_MATERIALS: [&str; 12] = [
    "editorial board",
    "front matter",
    "back matter",
    "table of contents",
    "contents",
    "cover",
    "index",
    "erratum",
    "masthead",
    "issue information",
    "reviewer acknowledgment",
    "call for papers",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Xlsx,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Xlsx => "xlsx",
        }
    }
}

impl std::str::FromStr for TableFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(TableFormat::Csv),
            "xlsx" => Ok(TableFormat::Xlsx),
            other => Err(Error::Settings(format!("Unknown table format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrescreenOptions {
    pub include_all: bool,
    pub export: Option<TableFormat>,
    pub import: Option<PathBuf>,
    pub create_split: Option<usize>,
    /// Restrict to these IDs (file or comma-separated list)
    pub split: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrescreenSummary {
    pub included: usize,
    pub excluded: usize,
    pub exported: Option<PathBuf>,
    pub splits: Vec<PathBuf>,
    pub commit: Option<String>,
}

// ============================================================================
// Scope rules
// ============================================================================

/// Reasons why `record` falls outside the configured scope
pub fn scope_exclusion_reasons(
    record: &Record,
    timescope: Option<&TimeScope>,
    language_scope: &[String],
    exclude_complementary_materials: bool,
    outlet_exclusion: &[String],
) -> Vec<String> {
    let mut reasons = Vec::new();
    if let Some(scope) = timescope {
        let year = record.get(YEAR).and_then(|y| y.trim().parse::<u32>().ok());
        if let Some(from) = scope.from {
            if year.unwrap_or(0) < from {
                reasons.push(format!("not in TimeScopeFrom (>{})", from));
            }
        }
        if let Some(to) = scope.to {
            if year.unwrap_or(u32::MAX) > to {
                reasons.push(format!("not in TimeScopeTo (<{})", to));
            }
        }
    }
    if !language_scope.is_empty() {
        if let Some(language) = record.get(LANGUAGE).map(normalize_language_code) {
            if !language_scope.iter().any(|l| normalize_language_code(l) == language) {
                reasons.push(format!("language {} not in LanguageScope", language));
            }
        }
    }
    if exclude_complementary_materials {
        let title = record.get(TITLE).unwrap_or("").trim().to_lowercase();
        if COMPLEMENTARY_MATERIALS.contains(&title.as_str()) {
            reasons.push("complementary material".to_string());
        }
    }
    let container = record.container_title().to_lowercase();
    if !container.is_empty() && outlet_exclusion.iter().any(|o| o.to_lowercase() == container) {
        reasons.push("in OutletExclusionScope".to_string());
    }
    reasons
}

fn include(record: &mut Record) {
    record.status = RecordState::RevPrescreenIncluded;
}

/// Run the automated endpoints on the pending records
///
/// Returns `(id, report line)` pairs and whether a table endpoint asks for
/// manual decisions on what is left.
fn run_endpoints(
    records: &mut Records,
    selected: &HashSet<String>,
    scripts: &[PrescreenScript],
) -> (Vec<(String, String)>, bool) {
    let mut lines = Vec::new();
    let mut needs_table = false;
    let only_script = scripts.len() == 1;
    for script in scripts {
        let pending = records
            .values_mut()
            .filter(|r| r.status == RecordState::MdProcessed)
            .filter(|r| selected.is_empty() || selected.contains(&r.id));
        match script {
            PrescreenScript::ScopePrescreen {
                timescope,
                language_scope,
                exclude_complementary_materials,
                outlet_exclusion,
            } => {
                for record in pending {
                    let reasons = scope_exclusion_reasons(
                        record,
                        timescope.as_ref(),
                        language_scope,
                        *exclude_complementary_materials,
                        outlet_exclusion,
                    );
                    if !reasons.is_empty() {
                        prescreen_exclude(record, &reasons.join(";"));
                        lines.push((record.id.clone(), format!("Prescreen excluded ({})", reasons.join(", "))));
                    } else if only_script {
                        include(record);
                        lines.push((record.id.clone(), "Prescreen included (automatically)".to_string()));
                    }
                }
            }
            PrescreenScript::ConditionalPrescreen => {
                for record in pending {
                    include(record);
                    lines.push((record.id.clone(), "Prescreen included (conditional)".to_string()));
                }
            }
            PrescreenScript::TablePrescreen => {
                needs_table |= pending.count() > 0;
            }
        }
    }
    (lines, needs_table)
}

// ============================================================================
// Exchange table
// ============================================================================

pub fn table_path(root: &Path, format: TableFormat) -> PathBuf {
    root.join(PRESCREEN_DIR).join(format!("prescreen.{}", format.extension()))
}

/// Write the pending records with an empty decision column
pub fn export_table(root: &Path, records: &Records, selected: &HashSet<String>, format: TableFormat) -> Result<PathBuf> {
    let mut table = Table::new(TABLE_COLUMNS);
    for record in records
        .values()
        .filter(|r| r.status == RecordState::MdProcessed)
        .filter(|r| selected.is_empty() || selected.contains(&r.id))
    {
        table.push(TABLE_COLUMNS.iter().map(|column| match *column {
            "ID" => record.id.clone(),
            "container_title" => record.container_title(),
            INCLUSION_COLUMN => "TODO".to_string(),
            field => record.get(field).unwrap_or_default().to_string(),
        }));
    }
    let path = table_path(root, format);
    tables::write(&path, &table)?;
    info!(path = %path.display(), records = table.rows.len(), "Exported prescreen table");
    Ok(path)
}

/// Apply the yes/no decisions of an exchange table
///
/// Decided records already past the prescreen keep their state unless the
/// decision reverses an exclusion.
pub fn import_table(table: &Table, records: &mut Records) -> Result<Vec<(String, String)>> {
    if table.column(INCLUSION_COLUMN).is_none() {
        return Err(Error::DataFile(format!("prescreen table lacks the {} column", INCLUSION_COLUMN)));
    }
    let mut lines = Vec::new();
    for row in &table.rows {
        let id = table.get(row, "ID");
        let Some(record) = records.get_mut(id) else {
            continue;
        };
        let Some(decision) = parse_decision(table.get(row, INCLUSION_COLUMN)) else {
            continue;
        };
        let prescreened = matches!(
            record.status,
            RecordState::MdProcessed | RecordState::RevPrescreenExcluded | RecordState::RevPrescreenIncluded
        );
        if !prescreened {
            continue;
        }
        if decision && record.status != RecordState::RevPrescreenIncluded {
            record.remove_field(PRESCREEN_EXCLUSION);
            include(record);
            lines.push((id.to_string(), "Prescreen included (manual)".to_string()));
        } else if !decision && record.status != RecordState::RevPrescreenExcluded {
            prescreen_exclude(record, "manual");
            lines.push((id.to_string(), "Prescreen excluded (manual)".to_string()));
        }
    }
    Ok(lines)
}

// ============================================================================
// Operation
// ============================================================================

fn args_of(options: &PrescreenOptions) -> String {
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

fn count(records: &Records, touched: &[(String, String)], state: RecordState) -> usize {
    let ids: HashSet<&str> = touched.iter().map(|(id, _)| id.as_str()).collect();
    records
        .values()
        .filter(|r| ids.contains(r.id.as_str()) && r.status == state)
        .count()
}

/// `colrev prescreen`
pub fn run(review: &mut ReviewManager, options: PrescreenOptions) -> Result<PrescreenSummary> {
    review.check_precondition(ProcessType::Prescreen)?;
    let mut records = review.load_records()?;
    let selected = match &options.split {
        Some(split) => parse_split(&review.path, split)?,
        None => HashSet::new(),
    };
    let mut summary = PrescreenSummary::default();

    if let Some(n) = options.create_split {
        let pending: Vec<String> = records
            .values()
            .filter(|r| r.status == RecordState::MdProcessed)
            .map(|r| r.id.clone())
            .collect();
        std::fs::create_dir_all(review.path.join(PRESCREEN_DIR))?;
        for (i, split) in balanced_splits(&pending, n).into_iter().enumerate() {
            let path = review.path.join(PRESCREEN_DIR).join(format!("split_{}.txt", i + 1));
            std::fs::write(&path, split.join("\n") + "\n")?;
            info!(path = %path.display(), records = split.len(), "Created prescreen split");
            summary.splits.push(path);
        }
        return Ok(summary);
    }

    if let Some(format) = options.export {
        summary.exported = Some(export_table(&review.path, &records, &selected, format)?);
        return Ok(summary);
    }

    let (lines, manual, message) = if options.include_all {
        let mut lines = Vec::new();
        for record in records
            .values_mut()
            .filter(|r| r.status == RecordState::MdProcessed)
            .filter(|r| selected.is_empty() || selected.contains(&r.id))
        {
            include(record);
            lines.push((record.id.clone(), "Prescreen included (include_all)".to_string()));
        }
        (lines, false, "Prescreen: include all")
    } else if let Some(path) = &options.import {
        let table = tables::read(&resolve_path(&review.path, path))?;
        (import_table(&table, &mut records)?, true, "Prescreen (table)")
    } else {
        let scripts = review.settings.prescreen.scripts.clone();
        let (lines, needs_table) = run_endpoints(&mut records, &selected, &scripts);
        if needs_table {
            let path = export_table(&review.path, &records, &selected, TableFormat::Csv)?;
            info!(
                path = %path.display(),
                "Enter yes/no in the {} column, then run colrev prescreen --import {}",
                INCLUSION_COLUMN,
                path.display()
            );
            summary.exported = Some(path);
        }
        (lines, false, "Prescreen")
    };

    summary.included = count(&records, &lines, RecordState::RevPrescreenIncluded);
    summary.excluded = count(&records, &lines, RecordState::RevPrescreenExcluded);
    if lines.is_empty() {
        info!("No prescreen decisions to record");
        return Ok(summary);
    }
    for (id, line) in lines {
        review.report.record(&id, line);
    }
    info!(included = summary.included, excluded = summary.excluded, "Prescreen");
    review.save_records(&records)?;
    let mut request = CommitRequest::new(ProcessType::Prescreen, message)
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

    fn processed(id: &str, year: &str, title: &str) -> Record {
        Record::new(id, "article")
            .with_field("author", "Smith, J.")
            .with_field("title", title)
            .with_field("journal", "MIS Quarterly")
            .with_field("year", year)
            .with_status(RecordState::MdProcessed)
    }

    fn records(list: Vec<Record>) -> Records {
        list.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[test]
    fn scope_rules() {
        let scope = TimeScope { from: Some(2000), to: Some(2020) };
        let old = processed("Old1990", "1990", "Digital platforms");
        assert_eq!(
            scope_exclusion_reasons(&old, Some(&scope), &[], false, &[]),
            vec!["not in TimeScopeFrom (>2000)".to_string()]
        );
        let front = processed("Front2010", "2010", "Editorial Board");
        assert_eq!(
            scope_exclusion_reasons(&front, Some(&scope), &[], true, &[]),
            vec!["complementary material".to_string()]
        );
        let german = processed("De2010", "2010", "Plattformen").with_field("language", "German");
        assert_eq!(scope_exclusion_reasons(&german, None, &["en".to_string()], false, &[]).len(), 1);
        let outlet = processed("Out2010", "2010", "Platforms");
        assert_eq!(
            scope_exclusion_reasons(&outlet, None, &[], false, &["mis quarterly".to_string()]),
            vec!["in OutletExclusionScope".to_string()]
        );
    }

    #[test]
    fn single_scope_endpoint_decides_everything() {
        let mut recs = records(vec![
            processed("Old1990", "1990", "Digital platforms"),
            processed("New2010", "2010", "Digital platforms"),
        ]);
        let scripts = vec![PrescreenScript::ScopePrescreen {
            timescope: Some(TimeScope { from: Some(2000), to: None }),
            language_scope: vec![],
            exclude_complementary_materials: true,
            outlet_exclusion: vec![],
        }];
        let (lines, needs_table) = run_endpoints(&mut recs, &HashSet::new(), &scripts);
        assert_eq!(lines.len(), 2);
        assert!(!needs_table);
        assert_eq!(recs["Old1990"].status, RecordState::RevPrescreenExcluded);
        assert_eq!(recs["Old1990"].get("prescreen_exclusion"), Some("not in TimeScopeFrom (>2000)"));
        assert_eq!(recs["New2010"].status, RecordState::RevPrescreenIncluded);
    }

    #[test]
    fn table_round_trip_applies_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let mut recs = records(vec![
            processed("A2010", "2010", "Platforms"),
            processed("B2011", "2011", "Ecosystems"),
            processed("C2012", "2012", "Markets"),
        ]);
        let selected: HashSet<String> = ["A2010", "B2011", "C2012"].iter().map(|s| s.to_string()).collect();
        let path = export_table(dir.path(), &recs, &selected, TableFormat::Csv).unwrap();

        let mut table = tables::read(&path).unwrap();
        assert_eq!(table.rows.len(), 3);
        let col = table.column(INCLUSION_COLUMN).unwrap();
        table.rows[0][col] = "yes".to_string();
        table.rows[1][col] = "no".to_string();

        let lines = import_table(&table, &mut recs).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(recs["A2010"].status, RecordState::RevPrescreenIncluded);
        assert_eq!(recs["B2011"].status, RecordState::RevPrescreenExcluded);
        assert_eq!(recs["C2012"].status, RecordState::MdProcessed);
    }
}
