//! `colrev data`: extraction and synthesis endpoints
//!
//! Each endpoint keeps its own view of which included records are
//! synthesized. A record moves to `rev_synthesized` once every configured
//! endpoint reports it.

use crate::commit::CommitRequest;
use crate::dataset::Records;
use crate::process;
use crate::review_manager::ReviewManager;
use crate::tables::{self, Table};
use colrev_common::paths::{DATA_DIR, DATA_FILE, PAPER_FILE, RECORDS_FILE, SETTINGS_FILE};
use colrev_common::settings::{DataField, DataScript};
use colrev_common::{Error, ProcessType, RecordState, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TODO: &str = "TODO";
/// Heading of the list of records not yet cited in the manuscript
pub const NEW_RECORD_SOURCE: &str = "<!-- NEW_RECORD_SOURCE -->_Records to synthesize_:";

#[derive(Debug, Clone, Default)]
pub struct DataOptions {
    pub profile: bool,
    pub add_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSummary {
    pub synthesized: usize,
    pub profile: Option<PathBuf>,
    pub commit: Option<String>,
}

fn in_synthesis(state: RecordState) -> bool {
    matches!(state, RecordState::RevIncluded | RecordState::RevSynthesized)
}

// ============================================================================
// Structured endpoint (data.csv)
// ============================================================================

/// Bring `data.csv` up to date with the included records and fields
///
/// Returns the IDs whose row has no `TODO` cell left.
pub fn update_structured(root: &Path, fields: &[DataField], included: &[String]) -> Result<HashSet<String>> {
    let path = root.join(DATA_FILE);
    let mut table = if path.exists() {
        tables::read_csv(&path)?
    } else {
        Table::new(["ID"])
    };
    if table.column("ID").is_none() {
        return Err(Error::DataFile(format!("{} lacks the ID column", DATA_FILE)));
    }
    for field in fields {
        if table.column(&field.name).is_none() {
            table.headers.push(field.name.clone());
            for row in &mut table.rows {
                row.push(TODO.to_string());
            }
            debug!(field = %field.name, "Added data field");
        }
    }
    let present: HashSet<String> = table.rows.iter().map(|r| table.get(r, "ID").to_string()).collect();
    for id in included.iter().filter(|id| !present.contains(*id)) {
        let row: Vec<String> = table
            .headers
            .iter()
            .map(|h| if h == "ID" { id.clone() } else { TODO.to_string() })
            .collect();
        table.push(row);
    }
    tables::write_csv(&path, &table)?;

    Ok(table
        .rows
        .iter()
        .filter(|row| !row.iter().any(|cell| cell.trim() == TODO))
        .map(|row| table.get(row, "ID").to_string())
        .collect())
}

// ============================================================================
// Manuscript endpoint (paper.md)
// ============================================================================

fn paper_template(title: &str) -> String {
    format!(
        "---\ntitle: \"{}\"\nbibliography: {}\n---\n\n# Introduction\n\n# Methods\n\n# Results\n\n# Discussion\n\n# References\n\n{}\n\n",
        title, RECORDS_FILE, NEW_RECORD_SOURCE
    )
}

fn cited(text: &str) -> HashSet<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, '[' | ']' | ';' | ',' | '(' | ')'))
        .filter_map(|token| token.strip_prefix('@'))
        .map(|id| id.trim_end_matches(['.', ':']).to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Add uncited records to the to-synthesize list of `paper.md`
///
/// Records cited above the list count as synthesized.
pub fn update_manuscript(root: &Path, title: &str, included: &[String]) -> Result<HashSet<String>> {
    let path = root.join(PAPER_FILE);
    let mut text = if path.exists() {
        std::fs::read_to_string(&path)?
    } else {
        info!(path = %path.display(), "Created manuscript");
        paper_template(title)
    };
    if !text.contains(NEW_RECORD_SOURCE) {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!("\n{}\n\n", NEW_RECORD_SOURCE));
    }
    let (body, list) = text.split_once(NEW_RECORD_SOURCE).unwrap_or((text.as_str(), ""));
    let in_body = cited(body);
    let mut in_list = cited(list);

    let mut additions = String::new();
    for id in included.iter() {
        if in_body.contains(id) || in_list.contains(id) {
            continue;
        }
        additions.push_str(&format!("- @{}\n", id));
        in_list.insert(id.clone());
    }
    if !additions.is_empty() {
        let (body, list) = text.split_once(NEW_RECORD_SOURCE).unwrap_or((text.as_str(), ""));
        let list = list.trim_start_matches('\n');
        let updated = format!("{}{}\n\n{}{}", body, NEW_RECORD_SOURCE, additions, list);
        std::fs::write(&path, updated)?;
    } else if !path.exists() {
        std::fs::write(&path, &text)?;
    }

    Ok(in_body.into_iter().filter(|id| !in_list.contains(id)).collect())
}

// ============================================================================
// Profile
// ============================================================================

/// Outlet and year counts of the included sample
pub fn sample_profile(records: &Records) -> Table {
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for record in records.values().filter(|r| in_synthesis(r.status)) {
        let year = record.get("year").unwrap_or("NA").to_string();
        *counts.entry((record.container_title(), year)).or_insert(0) += 1;
    }
    let mut table = Table::new(["outlet", "year", "count"]);
    for ((outlet, year), count) in counts {
        table.push([outlet, year, count.to_string()]);
    }
    table
}

// ============================================================================
// Operation
// ============================================================================

/// Register a data endpoint by tag (`structured` or `manuscript`)
pub fn add_endpoint(review: &mut ReviewManager, tag: &str) -> Result<Option<String>> {
    let endpoint = DataScript::from_tag(tag)?;
    if review.settings.data.scripts.iter().any(|s| s.tag() == endpoint.tag()) {
        return Err(Error::Settings(format!("Data endpoint {} is already configured", tag)));
    }
    process::require_clean_repo(&review.git, &[PAPER_FILE])?;
    review.settings.data.scripts.push(endpoint);
    review.save_settings()?;
    info!(endpoint = tag, "Added data endpoint");
    review.create_commit(
        CommitRequest::new(ProcessType::Data, format!("Add data endpoint {}", tag))
            .args(format!("--add_endpoint {}", tag))
            .manual()
            .path(SETTINGS_FILE),
    )
}

/// `colrev data`
pub fn run(review: &mut ReviewManager, options: DataOptions) -> Result<DataSummary> {
    let mut summary = DataSummary::default();
    if let Some(tag) = &options.add_endpoint {
        summary.commit = add_endpoint(review, tag)?;
        return Ok(summary);
    }

    review.check_precondition(ProcessType::Data)?;
    let mut records = review.load_records()?;

    if options.profile {
        let path = review.path.join(DATA_DIR).join("sample_profile.csv");
        tables::write(&path, &sample_profile(&records))?;
        info!(path = %path.display(), "Wrote sample profile");
        summary.profile = Some(path);
        return Ok(summary);
    }

    let scripts = review.settings.data.scripts.clone();
    if scripts.is_empty() {
        info!("No data endpoints configured, add one with colrev data --add_endpoint structured");
        return Ok(summary);
    }
    let included: Vec<String> = records
        .values()
        .filter(|r| in_synthesis(r.status))
        .map(|r| r.id.clone())
        .collect();

    let mut paths = vec![RECORDS_FILE.to_string()];
    let mut reported: Option<HashSet<String>> = None;
    for script in &scripts {
        review.check_cancelled()?;
        let synthesized = match script {
            DataScript::Structured { fields } => {
                paths.push(DATA_FILE.to_string());
                update_structured(&review.path, fields, &included)?
            }
            DataScript::Manuscript { .. } => {
                paths.push(PAPER_FILE.to_string());
                update_manuscript(&review.path, &review.settings.project.title, &included)?
            }
        };
        debug!(endpoint = script.tag(), synthesized = synthesized.len(), "Data endpoint");
        reported = Some(match reported {
            None => synthesized,
            Some(previous) => previous.intersection(&synthesized).cloned().collect(),
        });
    }

    let synthesized = reported.unwrap_or_default();
    for record in records
        .values_mut()
        .filter(|r| r.status == RecordState::RevIncluded && synthesized.contains(&r.id))
    {
        record.status = RecordState::RevSynthesized;
        summary.synthesized += 1;
        review.report.record(&record.id, "Synthesized");
    }
    info!(
        included = included.len(),
        synthesized = summary.synthesized,
        "Updated data endpoints"
    );

    review.save_records(&records)?;
    let mut request = CommitRequest::new(ProcessType::Data, "Data and synthesis").manual();
    for path in paths {
        request = request.path(path);
    }
    summary.commit = review.create_commit(request)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colrev_common::Record;
    use pretty_assertions::assert_eq;

    fn field(name: &str) -> DataField {
        DataField {
            name: name.to_string(),
            explanation: String::new(),
            data_type: "str".to_string(),
        }
    }

    #[test]
    fn structured_rows_complete_without_todo() {
        let dir = tempfile::tempdir().unwrap();
        let ids = vec!["A2020".to_string(), "B2021".to_string()];
        let done = update_structured(dir.path(), &[field("summary")], &ids).unwrap();
        assert!(done.is_empty());

        let path = dir.path().join("data.csv");
        let mut table = tables::read_csv(&path).unwrap();
        assert_eq!(table.headers, vec!["ID", "summary"]);
        let col = table.column("summary").unwrap();
        table.rows[0][col] = "Platforms scale".to_string();
        tables::write_csv(&path, &table).unwrap();

        let done = update_structured(dir.path(), &[field("summary")], &ids).unwrap();
        assert_eq!(done, HashSet::from(["A2020".to_string()]));

        // a new field reopens every row
        let done = update_structured(dir.path(), &[field("summary"), field("method")], &ids).unwrap();
        assert!(done.is_empty());
    }

    #[test]
    fn manuscript_lists_uncited_records() {
        let dir = tempfile::tempdir().unwrap();
        let ids = vec!["A2020".to_string(), "B2021".to_string()];
        let done = update_manuscript(dir.path(), "Platforms", &ids).unwrap();
        assert!(done.is_empty());
        let text = std::fs::read_to_string(dir.path().join("paper.md")).unwrap();
        assert!(text.contains("- @A2020\n- @B2021\n"));

        let text = text
            .replace("# Results\n", "# Results\n\nPlatforms scale [@A2020].\n")
            .replace("- @A2020\n", "");
        std::fs::write(dir.path().join("paper.md"), text).unwrap();
        let done = update_manuscript(dir.path(), "Platforms", &ids).unwrap();
        assert_eq!(done, HashSet::from(["A2020".to_string()]));
        let text = std::fs::read_to_string(dir.path().join("paper.md")).unwrap();
        assert_eq!(text.matches("@B2021").count(), 1);
    }

    #[test]
    fn profile_counts_outlets_and_years() {
        let records: Records = [
            Record::new("A", "article")
                .with_field("journal", "MISQ")
                .with_field("year", "2020")
                .with_status(RecordState::RevIncluded),
            Record::new("B", "article")
                .with_field("journal", "MISQ")
                .with_field("year", "2020")
                .with_status(RecordState::RevSynthesized),
            Record::new("C", "article")
                .with_field("journal", "ISR")
                .with_field("year", "2019")
                .with_status(RecordState::RevExcluded),
        ]
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();
        let table = sample_profile(&records);
        assert_eq!(table.rows, vec![vec!["MISQ".to_string(), "2020".to_string(), "2".to_string()]]);
    }
}
