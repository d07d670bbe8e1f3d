//! Manual PDF retrieval (`colrev pdf_get_man`)
//!
//! `-e` exports the records still lacking a PDF so they can be retrieved by
//! hand. Without it, files the user placed in `pdfs/` are linked, and records
//! the user marked with `file = {NA}` become `pdf_not_available`.

use super::document;
use super::get::target_file;
use crate::commit::CommitRequest;
use crate::dataset::{bibtex, Records};
use crate::review_manager::ReviewManager;
use crate::tables::{self, Table};
use colrev_common::paths::{PDF_GET_MAN_DIR, RECORDS_FILE};
use colrev_common::record::fields::FILE;
use colrev_common::{ProcessType, Record, RecordState, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MISSING_PDF_FILES_CSV: &str = "pdf_get_man/missing_pdf_files.csv";
pub const MISSING_PDF_FILES_BIB: &str = "pdf_get_man/missing_pdf_files.bib";
/// Value of `file` marking a PDF that cannot be obtained
pub const NOT_AVAILABLE: &str = "NA";

/// Columns of the missing-PDF list
pub const EXPORT_COLUMNS: [&str; 7] = ["ID", "author", "title", "year", "container_title", "doi", "url"];

fn needs_retrieval(records: &Records) -> impl Iterator<Item = &Record> {
    records
        .values()
        .filter(|r| r.status == RecordState::PdfNeedsManualRetrieval)
}

/// Write the CSV and BibTeX lists of records without a PDF
///
/// Returns the number of exported records.
pub fn export(root: &Path, records: &Records) -> Result<usize> {
    let missing: Vec<&Record> = needs_retrieval(records).collect();
    std::fs::create_dir_all(root.join(PDF_GET_MAN_DIR))?;

    let mut table = Table::new(EXPORT_COLUMNS);
    for record in &missing {
        table.push(EXPORT_COLUMNS.iter().map(|column| match *column {
            "ID" => record.id.clone(),
            "container_title" => record.container_title(),
            field => record.get(field).unwrap_or_default().to_string(),
        }));
    }
    tables::write(&root.join(MISSING_PDF_FILES_CSV), &table)?;
    std::fs::write(
        root.join(MISSING_PDF_FILES_BIB),
        bibtex::write_records(missing.iter().copied()),
    )?;
    info!(records = missing.len(), path = MISSING_PDF_FILES_CSV, "Exported records without PDF");
    Ok(missing.len())
}

/// Outcome of re-checking one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recheck {
    Linked,
    NotAvailable,
    StillMissing,
}

/// Link a manually retrieved file or accept that none exists
pub fn recheck(root: &Path, record: &mut Record) -> Recheck {
    if record.get(FILE) == Some(NOT_AVAILABLE) {
        record.remove_field(FILE);
        record.data_provenance.add_note(FILE, "not_available");
        record.status = RecordState::PdfNotAvailable;
        return Recheck::NotAvailable;
    }

    let mut candidates: Vec<PathBuf> = record
        .known(FILE)
        .map(|f| root.join(f))
        .into_iter()
        .collect();
    candidates.push(root.join(target_file(&record.id)));
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        let valid = std::fs::read(&path).map(|b| document::is_pdf(&b)).unwrap_or(false);
        if !valid {
            warn!(id = %record.id, file = %path.display(), "File is not a PDF");
            continue;
        }
        let file = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        record.set_raw(FILE, file);
        record.data_provenance.set(FILE, "manual", "");
        record.status = RecordState::PdfImported;
        return Recheck::Linked;
    }
    Recheck::StillMissing
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfGetManSummary {
    pub exported: usize,
    pub linked: usize,
    pub not_available: usize,
    pub still_missing: usize,
    pub commit: Option<String>,
}

/// `colrev pdf_get_man`
pub fn run(review: &mut ReviewManager, export_only: bool) -> Result<PdfGetManSummary> {
    review.check_precondition(ProcessType::PdfGetMan)?;
    let mut records = review.load_records()?;
    let mut summary = PdfGetManSummary::default();

    if export_only {
        summary.exported = export(&review.path, &records)?;
        return Ok(summary);
    }

    for record in records
        .values_mut()
        .filter(|r| r.status == RecordState::PdfNeedsManualRetrieval)
    {
        match recheck(&review.path, record) {
            Recheck::Linked => {
                summary.linked += 1;
                review.report.record(&record.id, "Linked manually retrieved PDF");
            }
            Recheck::NotAvailable => {
                summary.not_available += 1;
                review.report.record(&record.id, "PDF not available");
            }
            Recheck::StillMissing => summary.still_missing += 1,
        }
    }
    info!(
        linked = summary.linked,
        not_available = summary.not_available,
        missing = summary.still_missing,
        "Manual PDF retrieval"
    );
    if summary.linked + summary.not_available > 0 {
        review.save_records(&records)?;
        summary.commit = review.create_commit(
            CommitRequest::new(ProcessType::PdfGetMan, "Retrieve PDFs (manual)")
                .manual()
                .path(RECORDS_FILE),
        )?;
    }
    Ok(summary)
}
