//! Manual PDF preparation (`colrev pdf_prep_man`)
//!
//! `--extract` writes the records needing manual preparation to a BibTeX
//! file and an editable CSV. When a GROBID service is reachable, the CSV
//! also carries the header metadata GROBID reads from each PDF. `--apply`
//! reads the CSV back: corrected metadata is taken over and rows marked in
//! the `prepared` column move to `pdf_prepared`.

use super::document;
use super::hash::{self, PageHasher, PdftoppmHasher};
use crate::clients::GrobidClient;
use crate::commit::CommitRequest;
use crate::dataset::{bibtex, Records};
use crate::review_manager::ReviewManager;
use crate::tables::{self, Table};
use colrev_common::paths::{PDF_PREP_MAN_DIR, RECORDS_FILE};
use colrev_common::record::fields::FILE;
use colrev_common::{Error, ProcessType, Record, RecordState, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub const PDF_PREP_MAN_BIB: &str = "pdf_prep_man/records_pdf_prep_man.bib";
pub const PDF_PREP_MAN_CSV: &str = "pdf_prep_man/records_pdf_prep_man.csv";

/// Metadata columns the user may correct
const EDITABLE: [&str; 5] = ["author", "title", "year", "pages", "container_title"];
const COLUMNS: [&str; 11] = [
    "ID",
    "file",
    "author",
    "title",
    "year",
    "pages",
    "container_title",
    "hints",
    "grobid_author",
    "grobid_title",
    "prepared",
];

fn needs_preparation(records: &Records) -> impl Iterator<Item = &Record> {
    records
        .values()
        .filter(|r| r.status == RecordState::PdfNeedsManualPreparation)
}

/// Counts of `file` notes among records needing manual preparation
pub fn hint_statistics(records: &Records) -> BTreeMap<String, usize> {
    let mut stats = BTreeMap::new();
    for record in needs_preparation(records) {
        let notes = record
            .data_provenance
            .get(FILE)
            .map(|e| e.notes.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        for note in notes {
            *stats.entry(note).or_default() += 1;
        }
    }
    stats
}

/// Remove page 1 of the record's PDF; the page is kept in `coverpages_dir`
pub fn delete_first_page(root: &Path, coverpages_dir: &Path, record: &Record) -> Result<()> {
    let file = record
        .known(FILE)
        .ok_or_else(|| Error::RecordNotFound(format!("{}: no file", record.id)))?;
    let pdf = root.join(file);
    let name = pdf
        .file_name()
        .ok_or_else(|| Error::Internal(format!("no file name: {}", pdf.display())))?;
    std::fs::create_dir_all(coverpages_dir)?;
    document::write_only_pages(&pdf, &[1], &coverpages_dir.join(name))?;

    let scratch = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile_in(pdf.parent().unwrap_or(root))?;
    document::write_without_pages(&pdf, &[1], scratch.path())?;
    scratch
        .persist(&pdf)
        .map_err(|e| Error::Io(e.error))?;
    info!(id = %record.id, "Removed first page");
    Ok(())
}

/// Write the BibTeX and CSV files for manual preparation
///
/// `grobid` headers are fetched one PDF at a time; an unreachable service
/// leaves the GROBID columns empty.
pub async fn extract(root: &Path, records: &Records, grobid: Option<&GrobidClient>) -> Result<usize> {
    let pending: Vec<&Record> = needs_preparation(records).collect();
    std::fs::create_dir_all(root.join(PDF_PREP_MAN_DIR))?;
    std::fs::write(root.join(PDF_PREP_MAN_BIB), bibtex::write_records(pending.iter().copied()))?;

    let grobid = match grobid {
        Some(client) if client.is_alive().await => Some(client),
        Some(_) => {
            warn!("GROBID is not available, skipping PDF header extraction");
            None
        }
        None => None,
    };

    let mut table = Table::new(COLUMNS);
    for record in &pending {
        let mut grobid_record = None;
        if let (Some(client), Some(file)) = (grobid, record.known(FILE)) {
            match std::fs::read(root.join(file)) {
                Ok(bytes) => match client.process_header(&bytes).await {
                    Ok(header) => grobid_record = header,
                    Err(e) => debug!(id = %record.id, error = %e, "GROBID header extraction failed"),
                },
                Err(e) => debug!(id = %record.id, error = %e, "Cannot read PDF"),
            }
        }
        let hints = record
            .data_provenance
            .get(FILE)
            .map(|e| e.note_string())
            .unwrap_or_default();
        let grobid_field = |key: &str| {
            grobid_record
                .as_ref()
                .and_then(|r| r.get(key))
                .unwrap_or_default()
                .to_string()
        };
        table.push(COLUMNS.iter().map(|column| match *column {
            "ID" => record.id.clone(),
            "container_title" => record.container_title(),
            "hints" => hints.clone(),
            "grobid_author" => grobid_field("author"),
            "grobid_title" => grobid_field("title"),
            "prepared" => String::new(),
            field => record.get(field).unwrap_or_default().to_string(),
        }));
    }
    tables::write(&root.join(PDF_PREP_MAN_CSV), &table)?;
    info!(records = pending.len(), path = PDF_PREP_MAN_CSV, "Extracted records for manual PDF preparation");
    Ok(pending.len())
}

fn is_marked(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "yes" | "y" | "x" | "1" | "ok" | "true")
}

fn container_field(record: &Record) -> &'static str {
    match record.entry_type.as_str() {
        "inproceedings" | "incollection" => "booktitle",
        "book" | "inbook" => "publisher",
        _ => "journal",
    }
}

/// Apply an edited CSV
///
/// Returns the IDs moved to `pdf_prepared`.
pub fn apply(table: &Table, records: &mut Records, hasher: &dyn PageHasher, root: &Path) -> Vec<String> {
    let mut prepared = Vec::new();
    for row in &table.rows {
        let id = table.get(row, "ID");
        let Some(record) = records.get_mut(id) else {
            warn!(id = %id, "Record in the CSV not found");
            continue;
        };
        if record.status != RecordState::PdfNeedsManualPreparation {
            continue;
        }
        for column in EDITABLE {
            let value = table.get(row, column);
            if table.column(column).is_none() || value.is_empty() {
                continue;
            }
            let key = if column == "container_title" {
                container_field(record)
            } else {
                column
            };
            if record.get(key) != Some(value) {
                record.update_field(key, value, "manual", "");
            }
        }
        if !is_marked(table.get(row, "prepared")) {
            continue;
        }
        record.data_provenance.set(FILE, "manual", "");
        if let Some(file) = record.known(FILE) {
            match hash::colrev_pdf_id(hasher, &root.join(file)) {
                Ok(cpid) => record.colrev_pdf_id = Some(cpid),
                Err(e) => warn!(id = %record.id, error = %e, "Cannot compute colrev_pdf_id"),
            }
        }
        record.status = RecordState::PdfPrepared;
        prepared.push(record.id.clone());
    }
    prepared
}

#[derive(Debug, Clone, Default)]
pub struct PdfPrepManOptions {
    /// `-dfp ID`
    pub delete_first_page: Option<String>,
    pub extract: bool,
    pub apply: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfPrepManSummary {
    pub hints: BTreeMap<String, usize>,
    pub extracted: usize,
    pub prepared: Vec<String>,
    pub commit: Option<String>,
}

/// `colrev pdf_prep_man`
pub async fn run(review: &mut ReviewManager, options: PdfPrepManOptions) -> Result<PdfPrepManSummary> {
    review.check_precondition(ProcessType::PdfPrepMan)?;
    let mut records = review.load_records()?;
    let mut summary = PdfPrepManSummary {
        hints: hint_statistics(&records),
        ..PdfPrepManSummary::default()
    };

    if let Some(id) = &options.delete_first_page {
        let record = records
            .get(id)
            .ok_or_else(|| Error::RecordNotFound(id.clone()))?;
        delete_first_page(&review.path, &review.env.coverpages_dir(), record)?;
        return Ok(summary);
    }

    if options.extract {
        let grobid = GrobidClient::with_base_url(&review.providers.grobid)?;
        summary.extracted = extract(&review.path, &records, Some(&grobid)).await?;
        return Ok(summary);
    }

    if options.apply {
        let path = review.path.join(PDF_PREP_MAN_CSV);
        if !path.exists() {
            return Err(Error::DataFile(format!(
                "{} not found (run pdf_prep_man --extract first)",
                PDF_PREP_MAN_CSV
            )));
        }
        let table = tables::read(&path)?;
        summary.prepared = apply(&table, &mut records, &PdftoppmHasher::new(), &review.path);
        for id in &summary.prepared {
            review.report.record(id, "Prepared PDF (manual)");
        }
        review.save_records(&records)?;
        summary.commit = review.create_commit(
            CommitRequest::new(ProcessType::PdfPrepMan, "Prepare PDFs (manual)")
                .args("--apply")
                .manual()
                .path(RECORDS_FILE),
        )?;
    }
    Ok(summary)
}
