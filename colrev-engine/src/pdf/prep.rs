//! PDF preparation (`colrev pdf_prep`)
//!
//! # Architecture
//! - **Steps** (`pdf_prep.scripts`): OCR check, cover-page removal,
//!   last-page removal, metadata validation and completeness validation.
//!   Each step is blocking work run in `spawn_blocking` under the configured
//!   timeout; a failing step demotes the record to
//!   `pdf_needs_manual_preparation` with a note on its `file` provenance.
//! - **Finalization**: records passing every step get their `colrev_pdf_id`.
//!   When a step replaced the file, the result becomes `pdfs/<ID>.pdf` and
//!   the original is kept as `<ID>_backup.pdf`.

use super::completeness;
use super::document;
use super::hash::{self, PageHasher, PdftoppmHasher};
use super::ocr::{DockerOcr, OcrEngine};
use super::pages;
use super::validation;
use crate::commit::CommitRequest;
use crate::language::english_confidence;
use crate::review_manager::ReviewManager;
use colrev_common::paths::{PDF_DIR, RECORDS_FILE};
use colrev_common::record::fields::FILE;
use colrev_common::settings::PdfPrepScript;
use colrev_common::{Error, ProcessType, Record, RecordState, Result};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A page counts as English above this confidence
pub const ENGLISH_CONFIDENCE: f64 = 0.85;
/// Pages checked by the OCR step
const OCR_CHECK_PAGES: usize = 3;

/// Everything a step may consult (shared with the blocking workers)
pub struct PdfPrepContext {
    pub root: PathBuf,
    pub coverpages_dir: PathBuf,
    pub lastpages_dir: PathBuf,
    pub hasher: Arc<dyn PageHasher>,
    pub ocr: Arc<dyn OcrEngine>,
    pub scripts: Vec<PdfPrepScript>,
    pub timeout: Duration,
}

impl PdfPrepContext {
    /// Context with the system tools (`pdftoppm`, docker)
    pub fn for_review(review: &ReviewManager) -> Self {
        Self {
            root: review.path.clone(),
            coverpages_dir: review.env.coverpages_dir(),
            lastpages_dir: review.env.lastpages_dir(),
            hasher: Arc::new(PdftoppmHasher::new()),
            ocr: Arc::new(DockerOcr::new()),
            scripts: review.settings.pdf_prep.scripts.clone(),
            timeout: Duration::from_secs(review.settings.pdf_prep.timeout_secs),
        }
    }

    fn file_path(&self, record: &Record) -> Result<PathBuf> {
        let file = record
            .known(FILE)
            .ok_or_else(|| Error::RecordNotFound(format!("{}: no file", record.id)))?;
        Ok(self.root.join(file))
    }

    /// Repository-relative form of `path` (absolute outside the repository)
    fn file_value(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// A record after preparation, with its report lines
#[derive(Debug, Clone)]
pub struct PdfPrepOutcome {
    pub record: Record,
    pub lines: Vec<String>,
}

fn demote(record: &mut Record, note: &str) {
    record.data_provenance.add_note(FILE, note);
    record.status = RecordState::PdfNeedsManualPreparation;
}

fn note_for(error: &Error) -> &'static str {
    match error {
        Error::MissingDependency(_) => "missing_dependency",
        Error::Timeout { .. } => "pdf_prep_timeout",
        Error::InvalidPdf { .. } => "pdf_invalid",
        _ => "pdf_prep_error",
    }
}

// ============================================================================
// Steps
// ============================================================================

fn check_ocr(ctx: &PdfPrepContext, record: &mut Record, lines: &mut Vec<String>) -> Result<()> {
    let is_english = |path: &Path| -> Result<bool> {
        let texts = document::page_texts(path)?;
        Ok(texts
            .iter()
            .take(OCR_CHECK_PAGES)
            .any(|t| english_confidence(t) > ENGLISH_CONFIDENCE))
    };
    let path = ctx.file_path(record)?;
    if is_english(&path)? {
        return Ok(());
    }

    let ocr_path = pages::with_suffix(&path, "_ocr");
    ctx.ocr.ocr(&path, &ocr_path)?;
    record.set_raw(FILE, ctx.file_value(&ocr_path));
    lines.push("Applied OCR".to_string());
    if !is_english(&ocr_path)? {
        demote(record, "pdf_language_not_english");
        lines.push("Language of the PDF is not English".to_string());
    }
    Ok(())
}

fn remove_coverpage(ctx: &PdfPrepContext, record: &mut Record, lines: &mut Vec<String>) -> Result<()> {
    let path = ctx.file_path(record)?;
    let cover = pages::detect_cover_pages(ctx.hasher.as_ref(), &path)?;
    if cover.is_empty() {
        return Ok(());
    }
    let trimmed = pages::split_off_pages(&path, &cover, "_wo_cp", &ctx.coverpages_dir)?;
    record.set_raw(FILE, ctx.file_value(&trimmed));
    lines.push(format!("Removed cover page(s) {:?}", cover));
    Ok(())
}

fn remove_last_page(ctx: &PdfPrepContext, record: &mut Record, lines: &mut Vec<String>) -> Result<()> {
    let path = ctx.file_path(record)?;
    let Some(last) = pages::detect_last_page(ctx.hasher.as_ref(), &path)? else {
        return Ok(());
    };
    let trimmed = pages::split_off_pages(&path, &[last], "_wo_lp", &ctx.lastpages_dir)?;
    record.set_raw(FILE, ctx.file_value(&trimmed));
    lines.push(format!("Removed last page {}", last));
    Ok(())
}

fn validate_metadata(
    ctx: &PdfPrepContext,
    record: &mut Record,
    lines: &mut Vec<String>,
    indexed_pdf_id: Option<&str>,
) -> Result<()> {
    let path = ctx.file_path(record)?;
    if let Some(indexed) = indexed_pdf_id {
        match hash::colrev_pdf_id(ctx.hasher.as_ref(), &path) {
            Ok(cpid) if cpid == indexed => {
                debug!(id = %record.id, "PDF validated by the local index");
                return Ok(());
            }
            Ok(_) => debug!(id = %record.id, "colrev_pdf_id differs from the local index"),
            Err(e) => debug!(id = %record.id, error = %e, "Cannot hash PDF for index validation"),
        }
    }
    let text = document::first_pages_text(&path, validation::VALIDATION_PAGES)?;
    let hints = validation::metadata_hints(&text, record);
    if !hints.is_empty() {
        lines.push(format!("PDF does not match the metadata ({})", hints.join(",")));
        for hint in hints {
            demote(record, hint);
        }
    }
    Ok(())
}

fn validate_completeness(ctx: &PdfPrepContext, record: &mut Record, lines: &mut Vec<String>) -> Result<()> {
    let path = ctx.file_path(record)?;
    let texts = document::page_texts(&path)?;
    let first = texts.iter().take(2).cloned().collect::<Vec<_>>().join("\n");
    let last = texts
        .iter()
        .skip(texts.len().saturating_sub(3))
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    let pages_in_file = document::page_count(&path)?;
    let verdict = completeness::check(&first, &last, pages_in_file, record.known("pages"));
    if let Some(note) = verdict.note() {
        lines.push(format!("Completeness check failed: {:?}", verdict));
        demote(record, note);
    }
    Ok(())
}

fn run_step(
    ctx: &PdfPrepContext,
    script: &PdfPrepScript,
    record: &mut Record,
    lines: &mut Vec<String>,
    indexed_pdf_id: Option<&str>,
) -> Result<()> {
    match script {
        PdfPrepScript::PdfCheckOcr => check_ocr(ctx, record, lines),
        PdfPrepScript::RemoveCoverpage => remove_coverpage(ctx, record, lines),
        PdfPrepScript::RemoveLastPage => remove_last_page(ctx, record, lines),
        PdfPrepScript::ValidatePdfMetadata => validate_metadata(ctx, record, lines, indexed_pdf_id),
        PdfPrepScript::ValidateCompleteness => validate_completeness(ctx, record, lines),
    }
}

/// Run one step on the blocking pool under the timeout
async fn run_step_with_timeout(
    ctx: Arc<PdfPrepContext>,
    script: PdfPrepScript,
    record: Record,
    indexed_pdf_id: Option<String>,
) -> (Record, Vec<String>) {
    let fallback = record.clone();
    let timeout = ctx.timeout;
    let task = tokio::task::spawn_blocking(move || {
        let mut record = record;
        let mut lines = Vec::new();
        let result = run_step(&ctx, &script, &mut record, &mut lines, indexed_pdf_id.as_deref());
        (record, lines, result)
    });

    let error = match tokio::time::timeout(timeout, task).await {
        Ok(Ok((record, lines, Ok(())))) => return (record, lines),
        Ok(Ok((_, _, Err(e)))) => e,
        Ok(Err(join)) => Error::Internal(format!("PDF preparation task failed: {}", join)),
        Err(_) => Error::Timeout {
            operation: "pdf_prep step".to_string(),
            secs: timeout.as_secs(),
        },
    };
    warn!(id = %fallback.id, error = %error, "PDF preparation step failed");
    let mut record = fallback;
    demote(&mut record, note_for(&error));
    (record, vec![format!("PDF preparation failed: {}", error)])
}

/// Give a prepared PDF its final name and id
fn finalize(ctx: &PdfPrepContext, record: &mut Record, original_file: &str, lines: &mut Vec<String>) -> Result<()> {
    let current = ctx.file_path(record)?;
    if record.known(FILE) != Some(original_file) {
        let original = ctx.root.join(original_file);
        let target = ctx.root.join(PDF_DIR).join(format!("{}.pdf", record.id));
        if original.exists() {
            std::fs::rename(&original, pages::with_suffix(&original, "_backup"))?;
        }
        std::fs::copy(&current, &target)?;
        record.set_raw(FILE, ctx.file_value(&target));
        lines.push(format!("Renamed prepared PDF to {}", ctx.file_value(&target)));
    }
    let path = ctx.file_path(record)?;
    record.colrev_pdf_id = Some(hash::colrev_pdf_id(ctx.hasher.as_ref(), &path)?);
    Ok(())
}

/// Prepare the PDF of one `pdf_imported` record
pub async fn prepare_record(
    ctx: Arc<PdfPrepContext>,
    record: Record,
    indexed_pdf_id: Option<String>,
) -> PdfPrepOutcome {
    if record.status != RecordState::PdfImported {
        return PdfPrepOutcome {
            record,
            lines: Vec::new(),
        };
    }
    let Some(original_file) = record.known(FILE).map(str::to_string) else {
        let mut record = record;
        demote(&mut record, "no_file");
        return PdfPrepOutcome {
            record,
            lines: vec!["No file linked".to_string()],
        };
    };

    let mut record = record;
    let mut lines = Vec::new();
    for script in ctx.scripts.clone() {
        let (updated, step_lines) =
            run_step_with_timeout(ctx.clone(), script, record, indexed_pdf_id.clone()).await;
        record = updated;
        lines.extend(step_lines);
        if record.status != RecordState::PdfImported {
            return PdfPrepOutcome { record, lines };
        }
    }

    let fallback = record.clone();
    let finalize_ctx = ctx.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut record = record;
        let mut lines = lines;
        let result = finalize(&finalize_ctx, &mut record, &original_file, &mut lines);
        (record, lines, result)
    });
    let error = match tokio::time::timeout(ctx.timeout, task).await {
        Ok(Ok((mut record, lines, Ok(())))) => {
            record.status = RecordState::PdfPrepared;
            return PdfPrepOutcome { record, lines };
        }
        Ok(Ok((_, _, Err(e)))) => e,
        Ok(Err(join)) => Error::Internal(format!("PDF finalization task failed: {}", join)),
        Err(_) => Error::Timeout {
            operation: "pdf_prep finalization".to_string(),
            secs: ctx.timeout.as_secs(),
        },
    };
    warn!(id = %fallback.id, error = %error, "Cannot finalize PDF");
    let mut record = fallback;
    demote(&mut record, note_for(&error));
    PdfPrepOutcome {
        record,
        lines: vec![format!("PDF finalization failed: {}", error)],
    }
}

// ============================================================================
// Operation
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PdfPrepOptions {
    /// Recompute the colrev_pdf_id of every prepared PDF
    pub update_colrev_pdf_ids: bool,
    /// Retry records that need manual preparation
    pub reprocess: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfPrepSummary {
    pub prepared: usize,
    pub needs_manual_preparation: usize,
    pub commit: Option<String>,
}

fn args_of(options: &PdfPrepOptions) -> String {
    let mut args = Vec::new();
    if options.update_colrev_pdf_ids {
        args.push("--update_colrev_pdf_ids");
    }
    if options.reprocess {
        args.push("--reprocess");
    }
    args.join(" ")
}

/// `colrev pdf_prep`
pub async fn run(review: &mut ReviewManager, options: PdfPrepOptions) -> Result<PdfPrepSummary> {
    let ctx = Arc::new(PdfPrepContext::for_review(review));
    run_with_context(review, options, ctx).await
}

/// `colrev pdf_prep` with explicit tools (tests inject hashers)
pub async fn run_with_context(
    review: &mut ReviewManager,
    options: PdfPrepOptions,
    ctx: Arc<PdfPrepContext>,
) -> Result<PdfPrepSummary> {
    review.check_precondition(ProcessType::PdfPrep)?;
    let mut records = review.load_records()?;
    let mut summary = PdfPrepSummary::default();

    if options.update_colrev_pdf_ids {
        for record in records.values_mut().filter(|r| r.status.ordinal() >= RecordState::PdfPrepared.ordinal()) {
            let Ok(path) = ctx.file_path(record) else { continue };
            match hash::colrev_pdf_id(ctx.hasher.as_ref(), &path) {
                Ok(cpid) => record.colrev_pdf_id = Some(cpid),
                Err(e) => warn!(id = %record.id, error = %e, "Cannot compute colrev_pdf_id"),
            }
        }
        review.save_records(&records)?;
        summary.commit = review.create_commit(
            CommitRequest::new(ProcessType::PdfPrep, "Update colrev_pdf_ids")
                .args(args_of(&options))
                .path(RECORDS_FILE),
        )?;
        return Ok(summary);
    }

    if options.reprocess {
        for record in records.values_mut() {
            if record.status == RecordState::PdfNeedsManualPreparation {
                record.status = RecordState::PdfImported;
            }
        }
    }

    let pending: Vec<Record> = records
        .values()
        .filter(|r| r.status == RecordState::PdfImported)
        .cloned()
        .collect();
    info!(records = pending.len(), "Preparing PDFs");

    let mut indexed: Vec<(Record, Option<String>)> = Vec::with_capacity(pending.len());
    let local_index = review.local_index().await.ok();
    for record in pending {
        let cpid = match &local_index {
            Some(index) => index
                .retrieve(&record)
                .await
                .ok()
                .flatten()
                .and_then(|r| r.record.colrev_pdf_id),
            None => None,
        };
        indexed.push((record, cpid));
    }

    let mut outcomes = stream::iter(indexed)
        .map(|(record, cpid)| prepare_record(ctx.clone(), record, cpid))
        .buffer_unordered(review.workers.max(1));
    while let Some(outcome) = outcomes.next().await {
        review.check_cancelled()?;
        let id = outcome.record.id.clone();
        review.report.extend_record(&id, outcome.lines);
        match outcome.record.status {
            RecordState::PdfPrepared => summary.prepared += 1,
            RecordState::PdfNeedsManualPreparation => summary.needs_manual_preparation += 1,
            _ => {}
        }
        records.insert(id, outcome.record);
    }

    review.save_records(&records)?;
    summary.commit = review.create_commit(
        CommitRequest::new(ProcessType::PdfPrep, "Prepare PDFs")
            .args(args_of(&options))
            .path(RECORDS_FILE),
    )?;
    info!(
        prepared = summary.prepared,
        manual = summary.needs_manual_preparation,
        "PDF preparation complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::super::document::testing::write_pdf;
    use super::super::hash::testing::FixedHasher;
    use super::*;

    struct NoOcr;

    impl OcrEngine for NoOcr {
        fn ocr(&self, _input: &Path, _output: &Path) -> Result<()> {
            Err(Error::MissingDependency("docker".to_string()))
        }
    }

    fn context(root: &Path, hasher: FixedHasher, scripts: Vec<PdfPrepScript>) -> Arc<PdfPrepContext> {
        Arc::new(PdfPrepContext {
            root: root.to_path_buf(),
            coverpages_dir: root.join("env/.coverpages"),
            lastpages_dir: root.join("env/.lastpages"),
            hasher: Arc::new(hasher),
            ocr: Arc::new(NoOcr),
            scripts,
            timeout: Duration::from_secs(30),
        })
    }

    fn record() -> Record {
        Record::new("Smith2020", "article")
            .with_field("author", "Smith, J.")
            .with_field("title", "Digital platforms")
            .with_field("pages", "1--2")
            .with_field("file", "pdfs/Smith2020.pdf")
            .with_status(RecordState::PdfImported)
    }

    #[tokio::test]
    async fn cover_page_is_moved_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        write_pdf(
            &dir.path().join("pdfs/Smith2020.pdf"),
            &["Downloaded from the publisher", "Digital platforms by Smith", "Conclusion"],
        );
        let hasher = FixedHasher::default().with("Smith2020.pdf", 1, pages::COVER_PAGE_HASHES[3]);
        let ctx = context(dir.path(), hasher, vec![PdfPrepScript::RemoveCoverpage]);

        let outcome = prepare_record(ctx, record(), None).await;
        assert_eq!(outcome.record.status, RecordState::PdfPrepared);
        assert_eq!(outcome.record.get("file"), Some("pdfs/Smith2020.pdf"));
        assert!(dir.path().join("pdfs/Smith2020_wo_cp.pdf").exists());
        assert!(dir.path().join("pdfs/Smith2020_backup.pdf").exists());
        assert_eq!(document::page_count(&dir.path().join("pdfs/Smith2020.pdf")).unwrap(), 2);
        assert!(outcome.record.colrev_pdf_id.as_deref().unwrap().starts_with("cpid1:"));
    }

    #[tokio::test]
    async fn metadata_mismatch_needs_manual_preparation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        write_pdf(&dir.path().join("pdfs/Smith2020.pdf"), &["Unrelated paper", "More text"]);
        let ctx = context(dir.path(), FixedHasher::default(), vec![PdfPrepScript::ValidatePdfMetadata]);

        let outcome = prepare_record(ctx, record(), None).await;
        assert_eq!(outcome.record.status, RecordState::PdfNeedsManualPreparation);
        let provenance = &outcome.record.data_provenance;
        assert!(provenance.has_note("file", "title_not_in_first_pages"));
        assert!(provenance.has_note("file", "author_not_in_first_pages"));
    }

    #[tokio::test]
    async fn missing_ocr_tool_demotes_the_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        write_pdf(&dir.path().join("pdfs/Smith2020.pdf"), &["", ""]);
        let ctx = context(dir.path(), FixedHasher::default(), vec![PdfPrepScript::PdfCheckOcr]);

        let outcome = prepare_record(ctx, record(), None).await;
        assert_eq!(outcome.record.status, RecordState::PdfNeedsManualPreparation);
        assert!(outcome.record.data_provenance.has_note("file", "missing_dependency"));
    }

    #[tokio::test]
    async fn page_count_matches_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        write_pdf(&dir.path().join("pdfs/Smith2020.pdf"), &["One", "Two"]);
        let ctx = context(dir.path(), FixedHasher::default(), vec![PdfPrepScript::ValidateCompleteness]);

        let outcome = prepare_record(ctx, record(), None).await;
        assert_eq!(outcome.record.status, RecordState::PdfPrepared);
        assert_eq!(outcome.record.get("file"), Some("pdfs/Smith2020.pdf"));
    }
}
