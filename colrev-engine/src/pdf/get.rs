//! PDF retrieval (`colrev pdf_get`)
//!
//! Runs the `pdf_get.scripts` endpoints in order on every
//! `rev_prescreen_included` record until one links a file. Linked records
//! move to `pdf_imported`, the others to `pdf_needs_manual_retrieval`.

use super::document;
use super::hash::{self, PageHasher, PdftoppmHasher};
use crate::clients::UnpaywallClient;
use crate::commit::CommitRequest;
use crate::dataset::Records;
use crate::local_index::LocalIndex;
use crate::review_manager::ReviewManager;
use colrev_common::paths::{PDF_DIR, RECORDS_FILE};
use colrev_common::record::fields::FILE;
use colrev_common::settings::{PdfGetScript, PdfPathType};
use colrev_common::{ProcessType, Record, RecordState, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Everything an endpoint may consult
pub struct PdfGetContext<'a> {
    pub root: &'a Path,
    pub path_type: PdfPathType,
    pub scripts: &'a [PdfGetScript],
    pub local_index: Option<&'a LocalIndex>,
    pub unpaywall: Option<&'a UnpaywallClient>,
}

/// `pdfs/<ID>.pdf`
pub fn target_file(id: &str) -> String {
    format!("{}/{}.pdf", PDF_DIR, id)
}

fn link_file(record: &mut Record, file: &str, source: &str) {
    record.set_raw(FILE, file);
    record.data_provenance.set(FILE, source, "");
}

// ============================================================================
// Endpoints
// ============================================================================

/// Link `pdfs/<ID>.pdf` if it is already on disk
pub fn local_directory_linker(root: &Path, record: &mut Record) -> bool {
    let file = target_file(&record.id);
    if !root.join(&file).is_file() {
        return false;
    }
    link_file(record, &file, "local_directory_linker");
    true
}

/// Place a file from another repository into `pdfs/`
fn place_file(source: &Path, target: &Path, path_type: PdfPathType) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match path_type {
        PdfPathType::Copy => {
            std::fs::copy(source, target)?;
        }
        #[cfg(unix)]
        PdfPathType::Symlink => std::os::unix::fs::symlink(source, target)?,
        #[cfg(not(unix))]
        PdfPathType::Symlink => {
            std::fs::copy(source, target)?;
        }
    }
    Ok(())
}

/// Take the PDF the local index holds for this record
pub async fn from_local_index(ctx: &PdfGetContext<'_>, record: &mut Record) -> Result<bool> {
    let Some(index) = ctx.local_index else {
        return Ok(false);
    };
    let Some(indexed) = index.retrieve(record).await? else {
        return Ok(false);
    };
    let Some(source) = indexed.pdf_path().filter(|p| p.is_file()) else {
        return Ok(false);
    };
    let file = target_file(&record.id);
    let target = ctx.root.join(&file);
    if source == target {
        return Ok(false);
    }
    place_file(&source, &target, ctx.path_type)?;
    link_file(record, &file, "local_index");
    if let Some(cpid) = indexed.record.colrev_pdf_id {
        record.colrev_pdf_id = Some(cpid);
    }
    debug!(id = %record.id, source = %source.display(), "Linked PDF from the local index");
    Ok(true)
}

/// Download the open-access version listed by Unpaywall
///
/// Downloads that are not a parseable PDF (landing pages, paywalls) are
/// deleted.
pub async fn from_unpaywall(ctx: &PdfGetContext<'_>, record: &mut Record) -> Result<bool> {
    let (Some(client), Some(doi)) = (ctx.unpaywall, record.known("doi").map(str::to_string)) else {
        return Ok(false);
    };
    let Some(url) = client.pdf_url(&doi).await? else {
        return Ok(false);
    };
    let bytes = client.download(&url).await?;
    let file = target_file(&record.id);
    let target = ctx.root.join(&file);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, &bytes)?;
    if !document::is_pdf(&bytes) {
        std::fs::remove_file(&target)?;
        debug!(id = %record.id, url = %url, "Download is not a PDF");
        return Ok(false);
    }
    link_file(record, &file, &url);
    Ok(true)
}

/// Retrieve the PDF of one `rev_prescreen_included` record
pub async fn retrieve_record(ctx: &PdfGetContext<'_>, record: Record) -> (Record, Vec<String>) {
    if record.status != RecordState::RevPrescreenIncluded {
        return (record, Vec::new());
    }
    let mut record = record;
    let mut lines = Vec::new();
    for script in ctx.scripts {
        let found = match script {
            PdfGetScript::LocalDirectoryLinker => Ok(local_directory_linker(ctx.root, &mut record)),
            PdfGetScript::LocalIndex => from_local_index(ctx, &mut record).await,
            PdfGetScript::Unpaywall { .. } => from_unpaywall(ctx, &mut record).await,
        };
        match found {
            Ok(true) => {
                lines.push(format!("Retrieved PDF ({})", script_name(script)));
                record.status = RecordState::PdfImported;
                return (record, lines);
            }
            Ok(false) => {}
            Err(e) => {
                debug!(id = %record.id, endpoint = script_name(script), error = %e, "PDF endpoint failed");
                lines.push(format!("Skipped {} ({})", script_name(script), e));
            }
        }
    }
    record.status = RecordState::PdfNeedsManualRetrieval;
    lines.push("No PDF found".to_string());
    (record, lines)
}

fn script_name(script: &PdfGetScript) -> &'static str {
    match script {
        PdfGetScript::LocalDirectoryLinker => "local_directory_linker",
        PdfGetScript::LocalIndex => "local_index",
        PdfGetScript::Unpaywall { .. } => "unpaywall",
    }
}

// ============================================================================
// File maintenance
// ============================================================================

fn resolve(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Copy files linked from outside the repository into `pdfs/`
pub fn copy_to_repo(root: &Path, records: &mut Records) -> Result<Vec<String>> {
    let mut copied = Vec::new();
    for record in records.values_mut() {
        let Some(file) = record.known(FILE).map(str::to_string) else { continue };
        let source = resolve(root, &file);
        if source.starts_with(root.join(PDF_DIR)) && !source.is_symlink() {
            continue;
        }
        if !source.exists() {
            warn!(id = %record.id, file = %file, "Linked file does not exist");
            continue;
        }
        let target_rel = target_file(&record.id);
        let target = root.join(&target_rel);
        let content = std::fs::read(&source)?;
        if target.is_symlink() {
            std::fs::remove_file(&target)?;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, content)?;
        record.set_raw(FILE, target_rel);
        copied.push(record.id.clone());
    }
    Ok(copied)
}

/// Rename files in `pdfs/` to `<ID>.pdf`
pub fn rename_files(root: &Path, records: &mut Records) -> Result<Vec<String>> {
    let mut renamed = Vec::new();
    for record in records.values_mut() {
        let Some(file) = record.known(FILE).map(str::to_string) else { continue };
        let expected = target_file(&record.id);
        if file == expected || Path::new(&file).is_absolute() {
            continue;
        }
        let (source, target) = (root.join(&file), root.join(&expected));
        if !source.exists() {
            continue;
        }
        if target.exists() {
            warn!(id = %record.id, target = %expected, "Cannot rename, target exists");
            continue;
        }
        std::fs::rename(&source, &target)?;
        record.set_raw(FILE, expected);
        renamed.push(record.id.clone());
    }
    Ok(renamed)
}

/// Relink records whose file moved, matching by `colrev_pdf_id`
pub fn relink_files(
    root: &Path,
    hasher: &dyn PageHasher,
    records: &mut Records,
) -> Result<Vec<String>> {
    let broken: Vec<String> = records
        .values()
        .filter(|r| r.colrev_pdf_id.is_some())
        .filter(|r| r.known(FILE).map_or(true, |f| !resolve(root, f).exists()))
        .map(|r| r.id.clone())
        .collect();
    if broken.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_cpid: HashMap<String, String> = HashMap::new();
    for entry in WalkDir::new(root.join(PDF_DIR)).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "pdf") {
            continue;
        }
        match hash::colrev_pdf_id(hasher, path) {
            Ok(cpid) => {
                let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
                by_cpid.insert(cpid, rel);
            }
            Err(e) => debug!(pdf = %path.display(), error = %e, "Cannot hash PDF"),
        }
    }

    let mut relinked = Vec::new();
    for id in broken {
        let Some(record) = records.get_mut(&id) else { continue };
        let Some(file) = record.colrev_pdf_id.as_ref().and_then(|c| by_cpid.get(c)) else {
            continue;
        };
        info!(id = %id, file = %file, "Relinked PDF");
        record.set_raw(FILE, file.clone());
        relinked.push(id);
    }
    Ok(relinked)
}

// ============================================================================
// Operation
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PdfGetOptions {
    pub copy_to_repo: bool,
    pub rename: bool,
    pub relink_files: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfGetSummary {
    pub retrieved: usize,
    pub needs_manual_retrieval: usize,
    pub maintained: Vec<String>,
    pub commit: Option<String>,
}

/// `colrev pdf_get`
pub async fn run(review: &mut ReviewManager, options: PdfGetOptions) -> Result<PdfGetSummary> {
    review.check_precondition(ProcessType::PdfGet)?;
    let mut records = review.load_records()?;
    let mut summary = PdfGetSummary::default();

    let maintenance = if options.relink_files {
        Some(("--relink_files", relink_files(&review.path, &PdftoppmHasher::new(), &mut records)?))
    } else if options.copy_to_repo {
        Some(("-c", copy_to_repo(&review.path, &mut records)?))
    } else if options.rename {
        Some(("-r", rename_files(&review.path, &mut records)?))
    } else {
        None
    };
    if let Some((args, ids)) = maintenance {
        for id in &ids {
            review.report.record(id, format!("Updated file ({})", args));
        }
        summary.maintained = ids;
        review.save_records(&records)?;
        summary.commit = review.create_commit(
            CommitRequest::new(ProcessType::PdfGet, "Update PDF links")
                .args(args)
                .path(RECORDS_FILE),
        )?;
        return Ok(summary);
    }

    let scripts = review.settings.pdf_get.scripts.clone();
    let local_index = if scripts.contains(&PdfGetScript::LocalIndex) {
        match review.local_index().await {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(error = %e, "Local index unavailable");
                None
            }
        }
    } else {
        None
    };
    let unpaywall = scripts
        .iter()
        .find_map(|s| match s {
            PdfGetScript::Unpaywall { email } => Some(email.clone().unwrap_or_else(|| review.env.user.email.clone())),
            _ => None,
        })
        .map(|email| UnpaywallClient::with_base_url(&review.providers.unpaywall, &email))
        .transpose()?;

    let pending: Vec<Record> = records
        .values()
        .filter(|r| r.status == RecordState::RevPrescreenIncluded)
        .cloned()
        .collect();
    info!(records = pending.len(), "Retrieving PDFs");

    let ctx = PdfGetContext {
        root: &review.path,
        path_type: review.settings.pdf_get.pdf_path_type,
        scripts: &scripts,
        local_index: local_index.as_ref(),
        unpaywall: unpaywall.as_ref(),
    };
    let mut outcomes = Vec::new();
    {
        let mut stream = stream::iter(pending)
            .map(|record| retrieve_record(&ctx, record))
            .buffer_unordered(review.workers.max(1));
        while let Some(outcome) = stream.next().await {
            review.check_cancelled()?;
            outcomes.push(outcome);
        }
    }
    for (record, lines) in outcomes {
        match record.status {
            RecordState::PdfImported => summary.retrieved += 1,
            RecordState::PdfNeedsManualRetrieval => summary.needs_manual_retrieval += 1,
            _ => {}
        }
        review.report.extend_record(&record.id, lines);
        records.insert(record.id.clone(), record);
    }

    review.save_records(&records)?;
    summary.commit = review.create_commit(
        CommitRequest::new(ProcessType::PdfGet, "Retrieve PDFs").path(RECORDS_FILE),
    )?;
    info!(
        retrieved = summary.retrieved,
        manual = summary.needs_manual_retrieval,
        "PDF retrieval complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::super::document::testing::write_pdf;
    use super::super::hash::testing::FixedHasher;
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn included(id: &str) -> Record {
        Record::new(id, "article")
            .with_field("title", "Digital platforms")
            .with_status(RecordState::RevPrescreenIncluded)
    }

    fn ctx<'a>(root: &'a Path, scripts: &'a [PdfGetScript], unpaywall: Option<&'a UnpaywallClient>) -> PdfGetContext<'a> {
        PdfGetContext {
            root,
            path_type: PdfPathType::Copy,
            scripts,
            local_index: None,
            unpaywall,
        }
    }

    #[tokio::test]
    async fn links_existing_file_by_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        write_pdf(&dir.path().join("pdfs/Smith2020.pdf"), &["text"]);
        let scripts = [PdfGetScript::LocalDirectoryLinker];

        let (record, _) = retrieve_record(&ctx(dir.path(), &scripts, None), included("Smith2020")).await;
        assert_eq!(record.status, RecordState::PdfImported);
        assert_eq!(record.get("file"), Some("pdfs/Smith2020.pdf"));

        let (record, lines) = retrieve_record(&ctx(dir.path(), &scripts, None), included("Other2021")).await;
        assert_eq!(record.status, RecordState::PdfNeedsManualRetrieval);
        assert_eq!(lines, vec!["No PDF found".to_string()]);
    }

    #[tokio::test]
    async fn downloads_open_access_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("source.pdf");
        write_pdf(&pdf, &["open access"]);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/10.1/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "best_oa_location": {"url_for_pdf": format!("{}/files/a.pdf", server.uri())}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(std::fs::read(&pdf).unwrap()))
            .mount(&server)
            .await;
        let client = UnpaywallClient::with_base_url(&server.uri(), "test@example.org").unwrap();
        let scripts = [PdfGetScript::Unpaywall { email: None }];

        let record = included("Smith2020").with_field("doi", "10.1/abc");
        let (record, _) = retrieve_record(&ctx(dir.path(), &scripts, Some(&client)), record).await;
        assert_eq!(record.status, RecordState::PdfImported);
        assert!(dir.path().join("pdfs/Smith2020.pdf").exists());
    }

    #[tokio::test]
    async fn html_downloads_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/10.1/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "best_oa_location": {"url_for_pdf": format!("{}/landing", server.uri())}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>Sign in</html>"))
            .mount(&server)
            .await;
        let client = UnpaywallClient::with_base_url(&server.uri(), "test@example.org").unwrap();
        let scripts = [PdfGetScript::Unpaywall { email: None }];

        let record = included("Smith2020").with_field("doi", "10.1/abc");
        let (record, _) = retrieve_record(&ctx(dir.path(), &scripts, Some(&client)), record).await;
        assert_eq!(record.status, RecordState::PdfNeedsManualRetrieval);
        assert!(!dir.path().join("pdfs/Smith2020.pdf").exists());
    }

    #[test]
    fn renames_to_record_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        std::fs::write(dir.path().join("pdfs/download (1).pdf"), b"%PDF").unwrap();
        let mut records = Records::new();
        records.insert(
            "Smith2020".to_string(),
            included("Smith2020").with_field("file", "pdfs/download (1).pdf"),
        );

        assert_eq!(rename_files(dir.path(), &mut records).unwrap(), vec!["Smith2020"]);
        assert_eq!(records["Smith2020"].get("file"), Some("pdfs/Smith2020.pdf"));
        assert!(dir.path().join("pdfs/Smith2020.pdf").exists());
    }

    #[test]
    fn relinks_moved_files_by_pdf_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs/moved")).unwrap();
        write_pdf(&dir.path().join("pdfs/moved/x.pdf"), &["text"]);
        let hasher = FixedHasher::default().with("x.pdf", 1, "abcd");
        let mut moved = included("Smith2020").with_field("file", "pdfs/Smith2020.pdf");
        moved.colrev_pdf_id = Some("cpid1:abcd".to_string());
        let mut records = Records::new();
        records.insert("Smith2020".to_string(), moved);

        assert_eq!(relink_files(dir.path(), &hasher, &mut records).unwrap(), vec!["Smith2020"]);
        assert_eq!(records["Smith2020"].get("file"), Some("pdfs/moved/x.pdf"));
    }
}
