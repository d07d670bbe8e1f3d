//! `colrev distribute -p PATH`: hand a PDF or BibTeX file to a review
//!
//! Entries go to the target's `search/local_import.bib` with numeric IDs,
//! which is registered as a search source on first use. PDFs are copied to
//! the target's `pdfs/` and described by their GROBID header when the
//! service is reachable. The next `colrev load` in the target imports them.

use crate::clients::GrobidClient;
use crate::dataset::bibtex;
use colrev_common::paths::{PDF_DIR, SEARCH_DIR, SETTINGS_FILE};
use colrev_common::record::fields::{FILE, TITLE};
use colrev_common::settings::{ConversionScript, SearchScript, SearchSource, SearchType, Settings};
use colrev_common::{Error, Record, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const LOCAL_IMPORT_FILE: &str = "local_import.bib";

#[derive(Debug, Clone, PartialEq)]
pub struct DistributeSummary {
    pub bib_file: PathBuf,
    pub added: usize,
    pub pdf: Option<PathBuf>,
}

fn next_numeric_id(existing: &[Record]) -> usize {
    existing
        .iter()
        .filter_map(|r| r.id.parse::<usize>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

/// Append entries to the target's import file and register it
pub fn append_to_import(target: &Path, entries: Vec<Record>) -> Result<(PathBuf, usize)> {
    let path = target.join(SEARCH_DIR).join(LOCAL_IMPORT_FILE);
    let mut existing = if path.exists() {
        bibtex::parse_records(&std::fs::read_to_string(&path)?)?
    } else {
        Vec::new()
    };
    let mut next = next_numeric_id(&existing);
    let added = entries.len();
    for mut entry in entries {
        entry.id = format!("{:06}", next);
        next += 1;
        existing.push(entry);
    }
    std::fs::create_dir_all(path.parent().unwrap_or(target))?;
    let content: Vec<String> = existing.iter().map(bibtex::write_raw_entry).collect();
    std::fs::write(&path, content.join("\n"))?;

    let settings_path = target.join(SETTINGS_FILE);
    let mut settings = Settings::load(&settings_path)?;
    let filename = format!("{}/{}", SEARCH_DIR, LOCAL_IMPORT_FILE);
    if !settings.sources.iter().any(|s| s.filename == filename) {
        settings.sources.push(SearchSource {
            filename,
            search_type: SearchType::Other,
            source_name: "local_import".to_string(),
            source_identifier: String::new(),
            search_parameters: String::new(),
            search_script: SearchScript::Unknown,
            conversion_script: ConversionScript::Bibtex,
        });
        settings.save(&settings_path)?;
        info!(target = %target.display(), "Registered local_import source");
    }
    Ok((path, added))
}

/// Describe a PDF by its GROBID header, else by its file name
async fn pdf_entry(pdf: &Path, relative: &str, grobid: Option<&GrobidClient>) -> Result<Record> {
    let mut record = None;
    if let Some(client) = grobid {
        if client.is_alive().await {
            record = client.process_header(&std::fs::read(pdf)?).await?;
        } else {
            warn!("GROBID is not available, distributing the PDF without metadata");
        }
    }
    let mut record = record.unwrap_or_else(|| {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
            .unwrap_or_default();
        Record::new("distributed", "misc").with_field(TITLE, stem)
    });
    record.set_raw(FILE, relative);
    Ok(record)
}

/// `colrev distribute`
pub async fn run(path: &Path, target: &Path, grobid: Option<&GrobidClient>) -> Result<DistributeSummary> {
    if !target.join(SETTINGS_FILE).exists() {
        return Err(Error::Settings(format!("{} is not a colrev repository", target.display())));
    }
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "bib" => {
            let entries = bibtex::parse_records(&std::fs::read_to_string(path)?)?;
            let (bib_file, added) = append_to_import(target, entries)?;
            info!(file = %path.display(), added, target = %target.display(), "Distributed records");
            Ok(DistributeSummary { bib_file, added, pdf: None })
        }
        "pdf" => {
            let name = path
                .file_name()
                .ok_or_else(|| Error::Settings(format!("Not a file: {}", path.display())))?
                .to_string_lossy()
                .into_owned();
            let relative = format!("{}/{}", PDF_DIR, name);
            let copy = target.join(&relative);
            std::fs::create_dir_all(target.join(PDF_DIR))?;
            std::fs::copy(path, &copy)?;
            debug!(pdf = %copy.display(), "Copied PDF");
            let entry = pdf_entry(path, &relative, grobid).await?;
            let (bib_file, added) = append_to_import(target, vec![entry])?;
            info!(pdf = %copy.display(), target = %target.display(), "Distributed PDF");
            Ok(DistributeSummary { bib_file, added, pdf: Some(copy) })
        }
        other => Err(Error::Settings(format!(
            "Cannot distribute .{} files (only .bib and .pdf)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colrev_common::settings::ReviewType;
    use pretty_assertions::assert_eq;

    fn target() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        Settings::new("target", ReviewType::LiteratureReview)
            .save(&dir.path().join(SETTINGS_FILE))
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn bib_entries_are_numbered_and_registered() {
        let dir = target();
        let source = dir.path().join("export.bib");
        std::fs::write(&source, "@article{Smith2020,\n  title = {Platforms},\n  year = {2020}\n}\n").unwrap();

        run(&source, dir.path(), None).await.unwrap();
        let summary = run(&source, dir.path(), None).await.unwrap();
        assert_eq!(summary.added, 1);

        let records = bibtex::parse_records(&std::fs::read_to_string(&summary.bib_file).unwrap()).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["000001", "000002"]);

        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings.sources.len(), 1);
        assert_eq!(settings.sources[0].filename, "search/local_import.bib");
    }

    #[tokio::test]
    async fn pdf_is_copied_and_described() {
        let dir = target();
        let pdf = dir.path().join("digital_platforms.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n").unwrap();

        let summary = run(&pdf, dir.path(), None).await.unwrap();
        assert!(dir.path().join("pdfs/digital_platforms.pdf").exists());
        let records = bibtex::parse_records(&std::fs::read_to_string(&summary.bib_file).unwrap()).unwrap();
        assert_eq!(records[0].get("file"), Some("pdfs/digital_platforms.pdf"));
        assert_eq!(records[0].get("title"), Some("digital platforms"));
    }

    #[tokio::test]
    async fn other_files_are_rejected() {
        let dir = target();
        let err = run(Path::new("notes.txt"), dir.path(), None).await.unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }
}
