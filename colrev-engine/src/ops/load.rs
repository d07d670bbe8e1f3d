//! `colrev load`: import search results into the records file
//!
//! Files under `search/` that are not yet registered become `DB` sources.
//! Every entry of a source becomes a record with the origin
//! `<source file>/<entry key>`; entries whose origin is already present are
//! skipped, so loading is idempotent. Imported records pass through
//! `md_retrieved` and end in `md_imported`.

use crate::commit::CommitRequest;
use crate::dataset::{bibtex, ids, Records};
use crate::review_manager::ReviewManager;
use colrev_common::paths::{RECORDS_FILE, SEARCH_DIR, SETTINGS_FILE};
use colrev_common::record::fields;
use colrev_common::settings::{ConversionScript, IdPattern, SearchScript, SearchSource, SearchType};
use colrev_common::{Error, ProcessType, Record, RecordState, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Use the citation keys of the export as IDs
    pub keep_ids: bool,
    /// One commit for all sources instead of one per source
    pub combine: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub new_sources: Vec<String>,
    pub imported: usize,
    pub skipped: usize,
    pub commits: Vec<String>,
}

/// Register files in `search/` that no source refers to yet
pub fn discover_sources(root: &Path, sources: &[SearchSource]) -> Result<Vec<SearchSource>> {
    let dir = root.join(SEARCH_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();

    let mut discovered = Vec::new();
    for name in names {
        let filename = format!("{}/{}", SEARCH_DIR, name);
        if sources.iter().any(|s| s.filename == filename) {
            continue;
        }
        let path = Path::new(&name);
        let extension = path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
        let Some(conversion_script) = ConversionScript::for_extension(&extension) else {
            warn!(file = %filename, "No converter for file type, not registered");
            continue;
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        info!(file = %filename, "Discovered new search source");
        discovered.push(SearchSource {
            filename,
            search_type: SearchType::Db,
            source_name: stem,
            source_identifier: String::new(),
            search_parameters: String::new(),
            search_script: SearchScript::Unknown,
            conversion_script,
        });
    }
    Ok(discovered)
}

/// Raw entries of a source (BibTeX only)
fn source_records(root: &Path, source: &SearchSource) -> Result<Vec<Record>> {
    if source.conversion_script != ConversionScript::Bibtex {
        return Err(Error::Settings(format!(
            "No {} converter available for {}: convert it to BibTeX (search/*.bib)",
            source.conversion_script.name(),
            source.filename
        )));
    }
    let path = root.join(&source.filename);
    if !path.exists() {
        warn!(file = %source.filename, "Search source file missing");
        return Ok(Vec::new());
    }
    bibtex::parse_records(&std::fs::read_to_string(&path)?)
}

/// Turn a raw entry into a retrieved record of `origin`
pub fn import_record(mut raw: Record, origin: &str) -> Record {
    let mut record = Record::new(raw.id.clone(), raw.entry_type.to_lowercase());
    record.origin = vec![origin.to_string()];
    record.status = RecordState::MdRetrieved;
    for (key, value) in std::mem::take(&mut raw.fields) {
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        let key = key.to_lowercase();
        if fields::is_identifying(&key) {
            record.masterdata_provenance.set(&key, origin, "");
        } else {
            record.data_provenance.set(&key, origin, "");
        }
        record.fields.insert(key, value);
    }
    record
}

fn assign_id(record: &mut Record, keep_ids: bool, pattern: IdPattern, taken: &mut HashSet<String>) {
    let stem = if keep_ids && !record.id.trim().is_empty() {
        record.id.trim().to_string()
    } else {
        ids::id_stem(record, pattern)
    };
    let id = ids::next_unique_id(&stem, taken);
    taken.insert(id.to_lowercase());
    record.id = id;
}

/// Import the new entries of `source` into `records`
///
/// Returns the IDs of the imported records and the number of entries
/// skipped because their origin is already present.
pub fn load_source(
    root: &Path,
    source: &SearchSource,
    records: &mut Records,
    keep_ids: bool,
    pattern: IdPattern,
) -> Result<(Vec<String>, usize)> {
    let existing: HashSet<&str> = records
        .values()
        .flat_map(|r| r.origin.iter().map(String::as_str))
        .collect();
    let prefix = source.origin_prefix();
    let mut fresh = Vec::new();
    let mut skipped = 0;
    for raw in source_records(root, source)? {
        let origin = format!("{}/{}", prefix, raw.id);
        if existing.contains(origin.as_str()) {
            skipped += 1;
            continue;
        }
        fresh.push(import_record(raw, &origin));
    }

    let mut taken: HashSet<String> = records.keys().map(|k| k.to_lowercase()).collect();
    let mut imported = Vec::new();
    for mut record in fresh {
        assign_id(&mut record, keep_ids, pattern, &mut taken);
        debug!(id = %record.id, origin = ?record.origin, "Retrieved record");
        imported.push(record.id.clone());
        records.insert(record.id.clone(), record);
    }
    for id in &imported {
        if let Some(record) = records.get_mut(id) {
            record.set_status(RecordState::MdImported);
        }
    }
    Ok((imported, skipped))
}

fn args_of(options: &LoadOptions) -> String {
    let mut args = Vec::new();
    if options.keep_ids {
        args.push("-k");
    }
    if options.combine {
        args.push("-c");
    }
    args.join(" ")
}

/// `colrev load`
pub fn run(review: &mut ReviewManager, options: LoadOptions) -> Result<LoadSummary> {
    review.check_precondition(ProcessType::Load)?;
    let mut summary = LoadSummary::default();

    let discovered = discover_sources(&review.path, &review.settings.sources)?;
    if !discovered.is_empty() {
        summary.new_sources = discovered.iter().map(|s| s.filename.clone()).collect();
        review.settings.sources.extend(discovered);
        review.save_settings()?;
    }

    let mut records = review.load_records()?;
    let pattern = review.settings.project.id_pattern;
    let mut pending_paths: Vec<String> = Vec::new();
    for source in review.settings.sources.clone() {
        review.check_cancelled()?;
        let (imported, skipped) = load_source(&review.path, &source, &mut records, options.keep_ids, pattern)?;
        summary.skipped += skipped;
        if imported.is_empty() {
            continue;
        }
        info!(source = %source.filename, imported = imported.len(), skipped, "Loaded search source");
        summary.imported += imported.len();
        for id in &imported {
            review.report.record(id, format!("Loaded from {}", source.filename));
        }
        pending_paths.push(source.filename.clone());

        if !options.combine {
            review.save_records(&records)?;
            let commit = review.create_commit(
                CommitRequest::new(ProcessType::Load, format!("Load {}", source.filename))
                    .args(args_of(&options))
                    .path(RECORDS_FILE)
                    .path(SETTINGS_FILE)
                    .path(source.filename.clone()),
            )?;
            summary.commits.extend(commit);
            pending_paths.clear();
        }
    }

    if options.combine && !pending_paths.is_empty() {
        review.save_records(&records)?;
        let mut request = CommitRequest::new(ProcessType::Load, "Load search sources")
            .args(args_of(&options))
            .path(RECORDS_FILE)
            .path(SETTINGS_FILE);
        for path in pending_paths {
            request = request.path(path);
        }
        summary.commits.extend(review.create_commit(request)?);
    }
    Ok(summary)
}
