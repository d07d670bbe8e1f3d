//! Dataset store: the canonical records file
//!
//! `records.bib` is read either fully ([`Dataset::load_all`]) or as a stream
//! of per-record chunks. The status aggregator only needs the first lines of
//! each record (ID, origin, status), so [`Dataset::record_headers`] never
//! parses field values beyond those.

pub mod bibtex;
pub mod ids;

use crate::git_repo::{CommitInfo, GitRepo};
use colrev_common::paths::{DATA_FILE, PAPER_FILE, RECORDS_FILE};
use colrev_common::record::fields::{self, ORIGIN, STATUS};
use colrev_common::settings::IdPattern;
use colrev_common::state::RecordState;
use colrev_common::status::RecordSummary;
use colrev_common::{Error, Record, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Records keyed by ID, in file order
pub type Records = IndexMap<String, Record>;

/// Default number of non-blank lines in a record header
pub const HEADER_LINES: usize = 9;

static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9_\-]+)").unwrap());

/// The first lines of a record: enough to classify it without a full parse
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    pub id: String,
    pub status: RecordState,
    pub origin: Vec<String>,
}

/// Iterator over the raw text of each record in a BibTeX stream
pub struct RecordChunks<R: BufRead> {
    lines: std::io::Lines<R>,
    pending: Option<String>,
    line_no: usize,
    depth: i64,
}

impl<R: BufRead> RecordChunks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            pending: None,
            line_no: 0,
            depth: 0,
        }
    }
}

/// Net change in brace depth over one line, skipping `\{` and `\}`
fn brace_delta(line: &str) -> i64 {
    let mut delta = 0;
    let mut escaped = false;
    for c in line.chars() {
        match c {
            '\\' if !escaped => {
                escaped = true;
                continue;
            }
            '{' if !escaped => delta += 1,
            '}' if !escaped => delta -= 1,
            _ => {}
        }
        escaped = false;
    }
    delta
}

impl<R: BufRead> Iterator for RecordChunks<R> {
    /// (line number of the `@`, record text)
    type Item = Result<(usize, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = self.pending.take();
        let mut start = self.line_no;
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.line_no += 1;
                    // `@` inside a field value continues the current record
                    if line.starts_with('@') && self.depth <= 0 {
                        self.depth = brace_delta(&line);
                        if chunk.is_some() {
                            self.pending = Some(line);
                            return chunk.map(|c| Ok((start, c)));
                        }
                        start = self.line_no;
                        chunk = Some(line);
                    } else if let Some(c) = chunk.as_mut() {
                        self.depth += brace_delta(&line);
                        c.push('\n');
                        c.push_str(&line);
                    }
                }
                Some(Err(e)) => return Some(Err(e.into())),
                None => return chunk.map(|c| Ok((start, c))),
            }
        }
    }
}

fn field_value_start<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix(name)?;
    let rest = rest.trim_start().strip_prefix('=')?;
    rest.trim_start().strip_prefix('{')
}

/// Parse a record header
///
/// Reads at least `min_lines` non-blank lines and continues until the status
/// field has been seen, so long origin lists do not hide it.
pub fn parse_header(chunk: &str, min_lines: usize, line: usize) -> Result<RecordHeader> {
    let mut lines = chunk.lines().filter(|l| !l.trim().is_empty());
    let first = lines.next().unwrap_or("");
    let id = first
        .split_once('{')
        .map(|(_, rest)| rest.trim_end().trim_end_matches(',').to_string())
        .ok_or_else(|| Error::BibtexParse {
            line,
            message: "malformed record header".to_string(),
        })?;

    let mut origin = Vec::new();
    let mut status = None;
    let mut in_origin = false;
    for (read, text) in lines.enumerate() {
        if read + 1 >= min_lines && status.is_some() {
            break;
        }
        if in_origin {
            let item = text.trim();
            in_origin = !item.ends_with("},");
            origin.push(item.trim_end_matches("},").to_string());
            continue;
        }
        if let Some(value) = field_value_start(text, ORIGIN) {
            in_origin = !value.trim_end().ends_with("},");
            origin.push(value.trim_end().trim_end_matches("},").to_string());
        } else if let Some(value) = field_value_start(text, STATUS) {
            let value = value.trim_end().trim_end_matches("},");
            status = Some(value.parse::<RecordState>().map_err(|_| Error::StatusFieldValue {
                id: id.clone(),
                value: value.to_string(),
            })?);
        }
    }
    let origin = origin
        .iter()
        .flat_map(|o| o.split(';'))
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    let status = status.ok_or_else(|| Error::StatusFieldValue {
        id: id.clone(),
        value: String::new(),
    })?;
    Ok(RecordHeader { id, status, origin })
}

/// IDs locked by synthesis: `data.csv` rows and `@ID` citations in `paper.md`
pub fn read_propagated_ids(root: &Path) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();
    let data_path = root.join(DATA_FILE);
    if data_path.exists() {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&data_path)
            .map_err(|e| Error::DataFile(format!("{}: {}", DATA_FILE, e)))?;
        let headers = reader
            .headers()
            .map_err(|e| Error::DataFile(format!("{}: {}", DATA_FILE, e)))?
            .clone();
        if let Some(column) = headers.iter().position(|h| h == "ID") {
            for row in reader.records() {
                let row = row.map_err(|e| Error::DataFile(format!("{}: {}", DATA_FILE, e)))?;
                if let Some(id) = row.get(column).filter(|v| !v.is_empty()) {
                    ids.insert(id.to_string());
                }
            }
        }
    }
    let paper_path = root.join(PAPER_FILE);
    if paper_path.exists() {
        let paper = std::fs::read_to_string(&paper_path)?;
        ids.extend(CITATION.captures_iter(&paper).map(|c| c[1].to_string()));
    }
    Ok(ids)
}

pub struct Dataset {
    root: PathBuf,
}

impl Dataset {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    pub fn exists(&self) -> bool {
        self.records_path().exists()
    }

    // ========================================================================
    // Full load / save
    // ========================================================================

    /// All records keyed by ID
    pub fn load_all(&self) -> Result<Records> {
        if !self.exists() {
            return Ok(Records::new());
        }
        let content = std::fs::read_to_string(self.records_path())?;
        Self::parse(&content)
    }

    /// Parse records-file content
    pub fn parse(content: &str) -> Result<Records> {
        let mut records = Records::new();
        for record in bibtex::parse_records(content)? {
            if records.contains_key(&record.id) {
                return Err(Error::BibtexParse {
                    line: 0,
                    message: format!("duplicate ID {}", record.id),
                });
            }
            records.insert(record.id.clone(), record);
        }
        Ok(records)
    }

    /// Write the canonical records file
    pub fn save_all(&self, records: &Records) -> Result<()> {
        let content = bibtex::write_records(records.values());
        let tmp = self.root.join(format!("{}.tmp", RECORDS_FILE));
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, self.records_path())?;
        debug!(records = records.len(), "Saved records file");
        Ok(())
    }

    /// Whether the file on disk is in canonical form
    pub fn is_canonical(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(true);
        }
        let content = std::fs::read_to_string(self.records_path())?;
        let records = Self::parse(&content)?;
        Ok(bibtex::write_records(records.values()) == content)
    }

    // ========================================================================
    // Streaming access
    // ========================================================================

    fn chunks(&self) -> Result<Option<RecordChunks<BufReader<std::fs::File>>>> {
        if !self.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(self.records_path())?;
        Ok(Some(RecordChunks::new(BufReader::new(file))))
    }

    /// Headers of all records (first `min_lines` non-blank lines of each)
    pub fn record_headers(&self, min_lines: usize) -> Result<Vec<RecordHeader>> {
        let Some(chunks) = self.chunks()? else {
            return Ok(Vec::new());
        };
        chunks
            .map(|chunk| {
                let (line, text) = chunk?;
                parse_header(&text, min_lines, line)
            })
            .collect()
    }

    /// States present in the repository
    pub fn get_states_set(&self) -> Result<BTreeSet<RecordState>> {
        Ok(self
            .record_headers(HEADER_LINES)?
            .into_iter()
            .map(|h| h.status)
            .collect())
    }

    /// All origins of all records
    pub fn get_origin_list(&self) -> Result<Vec<String>> {
        Ok(self
            .record_headers(HEADER_LINES)?
            .into_iter()
            .flat_map(|h| h.origin)
            .collect())
    }

    /// Records whose state is in `states`, parsed one at a time
    pub fn read_next_record<'a>(
        &self,
        states: &'a [RecordState],
    ) -> Result<impl Iterator<Item = Result<Record>> + 'a> {
        let chunks = self.chunks()?;
        Ok(chunks.into_iter().flatten().filter_map(move |chunk| {
            let (line, text) = match chunk {
                Ok(c) => c,
                Err(e) => return Some(Err(e)),
            };
            match parse_header(&text, HEADER_LINES, line) {
                Ok(header) if !states.contains(&header.status) => None,
                Ok(_) => Some(
                    bibtex::parse_records(&text)
                        .and_then(|mut r| r.pop().ok_or_else(|| Error::Internal("empty chunk".into()))),
                ),
                Err(e) => Some(Err(e)),
            }
        }))
    }

    /// Summaries for the status aggregator
    ///
    /// Uses the header for ID, origin and status and a line scan for the
    /// curation marker and screening decisions.
    pub fn record_summaries(&self) -> Result<Vec<RecordSummary>> {
        let Some(chunks) = self.chunks()? else {
            return Ok(Vec::new());
        };
        let mut summaries = Vec::new();
        for chunk in chunks {
            let (line, text) = chunk?;
            let header = parse_header(&text, HEADER_LINES, line)?;
            let curated = text.lines().any(|l| {
                let l = l.trim_start().trim_start_matches("colrev_masterdata_provenance");
                let l = l.trim_start().trim_start_matches('=').trim_start().trim_start_matches('{');
                l.starts_with(&format!("{}:", fields::CURATED))
            });
            let screening_criteria = text.lines().find_map(|l| {
                field_value_start(l, fields::SCREENING_CRITERIA)
                    .or_else(|| field_value_start(l, fields::EXCL_CRITERIA))
                    .map(|v| v.trim_end().trim_end_matches("},").to_string())
            });
            summaries.push(RecordSummary {
                id: header.id,
                status: header.status,
                origin: header.origin,
                screening_criteria,
                curated,
            });
        }
        Ok(summaries)
    }

    // ========================================================================
    // IDs
    // ========================================================================

    pub fn propagated_ids(&self) -> Result<HashSet<String>> {
        read_propagated_ids(&self.root)
    }

    /// Whether `id` has entered synthesis and must not change
    pub fn propagated_id(&self, id: &str) -> Result<bool> {
        Ok(self.propagated_ids()?.contains(id))
    }

    /// Regenerate IDs from the current metadata
    ///
    /// Only records in `md_imported`, `md_needs_manual_preparation` or
    /// `md_prepared` are renamed; curated records keep their IDs. When a
    /// rename would touch a propagated ID, nothing is renamed and
    /// [`Error::PropagatedIdChange`] is returned. Returns `(old, new)` pairs.
    pub fn set_ids(
        &self,
        records: &mut Records,
        selected: Option<&[String]>,
        pattern: IdPattern,
    ) -> Result<Vec<(String, String)>> {
        let propagated = self.propagated_ids()?;
        let mut taken: HashSet<String> = records.keys().map(|k| k.to_lowercase()).collect();
        let mut renames = Vec::new();
        let mut locked = Vec::new();

        for (id, record) in records.iter() {
            if selected.is_some_and(|s| !s.contains(id)) {
                continue;
            }
            if record.status.is_post_md_prepared() && record.status != RecordState::MdPrepared {
                continue;
            }
            if record.is_curated() {
                continue;
            }
            taken.remove(&id.to_lowercase());
            let stem = ids::id_stem(record, pattern);
            let keeps_stem = *id == stem
                || id
                    .strip_prefix(stem.as_str())
                    .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_lowercase()));
            let new_id = if keeps_stem && !taken.contains(&id.to_lowercase()) {
                id.clone()
            } else {
                ids::next_unique_id(&stem, &taken)
            };
            if new_id != *id && propagated.contains(id) {
                locked.push(id.clone());
                taken.insert(id.to_lowercase());
                continue;
            }
            taken.insert(new_id.to_lowercase());
            if new_id != *id {
                renames.push((id.clone(), new_id));
            }
        }

        if !locked.is_empty() {
            return Err(Error::PropagatedIdChange(locked));
        }
        rename_records(records, &renames);
        for (old, new) in &renames {
            info!(old = %old, new = %new, "set_ids");
        }
        Ok(renames)
    }

    /// Restore the IDs of the last committed records file
    ///
    /// Records are matched to their committed version through shared origins.
    pub fn reset_ids(&self, git: &GitRepo, records: &mut Records) -> Result<Vec<(String, String)>> {
        let previous = self.load_records_from_history(git, "HEAD")?;
        let mut by_origin: HashMap<&str, &str> = HashMap::new();
        for record in previous.values() {
            for origin in &record.origin {
                by_origin.insert(origin.as_str(), record.id.as_str());
            }
        }
        let mut taken: HashSet<String> = records.keys().cloned().collect();
        let mut renames = Vec::new();
        for record in records.values() {
            let old_id = record
                .origin
                .iter()
                .find_map(|o| by_origin.get(o.as_str()))
                .copied();
            if let Some(old_id) = old_id {
                if old_id != record.id && !taken.contains(old_id) {
                    taken.remove(&record.id);
                    taken.insert(old_id.to_string());
                    renames.push((record.id.clone(), old_id.to_string()));
                }
            }
        }
        rename_records(records, &renames);
        Ok(renames)
    }

    // ========================================================================
    // History
    // ========================================================================

    /// The records file as committed at `revision`
    pub fn load_records_from_history(&self, git: &GitRepo, revision: &str) -> Result<Records> {
        match git.file_at(revision, RECORDS_FILE)? {
            Some(content) => Self::parse(&content),
            None => Ok(Records::new()),
        }
    }

    /// Every committed version of the records file, newest first
    ///
    /// Versions that do not parse are skipped with a warning.
    pub fn records_history(
        &self,
        git: &GitRepo,
        max: Option<usize>,
    ) -> Result<Vec<(CommitInfo, Records)>> {
        let mut versions = Vec::new();
        for commit in git.history(RECORDS_FILE, max)? {
            match self.load_records_from_history(git, &commit.id) {
                Ok(records) => versions.push((commit, records)),
                Err(e) => warn!(commit = %commit.id, error = %e, "Skipping unreadable records version"),
            }
        }
        Ok(versions)
    }
}

/// Count the entries of a BibTeX search file (0 when unreadable)
pub fn count_source_records(path: &Path) -> usize {
    match std::fs::read_to_string(path).map_err(Error::from).and_then(|c| bibtex::parse_entries(&c)) {
        Ok(entries) => entries.len(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot count source records");
            0
        }
    }
}

/// Re-key records after renames, keeping their order
pub fn rename_records(records: &mut Records, renames: &[(String, String)]) {
    if renames.is_empty() {
        return;
    }
    let map: HashMap<&str, &str> = renames
        .iter()
        .map(|(o, n)| (o.as_str(), n.as_str()))
        .collect();
    let old = std::mem::take(records);
    for (id, mut record) in old {
        if let Some(new_id) = map.get(id.as_str()) {
            record.id = new_id.to_string();
        }
        records.insert(record.id.clone(), record);
    }
}
