//! `colrev search`: update the `FEED` sources
//!
//! A feed file is a BibTeX file of raw records with six-digit IDs. Each
//! retrieved record is matched to its feed entry through the source
//! identifier (the DOI for Crossref, the DBLP key for DBLP): known entries
//! are updated in place, new ones are appended with the next free ID.
//! `DB` and other sources are exported by the user and only listed here.

use crate::clients::{CrossrefClient, DblpClient};
use crate::commit::CommitRequest;
use crate::dataset::bibtex;
use crate::review_manager::ReviewManager;
use colrev_common::record::fields::{DBLP_KEY, DOI};
use colrev_common::settings::{SearchScript, SearchSource, SearchType, Settings};
use colrev_common::{Error, ProcessType, Record, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Page size of feed requests
pub const FEED_ROWS: usize = 100;
/// DBLP does not page beyond this offset
const DBLP_MAX_OFFSET: usize = 10_000;

/// Entries of one feed file
pub struct SearchFeed {
    path: PathBuf,
    identifier_field: &'static str,
    entries: BTreeMap<String, Record>,
    by_identifier: HashMap<String, String>,
    next_id: usize,
    pub added: usize,
    pub changed: usize,
}

fn normalize_identifier(field: &str, value: &str) -> String {
    if field == DOI {
        value.trim().to_uppercase()
    } else {
        value.trim().to_string()
    }
}

impl SearchFeed {
    pub fn load(path: &Path, identifier_field: &'static str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if path.exists() {
            for record in bibtex::parse_records(&std::fs::read_to_string(path)?)? {
                entries.insert(record.id.clone(), record);
            }
        }
        let by_identifier = entries
            .values()
            .filter_map(|r| {
                r.get(identifier_field)
                    .map(|v| (normalize_identifier(identifier_field, v), r.id.clone()))
            })
            .collect();
        let next_id = entries
            .keys()
            .filter_map(|id| id.parse::<usize>().ok())
            .max()
            .map_or(1, |max| max + 1);
        Ok(Self {
            path: path.to_path_buf(),
            identifier_field,
            entries,
            by_identifier,
            next_id,
            added: 0,
            changed: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a retrieved record or update its existing entry
    ///
    /// Records without the source identifier cannot be tracked and are
    /// skipped (`false`).
    pub fn add_or_update(&mut self, mut record: Record) -> bool {
        let Some(identifier) = record
            .get(self.identifier_field)
            .map(|v| normalize_identifier(self.identifier_field, v))
        else {
            debug!(title = ?record.get("title"), "Feed record without identifier");
            return false;
        };
        match self.by_identifier.get(&identifier) {
            Some(id) => {
                record.id = id.clone();
                if let Some(existing) = self.entries.get_mut(id) {
                    if existing.fields != record.fields || existing.entry_type != record.entry_type {
                        existing.fields = record.fields;
                        existing.entry_type = record.entry_type;
                        self.changed += 1;
                    }
                }
            }
            None => {
                record.id = format!("{:06}", self.next_id);
                self.next_id += 1;
                self.by_identifier.insert(identifier, record.id.clone());
                self.entries.insert(record.id.clone(), record);
                self.added += 1;
            }
        }
        true
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content: Vec<String> = self.entries.values().map(bibtex::write_raw_entry).collect();
        std::fs::write(&self.path, content.join("\n"))?;
        Ok(())
    }
}

/// `search -v`: one line per source
pub fn list_sources(settings: &Settings) -> String {
    if settings.sources.is_empty() {
        return "No search sources registered".to_string();
    }
    settings
        .sources
        .iter()
        .map(|s| {
            let kind = toml::Value::try_from(s.search_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let params = if s.search_parameters.is_empty() {
                String::new()
            } else {
                format!(" ({})", s.search_parameters)
            };
            format!("{:<8} {:<12} {}{}", kind, s.source_name, s.filename, params)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn missing_parameter(source: &SearchSource, key: &str) -> Error {
    Error::Settings(format!(
        "Source {} needs search_parameters {}=...",
        source.filename, key
    ))
}

async fn crossref_feed(client: &CrossrefClient, issn: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut offset = 0;
    loop {
        let page = client.journal_works(issn, offset, FEED_ROWS).await?;
        let received = page.records.len();
        records.extend(page.records);
        offset += FEED_ROWS;
        if received == 0 || offset >= page.total_results {
            break;
        }
    }
    Ok(records)
}

async fn dblp_feed(client: &DblpClient, query: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut first = 0;
    while first < DBLP_MAX_OFFSET {
        let page = client.search(query, FEED_ROWS, first).await?;
        let received = page.len();
        records.extend(page);
        if received < FEED_ROWS {
            break;
        }
        first += FEED_ROWS;
    }
    Ok(records)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSummary {
    pub added: usize,
    pub changed: usize,
    pub commit: Option<String>,
}

/// `colrev search`
pub async fn run(review: &mut ReviewManager) -> Result<SearchSummary> {
    review.check_precondition(ProcessType::Search)?;
    let crossref = CrossrefClient::with_base_url(&review.providers.crossref, Some(review.env.user.email.clone()))?;
    let dblp = DblpClient::with_base_url(&review.providers.dblp)?;

    let mut summary = SearchSummary::default();
    let mut updated_files = Vec::new();
    for source in review.settings.sources.clone() {
        review.check_cancelled()?;
        if source.search_type != SearchType::Feed {
            debug!(source = %source.filename, "Not a feed, skipping");
            continue;
        }
        let (identifier, records) = match source.search_script {
            SearchScript::Crossref => {
                let issn = source.parameter("issn").ok_or_else(|| missing_parameter(&source, "issn"))?;
                (DOI, crossref_feed(&crossref, issn).await?)
            }
            SearchScript::Dblp => {
                let query = source
                    .parameter("venue_key")
                    .or_else(|| source.parameter("query"))
                    .ok_or_else(|| missing_parameter(&source, "venue_key"))?;
                (DBLP_KEY, dblp_feed(&dblp, query).await?)
            }
            SearchScript::Unknown | SearchScript::PdfsDir => {
                warn!(source = %source.filename, "Feed without a retrieval script");
                continue;
            }
        };

        let mut feed = SearchFeed::load(&review.path.join(&source.filename), identifier)?;
        let retrieved = records.len();
        for record in records {
            feed.add_or_update(record);
        }
        info!(
            source = %source.filename,
            retrieved,
            added = feed.added,
            changed = feed.changed,
            "Updated search feed"
        );
        if feed.added + feed.changed == 0 {
            continue;
        }
        feed.save()?;
        review.report.general(format!(
            "{}: {} records added, {} changed",
            source.filename, feed.added, feed.changed
        ));
        summary.added += feed.added;
        summary.changed += feed.changed;
        updated_files.push(source.filename.clone());
    }

    if !updated_files.is_empty() {
        let mut request = CommitRequest::new(ProcessType::Search, "Search: update feeds");
        for file in updated_files {
            request = request.path(file);
        }
        summary.commit = review.create_commit(request)?;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn work(doi: &str, title: &str) -> Record {
        Record::new("tmp", "article")
            .with_field("doi", doi)
            .with_field("title", title)
            .with_field("journal", "MIS Quarterly")
    }

    #[test]
    fn feed_assigns_ids_and_updates_by_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search/misq.bib");

        let mut feed = SearchFeed::load(&path, DOI).unwrap();
        assert!(feed.add_or_update(work("10.1/a", "First")));
        assert!(feed.add_or_update(work("10.1/b", "Second")));
        assert!(!feed.add_or_update(Record::new("x", "article").with_field("title", "No DOI")));
        feed.save().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("@article{000001,"));
        assert!(!text.contains("colrev_status"));

        let mut feed = SearchFeed::load(&path, DOI).unwrap();
        assert_eq!(feed.len(), 2);
        feed.add_or_update(work("10.1/A", "First (corrected)"));
        feed.add_or_update(work("10.1/c", "Third"));
        assert_eq!((feed.added, feed.changed), (1, 1));
        feed.save().unwrap();

        let records = bibtex::parse_records(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["000001", "000002", "000003"]);
        assert_eq!(records[0].get("title"), Some("First (corrected)"));
    }

    #[test]
    fn lists_sources() {
        let mut settings = Settings::new("x", colrev_common::settings::ReviewType::LiteratureReview);
        assert_eq!(list_sources(&settings), "No search sources registered");
        settings.sources.push(SearchSource {
            filename: "search/misq.bib".into(),
            search_type: SearchType::Feed,
            source_name: "crossref".into(),
            source_identifier: "doi".into(),
            search_parameters: "issn=0276-7783".into(),
            search_script: SearchScript::Crossref,
            conversion_script: colrev_common::settings::ConversionScript::Bibtex,
        });
        let listing = list_sources(&settings);
        assert!(listing.starts_with("FEED"));
        assert!(listing.contains("search/misq.bib (issn=0276-7783)"));
    }
}
