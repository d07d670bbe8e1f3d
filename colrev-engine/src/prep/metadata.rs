//! Metadata endpoints backed by external providers and the local index
//!
//! Each endpoint returns its report lines. Provider failures are reported
//! as [`ProviderFailure`]: network trouble leaves the record untouched, a
//! malformed response demotes it to manual preparation.

use super::exclusions::prescreen_exclude;
use crate::clients::doi::normalize_doi;
use crate::clients::{Providers, UnpaywallClient};
use crate::local_index::LocalIndex;
use colrev_common::record::fields::{
    self, AUTHOR, BOOKTITLE, DBLP_KEY, DOI, FULLTEXT, JOURNAL, NUMBER, TITLE, URL, VOLUME, YEAR,
};
use colrev_common::record::{merge, retrieval_similarity};
use colrev_common::text::partial_ratio;
use colrev_common::{Record, RecordState};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

static VALID_DOI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{4,9}/").unwrap());

/// A provider call that did not produce usable data
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub service: &'static str,
    pub message: String,
    /// The response arrived but could not be decoded
    pub malformed: bool,
}

/// Convert a client error into a failure, or `None` for "no such record"
macro_rules! provider_failure {
    ($service:literal, $err:expr) => {{
        let err = $err;
        if err.is_not_found() {
            None
        } else {
            Some(ProviderFailure {
                service: $service,
                message: err.to_string(),
                malformed: err.is_malformed(),
            })
        }
    }};
}

pub type EndpointResult = Result<Vec<String>, ProviderFailure>;

/// Lowest similarity at which a Crossref hit is taken
pub const CROSSREF_MIN_SIMILARITY: f64 = 0.9;
/// DBLP hits must score above this
pub const DBLP_MIN_SIMILARITY: f64 = 0.99;
/// Semantic Scholar hits must score above this
pub const SEMANTIC_SCHOLAR_MIN_SIMILARITY: f64 = 0.9;

fn crossref_accepts(score: f64, similarity: f64) -> bool {
    score >= similarity.max(CROSSREF_MIN_SIMILARITY)
}

fn dblp_accepts(score: f64, similarity: f64) -> bool {
    score > similarity.max(DBLP_MIN_SIMILARITY)
}

fn semantic_scholar_accepts(score: f64, similarity: f64) -> bool {
    score > similarity.max(SEMANTIC_SCHOLAR_MIN_SIMILARITY)
}

fn doi_source(doi: &str) -> String {
    format!("https://doi.org/{}", doi)
}

/// Fill fields the record lacks without touching existing values
fn fill_missing(record: &mut Record, retrieved: &Record, source: &str) -> Vec<String> {
    let mut added = Vec::new();
    for (key, value) in &retrieved.fields {
        if record.known(key).is_some() || value.trim().is_empty() {
            continue;
        }
        if record.update_field(key, value, source, "") {
            added.push(key.clone());
        }
    }
    if added.is_empty() {
        Vec::new()
    } else {
        vec![format!("Added {} from {}", added.join(", "), source)]
    }
}

/// Merge `retrieved` when similar enough, otherwise fill gaps only
fn merge_or_fill(record: &mut Record, retrieved: &Record, source: &str, similarity: f64, threshold: f64) -> Vec<String> {
    if similarity >= threshold {
        match merge(record, retrieved, source) {
            Ok(()) => return vec![format!("Merged metadata from {} (similarity {:.2})", source, similarity)],
            Err(e) => debug!(id = %record.id, error = %e, "Merge refused, filling gaps only"),
        }
    }
    fill_missing(record, retrieved, source)
}

// ============================================================================
// Identifier checks
// ============================================================================

/// Drop links that answer with a server error
pub async fn remove_urls_with_500_errors(providers: &Providers, record: &mut Record) -> EndpointResult {
    let mut lines = Vec::new();
    for key in [URL, FULLTEXT] {
        let Some(link) = record.get(key).map(str::to_string) else {
            continue;
        };
        match providers.doi.link_status(&link).await {
            Ok(status) if status >= 500 => {
                record.remove_field(key);
                lines.push(format!("Removed {} ({} returned {})", key, link, status));
            }
            Ok(_) => {}
            Err(e) => debug!(id = %record.id, url = %link, error = %e, "Link check failed"),
        }
    }
    Ok(lines)
}

/// Drop identifiers that are syntactically invalid
pub fn remove_broken_ids(record: &mut Record) -> Vec<String> {
    let Some(doi) = record.get(DOI).map(str::to_string) else {
        return Vec::new();
    };
    let normalized = normalize_doi(&doi);
    if VALID_DOI.is_match(&normalized) {
        return Vec::new();
    }
    record.remove_field(DOI);
    vec![format!("Removed broken doi ({})", doi)]
}

/// Flag fields that disagree with the DOI's metadata
pub async fn global_ids_consistency_check(providers: &Providers, record: &mut Record) -> EndpointResult {
    let Some(doi) = record.known(DOI).map(str::to_string) else {
        return Ok(Vec::new());
    };
    let retrieved = match providers.doi.resolve(&doi).await {
        Ok(retrieved) => retrieved,
        Err(e) => {
            return match provider_failure!("doi", e) {
                Some(failure) => Err(failure),
                None => Ok(Vec::new()),
            }
        }
    };
    let mut lines = Vec::new();
    for key in [TITLE, AUTHOR, JOURNAL, BOOKTITLE] {
        let (Some(ours), Some(theirs)) = (record.known(key), retrieved.known(key)) else {
            continue;
        };
        if ours.chars().count() < 5 || theirs.chars().count() < 5 {
            continue;
        }
        if partial_ratio(&ours.to_lowercase(), &theirs.to_lowercase()) < 0.7 {
            record.masterdata_provenance.add_note(key, "disagreement with doi metadata");
            lines.push(format!("{} disagrees with doi metadata ({})", key, theirs));
        }
    }
    Ok(lines)
}

// ============================================================================
// DOI
// ============================================================================

/// Harvest a DOI from the record's landing page
pub async fn get_doi_from_urls(providers: &Providers, record: &mut Record, similarity: f64) -> EndpointResult {
    if record.has(DOI) {
        return Ok(Vec::new());
    }
    let Some(link) = record.known(URL).or_else(|| record.known(FULLTEXT)).map(str::to_string) else {
        return Ok(Vec::new());
    };
    let doi = match providers.doi.harvest_doi(&link).await {
        Ok(Some(doi)) => doi,
        Ok(None) => return Ok(Vec::new()),
        Err(e) => {
            debug!(id = %record.id, url = %link, error = %e, "Cannot fetch landing page");
            return Ok(Vec::new());
        }
    };
    let retrieved = match providers.doi.resolve(&doi).await {
        Ok(retrieved) => retrieved,
        Err(e) => {
            debug!(id = %record.id, doi = %doi, error = %e, "Harvested doi does not resolve");
            return Ok(Vec::new());
        }
    };
    let score = retrieval_similarity(record, &retrieved);
    if score < similarity.max(0.95) {
        debug!(id = %record.id, doi = %doi, score, "Harvested doi does not match");
        return Ok(Vec::new());
    }
    record.update_field(DOI, &doi, &link, "");
    let mut lines = vec![format!("Retrieved doi {} from {}", doi, link)];
    lines.extend(merge_or_fill(record, &retrieved, &doi_source(&doi), score, similarity));
    Ok(lines)
}

/// Metadata negotiated from doi.org
///
/// Fields the record lacks are always filled; existing identifying fields
/// are replaced only when the response matches the record.
pub async fn get_masterdata_from_doi(providers: &Providers, record: &mut Record, similarity: f64) -> EndpointResult {
    let Some(doi) = record.known(DOI).map(str::to_string) else {
        return Ok(Vec::new());
    };
    match providers.doi.resolve(&doi).await {
        Ok(retrieved) => {
            let score = retrieval_similarity(record, &retrieved);
            Ok(merge_or_fill(record, &retrieved, &doi_source(&normalize_doi(&doi)), score, similarity))
        }
        Err(e) => match provider_failure!("doi", e) {
            Some(failure) => Err(failure),
            None => {
                debug!(id = %record.id, doi = %doi, "DOI not registered");
                Ok(Vec::new())
            }
        },
    }
}

// ============================================================================
// Bibliographic providers
// ============================================================================

/// Crossref bibliographic query
pub async fn get_masterdata_from_crossref(providers: &Providers, record: &mut Record, similarity: f64) -> EndpointResult {
    if record.known(TITLE).is_none() {
        return Ok(Vec::new());
    }
    let hits = match providers.crossref.query_bibliographic(record, 5).await {
        Ok(hits) => hits,
        Err(e) => {
            return match provider_failure!("crossref", e) {
                Some(failure) => Err(failure),
                None => Ok(Vec::new()),
            }
        }
    };
    let best = hits
        .iter()
        .map(|hit| (retrieval_similarity(record, hit), hit))
        .filter(|(score, _)| crossref_accepts(*score, similarity))
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let Some((score, hit)) = best else {
        return Ok(Vec::new());
    };
    let source = hit
        .known(DOI)
        .map(|d| format!("https://api.crossref.org/works/{}", d))
        .unwrap_or_else(|| "https://api.crossref.org/works".to_string());
    if hit.get(fields::CROSSMARK).is_some_and(|c| c.contains("retract")) {
        prescreen_exclude(record, "retracted");
        return Ok(vec!["Excluded (retracted according to crossmark)".to_string()]);
    }
    Ok(merge_or_fill(record, hit, &source, score, similarity))
}

fn is_withdrawn(title: &str) -> bool {
    title.contains("(Withdrawn)") || title.starts_with("Withdrawn")
}

/// DBLP title query
///
/// A match overrides the entry type and container and is treated as
/// prepared.
pub async fn get_masterdata_from_dblp(providers: &Providers, record: &mut Record, similarity: f64) -> EndpointResult {
    let Some(title) = record.known(TITLE).map(str::to_string) else {
        return Ok(Vec::new());
    };
    let query = title.replace('-', "_");
    let hits = match providers.dblp.search(&query, 20, 0).await {
        Ok(hits) => hits,
        Err(e) => {
            return match provider_failure!("dblp", e) {
                Some(failure) => Err(failure),
                None => Ok(Vec::new()),
            }
        }
    };
    for hit in &hits {
        let mut probe = record.clone();
        probe.entry_type = hit.entry_type.clone();
        let score = retrieval_similarity(&probe, hit);
        if !dblp_accepts(score, similarity) {
            continue;
        }
        let hit_title = hit.get(TITLE).unwrap_or("");
        if is_withdrawn(hit_title) {
            prescreen_exclude(record, "retracted");
            return Ok(vec!["Excluded (withdrawn according to dblp)".to_string()]);
        }
        let source = hit
            .get(DBLP_KEY)
            .map(|k| format!("https://dblp.org/rec/{}", k))
            .unwrap_or_else(|| "https://dblp.org".to_string());
        let mut lines = Vec::new();
        if record.entry_type != hit.entry_type && !record.is_curated() {
            lines.push(format!("Set from {} to {} (dblp)", record.entry_type, hit.entry_type));
            record.entry_type = hit.entry_type.clone();
        }
        for container in [JOURNAL, BOOKTITLE] {
            if let Some(value) = hit.known(container) {
                record.update_field(container, value, &source, "");
            }
        }
        if let Some(key) = hit.get(DBLP_KEY) {
            record.update_field(DBLP_KEY, key, &source, "");
        }
        lines.extend(merge_or_fill(record, hit, &source, score, similarity));
        if record.update_masterdata_provenance() == RecordState::MdPrepared {
            lines.push("Prepared with dblp".to_string());
        }
        return Ok(lines);
    }
    Ok(Vec::new())
}

/// Semantic Scholar title search, filling missing fields only
pub async fn get_masterdata_from_semantic_scholar(
    providers: &Providers,
    record: &mut Record,
    similarity: f64,
) -> EndpointResult {
    let Some(title) = record.known(TITLE).map(str::to_string) else {
        return Ok(Vec::new());
    };
    let hits = match providers.semantic_scholar.search(&title, 3).await {
        Ok(hits) => hits,
        Err(e) => {
            return match provider_failure!("semantic_scholar", e) {
                Some(failure) => Err(failure),
                None => Ok(Vec::new()),
            }
        }
    };
    let Some(hit) = hits.first() else {
        return Ok(Vec::new());
    };
    let mut probe = hit.clone();
    probe.entry_type = record.entry_type.clone();
    if !semantic_scholar_accepts(retrieval_similarity(record, &probe), similarity) {
        return Ok(Vec::new());
    }
    let source = hit
        .get(fields::SEMANTIC_SCHOLAR_ID)
        .map(|id| format!("https://api.semanticscholar.org/{}", id))
        .unwrap_or_else(|| "https://api.semanticscholar.org".to_string());
    Ok(fill_missing(record, &probe, &source))
}

/// Open Library by ISBN, for books
pub async fn get_masterdata_from_open_library(providers: &Providers, record: &mut Record) -> EndpointResult {
    if record.entry_type != "book" {
        return Ok(Vec::new());
    }
    let Some(isbn) = record.known("isbn").map(str::to_string) else {
        return Ok(Vec::new());
    };
    match providers.open_library.by_isbn(&isbn).await {
        Ok(retrieved) => Ok(fill_missing(record, &retrieved, &format!("https://openlibrary.org/isbn/{}", isbn))),
        Err(e) => match provider_failure!("open_library", e) {
            Some(failure) => Err(failure),
            None => Ok(Vec::new()),
        },
    }
}

/// Derive a missing year from other articles of the same issue
pub async fn get_year_from_vol_iss_jour_crossref(providers: &Providers, record: &mut Record) -> EndpointResult {
    if record.has(YEAR) || record.entry_type != "article" {
        return Ok(Vec::new());
    }
    let (Some(journal), Some(volume)) = (record.known(JOURNAL), record.known(VOLUME)) else {
        return Ok(Vec::new());
    };
    let mut probe = Record::new(record.id.clone(), "article");
    probe.set_raw(JOURNAL, journal);
    probe.set_raw(VOLUME, volume);
    if let Some(number) = record.known(NUMBER) {
        probe.set_raw(NUMBER, number);
    }
    let hits = match providers.crossref.query_bibliographic(&probe, 20).await {
        Ok(hits) => hits,
        Err(e) => {
            return match provider_failure!("crossref", e) {
                Some(failure) => Err(failure),
                None => Ok(Vec::new()),
            }
        }
    };
    let mut years: HashMap<String, usize> = HashMap::new();
    for hit in &hits {
        let same_issue = hit.get(VOLUME) == probe.get(VOLUME)
            && (probe.get(NUMBER).is_none() || hit.get(NUMBER) == probe.get(NUMBER))
            && hit
                .get(JOURNAL)
                .is_some_and(|j| partial_ratio(&j.to_lowercase(), &journal_lower(&probe)) > 0.9);
        if let (true, Some(year)) = (same_issue, hit.get(YEAR)) {
            *years.entry(year.to_string()).or_default() += 1;
        }
    }
    let Some((year, count)) = years.into_iter().max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0))) else {
        return Ok(Vec::new());
    };
    if count <= 3 {
        return Ok(Vec::new());
    }
    record.update_field(YEAR, &year, "https://api.crossref.org/works", "");
    Ok(vec![format!("Set year {} from {} articles of the same issue", year, count)])
}

fn journal_lower(record: &Record) -> String {
    record.get(JOURNAL).unwrap_or("").to_lowercase()
}

// ============================================================================
// Local index
// ============================================================================

/// Merge the curated or prepared version held by the local index
pub async fn get_record_from_local_index(index: Option<&LocalIndex>, record: &mut Record) -> EndpointResult {
    let Some(index) = index else {
        return Ok(Vec::new());
    };
    match index.retrieve(record).await {
        Ok(Some(indexed)) => {
            let source = format!("local_index:{}", indexed.repo_path.display());
            match merge(record, &indexed.record, &source) {
                Ok(()) => {
                    if indexed.record.is_curated() && record.status.ordinal() < RecordState::MdPrepared.ordinal() {
                        record.set_status(RecordState::MdPrepared);
                    }
                    Ok(vec![format!("Merged record from {}", source)])
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Local index record not mergeable");
                    Ok(Vec::new())
                }
            }
        }
        Ok(None) => Ok(Vec::new()),
        Err(e) => {
            debug!(id = %record.id, error = %e, "Local index lookup failed");
            Ok(Vec::new())
        }
    }
}

/// Open-access PDF location for a DOI
pub async fn open_access_url(unpaywall: &UnpaywallClient, record: &Record) -> Option<String> {
    let doi = record.known(DOI)?;
    match unpaywall.pdf_url(doi).await {
        Ok(url) => url,
        Err(e) => {
            debug!(id = %record.id, error = %e, "Unpaywall lookup failed");
            None
        }
    }
}
