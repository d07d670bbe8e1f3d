//! Deduplication for curated outlet repositories
//!
//! A curation mirrors complete tables of contents, so duplicates are only
//! sought among records of the same journal issue or conference year (the
//! TOC key). Outlet, year, volume and number agree by construction; author
//! and title decide.

use super::Decision;
use crate::dataset::Records;
use colrev_common::record::{similarity, toc_key};
use colrev_common::settings::{SearchScript, SearchType, Settings};
use colrev_common::text::{ratio, round4};
use colrev_common::{Record, RecordState};
use std::collections::HashMap;
use tracing::{debug, info};

const AUTHOR_WEIGHT: f64 = 0.4;
const TITLE_WEIGHT: f64 = 0.6;

/// PDF-sourced pairs below this are not worth validating
pub const MIN_PDF_SIMILARITY: f64 = 0.7;

/// Candidates above this are listed for the user
const POSSIBLE_DUPLICATE: f64 = 0.8;
const DUPLICATE: f64 = 0.95;

/// Author/title similarity of two records in the same TOC group
pub fn toc_similarity(a: &Record, b: &Record) -> f64 {
    let author = ratio(a.get("author").unwrap_or(""), b.get("author").unwrap_or(""));
    let title = ratio(
        &a.get("title").unwrap_or("").to_lowercase(),
        &b.get("title").unwrap_or("").to_lowercase(),
    );
    round4(AUTHOR_WEIGHT * author + TITLE_WEIGHT * title)
}

fn from_source(record: &Record, source: &str) -> bool {
    let prefix = source.rsplit('/').next().unwrap_or(source);
    record.origin_sources().contains(&prefix)
}

fn overlapping_colrev_ids(a: &Record, b: &Record) -> bool {
    a.colrev_id.iter().any(|c| b.colrev_id.contains(c))
}

/// Records already in the curation (past `md_prepared`, not excluded)
fn is_curated_entry(record: &Record) -> bool {
    record.status.is_post_md_prepared()
        && record.status != RecordState::MdPrepared
        && record.status != RecordState::RevPrescreenExcluded
}

/// Whether any origin of the record comes from a PDF source
fn is_pdf_sourced(record: &Record, settings: &Settings) -> bool {
    settings.sources.iter().any(|s| {
        (s.search_type == SearchType::Pdfs || s.search_script == SearchScript::PdfsDir)
            && from_source(record, &s.origin_prefix())
    })
}

fn by_toc<'a>(records: impl Iterator<Item = &'a Record>) -> HashMap<String, Vec<&'a Record>> {
    let mut groups: HashMap<String, Vec<&Record>> = HashMap::new();
    for record in records {
        if let Some(key) = toc_key(record) {
            groups.entry(key).or_default().push(record);
        }
    }
    groups
}

/// `curation_full_outlet_dedupe`
///
/// New records (`md_prepared`, optionally from `selected_source` only) are
/// matched against curated records of the same TOC group from other sources.
/// Shared colrev_ids merge directly. A PDF-sourced record merges with its
/// best candidate when `validate(pdf_record, candidate)` confirms that the
/// PDF belongs to the candidate's metadata.
pub fn full_outlet(
    records: &Records,
    settings: &Settings,
    selected_source: Option<&str>,
    validate: &dyn Fn(&Record, &Record) -> bool,
) -> Vec<Decision> {
    let new_records: Vec<&Record> = records
        .values()
        .filter(|r| r.status == RecordState::MdPrepared)
        .filter(|r| selected_source.map_or(true, |s| from_source(r, s)))
        .collect();
    let curated = by_toc(records.values().filter(|r| is_curated_entry(r)));
    info!(records = new_records.len(), groups = curated.len(), "Curation dedupe");

    let mut decisions = Vec::new();
    for record in new_records {
        let Some(key) = toc_key(record) else { continue };
        let Some(group) = curated.get(&key) else { continue };
        let candidates: Vec<&&Record> = group
            .iter()
            .filter(|c| selected_source.map_or(true, |s| !from_source(c, s)))
            .collect();

        if let Some(same) = candidates.iter().find(|c| overlapping_colrev_ids(record, c)) {
            decisions.push(Decision::Duplicate {
                id1: record.id.clone(),
                id2: same.id.clone(),
                score: None,
            });
            continue;
        }

        if !is_pdf_sourced(record, settings) {
            continue;
        }
        let best = candidates
            .iter()
            .map(|c| (*c, toc_similarity(record, c)))
            .filter(|(_, score)| *score >= MIN_PDF_SIMILARITY)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((candidate, score)) = best {
            if validate(record, candidate) {
                debug!(id = %record.id, candidate = %candidate.id, score, "PDF validates");
                decisions.push(Decision::Duplicate {
                    id1: candidate.id.clone(),
                    id2: record.id.clone(),
                    score: Some(score),
                });
            }
        }
    }
    decisions
}

/// `curation_missing_dedupe`
///
/// Records of `selected_source` are matched against curated records of the
/// same TOC group by record similarity. Strong matches merge, records
/// without a plausible candidate join the curation, the rest are left as
/// potential duplicates for the user.
pub fn missing(records: &Records, selected_source: &str) -> Vec<Decision> {
    let curated = by_toc(records.values().filter(|r| is_curated_entry(r)));
    let mut decisions = Vec::new();

    for record in records
        .values()
        .filter(|r| r.status == RecordState::MdPrepared && from_source(r, selected_source))
    {
        if record.get("title").unwrap_or("").is_empty() {
            continue;
        }
        let group = toc_key(record)
            .and_then(|key| curated.get(&key))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let best = group
            .iter()
            .filter(|c| c.id != record.id)
            .map(|c| {
                let score = if overlapping_colrev_ids(record, c) {
                    1.0
                } else {
                    similarity(record, c)
                };
                (*c, score)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        decisions.push(match best {
            Some((candidate, score)) if score >= DUPLICATE => Decision::Duplicate {
                id1: candidate.id.clone(),
                id2: record.id.clone(),
                score: Some(score),
            },
            Some((candidate, score)) if score > POSSIBLE_DUPLICATE => {
                Decision::PotentialDuplicate {
                    id1: record.id.clone(),
                    id2: candidate.id.clone(),
                    score,
                }
            }
            _ => Decision::NoDuplicate {
                id: record.id.clone(),
            },
        });
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use colrev_common::settings::{ConversionScript, ReviewType, SearchSource};

    fn article(id: &str, author: &str, title: &str, origin: &str, status: RecordState) -> Record {
        Record::new(id, "article")
            .with_field("author", author)
            .with_field("title", title)
            .with_field("journal", "MIS Quarterly")
            .with_field("year", "2002")
            .with_field("volume", "26")
            .with_field("number", "2")
            .with_origin(origin)
            .with_status(status)
    }

    fn records_of(list: Vec<Record>) -> Records {
        list.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    fn settings_with_pdf_source() -> Settings {
        let mut settings = Settings::new("curation", ReviewType::CuratedMasterdata);
        settings.sources.push(SearchSource {
            filename: "search/pdfs.bib".to_string(),
            search_type: SearchType::Pdfs,
            source_name: "PDFs".to_string(),
            source_identifier: String::new(),
            search_parameters: String::new(),
            search_script: SearchScript::PdfsDir,
            conversion_script: ConversionScript::Bibtex,
        });
        settings
    }

    const TITLE: &str = "Analyzing the past to prepare for the future";

    #[test]
    fn similarity_weighs_title_more() {
        let a = article("A", "Webster, J.", TITLE, "x.bib/A", RecordState::MdPrepared);
        let b = article("B", "Someone, Else", TITLE, "y.bib/B", RecordState::MdProcessed);
        let score = toc_similarity(&a, &b);
        assert!(score >= 0.6 && score < 1.0);
    }

    #[test]
    fn overlapping_colrev_ids_merge_within_toc() {
        let mut new = article("New", "Webster, J.", TITLE, "crossref.bib/1", RecordState::MdPrepared);
        let mut old = article("Old", "Webster, J.", TITLE, "dblp.bib/2", RecordState::MdProcessed);
        new.add_colrev_id("colrev_id1:|a|misq|26|2|2002|webster|analyzing");
        old.add_colrev_id("colrev_id1:|a|misq|26|2|2002|webster|analyzing");
        let records = records_of(vec![old, new]);
        let settings = Settings::new("curation", ReviewType::CuratedMasterdata);

        let decisions = full_outlet(&records, &settings, Some("crossref.bib"), &|_, _| false);
        assert_eq!(
            decisions,
            vec![Decision::Duplicate {
                id1: "New".to_string(),
                id2: "Old".to_string(),
                score: None
            }]
        );
    }

    #[test]
    fn pdf_records_need_validation() {
        let records = records_of(vec![
            article("Old", "Webster, J.", TITLE, "dblp.bib/2", RecordState::MdProcessed),
            article("Pdf", "Webster, Jane", TITLE, "pdfs.bib/p1", RecordState::MdPrepared),
        ]);
        let settings = settings_with_pdf_source();

        assert!(full_outlet(&records, &settings, None, &|_, _| false).is_empty());
        let decisions = full_outlet(&records, &settings, None, &|_, _| true);
        assert!(matches!(
            &decisions[0],
            Decision::Duplicate { id1, id2, .. } if id1 == "Old" && id2 == "Pdf"
        ));
    }

    #[test]
    fn missing_records_join_the_curation() {
        let records = records_of(vec![
            article("Old", "Webster, J.", TITLE, "dblp.bib/2", RecordState::MdProcessed),
            article("Same", "Webster, J.", TITLE, "extra.bib/1", RecordState::MdPrepared),
            article(
                "Other",
                "Smith, K.",
                "Blockchain governance in public administration",
                "extra.bib/2",
                RecordState::MdPrepared,
            ),
        ]);
        let decisions = missing(&records, "search/extra.bib");
        assert_eq!(decisions.len(), 2);
        assert!(matches!(&decisions[0], Decision::Duplicate { id2, .. } if id2 == "Same"));
        assert_eq!(
            decisions[1],
            Decision::NoDuplicate {
                id: "Other".to_string()
            }
        );
    }
}
