//! Load, prep and dedupe against offline metadata providers

mod helpers;

use colrev_common::{Record, RecordState};
use colrev_engine::dedupe::{self, DedupeOptions};
use colrev_engine::ops::load::{self, LoadOptions};
use colrev_engine::prep::{self, PrepOptions};
use helpers::{init_review, offline_providers, write_source};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

const WEBSTER_INCOMPLETE: &str = r#"@article{WebsterWatson2002,
  author = {Webster, J. and Watson, R.},
  title = {Analyzing the Past to Prepare for the Future: Writing a Literature Review},
  year = {2002},
  journal = {MIS Quarterly}
}
"#;

fn webster_complete(key: &str, title: &str) -> String {
    format!(
        "@article{{{},\n  author = {{Webster, Jane and Watson, Richard T.}},\n  title = {{{}}},\n  year = {{2002}},\n  journal = {{MIS Quarterly}},\n  volume = {{26}},\n  number = {{2}}\n}}\n",
        key, title
    )
}

#[tokio::test]
async fn test_import_then_prepare_flags_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, urls) = offline_providers().await;
    let mut review = init_review(dir.path()).with_providers(urls);
    write_source(&review, "lr.bib", WEBSTER_INCOMPLETE);

    let loaded = load::run(&mut review, LoadOptions::default()).unwrap();
    assert_eq!(loaded.imported, 1);
    assert_eq!(loaded.new_sources, vec!["search/lr.bib".to_string()]);

    let summary = prep::run(&mut review, PrepOptions::default()).await.unwrap();
    assert_eq!(summary.needs_manual_preparation, 1);
    assert!(summary.commit.is_some());

    let records = review.load_records().unwrap();
    let record = records.values().next().unwrap();
    assert_eq!(record.status, RecordState::MdNeedsManualPreparation);
    assert!(record.masterdata_provenance.has_note("volume", "missing"));
    assert!(record.masterdata_provenance.has_note("number", "missing"));
    assert!(review.git.changes().unwrap().is_empty());
}

#[tokio::test]
async fn test_dedupe_merges_exact_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, urls) = offline_providers().await;
    let mut review = init_review(dir.path()).with_providers(urls);
    write_source(
        &review,
        "scopus.bib",
        &webster_complete(
            "WebsterWatson2002",
            "Analyzing the Past to Prepare for the Future: Writing a literature review",
        ),
    );
    write_source(
        &review,
        "wos.bib",
        &webster_complete(
            "Webster2002a",
            "Analyzing the Past to Prepare for the Future: Writing a Literature Review",
        ),
    );

    let loaded = load::run(
        &mut review,
        LoadOptions {
            keep_ids: true,
            combine: true,
        },
    )
    .unwrap();
    assert_eq!(loaded.imported, 2);
    assert_eq!(loaded.commits.len(), 1);

    let prepared = prep::run(
        &mut review,
        PrepOptions {
            keep_ids: true,
            ..PrepOptions::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(prepared.prepared, 2);

    let before: Vec<Record> = review.load_records().unwrap().into_values().collect();
    let expected_origins: BTreeSet<String> = before.iter().flat_map(|r| r.origin.clone()).collect();

    let summary = dedupe::run(&mut review, DedupeOptions::default()).unwrap();
    assert_eq!(summary.merged, 1);

    let records = review.load_records().unwrap();
    assert_eq!(records.len(), 1);
    let merged = records.values().next().unwrap();
    assert_eq!(merged.status, RecordState::MdProcessed);
    // Origins of both parts, each once
    let origins: BTreeSet<String> = merged.origin.iter().cloned().collect();
    assert_eq!(origins, expected_origins);
    assert_eq!(merged.origin.len(), 2);
    assert!(merged.origin.iter().any(|o| o.starts_with("scopus.bib/")));
    assert!(merged.origin.iter().any(|o| o.starts_with("wos.bib/")));

    let log = review.git.log(Some(1)).unwrap();
    assert!(log[0].message.contains("dedupe"));
}

#[tokio::test]
async fn test_every_status_is_an_enumerated_state() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, urls) = offline_providers().await;
    let mut review = init_review(dir.path()).with_providers(urls);
    write_source(&review, "lr.bib", WEBSTER_INCOMPLETE);
    write_source(
        &review,
        "scopus.bib",
        &webster_complete("Other2002", "Writing a literature review on platforms"),
    );
    load::run(&mut review, LoadOptions::default()).unwrap();
    prep::run(&mut review, PrepOptions::default()).await.unwrap();

    for header in review.dataset.record_headers(5).unwrap() {
        assert!(RecordState::ALL.contains(&header.status), "{}", header.id);
    }
}
