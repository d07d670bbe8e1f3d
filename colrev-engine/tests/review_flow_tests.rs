//! Prescreen, screen and data on committed records, then status and trace

mod helpers;

use colrev_common::paths::DATA_FILE;
use colrev_common::{ProcessType, Record, RecordState};
use colrev_engine::ops::data::{self, DataOptions};
use colrev_engine::ops::prescreen::{self, PrescreenOptions};
use colrev_engine::ops::screen::{self, ScreenOptions};
use colrev_engine::ops::{status, trace};
use helpers::{commit_records, init_review};
use pretty_assertions::assert_eq;

fn record(id: &str, status: RecordState) -> Record {
    Record::new(id, "article")
        .with_field("author", "Smith, John")
        .with_field("title", "Platform ecosystems and their governance")
        .with_field("journal", "Information Systems Research")
        .with_field("year", "2020")
        .with_field("volume", "31")
        .with_field("number", "2")
        .with_origin(format!("lr.bib/{}", id))
        .with_status(status)
}

#[test]
fn test_prescreen_include_all() {
    let dir = tempfile::tempdir().unwrap();
    let mut review = init_review(dir.path());
    commit_records(
        &mut review,
        ProcessType::Dedupe,
        vec![
            record("Smith2020", RecordState::MdProcessed),
            record("Smith2020a", RecordState::MdProcessed),
        ],
    );

    let summary = prescreen::run(
        &mut review,
        PrescreenOptions {
            include_all: true,
            ..PrescreenOptions::default()
        },
    )
    .unwrap();
    assert_eq!(summary.included, 2);
    assert!(summary.commit.is_some());
    let records = review.load_records().unwrap();
    assert!(records.values().all(|r| r.status == RecordState::RevPrescreenIncluded));
    assert!(status::run(&review).unwrap().contains("Next operation: colrev pdf_get"));
}

#[test]
fn test_screen_and_synthesize_complete_the_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let mut review = init_review(dir.path());
    commit_records(
        &mut review,
        ProcessType::PdfPrep,
        vec![record("Smith2020", RecordState::PdfPrepared)],
    );

    let screened = screen::run(
        &mut review,
        ScreenOptions {
            include_all: true,
            ..ScreenOptions::default()
        },
    )
    .unwrap();
    assert_eq!(screened.included, 1);

    data::run(
        &mut review,
        DataOptions {
            add_endpoint: Some("structured".to_string()),
            ..DataOptions::default()
        },
    )
    .unwrap();

    // The extraction row starts as TODO
    let first = data::run(&mut review, DataOptions::default()).unwrap();
    assert_eq!(first.synthesized, 0);
    let data_path = review.path.join(DATA_FILE);
    let content = std::fs::read_to_string(&data_path).unwrap();
    assert!(content.contains("Smith2020"));
    std::fs::write(&data_path, content.replace("TODO", "Governance modes of platforms")).unwrap();

    let second = data::run(&mut review, DataOptions::default()).unwrap();
    assert_eq!(second.synthesized, 1);
    assert_eq!(
        review.load_records().unwrap()["Smith2020"].status,
        RecordState::RevSynthesized
    );
    assert!(status::run(&review).unwrap().contains("Review iteration completed"));

    let steps = trace::run(&review, "Smith2020").unwrap();
    let statuses: Vec<String> = steps
        .iter()
        .flat_map(|s| s.changes.iter())
        .map(|c| c.to_string())
        .filter(|c| c.contains("colrev_status"))
        .collect();
    assert_eq!(
        statuses,
        vec![
            "+ colrev_status: pdf_prepared".to_string(),
            "~ colrev_status: pdf_prepared -> rev_included".to_string(),
            "~ colrev_status: rev_included -> rev_synthesized".to_string(),
        ]
    );
}
