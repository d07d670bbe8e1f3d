//! Records file: canonical round trip and status validation

mod helpers;

use colrev_common::{Error, Record, RecordState};
use colrev_engine::dataset::Dataset;
use helpers::to_records;
use pretty_assertions::assert_eq;

fn sample() -> Vec<Record> {
    let mut curated = Record::new("Lee2019", "inproceedings")
        .with_field("author", "Lee, Ann")
        .with_field("title", "Platform ecosystems")
        .with_field("booktitle", "International Conference on Information Systems")
        .with_field("year", "2019")
        .with_origin("icis.bib/77")
        .with_status(RecordState::RevIncluded);
    curated.masterdata_provenance.set("CURATED", "https://example.org/icis", "");
    vec![
        Record::new("Webster2002", "article")
            .with_field("author", "Webster, Jane and Watson, Richard T.")
            .with_field(
                "title",
                "Analyzing the Past to Prepare for the Future: Writing a Literature Review",
            )
            .with_field("journal", "MIS Quarterly")
            .with_field("year", "2002")
            .with_field("abstract", "Reviews prior work, with a comma")
            .with_origin("lr.bib/1")
            .with_origin("scopus.bib/0012")
            .with_status(RecordState::MdProcessed),
        curated,
    ]
}

#[test]
fn test_load_save_load_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::new(dir.path());
    dataset.save_all(&to_records(sample())).unwrap();
    let first = std::fs::read(dataset.records_path()).unwrap();

    let records = dataset.load_all().unwrap();
    dataset.save_all(&records).unwrap();
    let second = std::fs::read(dataset.records_path()).unwrap();

    assert_eq!(String::from_utf8(first).unwrap(), String::from_utf8(second).unwrap());
    assert!(dataset.is_canonical().unwrap());
    assert_eq!(dataset.load_all().unwrap(), records);
}

#[test]
fn test_unknown_status_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::new(dir.path());
    dataset.save_all(&to_records(sample())).unwrap();
    let content = std::fs::read_to_string(dataset.records_path()).unwrap();
    std::fs::write(
        dataset.records_path(),
        content.replace("{md_processed}", "{rev_maybe}"),
    )
    .unwrap();

    let err = dataset.load_all().unwrap_err();
    assert!(matches!(err, Error::StatusFieldValue { ref value, .. } if value == "rev_maybe"));
}
