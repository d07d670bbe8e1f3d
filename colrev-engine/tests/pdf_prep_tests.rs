//! Cover page removal during pdf_prep with an injected page hasher

mod helpers;

use colrev_common::settings::PdfPrepScript;
use colrev_common::{ProcessType, Record, RecordState};
use colrev_engine::pdf::document;
use colrev_engine::pdf::ocr::DockerOcr;
use colrev_engine::pdf::pages::COVER_PAGE_HASHES;
use colrev_engine::pdf::prep::{self, PdfPrepContext, PdfPrepOptions};
use helpers::{commit_records, init_review, write_pdf, CoverPageHasher};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_blacklisted_first_page_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let mut review = init_review(dir.path());
    let pdf = review.path.join("pdfs/Smith2020.pdf");
    std::fs::create_dir_all(pdf.parent().unwrap()).unwrap();
    write_pdf(
        &pdf,
        &[
            "Downloaded by a university library",
            "Platform ecosystems and their governance",
            "References",
        ],
    );
    commit_records(
        &mut review,
        ProcessType::PdfGet,
        vec![Record::new("Smith2020", "article")
            .with_field("author", "Smith, John")
            .with_field("title", "Platform ecosystems and their governance")
            .with_field("journal", "Information Systems Research")
            .with_field("year", "2020")
            .with_field("file", "pdfs/Smith2020.pdf")
            .with_origin("lr.bib/1")
            .with_status(RecordState::PdfImported)],
    );

    let ctx = Arc::new(PdfPrepContext {
        root: review.path.clone(),
        coverpages_dir: review.env.coverpages_dir(),
        lastpages_dir: review.env.lastpages_dir(),
        hasher: Arc::new(CoverPageHasher {
            cover_hash: COVER_PAGE_HASHES[0].to_string(),
        }),
        ocr: Arc::new(DockerOcr::new()),
        scripts: vec![PdfPrepScript::RemoveCoverpage],
        timeout: Duration::from_secs(60),
    });
    let summary = prep::run_with_context(&mut review, PdfPrepOptions::default(), ctx)
        .await
        .unwrap();
    assert_eq!(summary.prepared, 1);
    assert!(summary.commit.is_some());

    let records = review.load_records().unwrap();
    let record = &records["Smith2020"];
    assert_eq!(record.status, RecordState::PdfPrepared);
    let file = review.path.join(record.get("file").unwrap());
    assert_eq!(document::page_count(&file).unwrap(), 2);
    assert!(review.path.join("pdfs/Smith2020_wo_cp.pdf").exists());
    assert!(review.env.coverpages_dir().join("Smith2020.pdf").exists());
    assert!(record.colrev_pdf_id.as_deref().unwrap().starts_with("cpid1:"));
}
