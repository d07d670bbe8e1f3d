//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use colrev_common::config::{EnvConfig, UserIdentity};
use colrev_common::paths::RECORDS_FILE;
use colrev_common::{ProcessType, Record, Result};
use colrev_engine::clients::ProviderUrls;
use colrev_engine::commit::CommitRequest;
use colrev_engine::dataset::Records;
use colrev_engine::ops::init::{self, InitOptions};
use colrev_engine::pdf::hash::PageHasher;
use colrev_engine::ReviewManager;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn env(dir: &Path) -> EnvConfig {
    EnvConfig {
        env_dir: dir.join("env"),
        user: UserIdentity {
            name: "Tester".to_string(),
            email: "tester@example.org".to_string(),
        },
    }
}

/// A fresh review in `dir/review` with its environment in `dir/env`
pub fn init_review(dir: &Path) -> ReviewManager {
    let root = dir.join("review");
    std::fs::create_dir_all(&root).unwrap();
    init::run(
        &root,
        env(dir),
        InitOptions {
            title: Some("Digital platforms".to_string()),
            ..InitOptions::default()
        },
    )
    .unwrap()
}

/// Metadata providers that answer 404 to everything
pub async fn offline_providers() -> (MockServer, ProviderUrls) {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let urls = ProviderUrls::all(&server.uri());
    (server, urls)
}

pub fn to_records(list: Vec<Record>) -> Records {
    list.into_iter().map(|r| (r.id.clone(), r)).collect()
}

/// Write `records` and commit them as a manual edit
pub fn commit_records(review: &mut ReviewManager, process: ProcessType, list: Vec<Record>) {
    review.save_records(&to_records(list)).unwrap();
    review
        .create_commit(
            CommitRequest::new(process, "Set up records")
                .manual()
                .path(RECORDS_FILE),
        )
        .unwrap();
}

pub fn write_source(review: &ReviewManager, name: &str, content: &str) {
    let path = review.path.join("search").join(name);
    std::fs::write(path, content).unwrap();
}

/// A PDF with one page per entry of `pages`, each showing that text
pub fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Hasher that reports a publisher cover on page 1 of every PDF
pub struct CoverPageHasher {
    pub cover_hash: String,
}

impl PageHasher for CoverPageHasher {
    fn page_hash(&self, _pdf: &Path, page: u32, hash_size: u32) -> Result<String> {
        if page == 1 && hash_size == colrev_engine::pdf::hash::FINGERPRINT_HASH_SIZE {
            return Ok(self.cover_hash.clone());
        }
        Ok("0f".repeat((hash_size * hash_size / 8) as usize))
    }
}
