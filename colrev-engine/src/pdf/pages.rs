//! Publisher cover and last pages
//!
//! A page is recognized by its 16×16 average hash or by publisher notice
//! text. Detected pages are moved out of the PDF into the environment's
//! `.coverpages/` or `.lastpages/` directory; the trimmed PDF is written next
//! to the original with a `_wo_cp` / `_wo_lp` suffix.

use super::document::{self, compact};
use super::hash::{PageHasher, FINGERPRINT_HASH_SIZE};
use colrev_common::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// First-page hashes of known publisher cover pages
pub const COVER_PAGE_HASHES: [&str; 10] = [
    "ffff83ff81ff81ffc3ff803f81ff80ffc03fffffffffffffffff96ff9fffffff",
    "ffffffffc0ffc781c007c007cfffc7ffffffffffffffc03fc007c003c827ffff",
    "84ff847ffeff83ff800783ff801f800180038fffffffffffbfff8007bffff83f",
    "83ff03ff03ff83ffffff807f807f9fff87ffffffffffffffffff809fbfffffff",
    "ffffffffc0ffc781c03fc01fffffffffffffffffffffc03fc01fc003ffffffff",
    "ffffffffc0ffc781c007c007cfffc7ffffffffffffffc03fc007c003ce27ffff",
    "ffffe7ffe3ffc3fffeff802780ff8001c01fffffffffffffffff80079ffffe3f",
    "ffffffffc0ffc781c00fc00fc0ffc7ffffffffffffffc03fc007c003cf27ffff",
    "ffffffffc0ffc781c007c003cfffcfffffffffffffffc03fc003c003cc27ffff",
    "ffffe7ffe3ffc3ffffff80e780ff80018001ffffffffffffffff93ff83ff9fff",
];

/// Last-page hashes of known copyright and advertisement pages
pub const LAST_PAGE_HASHES: [&str; 6] = [
    "ffffffffffffffffffffffffffffffffffffffffffffffffffffffff83ff83ff",
    "ffff80038007ffffffffffffffffffffffffffffffffffffffffffffffffffff",
    "c3fbc003c003ffc3ff83ffc3ffffffffffffffffffffffffffffffffffffffff",
    "ffff80038001ffff7fff7fff7fff7fff7fff7fff7fff7fffffffffffffffffff",
    "ffff80008003ffffffffffffffffffffffffffffffffffffffffffffffffffff",
    "ffff80018001ffffffffffffffffffffffffffffffffffffffffffffffffffff",
];

fn has_abstract(page: &str) -> bool {
    page.contains("abstract") || page.contains("keywords")
}

/// Cover pages (0-based) recognized from the text of pages 1 and 2
pub fn cover_pages_by_text(page0: &str, page1: &str) -> Vec<usize> {
    let (p0, p1) = (compact(page0), compact(page1));
    let mut pages = Vec::new();

    // Scholarworks
    if p0.contains("followthisandadditionalworksat:https://scholarworks") {
        pages.push(0);
    }
    // ResearchGate
    if p0.contains("discussions,stats,andauthorprofilesforthispublicationat:https://www.researchgate.net/publication")
    {
        pages.push(0);
    }
    // JSTOR
    if p0.contains("pleasecontactsupport@jstor.org.youruseofthejstorarchiveindicatesyouracceptanceoftheterms&conditionsofuse")
        || p0.contains("formoreinformationregardingjstor,pleasecontactsupport@jstor.org")
    {
        pages.push(0);
    }
    // Emerald
    if p0.contains("emeraldisbothcounter4andtransfercompliant") && p0.contains("relatedcontentanddownloadinformationcorrectattimeofdownload") {
        pages.push(0);
    }
    // INFORMS
    if p0.contains("thisarticlewasdownloadedby") && p0.contains("fulltermsandconditionsofuse:") {
        pages.push(0);
    }
    if p0.contains("thisarticlemaybeusedonlyforthepurposesofresearch") && !has_abstract(&p0) && p1.contains("abstract") && p1.contains("keywords") {
        pages.push(0);
    }
    // AIS eLibrary
    if p0.contains("associationforinformationsystemsaiselectroniclibrary(aisel)") && !has_abstract(&p0) {
        pages.push(0);
    }
    // Taylor & Francis
    if (p0.contains("pleasescrolldownforarticle") || p0.contains("viewrelatedarticles")) && !has_abstract(&p0) {
        pages.push(0);
        if p1.contains("terms-and-conditions") && !has_abstract(&p1) {
            pages.push(1);
        }
    }
    pages.sort_unstable();
    pages.dedup();
    pages
}

/// Whether the text of the last page is a publisher notice
pub fn is_last_page_notice(text: &str) -> bool {
    let text = compact(text);
    // M.E. Sharpe
    text.contains("propertyofm.e.sharpeinc.anditscontentmaynotbecopiedoremailedtomultiplesitesorpostedtoalistservwithoutthecopyrightholder")
        // CAIS editorial board
        || ["caisadvisoryboard", "caiseditorialboard", "caissenioreditors"]
            .iter()
            .all(|x| text.contains(x))
}

/// `pdfs/X.pdf` → `pdfs/X<suffix>.pdf`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    path.with_file_name(format!("{}{}.pdf", stem, suffix))
}

/// Pages (1-based) that are publisher cover pages
pub fn detect_cover_pages(hasher: &dyn PageHasher, pdf: &Path) -> Result<Vec<u32>> {
    let texts = document::page_texts(pdf)?;
    if texts.len() <= 1 {
        return Ok(Vec::new());
    }
    let mut pages: Vec<u32> = cover_pages_by_text(&texts[0], &texts[1])
        .into_iter()
        .map(|p| p as u32 + 1)
        .collect();
    let hash = hasher.page_hash(pdf, 1, FINGERPRINT_HASH_SIZE)?;
    if COVER_PAGE_HASHES.contains(&hash.as_str()) {
        pages.push(1);
    }
    pages.sort_unstable();
    pages.dedup();
    Ok(pages)
}

/// The last page (1-based) if it is a publisher notice
pub fn detect_last_page(hasher: &dyn PageHasher, pdf: &Path) -> Result<Option<u32>> {
    let texts = document::page_texts(pdf)?;
    if texts.len() <= 2 {
        return Ok(None);
    }
    let last = texts.len() as u32;
    let hash = hasher.page_hash(pdf, last, FINGERPRINT_HASH_SIZE)?;
    let by_hash = LAST_PAGE_HASHES.contains(&hash.as_str());
    let by_text = texts.last().is_some_and(|t| is_last_page_notice(t));
    Ok((by_hash || by_text).then_some(last))
}

/// Move `pages` out of `pdf`
///
/// The trimmed PDF is written to the `suffix` sidecar path (returned), the
/// removed pages to `removed_dir/<file name>`.
pub fn split_off_pages(pdf: &Path, pages: &[u32], suffix: &str, removed_dir: &Path) -> Result<PathBuf> {
    let trimmed = with_suffix(pdf, suffix);
    document::write_without_pages(pdf, pages, &trimmed)?;
    std::fs::create_dir_all(removed_dir)?;
    if let Some(name) = pdf.file_name() {
        document::write_only_pages(pdf, pages, &removed_dir.join(name))?;
    }
    debug!(pdf = %pdf.display(), ?pages, trimmed = %trimmed.display(), "Removed pages");
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::super::document::testing::write_pdf;
    use super::super::hash::testing::FixedHasher;
    use super::*;

    #[test]
    fn taylor_francis_cover_with_terms_page() {
        let page0 = "Please scroll down for article. Full terms and conditions";
        let page1 = "Terms-and-conditions of access and use";
        assert_eq!(cover_pages_by_text(page0, page1), vec![0, 1]);
        assert!(cover_pages_by_text("Abstract. Please scroll down for article", page1).is_empty());
    }

    #[test]
    fn researchgate_cover() {
        let page0 = "See discussions, stats, and author profiles for this publication at: https://www.researchgate.net/publication/123";
        assert_eq!(cover_pages_by_text(page0, ""), vec![0]);
    }

    #[test]
    fn cais_board_page_is_a_notice() {
        assert!(is_last_page_notice("CAIS Advisory Board ... CAIS Editorial Board ... CAIS Senior Editors"));
        assert!(!is_last_page_notice("References"));
    }

    #[test]
    fn blacklisted_hash_marks_first_page() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("Smith2020.pdf");
        write_pdf(&pdf, &["Downloaded from publisher", "Title page", "Body"]);
        let hasher = FixedHasher::default().with("Smith2020.pdf", 1, COVER_PAGE_HASHES[0]);
        assert_eq!(detect_cover_pages(&hasher, &pdf).unwrap(), vec![1]);

        let trimmed = split_off_pages(&pdf, &[1], "_wo_cp", &dir.path().join(".coverpages")).unwrap();
        assert_eq!(trimmed, dir.path().join("Smith2020_wo_cp.pdf"));
        assert_eq!(document::page_count(&trimmed).unwrap(), 2);
        assert_eq!(document::page_count(&dir.path().join(".coverpages/Smith2020.pdf")).unwrap(), 1);
    }

    #[test]
    fn single_page_documents_keep_their_page() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("A.pdf");
        write_pdf(&pdf, &["Only page"]);
        let hasher = FixedHasher::default().with("A.pdf", 1, COVER_PAGE_HASHES[0]);
        assert!(detect_cover_pages(&hasher, &pdf).unwrap().is_empty());
    }
}
