//! PDF structure and text layer
//!
//! Page counts and page removal use `lopdf`; text comes from `pdf-extract`.
//! Page numbers are 1-based throughout.

use colrev_common::{Error, Result};
use lopdf::Document;
use std::path::Path;

fn invalid(path: &Path, message: impl ToString) -> Error {
    Error::InvalidPdf {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

pub fn load(path: &Path) -> Result<Document> {
    Document::load(path).map_err(|e| invalid(path, e))
}

/// Whether downloaded bytes are a PDF that parses
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF") && Document::load_mem(bytes).is_ok()
}

pub fn page_count(path: &Path) -> Result<usize> {
    Ok(load(path)?.get_pages().len())
}

/// Text of every page
pub fn page_texts(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| invalid(path, e))
}

/// Text of the given pages (pages beyond the document are ignored)
pub fn text_of_pages(path: &Path, pages: &[usize]) -> Result<String> {
    let texts = page_texts(path)?;
    Ok(pages
        .iter()
        .filter_map(|p| p.checked_sub(1).and_then(|i| texts.get(i)))
        .cloned()
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Text of the first `n` pages
pub fn first_pages_text(path: &Path, n: usize) -> Result<String> {
    Ok(page_texts(path)?.into_iter().take(n).collect::<Vec<_>>().join("\n"))
}

/// Lowercased text without any whitespace (for fingerprint matching)
pub fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Write `source` without `pages` to `target`
pub fn write_without_pages(source: &Path, pages: &[u32], target: &Path) -> Result<()> {
    let mut doc = load(source)?;
    let total = doc.get_pages().len() as u32;
    if pages.iter().any(|p| *p == 0 || *p > total) {
        return Err(invalid(source, format!("page out of range (document has {} pages)", total)));
    }
    doc.delete_pages(pages);
    doc.prune_objects();
    doc.save(target).map_err(|e| invalid(target, e))?;
    Ok(())
}

/// Write only `pages` of `source` to `target`
pub fn write_only_pages(source: &Path, pages: &[u32], target: &Path) -> Result<()> {
    let doc = load(source)?;
    let others: Vec<u32> = doc
        .get_pages()
        .keys()
        .copied()
        .filter(|p| !pages.contains(p))
        .collect();
    write_without_pages(source, &others, target)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal PDFs for tests

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::Path;

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
}
