//! Perceptual page hashes
//!
//! A page is rendered to PNG with `pdftoppm` and hashed with the average
//! (mean) hash of `img_hash`. Hashes are lowercase hex strings; 16×16 hashes
//! identify publisher cover and last pages, the 32×32 hash of page 1 is the
//! `colrev_pdf_id`.

use colrev_common::{Error, Result};
use img_hash::{HashAlg, HasherConfig};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Hash size for cover/last page fingerprints
pub const FINGERPRINT_HASH_SIZE: u32 = 16;
/// Hash size of the colrev_pdf_id
pub const PDF_ID_HASH_SIZE: u32 = 32;
pub const PDF_ID_PREFIX: &str = "cpid1:";

/// Renders and hashes PDF pages
pub trait PageHasher: Send + Sync {
    /// Average hash of a 1-based page
    fn page_hash(&self, pdf: &Path, page: u32, hash_size: u32) -> Result<String>;
}

/// `pdftoppm` rendering with `img_hash` average hashing
#[derive(Debug, Clone)]
pub struct PdftoppmHasher {
    binary: Option<PathBuf>,
}

impl PdftoppmHasher {
    /// Locate `pdftoppm` on the PATH
    ///
    /// A missing binary only fails when a page is hashed, so records are
    /// demoted one by one instead of aborting the operation.
    pub fn new() -> Self {
        Self {
            binary: which::which("pdftoppm").ok(),
        }
    }

    fn binary(&self) -> Result<&Path> {
        self.binary
            .as_deref()
            .ok_or_else(|| Error::MissingDependency("pdftoppm (poppler-utils)".to_string()))
    }
}

impl Default for PdftoppmHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Average hash of a rendered page image
pub fn image_hash(png: &Path, hash_size: u32) -> Result<String> {
    let img = img_hash::image::open(png).map_err(|e| Error::InvalidPdf {
        path: png.display().to_string(),
        message: format!("cannot read rendered page: {}", e),
    })?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .hash_size(hash_size, hash_size)
        .to_hasher();
    let hash = to_hex(hasher.hash_image(&img).as_bytes());
    if hash.chars().all(|c| c == '0') {
        return Err(Error::InvalidPdf {
            path: png.display().to_string(),
            message: "blank page hash".to_string(),
        });
    }
    Ok(hash)
}

impl PageHasher for PdftoppmHasher {
    fn page_hash(&self, pdf: &Path, page: u32, hash_size: u32) -> Result<String> {
        let binary = self.binary()?;
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("page");
        let page_arg = page.to_string();
        debug!(pdf = %pdf.display(), page, "Rendering page");
        let output = Command::new(binary)
            .args(["-f", &page_arg, "-l", &page_arg, "-r", "72", "-png", "-singlefile"])
            .arg(pdf)
            .arg(&prefix)
            .output()?;
        if !output.status.success() {
            return Err(Error::InvalidPdf {
                path: pdf.display().to_string(),
                message: format!(
                    "pdftoppm failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        image_hash(&prefix.with_extension("png"), hash_size)
    }
}

/// The colrev_pdf_id of a PDF (hash of page 1)
pub fn colrev_pdf_id(hasher: &dyn PageHasher, pdf: &Path) -> Result<String> {
    Ok(format!(
        "{}{}",
        PDF_ID_PREFIX,
        hasher.page_hash(pdf, 1, PDF_ID_HASH_SIZE)?
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// Hasher answering from a fixed `(file name, page) -> hash` table
    #[derive(Debug, Default, Clone)]
    pub struct FixedHasher {
        pub hashes: HashMap<(String, u32), String>,
    }

    impl FixedHasher {
        pub fn with(mut self, file: &str, page: u32, hash: &str) -> Self {
            self.hashes.insert((file.to_string(), page), hash.to_string());
            self
        }
    }

    impl PageHasher for FixedHasher {
        fn page_hash(&self, pdf: &Path, page: u32, _hash_size: u32) -> Result<String> {
            let name = pdf
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok(self
                .hashes
                .get(&(name, page))
                .cloned()
                .unwrap_or_else(|| "0f".repeat(32)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use img_hash::image::{GrayImage, Luma};

    #[test]
    fn half_dark_image_hashes_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("page.png");
        let img = GrayImage::from_fn(64, 64, |x, _| if x < 32 { Luma([0u8]) } else { Luma([255u8]) });
        img.save(&png).unwrap();

        let a = image_hash(&png, 16).unwrap();
        let b = image_hash(&png, 16).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn pdf_id_uses_prefix() {
        let hasher = testing::FixedHasher::default().with("a.pdf", 1, "ffee");
        assert_eq!(colrev_pdf_id(&hasher, Path::new("pdfs/a.pdf")).unwrap(), "cpid1:ffee");
    }
}
