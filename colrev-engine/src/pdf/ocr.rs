//! OCR through the `ocrmypdf` container

use colrev_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

pub const OCRMYPDF_IMAGE: &str = "jbarlow83/ocrmypdf";

/// Produces a re-OCR'd copy of a PDF
pub trait OcrEngine: Send + Sync {
    fn ocr(&self, input: &Path, output: &Path) -> Result<()>;
}

/// `docker run jbarlow83/ocrmypdf --force-ocr -l eng`
#[derive(Debug, Clone)]
pub struct DockerOcr {
    docker: Option<PathBuf>,
}

impl DockerOcr {
    pub fn new() -> Self {
        Self {
            docker: which::which("docker").ok(),
        }
    }
}

impl Default for DockerOcr {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for DockerOcr {
    fn ocr(&self, input: &Path, output: &Path) -> Result<()> {
        let docker = self
            .docker
            .as_deref()
            .ok_or_else(|| Error::MissingDependency("docker (for ocrmypdf)".to_string()))?;
        let dir = input
            .parent()
            .ok_or_else(|| Error::Internal(format!("no parent directory: {}", input.display())))?;
        let name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| Error::Internal(format!("no file name: {}", p.display())))
        };
        let (input_name, output_name) = (name(input)?, name(output)?);
        debug!(pdf = %input.display(), "Running ocrmypdf");
        let result = Command::new(docker)
            .arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(format!("{}:/home/docker", dir.display()))
            .arg(OCRMYPDF_IMAGE)
            .args(["--force-ocr", "-l", "eng", "--jobs", "4"])
            .arg(format!("/home/docker/{}", input_name))
            .arg(format!("/home/docker/{}", output_name))
            .output()?;
        if !result.status.success() {
            return Err(Error::InvalidPdf {
                path: input.display().to_string(),
                message: format!(
                    "ocrmypdf failed: {}",
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            });
        }
        info!(pdf = %output.display(), "OCR completed");
        Ok(())
    }
}
