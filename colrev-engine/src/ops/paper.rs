//! `colrev paper`: render the manuscript with pandoc

use crate::review_manager::ReviewManager;
use colrev_common::paths::{PAPER_FILE, RECORDS_FILE};
use colrev_common::settings::DataScript;
use colrev_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

pub const OUTPUT_FILE: &str = "paper.docx";

/// Locate pandoc on the PATH
pub fn find_pandoc() -> Result<PathBuf> {
    which::which("pandoc").map_err(|_| Error::MissingDependency("pandoc".to_string()))
}

/// pandoc arguments for rendering `paper.md` next to the records
pub fn pandoc_args(root: &Path, word_template: Option<&str>) -> Vec<String> {
    let mut args = vec![
        root.join(PAPER_FILE).display().to_string(),
        "--citeproc".to_string(),
        "--bibliography".to_string(),
        root.join(RECORDS_FILE).display().to_string(),
        "-o".to_string(),
        root.join(OUTPUT_FILE).display().to_string(),
    ];
    if let Some(template) = word_template {
        args.push("--reference-doc".to_string());
        args.push(root.join(template).display().to_string());
    }
    args
}

/// `colrev paper`
pub fn run(review: &ReviewManager) -> Result<PathBuf> {
    if !review.path.join(PAPER_FILE).exists() {
        return Err(Error::Settings(format!(
            "{} not found, add it with colrev data --add_endpoint manuscript",
            PAPER_FILE
        )));
    }
    let pandoc = find_pandoc()?;
    let template = review.settings.data.scripts.iter().find_map(|s| match s {
        DataScript::Manuscript { word_template } => word_template.clone(),
        DataScript::Structured { .. } => None,
    });
    let args = pandoc_args(&review.path, template.as_deref());
    debug!(pandoc = %pandoc.display(), ?args, "Running pandoc");
    let output = Command::new(&pandoc).args(&args).current_dir(&review.path).output()?;
    if !output.status.success() {
        return Err(Error::Internal(format!(
            "pandoc failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let path = review.path.join(OUTPUT_FILE);
    info!(path = %path.display(), "Rendered manuscript");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_reference_records_and_template() {
        let args = pandoc_args(Path::new("/r"), Some("APA-7.docx"));
        assert_eq!(args[0], "/r/paper.md");
        assert!(args.windows(2).any(|w| w[0] == "--bibliography" && w[1] == "/r/records.bib"));
        assert_eq!(args.last().map(String::as_str), Some("/r/APA-7.docx"));
        assert!(!pandoc_args(Path::new("/r"), None).contains(&"--reference-doc".to_string()));
    }
}
