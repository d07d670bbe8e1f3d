//! `colrev init`: create a review repository

use crate::git_repo::GitRepo;
use crate::review_manager::ReviewManager;
use colrev_common::config::EnvConfig;
use colrev_common::paths::{
    GITIGNORE_FILE, PDF_DIR, PDF_DIR_PATTERN, RECORDS_FILE, REPORT_FILE, SEARCH_DIR, SETTINGS_FILE,
    STATUS_FILE,
};
use colrev_common::settings::{ReviewType, Settings};
use colrev_common::{Error, Result};
use std::path::Path;
use tracing::info;

/// Entries of a new repository's `.gitignore`
pub const GITIGNORE_ENTRIES: [&str; 3] = [REPORT_FILE, PDF_DIR_PATTERN, "*.tmp"];

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub title: Option<String>,
    pub review_type: ReviewType,
    /// Remote to register as `origin`
    pub url: Option<String>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            title: None,
            review_type: ReviewType::LiteratureReview,
            url: None,
        }
    }
}

fn initial_message(settings: &Settings, review_type_arg: &str, status: &str) -> String {
    format!(
        "Initial commit\n\nCommand\n   colrev init --type {}\n\nSoftware\n   - colrev: version {}\n     title = {:?}\n\nStatus\n{}\n",
        review_type_arg,
        env!("CARGO_PKG_VERSION"),
        settings.project.title,
        status
    )
}

/// Create the layout, settings and first commit at `path`
pub fn run(path: &Path, env: EnvConfig, options: InitOptions) -> Result<ReviewManager> {
    if path.join(SETTINGS_FILE).exists() || path.join(RECORDS_FILE).exists() {
        return Err(Error::Settings(format!(
            "{} is already a colrev repository",
            path.display()
        )));
    }
    std::fs::create_dir_all(path.join(SEARCH_DIR))?;
    std::fs::create_dir_all(path.join(PDF_DIR))?;

    let title = options.title.clone().unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "colrev review".to_string())
    });
    let settings = Settings::new(&title, options.review_type);
    settings.save(&path.join(SETTINGS_FILE))?;
    std::fs::write(path.join(GITIGNORE_FILE), GITIGNORE_ENTRIES.join("\n") + "\n")?;

    let git = GitRepo::init(path)?;
    if let Some(url) = &options.url {
        git.add_remote("origin", url)?;
        info!(url = %url, "Added remote origin");
    }

    let review = ReviewManager::from_parts(path, settings, git, env);
    let stats = review.write_status()?;
    for file in [SETTINGS_FILE, GITIGNORE_FILE, STATUS_FILE] {
        review.git.add(file)?;
    }
    let review_type_arg = toml::Value::try_from(options.review_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let commit = review.git.commit(
        &initial_message(&review.settings, &review_type_arg, &stats.report()),
        &review.env.user,
        &review.env.user,
    )?;
    info!(path = %path.display(), commit = %commit, "Initialized review repository");
    Ok(review)
}
