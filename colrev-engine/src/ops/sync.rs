//! `colrev pull`, `colrev push` and `colrev clone`

use crate::commit::CommitRequest;
use crate::git_repo::GitRepo;
use crate::local_index::LocalIndex;
use crate::process;
use crate::review_manager::ReviewManager;
use colrev_common::config::EnvConfig;
use colrev_common::paths::RECORDS_FILE;
use colrev_common::record::fields::IDENTIFYING_FIELDS;
use colrev_common::settings::Settings;
use colrev_common::{ProcessType, Record, Result};
use std::path::Path;
use tracing::{debug, info};

/// Align the identifying fields of a curated record with its curation
///
/// Returns the names of the fields that changed.
pub fn refresh_curated(record: &mut Record, curated: &Record) -> Vec<String> {
    if !record.is_curated() || !curated.is_curated() {
        return Vec::new();
    }
    let mut changed = Vec::new();
    for key in IDENTIFYING_FIELDS {
        let ours = record.get(key).map(str::to_string);
        match (ours.as_deref(), curated.get(key)) {
            (Some(ours), Some(theirs)) if ours == theirs => {}
            (_, Some(theirs)) => {
                record.set_raw(key, theirs);
                changed.push(key.to_string());
            }
            (Some(_), None) => {
                record.fields.remove(key);
                changed.push(key.to_string());
            }
            (None, None) => {}
        }
    }
    if curated.entry_type != record.entry_type {
        record.entry_type = curated.entry_type.clone();
        changed.push("ENTRYTYPE".to_string());
    }
    changed
}

async fn refresh_from_index(review: &mut ReviewManager, index: &LocalIndex) -> Result<Option<String>> {
    let mut records = review.load_records()?;
    let mut updated = 0;
    for record in records.values_mut().filter(|r| r.is_curated()) {
        review.check_cancelled()?;
        let Some(indexed) = index.retrieve(record).await? else {
            continue;
        };
        if indexed.repo_path == review.path {
            continue;
        }
        let changed = refresh_curated(record, &indexed.record);
        if !changed.is_empty() {
            debug!(id = %record.id, fields = ?changed, "Updated from curation");
            review
                .report
                .record(&record.id, format!("Updated from curation ({})", changed.join(", ")));
            updated += 1;
        }
    }
    if updated == 0 {
        return Ok(None);
    }
    info!(updated, "Updated curated records");
    review.save_records(&records)?;
    review.create_commit(
        CommitRequest::new(ProcessType::Prep, "Update records from curations")
            .command("pull")
            .path(RECORDS_FILE),
    )
}

/// `colrev pull`: fast-forward from `origin`, then refresh curated records
pub async fn pull(review: &mut ReviewManager) -> Result<Option<String>> {
    process::require_clean_repo(&review.git, &[])?;
    if review.git.has_remote("origin") {
        review.git.pull()?;
        review.settings = Settings::load(&review.settings_path())?;
    } else {
        info!("No remote origin, skipping git pull");
    }
    if !review.dataset.exists() {
        return Ok(None);
    }
    let index = review.local_index().await?;
    refresh_from_index(review, &index).await
}

/// `colrev push`
pub fn push(review: &ReviewManager) -> Result<()> {
    process::require_clean_repo(&review.git, &[])?;
    review.git.push()
}

/// `colrev clone URL`: clone into `target` and open the review
pub fn clone(url: &str, target: &Path, env: EnvConfig) -> Result<ReviewManager> {
    GitRepo::clone_from(url, target)?;
    ReviewManager::open(target, env)
}
