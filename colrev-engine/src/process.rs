//! Process gate
//!
//! Before an operation touches records, its conditions are evaluated against
//! the repository: the working tree must be clean apart from the paths the
//! operation may leave dirty, and no record may sit in a state that precedes
//! the operation's source states.

use crate::dataset::{Dataset, HEADER_LINES};
use crate::git_repo::GitRepo;
use colrev_common::paths::{REPORT_FILE, STATUS_FILE};
use colrev_common::settings::Settings;
use colrev_common::state::{self, Condition, ProcessType, RecordState};
use colrev_common::{Error, Result};
use tracing::debug;

/// Paths that never make the repository dirty
const ALWAYS_ALLOWED: [&str; 2] = [STATUS_FILE, REPORT_FILE];

fn is_ignored(path: &str, patterns: &[&str]) -> bool {
    ALWAYS_ALLOWED.contains(&path)
        || patterns
            .iter()
            .any(|p| path == p.trim_end_matches('/') || (p.ends_with('/') && path.starts_with(p)))
}

/// Require a clean working tree outside `ignore`
///
/// Unstaged changes to tracked files raise [`Error::UnstagedChanges`];
/// staged changes raise [`Error::CleanRepoRequired`]. Untracked files are
/// not considered.
pub fn require_clean_repo(git: &GitRepo, ignore: &[&str]) -> Result<()> {
    let changes: Vec<_> = git
        .changes()?
        .into_iter()
        .filter(|c| !is_ignored(&c.path, ignore))
        .collect();
    let unstaged: Vec<String> = changes.iter().filter(|c| c.unstaged).map(|c| c.path.clone()).collect();
    if !unstaged.is_empty() {
        return Err(Error::UnstagedChanges(unstaged));
    }
    if !changes.is_empty() {
        return Err(Error::CleanRepoRequired {
            changed: changes.into_iter().map(|c| c.path).collect(),
            ignore: ignore.join(", "),
        });
    }
    Ok(())
}

/// Refuse `process` while records remain in states preceding its sources
pub fn check_records_state(dataset: &Dataset, process: ProcessType) -> Result<()> {
    let required_absent = state::required_absent(process);
    if required_absent.is_empty() {
        return Ok(());
    }
    let offending: Vec<(String, RecordState)> = dataset
        .record_headers(HEADER_LINES)?
        .into_iter()
        .filter(|h| required_absent.contains(&h.status))
        .map(|h| (h.id, h.status))
        .collect();
    if offending.is_empty() {
        return Ok(());
    }
    debug!(process = %process, offending = offending.len(), "Process order violation");
    Err(Error::ProcessOrderViolation {
        process,
        required_absent: required_absent.into_iter().collect(),
        offending_ids: offending.into_iter().map(|(id, _)| id).collect(),
    })
}

/// Evaluate every condition of `process`
pub fn check_precondition(
    git: &GitRepo,
    dataset: &Dataset,
    settings: &Settings,
    process: ProcessType,
) -> Result<()> {
    for condition in process.conditions() {
        match condition.ignore_patterns() {
            Some(patterns) => require_clean_repo(git, patterns)?,
            None => {
                debug_assert_eq!(*condition, Condition::CheckRecordsStatePrecondition);
                if !matches!(process, ProcessType::Load | ProcessType::Search)
                    && dataset.record_headers(HEADER_LINES)?.is_empty()
                {
                    return Err(Error::NoRecords);
                }
                if settings.project.delay_automated_processing {
                    debug!(process = %process, "Preceding-states check disabled");
                    continue;
                }
                check_records_state(dataset, process)?;
            }
        }
    }
    Ok(())
}
