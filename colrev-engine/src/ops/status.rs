//! `colrev status`: the current state of the review and what to do next

use crate::review_manager::ReviewManager;
use colrev_common::paths::STATUS_FILE;
use colrev_common::status::StatusStats;
use colrev_common::Result;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use tracing::debug;

/// Human-readable status with the recommended next operations
pub fn run(review: &ReviewManager) -> Result<String> {
    let stats = review.status_stats()?;
    let mut out = stats.report();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&next_steps(&stats));

    let changes = review.git.changes()?;
    if !changes.is_empty() {
        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        let _ = writeln!(out, "Uncommitted changes: {}", paths.join(", "));
    }
    Ok(out)
}

/// Advice derived from the states present
pub fn next_steps(stats: &StatusStats) -> String {
    let operations = stats.next_operations();
    if operations.is_empty() {
        if stats.completeness_condition && stats.overall.md_imported > 0 {
            return "Review iteration completed\n".to_string();
        }
        return "Next operation: colrev search / colrev load (add search results to search/)\n".to_string();
    }
    let commands: Vec<String> = operations
        .iter()
        .map(|op| format!("colrev {}", op))
        .collect();
    format!("Next operation: {}\n", commands.join(" or "))
}

/// One commit of `status -a`
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsRow {
    pub commit: String,
    pub date: DateTime<Utc>,
    pub author: String,
    pub summary: String,
    /// Status committed with this version (absent for foreign commits)
    pub stats: Option<StatusStats>,
}

/// Commit history with the status recorded at each commit, oldest first
pub fn analytics(review: &ReviewManager) -> Result<Vec<AnalyticsRow>> {
    let mut rows = Vec::new();
    for commit in review.git.log(None)?.into_iter().rev() {
        let stats = match review.git.file_at(&commit.id, STATUS_FILE)? {
            Some(content) => match toml::from_str::<StatusStats>(&content) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    debug!(commit = %commit.id, error = %e, "Unreadable status snapshot");
                    None
                }
            },
            None => None,
        };
        rows.push(AnalyticsRow {
            commit: commit.id.chars().take(8).collect(),
            date: commit.date,
            author: commit.author,
            summary: commit.message.lines().next().unwrap_or_default().to_string(),
            stats,
        });
    }
    Ok(rows)
}

pub fn format_analytics(rows: &[AnalyticsRow]) -> String {
    let mut out = format!(
        "{:<17} {:<8} {:<18} {:>8} {:>9} {:>8} {:>11}  {}\n",
        "date", "commit", "author", "imported", "processed", "included", "synthesized", "summary"
    );
    for row in rows {
        let counts = row
            .stats
            .as_ref()
            .map(|s| {
                format!(
                    "{:>8} {:>9} {:>8} {:>11}",
                    s.overall.md_imported, s.overall.md_processed, s.overall.rev_included, s.overall.rev_synthesized
                )
            })
            .unwrap_or_else(|| format!("{:>8} {:>9} {:>8} {:>11}", "-", "-", "-", "-"));
        let _ = writeln!(
            out,
            "{:<17} {:<8} {:<18} {}  {}",
            row.date.format("%Y-%m-%d %H:%M"),
            row.commit,
            row.author.chars().take(18).collect::<String>(),
            counts,
            row.summary
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use colrev_common::status::RecordSummary;
    use colrev_common::RecordState;

    fn summary(id: &str, status: RecordState) -> RecordSummary {
        RecordSummary {
            id: id.to_string(),
            status,
            origin: vec![format!("s.bib/{}", id)],
            screening_criteria: None,
            curated: false,
        }
    }

    #[test]
    fn advice_follows_earliest_state() {
        let stats = StatusStats::compute(&[summary("A", RecordState::MdImported)], 1, &[], false);
        assert_eq!(next_steps(&stats), "Next operation: colrev prep\n");

        let empty = StatusStats::compute(&[], 0, &[], false);
        assert!(next_steps(&empty).contains("colrev load"));

        let done = StatusStats::compute(&[summary("A", RecordState::RevSynthesized)], 1, &[], false);
        assert_eq!(next_steps(&done), "Review iteration completed\n");
    }

    #[test]
    fn analytics_table_marks_missing_snapshots() {
        let rows = vec![AnalyticsRow {
            commit: "abcdef12".to_string(),
            date: Utc::now(),
            author: "Tester".to_string(),
            summary: "Initial commit".to_string(),
            stats: None,
        }];
        let text = format_analytics(&rows);
        assert!(text.lines().nth(1).unwrap().contains("abcdef12"));
        assert!(text.contains("Initial commit"));
    }
}
