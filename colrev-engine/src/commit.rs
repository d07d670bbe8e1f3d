//! Commit message composition and certification
//!
//! Every record-changing operation ends in one commit whose message carries
//! the command, the effective settings, the certified properties, the status
//! report and the operation report.

use crate::dataset::Dataset;
use crate::report::ReportLog;
use colrev_common::state::ProcessType;
use colrev_common::status::StatusStats;
use colrev_common::Result;
use tracing::warn;

/// Properties certified in a commit message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Certification {
    pub traceability: bool,
    pub consistency: bool,
    pub completeness: bool,
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "YES"
    } else {
        "NO"
    }
}

/// Consistency: canonical serialization and provenance coverage
///
/// Holds when re-serializing the records file is byte-identical and every
/// record at or beyond `md_prepared` covers its identifying fields.
pub fn certify_consistency(dataset: &Dataset) -> Result<bool> {
    if !dataset.is_canonical()? {
        warn!("Records file is not in canonical form");
        return Ok(false);
    }
    for record in dataset.load_all()?.values() {
        let gaps = record.provenance_gaps();
        if !gaps.is_empty() {
            warn!(id = %record.id, fields = ?gaps, "Identifying fields without provenance");
            return Ok(false);
        }
    }
    Ok(true)
}

/// What an operation commits
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// One-line summary
    pub summary: String,
    pub process: ProcessType,
    /// Arguments as typed after the operation name
    pub args: String,
    /// Interactive operations are authored by the user, not the bot
    pub manual_author: bool,
    /// Paths (files or directories) the operation may have modified
    pub paths: Vec<String>,
    /// Command name when it differs from the process (`pull`)
    pub command: Option<String>,
}

impl CommitRequest {
    pub fn new(process: ProcessType, summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            process,
            args: String::new(),
            manual_author: false,
            paths: Vec::new(),
            command: None,
        }
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn manual(mut self) -> Self {
        self.manual_author = true;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }
}

/// Compose the commit message
pub fn compose_message(
    request: &CommitRequest,
    settings_section: &str,
    certification: Certification,
    status: &StatusStats,
    report: &ReportLog,
) -> String {
    let mut message = String::new();
    message.push_str(request.summary.trim());
    message.push_str("\n\nCommand\n");
    let operation = request.command.as_deref().unwrap_or(request.process.as_str());
    let command = format!("colrev {} {}", operation, request.args);
    message.push_str(&format!("   {}\n", command.trim_end()));

    message.push_str("\nSoftware\n");
    message.push_str(&format!("   - colrev: version {}\n", env!("CARGO_PKG_VERSION")));
    for line in settings_section.lines().filter(|l| !l.trim().is_empty()) {
        message.push_str(&format!("     {}\n", line));
    }

    message.push_str("\nCertified properties\n");
    message.push_str(&format!(
        "   - Traceability of records: {}\n",
        yes_no(certification.traceability)
    ));
    message.push_str(&format!(
        "   - Consistency (based on hooks): {}\n",
        yes_no(certification.consistency)
    ));
    message.push_str(&format!(
        "   - Completeness of iteration: {}\n",
        yes_no(certification.completeness)
    ));

    message.push('\n');
    message.push_str(&status.report());

    if !report.is_empty() {
        message.push_str("\nReport\n");
        message.push_str(&report.render());
        message.push('\n');
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_layout() {
        let request = CommitRequest::new(ProcessType::Prep, "Prepare records").args("-k");
        let mut report = ReportLog::new();
        report.record("B2020", "prepared");
        report.record("A2019", "needs manual preparation");
        let message = compose_message(
            &request,
            "[prep]\nfields_to_keep = []\n",
            Certification {
                traceability: true,
                consistency: true,
                completeness: false,
            },
            &StatusStats::default(),
            &report,
        );
        let mut last = 0;
        for block in ["Prepare records", "Command", "Software", "Certified properties", "Status", "Report"] {
            let at = message[last..].find(block).map(|i| i + last);
            assert!(at.is_some(), "{} missing or out of order", block);
            last = at.unwrap();
        }
        assert!(message.contains("colrev prep -k"));
        assert!(message.contains("- Traceability of records: YES"));
        assert!(message.contains("- Completeness of iteration: NO"));
        assert!(message.find("A2019").unwrap() < message.find("B2020").unwrap());
    }
}
