//! Operation report log
//!
//! Per-record workers return their report lines with the record; the driver
//! collects them here. Lines are ordered by record ID (stable, general lines
//! first) so the report written to `.report.log` and embedded in the commit
//! message does not depend on worker scheduling.

use colrev_common::Result;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct ReportLog {
    lines: Vec<(String, String)>,
}

impl ReportLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A line not tied to a record
    pub fn general(&mut self, line: impl Into<String>) {
        self.lines.push((String::new(), line.into()));
    }

    /// A line about record `id`
    pub fn record(&mut self, id: &str, line: impl Into<String>) {
        self.lines.push((id.to_string(), line.into()));
    }

    /// Lines produced by a worker for record `id`
    pub fn extend_record(&mut self, id: &str, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            self.record(id, line);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Lines ordered by record ID
    pub fn sorted_lines(&self) -> Vec<String> {
        let mut lines: Vec<&(String, String)> = self.lines.iter().collect();
        lines.sort_by(|a, b| a.0.cmp(&b.0));
        lines
            .into_iter()
            .map(|(id, line)| {
                if id.is_empty() {
                    line.clone()
                } else {
                    format!(" {:<30} {}", id, line)
                }
            })
            .collect()
    }

    pub fn render(&self) -> String {
        self.sorted_lines().join("\n")
    }

    /// Append the ordered lines to the report file
    pub fn append_to(&self, path: &Path) -> Result<()> {
        if self.lines.is_empty() {
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        for line in self.sorted_lines() {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_ordered_by_record_id() {
        let mut report = ReportLog::new();
        report.record("Webster2002", "prepared");
        report.record("Lee2019", "needs manual preparation");
        report.general("Prep round high_confidence");
        report.record("Lee2019", "change score 0.12");

        let lines = report.sorted_lines();
        assert_eq!(lines[0], "Prep round high_confidence");
        assert!(lines[1].contains("Lee2019") && lines[1].ends_with("needs manual preparation"));
        assert!(lines[2].ends_with("change score 0.12"));
        assert!(lines[3].contains("Webster2002"));
    }

    #[test]
    fn appends_to_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".report.log");
        let mut report = ReportLog::new();
        report.record("A", "one");
        report.append_to(&path).unwrap();
        report.append_to(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
