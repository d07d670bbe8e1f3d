//! Error taxonomy shared by every colrev crate

use crate::state::{ProcessType, RecordState};
use thiserror::Error;

/// Common result type for colrev operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Error, Debug)]
pub enum Error {
    // ------------------------------------------------------------------
    // Precondition
    // ------------------------------------------------------------------
    #[error("Clean repository required (changes in: {}{})", .changed.join(", "), ignore_hint(.ignore))]
    CleanRepoRequired { changed: Vec<String>, ignore: String },

    #[error("Unstaged changes in tracked files: {}", .0.join(", "))]
    UnstagedChanges(Vec<String>),

    #[error(
        "Process order violation: {process} requires absence of records in [{}] (offending records: {})",
        .required_absent.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
        .offending_ids.join(", ")
    )]
    ProcessOrderViolation {
        process: ProcessType,
        required_absent: Vec<RecordState>,
        offending_ids: Vec<String>,
    },

    #[error("No records in the repository (run load first)")]
    NoRecords,

    // ------------------------------------------------------------------
    // Data integrity
    // ------------------------------------------------------------------
    #[error("Invalid colrev_status value in record {id}: {value}")]
    StatusFieldValue { id: String, value: String },

    #[error("ID change refused for propagated records: {}", .0.join(", "))]
    PropagatedIdChange(Vec<String>),

    #[error("Not enough data to identify record: {0}")]
    NotEnoughDataToIdentify(String),

    #[error("Invalid merge of {id1} and {id2}: {reason}")]
    InvalidMerge {
        id1: String,
        id2: String,
        reason: String,
    },

    #[error("BibTeX parse error (line {line}): {message}")]
    BibtexParse { line: usize, message: String },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    // ------------------------------------------------------------------
    // External
    // ------------------------------------------------------------------
    #[error("HTTP error ({service}): {message}")]
    Http { service: String, message: String },

    #[error("Timeout after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    // ------------------------------------------------------------------
    // Resource
    // ------------------------------------------------------------------
    #[error("Invalid PDF ({path}): {message}")]
    InvalidPdf { path: String, message: String },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    // ------------------------------------------------------------------
    // User
    // ------------------------------------------------------------------
    #[error("Interrupted by user")]
    Interrupted,

    // ------------------------------------------------------------------
    // Settings and infrastructure
    // ------------------------------------------------------------------
    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Data file error: {0}")]
    DataFile(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn ignore_hint(ignore: &str) -> String {
    if ignore.is_empty() {
        String::new()
    } else {
        format!("; allowed: {}", ignore)
    }
}

impl Error {
    /// Process exit code for this error
    ///
    /// 1: precondition, integrity and settings problems
    /// 2: a required external tool is missing
    /// 130: keyboard interrupt
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingDependency(_) => 2,
            Error::Interrupted => 130,
            _ => 1,
        }
    }

    /// Whether the error is one of the precondition kinds (nothing was mutated)
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::CleanRepoRequired { .. }
                | Error::UnstagedChanges(_)
                | Error::ProcessOrderViolation { .. }
                | Error::NoRecords
        )
    }

    /// Errors that abort a single record but let the batch continue
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Error::NotEnoughDataToIdentify(_)
                | Error::InvalidMerge { .. }
                | Error::Http { .. }
                | Error::Timeout { .. }
                | Error::InvalidPdf { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(Error::MissingDependency("docker".into()).exit_code(), 2);
        assert_eq!(Error::Interrupted.exit_code(), 130);
        assert_eq!(Error::NoRecords.exit_code(), 1);
        assert_eq!(Error::Settings("bad".into()).exit_code(), 1);
    }

    #[test]
    fn order_violation_names_states() {
        let err = Error::ProcessOrderViolation {
            process: ProcessType::Dedupe,
            required_absent: vec![RecordState::MdImported],
            offending_ids: vec!["Smith2020".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("md_imported"));
        assert!(msg.contains("Smith2020"));
        assert!(err.is_precondition());
    }
}
