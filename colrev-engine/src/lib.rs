//! colrev engine: the record lifecycle of a literature review
//!
//! A review is a git repository holding `records.bib`, `settings.toml` and
//! the search results it was built from. Each operation in [`ops`],
//! [`prep`], [`dedupe`] and [`pdf`] advances records through the states of
//! [`colrev_common::RecordState`] and ends in one commit.

pub mod cli;
pub mod clients;
pub mod commit;
pub mod dataset;
pub mod dedupe;
pub mod git_repo;
pub mod language;
pub mod local_index;
pub mod ops;
pub mod pdf;
pub mod prep;
pub mod process;
pub mod report;
pub mod review_manager;
pub mod tables;

pub use crate::review_manager::ReviewManager;
pub use colrev_common::{Error, Result};
