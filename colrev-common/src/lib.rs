//! # CoLRev Common Library
//!
//! Shared code for the colrev engine and its command-line surface:
//! - Error taxonomy and exit codes
//! - Environment configuration (user identity, environment directory)
//! - Project settings (`settings.toml`) with closed endpoint registries
//! - Record model, provenance and similarity
//! - Record states and the transition table
//! - Status aggregation
//! - Text normalization helpers

pub mod config;
pub mod error;
pub mod paths;
pub mod record;
pub mod settings;
pub mod state;
pub mod status;
pub mod text;

pub use error::{Error, Result};
pub use record::Record;
pub use state::{ProcessType, RecordState};
