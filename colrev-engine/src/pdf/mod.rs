//! PDF pipeline
//!
//! Retrieval (`pdf_get`, `pdf_get_man`) links a PDF to every included
//! record; preparation (`pdf_prep`, `pdf_prep_man`) checks that the file is
//! readable English text showing the record's metadata, trims publisher
//! pages and assigns the `colrev_pdf_id`.
//!
//! External tools (`pdftoppm`, the OCR container) sit behind the
//! [`hash::PageHasher`] and [`ocr::OcrEngine`] traits.

pub mod completeness;
pub mod document;
pub mod get;
pub mod get_man;
pub mod hash;
pub mod ocr;
pub mod pages;
pub mod prep;
pub mod prep_man;
pub mod validation;

pub use hash::{PageHasher, PdftoppmHasher};
pub use ocr::{DockerOcr, OcrEngine};
