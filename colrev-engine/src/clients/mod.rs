//! Metadata provider clients
//!
//! Request/response contracts of the external services the engine consults.
//! Each client owns its rate limiter and retry policy ([`http::ProviderHttp`])
//! and reports failures through its own error enum, which converts into
//! [`colrev_common::Error::Http`].

pub mod crossref;
pub mod csl;
pub mod dblp;
pub mod doi;
pub mod grobid;
pub mod http;
pub mod open_library;
pub mod semantic_scholar;
pub mod unpaywall;

pub use crossref::{CrossrefClient, CrossrefError};
pub use dblp::{DblpClient, DblpError};
pub use doi::{DoiClient, DoiError};
pub use grobid::{GrobidClient, GrobidError};
pub use open_library::{OpenLibraryClient, OpenLibraryError};
pub use semantic_scholar::{SemanticScholarClient, SemanticScholarError};
pub use unpaywall::{UnpaywallClient, UnpaywallError};

use colrev_common::Result;

/// Base URLs of the providers (overridable for tests and mirrors)
#[derive(Debug, Clone)]
pub struct ProviderUrls {
    pub crossref: String,
    pub doi: String,
    pub dblp: String,
    pub semantic_scholar: String,
    pub open_library: String,
    pub unpaywall: String,
    pub grobid: String,
}

impl Default for ProviderUrls {
    fn default() -> Self {
        Self {
            crossref: crossref::CROSSREF_BASE_URL.to_string(),
            doi: doi::DOI_BASE_URL.to_string(),
            dblp: dblp::DBLP_BASE_URL.to_string(),
            semantic_scholar: semantic_scholar::SEMANTIC_SCHOLAR_BASE_URL.to_string(),
            open_library: open_library::OPEN_LIBRARY_BASE_URL.to_string(),
            unpaywall: unpaywall::UNPAYWALL_BASE_URL.to_string(),
            grobid: std::env::var("GROBID_URL").unwrap_or_else(|_| grobid::GROBID_BASE_URL.to_string()),
        }
    }
}

/// The metadata providers used during preparation
pub struct Providers {
    pub crossref: CrossrefClient,
    pub doi: DoiClient,
    pub dblp: DblpClient,
    pub semantic_scholar: SemanticScholarClient,
    pub open_library: OpenLibraryClient,
}

impl Providers {
    pub fn new(urls: &ProviderUrls, mailto: Option<String>) -> Result<Self> {
        Ok(Self {
            crossref: CrossrefClient::with_base_url(&urls.crossref, mailto)?,
            doi: DoiClient::with_base_url(&urls.doi)?,
            dblp: DblpClient::with_base_url(&urls.dblp)?,
            semantic_scholar: SemanticScholarClient::with_base_url(&urls.semantic_scholar)?,
            open_library: OpenLibraryClient::with_base_url(&urls.open_library)?,
        })
    }
}

impl ProviderUrls {
    /// Every provider served from one base URL (mock servers)
    pub fn all(base_url: &str) -> Self {
        Self {
            crossref: base_url.to_string(),
            doi: base_url.to_string(),
            dblp: base_url.to_string(),
            semantic_scholar: base_url.to_string(),
            open_library: base_url.to_string(),
            unpaywall: base_url.to_string(),
            grobid: base_url.to_string(),
        }
    }
}
