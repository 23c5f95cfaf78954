//! Error types for reference resolution.

use migrator_manifest::ContentType;
use thiserror::Error;

/// Cache operation result type.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache errors. "Not found" is never an error; lookups return `Ok(None)`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A page of the bulk listing could not be fetched. The cache stays
    /// unloaded and the next lookup retries population.
    #[error("Listing {content_type} failed on page {page}: {source}")]
    Listing {
        content_type: ContentType,
        page: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A targeted point lookup failed.
    #[error("Searching {content_type} for {target} failed: {source}")]
    Search {
        content_type: ContentType,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Operation canceled")]
    Canceled,
}

impl CacheError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, CacheError::Canceled)
    }
}
