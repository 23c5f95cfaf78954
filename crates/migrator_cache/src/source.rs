//! Capabilities the caches consume from the endpoint clients.
//!
//! Both traits are implemented by the API layer; the caches only drive them.

use async_trait::async_trait;
use migrator_manifest::{ContentLocation, ContentReference};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total items across all pages, when the endpoint reports it.
    pub total_count: Option<usize>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: Option<usize>) -> Self {
        Self { items, total_count }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: Some(0),
        }
    }
}

/// Full enumeration of a remote catalog, one page at a time.
///
/// `page_number` starts at 1. An empty page ends the listing.
#[async_trait]
pub trait PagedListing<T: Send>: Send + Sync {
    async fn fetch_page(
        &self,
        page_number: usize,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Page<T>>;
}

/// Narrow point lookups against a remote catalog.
///
/// Implementations return every candidate the endpoint considers a match;
/// the caller picks the exact one.
#[async_trait]
pub trait ContentSearch: Send + Sync {
    async fn search_location(
        &self,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<ContentReference>>;

    async fn search_id(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<ContentReference>>;
}
