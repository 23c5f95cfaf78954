//! Reference cache populated once from a full paged listing.
//!
//! Suited to content types where nearly every destination item is looked up
//! at some point: owners, groups, projects.

use crate::error::{CacheError, Result};
use crate::source::PagedListing;
use crate::ContentReferenceCache;
use async_trait::async_trait;
use migrator_manifest::{ContentItem, ContentLocation, ContentReference, ContentType, Manifest};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Items per listing request unless overridden.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Called for every item inserted during population, in listing order.
///
/// Lets a specialized cache record extra per-item facts during population.
/// Runs only after the full listing succeeded, once per item per cache.
pub trait PopulationHook<T>: Send + Sync {
    fn item_loaded(&self, item: &T, reference: &ContentReference);
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHook;

impl<T> PopulationHook<T> for NoHook {
    fn item_loaded(&self, _item: &T, _reference: &ContentReference) {}
}

#[derive(Debug, Default)]
struct CacheIndex {
    by_location: HashMap<ContentLocation, ContentReference>,
    by_id: HashMap<Uuid, ContentReference>,
}

/// Lazily populated, at-most-once loaded index of one remote catalog.
///
/// Population is single-flight: concurrent lookups issued before it finishes
/// all wait on the same in-flight listing. A failed or canceled population
/// leaves the cache unloaded, and the next lookup starts a fresh attempt.
pub struct BulkReferenceCache<T, H = NoHook> {
    content_type: ContentType,
    listing: Arc<dyn PagedListing<T>>,
    manifest: Weak<Manifest>,
    hook: H,
    page_size: usize,
    index: OnceCell<CacheIndex>,
}

impl<T> BulkReferenceCache<T, NoHook>
where
    T: ContentItem + Send + Sync + 'static,
{
    pub fn new(
        content_type: ContentType,
        listing: Arc<dyn PagedListing<T>>,
        manifest: &Arc<Manifest>,
    ) -> Self {
        Self {
            content_type,
            listing,
            manifest: Arc::downgrade(manifest),
            hook: NoHook,
            page_size: DEFAULT_PAGE_SIZE,
            index: OnceCell::new(),
        }
    }
}

impl<T, H> BulkReferenceCache<T, H>
where
    T: ContentItem + Send + Sync + 'static,
    H: PopulationHook<T>,
{
    /// Replace the population hook. Only meaningful before the first lookup.
    pub fn with_hook<H2: PopulationHook<T>>(self, hook: H2) -> BulkReferenceCache<T, H2> {
        BulkReferenceCache {
            content_type: self.content_type,
            listing: self.listing,
            manifest: self.manifest,
            hook,
            page_size: self.page_size,
            index: self.index,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn is_loaded(&self) -> bool {
        self.index.initialized()
    }

    /// Number of cached references; 0 before population.
    pub fn len(&self) -> usize {
        self.index.get().map_or(0, |index| index.by_location.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populate the cache if it is not loaded yet.
    pub async fn load(&self, cancel: &CancellationToken) -> Result<()> {
        self.loaded(cancel).await.map(|_| ())
    }

    async fn loaded(&self, cancel: &CancellationToken) -> Result<&CacheIndex> {
        self.index.get_or_try_init(|| self.populate(cancel)).await
    }

    async fn populate(&self, cancel: &CancellationToken) -> Result<CacheIndex> {
        let partition = self
            .manifest
            .upgrade()
            .and_then(|manifest| manifest.entries().partition(self.content_type));

        let mut index = CacheIndex::default();
        let mut loaded = Vec::new();
        let mut page_number = 1;
        let mut seen = 0;

        loop {
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CacheError::Canceled),
                page = self.listing.fetch_page(page_number, self.page_size, cancel) => page,
            };
            let page = page.map_err(|source| {
                warn!(
                    content_type = %self.content_type,
                    page = page_number,
                    error = %source,
                    "Reference listing failed"
                );
                CacheError::Listing {
                    content_type: self.content_type,
                    page: page_number,
                    source,
                }
            })?;

            if page.items.is_empty() {
                break;
            }
            seen += page.items.len();
            loaded.extend(page.items.into_iter().map(|item| {
                let reference = item.to_reference();
                (item, reference)
            }));
            debug!(
                content_type = %self.content_type,
                page = page_number,
                seen,
                total = ?page.total_count,
                "Loaded reference page"
            );

            if page.total_count.is_some_and(|total| seen >= total) {
                break;
            }
            page_number += 1;
        }

        // Nothing is linked or reported until every page has been fetched.
        for (item, reference) in loaded {
            if let Some(partition) = &partition {
                partition.link_destination(&reference);
            }
            self.hook.item_loaded(&item, &reference);
            if reference.has_id() {
                index.by_id.insert(reference.id(), reference.clone());
            }
            index
                .by_location
                .insert(reference.location().clone(), reference);
        }

        info!(
            content_type = %self.content_type,
            references = index.by_location.len(),
            pages = page_number,
            "Reference cache populated"
        );
        Ok(index)
    }
}

#[async_trait]
impl<T, H> ContentReferenceCache for BulkReferenceCache<T, H>
where
    T: ContentItem + Send + Sync + 'static,
    H: PopulationHook<T>,
{
    async fn for_location(
        &self,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentReference>> {
        let index = self.loaded(cancel).await?;
        Ok(index.by_location.get(location).cloned())
    }

    async fn for_id(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<ContentReference>> {
        if id.is_nil() {
            return Ok(None);
        }
        let index = self.loaded(cancel).await?;
        Ok(index.by_id.get(&id).cloned())
    }
}
