//! Two-tier cache for content types where only a fraction of the catalog is
//! ever referenced.
//!
//! Tier 1 is the manifest itself plus a memo of earlier search results.
//! Tier 2 is a narrow search on the destination. Nothing is enumerated.

use crate::error::{CacheError, Result};
use crate::source::ContentSearch;
use crate::ContentReferenceCache;
use async_trait::async_trait;
use dashmap::DashMap;
use migrator_manifest::{ContentLocation, ContentReference, ContentType, Manifest};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub struct ManifestBackedCache<S> {
    content_type: ContentType,
    manifest: Weak<Manifest>,
    search: S,
    by_location: DashMap<ContentLocation, ContentReference>,
    by_id: DashMap<Uuid, ContentReference>,
}

impl<S: ContentSearch> ManifestBackedCache<S> {
    pub fn new(content_type: ContentType, search: S, manifest: &Arc<Manifest>) -> Self {
        Self {
            content_type,
            manifest: Arc::downgrade(manifest),
            search,
            by_location: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn search(&self) -> &S {
        &self.search
    }

    /// Number of references learned from searches.
    pub fn memoized(&self) -> usize {
        self.by_location.len()
    }

    fn manifest_by_location(&self, location: &ContentLocation) -> Option<ContentReference> {
        let manifest = self.manifest.upgrade()?;
        manifest
            .entries()
            .partition(self.content_type)?
            .by_mapped_location(location)?
            .destination()
    }

    fn manifest_by_id(&self, id: Uuid) -> Option<ContentReference> {
        let manifest = self.manifest.upgrade()?;
        manifest
            .entries()
            .partition(self.content_type)?
            .by_destination_id(id)?
            .destination()
    }

    fn remember(&self, reference: &ContentReference) {
        self.by_location
            .insert(reference.location().clone(), reference.clone());
        if reference.has_id() {
            self.by_id.insert(reference.id(), reference.clone());
        }
        if let Some(partition) = self
            .manifest
            .upgrade()
            .and_then(|manifest| manifest.entries().partition(self.content_type))
        {
            partition.link_destination(reference);
        }
    }

    fn search_failed(&self, target: String, source: anyhow::Error) -> CacheError {
        CacheError::Search {
            content_type: self.content_type,
            target,
            source,
        }
    }
}

#[async_trait]
impl<S: ContentSearch> ContentReferenceCache for ManifestBackedCache<S> {
    async fn for_location(
        &self,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentReference>> {
        if let Some(found) = self.manifest_by_location(location) {
            return Ok(Some(found));
        }
        if let Some(found) = self.by_location.get(location) {
            return Ok(Some(found.value().clone()));
        }

        let candidates = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CacheError::Canceled),
            found = self.search.search_location(location, cancel) => found,
        }
        .map_err(|source| self.search_failed(location.to_string(), source))?;

        let found = candidates
            .into_iter()
            .find(|candidate| candidate.location() == location);
        debug!(
            content_type = %self.content_type,
            %location,
            found = found.is_some(),
            "Searched destination by location"
        );
        if let Some(reference) = &found {
            self.remember(reference);
        }
        Ok(found)
    }

    async fn for_id(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<ContentReference>> {
        if id.is_nil() {
            return Ok(None);
        }
        if let Some(found) = self.manifest_by_id(id) {
            return Ok(Some(found));
        }
        if let Some(found) = self.by_id.get(&id) {
            return Ok(Some(found.value().clone()));
        }

        let candidates = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CacheError::Canceled),
            found = self.search.search_id(id, cancel) => found,
        }
        .map_err(|source| self.search_failed(id.to_string(), source))?;

        let found = candidates.into_iter().find(|candidate| candidate.id() == id);
        debug!(
            content_type = %self.content_type,
            %id,
            found = found.is_some(),
            "Searched destination by id"
        );
        if let Some(reference) = &found {
            self.remember(reference);
        }
        Ok(found)
    }
}
