//! Entries of one content type, with lookup indices and status counters.
//!
//! The planning phase (entry creation, initial mapping) is single-writer and
//! appends to the ordered entry list. The publish phase only touches the
//! secondary indices and counters, which are `DashMap`s and atomics so that
//! independent item completions never contend on a partition-wide lock.

use crate::content::{ContentItem, ContentLocation, ContentReference, ContentType};
use crate::entry::{EntrySnapshot, ManifestEntry, MigrationStatus};
use crate::error::{ManifestError, Result};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Count of entries per status. Every status is present, zero included.
pub type StatusTotals = BTreeMap<MigrationStatus, usize>;

pub(crate) struct PartitionShared {
    content_type: ContentType,
    entries: RwLock<Vec<ManifestEntry>>,
    by_source_location: DashMap<ContentLocation, ManifestEntry>,
    by_source_id: DashMap<Uuid, ManifestEntry>,
    by_source_url: DashMap<String, ManifestEntry>,
    by_mapped_location: DashMap<ContentLocation, ManifestEntry>,
    by_destination_id: DashMap<Uuid, ManifestEntry>,
    status_counts: [AtomicUsize; 5],
}

impl PartitionShared {
    /// Re-key the mapped-location and destination-id indices after an entry's
    /// destination info changed. Stale keys are only removed while they still
    /// point at this entry.
    pub(crate) fn destination_info_updated(
        &self,
        entry: &ManifestEntry,
        old_mapped: &ContentLocation,
        old_destination: Option<&ContentReference>,
    ) {
        remove_if_same(&self.by_mapped_location, old_mapped, entry);
        if let Some(old) = old_destination.filter(|old| old.has_id()) {
            remove_if_same(&self.by_destination_id, &old.id(), entry);
        }

        let mapped = entry.mapped_location();
        debug!(
            content_type = %self.content_type,
            source = %entry.source().location(),
            mapped = %mapped,
            "Destination info updated"
        );
        self.by_mapped_location.insert(mapped, entry.clone());
        if let Some(dest) = entry.destination().filter(|dest| dest.has_id()) {
            self.by_destination_id.insert(dest.id(), entry.clone());
        }
    }

    pub(crate) fn status_updated(&self, old: MigrationStatus, new: MigrationStatus) {
        if old == new {
            return;
        }
        let decremented = self.status_counts[old.index()].fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |count| count.checked_sub(1),
        );
        if decremented.is_err() {
            warn!(
                content_type = %self.content_type,
                from = %old,
                to = %new,
                "Status counter underflow, totals no longer match entries"
            );
        }
        self.status_counts[new.index()].fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn entry_failed(&self, entry: &ManifestEntry) {
        let errors = entry.errors();
        warn!(
            content_type = %self.content_type,
            source = %entry.source().location(),
            error_count = errors.len(),
            first_error = errors.first().map(|e| e.to_string()).unwrap_or_default(),
            "Content item failed to migrate"
        );
    }

    fn index_entry(&self, entry: &ManifestEntry) {
        let source = entry.source();
        self.by_source_location
            .insert(source.location().clone(), entry.clone());
        if source.has_id() {
            self.by_source_id.insert(source.id(), entry.clone());
        }
        if let Some(url) = source.content_url() {
            self.by_source_url.insert(url.to_string(), entry.clone());
        }
        self.by_mapped_location
            .insert(entry.mapped_location(), entry.clone());
        if let Some(dest) = entry.destination().filter(|dest| dest.has_id()) {
            self.by_destination_id.insert(dest.id(), entry.clone());
        }
    }

    fn unindex_source(&self, entry: &ManifestEntry) {
        let source = entry.source();
        remove_if_same(&self.by_source_location, source.location(), entry);
        if source.has_id() {
            remove_if_same(&self.by_source_id, &source.id(), entry);
        }
        if let Some(url) = source.content_url() {
            remove_if_same(&self.by_source_url, url, entry);
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<ManifestEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<ManifestEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_if_same<K, Q>(map: &DashMap<K, ManifestEntry>, key: &Q, entry: &ManifestEntry)
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    map.remove_if(key, |_, current| current.ptr_eq(entry));
}

/// Shared handle to one content type's entries.
#[derive(Clone)]
pub struct ContentTypePartition {
    shared: Arc<PartitionShared>,
}

impl ContentTypePartition {
    pub fn new(content_type: ContentType) -> Self {
        Self::with_capacity(content_type, 0)
    }

    pub fn with_capacity(content_type: ContentType, capacity: usize) -> Self {
        Self {
            shared: Arc::new(PartitionShared {
                content_type,
                entries: RwLock::new(Vec::with_capacity(capacity)),
                by_source_location: DashMap::with_capacity(capacity),
                by_source_id: DashMap::with_capacity(capacity),
                by_source_url: DashMap::with_capacity(capacity),
                by_mapped_location: DashMap::with_capacity(capacity),
                by_destination_id: DashMap::new(),
                status_counts: Default::default(),
            }),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.shared.content_type
    }

    pub fn len(&self) -> usize {
        self.shared.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in creation order.
    pub fn entries(&self) -> Vec<ManifestEntry> {
        self.shared.read_entries().clone()
    }

    pub fn by_source_location(&self, location: &ContentLocation) -> Option<ManifestEntry> {
        self.shared
            .by_source_location
            .get(location)
            .map(|e| e.value().clone())
    }

    pub fn by_source_id(&self, id: Uuid) -> Option<ManifestEntry> {
        if id.is_nil() {
            return None;
        }
        self.shared.by_source_id.get(&id).map(|e| e.value().clone())
    }

    pub fn by_source_content_url(&self, content_url: &str) -> Option<ManifestEntry> {
        if content_url.is_empty() {
            return None;
        }
        self.shared
            .by_source_url
            .get(content_url)
            .map(|e| e.value().clone())
    }

    pub fn by_mapped_location(&self, location: &ContentLocation) -> Option<ManifestEntry> {
        self.shared
            .by_mapped_location
            .get(location)
            .map(|e| e.value().clone())
    }

    pub fn by_destination_id(&self, id: Uuid) -> Option<ManifestEntry> {
        if id.is_nil() {
            return None;
        }
        self.shared
            .by_destination_id
            .get(&id)
            .map(|e| e.value().clone())
    }

    /// Snapshot of the status counters.
    pub fn status_totals(&self) -> StatusTotals {
        MigrationStatus::ALL
            .iter()
            .map(|status| {
                let count = self.shared.status_counts[status.index()].load(Ordering::Acquire);
                (*status, count)
            })
            .collect()
    }

    /// Deep-clone every entry of `previous` into this partition.
    ///
    /// New entries share no state with the old ones; indices and counters are
    /// rebuilt from scratch. Entries whose source location is already tracked
    /// here are left alone. Returns the number of entries copied.
    pub fn create_entries_from(&self, previous: &ContentTypePartition) -> usize {
        let previous_entries = previous.entries();
        self.shared.write_entries().reserve(previous_entries.len());
        let mut copied = 0;
        for old in previous_entries {
            if self.by_source_location(old.source().location()).is_some() {
                debug!(
                    content_type = %self.content_type(),
                    source = %old.source().location(),
                    "Skipping duplicate entry while copying previous run"
                );
                continue;
            }
            self.insert_entry(old.source(), old.snapshot());
            copied += 1;
        }
        copied
    }

    /// Insert a fully-formed entry, e.g. while loading a saved manifest.
    pub fn restore_entry(
        &self,
        source: ContentReference,
        state: EntrySnapshot,
    ) -> Result<ManifestEntry> {
        if self.by_source_location(source.location()).is_some() {
            return Err(ManifestError::Invalid(format!(
                "duplicate {} entry for source location '{}'",
                self.content_type(),
                source.location()
            )));
        }
        if let Some(dest) = &state.destination {
            if *dest.location() != state.mapped_location {
                return Err(ManifestError::Invalid(format!(
                    "{} entry '{}' has destination at '{}' but is mapped to '{}'",
                    self.content_type(),
                    source.location(),
                    dest.location(),
                    state.mapped_location
                )));
            }
        }
        Ok(self.insert_entry(source, state))
    }

    /// Create or link entries for a batch of source items.
    ///
    /// Items are matched by source location, then by source id (an item
    /// moved on the source since a prior run). Unmatched items get a fresh
    /// `Pending` entry. A matched entry whose source metadata changed is
    /// updated in place, keeping its state, and re-indexed under the new keys.
    /// Returns `factory(item, entry)` for each item, in input order.
    pub fn create_entries<T, R, F>(&self, items: &[T], mut factory: F) -> Vec<R>
    where
        T: ContentItem,
        F: FnMut(&T, &ManifestEntry) -> R,
    {
        self.shared.write_entries().reserve(items.len());
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let source = item.to_reference();
            let existing = self
                .by_source_location(source.location())
                .or_else(|| self.by_source_id(source.id()));

            let entry = match existing {
                None => self.insert_entry(source.clone(), EntrySnapshot::pending(&source)),
                Some(existing) if existing.source() == source => existing,
                Some(existing) => self.update_source(existing, source),
            };
            results.push(factory(item, &entry));
        }

        results
    }

    /// Compute and record the destination location of each tracked item.
    ///
    /// Items with no entry are ignored. Cancellation is checked before each
    /// item. Returns the number of entries mapped.
    pub async fn map_entries<T, F, Fut>(
        &self,
        items: &[T],
        mut mapper: F,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        T: ContentItem,
        F: FnMut(ContentReference) -> Fut,
        Fut: Future<Output = ContentLocation>,
    {
        let mut mapped = 0;
        for item in items {
            if cancel.is_cancelled() {
                return Err(ManifestError::Canceled);
            }
            let source = item.to_reference();
            let Some(entry) = self.by_source_location(source.location()) else {
                continue;
            };
            let location = mapper(source).await;
            entry.map_to_destination(location);
            mapped += 1;
        }
        Ok(mapped)
    }

    /// Attach a destination discovered by a cache to the entry mapped at its
    /// location, if any.
    pub fn link_destination(&self, destination: &ContentReference) -> Option<ManifestEntry> {
        let entry = self.by_mapped_location(destination.location())?;
        if entry.destination().as_ref() != Some(destination) {
            entry.destination_found(destination.clone());
        }
        Some(entry)
    }

    fn insert_entry(&self, source: ContentReference, state: EntrySnapshot) -> ManifestEntry {
        let status = state.status;
        let entry = ManifestEntry::with_state(Arc::downgrade(&self.shared), source, state);
        self.shared.write_entries().push(entry.clone());
        self.shared.index_entry(&entry);
        self.shared.status_counts[status.index()].fetch_add(1, Ordering::AcqRel);
        entry
    }

    /// Re-key an entry whose source metadata changed since a prior run.
    ///
    /// The entry object itself is kept, so handles already given out stay
    /// the canonical entry and its state is untouched.
    fn update_source(&self, existing: ManifestEntry, source: ContentReference) -> ManifestEntry {
        debug!(
            content_type = %self.content_type(),
            old = %existing.source(),
            new = %source,
            "Source metadata changed, re-indexing entry"
        );
        self.shared.unindex_source(&existing);
        existing.replace_source(source);
        self.shared.index_entry(&existing);
        existing
    }
}

/// Same content type and equal entry sequences.
impl PartialEq for ContentTypePartition {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return true;
        }
        self.content_type() == other.content_type() && self.entries() == other.entries()
    }
}

impl Eq for ContentTypePartition {}

impl fmt::Debug for ContentTypePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTypePartition")
            .field("content_type", &self.content_type())
            .field("entries", &self.len())
            .finish()
    }
}
