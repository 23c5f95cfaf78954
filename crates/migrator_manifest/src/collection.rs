//! All partitions of a manifest, keyed by content type.

use crate::content::ContentType;
use crate::entry::MigrationStatus;
use crate::partition::{ContentTypePartition, StatusTotals};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Owns one [`ContentTypePartition`] per content type.
///
/// Partitions are created lazily. Adding a partition is expected to happen
/// from the coordinating task; the partitions themselves are shared freely.
#[derive(Default)]
pub struct EntryCollection {
    partitions: RwLock<BTreeMap<ContentType, ContentTypePartition>>,
}

impl EntryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, content_type: ContentType) -> ContentTypePartition {
        if let Some(partition) = self.partition(content_type) {
            return partition;
        }
        self.write()
            .entry(content_type)
            .or_insert_with(|| ContentTypePartition::new(content_type))
            .clone()
    }

    /// Like [`EntryCollection::get_or_create`], sizing a new partition up front.
    pub fn get_or_create_with_capacity(
        &self,
        content_type: ContentType,
        capacity: usize,
    ) -> ContentTypePartition {
        self.write()
            .entry(content_type)
            .or_insert_with(|| ContentTypePartition::with_capacity(content_type, capacity))
            .clone()
    }

    pub fn partition(&self, content_type: ContentType) -> Option<ContentTypePartition> {
        self.read().get(&content_type).cloned()
    }

    /// Partitions in content-type order.
    pub fn partitions(&self) -> Vec<ContentTypePartition> {
        self.read().values().cloned().collect()
    }

    pub fn content_types(&self) -> Vec<ContentType> {
        self.read().keys().copied().collect()
    }

    /// Total entries across all partitions.
    pub fn len(&self) -> usize {
        self.read().values().map(ContentTypePartition::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status counters summed over every partition.
    pub fn status_totals(&self) -> StatusTotals {
        let mut totals: StatusTotals = MigrationStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for partition in self.partitions() {
            for (status, count) in partition.status_totals() {
                *totals.entry(status).or_default() += count;
            }
        }
        totals
    }

    /// Deep-clone every partition's entries into `other`.
    ///
    /// Returns the number of entries copied.
    pub fn copy_to(&self, other: &EntryCollection) -> usize {
        self.partitions()
            .iter()
            .map(|partition| {
                other
                    .get_or_create_with_capacity(partition.content_type(), partition.len())
                    .create_entries_from(partition)
            })
            .sum()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ContentType, ContentTypePartition>> {
        self.partitions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ContentType, ContentTypePartition>> {
        self.partitions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Same content types, and equal entry sequences per type.
impl PartialEq for EntryCollection {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.partitions() == other.partitions()
    }
}

impl Eq for EntryCollection {}

impl fmt::Debug for EntryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.partitions()
                    .iter()
                    .map(|partition| (partition.content_type(), partition.len())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentLocation, ContentReference};
    use crate::error::RecordedError;
    use uuid::Uuid;

    fn reference(path: &str) -> ContentReference {
        ContentReference::new(Uuid::new_v4(), ContentLocation::from_path(path))
    }

    #[test]
    fn test_get_or_create_returns_same_partition() {
        let collection = EntryCollection::new();
        let first = collection.get_or_create(ContentType::Project);
        first.create_entries(&[reference("a")], |_, _| ());
        let second = collection.get_or_create(ContentType::Project);
        assert_eq!(second.len(), 1);
        assert_eq!(collection.content_types(), vec![ContentType::Project]);
    }

    #[test]
    fn test_copy_to_deep_clones() {
        let source = EntryCollection::new();
        let projects = source.get_or_create(ContentType::Project);
        let entries = projects.create_entries(&[reference("a"), reference("b")], |_, e| e.clone());
        entries[0].set_migrated();
        entries[1].set_failed([RecordedError::generic("denied")]);
        source
            .get_or_create(ContentType::User)
            .create_entries(&[reference("local/ann")], |_, _| ());

        let target = EntryCollection::new();
        assert_eq!(source.copy_to(&target), 3);
        assert_eq!(source, target);

        // Mutating the copy leaves the original untouched.
        let copied = target
            .partition(ContentType::Project)
            .and_then(|p| p.by_source_location(entries[0].source().location()))
            .unwrap();
        copied.reset_status();
        assert_ne!(source, target);
        assert_eq!(entries[0].status(), MigrationStatus::Migrated);
    }

    #[test]
    fn test_equality_requires_same_content_types() {
        let a = EntryCollection::new();
        let b = EntryCollection::new();
        a.get_or_create(ContentType::Flow);
        assert_ne!(a, b);
    }

    #[test]
    fn test_status_totals_sum_partitions() {
        let collection = EntryCollection::new();
        collection
            .get_or_create(ContentType::Project)
            .create_entries(&[reference("a")], |_, _| ());
        collection
            .get_or_create(ContentType::Workbook)
            .create_entries(&[reference("a/wb")], |_, e| e.clone())[0]
            .set_skipped("filtered");

        let totals = collection.status_totals();
        assert_eq!(totals[&MigrationStatus::Pending], 1);
        assert_eq!(totals[&MigrationStatus::Skipped], 1);
        assert_eq!(collection.len(), 2);
    }
}
