//! Per-item manifest record and its status state machine.

use crate::content::{ContentLocation, ContentReference};
use crate::error::RecordedError;
use crate::partition::PartitionShared;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Current-run status of a manifest entry.
///
/// Any status may move to any other; retries must be able to re-classify freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum MigrationStatus {
    #[default]
    Pending,
    Skipped,
    Migrated,
    Error,
    Canceled,
}

impl MigrationStatus {
    pub const ALL: [MigrationStatus; 5] = [
        MigrationStatus::Pending,
        MigrationStatus::Skipped,
        MigrationStatus::Migrated,
        MigrationStatus::Error,
        MigrationStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Pending => "Pending",
            MigrationStatus::Skipped => "Skipped",
            MigrationStatus::Migrated => "Migrated",
            MigrationStatus::Error => "Error",
            MigrationStatus::Canceled => "Canceled",
        }
    }

    /// Slot in the partition's counter array.
    pub(crate) fn index(self) -> usize {
        match self {
            MigrationStatus::Pending => 0,
            MigrationStatus::Skipped => 1,
            MigrationStatus::Migrated => 2,
            MigrationStatus::Error => 3,
            MigrationStatus::Canceled => 4,
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MigrationStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid migration status: '{}'", s))
    }
}

/// Plain-value copy of an entry's mutable state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntrySnapshot {
    pub mapped_location: ContentLocation,
    pub destination: Option<ContentReference>,
    pub status: MigrationStatus,
    pub skipped_reason: Option<String>,
    pub has_migrated: bool,
    pub errors: Vec<RecordedError>,
}

impl EntrySnapshot {
    /// State of a never-processed entry for `source`.
    pub fn pending(source: &ContentReference) -> Self {
        Self {
            mapped_location: source.location().clone(),
            ..Self::default()
        }
    }
}

struct EntryInner {
    /// Replaced in place when the item's source metadata changes between runs.
    source: RwLock<ContentReference>,
    state: RwLock<EntrySnapshot>,
    owner: Weak<PartitionShared>,
}

/// Shared handle to one manifest entry.
///
/// Cloning is cheap and yields a handle to the same entry. At most one worker
/// is expected to mutate a given entry at a time; the per-entry lock only
/// keeps reads consistent. Index and counter bookkeeping is forwarded to the
/// owning partition after each mutation.
#[derive(Clone)]
pub struct ManifestEntry {
    inner: Arc<EntryInner>,
}

impl ManifestEntry {
    pub(crate) fn with_state(
        owner: Weak<PartitionShared>,
        source: ContentReference,
        state: EntrySnapshot,
    ) -> Self {
        Self {
            inner: Arc::new(EntryInner {
                source: RwLock::new(source),
                state: RwLock::new(state),
                owner,
            }),
        }
    }

    pub fn source(&self) -> ContentReference {
        self.inner
            .source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in updated source metadata, keeping all state. Returns the old
    /// source. The caller re-indexes the entry.
    pub(crate) fn replace_source(&self, source: ContentReference) -> ContentReference {
        let mut current = self
            .inner
            .source
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, source)
    }

    pub fn mapped_location(&self) -> ContentLocation {
        self.read().mapped_location.clone()
    }

    pub fn destination(&self) -> Option<ContentReference> {
        self.read().destination.clone()
    }

    pub fn status(&self) -> MigrationStatus {
        self.read().status
    }

    pub fn skipped_reason(&self) -> Option<String> {
        self.read().skipped_reason.clone()
    }

    pub fn has_migrated(&self) -> bool {
        self.read().has_migrated
    }

    pub fn errors(&self) -> Vec<RecordedError> {
        self.read().errors.clone()
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        self.read().clone()
    }

    /// True if both handles point at the same entry.
    pub fn ptr_eq(&self, other: &ManifestEntry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Record where this item is intended to land.
    ///
    /// A resolved destination at a different location is stale and is dropped.
    pub fn map_to_destination(&self, location: ContentLocation) {
        let (old_mapped, old_destination) = {
            let mut state = self.write();
            let old_mapped = std::mem::replace(&mut state.mapped_location, location);
            let old_destination = state.destination.clone();
            if matches!(&state.destination, Some(dest) if *dest.location() != state.mapped_location)
            {
                state.destination = None;
            }
            (old_mapped, old_destination)
        };
        if let Some(owner) = self.inner.owner.upgrade() {
            owner.destination_info_updated(self, &old_mapped, old_destination.as_ref());
        }
    }

    /// The item was found (or created) on the destination.
    pub fn destination_found(&self, destination: ContentReference) {
        let (old_mapped, old_destination) = {
            let mut state = self.write();
            let old_mapped =
                std::mem::replace(&mut state.mapped_location, destination.location().clone());
            let old_destination = state.destination.replace(destination);
            (old_mapped, old_destination)
        };
        if let Some(owner) = self.inner.owner.upgrade() {
            owner.destination_info_updated(self, &old_mapped, old_destination.as_ref());
        }
    }

    pub fn set_skipped(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.transition(|state| {
            state.status = MigrationStatus::Skipped;
            state.skipped_reason = Some(reason);
        });
    }

    pub fn set_canceled(&self) {
        self.transition(|state| state.status = MigrationStatus::Canceled);
    }

    /// Marks the item migrated. `has_migrated` stays true from here on.
    pub fn set_migrated(&self) {
        self.transition(|state| {
            state.status = MigrationStatus::Migrated;
            state.has_migrated = true;
        });
    }

    /// Record an item-level failure. Never propagated to the caller.
    pub fn set_failed<I>(&self, errors: I)
    where
        I: IntoIterator<Item = RecordedError>,
    {
        let errors: Vec<RecordedError> = errors.into_iter().collect();
        self.transition(|state| {
            state.status = MigrationStatus::Error;
            state.skipped_reason = None;
            state.errors = errors;
        });
        if let Some(owner) = self.inner.owner.upgrade() {
            owner.entry_failed(self);
        }
    }

    /// Convenience for `set_failed` with a live error.
    pub fn set_failed_with(&self, err: &anyhow::Error) {
        self.set_failed([RecordedError::capture(err)]);
    }

    /// Back to `Pending` for a new run. Mapping, destination and
    /// `has_migrated` are kept.
    pub fn reset_status(&self) {
        self.transition(|state| {
            state.status = MigrationStatus::Pending;
            state.skipped_reason = None;
            state.errors.clear();
        });
    }

    fn transition(&self, apply: impl FnOnce(&mut EntrySnapshot)) {
        let (old, new) = {
            let mut state = self.write();
            let old = state.status;
            apply(&mut state);
            (old, state.status)
        };
        if old != new {
            if let Some(owner) = self.inner.owner.upgrade() {
                owner.status_updated(old, new);
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, EntrySnapshot> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EntrySnapshot> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Equal when source and all state match, errors included.
impl PartialEq for ManifestEntry {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.source() == other.source() && self.snapshot() == other.snapshot()
    }
}

impl Eq for ManifestEntry {}

impl fmt::Debug for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("ManifestEntry")
            .field("source", &self.source())
            .field("mapped_location", &state.mapped_location)
            .field("destination", &state.destination)
            .field("status", &state.status)
            .field("has_migrated", &state.has_migrated)
            .field("errors", &state.errors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn detached(path: &str) -> ManifestEntry {
        let source = ContentReference::new(Uuid::new_v4(), ContentLocation::from_path(path));
        let state = EntrySnapshot::pending(&source);
        ManifestEntry::with_state(Weak::new(), source, state)
    }

    #[test]
    fn test_new_entry_maps_to_source_location() {
        let entry = detached("Finance/Budget");
        assert_eq!(entry.status(), MigrationStatus::Pending);
        assert_eq!(entry.mapped_location(), ContentLocation::from_path("Finance/Budget"));
        assert!(entry.destination().is_none());
    }

    #[test]
    fn test_remapping_clears_stale_destination() {
        let entry = detached("Finance/Budget");
        let dest = ContentReference::new(Uuid::new_v4(), ContentLocation::from_path("Fin/Budget"));
        entry.destination_found(dest.clone());
        assert_eq!(entry.mapped_location(), *dest.location());

        entry.map_to_destination(ContentLocation::from_path("Fin/Budget"));
        assert_eq!(entry.destination(), Some(dest));

        entry.map_to_destination(ContentLocation::from_path("Archive/Budget"));
        assert!(entry.destination().is_none());
        assert_eq!(entry.mapped_location(), ContentLocation::from_path("Archive/Budget"));
    }

    #[test]
    fn test_has_migrated_survives_reset() {
        let entry = detached("p");
        entry.set_migrated();
        entry.reset_status();
        assert!(entry.has_migrated());
        assert_eq!(entry.status(), MigrationStatus::Pending);
    }

    #[test]
    fn test_set_failed_clears_skip_reason() {
        let entry = detached("p");
        entry.set_skipped("filtered");
        assert_eq!(entry.skipped_reason().as_deref(), Some("filtered"));
        entry.set_failed([RecordedError::generic("boom")]);
        assert_eq!(entry.status(), MigrationStatus::Error);
        assert!(entry.skipped_reason().is_none());
        assert_eq!(entry.errors().len(), 1);

        entry.reset_status();
        assert!(entry.errors().is_empty());
    }

    #[test]
    fn test_equality_includes_errors() {
        let a = detached("p");
        let b = ManifestEntry::with_state(Weak::new(), a.source(), a.snapshot());
        assert_eq!(a, b);
        b.set_failed([RecordedError::generic("x")]);
        a.set_failed([RecordedError::generic("y")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("migrated".parse::<MigrationStatus>().unwrap(), MigrationStatus::Migrated);
        assert!("Done".parse::<MigrationStatus>().is_err());
    }
}
