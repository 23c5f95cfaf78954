//! Migration manifest: the resumable per-item ledger of a migration run.
//!
//! # Modules
//!
//! - [`content`]: storage-independent identity ([`ContentLocation`], [`ContentReference`])
//! - [`entry`]: one item's record and status state machine
//! - [`partition`]: one content type's entries, indices and status counters
//! - [`collection`]: all partitions of a run
//! - [`manifest`]: run identity, profile and top-level errors
//! - [`serializer`]: versioned JSON persistence
//!
//! Manifest reads and writes are pure in-memory operations and never suspend.
//! Only [`ManifestSerializer::save`]/[`ManifestSerializer::load`] touch disk.

pub mod collection;
pub mod content;
pub mod entry;
pub mod error;
pub mod manifest;
pub mod partition;
pub mod serializer;

pub use collection::EntryCollection;
pub use content::{ContentItem, ContentLocation, ContentReference, ContentType};
pub use entry::{EntrySnapshot, ManifestEntry, MigrationStatus};
pub use error::{ManifestError, RecordedError, Result};
pub use manifest::{Manifest, PipelineProfile, MANIFEST_SCHEMA_VERSION};
pub use migrator_ids::{MigrationId, PlanId};
pub use partition::{ContentTypePartition, StatusTotals};
pub use serializer::ManifestSerializer;
