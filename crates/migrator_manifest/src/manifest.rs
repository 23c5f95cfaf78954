//! Run-level migration ledger.

use crate::collection::EntryCollection;
use crate::content::ContentType;
use crate::error::{ManifestError, RecordedError, Result};
use crate::partition::ContentTypePartition;
use migrator_ids::{MigrationId, PlanId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Schema version written by, and the only version readable by, this code.
pub const MANIFEST_SCHEMA_VERSION: u32 = 2;

/// Which migration variant produced a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PipelineProfile {
    ServerToServer,
    #[default]
    ServerToCloud,
    CloudToCloud,
    CloudToServer,
}

impl PipelineProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineProfile::ServerToServer => "ServerToServer",
            PipelineProfile::ServerToCloud => "ServerToCloud",
            PipelineProfile::CloudToCloud => "CloudToCloud",
            PipelineProfile::CloudToServer => "CloudToServer",
        }
    }
}

impl fmt::Display for PipelineProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PipelineProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "servertoserver" => Ok(PipelineProfile::ServerToServer),
            "servertocloud" => Ok(PipelineProfile::ServerToCloud),
            "cloudtocloud" => Ok(PipelineProfile::CloudToCloud),
            "cloudtoserver" => Ok(PipelineProfile::CloudToServer),
            _ => Err(format!(
                "Invalid pipeline profile: '{}'. Expected: ServerToServer, ServerToCloud, CloudToCloud, or CloudToServer",
                s
            )),
        }
    }
}

/// The resumable bookkeeping ledger for one migration run.
///
/// Shared by every worker for the run's lifetime (typically behind an `Arc`).
#[derive(Debug)]
pub struct Manifest {
    plan_id: PlanId,
    migration_id: MigrationId,
    profile: PipelineProfile,
    top_level_errors: Mutex<Vec<RecordedError>>,
    entries: EntryCollection,
}

impl Manifest {
    /// Empty manifest for a new run.
    pub fn new(plan_id: PlanId, profile: PipelineProfile) -> Self {
        Self::restore(plan_id, MigrationId::new(), profile, Vec::new())
    }

    /// Seed a new run from a previous run's manifest.
    ///
    /// Only entries carry over. The run gets a new migration id and an empty
    /// top-level error list. Profiles must match exactly.
    pub fn from_previous(
        previous: &Manifest,
        plan_id: PlanId,
        profile: PipelineProfile,
    ) -> Result<Self> {
        if previous.profile != profile {
            return Err(ManifestError::ProfileMismatch {
                previous: previous.profile,
                current: profile,
            });
        }
        let manifest = Self::new(plan_id, profile);
        let copied = previous.entries.copy_to(&manifest.entries);
        info!(
            previous_migration_id = %previous.migration_id,
            migration_id = %manifest.migration_id,
            entries = copied,
            "Seeded manifest from previous run"
        );
        Ok(manifest)
    }

    pub(crate) fn restore(
        plan_id: PlanId,
        migration_id: MigrationId,
        profile: PipelineProfile,
        top_level_errors: Vec<RecordedError>,
    ) -> Self {
        Self {
            plan_id,
            migration_id,
            profile,
            top_level_errors: Mutex::new(top_level_errors),
            entries: EntryCollection::new(),
        }
    }

    pub fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    pub fn migration_id(&self) -> MigrationId {
        self.migration_id
    }

    pub fn profile(&self) -> PipelineProfile {
        self.profile
    }

    pub fn schema_version(&self) -> u32 {
        MANIFEST_SCHEMA_VERSION
    }

    pub fn entries(&self) -> &EntryCollection {
        &self.entries
    }

    /// Shorthand for `entries().get_or_create(content_type)`.
    pub fn partition(&self, content_type: ContentType) -> ContentTypePartition {
        self.entries.get_or_create(content_type)
    }

    pub fn top_level_errors(&self) -> Vec<RecordedError> {
        self.errors().clone()
    }

    /// Record run-level failures not tied to any item.
    pub fn add_errors<I>(&self, errors: I)
    where
        I: IntoIterator<Item = RecordedError>,
    {
        self.errors().extend(errors);
    }

    pub fn add_error(&self, err: &anyhow::Error) {
        self.add_errors([RecordedError::capture(err)]);
    }

    fn errors(&self) -> MutexGuard<'_, Vec<RecordedError>> {
        self.top_level_errors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.plan_id == other.plan_id
            && self.migration_id == other.migration_id
            && self.profile == other.profile
            && self.top_level_errors() == other.top_level_errors()
            && self.entries == other.entries
    }
}

impl Eq for Manifest {}
