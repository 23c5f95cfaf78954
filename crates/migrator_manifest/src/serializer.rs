//! Versioned JSON persistence for [`Manifest`].
//!
//! # File format
//!
//! ```text
//! { schemaVersion, planId, migrationId, profile, topLevelErrors: [Error],
//!   partitions: [{ contentType, entries: [{ source, mappedLocation,
//!   destination, status, skippedReason, hasMigrated, errors }] }] }
//! ```
//!
//! Enums are written by symbolic name so reordering them in code never
//! changes the file. Errors are decoded through an ordered chain: each known
//! kind first, then a generic fallback that accepts anything.

use crate::content::{ContentLocation, ContentReference, ContentType};
use crate::entry::{EntrySnapshot, MigrationStatus};
use crate::error::{ManifestError, RecordedError, Result};
use crate::manifest::{Manifest, PipelineProfile, MANIFEST_SCHEMA_VERSION};
use migrator_ids::{MigrationId, PlanId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFile {
    schema_version: u32,
    plan_id: PlanId,
    migration_id: MigrationId,
    profile: PipelineProfile,
    #[serde(default)]
    top_level_errors: Vec<PersistedError>,
    #[serde(default)]
    partitions: Vec<PartitionFile>,
}

/// Only the version; everything else in the document is skipped.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    schema_version: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionFile {
    content_type: ContentType,
    #[serde(default)]
    entries: Vec<EntryFile>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryFile {
    source: ContentReference,
    mapped_location: ContentLocation,
    destination: Option<ContentReference>,
    status: MigrationStatus,
    #[serde(default)]
    skipped_reason: Option<String>,
    #[serde(default)]
    has_migrated: bool,
    #[serde(default)]
    errors: Vec<PersistedError>,
}

/// Decode chain for errors. Variant order is the try order.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PersistedError {
    Known(RecordedError),
    Fallback(Value),
}

impl From<&RecordedError> for PersistedError {
    fn from(err: &RecordedError) -> Self {
        PersistedError::Known(err.clone())
    }
}

impl From<PersistedError> for RecordedError {
    fn from(persisted: PersistedError) -> Self {
        match persisted {
            PersistedError::Known(err) => err,
            PersistedError::Fallback(value) => {
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                RecordedError::generic(message)
            }
        }
    }
}

/// Saves and loads manifests.
#[derive(Debug, Clone, Default)]
pub struct ManifestSerializer {
    pretty: bool,
}

impl ManifestSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indent output for humans.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn to_json(&self, manifest: &Manifest) -> Result<String> {
        let file = ManifestFile {
            schema_version: manifest.schema_version(),
            plan_id: manifest.plan_id(),
            migration_id: manifest.migration_id(),
            profile: manifest.profile(),
            top_level_errors: manifest
                .top_level_errors()
                .iter()
                .map(PersistedError::from)
                .collect(),
            partitions: manifest
                .entries()
                .partitions()
                .iter()
                .map(|partition| PartitionFile {
                    content_type: partition.content_type(),
                    entries: partition
                        .entries()
                        .iter()
                        .map(|entry| {
                            let state = entry.snapshot();
                            EntryFile {
                                source: entry.source(),
                                mapped_location: state.mapped_location,
                                destination: state.destination,
                                status: state.status,
                                skipped_reason: state.skipped_reason,
                                has_migrated: state.has_migrated,
                                errors: state.errors.iter().map(PersistedError::from).collect(),
                            }
                        })
                        .collect(),
                })
                .collect(),
        };
        let json = if self.pretty {
            serde_json::to_string_pretty(&file)?
        } else {
            serde_json::to_string(&file)?
        };
        Ok(json)
    }

    /// Parse a manifest. The schema version is checked before any entry is
    /// materialized.
    pub fn parse_json(&self, text: &str) -> Result<Manifest> {
        let probe: VersionProbe = serde_json::from_str(text)?;
        if probe.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(ManifestError::SchemaVersionMismatch {
                expected: MANIFEST_SCHEMA_VERSION,
                found: probe.schema_version,
            });
        }

        let file: ManifestFile = serde_json::from_str(text)?;
        let manifest = Manifest::restore(
            file.plan_id,
            file.migration_id,
            file.profile,
            file.top_level_errors.into_iter().map(RecordedError::from).collect(),
        );

        for partition_file in file.partitions {
            let partition = manifest
                .entries()
                .get_or_create_with_capacity(partition_file.content_type, partition_file.entries.len());
            for entry in partition_file.entries {
                let state = EntrySnapshot {
                    mapped_location: entry.mapped_location,
                    destination: entry.destination,
                    status: entry.status,
                    skipped_reason: entry.skipped_reason,
                    has_migrated: entry.has_migrated,
                    errors: entry.errors.into_iter().map(RecordedError::from).collect(),
                };
                partition.restore_entry(entry.source, state)?;
            }
        }
        Ok(manifest)
    }

    /// Persist `manifest` to `path`, replacing any previous file atomically.
    ///
    /// Takes no cancellation token: a save issued while winding down a
    /// canceled run must still land. The write runs on a blocking task, so it
    /// completes even if the awaiting future is dropped.
    pub async fn save(&self, manifest: &Manifest, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json(manifest)?;
        let path = path.as_ref().to_path_buf();
        let bytes = json.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, json.as_bytes())).await??;
        info!(
            path = %path.display(),
            migration_id = %manifest.migration_id(),
            entries = manifest.entries().len(),
            bytes,
            "Saved manifest"
        );
        Ok(())
    }

    /// Load a manifest from `path`. `Ok(None)` if the file does not exist.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Option<Manifest>> {
        let path = path.as_ref();
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No manifest to load");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let manifest = self.parse_json(&text)?;
        info!(
            path = %path.display(),
            migration_id = %manifest.migration_id(),
            entries = manifest.entries().len(),
            "Loaded manifest"
        );
        Ok(Some(manifest))
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_manifest() -> Manifest {
        let manifest = Manifest::new(PlanId::new(), PipelineProfile::ServerToCloud);
        let entries = manifest.partition(ContentType::Workbook).create_entries(
            &[
                ContentReference::new(Uuid::new_v4(), ContentLocation::from_path("Sales/Q1"))
                    .with_content_url("q1"),
                ContentReference::new(Uuid::new_v4(), ContentLocation::from_path("Sales/Q2")),
                ContentReference::new(Uuid::nil(), ContentLocation::from_path("Sales/Q3")),
            ],
            |_, e| e.clone(),
        );
        entries[0].destination_found(
            ContentReference::new(Uuid::new_v4(), ContentLocation::from_path("Cloud/Sales/Q1"))
                .with_content_url("q1"),
        );
        entries[0].set_migrated();
        entries[1].set_failed([
            RecordedError::Remote {
                status_code: 400,
                code: Some("400011".to_string()),
                summary: "Bad Request".to_string(),
                detail: Some("invalid connection".to_string()),
                request_url: None,
            },
            RecordedError::timeout("publish"),
        ]);
        entries[2].set_skipped("filtered by name");
        manifest.add_errors([RecordedError::generic("projects phase aborted")]);
        manifest
    }

    #[test]
    fn test_round_trip() {
        let serializer = ManifestSerializer::new();
        let manifest = sample_manifest();
        let json = serializer.to_json(&manifest).unwrap();
        let loaded = serializer.parse_json(&json).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.partition(ContentType::Workbook).status_totals(),
            manifest.partition(ContentType::Workbook).status_totals()
        );
    }

    #[test]
    fn test_status_and_profile_written_by_name() {
        let json = ManifestSerializer::new().to_json(&sample_manifest()).unwrap();
        assert!(json.contains("\"status\":\"Migrated\""));
        assert!(json.contains("\"profile\":\"ServerToCloud\""));
        assert!(json.contains("\"contentType\":\"Workbook\""));
    }

    #[test]
    fn test_version_gate() {
        let serializer = ManifestSerializer::new();
        let mut value: Value =
            serde_json::from_str(&serializer.to_json(&sample_manifest()).unwrap()).unwrap();
        value["schemaVersion"] = Value::from(MANIFEST_SCHEMA_VERSION + 1);
        // Entries that would not even parse must not be reached.
        value["partitions"] = Value::from("garbage");

        let err = serializer.parse_json(&value.to_string()).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::SchemaVersionMismatch { expected, found }
                if expected == MANIFEST_SCHEMA_VERSION && found == MANIFEST_SCHEMA_VERSION + 1
        ));
    }

    /// Pins the decode order: known kinds first, anything else falls through
    /// to the generic encoding.
    #[test]
    fn test_error_decode_chain_fixture() {
        let fixture = r#"[
            {"kind":"remote","statusCode":403,"summary":"Forbidden"},
            {"kind":"timeout","operation":"download"},
            {"kind":"canceled","message":"shutdown"},
            {"kind":"io","errorKind":"NotFound","message":"missing file"},
            {"kind":"generic","message":"boom","sources":["inner"]},
            {"kind":"timeout"},
            {"kind":"quota","message":"too many requests"},
            "plain text"
        ]"#;
        let decoded: Vec<RecordedError> = serde_json::from_str::<Vec<PersistedError>>(fixture)
            .unwrap()
            .into_iter()
            .map(RecordedError::from)
            .collect();

        let kinds: Vec<&str> = decoded.iter().map(RecordedError::kind).collect();
        assert_eq!(
            kinds,
            vec!["remote", "timeout", "canceled", "io", "generic", "generic", "generic", "generic"]
        );
        assert_eq!(decoded[6], RecordedError::generic("too many requests"));
        assert_eq!(decoded[7], RecordedError::generic("\"plain text\""));
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("runs").join("manifest.json");
        let serializer = ManifestSerializer::new().pretty(true);
        let manifest = sample_manifest();

        serializer.save(&manifest, &path).await.unwrap();
        let loaded = serializer.load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded = ManifestSerializer::new()
            .load(tmp.path().join("absent.json"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }
}
