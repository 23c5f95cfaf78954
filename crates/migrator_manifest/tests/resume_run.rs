//! End-to-end: run, persist, resume from disk, retry.

use migrator_manifest::{
    ContentLocation, ContentReference, ContentType, Manifest, ManifestError, ManifestSerializer,
    MigrationStatus, PipelineProfile, PlanId, RecordedError, MANIFEST_SCHEMA_VERSION,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn workbooks() -> Vec<ContentReference> {
    ["Sales/Pipeline", "Sales/Forecast", "Ops/Capacity"]
        .iter()
        .map(|path| {
            ContentReference::new(Uuid::new_v4(), ContentLocation::from_path(path))
                .with_content_url(path.replace('/', "-"))
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupted_run_resumes_with_history() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("manifest.json");
    let serializer = ManifestSerializer::new();
    let plan_id = PlanId::new();
    let items = workbooks();

    // First run: plan, map, publish concurrently, then cancel midway.
    let first = Arc::new(Manifest::new(plan_id, PipelineProfile::ServerToCloud));
    let partition = first.partition(ContentType::Workbook);
    let entries = partition.create_entries(&items, |_, entry| entry.clone());
    partition
        .map_entries(
            &items,
            |source| async move { ContentLocation::new(["Migrated"]).append(source.name()) },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let publish = entries.iter().cloned().enumerate().map(|(i, entry)| {
        tokio::spawn(async move {
            match i {
                0 => {
                    let dest = ContentReference::new(Uuid::new_v4(), entry.mapped_location());
                    entry.destination_found(dest);
                    entry.set_migrated();
                }
                1 => entry.set_failed_with(&anyhow::anyhow!("datasource connection refused")),
                _ => entry.set_canceled(),
            }
        })
    });
    for handle in futures::future::join_all(publish).await {
        handle.unwrap();
    }
    first.add_error(&anyhow::Error::new(ManifestError::Canceled));
    serializer.save(&first, &path).await.unwrap();

    // Second run: load, seed, reset, retry.
    let previous = serializer.load(&path).await.unwrap().unwrap();
    assert_eq!(previous, *first);

    let second = Manifest::from_previous(&previous, plan_id, PipelineProfile::ServerToCloud).unwrap();
    assert_ne!(second.migration_id(), first.migration_id());
    assert_eq!(second.entries(), first.entries());
    assert!(second.top_level_errors().is_empty());

    let partition = second.partition(ContentType::Workbook);
    let retried = partition.create_entries(&items, |item, entry| {
        entry.reset_status();
        (item.location().clone(), entry.clone())
    });

    let totals = partition.status_totals();
    assert_eq!(totals[&MigrationStatus::Pending], 3);
    assert_eq!(totals[&MigrationStatus::Migrated], 0);

    let (_, done) = &retried[0];
    assert!(done.has_migrated());
    assert!(done.destination().is_some());
    assert!(partition
        .by_destination_id(done.destination().unwrap().id())
        .unwrap()
        .ptr_eq(done));

    let (_, failed) = &retried[1];
    assert!(!failed.has_migrated());
    assert!(failed.errors().is_empty());
}

#[tokio::test]
async fn test_manifest_from_newer_schema_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("manifest.json");
    let manifest = Manifest::new(PlanId::new(), PipelineProfile::CloudToCloud);
    manifest
        .partition(ContentType::Project)
        .create_entries(&workbooks(), |_, entry| entry.set_failed([RecordedError::generic("x")]));
    let serializer = ManifestSerializer::new();
    let json = serializer
        .to_json(&manifest)
        .unwrap()
        .replacen(
            &format!("\"schemaVersion\":{}", MANIFEST_SCHEMA_VERSION),
            "\"schemaVersion\":99",
            1,
        );
    std::fs::write(&path, json).unwrap();

    let err = serializer.load(&path).await.unwrap_err();
    assert!(matches!(
        err,
        ManifestError::SchemaVersionMismatch { found: 99, .. }
    ));
}
