//! Project cache that also remembers each project's lock state.

use crate::bulk::{BulkReferenceCache, PopulationHook};
use crate::error::Result;
use crate::source::PagedListing;
use crate::ContentReferenceCache;
use async_trait::async_trait;
use dashmap::DashMap;
use migrator_manifest::{ContentItem, ContentLocation, ContentReference, ContentType, Manifest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Who controls permissions on content inside a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContentPermissions {
    #[default]
    ManagedByOwner,
    LockedToProject,
    /// Locked, except for nested projects.
    LockedToProjectWithoutNested,
}

impl ContentPermissions {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentPermissions::ManagedByOwner => "ManagedByOwner",
            ContentPermissions::LockedToProject => "LockedToProject",
            ContentPermissions::LockedToProjectWithoutNested => "LockedToProjectWithoutNested",
        }
    }

    pub fn is_locked(&self) -> bool {
        !matches!(self, ContentPermissions::ManagedByOwner)
    }
}

impl fmt::Display for ContentPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentPermissions {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "managedbyowner" => Ok(ContentPermissions::ManagedByOwner),
            "lockedtoproject" => Ok(ContentPermissions::LockedToProject),
            "lockedtoprojectwithoutnested" => Ok(ContentPermissions::LockedToProjectWithoutNested),
            _ => Err(format!("Invalid content permissions: {}", s)),
        }
    }
}

/// A destination project as returned by the project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub reference: ContentReference,
    pub content_permissions: ContentPermissions,
}

impl Project {
    pub fn new(reference: ContentReference, content_permissions: ContentPermissions) -> Self {
        Self {
            reference,
            content_permissions,
        }
    }
}

impl ContentItem for Project {
    fn to_reference(&self) -> ContentReference {
        self.reference.clone()
    }
}

/// Population hook recording content permissions per project id.
#[derive(Debug, Default)]
pub struct LockTracker {
    permissions: DashMap<Uuid, ContentPermissions>,
}

impl LockTracker {
    fn record(&self, id: Uuid, permissions: ContentPermissions) {
        if !id.is_nil() {
            self.permissions.insert(id, permissions);
        }
    }

    fn get(&self, id: Uuid) -> Option<ContentPermissions> {
        self.permissions.get(&id).map(|p| *p)
    }
}

impl PopulationHook<Project> for LockTracker {
    fn item_loaded(&self, item: &Project, reference: &ContentReference) {
        self.record(reference.id(), item.content_permissions);
    }
}

pub struct LockedProjectCache {
    inner: BulkReferenceCache<Project, LockTracker>,
}

impl LockedProjectCache {
    pub fn new(listing: Arc<dyn PagedListing<Project>>, manifest: &Arc<Manifest>) -> Self {
        Self {
            inner: BulkReferenceCache::new(ContentType::Project, listing, manifest)
                .with_hook(LockTracker::default()),
        }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        Self {
            inner: self.inner.with_page_size(page_size),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub async fn load(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.load(cancel).await
    }

    /// Permission mode of a project, populating the cache if needed.
    pub async fn permissions(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentPermissions>> {
        self.inner.load(cancel).await?;
        Ok(self.inner.hook().get(id))
    }

    /// True when content in the project cannot have its own permissions.
    /// Unknown projects are reported unlocked.
    pub async fn is_locked(&self, id: Uuid, cancel: &CancellationToken) -> Result<bool> {
        Ok(self
            .permissions(id, cancel)
            .await?
            .is_some_and(|permissions| permissions.is_locked()))
    }

    /// Record the lock state of a project that was just published, without
    /// listing the catalog again.
    pub fn refresh(&self, project: &Project) {
        debug!(
            project = %project.reference,
            permissions = %project.content_permissions,
            "Refreshing project lock state"
        );
        self.inner
            .hook()
            .record(project.reference.id(), project.content_permissions);
    }
}

#[async_trait]
impl ContentReferenceCache for LockedProjectCache {
    async fn for_location(
        &self,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentReference>> {
        self.inner.for_location(location, cancel).await
    }

    async fn for_id(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<ContentReference>> {
        self.inner.for_id(id, cancel).await
    }
}
