//! Destination reference resolution.
//!
//! Transformation code constantly asks "what is the destination reference for
//! this location or id?". The caches here answer without re-querying the
//! destination for every lookup:
//!
//! - [`BulkReferenceCache`]: enumerates the whole catalog once, single-flight,
//!   then answers from memory. For users, groups and projects.
//! - [`ManifestBackedCache`]: answers from the manifest and a memo, falling
//!   back to a narrow search. For content types where only a few items are
//!   ever referenced.
//! - [`LockedProjectCache`]: the bulk cache over projects, additionally
//!   tracking project lock state.
//!
//! Every reference a cache learns is linked into the manifest partition of
//! its content type.

pub mod bulk;
pub mod error;
pub mod manifest_backed;
pub mod project;
pub mod source;

#[cfg(test)]
mod testing;

pub use bulk::{BulkReferenceCache, NoHook, PopulationHook, DEFAULT_PAGE_SIZE};
pub use error::{CacheError, Result};
pub use manifest_backed::ManifestBackedCache;
pub use project::{ContentPermissions, LockTracker, LockedProjectCache, Project};
pub use source::{ContentSearch, Page, PagedListing};

use async_trait::async_trait;
use migrator_manifest::{ContentLocation, ContentReference};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Location and id lookups shared by every cache.
///
/// A miss is `Ok(None)`; errors are reserved for failed or canceled remote
/// calls.
#[async_trait]
pub trait ContentReferenceCache: Send + Sync {
    async fn for_location(
        &self,
        location: &ContentLocation,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentReference>>;

    async fn for_id(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<ContentReference>>;
}
