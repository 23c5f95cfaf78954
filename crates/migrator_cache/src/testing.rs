//! In-memory endpoint fakes for unit tests.

use crate::source::{ContentSearch, Page, PagedListing};
use async_trait::async_trait;
use migrator_manifest::{ContentLocation, ContentReference};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(crate) fn reference(path: &str) -> ContentReference {
    ContentReference::new(Uuid::new_v4(), ContentLocation::from_path(path))
}

/// Serves a fixed catalog in pages, optionally failing the first N fetches
/// of any page or of one given page.
pub(crate) struct StaticListing<T> {
    items: Vec<T>,
    report_total: bool,
    delay: Duration,
    failures_left: AtomicUsize,
    /// Only fetches of this page consume failures; any page when unset.
    failing_page: Option<usize>,
    /// Number of times page 1 was requested, i.e. population attempts.
    pub(crate) first_page_fetches: AtomicUsize,
    pub(crate) page_fetches: AtomicUsize,
}

impl<T: Clone + Send + Sync> StaticListing<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self {
            items,
            report_total: true,
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            failing_page: None,
            first_page_fetches: AtomicUsize::new(0),
            page_fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn without_total(mut self) -> Self {
        self.report_total = false;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn failing(self, times: usize) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_page(mut self, page_number: usize, times: usize) -> Self {
        self.failing_page = Some(page_number);
        self.failing(times)
    }

    pub(crate) fn populations(&self) -> usize {
        self.first_page_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PagedListing<T> for StaticListing<T> {
    async fn fetch_page(
        &self,
        page_number: usize,
        page_size: usize,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Page<T>> {
        if page_number == 1 {
            self.first_page_fetches.fetch_add(1, Ordering::SeqCst);
        }
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failed = self.failing_page.map_or(true, |page| page == page_number)
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if failed {
            anyhow::bail!("503 Service Unavailable");
        }
        let start = (page_number - 1) * page_size;
        let items = self.items.iter().skip(start).take(page_size).cloned().collect();
        let total = self.report_total.then_some(self.items.len());
        Ok(Page::new(items, total))
    }
}

/// Point lookups over a fixed catalog, counting calls.
pub(crate) struct StaticSearch {
    items: Vec<ContentReference>,
    pub(crate) calls: AtomicUsize,
}

impl StaticSearch {
    pub(crate) fn new(items: Vec<ContentReference>) -> Self {
        Self {
            items,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSearch for StaticSearch {
    async fn search_location(
        &self,
        location: &ContentLocation,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<ContentReference>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Name-only match, like a server-side filter would do.
        Ok(self
            .items
            .iter()
            .filter(|item| item.name() == location.name())
            .cloned()
            .collect())
    }

    async fn search_id(
        &self,
        id: Uuid,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<ContentReference>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.iter().filter(|item| item.id() == id).cloned().collect())
    }
}
