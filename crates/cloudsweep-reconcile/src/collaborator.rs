//! Interfaces the pipeline requires from the resource fetch layer
//!
//! Implementations live outside this crate: the AWS-backed ones in the
//! `cloudsweep` binary crate, in-memory ones in `cloudsweep-test-utils`.

use crate::detail::ResourceDetail;
use crate::error::{FetchError, QueueError};
use crate::name::ResourceName;
use crate::queue::NamedResourceQueue;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Page callback handed to a [`ResourceLister`].
///
/// Every published page goes straight into the producer's queue, so the
/// comparator can start intersecting before the listing completes.
#[derive(Debug)]
pub struct PageSink {
    queue: Arc<NamedResourceQueue>,
    pages: AtomicUsize,
    names: AtomicUsize,
}

impl PageSink {
    pub fn new(queue: Arc<NamedResourceQueue>) -> Self {
        Self {
            queue,
            pages: AtomicUsize::new(0),
            names: AtomicUsize::new(0),
        }
    }

    /// Publish one page of names
    pub async fn publish<I, N>(&self, page: I) -> Result<(), QueueError>
    where
        I: IntoIterator<Item = N>,
        N: Into<ResourceName>,
    {
        let page: Vec<ResourceName> = page.into_iter().map(Into::into).collect();
        let count = page.len();
        self.queue.add_all(page).await?;

        let page_no = self.pages.fetch_add(1, Ordering::Relaxed) + 1;
        self.names.fetch_add(count, Ordering::Relaxed);
        debug!(queue = %self.queue.label(), page = page_no, names = count, "Published page");
        Ok(())
    }

    /// Pages published so far
    pub fn pages(&self) -> usize {
        self.pages.load(Ordering::Relaxed)
    }

    /// Names published so far, duplicates included
    pub fn names(&self) -> usize {
        self.names.load(Ordering::Relaxed)
    }
}

/// Human-readable diagnostic lines produced while fetching details
#[derive(Debug, Default, Clone)]
pub struct DetailsSink {
    lines: Vec<String>,
}

impl DetailsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Take the accumulated lines, leaving the sink empty
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

/// Paginated enumeration of one environment's resource names for one kind.
///
/// The implementation manages provider pagination tokens internally and
/// calls [`PageSink::publish`] once per page. Returning `Ok` means the
/// listing is exhausted.
pub trait ResourceLister: Send + Sync + 'static {
    fn list_resources(&self, pages: &PageSink) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Fetches full resource details by name.
///
/// The pipeline always passes a single name and expects zero or one
/// detail back; names that no longer exist yield [`FetchError::NotFound`]
/// or an empty result.
pub trait DetailFetcher: Send + Sync + 'static {
    fn fetch_resources(
        &self,
        names: &[ResourceName],
        details: &mut DetailsSink,
    ) -> impl Future<Output = Result<Vec<ResourceDetail>, FetchError>> + Send;
}
