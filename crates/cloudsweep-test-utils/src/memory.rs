//! In-memory collaborators with scripted pages, failures and deletions

use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{
    DetailFetcher, DetailsSink, FetchError, PageSink, ResourceDetail, ResourceLister, ResourceName,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Lister publishing a fixed sequence of pages
#[derive(Debug, Default)]
pub struct MemoryLister {
    pages: Vec<Vec<String>>,
    initial_delay: Duration,
    page_delay: Duration,
    /// Fail after publishing this many pages
    fail_after: Option<(usize, String)>,
    calls: AtomicUsize,
}

impl MemoryLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything in a single page
    pub fn single_page<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().page(names)
    }

    pub fn page<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pages.push(names.into_iter().map(Into::into).collect());
        self
    }

    /// Delay before the first page
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay between consecutive pages
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Return an error after `pages` pages were published
    pub fn failing_after(mut self, pages: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((pages, message.into()));
        self
    }

    /// Number of times the listing was started
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResourceLister for MemoryLister {
    async fn list_resources(&self, pages: &PageSink) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.initial_delay.is_zero() {
            tokio::time::sleep(self.initial_delay).await;
        }

        let fail_at = self.fail_after.as_ref().map(|(after, _)| *after);
        for (index, page) in self.pages.iter().enumerate() {
            if fail_at == Some(index) {
                break;
            }
            if index > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
            pages.publish(page.iter().cloned()).await?;
        }

        match &self.fail_after {
            Some((_, message)) => anyhow::bail!("{message}"),
            None => Ok(()),
        }
    }
}

/// Fetcher serving details from memory.
///
/// Names can be deleted after construction (to simulate a resource removed
/// between listing and detail fetch), throttled a number of times, or made
/// to fail with an unclassified error.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    details: HashMap<String, ResourceDetail>,
    deleted: Mutex<HashSet<String>>,
    throttles: Mutex<HashMap<String, u32>>,
    broken: HashMap<String, String>,
    /// Answer deleted names with an empty result instead of `NotFound`
    empty_when_missing: bool,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new<I>(details: I) -> Self
    where
        I: IntoIterator<Item = ResourceDetail>,
    {
        Self {
            details: details
                .into_iter()
                .map(|d| (d.name.to_string(), d))
                .collect(),
            ..Self::default()
        }
    }

    /// Throttle the next `times` fetches of `name`
    pub fn throttle(self, name: &str, times: u32) -> Self {
        self.throttles
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
        self
    }

    /// Fail every fetch of `name` with an unclassified error
    pub fn broken(mut self, name: &str, message: impl Into<String>) -> Self {
        self.broken.insert(name.to_string(), message.into());
        self
    }

    pub fn empty_when_missing(mut self) -> Self {
        self.empty_when_missing = true;
        self
    }

    /// Remove a resource so later fetches report it missing
    pub fn delete(&self, name: &str) {
        self.deleted.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, name: &str, sink: &mut DetailsSink) -> Result<Vec<ResourceDetail>, FetchError> {
        if let Some(message) = self.broken.get(name) {
            return Err(anyhow::anyhow!("{message}").into());
        }

        {
            let mut throttles = self.throttles.lock().unwrap();
            let remaining = throttles.get_mut(name).filter(|n| **n > 0);
            if let Some(remaining) = remaining {
                *remaining -= 1;
                return Err(FetchError::Throttled {
                    name: name.to_string(),
                    message: "Rate exceeded".into(),
                });
            }
        }

        let deleted = self.deleted.lock().unwrap().contains(name);
        match self.details.get(name) {
            Some(detail) if !deleted => {
                sink.push(format!("fetched {}/{name}", detail.kind));
                Ok(vec![detail.clone()])
            }
            _ if self.empty_when_missing => {
                sink.push(format!("{name} returned no details"));
                Ok(Vec::new())
            }
            _ => {
                sink.push(format!("{name} not found"));
                Err(FetchError::not_found(name))
            }
        }
    }
}

impl DetailFetcher for MemoryFetcher {
    async fn fetch_resources(
        &self,
        names: &[ResourceName],
        details: &mut DetailsSink,
    ) -> Result<Vec<ResourceDetail>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            out.extend(self.lookup(name.as_str(), details)?);
        }
        Ok(out)
    }
}

/// Build a detail whose ARN embeds the given account and region
pub fn detail_for(
    kind: ResourceKind,
    account_id: &str,
    region: &str,
    name: &str,
    attributes: Value,
) -> ResourceDetail {
    ResourceDetail::new(kind, name, attributes).with_arn(format!(
        "arn:aws:{}:{region}:{account_id}:{name}",
        kind.service()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudsweep_reconcile::NamedResourceQueue;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lister_publishes_pages_then_fails() {
        let queue = Arc::new(NamedResourceQueue::new("source"));
        let sink = PageSink::new(queue.clone());
        let lister = MemoryLister::new()
            .page(["a"])
            .page(["b"])
            .failing_after(1, "boom");

        let err = lister.list_resources(&sink).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(queue.len(), 1);
        assert_eq!(lister.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetcher_throttles_then_deletes() {
        let fetcher = MemoryFetcher::new([detail_for(
            ResourceKind::Queue,
            "111111111111",
            "us-east-1",
            "orders",
            json!({}),
        )])
        .throttle("orders", 1);
        let names = [ResourceName::from("orders")];
        let mut sink = DetailsSink::new();

        assert!(
            fetcher
                .fetch_resources(&names, &mut sink)
                .await
                .unwrap_err()
                .is_retryable()
        );
        assert_eq!(fetcher.fetch_resources(&names, &mut sink).await.unwrap().len(), 1);

        fetcher.delete("orders");
        assert!(
            fetcher
                .fetch_resources(&names, &mut sink)
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert_eq!(fetcher.calls(), 3);
    }
}
