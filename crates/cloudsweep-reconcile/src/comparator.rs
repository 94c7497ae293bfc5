//! Incremental intersection of the source and target inventories

use crate::error::{PipelineError, QueueError};
use crate::name::ResourceName;
use crate::queue::NamedResourceQueue;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters reported when the comparator finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComparatorStats {
    /// Distinct names forwarded to the common queue
    pub matched: usize,
    /// Intersection passes, the final one included
    pub passes: usize,
}

/// Moves every name seen on both sides into the common queue, exactly once.
///
/// The comparator is the sole consumer of the two input queues and the sole
/// producer of the common queue. Names present on only one side stay in
/// their input queue, which lets the caller report them afterwards.
pub struct ResourceComparator {
    source: Arc<NamedResourceQueue>,
    target: Arc<NamedResourceQueue>,
    common: Arc<NamedResourceQueue>,
    poll_interval: Duration,
    matched: HashSet<ResourceName>,
    passes: usize,
}

impl ResourceComparator {
    pub fn new(
        source: Arc<NamedResourceQueue>,
        target: Arc<NamedResourceQueue>,
        common: Arc<NamedResourceQueue>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            target,
            common,
            poll_interval,
            matched: HashSet::new(),
            passes: 0,
        }
    }

    /// Run until both inputs are finished, or until one fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ComparatorStats, PipelineError> {
        loop {
            if cancel.is_cancelled() {
                self.common.fail("comparator cancelled");
                return Err(PipelineError::Cancelled);
            }
            self.check_upstream()?;

            // Flags are read before the snapshot: if both were set, no write
            // can follow, so this pass sees everything.
            let both_finished =
                self.source.is_finished_populating() && self.target.is_finished_populating();

            if let Err(e) = self.intersect_pass().await {
                self.common.fail(e.to_string());
                return Err(e.into());
            }

            if both_finished {
                self.common.finish_populating();
                let stats = ComparatorStats {
                    matched: self.matched.len(),
                    passes: self.passes,
                };
                info!(
                    matched = stats.matched,
                    passes = stats.passes,
                    source_only = self.source.len(),
                    target_only = self.target.len(),
                    "Comparison complete"
                );
                return Ok(stats);
            }

            tokio::select! {
                _ = self.source.changed() => {}
                _ = self.target.changed() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    fn check_upstream(&self) -> Result<(), PipelineError> {
        for queue in [&self.source, &self.target] {
            if let Some(reason) = queue.failure() {
                warn!(queue = %queue.label(), %reason, "Upstream queue failed, aborting comparison");
                self.common
                    .fail(format!("upstream queue '{}' failed", queue.label()));
                return Err(PipelineError::UpstreamFailed {
                    queue: queue.label().to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// One snapshot / intersect / forward / remove cycle.
    ///
    /// Only names present in a queue's own snapshot are removed from it, so
    /// names added concurrently are left for the next pass.
    async fn intersect_pass(&mut self) -> Result<(), QueueError> {
        self.passes += 1;

        let source: HashSet<ResourceName> = self.source.get_all().into_iter().collect();
        let target: HashSet<ResourceName> = self.target.get_all().into_iter().collect();

        let common: Vec<ResourceName> = source.intersection(&target).cloned().collect();
        // Pagination repeats of names already forwarded
        let stale_source: Vec<&ResourceName> = source
            .iter()
            .filter(|name| self.matched.contains(*name))
            .collect();
        let stale_target: Vec<&ResourceName> = target
            .iter()
            .filter(|name| self.matched.contains(*name))
            .collect();

        if common.is_empty() && stale_source.is_empty() && stale_target.is_empty() {
            debug!(
                pass = self.passes,
                source = source.len(),
                target = target.len(),
                "No new common names"
            );
            return Ok(());
        }

        self.source.remove_all(common.iter().chain(stale_source));
        self.target.remove_all(common.iter().chain(stale_target));

        let fresh: Vec<ResourceName> = common
            .into_iter()
            .filter(|name| self.matched.insert(name.clone()))
            .collect();
        let forwarded = fresh.len();
        if !fresh.is_empty() {
            self.common.add_all(fresh).await?;
        }

        debug!(
            pass = self.passes,
            forwarded,
            total = self.matched.len(),
            "Forwarded common names"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(label: &str) -> Arc<NamedResourceQueue> {
        Arc::new(NamedResourceQueue::new(label))
    }

    async fn fill(queue: &NamedResourceQueue, names: &[&str]) {
        queue
            .add_all(names.iter().map(|n| ResourceName::from(*n)))
            .await
            .unwrap();
    }

    fn sorted(queue: &NamedResourceQueue) -> Vec<String> {
        let mut names: Vec<String> = queue.get_all().into_iter().map(|n| n.into_inner()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_single_page_each_side() {
        let (source, target, common) = (queue("source"), queue("target"), queue("common"));
        fill(&source, &["a", "b", "c"]).await;
        fill(&target, &["b", "c", "d"]).await;
        source.finish_populating();
        target.finish_populating();

        let comparator = ResourceComparator::new(
            source.clone(),
            target.clone(),
            common.clone(),
            Duration::from_millis(10),
        );
        let stats = comparator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(stats.matched, 2);
        assert_eq!(stats.passes, 1);
        assert!(common.is_finished_populating());
        assert_eq!(sorted(&common), vec!["b", "c"]);
        assert_eq!(sorted(&source), vec!["a"]);
        assert_eq!(sorted(&target), vec!["d"]);
    }

    #[tokio::test]
    async fn test_duplicates_forwarded_once() {
        let (source, target, common) = (queue("source"), queue("target"), queue("common"));
        fill(&source, &["a", "a", "b"]).await;
        fill(&target, &["a", "b", "b"]).await;

        let comparator = ResourceComparator::new(
            source.clone(),
            target.clone(),
            common.clone(),
            Duration::from_millis(10),
        );
        let handle = tokio::spawn(comparator.run(CancellationToken::new()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        // A pagination duplicate of an already-matched name
        fill(&source, &["a"]).await;
        fill(&target, &["a"]).await;
        source.finish_populating();
        target.finish_populating();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.matched, 2);
        assert_eq!(sorted(&common), vec!["a", "b"]);
        assert!(source.is_empty());
        assert!(target.is_empty());
    }

    #[tokio::test]
    async fn test_common_not_finished_while_input_populating() {
        let (source, target, common) = (queue("source"), queue("target"), queue("common"));
        fill(&source, &["a"]).await;
        fill(&target, &["a"]).await;
        source.finish_populating();

        let comparator = ResourceComparator::new(
            source.clone(),
            target.clone(),
            common.clone(),
            Duration::from_millis(5),
        );
        let handle = tokio::spawn(comparator.run(CancellationToken::new()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sorted(&common), vec!["a"]);
        assert!(!common.is_finished_populating());

        target.finish_populating();
        handle.await.unwrap().unwrap();
        assert!(common.is_finished_populating());
    }

    #[tokio::test]
    async fn test_upstream_failure_fails_common() {
        let (source, target, common) = (queue("source"), queue("target"), queue("common"));
        source.finish_populating();
        target.fail("AccessDenied");

        let comparator =
            ResourceComparator::new(source, target, common.clone(), Duration::from_millis(5));
        let err = comparator.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::UpstreamFailed { ref queue, .. } if queue == "target"));
        assert!(common.failure().is_some());
        assert!(!common.is_finished_populating());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let (source, target, common) = (queue("source"), queue("target"), queue("common"));
        let cancel = CancellationToken::new();
        let comparator =
            ResourceComparator::new(source, target, common.clone(), Duration::from_secs(60));
        let handle = tokio::spawn(comparator.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(common.failure().is_some());
    }
}
