//! Fetches, normalizes and diffs every common resource

use crate::collaborator::{DetailFetcher, DetailsSink};
use crate::detail::ResourceDetail;
use crate::diff::{AnalysisReport, DiffReport};
use crate::error::{FetchError, PipelineError};
use crate::name::{ResourceName, Side};
use crate::normalize::NormalizationContext;
use crate::profile::KindProfile;
use crate::queue::NamedResourceQueue;
use crate::retry::{RetryConfig, retry_throttled};
use cloudsweep_common::ResourceKind;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consumer of the common queue for one resource kind.
///
/// The kind selects the [`KindProfile`] applied to both sides before
/// diffing. Not-found resources are recorded and skipped; any other fetch
/// failure ends the run.
pub struct ResourceAnalyzer<S, T> {
    kind: ResourceKind,
    common: Arc<NamedResourceQueue>,
    source: Arc<S>,
    target: Arc<T>,
    context: Arc<NormalizationContext>,
    retry: RetryConfig,
    poll_interval: Duration,
}

enum Fetched {
    Found(ResourceDetail),
    Missing,
}

impl<S: DetailFetcher, T: DetailFetcher> ResourceAnalyzer<S, T> {
    pub fn new(
        kind: ResourceKind,
        common: Arc<NamedResourceQueue>,
        source: Arc<S>,
        target: Arc<T>,
        context: Arc<NormalizationContext>,
    ) -> Self {
        Self {
            kind,
            common,
            source,
            target,
            context,
            retry: RetryConfig::default(),
            poll_interval: Duration::from_millis(
                cloudsweep_common::defaults::DEFAULT_POLL_INTERVAL_MS,
            ),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Consume the common queue until it is finished and drained.
    pub async fn run(self, cancel: CancellationToken) -> Result<AnalysisReport, PipelineError> {
        let profile = KindProfile::for_kind(self.kind);
        let mut report = DiffReport::new(self.kind);
        let mut batches = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            // Read the latch before draining so the final drain sees every name.
            let finished = self.common.is_finished_populating();
            if let Some(reason) = self.common.failure() {
                warn!(%reason, "Common queue failed, stopping analysis");
                return Err(PipelineError::UpstreamFailed {
                    queue: self.common.label().to_string(),
                    reason,
                });
            }

            let batch = self.common.drain();
            if !batch.is_empty() {
                batches += 1;
                debug!(batch = batches, names = batch.len(), "Analyzing batch");
                for name in batch {
                    if cancel.is_cancelled() {
                        return Err(PipelineError::Cancelled);
                    }
                    self.analyze_one(profile, &name, &mut report, &cancel).await?;
                }
                self.log_report(&report, "Batch analyzed");
            }

            if finished {
                break;
            }

            tokio::select! {
                _ = self.common.changed() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }

        self.log_report(&report, "Analysis complete");
        Ok(report.into_report())
    }

    async fn analyze_one(
        &self,
        profile: &KindProfile,
        name: &ResourceName,
        report: &mut DiffReport,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let (source, target) = tokio::try_join!(
            self.fetch(&*self.source, Side::Source, name, cancel),
            self.fetch(&*self.target, Side::Target, name, cancel),
        )?;

        let (source, target) = match (source, target) {
            (Fetched::Found(source), Fetched::Found(target)) => (source, target),
            (source, target) => {
                for (side, fetched) in [(Side::Source, source), (Side::Target, target)] {
                    if matches!(fetched, Fetched::Missing) {
                        report.record_missing(name.clone(), side);
                    }
                }
                return Ok(());
            }
        };

        let source = profile.normalize(source, &self.context);
        let target = profile.normalize(target, &self.context);

        match report.record(name.clone(), &source, &target) {
            Some(diff) => info!(
                kind = %self.kind,
                name = %name,
                differences = diff.entries.len(),
                "Resources differ"
            ),
            None => debug!(kind = %self.kind, name = %name, "Resources identical"),
        }
        Ok(())
    }

    async fn fetch<F: DetailFetcher>(
        &self,
        fetcher: &F,
        side: Side,
        name: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<Fetched, PipelineError> {
        let names = std::slice::from_ref(name);

        let result = retry_throttled(&self.retry, cancel, name.as_str(), move || async move {
            let mut sink = DetailsSink::new();
            let result = fetcher.fetch_resources(names, &mut sink).await;
            for line in sink.lines() {
                debug!(%side, name = %name, "{line}");
            }
            result
        })
        .await;

        match result {
            Ok(details) => match details.into_iter().next() {
                Some(detail) => Ok(Fetched::Found(detail)),
                None => {
                    warn!(%side, kind = %self.kind, name = %name, "Resource not found, skipping");
                    Ok(Fetched::Missing)
                }
            },
            Err(FetchError::NotFound { .. }) => {
                warn!(%side, kind = %self.kind, name = %name, "Resource not found, skipping");
                Ok(Fetched::Missing)
            }
            Err(_) if cancel.is_cancelled() => Err(PipelineError::Cancelled),
            Err(e) => Err(PipelineError::FetchFailed {
                side,
                name: name.clone(),
                source: e,
            }),
        }
    }

    fn log_report(&self, report: &DiffReport, message: &str) {
        info!(
            kind = %self.kind,
            compared = report.compared(),
            identical = report.identical(),
            different = report.differences().len(),
            missing = report.missing().len(),
            "{message}"
        );
        let text = report.render();
        if !text.is_empty() {
            info!(kind = %self.kind, "Cumulative diff report:\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves details from a map; names absent from the map are not found
    struct MapFetcher {
        details: HashMap<String, ResourceDetail>,
        throttle_first: Mutex<usize>,
        broken: bool,
    }

    impl MapFetcher {
        fn new(details: Vec<ResourceDetail>) -> Self {
            Self {
                details: details
                    .into_iter()
                    .map(|d| (d.name.to_string(), d))
                    .collect(),
                throttle_first: Mutex::new(0),
                broken: false,
            }
        }
    }

    impl DetailFetcher for MapFetcher {
        async fn fetch_resources(
            &self,
            names: &[ResourceName],
            details: &mut DetailsSink,
        ) -> Result<Vec<ResourceDetail>, FetchError> {
            if self.broken {
                return Err(anyhow::anyhow!("InternalFailure").into());
            }
            {
                let mut remaining = self.throttle_first.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Throttled {
                        name: names[0].to_string(),
                        message: "Rate exceeded".into(),
                    });
                }
            }
            match self.details.get(names[0].as_str()) {
                Some(d) => Ok(vec![d.clone()]),
                None => {
                    details.push(format!("{} not found", names[0]));
                    Err(FetchError::not_found(names[0].as_str()))
                }
            }
        }
    }

    fn queue_detail(account: &str, region: &str, name: &str, delay: &str) -> ResourceDetail {
        ResourceDetail::new(
            ResourceKind::Queue,
            name,
            json!({
                "QueueArn": format!("arn:aws:sqs:{region}:{account}:{name}"),
                "DelaySeconds": delay,
                "ApproximateNumberOfMessages": "17",
            }),
        )
    }

    fn context() -> Arc<NormalizationContext> {
        Arc::new(
            NormalizationContext::for_environments([
                ("111111111111", "us-east-1"),
                ("222222222222", "eu-west-1"),
            ])
            .unwrap(),
        )
    }

    async fn finished_common(names: &[&str]) -> Arc<NamedResourceQueue> {
        let common = Arc::new(NamedResourceQueue::new("common"));
        common
            .add_all(names.iter().map(|n| ResourceName::from(*n)))
            .await
            .unwrap();
        common.finish_populating();
        common
    }

    #[tokio::test]
    async fn test_normalized_identical_resources_report_no_difference() {
        let source = MapFetcher::new(vec![queue_detail("111111111111", "us-east-1", "foo", "0")]);
        let target = MapFetcher::new(vec![queue_detail("222222222222", "eu-west-1", "foo", "0")]);

        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            finished_common(&["foo"]).await,
            Arc::new(source),
            Arc::new(target),
            context(),
        );
        let report = analyzer.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.compared, 1);
        assert_eq!(report.identical, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_differences_are_recorded() {
        let source = MapFetcher::new(vec![queue_detail("111111111111", "us-east-1", "foo", "0")]);
        let target = MapFetcher::new(vec![queue_detail("222222222222", "eu-west-1", "foo", "5")]);

        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            finished_common(&["foo"]).await,
            Arc::new(source),
            Arc::new(target),
            context(),
        );
        let report = analyzer.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.differences.len(), 1);
        assert_eq!(
            report.differences[0].entries[0].path,
            "/Attributes/DelaySeconds"
        );
    }

    #[tokio::test]
    async fn test_not_found_is_skipped_not_fatal() {
        let source = MapFetcher::new(vec![
            queue_detail("111111111111", "us-east-1", "gone", "0"),
            queue_detail("111111111111", "us-east-1", "kept", "0"),
        ]);
        let target = MapFetcher::new(vec![queue_detail("222222222222", "eu-west-1", "kept", "0")]);

        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            finished_common(&["gone", "kept"]).await,
            Arc::new(source),
            Arc::new(target),
            context(),
        );
        let report = analyzer.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.compared, 1);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].name.as_str(), "gone");
        assert_eq!(report.missing[0].side, Side::Target);
    }

    #[tokio::test]
    async fn test_resource_gone_from_both_sides_is_missing_twice() {
        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            finished_common(&["gone"]).await,
            Arc::new(MapFetcher::new(vec![])),
            Arc::new(MapFetcher::new(vec![])),
            context(),
        );
        let report = analyzer.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.compared, 0);
        let sides: Vec<Side> = report.missing.iter().map(|m| m.side).collect();
        assert_eq!(sides, [Side::Source, Side::Target]);
        assert!(report.missing.iter().all(|m| m.name.as_str() == "gone"));
    }

    #[tokio::test]
    async fn test_difference_under_per_region_keys_is_reported() {
        let replicas = |eu: &str| {
            json!({ "Replicas": { "eu-west-1": eu, "us-east-1": "B" } })
        };
        let source = MapFetcher::new(vec![ResourceDetail::new(
            ResourceKind::Table,
            "orders",
            replicas("A"),
        )]);
        let target = MapFetcher::new(vec![ResourceDetail::new(
            ResourceKind::Table,
            "orders",
            replicas("C"),
        )]);

        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Table,
            finished_common(&["orders"]).await,
            Arc::new(source),
            Arc::new(target),
            context(),
        );
        let report = analyzer.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.differences.len(), 1);
        let entries = &report.differences[0].entries;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/Attributes/Replicas/eu-west-1");
    }

    #[tokio::test]
    async fn test_diff_is_reported_under_the_listed_name() {
        let detail = |delay: &str| {
            ResourceDetail::new(
                ResourceKind::Queue,
                "app-us-east-1",
                json!({ "DelaySeconds": delay }),
            )
        };
        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            finished_common(&["app-us-east-1"]).await,
            Arc::new(MapFetcher::new(vec![detail("0")])),
            Arc::new(MapFetcher::new(vec![detail("5")])),
            context(),
        );
        let report = analyzer.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.differences[0].name.as_str(), "app-us-east-1");
    }

    #[tokio::test]
    async fn test_throttled_fetch_is_retried() {
        let source = MapFetcher::new(vec![queue_detail("111111111111", "us-east-1", "foo", "0")]);
        *source.throttle_first.lock().unwrap() = 2;
        let target = MapFetcher::new(vec![queue_detail("222222222222", "eu-west-1", "foo", "0")]);

        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            finished_common(&["foo"]).await,
            Arc::new(source),
            Arc::new(target),
            context(),
        )
        .with_retry(RetryConfig::immediate(3));
        let report = analyzer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report.identical, 1);
    }

    #[tokio::test]
    async fn test_unclassified_fetch_error_is_fatal() {
        let mut source = MapFetcher::new(vec![]);
        source.broken = true;
        let target = MapFetcher::new(vec![]);

        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            finished_common(&["foo"]).await,
            Arc::new(source),
            Arc::new(target),
            context(),
        );
        let err = analyzer.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FetchFailed {
                side: Side::Source,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_waits_for_names_until_finished() {
        let common = Arc::new(NamedResourceQueue::new("common"));
        let source = MapFetcher::new(vec![queue_detail("111111111111", "us-east-1", "late", "0")]);
        let target = MapFetcher::new(vec![queue_detail("222222222222", "eu-west-1", "late", "0")]);

        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            common.clone(),
            Arc::new(source),
            Arc::new(target),
            context(),
        )
        .with_poll_interval(Duration::from_millis(10));
        let handle = tokio::spawn(analyzer.run(CancellationToken::new()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        common.add("late".into()).await.unwrap();
        common.finish_populating();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.compared, 1);
    }

    #[tokio::test]
    async fn test_failed_common_queue_stops_analysis() {
        let common = Arc::new(NamedResourceQueue::new("common"));
        common.fail("upstream queue 'source' failed");

        let analyzer = ResourceAnalyzer::new(
            ResourceKind::Queue,
            common,
            Arc::new(MapFetcher::new(vec![])),
            Arc::new(MapFetcher::new(vec![])),
            context(),
        );
        let err = analyzer.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamFailed { .. }));
    }
}
