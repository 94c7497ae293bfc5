//! End-to-end wiring of one reconciliation run

use crate::analyzer::ResourceAnalyzer;
use crate::collaborator::{DetailFetcher, ResourceLister};
use crate::comparator::ResourceComparator;
use crate::diff::AnalysisReport;
use crate::error::PipelineError;
use crate::name::{ResourceName, Side};
use crate::normalize::NormalizationContext;
use crate::producer::ResourceProducer;
use crate::queue::NamedResourceQueue;
use crate::retry::RetryConfig;
use crate::runner::JobRunner;
use cloudsweep_common::ResourceKind;
use cloudsweep_common::defaults::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_WORKER_POOL_SIZE};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Jobs that must run at the same time: two producers and the comparator
const CONCURRENT_JOBS: usize = 3;

/// Tuning for one run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub kind: ResourceKind,
    /// Upper bound on the wait between queue checks
    pub poll_interval: Duration,
    pub worker_pool_size: usize,
    /// Bound on the common queue; `None` keeps it unbounded
    pub common_capacity: Option<usize>,
    pub retry: RetryConfig,
    /// Overall deadline for the run
    pub timeout: Option<Duration>,
}

impl PipelineOptions {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            common_capacity: None,
            retry: RetryConfig::default(),
            timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.worker_pool_size < CONCURRENT_JOBS {
            return Err(PipelineError::InvalidOptions(format!(
                "worker pool size {} is below the {CONCURRENT_JOBS} jobs that must run concurrently",
                self.worker_pool_size
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(PipelineError::InvalidOptions(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.common_capacity == Some(0) {
            return Err(PipelineError::InvalidOptions(
                "common queue capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// The listing and detail collaborators of one environment
pub struct Environment<L, F> {
    pub lister: Arc<L>,
    pub fetcher: Arc<F>,
}

impl<L, F> Environment<L, F> {
    pub fn new(lister: Arc<L>, fetcher: Arc<F>) -> Self {
        Self { lister, fetcher }
    }
}

impl<I> Environment<I, I> {
    /// One value serving as both lister and fetcher
    pub fn from_inventory(inventory: Arc<I>) -> Self {
        Self {
            lister: inventory.clone(),
            fetcher: inventory,
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub report: AnalysisReport,
    /// Names published by the source listing, duplicates included
    pub source_listed: usize,
    pub target_listed: usize,
    /// Names forwarded to the analyzer
    pub matched: usize,
    /// Names only present in the source environment
    pub source_only: Vec<ResourceName>,
    /// Names only present in the target environment
    pub target_only: Vec<ResourceName>,
}

/// Reconciles one resource kind across two environments
pub struct ReconcilePipeline {
    options: PipelineOptions,
    context: Arc<NormalizationContext>,
}

impl ReconcilePipeline {
    pub fn new(options: PipelineOptions, context: NormalizationContext) -> Self {
        Self {
            options,
            context: Arc::new(context),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn context(&self) -> &NormalizationContext {
        &self.context
    }

    /// Run to completion, failure, cancellation or timeout.
    ///
    /// The producers and the comparator run on the job pool; the analyzer runs
    /// on the calling task.
    pub async fn run<SL, SF, TL, TF>(
        &self,
        source: Environment<SL, SF>,
        target: Environment<TL, TF>,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError>
    where
        SL: ResourceLister,
        SF: DetailFetcher,
        TL: ResourceLister,
        TF: DetailFetcher,
    {
        self.options.validate()?;

        let Some(limit) = self.options.timeout else {
            return self.run_inner(source, target, cancel).await;
        };

        match tokio::time::timeout(limit, self.run_inner(source, target, cancel.clone())).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                warn!(timeout_secs = limit.as_secs(), "Reconciliation timed out");
                Err(PipelineError::TimedOut {
                    secs: limit.as_secs(),
                })
            }
        }
    }

    async fn run_inner<SL, SF, TL, TF>(
        &self,
        source: Environment<SL, SF>,
        target: Environment<TL, TF>,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError>
    where
        SL: ResourceLister,
        SF: DetailFetcher,
        TL: ResourceLister,
        TF: DetailFetcher,
    {
        let opts = &self.options;
        let source_queue = Arc::new(NamedResourceQueue::new("source"));
        let target_queue = Arc::new(NamedResourceQueue::new("target"));
        let common_queue = Arc::new(match opts.common_capacity {
            Some(capacity) => NamedResourceQueue::bounded("common", capacity),
            None => NamedResourceQueue::new("common"),
        });

        info!(
            kind = %opts.kind,
            workers = opts.worker_pool_size,
            poll_interval_ms = opts.poll_interval.as_millis() as u64,
            common_capacity = ?opts.common_capacity,
            "Starting reconciliation"
        );

        let mut runner = JobRunner::new(opts.worker_pool_size, cancel.clone());

        let producer = ResourceProducer::new(Side::Source, source.lister, source_queue.clone());
        let token = cancel.clone();
        runner.spawn("source producer", async move {
            producer.run(token).await.map(|_| ())
        });

        let producer = ResourceProducer::new(Side::Target, target.lister, target_queue.clone());
        let token = cancel.clone();
        runner.spawn("target producer", async move {
            producer.run(token).await.map(|_| ())
        });

        let comparator = ResourceComparator::new(
            source_queue.clone(),
            target_queue.clone(),
            common_queue.clone(),
            opts.poll_interval,
        );
        let token = cancel.clone();
        runner.spawn("comparator", async move {
            comparator.run(token).await.map(|_| ())
        });

        let analyzer = ResourceAnalyzer::new(
            opts.kind,
            common_queue.clone(),
            source.fetcher,
            target.fetcher,
            self.context.clone(),
        )
        .with_retry(opts.retry.clone())
        .with_poll_interval(opts.poll_interval);

        let analysis = async {
            let result = analyzer.run(cancel.clone()).await;
            if let Err(e) = &result {
                // Release a comparator blocked on a full common queue
                common_queue.fail(e.to_string());
                cancel.cancel();
            }
            result
        };

        let (analysis, jobs) = tokio::join!(analysis, runner.wait_all());

        let report = match (analysis, jobs) {
            (Ok(report), Ok(())) => report,
            (Ok(_), Err(e)) | (Err(e), Ok(())) => return Err(e),
            (Err(a), Err(j)) => return Err(if j.is_secondary() && !a.is_secondary() { a } else { j }),
        };

        let outcome = PipelineOutcome {
            report,
            source_listed: source_queue.total_added(),
            target_listed: target_queue.total_added(),
            matched: common_queue.total_added(),
            source_only: distinct_sorted(source_queue.get_all()),
            target_only: distinct_sorted(target_queue.get_all()),
        };

        info!(
            kind = %opts.kind,
            matched = outcome.matched,
            source_only = outcome.source_only.len(),
            target_only = outcome.target_only.len(),
            "{}",
            outcome.report.summary()
        );
        Ok(outcome)
    }
}

fn distinct_sorted(names: Vec<ResourceName>) -> Vec<ResourceName> {
    names
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
