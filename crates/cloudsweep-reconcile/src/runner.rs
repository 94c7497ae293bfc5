//! Fixed-size pool for the long-lived pipeline jobs

use crate::error::PipelineError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Runs named jobs on at most `pool_size` concurrent tasks.
///
/// The first job to fail cancels the shared token so every other job winds
/// down. [`JobRunner::wait_all`] then reports that root cause rather than the
/// `Cancelled` results it triggered.
pub struct JobRunner {
    permits: Arc<Semaphore>,
    tasks: JoinSet<(String, Result<(), PipelineError>)>,
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(pool_size: usize, cancel: CancellationToken) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            tasks: JoinSet::new(),
            cancel,
        }
    }

    /// Number of jobs not yet collected by `wait_all`
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Queue a job. It starts once a pool slot is free.
    pub fn spawn<F>(&mut self, name: impl Into<String>, job: F)
    where
        F: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let name = name.into();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return (name, Err(PipelineError::Cancelled)),
                },
                _ = cancel.cancelled() => return (name, Err(PipelineError::Cancelled)),
            };

            debug!(job = %name, "Job started");
            let result = job.await;
            if let Err(e) = &result {
                if !e.is_secondary() {
                    error!(job = %name, error = %e, "Job failed, cancelling pipeline");
                }
                cancel.cancel();
            } else {
                debug!(job = %name, "Job finished");
            }
            (name, result)
        });
    }

    /// Wait until every job has reported.
    ///
    /// Returns the first root-cause error, or a secondary one if that is all
    /// there is.
    pub async fn wait_all(&mut self) -> Result<(), PipelineError> {
        let mut root: Option<PipelineError> = None;
        let mut secondary: Option<PipelineError> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let (name, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    self.cancel.cancel();
                    error!(error = %e, "Pipeline job did not complete");
                    root.get_or_insert(PipelineError::TaskPanicked {
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match result {
                Ok(()) => {}
                Err(e) if e.is_secondary() => {
                    debug!(job = %name, error = %e, "Job stopped after another failure");
                    secondary.get_or_insert(e);
                }
                Err(e) => {
                    root.get_or_insert(e);
                }
            }
        }

        match root.or(secondary) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
