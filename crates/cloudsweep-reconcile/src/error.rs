//! Pipeline, queue and fetch errors

use crate::name::{ResourceName, Side};
use thiserror::Error;

/// Errors raised by [`crate::NamedResourceQueue`] writes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue's producer already declared it finished
    #[error("queue '{queue}' is closed: producer already finished populating it")]
    Closed { queue: String },

    /// The queue's producer failed; nothing more will be accepted
    #[error("queue '{queue}' failed: {reason}")]
    Failed { queue: String, reason: String },
}

/// Errors returned by a [`crate::DetailFetcher`]
#[derive(Debug, Error)]
pub enum FetchError {
    /// Resource no longer exists (soft: logged and skipped)
    #[error("resource '{name}' not found")]
    NotFound { name: String },

    /// Provider rate limit hit (retryable with backoff)
    #[error("throttled while fetching '{name}': {message}")]
    Throttled { name: String, message: String },

    /// Anything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    pub fn not_found(name: impl Into<String>) -> Self {
        FetchError::NotFound { name: name.into() }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Throttled { .. })
    }
}

/// Terminal errors of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A listing collaborator failed; its queue was marked failed
    #[error("{side} listing failed")]
    ListingFailed {
        side: Side,
        #[source]
        source: anyhow::Error,
    },

    /// An upstream queue was marked failed
    #[error("upstream queue '{queue}' failed: {reason}")]
    UpstreamFailed { queue: String, reason: String },

    /// A detail fetch failed with an unclassified error
    #[error("fetching {side} detail for '{name}' failed")]
    FetchFailed {
        side: Side,
        name: ResourceName,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The task observed cancellation of the shared token
    #[error("pipeline task cancelled")]
    Cancelled,

    /// The overall run timeout expired
    #[error("pipeline did not finish within {secs}s")]
    TimedOut { secs: u64 },

    /// A spawned task panicked or was aborted
    #[error("pipeline job did not complete: {reason}")]
    TaskPanicked { reason: String },

    /// Options cannot produce a working pipeline
    #[error("invalid pipeline options: {0}")]
    InvalidOptions(String),
}

impl PipelineError {
    /// True for errors that are only a consequence of another task's failure
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled
                | PipelineError::UpstreamFailed { .. }
                | PipelineError::Queue(QueueError::Failed { .. })
        )
    }
}
