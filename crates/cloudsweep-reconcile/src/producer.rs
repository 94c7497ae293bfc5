//! Drives one listing collaborator into one queue

use crate::collaborator::{PageSink, ResourceLister};
use crate::error::PipelineError;
use crate::name::Side;
use crate::queue::NamedResourceQueue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Enumerates one environment's names for one kind.
///
/// Pages are forwarded as they arrive. The queue is latched once the lister
/// returns; on failure or cancellation it is marked failed instead, so the
/// comparator terminates with an error rather than waiting forever.
pub struct ResourceProducer<L> {
    side: Side,
    lister: Arc<L>,
    queue: Arc<NamedResourceQueue>,
}

impl<L: ResourceLister> ResourceProducer<L> {
    pub fn new(side: Side, lister: Arc<L>, queue: Arc<NamedResourceQueue>) -> Self {
        Self {
            side,
            lister,
            queue,
        }
    }

    /// Run the listing to completion. Returns the number of names published.
    pub async fn run(self, cancel: CancellationToken) -> Result<usize, PipelineError> {
        let sink = PageSink::new(self.queue.clone());

        let result = tokio::select! {
            result = self.lister.list_resources(&sink) => result,
            _ = cancel.cancelled() => {
                self.queue.fail(format!("{} listing cancelled", self.side));
                return Err(PipelineError::Cancelled);
            }
        };

        match result {
            Ok(()) => {
                self.queue.finish_populating();
                info!(
                    side = %self.side,
                    pages = sink.pages(),
                    names = sink.names(),
                    "Listing complete"
                );
                Ok(sink.names())
            }
            Err(e) => {
                warn!(side = %self.side, error = %format!("{e:#}"), "Listing failed");
                self.queue.fail(format!("{e:#}"));
                Err(PipelineError::ListingFailed {
                    side: self.side,
                    source: e,
                })
            }
        }
    }
}
