//! cloudsweep-reconcile - Cross-environment reconciliation pipeline
//!
//! Two producers enumerate the names of one resource kind in a source and a
//! target environment. A comparator incrementally intersects both inventories
//! and forwards every common name exactly once. An analyzer fetches the full
//! detail of each common resource from both sides, normalizes
//! environment-specific identifiers and records a structural diff.
//!
//! ```text
//! ResourceProducer(source) ──▶ source queue ─┐
//!                                            ├─▶ ResourceComparator ──▶ common queue ──▶ ResourceAnalyzer ──▶ AnalysisReport
//! ResourceProducer(target) ──▶ target queue ─┘
//! ```
//!
//! The AWS-specific listing and detail fetching live behind the
//! [`ResourceLister`] and [`DetailFetcher`] traits.

pub mod analyzer;
pub mod collaborator;
pub mod comparator;
pub mod detail;
pub mod diff;
pub mod error;
pub mod name;
pub mod normalize;
pub mod pipeline;
pub mod producer;
pub mod profile;
pub mod queue;
pub mod retry;
pub mod runner;

pub use analyzer::ResourceAnalyzer;
pub use collaborator::{DetailFetcher, DetailsSink, PageSink, ResourceLister};
pub use comparator::{ComparatorStats, ResourceComparator};
pub use detail::ResourceDetail;
pub use diff::{AnalysisReport, Change, DiffEntry, DiffReport, MissingResource, ResourceDiff};
pub use error::{FetchError, PipelineError, QueueError};
pub use name::{ResourceName, Side};
pub use normalize::{NormalizationContext, NormalizationError};
pub use pipeline::{Environment, PipelineOptions, PipelineOutcome, ReconcilePipeline};
pub use producer::ResourceProducer;
pub use profile::KindProfile;
pub use queue::NamedResourceQueue;
pub use retry::RetryConfig;
pub use runner::JobRunner;
