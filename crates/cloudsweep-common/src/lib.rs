//! cloudsweep-common - Shared types and utilities
//!
//! This crate provides types shared by the reconciliation pipeline and the
//! AWS-facing binary, without any AWS SDK dependencies to keep it lightweight.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`file_config`]: JSON configuration file for reconcile runs
//! - [`resource_kind`]: The categories of cloud resources cloudsweep understands

pub mod defaults;
pub mod file_config;
pub mod resource_kind;

// Re-export commonly used types
pub use file_config::{EnvironmentFile, ReconcileFile};
pub use resource_kind::{ParseResourceKindError, ResourceKind};
