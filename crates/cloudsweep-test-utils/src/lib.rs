//! Shared test utilities for cloudsweep
//!
//! This crate provides common test helpers that can be used across
//! multiple test modules without circular dependencies.
//!
//! ## Modules
//!
//! - [`aws`]: AWS region detection and test run ID generation
//! - [`memory`]: In-memory listing and detail collaborators

pub mod aws;
pub mod memory;

// Re-export commonly used items
pub use aws::{get_test_region, test_run_id};
pub use memory::{MemoryFetcher, MemoryLister, detail_for};
