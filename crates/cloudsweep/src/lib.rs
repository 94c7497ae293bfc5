//! cloudsweep - Reconcile AWS resources across environments
//!
//! This crate provides the AWS-backed listing and detail collaborators for
//! the reconciliation pipeline in `cloudsweep-reconcile`, the run
//! configuration, report rendering and the flows behind the CLI.

pub mod aws;
pub mod config;
pub mod orchestrator;
pub mod report;
