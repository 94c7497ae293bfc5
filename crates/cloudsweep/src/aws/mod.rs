//! AWS client modules
//!
//! This module provides:
//! - context: SDK configuration per environment (profile, assumed role)
//! - account: STS identity lookup
//! - error: error code classification
//! - services: per-kind listing and detail fetching
//! - inventory: the pipeline collaborators built on top of the services

pub mod account;
pub mod context;
pub mod error;
pub mod inventory;
pub mod services;

pub use account::{AccountId, Identity, get_current_account_id};
pub use context::{AwsContext, Credentials, FromAwsContext};
pub use error::{AwsError, classify_aws_error, classify_sdk_error, to_fetch_error};
pub use inventory::AwsInventory;
