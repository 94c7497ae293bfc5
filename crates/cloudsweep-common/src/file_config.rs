//! Reconcile configuration loaded from JSON
//!
//! Every field has a default so a file only needs to name what differs from
//! the command-line defaults. Validation is done via `garde::Validate`.

use crate::ResourceKind;
use crate::defaults::{
    default_fetch_retries, default_poll_interval_ms, default_region, default_worker_pool_size,
};
use anyhow::{Context, Result};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One side (source or target) of a reconcile run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, garde::Validate)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentFile {
    /// AWS region
    #[serde(default = "default_region")]
    #[garde(length(min = 1))]
    pub region: String,

    /// Role to assume before talking to this environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(custom(validate_role_arn))]
    pub role_arn: Option<String>,

    /// Named AWS profile used for the base credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(custom(non_empty_if_set))]
    pub profile: Option<String>,
}

impl Default for EnvironmentFile {
    fn default() -> Self {
        Self {
            region: default_region(),
            role_arn: None,
            profile: None,
        }
    }
}

/// Reconcile run configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, garde::Validate)]
#[serde(deny_unknown_fields)]
pub struct ReconcileFile {
    /// Resource kind to reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub kind: Option<ResourceKind>,

    #[serde(default)]
    #[garde(dive)]
    pub source: EnvironmentFile,

    #[serde(default)]
    #[garde(dive)]
    pub target: EnvironmentFile,

    /// Upper bound between queue polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    #[garde(range(min = 1))]
    pub poll_interval_ms: u64,

    /// Worker pool size (needs room for both producers and the comparator)
    #[serde(default = "default_worker_pool_size")]
    #[garde(range(min = 3))]
    pub worker_pool_size: usize,

    /// Capacity of the common queue; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(custom(positive_if_set))]
    pub common_capacity: Option<usize>,

    /// Attempts per throttled detail fetch
    #[serde(default = "default_fetch_retries")]
    #[garde(range(min = 1))]
    pub fetch_retries: u32,

    /// Overall run timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(custom(positive_if_set))]
    pub timeout_secs: Option<u64>,
}

impl Default for ReconcileFile {
    fn default() -> Self {
        Self {
            kind: None,
            source: EnvironmentFile::default(),
            target: EnvironmentFile::default(),
            poll_interval_ms: default_poll_interval_ms(),
            worker_pool_size: default_worker_pool_size(),
            common_capacity: None,
            fetch_retries: default_fetch_retries(),
            timeout_secs: None,
        }
    }
}

impl ReconcileFile {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .map_err(|report| anyhow::anyhow!("Invalid config file {}: {report}", path.display()))?;

        Ok(config)
    }
}

fn validate_role_arn(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(arn) if !(arn.starts_with("arn:") && arn.contains(":iam::") && arn.contains(":role/")) => {
            Err(garde::Error::new(format!("'{arn}' is not an IAM role ARN")))
        }
        _ => Ok(()),
    }
}

fn non_empty_if_set(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(s) if s.trim().is_empty() => Err(garde::Error::new("must not be empty")),
        _ => Ok(()),
    }
}

fn positive_if_set<T>(value: &Option<T>, _ctx: &()) -> garde::Result
where
    T: Copy + PartialOrd + Default,
{
    match value {
        Some(v) if *v <= T::default() => Err(garde::Error::new("must be greater than 0")),
        _ => Ok(()),
    }
}
