//! Configuration types for a reconcile run
//!
//! A [`RunConfig`] is composed of focused sub-configs. It is built from the
//! optional JSON configuration file with command-line values layered on top.

use crate::aws::Credentials;
use crate::report::OutputFormat;
use anyhow::{Context, Result, bail};
use cloudsweep_common::{EnvironmentFile, ReconcileFile, ResourceKind};
use cloudsweep_reconcile::{PipelineOptions, RetryConfig};
use std::path::PathBuf;
use std::time::Duration;

/// One AWS environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub region: String,
    pub credentials: Credentials,
}

impl From<EnvironmentFile> for EnvironmentConfig {
    fn from(file: EnvironmentFile) -> Self {
        Self {
            region: file.region,
            credentials: Credentials {
                profile: file.profile,
                role_arn: file.role_arn,
            },
        }
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub kind: ResourceKind,
    pub poll_interval_ms: u64,
    pub worker_pool_size: usize,
    pub common_capacity: Option<usize>,
    pub fetch_retries: u32,
    pub timeout_secs: Option<u64>,
}

/// Where and how the report is written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// JSON report file, in addition to stdout
    pub path: Option<PathBuf>,
}

/// Configuration for a reconcile run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: EnvironmentConfig,
    pub target: EnvironmentConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

/// Command-line values; `None` keeps the file (or default) value
#[derive(Debug, Clone, Default)]
pub struct ReconcileOverrides {
    pub kind: Option<ResourceKind>,
    pub source_region: Option<String>,
    pub target_region: Option<String>,
    pub source_profile: Option<String>,
    pub target_profile: Option<String>,
    pub source_role_arn: Option<String>,
    pub target_role_arn: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub worker_pool_size: Option<usize>,
    pub common_capacity: Option<usize>,
    pub fetch_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
}

impl RunConfig {
    /// Layer command-line overrides on top of the configuration file
    pub fn resolve(file: ReconcileFile, overrides: ReconcileOverrides) -> Result<Self> {
        let Some(kind) = overrides.kind.or(file.kind) else {
            bail!("No resource kind given: pass --kind or set \"kind\" in the config file");
        };

        let mut source = EnvironmentConfig::from(file.source);
        let mut target = EnvironmentConfig::from(file.target);
        apply_environment(
            &mut source,
            overrides.source_region,
            overrides.source_profile,
            overrides.source_role_arn,
        );
        apply_environment(
            &mut target,
            overrides.target_region,
            overrides.target_profile,
            overrides.target_role_arn,
        );

        let config = Self {
            source,
            target,
            pipeline: PipelineConfig {
                kind,
                poll_interval_ms: overrides.poll_interval_ms.unwrap_or(file.poll_interval_ms),
                worker_pool_size: overrides.worker_pool_size.unwrap_or(file.worker_pool_size),
                common_capacity: overrides.common_capacity.or(file.common_capacity),
                fetch_retries: overrides.fetch_retries.unwrap_or(file.fetch_retries),
                timeout_secs: overrides.timeout_secs.or(file.timeout_secs),
            },
            output: OutputConfig {
                format: overrides.format,
                path: overrides.output,
            },
        };
        config
            .pipeline_options()
            .validate()
            .context("Invalid reconcile configuration")?;
        Ok(config)
    }

    /// Load the optional configuration file, then apply overrides
    pub fn load(path: Option<&std::path::Path>, overrides: ReconcileOverrides) -> Result<Self> {
        let file = match path {
            Some(path) => ReconcileFile::load(path)?,
            None => ReconcileFile::default(),
        };
        Self::resolve(file, overrides)
    }

    pub fn kind(&self) -> ResourceKind {
        self.pipeline.kind
    }

    pub fn format(&self) -> OutputFormat {
        self.output.format
    }

    pub fn output_path(&self) -> Option<&std::path::Path> {
        self.output.path.as_deref()
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        let p = &self.pipeline;
        PipelineOptions {
            poll_interval: Duration::from_millis(p.poll_interval_ms),
            worker_pool_size: p.worker_pool_size,
            common_capacity: p.common_capacity,
            retry: RetryConfig::default().with_max_attempts(p.fetch_retries),
            timeout: p.timeout_secs.map(Duration::from_secs),
            ..PipelineOptions::new(p.kind)
        }
    }
}

fn apply_environment(
    env: &mut EnvironmentConfig,
    region: Option<String>,
    profile: Option<String>,
    role_arn: Option<String>,
) {
    if let Some(region) = region {
        env.region = region;
    }
    if profile.is_some() {
        env.credentials.profile = profile;
    }
    if role_arn.is_some() {
        env.credentials.role_arn = role_arn;
    }
}
