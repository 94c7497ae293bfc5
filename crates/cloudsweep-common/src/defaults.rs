//! Default configuration values shared by the pipeline and the CLI
//!
//! These constants keep the file configuration, the command line and the
//! library defaults consistent.

/// Default AWS region when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default interval between queue polls, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default number of pipeline workers (two producers and the comparator)
pub const DEFAULT_WORKER_POOL_SIZE: usize = 3;

/// Default number of attempts for a throttled detail fetch
pub const DEFAULT_FETCH_RETRIES: u32 = 3;

/// Placeholder substituted for account identifiers during normalization
pub const ACCOUNT_ID_PLACEHOLDER: &str = "ACCOUNT_ID";

/// Placeholder substituted for region codes during normalization
pub const REGION_PLACEHOLDER: &str = "REGION";

// Serde default functions for struct field defaults

/// Returns the default region
pub fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Returns the default poll interval
pub fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Returns the default worker pool size
pub fn default_worker_pool_size() -> usize {
    DEFAULT_WORKER_POOL_SIZE
}

/// Returns the default fetch retry count
pub fn default_fetch_retries() -> u32 {
    DEFAULT_FETCH_RETRIES
}
