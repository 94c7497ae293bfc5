//! AWS error classification and handling
//!
//! Classifies AWS SDK errors using the `.code()` method instead of string
//! matching on the Debug format, and maps them onto the pipeline's
//! [`FetchError`].

use aws_sdk_sts::error::ProvideErrorMetadata;
use cloudsweep_reconcile::FetchError;
use thiserror::Error;

/// AWS error categories relevant to listing and detail fetching
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource was not found (recorded as missing)
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded: {message}")]
    Throttled { message: String },

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled { .. })
    }
}

/// Known AWS error codes for "not found" conditions, across every service
/// cloudsweep reads from
const NOT_FOUND_CODES: &[&str] = &[
    // Lambda, DynamoDB, Kinesis, CloudWatch
    "ResourceNotFoundException",
    "ResourceNotFound",
    // IAM
    "NoSuchEntity",
    // SNS
    "NotFound",
    "NotFoundException",
    // SQS (query and JSON protocols)
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "LimitExceededException",
];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled { message },
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify any SDK operation error by its error metadata
pub fn classify_sdk_error<E>(error: &E) -> AwsError
where
    E: ProvideErrorMetadata,
{
    classify_aws_error(error.code(), error.message())
}

/// Map an SDK error raised while fetching `name` onto a [`FetchError`].
///
/// Not-found and throttling codes become the soft and retryable variants;
/// everything else keeps the original error as its source.
pub fn to_fetch_error<E>(name: &str, operation: &'static str, error: E) -> FetchError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match classify_sdk_error(&error) {
        AwsError::NotFound { .. } => FetchError::not_found(name),
        AwsError::Throttled { message } => FetchError::Throttled {
            name: name.to_string(),
            message,
        },
        AwsError::Sdk { .. } => {
            FetchError::Other(anyhow::Error::new(error).context(format!("{operation} failed for '{name}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error(Some(code), Some("some message"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), Some("Rate exceeded"));
            assert!(err.is_retryable(), "Expected retryable for code: {code}");
            assert!(matches!(err, AwsError::Throttled { ref message } if message == "Rate exceeded"));
        }
    }

    #[test]
    fn code_tables_are_disjoint() {
        for code in NOT_FOUND_CODES {
            assert!(!THROTTLING_CODES.contains(code), "{code} in both tables");
        }
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error(Some("AccessDenied"), Some("not authorized"));
        assert!(matches!(err, AwsError::Sdk { code: Some(ref c), .. } if c == "AccessDenied"));

        let err2 = classify_aws_error(None, None);
        assert!(matches!(err2, AwsError::Sdk { code: None, ref message } if message == "Unknown error"));
    }
}
