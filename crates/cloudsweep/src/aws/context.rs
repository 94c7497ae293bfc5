//! Shared AWS configuration context
//!
//! Provides `AwsContext` for loading AWS SDK configuration once per
//! environment and creating every service client from the same config.

use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;
use tracing::debug;

/// Session name used when assuming an environment's role
const SESSION_NAME: &str = "cloudsweep";

/// How credentials for one environment are obtained
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Named profile for the base credentials; default chain when absent
    pub profile: Option<String>,
    /// Role assumed on top of the base credentials
    pub role_arn: Option<String>,
}

/// Shared AWS configuration context for creating service clients.
///
/// # Example
/// ```ignore
/// let ctx = AwsContext::new("eu-west-1").await;
/// let sqs = ctx.sqs_client();
/// let iam = ctx.iam_client();
/// ```
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
    role_arn: Option<String>,
}

impl AwsContext {
    /// Load configuration for a region from the default credential chain.
    pub async fn new(region: &str) -> Self {
        Self::with_credentials(region, &Credentials::default()).await
    }

    /// Load configuration for a region, optionally from a named profile and
    /// optionally assuming a role.
    pub async fn with_credentials(region: &str, credentials: &Credentials) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = &credentials.profile {
            loader = loader.profile_name(profile);
        }
        let base = loader.load().await;

        let config = match &credentials.role_arn {
            Some(role_arn) => {
                debug!(%role_arn, region, "Assuming role");
                let provider = AssumeRoleProvider::builder(role_arn.as_str())
                    .session_name(SESSION_NAME)
                    .region(Region::new(region.to_string()))
                    .configure(&base)
                    .build()
                    .await;
                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region.to_string()))
                    .credentials_provider(provider)
                    .load()
                    .await
            }
            None => base,
        };

        Self {
            config: Arc::new(config),
            region: region.to_string(),
            role_arn: credentials.role_arn.clone(),
        }
    }

    /// Get the underlying SDK config for direct client construction.
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// Get the region string.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Role this context assumed, if any
    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    pub fn cloudwatch_client(&self) -> aws_sdk_cloudwatch::Client {
        aws_sdk_cloudwatch::Client::new(self.sdk_config())
    }

    pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(self.sdk_config())
    }

    pub fn iam_client(&self) -> aws_sdk_iam::Client {
        aws_sdk_iam::Client::new(self.sdk_config())
    }

    pub fn kinesis_client(&self) -> aws_sdk_kinesis::Client {
        aws_sdk_kinesis::Client::new(self.sdk_config())
    }

    pub fn lambda_client(&self) -> aws_sdk_lambda::Client {
        aws_sdk_lambda::Client::new(self.sdk_config())
    }

    pub fn sns_client(&self) -> aws_sdk_sns::Client {
        aws_sdk_sns::Client::new(self.sdk_config())
    }

    pub fn sqs_client(&self) -> aws_sdk_sqs::Client {
        aws_sdk_sqs::Client::new(self.sdk_config())
    }

    pub fn sts_client(&self) -> aws_sdk_sts::Client {
        aws_sdk_sts::Client::new(self.sdk_config())
    }
}

/// Types constructed from a shared [`AwsContext`]
pub trait FromAwsContext {
    fn from_context(ctx: &AwsContext) -> Self;
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .field("role_arn", &self.role_arn)
            .finish_non_exhaustive()
    }
}
