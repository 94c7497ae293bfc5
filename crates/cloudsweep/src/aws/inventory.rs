//! AWS-backed listing and detail collaborators
//!
//! One [`AwsInventory`] serves one environment and one resource kind, and
//! implements both pipeline collaborator traits by dispatching to the
//! service module that owns the kind.

use crate::aws::account::{Identity, get_current_account_id};
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::services::cloudwatch::CloudWatchService;
use crate::aws::services::dynamodb::DynamoDbService;
use crate::aws::services::iam::{IamPolicyService, IamRoleService};
use crate::aws::services::kinesis::KinesisService;
use crate::aws::services::lambda::LambdaService;
use crate::aws::services::sns::SnsService;
use crate::aws::services::sqs::SqsService;
use crate::aws::services::KindService;
use anyhow::Result;
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{
    DetailFetcher, DetailsSink, FetchError, PageSink, ResourceDetail, ResourceLister, ResourceName,
};
use tracing::debug;

enum Backend {
    Function(LambdaService),
    Queue(SqsService),
    Topic(SnsService),
    Table(DynamoDbService),
    Stream(KinesisService),
    Role(IamRoleService),
    Policy(IamPolicyService),
    Alarm(CloudWatchService),
}

impl Backend {
    fn for_kind(kind: ResourceKind, ctx: &AwsContext) -> Self {
        match kind {
            ResourceKind::Function => Backend::Function(LambdaService::from_context(ctx)),
            ResourceKind::Queue => Backend::Queue(SqsService::from_context(ctx)),
            ResourceKind::Topic => Backend::Topic(SnsService::from_context(ctx)),
            ResourceKind::Table => Backend::Table(DynamoDbService::from_context(ctx)),
            ResourceKind::Stream => Backend::Stream(KinesisService::from_context(ctx)),
            ResourceKind::Role => Backend::Role(IamRoleService::from_context(ctx)),
            ResourceKind::Policy => Backend::Policy(IamPolicyService::from_context(ctx)),
            ResourceKind::Alarm => Backend::Alarm(CloudWatchService::from_context(ctx)),
        }
    }

    async fn list(&self, pages: &PageSink) -> Result<()> {
        match self {
            Backend::Function(s) => s.list(pages).await,
            Backend::Queue(s) => s.list(pages).await,
            Backend::Topic(s) => s.list(pages).await,
            Backend::Table(s) => s.list(pages).await,
            Backend::Stream(s) => s.list(pages).await,
            Backend::Role(s) => s.list(pages).await,
            Backend::Policy(s) => s.list(pages).await,
            Backend::Alarm(s) => s.list(pages).await,
        }
    }

    async fn describe(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<Option<ResourceDetail>, FetchError> {
        match self {
            Backend::Function(s) => s.describe(identity, name).await,
            Backend::Queue(s) => s.describe(identity, name).await,
            Backend::Topic(s) => s.describe(identity, name).await,
            Backend::Table(s) => s.describe(identity, name).await,
            Backend::Stream(s) => s.describe(identity, name).await,
            Backend::Role(s) => s.describe(identity, name).await,
            Backend::Policy(s) => s.describe(identity, name).await,
            Backend::Alarm(s) => s.describe(identity, name).await,
        }
    }
}

/// Inventory of one resource kind in one AWS environment
pub struct AwsInventory {
    kind: ResourceKind,
    identity: Identity,
    backend: Backend,
}

impl AwsInventory {
    pub fn new(kind: ResourceKind, identity: Identity, ctx: &AwsContext) -> Self {
        Self {
            kind,
            identity,
            backend: Backend::for_kind(kind, ctx),
        }
    }

    /// Resolve the caller's account and build the inventory
    pub async fn connect(kind: ResourceKind, ctx: &AwsContext) -> Result<Self> {
        let account_id = get_current_account_id(ctx.sdk_config()).await?;
        Ok(Self::new(kind, Identity::new(account_id, ctx.region()), ctx))
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl std::fmt::Debug for AwsInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsInventory")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ResourceLister for AwsInventory {
    async fn list_resources(&self, pages: &PageSink) -> Result<()> {
        debug!(
            kind = %self.kind,
            account_id = %self.identity.account_id,
            region = %self.identity.region,
            "Listing resources"
        );
        self.backend.list(pages).await
    }
}

impl DetailFetcher for AwsInventory {
    async fn fetch_resources(
        &self,
        names: &[ResourceName],
        details: &mut DetailsSink,
    ) -> Result<Vec<ResourceDetail>, FetchError> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match self.backend.describe(&self.identity, name.as_str()).await? {
                Some(detail) => {
                    details.push(format!(
                        "fetched {} {name} from {}/{}",
                        self.kind, self.identity.account_id, self.identity.region
                    ));
                    out.push(detail);
                }
                None => details.push(format!(
                    "{} {name} returned no details in {}/{}",
                    self.kind, self.identity.account_id, self.identity.region
                )),
            }
        }
        Ok(out)
    }
}
