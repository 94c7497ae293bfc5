//! Top-level flows behind the CLI subcommands

use crate::aws::{AwsContext, AwsInventory, Identity};
use crate::config::{EnvironmentConfig, RunConfig};
use crate::report::InventoryListing;
use anyhow::{Context, Result};
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{
    Environment, NamedResourceQueue, NormalizationContext, PageSink, PipelineOutcome,
    ReconcilePipeline, ResourceLister, ResourceName,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Placeholders for both environments' account ids and regions
pub fn normalization_context(source: &Identity, target: &Identity) -> Result<NormalizationContext> {
    NormalizationContext::for_environments([
        (source.account_id.as_str(), source.region.as_str()),
        (target.account_id.as_str(), target.region.as_str()),
    ])
    .context("Failed to build normalization context")
}

async fn connect(kind: ResourceKind, env: &EnvironmentConfig, side: &str) -> Result<AwsInventory> {
    let ctx = AwsContext::with_credentials(&env.region, &env.credentials).await;
    debug!(
        side,
        region = ctx.region(),
        role_arn = ctx.role_arn().unwrap_or("-"),
        "Connecting"
    );
    AwsInventory::connect(kind, &ctx)
        .await
        .with_context(|| format!("Failed to connect to {side} environment in {}", env.region))
}

/// Reconcile one kind between the configured source and target
pub async fn run_reconcile(config: &RunConfig, cancel: CancellationToken) -> Result<PipelineOutcome> {
    let kind = config.kind();
    let (source, target) = tokio::try_join!(
        connect(kind, &config.source, "source"),
        connect(kind, &config.target, "target"),
    )?;

    let context = normalization_context(source.identity(), target.identity())?;
    info!(
        %kind,
        source_account = %source.identity().account_id,
        source_region = %source.identity().region,
        target_account = %target.identity().account_id,
        target_region = %target.identity().region,
        "Reconciling environments"
    );

    let pipeline = ReconcilePipeline::new(config.pipeline_options(), context);
    let outcome = pipeline
        .run(
            Environment::from_inventory(Arc::new(source)),
            Environment::from_inventory(Arc::new(target)),
            cancel,
        )
        .await
        .context("Reconciliation failed")?;

    info!(summary = %outcome.report.summary(), "Reconciliation finished");
    Ok(outcome)
}

/// Run a lister to completion and return its distinct names, sorted
pub async fn collect_names<L: ResourceLister>(lister: &L) -> Result<Vec<ResourceName>> {
    let queue = Arc::new(NamedResourceQueue::new("inventory"));
    let pages = PageSink::new(queue.clone());
    lister.list_resources(&pages).await?;
    queue.finish_populating();

    let names: BTreeSet<ResourceName> = queue.drain().into_iter().collect();
    info!(pages = pages.pages(), names = names.len(), "Listing complete");
    Ok(names.into_iter().collect())
}

/// List one kind in one environment
pub async fn run_inventory(kind: ResourceKind, env: &EnvironmentConfig) -> Result<InventoryListing> {
    let inventory = connect(kind, env, "inventory").await?;
    let names = collect_names(&inventory)
        .await
        .with_context(|| format!("Failed to list {kind} resources"))?;

    Ok(InventoryListing {
        kind,
        account_id: inventory.identity().account_id.to_string(),
        region: inventory.identity().region.clone(),
        names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AccountId;
    use cloudsweep_test_utils::MemoryLister;

    #[test]
    fn test_normalization_context_for_two_accounts() {
        let source = Identity::new(AccountId::new("111111111111"), "us-east-1");
        let target = Identity::new(AccountId::new("222222222222"), "eu-west-1");
        let ctx = normalization_context(&source, &target).unwrap();

        assert_eq!(
            ctx.replace_str("arn:aws:sqs:us-east-1:111111111111:orders"),
            ctx.replace_str("arn:aws:sqs:eu-west-1:222222222222:orders"),
        );
    }

    #[test]
    fn test_normalization_context_same_environment() {
        let identity = Identity::new(AccountId::new("111111111111"), "us-east-1");
        assert!(normalization_context(&identity, &identity).is_ok());
    }

    #[tokio::test]
    async fn test_collect_names_dedups_and_sorts() {
        let lister = MemoryLister::new().page(["b", "a"]).page(["c", "a"]);
        let names = collect_names(&lister).await.unwrap();
        let names: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_collect_names_propagates_failure() {
        let lister = MemoryLister::new().page(["a"]).failing_after(1, "AccessDenied");
        let err = collect_names(&lister).await.unwrap_err();
        assert!(err.to_string().contains("AccessDenied"));
    }
}
