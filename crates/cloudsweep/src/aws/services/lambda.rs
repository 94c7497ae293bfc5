//! Lambda functions

use super::{KindService, compact, string_map, text};
use crate::aws::account::Identity;
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::to_fetch_error;
use anyhow::{Context, Result};
use aws_sdk_lambda::types::FunctionConfiguration;
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{FetchError, PageSink, ResourceDetail};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

/// Lists functions and fetches their configuration and triggers
pub struct LambdaService {
    client: aws_sdk_lambda::Client,
}

impl FromAwsContext for LambdaService {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.lambda_client(),
        }
    }
}

impl LambdaService {
    /// Event source mappings pointing at the function
    async fn triggers(&self, name: &str) -> Result<Vec<Value>, FetchError> {
        let mut triggers = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_event_source_mappings()
                .function_name(name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| to_fetch_error(name, "ListEventSourceMappings", e))?;

            for mapping in resp.event_source_mappings() {
                triggers.push(json!({
                    "EventSourceArn": mapping.event_source_arn(),
                    "BatchSize": mapping.batch_size(),
                    "MaximumBatchingWindowInSeconds": mapping.maximum_batching_window_in_seconds(),
                    "StartingPosition": mapping.starting_position().map(|p| p.as_str()),
                    "State": mapping.state(),
                    "UUID": mapping.uuid(),
                }));
            }

            match resp.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        Ok(triggers)
    }
}

impl KindService for LambdaService {
    async fn list(&self, pages: &PageSink) -> Result<()> {
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_functions()
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to list Lambda functions")?;

            let names: Vec<String> = resp
                .functions()
                .iter()
                .filter_map(|f| f.function_name())
                .map(str::to_string)
                .collect();
            pages.publish(names).await?;

            match resp.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        Ok(())
    }

    async fn describe(
        &self,
        _identity: &Identity,
        name: &str,
    ) -> Result<Option<ResourceDetail>, FetchError> {
        let resp = self
            .client
            .get_function()
            .function_name(name)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "GetFunction", e))?;

        let Some(config) = resp.configuration() else {
            debug!(function = name, "GetFunction returned no configuration");
            return Ok(None);
        };
        let triggers = self.triggers(name).await?;

        let mut detail = ResourceDetail::new(
            ResourceKind::Function,
            name,
            function_attributes(config, resp.tags(), triggers),
        );
        if let Some(arn) = config.function_arn() {
            detail = detail.with_arn(arn);
        }
        Ok(Some(detail))
    }
}

/// Render a function configuration with its tags and triggers
pub(crate) fn function_attributes(
    config: &FunctionConfiguration,
    tags: Option<&HashMap<String, String>>,
    triggers: Vec<Value>,
) -> Value {
    let vpc = config.vpc_config().map(|vpc| {
        json!({
            "SubnetIds": vpc.subnet_ids(),
            "SecurityGroupIds": vpc.security_group_ids(),
        })
    });
    let environment = config
        .environment()
        .and_then(|env| env.variables())
        .map(|vars| string_map(vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))));
    let layers: Vec<&str> = config.layers().iter().filter_map(|l| text(l.arn())).collect();
    let architectures: Vec<&str> = config.architectures().iter().map(|a| a.as_str()).collect();
    let tags = tags.map(|tags| string_map(tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))));

    compact(json!({
        "FunctionName": config.function_name(),
        "Runtime": config.runtime().map(|r| r.as_str()),
        "Handler": config.handler(),
        "Role": config.role(),
        "Description": config.description(),
        "MemorySize": config.memory_size(),
        "Timeout": config.timeout(),
        "PackageType": config.package_type().map(|p| p.as_str()),
        "Architectures": architectures,
        "Layers": layers,
        "Environment": environment,
        "VpcConfig": vpc,
        "DeadLetterConfig": config.dead_letter_config().and_then(|d| d.target_arn()),
        "TracingConfig": config.tracing_config().and_then(|t| t.mode()).map(|m| m.as_str()),
        "Version": config.version(),
        "CodeSha256": config.code_sha256(),
        "LastModified": config.last_modified(),
        "RevisionId": config.revision_id(),
        "State": config.state().map(|s| s.as_str()),
        "Tags": tags,
        "Triggers": triggers,
    }))
}
