//! Kinesis data streams

use super::{KindService, compact};
use crate::aws::account::Identity;
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::to_fetch_error;
use anyhow::{Context, Result};
use aws_sdk_kinesis::types::{StreamMode, StreamStatus};
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{FetchError, PageSink, ResourceDetail};
use serde_json::{Value, json};

/// Lists streams and fetches their summaries
pub struct KinesisService {
    client: aws_sdk_kinesis::Client,
}

impl FromAwsContext for KinesisService {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.kinesis_client(),
        }
    }
}

impl KindService for KinesisService {
    async fn list(&self, pages: &PageSink) -> Result<()> {
        let mut start: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_streams()
                .set_exclusive_start_stream_name(start.take())
                .send()
                .await
                .context("Failed to list Kinesis streams")?;

            let names = resp.stream_names().to_vec();
            let last = names.last().cloned();
            pages.publish(names).await?;

            let has_more: Option<bool> = resp.has_more_streams().into();
            match (has_more.unwrap_or(false), last) {
                (true, Some(last)) => start = Some(last),
                _ => break,
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
            .describe_stream_summary()
            .stream_name(name)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "DescribeStreamSummary", e))?;

        let Some(summary) = resp.stream_description_summary() else {
            return Ok(None);
        };

        let status: Option<&StreamStatus> = summary.stream_status().into();
        let mode: Option<&StreamMode> = summary
            .stream_mode_details()
            .and_then(|details| details.stream_mode().into());
        let monitoring: Vec<Value> = summary
            .enhanced_monitoring()
            .iter()
            .map(|m| {
                let metrics: Vec<&str> = m.shard_level_metrics().iter().map(|n| n.as_str()).collect();
                json!({ "ShardLevelMetrics": metrics })
            })
            .collect();
        let arn: Option<&str> = summary.stream_arn().into();

        let attributes = compact(json!({
            "StreamName": summary.stream_name(),
            "StreamStatus": status.map(|s| s.as_str()),
            "StreamMode": mode.map(|m| m.as_str()),
            "RetentionPeriodHours": summary.retention_period_hours(),
            "EnhancedMonitoring": monitoring,
            "EncryptionType": summary.encryption_type().map(|e| e.as_str()),
            "KeyId": summary.key_id(),
            "OpenShardCount": summary.open_shard_count(),
            "ConsumerCount": summary.consumer_count(),
        }));

        let mut detail = ResourceDetail::new(ResourceKind::Stream, name, attributes);
        if let Some(arn) = arn {
            detail = detail.with_arn(arn);
        }
        Ok(Some(detail))
    }
}
