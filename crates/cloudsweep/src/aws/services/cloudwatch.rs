//! CloudWatch metric alarms

use super::{KindService, compact, text};
use crate::aws::account::Identity;
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::to_fetch_error;
use anyhow::{Context, Result};
use aws_sdk_cloudwatch::types::MetricAlarm;
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{FetchError, PageSink, ResourceDetail};
use serde_json::{Value, json};

/// Lists metric alarms and describes them by name
pub struct CloudWatchService {
    client: aws_sdk_cloudwatch::Client,
}

impl FromAwsContext for CloudWatchService {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cloudwatch_client(),
        }
    }
}

impl KindService for CloudWatchService {
    async fn list(&self, pages: &PageSink) -> Result<()> {
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .describe_alarms()
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe CloudWatch alarms")?;

            let names: Vec<String> = resp
                .metric_alarms()
                .iter()
                .filter_map(|a| a.alarm_name())
                .map(str::to_string)
                .collect();
            pages.publish(names).await?;

            match resp.next_token() {
                Some(next) => next_token = Some(next.to_string()),
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
            .describe_alarms()
            .alarm_names(name)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "DescribeAlarms", e))?;

        // An unknown alarm name yields an empty result, not an error
        let Some(alarm) = resp.metric_alarms().first() else {
            return Ok(None);
        };

        let mut detail = ResourceDetail::new(ResourceKind::Alarm, name, alarm_attributes(alarm));
        if let Some(arn) = alarm.alarm_arn() {
            detail = detail.with_arn(arn);
        }
        Ok(Some(detail))
    }
}

pub(crate) fn alarm_attributes(alarm: &MetricAlarm) -> Value {
    let dimensions: Vec<Value> = alarm
        .dimensions()
        .iter()
        .map(|d| json!({ "Name": text(d.name()), "Value": text(d.value()) }))
        .collect();

    compact(json!({
        "AlarmName": alarm.alarm_name(),
        "AlarmDescription": alarm.alarm_description(),
        "ActionsEnabled": alarm.actions_enabled(),
        "OKActions": alarm.ok_actions(),
        "AlarmActions": alarm.alarm_actions(),
        "InsufficientDataActions": alarm.insufficient_data_actions(),
        "MetricName": alarm.metric_name(),
        "Namespace": alarm.namespace(),
        "Statistic": alarm.statistic().map(|s| s.as_str()),
        "ExtendedStatistic": alarm.extended_statistic(),
        "Dimensions": dimensions,
        "Period": alarm.period(),
        "Unit": alarm.unit().map(|u| u.as_str()),
        "EvaluationPeriods": alarm.evaluation_periods(),
        "DatapointsToAlarm": alarm.datapoints_to_alarm(),
        "Threshold": alarm.threshold(),
        "ComparisonOperator": alarm.comparison_operator().map(|c| c.as_str()),
        "TreatMissingData": alarm.treat_missing_data(),
        "StateValue": alarm.state_value().map(|s| s.as_str()),
        "StateReason": alarm.state_reason(),
    }))
}
