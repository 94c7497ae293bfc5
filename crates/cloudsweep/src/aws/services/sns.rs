//! SNS topics

use super::{KindService, regional_arn, string_map};
use crate::aws::account::Identity;
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::to_fetch_error;
use anyhow::{Context, Result};
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{FetchError, PageSink, ResourceDetail};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Lists topics and fetches their attributes and subscriptions
pub struct SnsService {
    client: aws_sdk_sns::Client,
}

impl FromAwsContext for SnsService {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sns_client(),
        }
    }
}

/// Topic name is the last segment of its ARN
pub(crate) fn topic_name_from_arn(arn: &str) -> &str {
    arn.rsplit(':').next().unwrap_or(arn)
}

impl SnsService {
    async fn subscriptions(&self, name: &str, topic_arn: &str) -> Result<Vec<Value>, FetchError> {
        let mut subscriptions = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_subscriptions_by_topic()
                .topic_arn(topic_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| to_fetch_error(name, "ListSubscriptionsByTopic", e))?;

            for sub in resp.subscriptions() {
                subscriptions.push(json!({
                    "Protocol": sub.protocol(),
                    "Endpoint": sub.endpoint(),
                    "SubscriptionArn": sub.subscription_arn(),
                }));
            }

            match resp.next_token() {
                Some(next) => next_token = Some(next.to_string()),
                None => break,
            }
        }

        Ok(subscriptions)
    }
}

impl KindService for SnsService {
    async fn list(&self, pages: &PageSink) -> Result<()> {
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_topics()
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to list SNS topics")?;

            let names: Vec<String> = resp
                .topics()
                .iter()
                .filter_map(|t| t.topic_arn())
                .map(|arn| topic_name_from_arn(arn).to_string())
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
        identity: &Identity,
        name: &str,
    ) -> Result<Option<ResourceDetail>, FetchError> {
        let topic_arn = regional_arn("sns", identity, name);

        let resp = self
            .client
            .get_topic_attributes()
            .topic_arn(&topic_arn)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "GetTopicAttributes", e))?;
        let Some(attributes) = resp.attributes() else {
            return Ok(None);
        };

        let subscriptions = self.subscriptions(name, &topic_arn).await?;

        Ok(Some(
            ResourceDetail::new(
                ResourceKind::Topic,
                name,
                topic_attributes(attributes, subscriptions),
            )
            .with_arn(topic_arn),
        ))
    }
}

pub(crate) fn topic_attributes(attributes: &HashMap<String, String>, subscriptions: Vec<Value>) -> Value {
    let mut root = match string_map(attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    root.remove("TopicArn");
    root.insert("Subscriptions".into(), Value::Array(subscriptions));
    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name_from_arn() {
        assert_eq!(
            topic_name_from_arn("arn:aws:sns:us-east-1:111111111111:alerts"),
            "alerts"
        );
    }

    #[test]
    fn test_topic_attributes() {
        let attributes = HashMap::from([
            (
                "TopicArn".to_string(),
                "arn:aws:sns:us-east-1:111111111111:alerts".to_string(),
            ),
            ("DisplayName".to_string(), "Alerts".to_string()),
            ("SubscriptionsConfirmed".to_string(), "2".to_string()),
        ]);
        let subs = vec![json!({"Protocol": "email", "Endpoint": "ops@example.com"})];

        let attrs = topic_attributes(&attributes, subs);

        assert_eq!(attrs["DisplayName"], "Alerts");
        assert_eq!(attrs["SubscriptionsConfirmed"], "2");
        assert_eq!(attrs["Subscriptions"][0]["Protocol"], "email");
        assert!(attrs.get("TopicArn").is_none());
    }
}
