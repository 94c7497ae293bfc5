//! SQS queues

use super::{KindService, string_map};
use crate::aws::account::Identity;
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::to_fetch_error;
use anyhow::{Context, Result};
use aws_sdk_sqs::types::QueueAttributeName;
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{FetchError, PageSink, ResourceDetail};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Maximum page size accepted by ListQueues
const LIST_PAGE_SIZE: i32 = 1000;

/// Lists queues and fetches their attributes and tags
pub struct SqsService {
    client: aws_sdk_sqs::Client,
}

impl FromAwsContext for SqsService {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sqs_client(),
        }
    }
}

/// Queue name is the last path segment of its URL
pub(crate) fn queue_name_from_url(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

impl KindService for SqsService {
    async fn list(&self, pages: &PageSink) -> Result<()> {
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_queues()
                .max_results(LIST_PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to list SQS queues")?;

            let names: Vec<String> = resp
                .queue_urls()
                .iter()
                .map(|url| queue_name_from_url(url).to_string())
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
        let url_resp = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "GetQueueUrl", e))?;
        let Some(url) = url_resp.queue_url() else {
            return Ok(None);
        };

        let attrs_resp = self
            .client
            .get_queue_attributes()
            .queue_url(url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "GetQueueAttributes", e))?;

        let tags_resp = self
            .client
            .list_queue_tags()
            .queue_url(url)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "ListQueueTags", e))?;

        let mut attributes: HashMap<&str, &str> = HashMap::new();
        if let Some(attrs) = attrs_resp.attributes() {
            attributes.extend(attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        let arn = attributes.get("QueueArn").map(|arn| arn.to_string());

        let mut detail = ResourceDetail::new(
            ResourceKind::Queue,
            name,
            queue_attributes(&attributes, tags_resp.tags()),
        );
        if let Some(arn) = arn {
            detail = detail.with_arn(arn);
        }
        Ok(Some(detail))
    }
}

/// Render queue attributes with JSON-valued ones (policy, redrive) parsed
pub(crate) fn queue_attributes(
    attributes: &HashMap<&str, &str>,
    tags: Option<&HashMap<String, String>>,
) -> Value {
    let mut root = match string_map(attributes.iter().map(|(k, v)| (*k, *v))) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    // Already carried as the detail's ARN
    root.remove("QueueArn");
    if let Some(tags) = tags {
        root.insert(
            "Tags".into(),
            string_map(tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        );
    }
    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_from_url() {
        assert_eq!(
            queue_name_from_url("https://sqs.us-east-1.amazonaws.com/111111111111/orders"),
            "orders"
        );
        assert_eq!(queue_name_from_url("orders"), "orders");
    }

    #[test]
    fn test_queue_attributes_parses_redrive_policy() {
        let attributes = HashMap::from([
            ("VisibilityTimeout", "30"),
            ("QueueArn", "arn:aws:sqs:us-east-1:111111111111:orders"),
            (
                "RedrivePolicy",
                r#"{"deadLetterTargetArn":"arn:aws:sqs:us-east-1:111111111111:orders-dlq","maxReceiveCount":5}"#,
            ),
        ]);
        let tags = HashMap::from([("env".to_string(), "prod".to_string())]);

        let attrs = queue_attributes(&attributes, Some(&tags));

        assert_eq!(attrs["VisibilityTimeout"], "30");
        assert_eq!(attrs["RedrivePolicy"]["maxReceiveCount"], 5);
        assert_eq!(attrs["Tags"]["env"], "prod");
        assert!(attrs.get("QueueArn").is_none());
    }
}
