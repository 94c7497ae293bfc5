//! Per-service listing and detail fetching
//!
//! Each resource kind is backed by one service module. Listings follow the
//! service's own pagination token and publish every page as it arrives;
//! details are rendered into JSON attributes using the service's field names.

pub mod cloudwatch;
pub mod dynamodb;
pub mod iam;
pub mod kinesis;
pub mod lambda;
pub mod sns;
pub mod sqs;

use crate::aws::account::Identity;
use cloudsweep_reconcile::{FetchError, PageSink, ResourceDetail};
use serde_json::{Map, Value};
use std::future::Future;

/// Listing and detail operations for one resource kind
pub trait KindService: Send + Sync {
    /// Enumerate every name, one page at a time
    fn list(&self, pages: &PageSink) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Fetch one resource; `None` when the service reports nothing for it
    fn describe(
        &self,
        identity: &Identity,
        name: &str,
    ) -> impl Future<Output = Result<Option<ResourceDetail>, FetchError>> + Send;
}

/// Accept both required (`&str`) and optional (`Option<&str>`) SDK getters
pub(crate) fn text<'a>(value: impl Into<Option<&'a str>>) -> Option<&'a str> {
    value.into()
}

/// Object with sorted keys from string pairs
pub(crate) fn string_map<'a, I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let map: Map<String, Value> = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), embedded_json(v)))
        .collect();
    Value::Object(map)
}

/// Parse string attributes that carry a JSON document (policies, redrive
/// settings, delivery policies) so they diff structurally.
pub(crate) fn embedded_json(raw: &str) -> Value {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(raw) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

/// IAM returns policy documents URL-encoded
pub(crate) fn policy_document(raw: &str) -> Value {
    match urlencoding::decode(raw) {
        Ok(decoded) => embedded_json(&decoded),
        Err(_) => embedded_json(raw),
    }
}

/// ARN of a regional resource addressed by name
pub(crate) fn regional_arn(service: &str, identity: &Identity, resource: &str) -> String {
    format!(
        "arn:aws:{service}:{}:{}:{resource}",
        identity.region, identity.account_id
    )
}

/// Drop `null` members so absent optional fields do not show up as drift
/// against a side that omits them entirely.
pub(crate) fn compact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, compact(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(compact).collect()),
        other => other,
    }
}
