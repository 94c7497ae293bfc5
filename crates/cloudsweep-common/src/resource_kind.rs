//! Categories of cloud resources
//!
//! Every listing, detail fetch and normalization rule is keyed by one of
//! these kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Types of AWS resources cloudsweep can inventory and reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Lambda function
    Function,
    /// SQS queue
    Queue,
    /// SNS topic
    Topic,
    /// DynamoDB table
    Table,
    /// Kinesis data stream
    Stream,
    /// IAM role
    Role,
    /// Customer-managed IAM policy
    Policy,
    /// CloudWatch metric alarm
    Alarm,
}

impl ResourceKind {
    /// Every kind, in display order.
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Function,
        ResourceKind::Queue,
        ResourceKind::Topic,
        ResourceKind::Table,
        ResourceKind::Stream,
        ResourceKind::Role,
        ResourceKind::Policy,
        ResourceKind::Alarm,
    ];

    /// Stable lowercase identifier used on the command line and in reports
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Function => "function",
            ResourceKind::Queue => "queue",
            ResourceKind::Topic => "topic",
            ResourceKind::Table => "table",
            ResourceKind::Stream => "stream",
            ResourceKind::Role => "role",
            ResourceKind::Policy => "policy",
            ResourceKind::Alarm => "alarm",
        }
    }

    /// AWS service that owns this kind of resource
    pub fn service(self) -> &'static str {
        match self {
            ResourceKind::Function => "lambda",
            ResourceKind::Queue => "sqs",
            ResourceKind::Topic => "sns",
            ResourceKind::Table => "dynamodb",
            ResourceKind::Stream => "kinesis",
            ResourceKind::Role | ResourceKind::Policy => "iam",
            ResourceKind::Alarm => "cloudwatch",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known resource kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind '{0}' (expected one of: function, queue, topic, table, stream, role, policy, alarm)")]
pub struct ParseResourceKindError(pub String);

impl FromStr for ResourceKind {
    type Err = ParseResourceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        let needle = match needle.as_str() {
            "policies" => "policy",
            other => other.strip_suffix('s').unwrap_or(other),
        };
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| ParseResourceKindError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_display() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.to_string().parse::<ResourceKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_parse_accepts_case_and_plural() {
        assert_eq!("Queues".parse::<ResourceKind>(), Ok(ResourceKind::Queue));
        assert_eq!(" ALARM ".parse::<ResourceKind>(), Ok(ResourceKind::Alarm));
        assert_eq!("policies".parse::<ResourceKind>(), Ok(ResourceKind::Policy));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "bucket".parse::<ResourceKind>().unwrap_err();
        assert_eq!(err.0, "bucket");
        assert!(err.to_string().contains("unknown resource kind"));
    }

    #[test]
    fn test_iam_kinds_share_a_service() {
        assert_eq!(ResourceKind::Role.service(), "iam");
        assert_eq!(ResourceKind::Policy.service(), "iam");
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&ResourceKind::Function).unwrap();
        assert_eq!(json, "\"function\"");
        let kind: ResourceKind = serde_json::from_str("\"stream\"").unwrap();
        assert_eq!(kind, ResourceKind::Stream);
    }
}
