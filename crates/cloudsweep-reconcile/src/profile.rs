//! Per-kind normalization table
//!
//! Every resource kind declares which attribute keys are volatile (change on
//! their own between two otherwise identical deployments) and which hold
//! lists whose order carries no meaning.

use crate::detail::ResourceDetail;
use crate::normalize::NormalizationContext;
use cloudsweep_common::ResourceKind;
use serde_json::{Map, Value};

/// Normalization rules for one resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindProfile {
    pub kind: ResourceKind,
    /// Keys removed wherever they occur
    pub volatile_fields: &'static [&'static str],
    /// Keys whose array values are sorted canonically
    pub unordered_fields: &'static [&'static str],
}

static PROFILES: [KindProfile; 8] = [
    KindProfile {
        kind: ResourceKind::Function,
        volatile_fields: &[
            "LastModified",
            "RevisionId",
            "LastUpdateStatus",
            "LastUpdateStatusReason",
            "State",
            "StateReason",
            "CodeSha256",
            "Location",
            "UUID",
            "LastProcessingResult",
            "StateTransitionReason",
        ],
        unordered_fields: &["Layers", "Triggers", "SubnetIds", "SecurityGroupIds", "Architectures"],
    },
    KindProfile {
        kind: ResourceKind::Queue,
        volatile_fields: &[
            "ApproximateNumberOfMessages",
            "ApproximateNumberOfMessagesNotVisible",
            "ApproximateNumberOfMessagesDelayed",
            "CreatedTimestamp",
            "LastModifiedTimestamp",
        ],
        unordered_fields: &[],
    },
    KindProfile {
        kind: ResourceKind::Topic,
        volatile_fields: &[
            "SubscriptionsConfirmed",
            "SubscriptionsPending",
            "SubscriptionsDeleted",
            "SubscriptionArn",
        ],
        unordered_fields: &["Subscriptions"],
    },
    KindProfile {
        kind: ResourceKind::Table,
        volatile_fields: &[
            "TableStatus",
            "ItemCount",
            "TableSizeBytes",
            "CreationDateTime",
            "TableId",
            "LatestStreamArn",
            "LatestStreamLabel",
            "IndexStatus",
            "IndexSizeBytes",
            "LastIncreaseDateTime",
            "LastDecreaseDateTime",
            "NumberOfDecreasesToday",
        ],
        unordered_fields: &[
            "AttributeDefinitions",
            "GlobalSecondaryIndexes",
            "LocalSecondaryIndexes",
        ],
    },
    KindProfile {
        kind: ResourceKind::Stream,
        volatile_fields: &[
            "StreamStatus",
            "StreamCreationTimestamp",
            "OpenShardCount",
            "ConsumerCount",
        ],
        unordered_fields: &["EnhancedMonitoring"],
    },
    KindProfile {
        kind: ResourceKind::Role,
        volatile_fields: &["RoleId", "CreateDate", "RoleLastUsed"],
        unordered_fields: &["AttachedPolicies", "InlinePolicies", "Tags"],
    },
    KindProfile {
        kind: ResourceKind::Policy,
        volatile_fields: &[
            "AttachmentCount",
            "UpdateDate",
            "CreateDate",
            "DefaultVersionId",
            "PolicyId",
            "VersionId",
        ],
        unordered_fields: &["Statement", "Tags"],
    },
    KindProfile {
        kind: ResourceKind::Alarm,
        volatile_fields: &[
            "StateValue",
            "StateReason",
            "StateReasonData",
            "StateUpdatedTimestamp",
            "StateTransitionedTimestamp",
            "AlarmConfigurationUpdatedTimestamp",
        ],
        unordered_fields: &["AlarmActions", "OKActions", "InsufficientDataActions", "Dimensions"],
    },
];

impl KindProfile {
    /// Look up the profile for a kind
    pub fn for_kind(kind: ResourceKind) -> &'static KindProfile {
        let index = match kind {
            ResourceKind::Function => 0,
            ResourceKind::Queue => 1,
            ResourceKind::Topic => 2,
            ResourceKind::Table => 3,
            ResourceKind::Stream => 4,
            ResourceKind::Role => 5,
            ResourceKind::Policy => 6,
            ResourceKind::Alarm => 7,
        };
        &PROFILES[index]
    }

    pub fn all() -> &'static [KindProfile] {
        &PROFILES
    }

    /// Rewrite environment identifiers, strip volatile keys and sort
    /// unordered lists. Applying it to its own output changes nothing.
    pub fn normalize(&self, detail: ResourceDetail, ctx: &NormalizationContext) -> ResourceDetail {
        let attributes = ctx.replace_value(detail.attributes);
        ResourceDetail {
            kind: detail.kind,
            name: ctx.replace_str(detail.name.as_str()).into(),
            arn: detail.arn.map(|arn| ctx.replace_str(&arn)),
            attributes: self.canonicalize(attributes),
        }
    }

    fn canonicalize(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, _)| !self.volatile_fields.contains(&k.as_str()))
                    .map(|(k, v)| {
                        let v = self.canonicalize(v);
                        if self.unordered_fields.contains(&k.as_str()) {
                            (k, sort_array(v))
                        } else {
                            (k, v)
                        }
                    })
                    .collect::<Map<String, Value>>(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.canonicalize(v)).collect())
            }
            other => other,
        }
    }
}

fn sort_array(value: Value) -> Value {
    match value {
        Value::Array(mut items) => {
            items.sort_by_cached_key(|v| v.to_string());
            Value::Array(items)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> NormalizationContext {
        NormalizationContext::for_environments([
            ("111111111111", "us-east-1"),
            ("222222222222", "eu-west-1"),
        ])
        .unwrap()
    }

    #[test]
    fn test_every_kind_has_a_profile() {
        for kind in ResourceKind::ALL {
            assert_eq!(KindProfile::for_kind(kind).kind, kind);
        }
        assert_eq!(KindProfile::all().len(), ResourceKind::ALL.len());
    }

    #[test]
    fn test_identical_functions_in_two_accounts_converge() {
        let profile = KindProfile::for_kind(ResourceKind::Function);
        let source = ResourceDetail::new(
            ResourceKind::Function,
            "foo",
            json!({
                "Role": "arn:aws:iam::111111111111:role/foo",
                "LastModified": "2024-01-01T00:00:00Z",
                "Layers": ["arn:aws:lambda:us-east-1:111111111111:layer:b:1",
                           "arn:aws:lambda:us-east-1:111111111111:layer:a:1"]
            }),
        )
        .with_arn("arn:aws:lambda:us-east-1:111111111111:function:foo");
        let target = ResourceDetail::new(
            ResourceKind::Function,
            "foo",
            json!({
                "Role": "arn:aws:iam::222222222222:role/foo",
                "LastModified": "2025-06-01T00:00:00Z",
                "Layers": ["arn:aws:lambda:eu-west-1:222222222222:layer:a:1",
                           "arn:aws:lambda:eu-west-1:222222222222:layer:b:1"]
            }),
        )
        .with_arn("arn:aws:lambda:eu-west-1:222222222222:function:foo");

        let a = profile.normalize(source, &ctx());
        let b = profile.normalize(target, &ctx());
        assert_eq!(a, b);
        assert_eq!(
            a.arn.as_deref(),
            Some("arn:aws:lambda:REGION:ACCOUNT_ID:function:foo")
        );
        assert!(a.attributes.get("LastModified").is_none());
    }

    #[test]
    fn test_volatile_fields_stripped_at_depth() {
        let profile = KindProfile::for_kind(ResourceKind::Table);
        let detail = ResourceDetail::new(
            ResourceKind::Table,
            "users",
            json!({
                "ItemCount": 10,
                "GlobalSecondaryIndexes": [{"IndexName": "by-email", "IndexStatus": "ACTIVE", "ItemCount": 3}]
            }),
        );
        let normalized = profile.normalize(detail, &ctx());
        assert!(normalized.attributes.get("ItemCount").is_none());
        assert_eq!(
            normalized.attributes["GlobalSecondaryIndexes"][0],
            json!({"IndexName": "by-email"})
        );
    }

    #[test]
    fn test_normalize_is_idempotent_for_sample() {
        let profile = KindProfile::for_kind(ResourceKind::Alarm);
        let detail = ResourceDetail::new(
            ResourceKind::Alarm,
            "cpu-high",
            json!({
                "StateValue": "OK",
                "AlarmActions": ["arn:aws:sns:us-east-1:111111111111:z", "arn:aws:sns:us-east-1:111111111111:a"],
                "Dimensions": [{"Name": "Queue", "Value": "q"}]
            }),
        );
        let once = profile.normalize(detail, &ctx());
        let twice = profile.normalize(once.clone(), &ctx());
        assert_eq!(once, twice);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i32>().prop_map(|n| json!(n)),
                "(arn:aws:[a-z]{2,6}:(us-east-1|eu-west-1):(111111111111|222222222222):)?[a-z-]{0,10}"
                    .prop_map(Value::String),
            ]
        }

        fn tree() -> impl Strategy<Value = Value> {
            leaf().prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map(
                        prop_oneof![
                            Just("Layers".to_string()),
                            Just("Tags".to_string()),
                            Just("StateValue".to_string()),
                            Just("LastModified".to_string()),
                            "[A-Z][a-z]{1,6}",
                        ],
                        inner,
                        0..4,
                    )
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            /// Normalizing an already normalized detail is a no-op
            #[test]
            fn normalize_is_idempotent(
                attrs in tree(),
                kind_index in 0usize..8,
                name in "[a-z]{1,6}(-111111111111)?",
            ) {
                let kind = ResourceKind::ALL[kind_index];
                let profile = KindProfile::for_kind(kind);
                let detail = ResourceDetail::new(kind, name, attrs)
                    .with_arn("arn:aws:svc:us-east-1:111111111111:x");
                let once = profile.normalize(detail, &ctx());
                let twice = profile.normalize(once.clone(), &ctx());
                prop_assert_eq!(once, twice);
            }
        }
    }
}
