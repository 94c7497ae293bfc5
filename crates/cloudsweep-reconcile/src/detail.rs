//! Fully fetched resource representation

use crate::name::ResourceName;
use cloudsweep_common::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Service-specific representation of one resource.
///
/// `attributes` is a JSON object using the provider's field names (for
/// example a function's triggers or a role's attached policies). A detail is
/// owned by the analyzer invocation that fetched it and dropped after diffing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDetail {
    pub kind: ResourceKind,
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    pub attributes: Value,
}

impl ResourceDetail {
    pub fn new(kind: ResourceKind, name: impl Into<ResourceName>, attributes: Value) -> Self {
        Self {
            kind,
            name: name.into(),
            arn: None,
            attributes,
        }
    }

    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.arn = Some(arn.into());
        self
    }

    /// Whole record as one JSON value (name and ARN included) for diffing
    pub fn to_value(&self) -> Value {
        let mut root = serde_json::Map::new();
        root.insert("Name".into(), Value::String(self.name.to_string()));
        if let Some(arn) = &self.arn {
            root.insert("Arn".into(), Value::String(arn.clone()));
        }
        root.insert("Attributes".into(), self.attributes.clone());
        Value::Object(root)
    }
}
