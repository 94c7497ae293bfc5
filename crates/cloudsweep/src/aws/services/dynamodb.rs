//! DynamoDB tables

use super::{KindService, compact, text};
use crate::aws::account::Identity;
use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::to_fetch_error;
use anyhow::{Context, Result};
use aws_sdk_dynamodb::types::{
    KeySchemaElement, KeyType, Projection, ProjectionType, ScalarAttributeType, TableDescription,
};
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{FetchError, PageSink, ResourceDetail};
use serde_json::{Value, json};

/// Lists tables and describes them
pub struct DynamoDbService {
    client: aws_sdk_dynamodb::Client,
}

impl FromAwsContext for DynamoDbService {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.dynamodb_client(),
        }
    }
}

impl KindService for DynamoDbService {
    async fn list(&self, pages: &PageSink) -> Result<()> {
        let mut start: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_tables()
                .set_exclusive_start_table_name(start.take())
                .send()
                .await
                .context("Failed to list DynamoDB tables")?;

            pages.publish(resp.table_names().to_vec()).await?;

            match resp.last_evaluated_table_name() {
                Some(last) => start = Some(last.to_string()),
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
            .describe_table()
            .table_name(name)
            .send()
            .await
            .map_err(|e| to_fetch_error(name, "DescribeTable", e))?;

        let Some(table) = resp.table() else {
            return Ok(None);
        };

        let mut detail = ResourceDetail::new(ResourceKind::Table, name, table_attributes(table));
        if let Some(arn) = table.table_arn() {
            detail = detail.with_arn(arn);
        }
        Ok(Some(detail))
    }
}

fn key_schema(elements: &[KeySchemaElement]) -> Vec<Value> {
    elements
        .iter()
        .map(|key| {
            let key_type: Option<&KeyType> = key.key_type().into();
            json!({
                "AttributeName": text(key.attribute_name()),
                "KeyType": key_type.map(|k| k.as_str()),
            })
        })
        .collect()
}

fn projection(projection: Option<&Projection>) -> Value {
    match projection {
        Some(p) => {
            let projection_type: Option<&ProjectionType> = p.projection_type().into();
            json!({
                "ProjectionType": projection_type.map(|t| t.as_str()),
                "NonKeyAttributes": p.non_key_attributes(),
            })
        }
        None => Value::Null,
    }
}

pub(crate) fn table_attributes(table: &TableDescription) -> Value {
    let attribute_definitions: Vec<Value> = table
        .attribute_definitions()
        .iter()
        .map(|def| {
            let attribute_type: Option<&ScalarAttributeType> = def.attribute_type().into();
            json!({
                "AttributeName": text(def.attribute_name()),
                "AttributeType": attribute_type.map(|t| t.as_str()),
            })
        })
        .collect();

    let global_indexes: Vec<Value> = table
        .global_secondary_indexes()
        .iter()
        .map(|index| {
            json!({
                "IndexName": index.index_name(),
                "KeySchema": key_schema(index.key_schema()),
                "Projection": projection(index.projection()),
                "IndexStatus": index.index_status().map(|s| s.as_str()),
                "IndexSizeBytes": index.index_size_bytes(),
                "ItemCount": index.item_count(),
            })
        })
        .collect();

    let local_indexes: Vec<Value> = table
        .local_secondary_indexes()
        .iter()
        .map(|index| {
            json!({
                "IndexName": index.index_name(),
                "KeySchema": key_schema(index.key_schema()),
                "Projection": projection(index.projection()),
            })
        })
        .collect();

    let throughput = table.provisioned_throughput().map(|t| {
        json!({
            "ReadCapacityUnits": t.read_capacity_units(),
            "WriteCapacityUnits": t.write_capacity_units(),
            "NumberOfDecreasesToday": t.number_of_decreases_today(),
        })
    });

    let stream = table.stream_specification().map(|s| {
        json!({
            "StreamEnabled": s.stream_enabled(),
            "StreamViewType": s.stream_view_type().map(|v| v.as_str()),
        })
    });

    compact(json!({
        "TableName": table.table_name(),
        "TableStatus": table.table_status().map(|s| s.as_str()),
        "KeySchema": key_schema(table.key_schema()),
        "AttributeDefinitions": attribute_definitions,
        "GlobalSecondaryIndexes": global_indexes,
        "LocalSecondaryIndexes": local_indexes,
        "BillingMode": table
            .billing_mode_summary()
            .and_then(|b| b.billing_mode())
            .map(|m| m.as_str()),
        "ProvisionedThroughput": throughput,
        "StreamSpecification": stream,
        "TableClass": table
            .table_class_summary()
            .and_then(|c| c.table_class())
            .map(|c| c.as_str()),
        "DeletionProtectionEnabled": table.deletion_protection_enabled(),
        "ItemCount": table.item_count(),
        "TableSizeBytes": table.table_size_bytes(),
        "TableId": table.table_id(),
        "LatestStreamArn": table.latest_stream_arn(),
        "LatestStreamLabel": table.latest_stream_label(),
    }))
}
