//! Key-value table resource (the query record store).

use serde::{Deserialize, Serialize};

/// The type of a partition key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

/// Partition key definition (name + attribute type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKey {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl PartitionKey {
    /// Creates a string-typed partition key.
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: AttributeType::String,
        }
    }
}

/// Throughput billing mode.
///
/// `OnDemand` scales with traffic and has no capacity-planning failure
/// mode; throttling under extreme burst load is still possible and is
/// handled by callers via retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BillingMode {
    #[default]
    OnDemand,
    Provisioned,
}

/// Table specification: point lookup and upsert by partition key, no
/// secondary indexes, no fixed schema beyond the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    /// Partition key uniquely identifying one record.
    pub partition_key: PartitionKey,

    /// Billing mode, on-demand by default.
    #[serde(default)]
    pub billing_mode: BillingMode,
}

impl TableSpec {
    /// Creates an on-demand table keyed by a string attribute.
    pub fn keyed_by(key_name: impl Into<String>) -> Self {
        Self {
            partition_key: PartitionKey::string(key_name),
            billing_mode: BillingMode::OnDemand,
        }
    }
}
