//! Typed resource descriptors for the deployment topology.
//!
//! Every resource is a pure data value: a logical id, a kind, and a
//! kind-specific spec. Declaring a resource yields a [`ResourceToken`],
//! an opaque serializable identity other declarations reference instead
//! of holding live handles.

pub mod bucket;
pub mod function;
pub mod table;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use bucket::{BucketSpec, RemovalPolicy};
pub use function::{
    Architecture, AuthMode, FunctionSpec, FunctionUrlSpec, ImageCode, ImagePlatform,
};
pub use table::{AttributeType, BillingMode, PartitionKey, TableSpec};

/// The kind of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Table,
    Bucket,
    Function,
    FunctionUrl,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Table => write!(f, "Table"),
            ResourceKind::Bucket => write!(f, "Bucket"),
            ResourceKind::Function => write!(f, "Function"),
            ResourceKind::FunctionUrl => write!(f, "FunctionUrl"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(ResourceKind::Table),
            "bucket" => Ok(ResourceKind::Bucket),
            "function" => Ok(ResourceKind::Function),
            "functionurl" => Ok(ResourceKind::FunctionUrl),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

/// Opaque identity of a declared resource.
///
/// Tokens are allocated when a resource is declared and are stable for
/// the lifetime of the document. They serialize as plain strings so a
/// document snapshot is diffable, and they can be embedded in string
/// values (environment variables, outputs) via [`ResourceToken::reference`];
/// the provisioning engine substitutes the physical name at apply time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceToken(String);

impl ResourceToken {
    pub(crate) fn for_id(logical_id: &str) -> Self {
        Self(logical_id.to_string())
    }

    /// Returns the logical id this token identifies.
    pub fn logical_id(&self) -> &str {
        &self.0
    }

    /// Returns a `${token:…}` placeholder for embedding in string values.
    pub fn reference(&self) -> String {
        format!("${{token:{}}}", self.0)
    }
}

impl fmt::Display for ResourceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extracts all `${token:…}` placeholders embedded in a string value.
pub fn token_references(value: &str) -> Vec<ResourceToken> {
    let mut tokens = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find("${token:") {
        let tail = &rest[start + "${token:".len()..];
        match tail.find('}') {
            Some(end) => {
                tokens.push(ResourceToken(tail[..end].to_string()));
                rest = &tail[end + 1..];
            }
            None => break,
        }
    }
    tokens
}

/// Metadata common to all resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    /// Logical id, unique within the stack document.
    pub logical_id: String,

    /// Key-value labels for organizing resources.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ResourceMeta {
    /// Creates metadata with just a logical id.
    pub fn new(logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Kind-specific resource specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResourceSpec {
    Table(TableSpec),
    Bucket(BucketSpec),
    Function(FunctionSpec),
    FunctionUrl(FunctionUrlSpec),
}

impl ResourceSpec {
    /// Returns the kind of this spec.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Table(_) => ResourceKind::Table,
            ResourceSpec::Bucket(_) => ResourceKind::Bucket,
            ResourceSpec::Function(_) => ResourceKind::Function,
            ResourceSpec::FunctionUrl(_) => ResourceKind::FunctionUrl,
        }
    }

    /// Returns every token another resource's spec references.
    pub fn references(&self) -> Vec<ResourceToken> {
        match self {
            ResourceSpec::Table(_) | ResourceSpec::Bucket(_) => Vec::new(),
            ResourceSpec::Function(spec) => {
                let mut refs = Vec::new();
                for value in spec.environment.values() {
                    refs.extend(token_references(value));
                }
                refs
            }
            ResourceSpec::FunctionUrl(spec) => vec![spec.function.clone()],
        }
    }
}

/// A declared resource: metadata, identity token, and spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub meta: ResourceMeta,
    pub token: ResourceToken,
    pub spec: ResourceSpec,
}

impl ResourceEntry {
    /// Returns the logical id of this resource.
    pub fn id(&self) -> &str {
        &self.meta.logical_id
    }

    /// Returns the kind of this resource.
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_reference_roundtrip() {
        let token = ResourceToken::for_id("rag-worker");
        let value = format!("prefix-{}-suffix", token.reference());
        let found = token_references(&value);
        assert_eq!(found, vec![token]);
    }

    #[test]
    fn test_token_references_multiple() {
        let value = "${token:a} and ${token:b}";
        let found = token_references(value);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].logical_id(), "a");
        assert_eq!(found[1].logical_id(), "b");
    }

    #[test]
    fn test_token_references_unterminated() {
        assert!(token_references("${token:oops").is_empty());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            "functionurl".parse::<ResourceKind>(),
            Ok(ResourceKind::FunctionUrl)
        );
        assert!("pipeline".parse::<ResourceKind>().is_err());
    }
}
