//! Object store resource (the blob container for query artifacts).

use serde::{Deserialize, Serialize};

/// What happens to the bucket and its contents when the stack is torn down.
///
/// `Destroy` removes the bucket and everything in it; teardown is then
/// irreversible for any data it held. Unsuitable for production retention
/// requirements. `Retain` leaves the bucket and its contents in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    Retain,
}

/// Bucket specification: key-addressed blob get/put/delete.
///
/// Non-versioned means each put replaces prior content with no recovery
/// path — acceptable for ephemeral artifacts only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    /// Whether object versioning is enabled.
    #[serde(default)]
    pub versioned: bool,

    /// Teardown policy for the bucket and its contents.
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
}

impl Default for BucketSpec {
    fn default() -> Self {
        Self {
            versioned: false,
            removal_policy: RemovalPolicy::Destroy,
        }
    }
}

impl BucketSpec {
    /// Creates a non-versioned bucket with the given removal policy.
    pub fn with_removal_policy(removal_policy: RemovalPolicy) -> Self {
        Self {
            versioned: false,
            removal_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_ephemeral() {
        let spec = BucketSpec::default();
        assert!(!spec.versioned);
        assert_eq!(spec.removal_policy, RemovalPolicy::Destroy);
    }
}
