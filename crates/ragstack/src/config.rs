//! Stack configuration loaded from a YAML file.
//!
//! Everything an operator may want to vary between environments lives
//! here: image build directory, function sizing, the bucket's removal
//! policy, and the name prefix. Every field has a default matching the
//! reference deployment, so an empty file is a valid config.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};
use crate::resource::{Architecture, RemovalPolicy};

/// Sizing for one compute function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionTuning {
    /// Memory limit in megabytes.
    pub memory_mb: u32,

    /// Execution timeout in seconds.
    pub timeout_secs: u64,
}

/// Configuration for building the RAG stack document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackConfig {
    /// Stack name; physical resource names are derived from it.
    #[serde(default = "default_stack_name")]
    pub stack_name: String,

    /// Directory containing the container image build context shared by
    /// both functions.
    #[serde(default = "default_image_directory")]
    pub image_directory: String,

    /// CPU architecture for both functions; must match the image build.
    #[serde(default)]
    pub architecture: Architecture,

    /// Worker function sizing.
    #[serde(default = "default_worker_tuning")]
    pub worker: FunctionTuning,

    /// API function sizing.
    #[serde(default = "default_api_tuning")]
    pub api: FunctionTuning,

    /// Teardown policy for the artifact bucket. The destroy default
    /// matches the reference deployment and is warned about at build
    /// time; set retain for any environment whose data must survive
    /// stack teardown.
    #[serde(default)]
    pub bucket_removal_policy: RemovalPolicy,

    /// Whether the artifact bucket keeps object versions.
    #[serde(default)]
    pub bucket_versioned: bool,
}

fn default_stack_name() -> String {
    "rag-stack".to_string()
}

fn default_image_directory() -> String {
    "../image".to_string()
}

fn default_worker_tuning() -> FunctionTuning {
    FunctionTuning {
        memory_mb: 512,
        timeout_secs: 60,
    }
}

fn default_api_tuning() -> FunctionTuning {
    FunctionTuning {
        memory_mb: 256,
        timeout_secs: 30,
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: default_stack_name(),
            image_directory: default_image_directory(),
            architecture: Architecture::default(),
            worker: default_worker_tuning(),
            api: default_api_tuning(),
            bucket_removal_policy: RemovalPolicy::default(),
            bucket_versioned: false,
        }
    }
}

impl StackConfig {
    /// Loads a config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| StackError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|err| match err {
            StackError::ParseConfig { message, .. } => StackError::ParseConfig {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parses a config from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config = serde_yaml::from_str(contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = StackConfig::from_yaml("{}").unwrap();
        assert_eq!(config.stack_name, "rag-stack");
        assert_eq!(config.worker.memory_mb, 512);
        assert_eq!(config.worker.timeout_secs, 60);
        assert_eq!(config.api.memory_mb, 256);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.bucket_removal_policy, RemovalPolicy::Destroy);
        assert!(!config.bucket_versioned);
    }

    #[test]
    fn test_removal_policy_override() {
        let config = StackConfig::from_yaml("bucketRemovalPolicy: retain\n").unwrap();
        assert_eq!(config.bucket_removal_policy, RemovalPolicy::Retain);
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = StackConfig::from_yaml("worker: [not, a, map]\n").unwrap_err();
        assert!(matches!(err, StackError::ParseConfig { .. }));
    }
}
