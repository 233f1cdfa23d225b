//! Compute unit resources: container-image functions and their public URLs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ResourceToken;

/// CPU architecture a function runs on. Must match the image build platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    #[default]
    X86_64,
    Arm64,
}

impl Architecture {
    /// Returns the image build platform this architecture requires.
    pub fn platform(self) -> ImagePlatform {
        match self {
            Architecture::X86_64 => ImagePlatform::LinuxAmd64,
            Architecture::Arm64 => ImagePlatform::LinuxArm64,
        }
    }
}

/// Container image build platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePlatform {
    #[default]
    #[serde(rename = "linux/amd64")]
    LinuxAmd64,
    #[serde(rename = "linux/arm64")]
    LinuxArm64,
}

/// Reference to a buildable container image plus the entry command that
/// selects which internal handler runs. Two functions may share one base
/// image directory with different entry commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCode {
    /// Directory containing the image build context.
    pub directory: String,

    /// Entry command selecting the handler, e.g. `app_api_handler.handler`.
    pub cmd: Vec<String>,

    /// Platform the image is built for.
    #[serde(default)]
    pub platform: ImagePlatform,
}

impl ImageCode {
    /// Creates an image reference with a single-element entry command.
    pub fn from_directory(directory: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            cmd: vec![handler.into()],
            platform: ImagePlatform::default(),
        }
    }
}

/// Function specification: a request-invoked, stateless compute unit with
/// declared resource limits. Limits are declared, not adjustable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Container image and entry command.
    pub image: ImageCode,

    /// Memory limit in megabytes.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,

    /// Execution timeout in seconds; a call exceeding it is treated as
    /// failed by the invoking infrastructure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// CPU architecture, must match the image platform.
    #[serde(default)]
    pub architecture: Architecture,

    /// Environment variables. Values may embed `${token:…}` references
    /// resolved to physical names at apply time; resource names are never
    /// hard-coded here.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

fn default_memory_mb() -> u32 {
    512
}

fn default_timeout_secs() -> u64 {
    60
}

impl FunctionSpec {
    /// Creates a function spec from an image with default limits.
    pub fn new(image: ImageCode) -> Self {
        Self {
            image,
            memory_mb: default_memory_mb(),
            timeout_secs: default_timeout_secs(),
            architecture: Architecture::default(),
            environment: BTreeMap::new(),
        }
    }

    /// Sets the memory limit.
    pub fn with_memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Sets the timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the architecture.
    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// How callers of a public entry point authenticate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Any network-reachable caller can invoke the function. An explicit,
    /// documented tradeoff; the validator surfaces it as a warning.
    #[default]
    None,
    Iam,
}

/// Public entry point: a stable URL bound to one function. No rate
/// limiting and no request validation happen at this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionUrlSpec {
    /// The function this URL forwards requests to.
    pub function: ResourceToken,

    /// Authentication mode.
    #[serde(default)]
    pub auth: AuthMode,
}
