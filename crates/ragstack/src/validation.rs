//! Declare-time validation of a stack document.
//!
//! Errors block the deploy before any resource is created or mutated.
//! Warnings never block; they surface documented tradeoffs (destructive
//! teardown, over-broad managed policies, unauthenticated entry points)
//! so an operator or a lint can act on them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};
use crate::grant::{Action, Grant, ManagedPolicyAttachment};
use crate::resource::{
    token_references, FunctionSpec, FunctionUrlSpec, ResourceEntry, ResourceKind, ResourceSpec,
    TableSpec,
};
use crate::stack::StackOutput;

/// Environment variable carrying the table's physical name.
pub const ENV_TABLE_NAME: &str = "TABLE_NAME";
/// Environment variable carrying the bucket's physical name.
pub const ENV_BUCKET_NAME: &str = "BUCKET_NAME";
/// Environment variable carrying the worker function's identity.
pub const ENV_WORKER_NAME: &str = "WORKER_LAMBDA_NAME";

/// A non-fatal finding about the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StackWarning {
    /// Teardown will irreversibly delete the bucket's contents.
    DestructiveRemoval { logical_id: String },
    /// A managed policy grants full service access instead of a scoped
    /// action set.
    OverBroadPolicy {
        logical_id: String,
        policy_name: String,
    },
    /// The entry point accepts requests from any network-reachable caller.
    UnauthenticatedUrl { logical_id: String },
}

impl fmt::Display for StackWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackWarning::DestructiveRemoval { logical_id } => write!(
                f,
                "Bucket '{}': removal policy is destroy; teardown deletes all contents irreversibly",
                logical_id
            ),
            StackWarning::OverBroadPolicy {
                logical_id,
                policy_name,
            } => write!(
                f,
                "Function '{}': managed policy '{}' grants full service access, not least privilege",
                logical_id, policy_name
            ),
            StackWarning::UnauthenticatedUrl { logical_id } => write!(
                f,
                "FunctionUrl '{}': auth mode is none; any network-reachable caller can invoke",
                logical_id
            ),
        }
    }
}

/// Validator for a stack document under construction.
pub struct StackValidator {
    /// Collected validation errors.
    errors: Vec<String>,
    /// Collected non-fatal warnings.
    warnings: Vec<StackWarning>,
}

impl StackValidator {
    /// Creates a new validator.
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Validates the whole declaration set. Returns the collected warnings
    /// on success; all errors joined into one `Validation` error otherwise.
    pub fn validate(
        &mut self,
        resources: &[ResourceEntry],
        grants: &[Grant],
        managed_policies: &[ManagedPolicyAttachment],
        outputs: &[StackOutput],
    ) -> Result<Vec<StackWarning>> {
        self.errors.clear();
        self.warnings.clear();

        let kinds: HashMap<&str, ResourceKind> = resources
            .iter()
            .map(|r| (r.id(), r.kind()))
            .collect();

        self.validate_unique_ids(resources);

        for resource in resources {
            match &resource.spec {
                ResourceSpec::Table(spec) => self.validate_table(resource.id(), spec),
                ResourceSpec::Bucket(spec) => {
                    if spec.removal_policy == crate::resource::RemovalPolicy::Destroy {
                        self.warnings.push(StackWarning::DestructiveRemoval {
                            logical_id: resource.id().to_string(),
                        });
                    }
                }
                ResourceSpec::Function(spec) => self.validate_function(resource.id(), spec),
                ResourceSpec::FunctionUrl(spec) => {
                    self.validate_function_url(resource.id(), spec, &kinds)
                }
            }
        }

        self.validate_grants(grants, &kinds);
        self.validate_managed_policies(managed_policies, &kinds);
        self.validate_env_contract(resources, grants);
        self.validate_outputs(outputs, &kinds);

        if self.errors.is_empty() {
            tracing::debug!(
                warnings = self.warnings.len(),
                "stack document validation passed"
            );
            Ok(std::mem::take(&mut self.warnings))
        } else {
            Err(StackError::Validation(self.errors.join("; ")))
        }
    }

    /// Logical ids must be non-empty and unique within the document.
    fn validate_unique_ids(&mut self, resources: &[ResourceEntry]) {
        let mut seen = HashSet::new();
        for resource in resources {
            let id = resource.id();
            if id.is_empty() {
                self.errors
                    .push(format!("{}: logical id is required", resource.kind()));
                continue;
            }
            if !seen.insert(id) {
                self.errors.push(format!(
                    "Duplicate logical id '{}' for kind '{}'",
                    id,
                    resource.kind()
                ));
            }
        }
    }

    fn validate_table(&mut self, id: &str, spec: &TableSpec) {
        if spec.partition_key.name.is_empty() {
            self.errors
                .push(format!("Table '{}': partition key name is required", id));
        }
    }

    fn validate_function(&mut self, id: &str, spec: &FunctionSpec) {
        if spec.image.directory.is_empty() {
            self.errors
                .push(format!("Function '{}': image directory is required", id));
        }

        if spec.image.cmd.is_empty() || spec.image.cmd.iter().any(|c| c.is_empty()) {
            self.errors
                .push(format!("Function '{}': entry command is required", id));
        }

        if spec.memory_mb == 0 {
            self.errors
                .push(format!("Function '{}': memory must be greater than 0", id));
        }

        if spec.timeout_secs == 0 {
            self.errors
                .push(format!("Function '{}': timeout must be greater than 0", id));
        }

        // Architecture-specific native dependencies in the image require
        // the declared architecture to match the build platform.
        if spec.architecture.platform() != spec.image.platform {
            self.errors.push(format!(
                "Function '{}': architecture does not match image platform",
                id
            ));
        }

        for key in spec.environment.keys() {
            if key.is_empty() {
                self.errors.push(format!(
                    "Function '{}': environment variable name must not be empty",
                    id
                ));
            }
        }
    }

    fn validate_function_url(
        &mut self,
        id: &str,
        spec: &FunctionUrlSpec,
        kinds: &HashMap<&str, ResourceKind>,
    ) {
        match kinds.get(spec.function.logical_id()) {
            Some(ResourceKind::Function) => {}
            Some(kind) => self.errors.push(format!(
                "FunctionUrl '{}': target '{}' is a {}, not a function",
                id, spec.function, kind
            )),
            None => self.errors.push(format!(
                "FunctionUrl '{}': target '{}' is not declared",
                id, spec.function
            )),
        }

        if spec.auth == crate::resource::AuthMode::None {
            self.warnings.push(StackWarning::UnauthenticatedUrl {
                logical_id: id.to_string(),
            });
        }
    }

    /// Grants must bind a declared function principal to a declared target
    /// with a non-empty action set; invoke only applies to functions, and
    /// data actions only to tables and buckets.
    fn validate_grants(&mut self, grants: &[Grant], kinds: &HashMap<&str, ResourceKind>) {
        for grant in grants {
            let principal = grant.principal.logical_id();
            let target = grant.target.logical_id();

            match kinds.get(principal) {
                Some(ResourceKind::Function) => {}
                Some(kind) => self.errors.push(format!(
                    "Grant: principal '{}' is a {}, not a function",
                    principal, kind
                )),
                None => self
                    .errors
                    .push(format!("Grant: principal '{}' is not declared", principal)),
            }

            let target_kind = match kinds.get(target) {
                Some(kind) => *kind,
                None => {
                    self.errors
                        .push(format!("Grant: target '{}' is not declared", target));
                    continue;
                }
            };

            if grant.actions.is_empty() {
                self.errors.push(format!(
                    "Grant: action set for '{}' on '{}' must not be empty",
                    principal, target
                ));
            }

            for action in grant.actions.iter() {
                let valid = match action {
                    Action::Invoke => target_kind == ResourceKind::Function,
                    Action::Read | Action::Write => {
                        matches!(target_kind, ResourceKind::Table | ResourceKind::Bucket)
                    }
                };
                if !valid {
                    self.errors.push(format!(
                        "Grant: action '{}' is not valid on {} '{}'",
                        action, target_kind, target
                    ));
                }
            }
        }
    }

    fn validate_managed_policies(
        &mut self,
        managed_policies: &[ManagedPolicyAttachment],
        kinds: &HashMap<&str, ResourceKind>,
    ) {
        for attachment in managed_policies {
            let principal = attachment.principal.logical_id();
            match kinds.get(principal) {
                Some(ResourceKind::Function) => {}
                Some(kind) => self.errors.push(format!(
                    "Managed policy '{}': principal '{}' is a {}, not a function",
                    attachment.policy_name, principal, kind
                )),
                None => self.errors.push(format!(
                    "Managed policy '{}': principal '{}' is not declared",
                    attachment.policy_name, principal
                )),
            }

            if attachment.policy_name.is_empty() {
                self.errors
                    .push(format!("Managed policy on '{}': name is required", principal));
            }

            // Over-broad by definition; surfaced so lints can reject it.
            self.warnings.push(StackWarning::OverBroadPolicy {
                logical_id: principal.to_string(),
                policy_name: attachment.policy_name.clone(),
            });
        }
    }

    /// Compute units receive resource names through their environment,
    /// never hard-coded: every function must carry `TABLE_NAME` when the
    /// document declares a table and `BUCKET_NAME` when it declares a
    /// bucket, and an invoke-granting principal must carry the invoked
    /// function's identity in some environment value.
    fn validate_env_contract(&mut self, resources: &[ResourceEntry], grants: &[Grant]) {
        let has_table = resources.iter().any(|r| r.kind() == ResourceKind::Table);
        let has_bucket = resources.iter().any(|r| r.kind() == ResourceKind::Bucket);

        for resource in resources {
            let ResourceSpec::Function(spec) = &resource.spec else {
                continue;
            };

            if has_table && !spec.environment.contains_key(ENV_TABLE_NAME) {
                self.errors.push(format!(
                    "Function '{}': missing required environment variable {}",
                    resource.id(),
                    ENV_TABLE_NAME
                ));
            }

            if has_bucket && !spec.environment.contains_key(ENV_BUCKET_NAME) {
                self.errors.push(format!(
                    "Function '{}': missing required environment variable {}",
                    resource.id(),
                    ENV_BUCKET_NAME
                ));
            }
        }

        // An invoke principal must resolve the target's identity at deploy
        // time through its environment, not discover it at runtime.
        for grant in grants {
            if !grant.actions.allows(Action::Invoke) {
                continue;
            }
            let principal = resources
                .iter()
                .find(|r| r.token == grant.principal)
                .and_then(|r| match &r.spec {
                    ResourceSpec::Function(spec) => Some((r.id(), spec)),
                    _ => None,
                });
            let Some((principal_id, spec)) = principal else {
                continue;
            };
            let carries_identity = spec.environment.values().any(|value| {
                token_references(value)
                    .iter()
                    .any(|t| t == &grant.target)
            });
            if !carries_identity {
                self.errors.push(format!(
                    "Function '{}': invokes '{}' but no environment variable carries its identity",
                    principal_id, grant.target
                ));
            }
        }
    }

    fn validate_outputs(&mut self, outputs: &[StackOutput], kinds: &HashMap<&str, ResourceKind>) {
        let mut seen = HashSet::new();
        for output in outputs {
            if output.name.is_empty() {
                self.errors.push("Output: name is required".to_string());
            }
            if !seen.insert(output.name.as_str()) {
                self.errors
                    .push(format!("Duplicate output name '{}'", output.name));
            }
            for token in token_references(&output.value) {
                if !kinds.contains_key(token.logical_id()) {
                    self.errors.push(format!(
                        "Output '{}': references undeclared resource '{}'",
                        output.name, token
                    ));
                }
            }
        }
    }
}

impl Default for StackValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::ActionSet;
    use crate::resource::{
        Architecture, BucketSpec, ImageCode, ImagePlatform, RemovalPolicy, ResourceMeta,
        ResourceToken,
    };

    fn entry(id: &str, spec: ResourceSpec) -> ResourceEntry {
        ResourceEntry {
            meta: ResourceMeta::new(id),
            token: ResourceToken::for_id(id),
            spec,
        }
    }

    fn validate(
        resources: Vec<ResourceEntry>,
        grants: Vec<Grant>,
    ) -> Result<Vec<StackWarning>> {
        StackValidator::new().validate(&resources, &grants, &[], &[])
    }

    #[test]
    fn test_architecture_mismatch_rejected() {
        let mut image = ImageCode::from_directory("../image", "app.handler");
        image.platform = ImagePlatform::LinuxArm64;
        let spec = FunctionSpec::new(image).with_architecture(Architecture::X86_64);
        let err = validate(vec![entry("fn", ResourceSpec::Function(spec))], vec![]).unwrap_err();
        assert!(err.to_string().contains("architecture"));
    }

    #[test]
    fn test_zero_memory_rejected() {
        let spec =
            FunctionSpec::new(ImageCode::from_directory("../image", "h")).with_memory_mb(0);
        assert!(validate(vec![entry("fn", ResourceSpec::Function(spec))], vec![]).is_err());
    }

    #[test]
    fn test_invoke_grant_on_bucket_rejected() {
        let bucket = entry("bucket", ResourceSpec::Bucket(BucketSpec::default()));
        let api = entry(
            "api",
            ResourceSpec::Function(
                FunctionSpec::new(ImageCode::from_directory("../image", "h"))
                    .with_env(ENV_BUCKET_NAME, "${token:bucket}"),
            ),
        );
        let grant = Grant::new(
            ResourceToken::for_id("api"),
            ResourceToken::for_id("bucket"),
            ActionSet::invoke(),
        );
        let err = validate(vec![bucket, api], vec![grant]).unwrap_err();
        assert!(err.to_string().contains("not valid"));
    }

    #[test]
    fn test_missing_env_contract_rejected() {
        let table = entry("table", ResourceSpec::Table(TableSpec::keyed_by("query_id")));
        let api = entry(
            "api",
            ResourceSpec::Function(FunctionSpec::new(ImageCode::from_directory("../image", "h"))),
        );
        let err = validate(vec![table, api], vec![]).unwrap_err();
        assert!(err.to_string().contains(ENV_TABLE_NAME));
    }

    #[test]
    fn test_invoke_without_identity_env_rejected() {
        let worker = entry(
            "worker",
            ResourceSpec::Function(FunctionSpec::new(ImageCode::from_directory("../image", "w"))),
        );
        let api = entry(
            "api",
            ResourceSpec::Function(FunctionSpec::new(ImageCode::from_directory("../image", "a"))),
        );
        let grant = Grant::new(
            ResourceToken::for_id("api"),
            ResourceToken::for_id("worker"),
            ActionSet::invoke(),
        );
        let err = validate(vec![worker, api], vec![grant]).unwrap_err();
        assert!(err.to_string().contains("identity"));
    }

    #[test]
    fn test_destroy_bucket_warns() {
        let bucket = entry(
            "bucket",
            ResourceSpec::Bucket(BucketSpec::with_removal_policy(RemovalPolicy::Destroy)),
        );
        let warnings = validate(vec![bucket], vec![]).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, StackWarning::DestructiveRemoval { .. })));
    }

    #[test]
    fn test_retain_bucket_does_not_warn() {
        let bucket = entry(
            "bucket",
            ResourceSpec::Bucket(BucketSpec::with_removal_policy(RemovalPolicy::Retain)),
        );
        let warnings = validate(vec![bucket], vec![]).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_managed_policy_always_warns() {
        let api = entry(
            "api",
            ResourceSpec::Function(FunctionSpec::new(ImageCode::from_directory("../image", "h"))),
        );
        let attachment =
            ManagedPolicyAttachment::new(ResourceToken::for_id("api"), "AmazonBedrockFullAccess");
        let warnings = StackValidator::new()
            .validate(&[api], &[], &[attachment], &[])
            .unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, StackWarning::OverBroadPolicy { .. })));
    }
}
