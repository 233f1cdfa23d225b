//! The desired-state document and its builder.
//!
//! A stack is built once, by value, into an immutable [`StackDocument`]
//! that serializes cleanly, so the whole topology is reproducible and
//! diffable. No mutable global state is involved.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};
use crate::grant::{ActionSet, Grant, ManagedPolicyAttachment};
use crate::resource::{
    BucketSpec, FunctionSpec, FunctionUrlSpec, ResourceEntry, ResourceMeta, ResourceSpec,
    ResourceToken, TableSpec,
};
use crate::validation::{StackValidator, StackWarning};

/// A deploy-time output surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutput {
    pub name: String,
    /// Value, possibly embedding `${token:…}` references resolved at apply.
    pub value: String,
}

/// Immutable desired-state document: resources, grants, and outputs,
/// with a precomputed dependency order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDocument {
    /// Stack name; also the unit of teardown.
    pub name: String,

    /// All declared resources, in declaration order.
    pub resources: Vec<ResourceEntry>,

    /// The permission graph.
    pub grants: Vec<Grant>,

    /// Broad managed-policy attachments (flagged by validation).
    pub managed_policies: Vec<ManagedPolicyAttachment>,

    /// Deploy-time outputs.
    pub outputs: Vec<StackOutput>,

    /// Logical ids in dependency order, leaves first.
    deploy_order: Vec<String>,

    /// Non-fatal findings collected at build time.
    warnings: Vec<StackWarning>,
}

impl StackDocument {
    /// Logical ids in the order resources must be created: a resource
    /// referencing another's identity is never created before it.
    pub fn deploy_order(&self) -> &[String] {
        &self.deploy_order
    }

    /// Teardown order: the reverse of the deploy order.
    pub fn teardown_order(&self) -> Vec<String> {
        self.deploy_order.iter().rev().cloned().collect()
    }

    /// Warnings collected when the document was built.
    pub fn warnings(&self) -> &[StackWarning] {
        &self.warnings
    }

    /// Looks up a resource by logical id.
    pub fn resource(&self, logical_id: &str) -> Option<&ResourceEntry> {
        self.resources.iter().find(|r| r.id() == logical_id)
    }

    /// Looks up a resource by token.
    pub fn resource_by_token(&self, token: &ResourceToken) -> Option<&ResourceEntry> {
        self.resources.iter().find(|r| &r.token == token)
    }

    /// Serializes the document to JSON for snapshotting and diffing.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder accumulating resource declarations into a [`StackDocument`].
///
/// `build()` validates the whole document and computes the dependency
/// order; an invalid topology never produces a document (fail-fast, no
/// partial apply left dangling).
#[derive(Debug)]
pub struct StackBuilder {
    name: String,
    resources: Vec<ResourceEntry>,
    grants: Vec<Grant>,
    managed_policies: Vec<ManagedPolicyAttachment>,
    outputs: Vec<StackOutput>,
}

impl StackBuilder {
    /// Starts a new stack document.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            grants: Vec::new(),
            managed_policies: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn add(&mut self, logical_id: &str, spec: ResourceSpec) -> ResourceToken {
        let token = ResourceToken::for_id(logical_id);
        self.resources.push(ResourceEntry {
            meta: ResourceMeta::new(logical_id),
            token: token.clone(),
            spec,
        });
        token
    }

    /// Declares a key-value table; returns its identity token.
    pub fn add_table(&mut self, logical_id: &str, spec: TableSpec) -> ResourceToken {
        self.add(logical_id, ResourceSpec::Table(spec))
    }

    /// Declares an object bucket; returns its identity token.
    pub fn add_bucket(&mut self, logical_id: &str, spec: BucketSpec) -> ResourceToken {
        self.add(logical_id, ResourceSpec::Bucket(spec))
    }

    /// Declares a compute function; returns its identity token.
    pub fn add_function(&mut self, logical_id: &str, spec: FunctionSpec) -> ResourceToken {
        self.add(logical_id, ResourceSpec::Function(spec))
    }

    /// Declares a public URL bound to a function; returns its identity token.
    pub fn add_function_url(&mut self, logical_id: &str, spec: FunctionUrlSpec) -> ResourceToken {
        self.add(logical_id, ResourceSpec::FunctionUrl(spec))
    }

    /// Grants `principal` the given actions on `target`.
    pub fn grant(&mut self, principal: &ResourceToken, target: &ResourceToken, actions: ActionSet) {
        self.grants
            .push(Grant::new(principal.clone(), target.clone(), actions));
    }

    /// Attaches a broad managed policy to a function's role.
    pub fn attach_managed_policy(&mut self, principal: &ResourceToken, policy_name: &str) {
        self.managed_policies
            .push(ManagedPolicyAttachment::new(principal.clone(), policy_name));
    }

    /// Surfaces a deploy-time output. The value may embed token references.
    pub fn output(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.outputs.push(StackOutput {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Validates the accumulated declarations and produces the immutable
    /// document with its dependency order.
    pub fn build(self) -> Result<StackDocument> {
        let mut validator = StackValidator::new();
        let warnings = validator.validate(
            &self.resources,
            &self.grants,
            &self.managed_policies,
            &self.outputs,
        )?;

        let deploy_order = topological_order(&self.resources)?;

        log::debug!(
            "Built stack '{}' with {} resources, {} grants, {} warnings",
            self.name,
            self.resources.len(),
            self.grants.len(),
            warnings.len()
        );

        Ok(StackDocument {
            name: self.name,
            resources: self.resources,
            grants: self.grants,
            managed_policies: self.managed_policies,
            outputs: self.outputs,
            deploy_order,
            warnings,
        })
    }
}

/// Kahn's algorithm over token references, with declaration order as the
/// deterministic tie-break. Leaves (no references) come first.
fn topological_order(resources: &[ResourceEntry]) -> Result<Vec<String>> {
    let index: HashMap<&str, usize> = resources
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id(), i))
        .collect();

    // dependents[i] lists resources that reference resource i.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); resources.len()];
    let mut indegree: Vec<usize> = vec![0; resources.len()];

    for (i, resource) in resources.iter().enumerate() {
        let mut seen = HashSet::new();
        for token in resource.spec.references() {
            let dep = *index.get(token.logical_id()).ok_or_else(|| {
                StackError::UnresolvedReference {
                    token: token.logical_id().to_string(),
                    referrer: resource.id().to_string(),
                }
            })?;
            if seen.insert(dep) {
                dependents[dep].push(i);
                indegree[i] += 1;
            }
        }
    }

    // Declaration-order queue keeps the sort deterministic.
    let mut ready: Vec<usize> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(resources.len());

    while let Some(next) = ready.first().copied() {
        ready.remove(0);
        order.push(resources[next].id().to_string());
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                // Insert keeping declaration order.
                let pos = ready
                    .iter()
                    .position(|&r| r > dependent)
                    .unwrap_or(ready.len());
                ready.insert(pos, dependent);
            }
        }
    }

    if order.len() != resources.len() {
        let stuck = resources
            .iter()
            .find(|r| !order.iter().any(|id| id == r.id()))
            .map(|r| r.id().to_string())
            .unwrap_or_default();
        return Err(StackError::DependencyCycle(stuck));
    }

    Ok(order)
}

/// Resolves `${token:…}` placeholders in a value against a map of
/// logical id → physical name.
pub fn resolve_references(value: &str, physical: &BTreeMap<String, String>) -> String {
    let mut out = value.to_string();
    for (logical_id, name) in physical {
        let placeholder = format!("${{token:{}}}", logical_id);
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, name);
        }
    }
    out
}
