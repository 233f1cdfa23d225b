//! In-memory provisioning engine.
//!
//! Implements the [`ProvisioningEngine`] contract over plain maps so the
//! whole topology can be deployed, exercised, and torn down in tests
//! without a cloud account. Beyond the trait it simulates the runtime
//! data path — submit a query through the entry point, run the worker,
//! poll for the result — enforcing the declared permission graph on
//! every access.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::error::{Result, StackError};
use crate::grant::Action;
use crate::record::QueryRecord;
use crate::resource::{RemovalPolicy, ResourceKind, ResourceSpec};
use crate::stack::{resolve_references, StackDocument};

use super::events::StackEvent;
use super::{AppliedStack, ProvisioningEngine};

/// One deployed resource: its kind, physical name, and the resolved spec
/// used to detect drift between applies.
#[derive(Debug, Clone)]
struct DeployedResource {
    kind: ResourceKind,
    physical_name: String,
    resolved_spec: serde_json::Value,
}

/// A pending asynchronous worker invocation.
#[derive(Debug, Clone)]
struct PendingInvocation {
    worker_id: String,
    query_id: String,
}

/// Everything the engine holds for one deployed stack.
#[derive(Debug, Default)]
struct DeployedStack {
    resources: BTreeMap<String, DeployedResource>,
    /// logical id → physical name, for token resolution.
    physical: BTreeMap<String, String>,
    grants: BTreeSet<(String, String, Action)>,
    managed_policies: BTreeSet<(String, String)>,
    outputs: BTreeMap<String, String>,
    /// Table data, keyed by table logical id then record key.
    tables: HashMap<String, BTreeMap<String, QueryRecord>>,
    /// Bucket data, keyed by bucket logical id then object key.
    buckets: HashMap<String, BTreeMap<String, Vec<u8>>>,
    pending: Vec<PendingInvocation>,
    invocation_counts: BTreeMap<String, u32>,
    /// Snapshot of the last applied document, for teardown order and the
    /// runtime simulation.
    document: Option<StackDocument>,
}

#[derive(Debug, Default)]
struct EngineState {
    stacks: HashMap<String, DeployedStack>,
    /// Resources that survived a destroy due to their retain policy.
    retained: Vec<String>,
}

/// In-memory engine; clone-free, shared by reference.
pub struct MemoryEngine {
    state: Mutex<EngineState>,
    events: broadcast::Sender<StackEvent>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(EngineState::default()),
            events,
        }
    }

    /// Subscribes to apply/destroy progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<StackEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StackEvent) {
        if let Err(e) = self.events.send(event) {
            log::debug!("No event listeners active (all receivers dropped): {}", e);
        }
    }

    /// Returns true if the stack is currently deployed.
    pub async fn stack_exists(&self, stack_name: &str) -> bool {
        self.state.lock().await.stacks.contains_key(stack_name)
    }

    /// Physical names of every deployed resource in the stack.
    pub async fn deployed_resources(&self, stack_name: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .stacks
            .get(stack_name)
            .map(|s| s.resources.values().map(|r| r.physical_name.clone()).collect())
            .unwrap_or_default()
    }

    /// Logical ids of resources left behind by destroy due to retain.
    pub async fn retained_resources(&self) -> Vec<String> {
        self.state.lock().await.retained.clone()
    }

    /// A resolved output of a deployed stack.
    pub async fn output(&self, stack_name: &str, name: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .stacks
            .get(stack_name)?
            .outputs
            .get(name)
            .cloned()
    }

    /// How many times the worker has been invoked for a query.
    pub async fn invocation_count(&self, stack_name: &str, query_id: &str) -> u32 {
        let state = self.state.lock().await;
        state
            .stacks
            .get(stack_name)
            .and_then(|s| s.invocation_counts.get(query_id).copied())
            .unwrap_or(0)
    }

    /// Object keys currently stored in the stack's buckets.
    pub async fn object_keys(&self, stack_name: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .stacks
            .get(stack_name)
            .map(|s| {
                s.buckets
                    .values()
                    .flat_map(|objects| objects.keys().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Submits a query through the public entry point: the API function
    /// writes a fresh record to the table and invokes the worker
    /// asynchronously. The response does not wait for the worker;
    /// callers poll with [`MemoryEngine::get_query`].
    pub async fn submit_query(&self, stack_name: &str, query_text: &str) -> Result<QueryRecord> {
        let mut state = self.state.lock().await;
        let stack = state
            .stacks
            .get_mut(stack_name)
            .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))?;

        let (api_id, worker_id, table_id) = stack.runtime_roles()?;

        let record = QueryRecord::new(query_text);
        stack.put_record(&api_id, &table_id, record.clone())?;

        // Fire-and-forget invocation, gated on the declared grant. A
        // missing grant is an access-denied failure, never a silent no-op.
        stack.require_grant(&api_id, &worker_id, Action::Invoke)?;
        *stack
            .invocation_counts
            .entry(record.query_id.clone())
            .or_insert(0) += 1;
        stack.pending.push(PendingInvocation {
            worker_id,
            query_id: record.query_id.clone(),
        });

        log::info!(
            "Submitted query '{}' to stack '{}'",
            record.query_id,
            stack_name
        );
        Ok(record)
    }

    /// Upserts a record through the API function's table access. An empty
    /// `query_id` is rejected; an existing one is overwritten.
    pub async fn put_query(&self, stack_name: &str, record: QueryRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        let stack = state
            .stacks
            .get_mut(stack_name)
            .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))?;
        let (api_id, _, table_id) = stack.runtime_roles()?;
        stack.put_record(&api_id, &table_id, record)
    }

    /// Reads a record back through the API function's table access.
    pub async fn get_query(&self, stack_name: &str, query_id: &str) -> Result<Option<QueryRecord>> {
        let state = self.state.lock().await;
        let stack = state
            .stacks
            .get(stack_name)
            .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))?;
        let (api_id, _, table_id) = stack.runtime_roles()?;
        stack.require_grant(&api_id, &table_id, Action::Read)?;
        Ok(stack
            .tables
            .get(&table_id)
            .and_then(|t| t.get(query_id))
            .cloned())
    }

    /// Runs all pending worker invocations: each writes a result object
    /// to the bucket and completes the matching record. Returns how many
    /// invocations were processed.
    pub async fn run_worker(&self, stack_name: &str) -> Result<usize> {
        let mut state = self.state.lock().await;
        let stack = state
            .stacks
            .get_mut(stack_name)
            .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))?;

        let pending = std::mem::take(&mut stack.pending);
        let processed = pending.len();

        for invocation in pending {
            let (_, _, table_id) = stack.runtime_roles()?;
            let bucket_id = stack.bucket_id()?;

            stack.require_grant(&invocation.worker_id, &table_id, Action::Read)?;
            stack.require_grant(&invocation.worker_id, &table_id, Action::Write)?;
            stack.require_grant(&invocation.worker_id, &bucket_id, Action::Write)?;

            let record = stack
                .tables
                .get(&table_id)
                .and_then(|t| t.get(&invocation.query_id))
                .cloned()
                .ok_or_else(|| StackError::InvalidRecord(format!(
                    "no record for query '{}'",
                    invocation.query_id
                )))?;

            let object_key = format!("result/{}.json", record.query_id);
            let completed = record.complete(
                format!("generated answer for: {}", invocation.query_id),
                vec![object_key.clone()],
            );

            let body = serde_json::to_vec(&completed)?;
            stack
                .buckets
                .entry(bucket_id)
                .or_default()
                .insert(object_key, body);
            stack
                .tables
                .entry(table_id)
                .or_default()
                .insert(completed.query_id.clone(), completed);
        }

        Ok(processed)
    }
}

impl DeployedStack {
    /// Resolves the runtime roles from the applied document: the API
    /// function is the one behind the entry point, the worker is the
    /// function the API may invoke, and the table is the record store.
    fn runtime_roles(&self) -> Result<(String, String, String)> {
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| StackError::Engine("stack has no applied document".to_string()))?;

        let api = document
            .resources
            .iter()
            .find_map(|r| match &r.spec {
                ResourceSpec::FunctionUrl(spec) => Some(spec.function.logical_id().to_string()),
                _ => None,
            })
            .ok_or_else(|| StackError::Engine("no public entry point declared".to_string()))?;

        let worker = document
            .grants
            .iter()
            .find(|g| g.principal.logical_id() == api && g.actions.allows(Action::Invoke))
            .map(|g| g.target.logical_id().to_string())
            .or_else(|| {
                // Without the invoke grant the worker is still identified
                // by the API's environment reference.
                document.resources.iter().find_map(|r| {
                    match (&r.spec, r.id() == api) {
                        (ResourceSpec::Function(spec), true) => spec
                            .environment
                            .values()
                            .flat_map(|v| crate::resource::token_references(v))
                            .map(|t| t.logical_id().to_string())
                            .find(|id| {
                                document
                                    .resource(id)
                                    .map(|dep| dep.kind() == ResourceKind::Function)
                                    .unwrap_or(false)
                            }),
                        _ => None,
                    }
                })
            })
            .ok_or_else(|| StackError::Engine("no worker function declared".to_string()))?;

        let table = document
            .resources
            .iter()
            .find(|r| r.kind() == ResourceKind::Table)
            .map(|r| r.id().to_string())
            .ok_or_else(|| StackError::Engine("no table declared".to_string()))?;

        Ok((api, worker, table))
    }

    fn bucket_id(&self) -> Result<String> {
        self.document
            .as_ref()
            .and_then(|d| {
                d.resources
                    .iter()
                    .find(|r| r.kind() == ResourceKind::Bucket)
                    .map(|r| r.id().to_string())
            })
            .ok_or_else(|| StackError::Engine("no bucket declared".to_string()))
    }

    /// Fails with access-denied unless a grant covers the action.
    fn require_grant(&self, principal: &str, target: &str, action: Action) -> Result<()> {
        if self
            .grants
            .contains(&(principal.to_string(), target.to_string(), action))
        {
            Ok(())
        } else {
            Err(StackError::AccessDenied {
                principal: principal.to_string(),
                action: action.to_string(),
                resource: target.to_string(),
            })
        }
    }

    /// Upsert by key; an empty key is rejected rather than written
    /// somewhere undefined.
    fn put_record(&mut self, principal: &str, table_id: &str, record: QueryRecord) -> Result<()> {
        record.validate_key()?;
        self.require_grant(principal, table_id, Action::Write)?;
        self.tables
            .entry(table_id.to_string())
            .or_default()
            .insert(record.query_id.clone(), record);
        Ok(())
    }
}

/// Physical name for a resource. Deterministic so re-applies map onto
/// the same resources.
fn physical_name(stack_name: &str, logical_id: &str, kind: ResourceKind) -> String {
    match kind {
        ResourceKind::FunctionUrl => {
            format!("https://{}-{}.url.ragstack.local/", stack_name, logical_id)
        }
        _ => format!("{}-{}", stack_name, logical_id),
    }
}

/// Serializes a spec with every token reference resolved to a physical
/// name, so deployed state never contains unresolved placeholders.
fn resolve_spec(
    spec: &ResourceSpec,
    physical: &BTreeMap<String, String>,
) -> Result<serde_json::Value> {
    let value = serde_json::to_value(spec)?;
    Ok(resolve_value(value, physical))
}

fn resolve_value(value: serde_json::Value, physical: &BTreeMap<String, String>) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            serde_json::Value::String(resolve_references(&s, physical))
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .into_iter()
                .map(|item| resolve_value(item, physical))
                .collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_value(v, physical)))
                .collect(),
        ),
        other => other,
    }
}

#[async_trait]
impl ProvisioningEngine for MemoryEngine {
    async fn apply(&self, document: &StackDocument) -> Result<AppliedStack> {
        let mut state = self.state.lock().await;
        let stack = state.stacks.entry(document.name.clone()).or_default();

        let mut created = Vec::new();
        let mut unchanged = Vec::new();

        for warning in document.warnings() {
            log::warn!("{}", warning);
            self.emit(StackEvent::Warning {
                message: warning.to_string(),
            });
        }

        // Create or update in dependency order; every identity a spec
        // references has already been resolved by the time it is needed.
        for logical_id in document.deploy_order() {
            let entry = document.resource(logical_id).ok_or_else(|| {
                StackError::ApplyFailed {
                    id: logical_id.clone(),
                    message: "resource missing from document".to_string(),
                }
            })?;

            let name = physical_name(&document.name, logical_id, entry.kind());
            stack.physical.insert(logical_id.clone(), name.clone());
            let resolved = resolve_spec(&entry.spec, &stack.physical)?;

            match stack.resources.get(logical_id) {
                Some(existing) if existing.resolved_spec == resolved => {
                    unchanged.push(logical_id.clone());
                    self.emit(StackEvent::ResourceUnchanged {
                        logical_id: logical_id.clone(),
                    });
                }
                existing => {
                    let is_new = existing.is_none();
                    stack.resources.insert(
                        logical_id.clone(),
                        DeployedResource {
                            kind: entry.kind(),
                            physical_name: name.clone(),
                            resolved_spec: resolved,
                        },
                    );
                    match entry.kind() {
                        ResourceKind::Table => {
                            stack.tables.entry(logical_id.clone()).or_default();
                        }
                        ResourceKind::Bucket => {
                            stack.buckets.entry(logical_id.clone()).or_default();
                        }
                        _ => {}
                    }
                    if is_new {
                        created.push(logical_id.clone());
                        log::info!("Created {} '{}' as '{}'", entry.kind(), logical_id, name);
                        self.emit(StackEvent::ResourceCreated {
                            logical_id: logical_id.clone(),
                            physical_name: name,
                        });
                    }
                }
            }
        }

        // Resources dropped from the document are removed; the document,
        // not the engine, is the source of truth.
        let keep: BTreeSet<&String> = document.deploy_order().iter().collect();
        let stale: Vec<String> = stack
            .resources
            .keys()
            .filter(|id| !keep.contains(id))
            .cloned()
            .collect();
        for id in stale {
            stack.resources.remove(&id);
            stack.physical.remove(&id);
            stack.tables.remove(&id);
            stack.buckets.remove(&id);
            self.emit(StackEvent::ResourceDestroyed { logical_id: id });
        }

        // The grant set mirrors the document exactly: additive within one
        // document, and a redeploy without a grant revokes it.
        stack.grants = document
            .grants
            .iter()
            .flat_map(|grant| {
                grant.actions.iter().map(move |action| {
                    (
                        grant.principal.logical_id().to_string(),
                        grant.target.logical_id().to_string(),
                        action,
                    )
                })
            })
            .collect();
        for grant in &document.grants {
            self.emit(StackEvent::GrantApplied {
                principal: grant.principal.logical_id().to_string(),
                target: grant.target.logical_id().to_string(),
            });
        }

        stack.managed_policies = document
            .managed_policies
            .iter()
            .map(|p| {
                (
                    p.principal.logical_id().to_string(),
                    p.policy_name.clone(),
                )
            })
            .collect();

        stack.outputs = document
            .outputs
            .iter()
            .map(|output| {
                let value = resolve_references(&output.value, &stack.physical);
                self.emit(StackEvent::OutputResolved {
                    name: output.name.clone(),
                    value: value.clone(),
                });
                (output.name.clone(), value)
            })
            .collect();

        stack.document = Some(document.clone());

        Ok(AppliedStack {
            apply_id: Uuid::new_v4(),
            stack_name: document.name.clone(),
            outputs: stack.outputs.clone(),
            created,
            unchanged,
        })
    }

    async fn destroy(&self, stack_name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut stack = state
            .stacks
            .remove(stack_name)
            .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))?;

        let order = stack
            .document
            .as_ref()
            .map(|d| d.teardown_order())
            .unwrap_or_else(|| stack.resources.keys().rev().cloned().collect());

        for logical_id in order {
            let Some(resource) = stack.resources.remove(&logical_id) else {
                continue;
            };

            let retain = stack
                .document
                .as_ref()
                .and_then(|d| d.resource(&logical_id))
                .map(|entry| match &entry.spec {
                    ResourceSpec::Bucket(spec) => spec.removal_policy == RemovalPolicy::Retain,
                    _ => false,
                })
                .unwrap_or(false);

            if retain {
                log::info!("Retaining '{}' past stack teardown", logical_id);
                state.retained.push(logical_id.clone());
                self.emit(StackEvent::ResourceRetained { logical_id });
                continue;
            }

            if resource.kind == ResourceKind::Bucket {
                let objects = stack
                    .buckets
                    .get(&logical_id)
                    .map(|b| b.len())
                    .unwrap_or(0);
                // Announced before deletion; there is no recovery path.
                self.emit(StackEvent::Warning {
                    message: format!(
                        "Destroying bucket '{}' and its {} objects irreversibly",
                        logical_id, objects
                    ),
                });
                log::warn!(
                    "Destroying bucket '{}' with {} objects; contents are unrecoverable",
                    logical_id,
                    objects
                );
            }

            stack.tables.remove(&logical_id);
            stack.buckets.remove(&logical_id);
            self.emit(StackEvent::ResourceDestroyed { logical_id });
        }

        self.emit(StackEvent::StackDestroyed {
            stack_name: stack_name.to_string(),
        });
        Ok(())
    }
}
