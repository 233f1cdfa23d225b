//! The provisioning interface: apply a desired-state document, destroy a
//! deployed stack.
//!
//! The document side of the contract: declarations are fully resolvable
//! (no forward reference to an undeclared resource) and attribute values
//! are valid for their kind — both enforced when the document is built.
//! The engine side: apply walks the deploy order so a resource
//! referencing another's identity is never created first, re-apply is an
//! idempotent diff, and destroy walks the reverse order.

pub mod events;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::stack::StackDocument;

pub use events::StackEvent;
pub use memory::MemoryEngine;

/// Result of applying a document: resolved outputs plus what changed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedStack {
    /// Unique id of this apply cycle.
    pub apply_id: Uuid,

    /// The stack the document was applied to.
    pub stack_name: String,

    /// Outputs with all token references resolved to physical values.
    pub outputs: BTreeMap<String, String>,

    /// Logical ids created this cycle, in creation order.
    pub created: Vec<String>,

    /// Logical ids that already matched the deployed state.
    pub unchanged: Vec<String>,
}

/// Reconciles desired-state documents against deployed resources.
#[async_trait]
pub trait ProvisioningEngine {
    /// Applies the document: creates missing resources in dependency
    /// order, leaves matching ones untouched, applies grants
    /// idempotently, and resolves outputs. A failure names the resource
    /// it occurred on and leaves no resource half-configured.
    async fn apply(&self, document: &StackDocument) -> Result<AppliedStack>;

    /// Destroys a deployed stack in reverse dependency order. Resources
    /// with a retain policy survive; everything else is gone, including
    /// bucket contents — irreversibly.
    async fn destroy(&self, stack_name: &str) -> Result<()>;
}
