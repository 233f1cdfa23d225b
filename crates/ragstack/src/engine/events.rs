//! Engine progress events, broadcast to subscribers during apply and
//! destroy so an embedder can surface them to an operator.

use serde::Serialize;

/// One step of an apply or destroy cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StackEvent {
    /// A resource was created with its physical name.
    ResourceCreated {
        logical_id: String,
        physical_name: String,
    },
    /// A re-applied resource matched the deployed state; nothing changed.
    ResourceUnchanged { logical_id: String },
    /// A grant was applied (idempotently).
    GrantApplied { principal: String, target: String },
    /// A deploy-time output was resolved.
    OutputResolved { name: String, value: String },
    /// A non-fatal finding surfaced during the operation. Destructive
    /// teardown is always announced through this before it happens.
    Warning { message: String },
    /// A resource was destroyed.
    ResourceDestroyed { logical_id: String },
    /// A resource was left in place due to its retain policy.
    ResourceRetained { logical_id: String },
    /// The whole stack was destroyed.
    StackDestroyed { stack_name: String },
}
