//! ragstack: a typed desired-state topology for a RAG query service.
//!
//! The deployment — a query record table, an artifact bucket, a worker
//! function, an API function behind a public URL, and the permission
//! graph between them — is modeled as an immutable document built once
//! and handed to a provisioning engine. An in-memory engine implements
//! the engine contract for tests and local planning.

pub mod config;
pub mod engine;
pub mod error;
pub mod grant;
pub mod record;
pub mod resource;
pub mod stack;
pub mod topology;
pub mod validation;

pub use config::{FunctionTuning, StackConfig};
pub use engine::{AppliedStack, MemoryEngine, ProvisioningEngine, StackEvent};
pub use error::{Result, StackError};
pub use grant::{Action, ActionSet, Grant, ManagedPolicyAttachment};
pub use record::QueryRecord;
pub use resource::{
    Architecture, AuthMode, BillingMode, BucketSpec, FunctionSpec, FunctionUrlSpec, ImageCode,
    PartitionKey, RemovalPolicy, ResourceKind, ResourceToken, TableSpec,
};
pub use stack::{StackBuilder, StackDocument, StackOutput};
pub use topology::rag_stack;
pub use validation::{StackValidator, StackWarning};
