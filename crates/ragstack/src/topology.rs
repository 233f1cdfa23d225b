//! The concrete RAG query-service topology.
//!
//! One table for query records, one bucket for artifacts, a worker
//! function running the retrieval/generation pipeline, an API function
//! behind a public URL, and the grants wiring them together.

use crate::config::StackConfig;
use crate::error::Result;
use crate::grant::ActionSet;
use crate::resource::{
    AuthMode, BucketSpec, FunctionSpec, FunctionUrlSpec, ImageCode, TableSpec,
};
use crate::stack::{StackBuilder, StackDocument};
use crate::validation::{ENV_BUCKET_NAME, ENV_TABLE_NAME, ENV_WORKER_NAME};

/// Logical id of the query record table.
pub const QUERY_TABLE_ID: &str = "rag-query-table";
/// Logical id of the artifact bucket.
pub const BUCKET_ID: &str = "rag-bucket";
/// Logical id of the worker function.
pub const WORKER_ID: &str = "rag-worker";
/// Logical id of the API function.
pub const API_ID: &str = "rag-api";
/// Logical id of the public entry point.
pub const API_URL_ID: &str = "rag-api-url";
/// Name of the deploy-time output carrying the entry point URL.
pub const FUNCTION_URL_OUTPUT: &str = "FunctionUrl";

/// Entry command for the worker handler inside the shared image.
const WORKER_HANDLER: &str = "app_work_handler.handler";
/// Entry command for the API handler inside the shared image.
const API_HANDLER: &str = "app_api_handler.handler";

/// Broad managed policy for the external AI model service. A prototyping
/// shortcut, not least privilege; building the document flags it.
const MODEL_SERVICE_POLICY: &str = "AmazonBedrockFullAccess";

/// Partition key attribute of the query record table.
pub const QUERY_ID_ATTRIBUTE: &str = "query_id";

/// Builds the desired-state document for the RAG query service.
///
/// Dependency order falls out of the token references: the stores are
/// leaves, the worker references both, the API references both plus the
/// worker's identity, and the URL references the API.
pub fn rag_stack(config: &StackConfig) -> Result<StackDocument> {
    let mut stack = StackBuilder::new(&config.stack_name);

    // Table storing the query data and results.
    let table = stack.add_table(QUERY_TABLE_ID, TableSpec::keyed_by(QUERY_ID_ATTRIBUTE));

    // Bucket storing the files the pipeline reads and writes.
    let bucket = stack.add_bucket(
        BUCKET_ID,
        BucketSpec {
            versioned: config.bucket_versioned,
            removal_policy: config.bucket_removal_policy,
        },
    );

    // Worker function runs the retrieval/generation logic. Same base
    // image as the API, selected by entry command.
    let worker = stack.add_function(
        WORKER_ID,
        FunctionSpec::new(ImageCode {
            directory: config.image_directory.clone(),
            cmd: vec![WORKER_HANDLER.to_string()],
            platform: config.architecture.platform(),
        })
        .with_memory_mb(config.worker.memory_mb)
        .with_timeout_secs(config.worker.timeout_secs)
        .with_architecture(config.architecture)
        .with_env(ENV_TABLE_NAME, table.reference())
        .with_env(ENV_BUCKET_NAME, bucket.reference()),
    );

    // API function handles HTTP requests and triggers the worker
    // asynchronously by the identity resolved here at declare time.
    let api = stack.add_function(
        API_ID,
        FunctionSpec::new(ImageCode {
            directory: config.image_directory.clone(),
            cmd: vec![API_HANDLER.to_string()],
            platform: config.architecture.platform(),
        })
        .with_memory_mb(config.api.memory_mb)
        .with_timeout_secs(config.api.timeout_secs)
        .with_architecture(config.architecture)
        .with_env(ENV_TABLE_NAME, table.reference())
        .with_env(ENV_BUCKET_NAME, bucket.reference())
        .with_env(ENV_WORKER_NAME, worker.reference()),
    );

    // Public URL for the API function. Unauthenticated by design;
    // callers poll the table for results rather than waiting on the worker.
    let url = stack.add_function_url(
        API_URL_ID,
        FunctionUrlSpec {
            function: api.clone(),
            auth: AuthMode::None,
        },
    );

    // Least-privilege grants wiring the resources together.
    stack.grant(&worker, &table, ActionSet::read_write());
    stack.grant(&api, &table, ActionSet::read_write());
    stack.grant(&worker, &bucket, ActionSet::read_write());
    stack.grant(&api, &bucket, ActionSet::read_write());
    stack.grant(&api, &worker, ActionSet::invoke());

    // Model service access for both functions.
    stack.attach_managed_policy(&worker, MODEL_SERVICE_POLICY);
    stack.attach_managed_policy(&api, MODEL_SERVICE_POLICY);

    // The URL is the one piece of deploy-time state an operator needs.
    stack.output(FUNCTION_URL_OUTPUT, url.reference());

    stack.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::Action;
    use crate::resource::{RemovalPolicy, ResourceKind};
    use crate::validation::StackWarning;

    #[test]
    fn test_topology_builds_with_defaults() {
        let doc = rag_stack(&StackConfig::default()).unwrap();
        assert_eq!(doc.resources.len(), 5);
        assert_eq!(doc.grants.len(), 5);
        assert_eq!(doc.managed_policies.len(), 2);
        assert_eq!(doc.outputs.len(), 1);
    }

    #[test]
    fn test_worker_precedes_api_in_deploy_order() {
        let doc = rag_stack(&StackConfig::default()).unwrap();
        let order = doc.deploy_order();
        let pos = |id: &str| order.iter().position(|o| o.as_str() == id).unwrap();
        assert!(pos(QUERY_TABLE_ID) < pos(WORKER_ID));
        assert!(pos(BUCKET_ID) < pos(WORKER_ID));
        assert!(pos(WORKER_ID) < pos(API_ID));
        assert!(pos(API_ID) < pos(API_URL_ID));
    }

    #[test]
    fn test_invoke_grant_is_one_directional() {
        let doc = rag_stack(&StackConfig::default()).unwrap();
        let api = doc.resource(API_ID).unwrap().token.clone();
        let worker = doc.resource(WORKER_ID).unwrap().token.clone();
        assert!(doc
            .grants
            .iter()
            .any(|g| g.allows(&api, &worker, Action::Invoke)));
        assert!(!doc
            .grants
            .iter()
            .any(|g| g.allows(&worker, &api, Action::Invoke)));
    }

    #[test]
    fn test_env_contract() {
        let doc = rag_stack(&StackConfig::default()).unwrap();
        for id in [WORKER_ID, API_ID] {
            let entry = doc.resource(id).unwrap();
            let crate::resource::ResourceSpec::Function(spec) = &entry.spec else {
                panic!("{} is not a function", id);
            };
            assert!(spec.environment.contains_key(ENV_TABLE_NAME));
            assert!(spec.environment.contains_key(ENV_BUCKET_NAME));
        }
        let crate::resource::ResourceSpec::Function(api) =
            &doc.resource(API_ID).unwrap().spec
        else {
            unreachable!()
        };
        assert_eq!(
            api.environment.get(ENV_WORKER_NAME).unwrap(),
            &doc.resource(WORKER_ID).unwrap().token.reference()
        );
    }

    #[test]
    fn test_default_build_flags_shortcuts() {
        let doc = rag_stack(&StackConfig::default()).unwrap();
        let warnings = doc.warnings();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, StackWarning::DestructiveRemoval { .. })));
        assert!(warnings
            .iter()
            .any(|w| matches!(w, StackWarning::UnauthenticatedUrl { .. })));
        assert_eq!(
            warnings
                .iter()
                .filter(|w| matches!(w, StackWarning::OverBroadPolicy { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_retain_policy_is_configurable() {
        let config = StackConfig {
            bucket_removal_policy: RemovalPolicy::Retain,
            ..StackConfig::default()
        };
        let doc = rag_stack(&config).unwrap();
        assert!(!doc
            .warnings()
            .iter()
            .any(|w| matches!(w, StackWarning::DestructiveRemoval { .. })));
        let crate::resource::ResourceSpec::Bucket(bucket) =
            &doc.resource(BUCKET_ID).unwrap().spec
        else {
            unreachable!()
        };
        assert_eq!(bucket.removal_policy, RemovalPolicy::Retain);
    }

    #[test]
    fn test_document_serializes() {
        let doc = rag_stack(&StackConfig::default()).unwrap();
        let json = doc.to_json().unwrap();
        assert!(json.contains(QUERY_ID_ATTRIBUTE));
        let kinds: Vec<ResourceKind> = doc.resources.iter().map(|r| r.kind()).collect();
        assert!(kinds.contains(&ResourceKind::FunctionUrl));
    }
}
