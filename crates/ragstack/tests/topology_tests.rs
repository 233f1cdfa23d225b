//! Table-driven tests for stack document construction and validation.

mod common;

use std::io::Write;

use ragstack::topology::{API_ID, API_URL_ID, BUCKET_ID, QUERY_TABLE_ID, WORKER_ID};
use ragstack::{rag_stack, RemovalPolicy, ResourceKind, StackConfig, StackError, StackWarning};

/// Represents a single config parsing test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The YAML content to parse.
    yaml: &'static str,
    /// Whether parsing should succeed.
    expect_ok: bool,
    /// Check applied to the parsed config.
    check: fn(&StackConfig) -> bool,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "empty_config_uses_reference_defaults",
        yaml: "{}",
        expect_ok: true,
        check: |c| c.worker.memory_mb == 512 && c.api.memory_mb == 256,
    },
    ConfigTestCase {
        name: "worker_sizing_override",
        yaml: "worker:\n  memoryMb: 1024\n  timeoutSecs: 120\n",
        expect_ok: true,
        check: |c| c.worker.memory_mb == 1024 && c.worker.timeout_secs == 120,
    },
    ConfigTestCase {
        name: "retain_policy_override",
        yaml: "bucketRemovalPolicy: retain\n",
        expect_ok: true,
        check: |c| c.bucket_removal_policy == RemovalPolicy::Retain,
    },
    ConfigTestCase {
        name: "arm_architecture",
        yaml: "architecture: arm64\n",
        expect_ok: true,
        check: |c| c.architecture == ragstack::Architecture::Arm64,
    },
    ConfigTestCase {
        name: "malformed_yaml_rejected",
        yaml: "worker: [1, 2\n",
        expect_ok: false,
        check: |_| true,
    },
];

#[test]
fn test_config_parsing_cases() {
    for case in CONFIG_TESTS {
        let result = StackConfig::from_yaml(case.yaml);
        assert_eq!(result.is_ok(), case.expect_ok, "case '{}'", case.name);
        if let Ok(config) = result {
            assert!((case.check)(&config), "case '{}'", case.name);
        }
    }
}

#[test]
fn test_config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "stackName: staging-rag").unwrap();
    writeln!(file, "bucketRemovalPolicy: retain").unwrap();

    let config = StackConfig::load(file.path()).unwrap();
    assert_eq!(config.stack_name, "staging-rag");
    assert_eq!(config.bucket_removal_policy, RemovalPolicy::Retain);
}

#[test]
fn test_config_missing_file_names_path() {
    let err = StackConfig::load("/nonexistent/ragstack.yaml").unwrap_err();
    match err {
        StackError::ReadConfig { path, .. } => {
            assert!(path.to_string_lossy().contains("ragstack.yaml"));
        }
        other => panic!("expected ReadConfig, got {other}"),
    }
}

#[test]
fn test_rag_topology_resource_inventory() {
    let doc = rag_stack(&StackConfig::default()).unwrap();

    let kind_of = |id: &str| doc.resource(id).map(|r| r.kind());
    assert_eq!(kind_of(QUERY_TABLE_ID), Some(ResourceKind::Table));
    assert_eq!(kind_of(BUCKET_ID), Some(ResourceKind::Bucket));
    assert_eq!(kind_of(WORKER_ID), Some(ResourceKind::Function));
    assert_eq!(kind_of(API_ID), Some(ResourceKind::Function));
    assert_eq!(kind_of(API_URL_ID), Some(ResourceKind::FunctionUrl));
}

#[test]
fn test_permission_graph_is_enumerable() {
    let doc = rag_stack(&StackConfig::default()).unwrap();

    // Exactly the expected grants exist and nothing more.
    let mut pairs: Vec<(String, String)> = doc
        .grants
        .iter()
        .map(|g| (g.principal.to_string(), g.target.to_string()))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            (API_ID.to_string(), BUCKET_ID.to_string()),
            (API_ID.to_string(), QUERY_TABLE_ID.to_string()),
            (API_ID.to_string(), WORKER_ID.to_string()),
            (WORKER_ID.to_string(), BUCKET_ID.to_string()),
            (WORKER_ID.to_string(), QUERY_TABLE_ID.to_string()),
        ]
    );

    // The over-broad model-service policy is visible to lints.
    let broad: Vec<&str> = doc
        .warnings()
        .iter()
        .filter_map(|w| match w {
            StackWarning::OverBroadPolicy { logical_id, .. } => Some(logical_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(broad.len(), 2);
    assert!(broad.contains(&WORKER_ID));
    assert!(broad.contains(&API_ID));
}

#[test]
fn test_document_round_trips_through_json() {
    let doc = rag_stack(&StackConfig::default()).unwrap();
    let json = doc.to_json().unwrap();
    let restored: ragstack::StackDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.name, doc.name);
    assert_eq!(restored.resources.len(), doc.resources.len());
    assert_eq!(restored.deploy_order(), doc.deploy_order());
}

#[test]
fn test_minimal_stack_builds() {
    let (doc, function) = common::minimal_stack("mini");
    assert_eq!(doc.resources.len(), 3);
    assert!(doc.resource_by_token(&function).is_some());
    assert_eq!(doc.deploy_order().last().unwrap().as_str(), "fn");
}
