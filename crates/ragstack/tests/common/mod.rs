//! Shared helpers for integration tests.

use ragstack::{
    ActionSet, BucketSpec, FunctionSpec, ImageCode, ResourceToken, StackBuilder, StackDocument,
    TableSpec,
};

/// Builds a minimal valid document: one table, one bucket, one function
/// wired to both. Returns the document plus the function's token.
#[allow(dead_code)]
pub fn minimal_stack(name: &str) -> (StackDocument, ResourceToken) {
    let mut builder = StackBuilder::new(name);
    let table = builder.add_table("table", TableSpec::keyed_by("query_id"));
    let bucket = builder.add_bucket("bucket", BucketSpec::default());
    let function = builder.add_function(
        "fn",
        FunctionSpec::new(ImageCode::from_directory("../image", "app.handler"))
            .with_env("TABLE_NAME", table.reference())
            .with_env("BUCKET_NAME", bucket.reference()),
    );
    builder.grant(&function, &table, ActionSet::read_write());
    builder.grant(&function, &bucket, ActionSet::read_write());
    (builder.build().expect("minimal stack builds"), function)
}
