//! # Custom resource definition module
//!
//! This module provide custom resources consumed and produced by the
//! provisioner, their structures and schema helpers.

use schemars::{
    gen::SchemaGenerator,
    schema::{InstanceType, Schema, SchemaObject},
};

pub mod contour_configuration;
pub mod contour_deployment;
pub mod gateway;

// -----------------------------------------------------------------------------
// Constants

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

// -----------------------------------------------------------------------------
// Helpers functions

/// returns an object schema which tells the api server to keep every field,
/// used for the opaque runtime settings which are passed through verbatim.
pub fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        extensions: [(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    }
    .into()
}

#[cfg(test)]
mod tests {
    use schemars::gen::SchemaGenerator;

    use super::*;

    #[test]
    fn preserve_unknown_fields_schema_is_an_open_object() {
        let schema = preserve_unknown_fields(&mut SchemaGenerator::default());
        let value = serde_json::to_value(schema).expect("schema to serialize");

        assert_eq!(value["type"], "object");
        assert_eq!(value["x-kubernetes-preserve-unknown-fields"], true);
    }
}
