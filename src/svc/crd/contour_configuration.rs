//! # ContourConfiguration
//!
//! This module provide the control plane configuration custom resource. The
//! provisioner writes one per instance, the control plane reads it at startup.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::{gen::SchemaGenerator, schema::Schema, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::svc::crd::preserve_unknown_fields;

// -----------------------------------------------------------------------------
// Spec structure

/// The content is opaque to the provisioner apart from the gateway and envoy
/// service references it forces.
#[derive(CustomResource, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[kube(group = "projectcontour.io")]
#[kube(version = "v1alpha1")]
#[kube(kind = "ContourConfiguration")]
#[kube(singular = "contourconfiguration")]
#[kube(plural = "contourconfigurations")]
#[kube(shortname = "contourconfig")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
pub struct Spec {
    #[serde(flatten)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl JsonSchema for Spec {
    fn schema_name() -> String {
        "ContourConfigurationSpec".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        preserve_unknown_fields(gen)
    }
}

impl From<BTreeMap<String, serde_json::Value>> for Spec {
    fn from(settings: BTreeMap<String, serde_json::Value>) -> Self {
        Self { settings }
    }
}
