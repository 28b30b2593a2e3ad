//! # Provisioner module
//!
//! This module provide the reconciliation engine which provisions a contour
//! instance (a control plane and a data plane) for each gateway of a class
//! handled by this controller.

use std::collections::BTreeMap;

use crate::svc::cfg::Operator;

pub mod failure;
pub mod filter;
pub mod listener;
pub mod model;
pub mod objects;
pub mod orchestrator;
pub mod reconciler;
pub mod status;

// -----------------------------------------------------------------------------
// Constants

pub const FINALIZER: &str = "gateway.projectcontour.io/provisioner";

pub const OWNING_GATEWAY_NAME_LABEL: &str = "projectcontour.io/owning-gateway-name";
pub const OWNING_GATEWAY_NAMESPACE_LABEL: &str = "projectcontour.io/owning-gateway-namespace";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

// -----------------------------------------------------------------------------
// Images structure

/// container images used by the managed workloads
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Images {
    pub contour: String,
    pub envoy: String,
}

impl From<&Operator> for Images {
    fn from(operator: &Operator) -> Self {
        Self {
            contour: operator.contour_image.to_owned(),
            envoy: operator.envoy_image.to_owned(),
        }
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns the labels which bind a managed resource to its gateway
pub fn owner_labels(namespace: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OWNING_GATEWAY_NAME_LABEL.to_string(), name.to_string()),
        (OWNING_GATEWAY_NAMESPACE_LABEL.to_string(), namespace.to_string()),
    ])
}

/// returns if the labels bind the resource to the given gateway
pub fn is_owned_by(labels: &BTreeMap<String, String>, namespace: &str, name: &str) -> bool {
    labels.get(OWNING_GATEWAY_NAME_LABEL).map(String::as_str) == Some(name)
        && labels.get(OWNING_GATEWAY_NAMESPACE_LABEL).map(String::as_str) == Some(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_requires_both_labels() {
        let mut labels = owner_labels("default", "edge");
        assert!(is_owned_by(&labels, "default", "edge"));
        assert!(!is_owned_by(&labels, "other", "edge"));

        labels.remove(OWNING_GATEWAY_NAMESPACE_LABEL);
        assert!(!is_owned_by(&labels, "default", "edge"));
    }
}
