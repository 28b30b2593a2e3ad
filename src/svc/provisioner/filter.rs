//! # Filter module
//!
//! This module provide predicates deciding which gateway and gateway class
//! changes trigger a reconciliation, and the mappings from watched objects to
//! the gateways to reconcile.

use std::sync::Arc;

use kube::{runtime::reflector::ObjectRef, Resource, ResourceExt};
use tracing::{debug, warn};

use crate::svc::{
    crd::{
        gateway::{Gateway, GatewayClass, GATEWAY_CLASS_CONDITION_ACCEPTED},
        CONDITION_TRUE,
    },
    k8s::store::Store,
    provisioner::{OWNING_GATEWAY_NAMESPACE_LABEL, OWNING_GATEWAY_NAME_LABEL},
};

/// returns if the class is handled by the controller and has been accepted
pub fn is_class_reconcilable(controller: &str, class: &GatewayClass) -> bool {
    if class.spec.controller_name != controller {
        return false;
    }

    class
        .status
        .iter()
        .flat_map(|status| status.conditions.iter())
        .find(|condition| condition.type_ == GATEWAY_CLASS_CONDITION_ACCEPTED)
        .map_or(false, |condition| condition.status == CONDITION_TRUE)
}

/// returns if the class of the gateway is reconcilable, a lookup failure is
/// logged and counts as not reconcilable
pub async fn is_gateway_reconcilable<S: Store>(store: &S, controller: &str, gateway: &Gateway) -> bool {
    let class_name = &gateway.spec.gateway_class_name;

    match store.get::<GatewayClass>(None, class_name).await {
        Ok(Some(class)) => is_class_reconcilable(controller, &class),
        Ok(None) => {
            debug!(class = class_name, gateway = gateway.name_any(), "Gateway class of gateway does not exist");
            false
        }
        Err(err) => {
            warn!(class = class_name, gateway = gateway.name_any(), error = err.to_string(), "Failed to retrieve gateway class of gateway");
            false
        }
    }
}

/// returns the references of the known gateways using the class, nothing when
/// the class is not reconcilable
pub fn gateways_for_class(
    controller: &str,
    class: &GatewayClass,
    gateways: &[Arc<Gateway>],
) -> Vec<ObjectRef<Gateway>> {
    if !is_class_reconcilable(controller, class) {
        return vec![];
    }

    let class_name = class.name_any();
    gateways
        .iter()
        .filter(|gateway| gateway.spec.gateway_class_name == class_name)
        .map(|gateway| ObjectRef::from_obj(gateway.as_ref()))
        .collect()
}

/// returns the reference of the gateway owning the managed resource
pub fn owning_gateway<K: Resource>(obj: &K) -> Option<ObjectRef<Gateway>> {
    let labels = obj.meta().labels.as_ref()?;
    let name = labels.get(OWNING_GATEWAY_NAME_LABEL)?;
    let namespace = labels.get(OWNING_GATEWAY_NAMESPACE_LABEL)?;

    Some(ObjectRef::new(name).within(namespace))
}
