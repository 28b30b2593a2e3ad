//! # Config module
//!
//! This module provide the control plane configuration of an instance.

use serde_json::{json, Value};

use crate::svc::{
    crd::contour_configuration::{self, ContourConfiguration},
    k8s::store::Store,
    provisioner::{
        failure::StepError,
        model::Instance,
        objects::{self, config_name, envoy_name, metadata},
    },
};

/// returns the configuration, runtime settings are kept verbatim apart from
/// the gateway and envoy service references which are always set
pub fn contour_configuration(instance: &Instance) -> ContourConfiguration {
    let mut settings = instance.runtime_settings.to_owned().unwrap_or_default();

    settings.insert(
        "gateway".to_string(),
        json!({
            "gatewayRef": {
                "namespace": instance.namespace,
                "name": instance.name,
            }
        }),
    );

    let envoy = settings
        .entry("envoy".to_string())
        .or_insert_with(|| json!({}));
    if !envoy.is_object() {
        *envoy = json!({});
    }

    if let Value::Object(envoy) = envoy {
        envoy.insert(
            "service".to_string(),
            json!({
                "namespace": instance.namespace,
                "name": envoy_name(instance),
            }),
        );
    }

    ContourConfiguration {
        metadata: metadata(instance, true, config_name(instance)),
        spec: contour_configuration::Spec::from(settings),
    }
}

pub async fn ensure<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    objects::ensure(store, instance, contour_configuration(instance), &["/spec"], |_, _| {}).await
}

pub async fn delete<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    objects::delete::<_, ContourConfiguration>(
        store,
        instance,
        Some(instance.namespace.as_str()),
        &config_name(instance),
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn runtime_settings_are_kept_and_references_forced() {
        let mut instance = Instance::new("projectcontour", "edge");
        instance.runtime_settings = Some(BTreeMap::from([
            ("xdsServer".to_string(), json!({"type": "envoy"})),
            ("envoy".to_string(), json!({"logging": {"accessLogFormat": "json"}})),
            ("gateway".to_string(), json!({"controllerName": "example.com/other"})),
        ]));

        let config = contour_configuration(&instance);
        let spec = serde_json::to_value(&config.spec).expect("spec to serialize");

        assert_eq!(spec["xdsServer"], json!({"type": "envoy"}));
        assert_eq!(spec["envoy"]["logging"]["accessLogFormat"], "json");
        assert_eq!(
            spec["envoy"]["service"],
            json!({"namespace": "projectcontour", "name": "envoy-edge"})
        );
        assert_eq!(
            spec["gateway"],
            json!({"gatewayRef": {"namespace": "projectcontour", "name": "edge"}})
        );
        assert_eq!(config.metadata.name.as_deref(), Some("contourconfig-edge"));
    }

    #[test]
    fn references_are_set_without_runtime_settings() {
        let config = contour_configuration(&Instance::new("default", "edge"));

        assert_eq!(config.spec.settings.len(), 2);
        assert_eq!(config.spec.settings["envoy"]["service"]["name"], "envoy-edge");
    }
}
