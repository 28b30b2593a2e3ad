//! # Objects module
//!
//! This module provide the manifest builders of the managed resources and the
//! generic create-or-update and delete helpers they share.

use std::collections::BTreeMap;

use kube::{api::ObjectMeta, ResourceExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::svc::{
    k8s::store::{is_not_found, Object, Store},
    provisioner::{failure::StepError, is_owned_by, model::Instance, owner_labels, MANAGED_BY_LABEL},
};

pub mod config;
pub mod dataplane;
pub mod deployment;
pub mod rbac;
pub mod secret;
pub mod service;

// -----------------------------------------------------------------------------
// Constants

pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
pub const APP_INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const APP_COMPONENT_LABEL: &str = "app.kubernetes.io/component";

pub const CONTOUR_COMPONENT: &str = "contour";
pub const ENVOY_COMPONENT: &str = "envoy";

pub const XDS_PORT: i32 = 8001;
pub const CONTOUR_METRICS_PORT: i32 = 8000;
pub const ENVOY_METRICS_PORT: i32 = 8002;

/// non-root identity of every managed container
pub const RUN_AS: i64 = 65534;

// -----------------------------------------------------------------------------
// Names

pub fn contour_name(instance: &Instance) -> String {
    format!("contour-{}", instance.name)
}

pub fn envoy_name(instance: &Instance) -> String {
    format!("envoy-{}", instance.name)
}

pub fn config_name(instance: &Instance) -> String {
    format!("contourconfig-{}", instance.name)
}

/// cluster-scoped names embed the namespace to stay unique
pub fn cluster_role_name(instance: &Instance) -> String {
    format!("contour-{}-{}", instance.namespace, instance.name)
}

pub fn contour_cert_name(instance: &Instance) -> String {
    format!("contourcert-{}", instance.name)
}

pub fn envoy_cert_name(instance: &Instance) -> String {
    format!("envoycert-{}", instance.name)
}

pub fn leader_election_name(instance: &Instance) -> String {
    format!("leader-elect-{}", instance.name)
}

// -----------------------------------------------------------------------------
// Labels and metadata

/// returns the labels stamped on every managed resource
pub fn labels(instance: &Instance) -> BTreeMap<String, String> {
    let mut labels = instance.common_labels.to_owned();

    labels.extend(owner_labels(&instance.namespace, &instance.name));
    labels.insert(
        MANAGED_BY_LABEL.to_string(),
        env!("CARGO_PKG_NAME").to_string(),
    );

    labels
}

/// returns the labels selecting the pods of the given component
pub fn selector(instance: &Instance, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_NAME_LABEL.to_string(), component.to_string()),
        (APP_INSTANCE_LABEL.to_string(), instance.name.to_owned()),
        (APP_COMPONENT_LABEL.to_string(), component.to_string()),
    ])
}

/// returns the metadata of a managed resource, the namespace is unset for
/// cluster-scoped ones
pub fn metadata(instance: &Instance, namespaced: bool, name: String) -> ObjectMeta {
    ObjectMeta {
        namespace: namespaced.then(|| instance.namespace.to_owned()),
        name: Some(name),
        labels: Some(labels(instance)),
        ..Default::default()
    }
}

// -----------------------------------------------------------------------------
// Drift detection

/// returns if every field set on the desired value holds the same value on
/// the live one. Arrays have to match element by element.
pub fn is_subset(live: &Value, desired: &Value) -> bool {
    match (live, desired) {
        (Value::Object(live), Value::Object(desired)) => desired
            .iter()
            .all(|(key, value)| live.get(key).map_or(false, |live| is_subset(live, value))),
        (Value::Array(live), Value::Array(desired)) => {
            live.len() == desired.len()
                && live
                    .iter()
                    .zip(desired.iter())
                    .all(|(live, desired)| is_subset(live, desired))
        }
        (live, desired) => live == desired,
    }
}

/// returns if the live object drifted from the desired one. Paths listed in
/// `owned` are compared strictly, removals included.
pub fn is_drifted<K: Object>(live: &K, desired: &K, owned: &[&str]) -> Result<bool, StepError> {
    let live = serde_json::to_value(live)?;
    let desired = serde_json::to_value(desired)?;

    Ok(!is_subset(&live, &desired)
        || owned
            .iter()
            .any(|path| live.pointer(path) != desired.pointer(path)))
}

/// copy fields managed by others from the live metadata
fn merge_metadata(live: &ObjectMeta, desired: &mut ObjectMeta) {
    desired.resource_version = live.resource_version.to_owned();

    let mut labels = live.labels.to_owned().unwrap_or_default();
    labels.extend(desired.labels.take().unwrap_or_default());
    desired.labels = Some(labels);

    let mut annotations = live.annotations.to_owned().unwrap_or_default();
    annotations.extend(desired.annotations.take().unwrap_or_default());
    desired.annotations = (!annotations.is_empty()).then_some(annotations);
}

// -----------------------------------------------------------------------------
// Helpers functions

/// create the object if it does not exist, else replace it when its owned
/// fields drifted. `carry` copies fields allocated by the cluster from the
/// live object to the one sent.
pub async fn ensure<S, K, F>(
    store: &S,
    instance: &Instance,
    desired: K,
    owned: &[&str],
    carry: F,
) -> Result<(), StepError>
where
    S: Store,
    K: Object,
    F: FnOnce(&K, &mut K) + Send,
{
    let namespace = desired.namespace();
    let name = desired.name_any();
    let kind = K::kind(&());

    let live = match store.get::<K>(namespace.as_deref(), &name).await? {
        Some(live) => live,
        None => {
            store.create(&desired).await?;
            info!(kind = %kind, namespace = ?namespace, name = &name, "Created managed resource");
            return Ok(());
        }
    };

    if !is_owned_by(live.labels(), &instance.namespace, &instance.name) {
        return Err(StepError::NotOwned(format!("{kind}/{name}")));
    }

    if !is_drifted(&live, &desired, owned)? {
        debug!(kind = %kind, namespace = ?namespace, name = &name, "Managed resource is up to date");
        return Ok(());
    }

    let mut updated = desired;
    merge_metadata(live.meta(), updated.meta_mut());
    carry(&live, &mut updated);

    store.replace(&updated).await?;
    info!(kind = %kind, namespace = ?namespace, name = &name, "Updated managed resource");
    Ok(())
}

/// returns the first failure of sub-steps which have all been attempted
pub fn first_error<I>(results: I) -> Result<(), StepError>
where
    I: IntoIterator<Item = Result<(), StepError>>,
{
    results.into_iter().collect()
}

/// delete the object if it exists and is owned by the instance
pub async fn delete<S, K>(
    store: &S,
    instance: &Instance,
    namespace: Option<&str>,
    name: &str,
) -> Result<(), StepError>
where
    S: Store,
    K: Object,
{
    let kind = K::kind(&());
    let live = match store.get::<K>(namespace, name).await? {
        Some(live) => live,
        None => return Ok(()),
    };

    if !is_owned_by(live.labels(), &instance.namespace, &instance.name) {
        debug!(kind = %kind, namespace = ?namespace, name = name, "Skip deletion of resource which is not owned by the gateway");
        return Ok(());
    }

    match store.delete::<K>(namespace, name).await {
        Err(err) if is_not_found(&err) => Ok(()),
        Err(err) => Err(err.into()),
        Ok(()) => {
            info!(kind = %kind, namespace = ?namespace, name = name, "Deleted managed resource");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ConfigMap;
    use serde_json::json;

    use super::*;
    use crate::svc::k8s::store::memory::MemoryStore;

    fn config_map(instance: &Instance, data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: metadata(instance, true, "settings".to_string()),
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn subset_ignores_fields_set_by_the_cluster() {
        let live = json!({"spec": {"replicas": 2, "revisionHistoryLimit": 10, "ports": [{"port": 80, "nodePort": 30080}]}});

        assert!(is_subset(&live, &json!({"spec": {"replicas": 2, "ports": [{"port": 80}]}})));
        assert!(!is_subset(&live, &json!({"spec": {"replicas": 3}})));
        assert!(!is_subset(&live, &json!({"spec": {"ports": [{"port": 80}, {"port": 443}]}})));
        assert!(!is_subset(&live, &json!({"spec": {"paused": true}})));
    }

    #[test]
    fn labels_carry_ownership_and_common_labels() {
        let mut instance = Instance::new("default", "edge");
        instance
            .common_labels
            .insert("team".to_string(), "network".to_string());

        let labels = labels(&instance);
        assert!(is_owned_by(&labels, "default", "edge"));
        assert_eq!(labels.get("team").map(String::as_str), Some("network"));
        assert_eq!(
            labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some(env!("CARGO_PKG_NAME"))
        );
    }

    #[tokio::test]
    async fn ensure_creates_then_keeps_unowned_labels() {
        let store = MemoryStore::default();
        let instance = Instance::new("default", "edge");

        ensure(&store, &instance, config_map(&instance, &[("a", "1")]), &["/data"], |_, _| {})
            .await
            .expect("object to be created");
        assert_eq!(store.writes(), 1);

        ensure(&store, &instance, config_map(&instance, &[("a", "1")]), &["/data"], |_, _| {})
            .await
            .expect("object to be up to date");
        assert_eq!(store.writes(), 1);

        let mut live: ConfigMap = store
            .object(Some("default"), "settings")
            .expect("object to exist");
        live.labels_mut()
            .insert("example.com/audit".to_string(), "true".to_string());
        store.insert(live);

        ensure(&store, &instance, config_map(&instance, &[("a", "2")]), &["/data"], |_, _| {})
            .await
            .expect("object to be updated");
        assert_eq!(store.writes(), 2);

        let live: ConfigMap = store
            .object(Some("default"), "settings")
            .expect("object to exist");
        assert_eq!(live.labels().get("example.com/audit").map(String::as_str), Some("true"));
        assert_eq!(
            live.data.and_then(|data| data.get("a").cloned()).as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn owned_paths_detect_removals() {
        let store = MemoryStore::default();
        let instance = Instance::new("default", "edge");

        ensure(&store, &instance, config_map(&instance, &[("a", "1"), ("b", "2")]), &["/data"], |_, _| {})
            .await
            .expect("object to be created");
        ensure(&store, &instance, config_map(&instance, &[("a", "1")]), &["/data"], |_, _| {})
            .await
            .expect("object to be updated");

        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn foreign_objects_are_neither_updated_nor_deleted() {
        let store = MemoryStore::default();
        let instance = Instance::new("default", "edge");
        let mut foreign = config_map(&instance, &[("a", "1")]);
        foreign.metadata.labels = None;
        store.insert(foreign);

        let err = ensure(&store, &instance, config_map(&instance, &[("a", "2")]), &["/data"], |_, _| {})
            .await
            .expect_err("foreign object to be rejected");
        assert!(matches!(err, StepError::NotOwned(_)));

        delete::<_, ConfigMap>(&store, &instance, Some("default"), "settings")
            .await
            .expect("deletion to be skipped");
        assert!(store.contains::<ConfigMap>(Some("default"), "settings"));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn delete_of_missing_object_succeeds() {
        let store = MemoryStore::default();
        let instance = Instance::new("default", "edge");

        delete::<_, ConfigMap>(&store, &instance, Some("default"), "settings")
            .await
            .expect("missing object to be ignored");
    }
}
