//! # Rbac module
//!
//! This module provide the service accounts, roles and bindings needed by the
//! control plane and the data plane of an instance.

use k8s_openapi::api::{
    core::v1::ServiceAccount,
    rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject},
};

use crate::svc::{
    k8s::store::Store,
    provisioner::{
        failure::StepError,
        model::Instance,
        objects::{self, cluster_role_name, contour_name, envoy_name, metadata},
    },
};

// -----------------------------------------------------------------------------
// Constants

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const READ: [&str; 3] = ["get", "list", "watch"];

// -----------------------------------------------------------------------------
// Builders

fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(groups.iter().map(ToString::to_string).collect()),
        resources: Some(resources.iter().map(ToString::to_string).collect()),
        verbs: verbs.iter().map(ToString::to_string).collect(),
        ..Default::default()
    }
}

fn subject(instance: &Instance) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: contour_name(instance),
        namespace: Some(instance.namespace.to_owned()),
        ..Default::default()
    }
}

pub fn service_account(instance: &Instance, name: String) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(instance, true, name),
        ..Default::default()
    }
}

/// permissions of the control plane on cluster-wide resources
pub fn cluster_role(instance: &Instance) -> ClusterRole {
    ClusterRole {
        metadata: metadata(instance, false, cluster_role_name(instance)),
        rules: Some(vec![
            rule(&[""], &["configmaps", "endpoints", "namespaces", "secrets", "services"], &READ),
            rule(&["discovery.k8s.io"], &["endpointslices"], &READ),
            rule(
                &["gateway.networking.k8s.io"],
                &[
                    "gatewayclasses",
                    "gateways",
                    "httproutes",
                    "referencegrants",
                    "tcproutes",
                    "tlsroutes",
                    "grpcroutes",
                ],
                &READ,
            ),
            rule(
                &["gateway.networking.k8s.io"],
                &[
                    "gatewayclasses/status",
                    "gateways/status",
                    "httproutes/status",
                    "tcproutes/status",
                    "tlsroutes/status",
                    "grpcroutes/status",
                ],
                &["update"],
            ),
            rule(&["networking.k8s.io"], &["ingresses"], &READ),
            rule(&["networking.k8s.io"], &["ingresses/status"], &["create", "get", "update"]),
            rule(
                &["projectcontour.io"],
                &[
                    "contourconfigurations",
                    "extensionservices",
                    "httpproxies",
                    "tlscertificatedelegations",
                ],
                &READ,
            ),
            rule(
                &["projectcontour.io"],
                &[
                    "contourconfigurations/status",
                    "extensionservices/status",
                    "httpproxies/status",
                ],
                &["create", "get", "update"],
            ),
        ]),
        ..Default::default()
    }
}

pub fn cluster_role_binding(instance: &Instance) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: metadata(instance, false, cluster_role_name(instance)),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: cluster_role_name(instance),
        },
        subjects: Some(vec![subject(instance)]),
    }
}

/// permissions of the control plane in the gateway namespace, used by the
/// leader election and the events
pub fn role(instance: &Instance) -> Role {
    Role {
        metadata: metadata(instance, true, contour_name(instance)),
        rules: Some(vec![
            rule(&["coordination.k8s.io"], &["leases"], &["create", "get", "update"]),
            rule(&[""], &["events"], &["create", "get", "update"]),
        ]),
    }
}

pub fn role_binding(instance: &Instance) -> RoleBinding {
    RoleBinding {
        metadata: metadata(instance, true, contour_name(instance)),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: contour_name(instance),
        },
        subjects: Some(vec![subject(instance)]),
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

pub async fn ensure<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    let rules = ["/rules"];
    let binding = ["/roleRef", "/subjects"];

    objects::ensure(store, instance, service_account(instance, contour_name(instance)), &[], |_, _| {}).await?;
    objects::ensure(store, instance, service_account(instance, envoy_name(instance)), &[], |_, _| {}).await?;
    objects::ensure(store, instance, cluster_role(instance), &rules, |_, _| {}).await?;
    objects::ensure(store, instance, cluster_role_binding(instance), &binding, |_, _| {}).await?;
    objects::ensure(store, instance, role(instance), &rules, |_, _| {}).await?;
    objects::ensure(store, instance, role_binding(instance), &binding, |_, _| {}).await
}

pub async fn delete<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    let namespace = Some(instance.namespace.as_str());

    objects::first_error([
        objects::delete::<_, RoleBinding>(store, instance, namespace, &contour_name(instance)).await,
        objects::delete::<_, Role>(store, instance, namespace, &contour_name(instance)).await,
        objects::delete::<_, ClusterRoleBinding>(store, instance, None, &cluster_role_name(instance)).await,
        objects::delete::<_, ClusterRole>(store, instance, None, &cluster_role_name(instance)).await,
        objects::delete::<_, ServiceAccount>(store, instance, namespace, &envoy_name(instance)).await,
        objects::delete::<_, ServiceAccount>(store, instance, namespace, &contour_name(instance)).await,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svc::k8s::store::memory::MemoryStore;

    #[tokio::test]
    async fn cluster_scoped_objects_embed_the_namespace() {
        let store = MemoryStore::default();
        let instance = Instance::new("projectcontour", "edge");

        ensure(&store, &instance).await.expect("rbac to be ensured");
        assert_eq!(store.len(), 6);
        assert!(store.contains::<ClusterRole>(None, "contour-projectcontour-edge"));
        assert!(store.contains::<ServiceAccount>(Some("projectcontour"), "envoy-edge"));

        let binding: ClusterRoleBinding = store
            .object(None, "contour-projectcontour-edge")
            .expect("binding to exist");
        let subject = &binding.subjects.expect("subjects")[0];
        assert_eq!(subject.name, "contour-edge");
        assert_eq!(subject.namespace.as_deref(), Some("projectcontour"));

        delete(&store, &instance).await.expect("rbac to be deleted");
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn failed_delete_does_not_stop_the_others() {
        let store = MemoryStore::default();
        let instance = Instance::new("projectcontour", "edge");

        ensure(&store, &instance).await.expect("rbac to be ensured");
        store.fail_writes::<RoleBinding>(503);

        let err = delete(&store, &instance).await.expect_err("role binding deletion to fail");
        assert!(matches!(err, StepError::Kube(_)));

        assert_eq!(store.len(), 1);
        assert!(store.contains::<RoleBinding>(Some("projectcontour"), "contour-edge"));
        assert!(!store.contains::<Role>(Some("projectcontour"), "contour-edge"));
        assert!(!store.contains::<ClusterRole>(None, "contour-projectcontour-edge"));
        assert!(!store.contains::<ServiceAccount>(Some("projectcontour"), "contour-edge"));
    }
}
