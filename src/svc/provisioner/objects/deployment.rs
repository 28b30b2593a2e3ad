//! # Deployment module
//!
//! This module provide the control plane workload of an instance.

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment},
        core::v1::{
            Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, ObjectFieldSelector,
            PodSecurityContext, PodSpec, PodTemplateSpec, Probe, SecretVolumeSource, Volume,
            VolumeMount,
        },
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use kube::api::ObjectMeta;

use crate::svc::{
    crd::contour_deployment::LogLevel,
    k8s::store::Store,
    provisioner::{
        failure::StepError,
        model::Instance,
        objects::{
            self, config_name, contour_cert_name, contour_name, envoy_name, labels,
            leader_election_name, metadata, selector, CONTOUR_COMPONENT, CONTOUR_METRICS_PORT,
            RUN_AS, XDS_PORT,
        },
        Images,
    },
};

// -----------------------------------------------------------------------------
// Constants

pub const CONTOUR_CONTAINER_NAME: &str = "contour";
pub const CONTOUR_NAMESPACE_ENV: &str = "CONTOUR_NAMESPACE";
pub const POD_NAME_ENV: &str = "POD_NAME";

const CERTIFICATE_VOLUME: &str = "contourcert";
const CERTIFICATE_PATH: &str = "/certs";

/// paths compared strictly on update
pub const OWNED_PATHS: [&str; 4] = [
    "/spec/replicas",
    "/spec/template/spec/nodeSelector",
    "/spec/template/spec/tolerations",
    "/spec/template/spec/containers/0/args",
];

// -----------------------------------------------------------------------------
// Builders

/// returns an environment variable read from a field of the pod
pub fn field_env(name: &str, path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn security_context() -> PodSecurityContext {
    PodSecurityContext {
        run_as_user: Some(RUN_AS),
        run_as_group: Some(RUN_AS),
        run_as_non_root: Some(true),
        ..Default::default()
    }
}

/// returns a rolling update strategy with the given surge
pub fn rolling_update(max_surge: &str) -> DeploymentStrategy {
    DeploymentStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(RollingUpdateDeployment {
            max_surge: Some(IntOrString::String(max_surge.to_string())),
            ..Default::default()
        }),
    }
}

/// returns the arguments of the control plane serve command
pub fn args(instance: &Instance) -> Vec<String> {
    let mut args = vec![
        "serve".to_string(),
        "--incluster".to_string(),
        "--xds-address=0.0.0.0".to_string(),
        format!("--xds-port={XDS_PORT}"),
        format!("--contour-cafile={CERTIFICATE_PATH}/ca.crt"),
        format!("--contour-cert-file={CERTIFICATE_PATH}/tls.crt"),
        format!("--contour-key-file={CERTIFICATE_PATH}/tls.key"),
        format!("--contour-config-name={}", config_name(instance)),
        format!("--leader-election-resource-name={}", leader_election_name(instance)),
        format!("--envoy-service-name={}", envoy_name(instance)),
    ];

    if instance.contour.log_level == LogLevel::Debug {
        args.push("--debug".to_string());
    }

    if instance.contour.kubernetes_log_level > 0 {
        args.push(format!(
            "--kubernetes-debug={}",
            instance.contour.kubernetes_log_level
        ));
    }

    args
}

pub fn deployment(instance: &Instance, images: &Images) -> Deployment {
    let selector = selector(instance, CONTOUR_COMPONENT);
    let mut pod_labels = labels(instance);
    pod_labels.extend(selector.to_owned());

    let placement = instance.contour.node_placement.as_ref();
    let container = Container {
        name: CONTOUR_CONTAINER_NAME.to_string(),
        image: Some(images.contour.to_owned()),
        command: Some(vec!["contour".to_string()]),
        args: Some(args(instance)),
        env: Some(vec![
            field_env(CONTOUR_NAMESPACE_ENV, "metadata.namespace"),
            field_env(POD_NAME_ENV, "metadata.name"),
        ]),
        ports: Some(vec![
            ContainerPort {
                name: Some("xds".to_string()),
                container_port: XDS_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
            ContainerPort {
                name: Some("metrics".to_string()),
                container_port: CONTOUR_METRICS_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
        ]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/healthz".to_string()),
                port: IntOrString::Int(CONTOUR_METRICS_PORT),
                ..Default::default()
            }),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: CERTIFICATE_VOLUME.to_string(),
            mount_path: CERTIFICATE_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        resources: instance.contour.resources.to_owned(),
        ..Default::default()
    };

    Deployment {
        metadata: metadata(instance, true, contour_name(instance)),
        spec: Some(DeploymentSpec {
            replicas: Some(instance.contour.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            strategy: Some(
                instance
                    .contour
                    .strategy
                    .to_owned()
                    .unwrap_or_else(|| rolling_update("50%")),
            ),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    service_account_name: Some(contour_name(instance)),
                    node_selector: placement
                        .filter(|placement| !placement.node_selector.is_empty())
                        .map(|placement| placement.node_selector.to_owned()),
                    tolerations: placement
                        .filter(|placement| !placement.tolerations.is_empty())
                        .map(|placement| placement.tolerations.to_owned()),
                    security_context: Some(security_context()),
                    volumes: Some(vec![Volume {
                        name: CERTIFICATE_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(contour_cert_name(instance)),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

pub async fn ensure<S: Store>(store: &S, instance: &Instance, images: &Images) -> Result<(), StepError> {
    objects::ensure(store, instance, deployment(instance, images), &OWNED_PATHS, |_, _| {}).await
}

pub async fn delete<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    objects::delete::<_, Deployment>(
        store,
        instance,
        Some(instance.namespace.as_str()),
        &contour_name(instance),
    )
    .await
}
