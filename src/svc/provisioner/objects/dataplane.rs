//! # Data plane module
//!
//! This module provide the envoy workload of an instance, run either as a
//! daemon set or as a deployment.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{
            DaemonSet, DaemonSetSpec, DaemonSetUpdateStrategy, Deployment, DeploymentSpec,
            RollingUpdateDaemonSet,
        },
        core::v1::{
            Container, ContainerPort, EmptyDirVolumeSource, ExecAction, HTTPGetAction, Lifecycle,
            LifecycleHandler, PodSpec, PodTemplateSpec, Probe, SecretVolumeSource, Volume,
            VolumeMount,
        },
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use kube::api::ObjectMeta;

use crate::svc::{
    crd::contour_deployment::WorkloadType,
    k8s::store::Store,
    provisioner::{
        failure::StepError,
        model::{Instance, HTTPS_PORT_NAME, HTTP_PORT_NAME},
        objects::{
            self, contour_name,
            deployment::{field_env, rolling_update, security_context, CONTOUR_NAMESPACE_ENV},
            envoy_cert_name, envoy_name, labels, metadata, selector, ENVOY_COMPONENT,
            ENVOY_METRICS_PORT, XDS_PORT,
        },
        Images,
    },
};

// -----------------------------------------------------------------------------
// Constants

pub const ENVOY_CONTAINER_NAME: &str = "envoy";
pub const SHUTDOWN_CONTAINER_NAME: &str = "shutdown-manager";
pub const INIT_CONTAINER_NAME: &str = "envoy-initconfig";
pub const ENVOY_POD_NAME_ENV: &str = "ENVOY_POD_NAME";

const CONFIG_VOLUME: &str = "envoy-config";
const CONFIG_PATH: &str = "/config";
const CERTIFICATE_VOLUME: &str = "envoycert";
const CERTIFICATE_PATH: &str = "/certs";
const ADMIN_VOLUME: &str = "envoy-admin";
const ADMIN_PATH: &str = "/admin";

const TERMINATION_GRACE_PERIOD: i64 = 300;

/// paths compared strictly on update. Volumes are left out as the api server
/// fills defaults in them, a removed volume still changes the array length.
pub const OWNED_PATHS: [&str; 4] = [
    "/spec/replicas",
    "/spec/template/spec/nodeSelector",
    "/spec/template/spec/tolerations",
    "/spec/template/spec/containers/1/volumeMounts",
];

// -----------------------------------------------------------------------------
// Builders

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn port(name: &str, container_port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// returns the annotations of the data plane pods
pub fn pod_annotations(instance: &Instance) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([
        ("prometheus.io/scrape".to_string(), "true".to_string()),
        ("prometheus.io/port".to_string(), ENVOY_METRICS_PORT.to_string()),
        ("prometheus.io/path".to_string(), "/stats/prometheus".to_string()),
    ]);

    annotations.extend(instance.envoy.pod_annotations.to_owned());
    annotations
}

/// returns the pod template shared by both workload types
pub fn template(instance: &Instance, images: &Images) -> PodTemplateSpec {
    let mut pod_labels = labels(instance);
    pod_labels.extend(selector(instance, ENVOY_COMPONENT));

    let init = Container {
        name: INIT_CONTAINER_NAME.to_string(),
        image: Some(images.contour.to_owned()),
        command: Some(vec!["contour".to_string()]),
        args: Some(vec![
            "bootstrap".to_string(),
            format!("{CONFIG_PATH}/envoy.json"),
            format!("--xds-address={}", contour_name(instance)),
            format!("--xds-port={XDS_PORT}"),
            "--xds-resource-version=v3".to_string(),
            format!("--resources-dir={CONFIG_PATH}/resources"),
            format!("--envoy-cafile={CERTIFICATE_PATH}/ca.crt"),
            format!("--envoy-cert-file={CERTIFICATE_PATH}/tls.crt"),
            format!("--envoy-key-file={CERTIFICATE_PATH}/tls.key"),
        ]),
        env: Some(vec![field_env(CONTOUR_NAMESPACE_ENV, "metadata.namespace")]),
        volume_mounts: Some(vec![
            mount(CONFIG_VOLUME, CONFIG_PATH, false),
            mount(CERTIFICATE_VOLUME, CERTIFICATE_PATH, true),
        ]),
        ..Default::default()
    };

    let shutdown = Container {
        name: SHUTDOWN_CONTAINER_NAME.to_string(),
        image: Some(images.contour.to_owned()),
        command: Some(vec!["/bin/contour".to_string()]),
        args: Some(vec!["envoy".to_string(), "shutdown-manager".to_string()]),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec![
                        "/bin/contour".to_string(),
                        "envoy".to_string(),
                        "shutdown".to_string(),
                    ]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        volume_mounts: Some(vec![mount(ADMIN_VOLUME, ADMIN_PATH, false)]),
        ..Default::default()
    };

    let mut envoy_mounts = vec![
        mount(CONFIG_VOLUME, CONFIG_PATH, true),
        mount(CERTIFICATE_VOLUME, CERTIFICATE_PATH, true),
        mount(ADMIN_VOLUME, ADMIN_PATH, false),
    ];
    envoy_mounts.extend(instance.envoy.extra_volume_mounts.to_owned());

    let envoy = Container {
        name: ENVOY_CONTAINER_NAME.to_string(),
        image: Some(images.envoy.to_owned()),
        command: Some(vec!["envoy".to_string()]),
        args: Some(vec![
            "-c".to_string(),
            format!("{CONFIG_PATH}/envoy.json"),
            format!("--service-cluster $({CONTOUR_NAMESPACE_ENV})"),
            format!("--service-node $({ENVOY_POD_NAME_ENV})"),
            "--log-level info".to_string(),
        ]),
        env: Some(vec![
            field_env(CONTOUR_NAMESPACE_ENV, "metadata.namespace"),
            field_env(ENVOY_POD_NAME_ENV, "metadata.name"),
        ]),
        ports: Some(vec![
            port(HTTP_PORT_NAME, instance.envoy.http_container_port),
            port(HTTPS_PORT_NAME, instance.envoy.https_container_port),
            port("metrics", ENVOY_METRICS_PORT),
        ]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/ready".to_string()),
                port: IntOrString::Int(ENVOY_METRICS_PORT),
                ..Default::default()
            }),
            ..Default::default()
        }),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                http_get: Some(HTTPGetAction {
                    path: Some("/shutdown".to_string()),
                    port: IntOrString::Int(8090),
                    scheme: Some("HTTP".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        volume_mounts: Some(envoy_mounts),
        resources: instance.envoy.resources.to_owned(),
        ..Default::default()
    };

    let mut volumes = vec![
        Volume {
            name: CONFIG_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        Volume {
            name: CERTIFICATE_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(envoy_cert_name(instance)),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: ADMIN_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    ];
    volumes.extend(instance.envoy.extra_volumes.to_owned());

    let placement = instance.envoy.node_placement.as_ref();
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(pod_labels),
            annotations: Some(pod_annotations(instance)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            init_containers: Some(vec![init]),
            containers: vec![shutdown, envoy],
            service_account_name: Some(envoy_name(instance)),
            automount_service_account_token: Some(false),
            termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD),
            node_selector: placement
                .filter(|placement| !placement.node_selector.is_empty())
                .map(|placement| placement.node_selector.to_owned()),
            tolerations: placement
                .filter(|placement| !placement.tolerations.is_empty())
                .map(|placement| placement.tolerations.to_owned()),
            security_context: Some(security_context()),
            volumes: Some(volumes),
            ..Default::default()
        }),
    }
}

fn label_selector(instance: &Instance) -> LabelSelector {
    LabelSelector {
        match_labels: Some(selector(instance, ENVOY_COMPONENT)),
        ..Default::default()
    }
}

pub fn daemon_set(instance: &Instance, images: &Images) -> DaemonSet {
    DaemonSet {
        metadata: metadata(instance, true, envoy_name(instance)),
        spec: Some(DaemonSetSpec {
            selector: label_selector(instance),
            template: template(instance, images),
            update_strategy: Some(instance.envoy.update_strategy.to_owned().unwrap_or_else(|| {
                DaemonSetUpdateStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(RollingUpdateDaemonSet {
                        max_unavailable: Some(IntOrString::String("10%".to_string())),
                        ..Default::default()
                    }),
                }
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn deployment(instance: &Instance, images: &Images) -> Deployment {
    Deployment {
        metadata: metadata(instance, true, envoy_name(instance)),
        spec: Some(DeploymentSpec {
            replicas: Some(instance.envoy.replicas),
            selector: label_selector(instance),
            template: template(instance, images),
            strategy: Some(
                instance
                    .envoy
                    .strategy
                    .to_owned()
                    .unwrap_or_else(|| rolling_update("10%")),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// ensure the workload of the model type and remove the one of the other type
pub async fn ensure<S: Store>(store: &S, instance: &Instance, images: &Images) -> Result<(), StepError> {
    let namespace = Some(instance.namespace.as_str());
    let name = envoy_name(instance);

    match instance.envoy.workload_type {
        WorkloadType::DaemonSet => {
            objects::ensure(store, instance, daemon_set(instance, images), &OWNED_PATHS, |_, _| {}).await?;
            objects::delete::<_, Deployment>(store, instance, namespace, &name).await
        }
        WorkloadType::Deployment => {
            objects::ensure(store, instance, deployment(instance, images), &OWNED_PATHS, |_, _| {}).await?;
            objects::delete::<_, DaemonSet>(store, instance, namespace, &name).await
        }
    }
}

pub async fn delete<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    let namespace = Some(instance.namespace.as_str());
    let name = envoy_name(instance);

    objects::first_error([
        objects::delete::<_, DaemonSet>(store, instance, namespace, &name).await,
        objects::delete::<_, Deployment>(store, instance, namespace, &name).await,
    ])
}
