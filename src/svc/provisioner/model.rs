//! # Model module
//!
//! This module provide the provisioning model of an instance. It is rebuilt
//! from the gateway and the optional class parameters on each reconciliation
//! and is the only input of the manifest builders.

use std::collections::BTreeMap;

use k8s_openapi::api::{
    apps::v1::{DaemonSetUpdateStrategy, DeploymentStrategy},
    core::v1::{ResourceRequirements, Volume, VolumeMount},
};

use crate::svc::{
    crd::{
        contour_deployment::{
            ContourDeployment, LogLevel, NetworkPublishingType, NodePlacement, WorkloadType,
        },
        gateway::{Gateway, ADDRESS_TYPE_HOSTNAME, ADDRESS_TYPE_IP},
    },
    provisioner::listener::{self, Validation},
};

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_CONTOUR_REPLICAS: i32 = 2;
pub const DEFAULT_ENVOY_REPLICAS: i32 = 2;
pub const DEFAULT_HTTP_CONTAINER_PORT: i32 = 8080;
pub const DEFAULT_HTTPS_CONTAINER_PORT: i32 = 8443;

pub const HTTP_PORT_NAME: &str = "http";
pub const HTTPS_PORT_NAME: &str = "https";

// -----------------------------------------------------------------------------
// Port structure

/// a port exposed by the data plane service
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Port {
    pub name: String,
    pub port: i32,
    pub container_port: i32,
    pub node_port: Option<i32>,
}

// -----------------------------------------------------------------------------
// Contour structure

/// control plane part of the model
#[derive(PartialEq, Clone, Debug)]
pub struct Contour {
    pub replicas: i32,
    pub node_placement: Option<NodePlacement>,
    pub log_level: LogLevel,
    pub kubernetes_log_level: u8,
    /// replaces the default rolling update of the deployment when set
    pub strategy: Option<DeploymentStrategy>,
    pub resources: Option<ResourceRequirements>,
}

impl Default for Contour {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_CONTOUR_REPLICAS,
            node_placement: None,
            log_level: LogLevel::default(),
            kubernetes_log_level: 0,
            strategy: None,
            resources: None,
        }
    }
}

// -----------------------------------------------------------------------------
// Envoy structure

/// data plane part of the model
#[derive(PartialEq, Clone, Debug)]
pub struct Envoy {
    pub workload_type: WorkloadType,
    pub replicas: i32,
    pub publishing: NetworkPublishingType,
    pub service_annotations: BTreeMap<String, String>,
    /// requested load balancer address
    pub address: Option<String>,
    /// service ports, at most one per name
    pub ports: Vec<Port>,
    pub http_container_port: i32,
    pub https_container_port: i32,
    pub node_placement: Option<NodePlacement>,
    pub extra_volumes: Vec<Volume>,
    pub extra_volume_mounts: Vec<VolumeMount>,
    pub pod_annotations: BTreeMap<String, String>,
    pub resources: Option<ResourceRequirements>,
    pub update_strategy: Option<DaemonSetUpdateStrategy>,
    pub strategy: Option<DeploymentStrategy>,
}

impl Default for Envoy {
    fn default() -> Self {
        Self {
            workload_type: WorkloadType::default(),
            replicas: DEFAULT_ENVOY_REPLICAS,
            publishing: NetworkPublishingType::default(),
            service_annotations: BTreeMap::new(),
            address: None,
            ports: vec![],
            http_container_port: DEFAULT_HTTP_CONTAINER_PORT,
            https_container_port: DEFAULT_HTTPS_CONTAINER_PORT,
            node_placement: None,
            extra_volumes: vec![],
            extra_volume_mounts: vec![],
            pod_annotations: BTreeMap::new(),
            resources: None,
            update_strategy: None,
            strategy: None,
        }
    }
}

// -----------------------------------------------------------------------------
// Instance structure

/// the normalized provisioning model of one gateway
#[derive(PartialEq, Clone, Debug)]
pub struct Instance {
    pub namespace: String,
    pub name: String,
    pub common_labels: BTreeMap<String, String>,
    pub runtime_settings: Option<BTreeMap<String, serde_json::Value>>,
    pub contour: Contour,
    pub envoy: Envoy,
}

impl Instance {
    /// returns the default model of the gateway identified by the given key
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            common_labels: BTreeMap::new(),
            runtime_settings: None,
            contour: Contour::default(),
            envoy: Envoy::default(),
        }
    }
}

// -----------------------------------------------------------------------------
// Built structure

#[derive(PartialEq, Clone, Debug)]
pub struct Built {
    pub instance: Instance,
    pub listeners: Validation,
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns the provisioning model of the gateway. Layering is defaults, then
/// values derived from the gateway, then the class parameters.
pub fn build(gateway: &Gateway, parameters: Option<&ContourDeployment>) -> Built {
    let namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    let name = gateway.metadata.name.as_deref().unwrap_or_default();
    let mut instance = Instance::new(namespace, name);

    // only the first address is honored
    if let Some(address) = gateway.spec.addresses.first() {
        match address.type_.as_deref() {
            None | Some(ADDRESS_TYPE_IP) | Some(ADDRESS_TYPE_HOSTNAME) => {
                instance.envoy.address = Some(address.value.to_owned());
            }
            Some(_) => {}
        }
    }

    let validation = listener::validate(&gateway.spec.listeners);
    if let Some(port) = validation.insecure_port {
        instance.envoy.ports.push(Port {
            name: HTTP_PORT_NAME.to_string(),
            port,
            container_port: DEFAULT_HTTP_CONTAINER_PORT,
            node_port: None,
        });
    }

    if let Some(port) = validation.secure_port {
        instance.envoy.ports.push(Port {
            name: HTTPS_PORT_NAME.to_string(),
            port,
            container_port: DEFAULT_HTTPS_CONTAINER_PORT,
            node_port: None,
        });
    }

    if let Some(parameters) = parameters {
        apply(&mut instance, parameters);
    }

    Built {
        instance,
        listeners: validation,
    }
}

/// layer the non-empty fields of the class parameters on top of the model
fn apply(instance: &mut Instance, parameters: &ContourDeployment) {
    let spec = &parameters.spec;

    instance.runtime_settings = spec.runtime_settings.to_owned();
    if !spec.common_labels.is_empty() {
        instance.common_labels = spec.common_labels.to_owned();
    }

    if let Some(contour) = &spec.contour {
        if contour.replicas > 0 {
            instance.contour.replicas = contour.replicas;
        }

        if contour.node_placement.is_some() {
            instance.contour.node_placement = contour.node_placement.to_owned();
        }

        if let Some(level) = contour.log_level {
            instance.contour.log_level = level;
        }

        if contour.kubernetes_log_level > 0 {
            instance.contour.kubernetes_log_level = contour.kubernetes_log_level;
        }

        if contour.strategy.is_some() {
            instance.contour.strategy = contour.strategy.to_owned();
        }

        if contour.resources.is_some() {
            instance.contour.resources = contour.resources.to_owned();
        }
    }

    if let Some(envoy) = &spec.envoy {
        if let Some(workload_type) = envoy.workload_type {
            instance.envoy.workload_type = workload_type;
        }

        if envoy.workload_type == Some(WorkloadType::Deployment) && envoy.replicas > 0 {
            instance.envoy.replicas = envoy.replicas;
        }

        if let Some(publishing) = &envoy.network_publishing {
            if let Some(type_) = publishing.type_ {
                instance.envoy.publishing = type_;
            }

            if !publishing.service_annotations.is_empty() {
                instance.envoy.service_annotations = publishing.service_annotations.to_owned();
            }

            for port in &publishing.ports {
                if port.container_port > 0 {
                    match port.name.as_str() {
                        HTTP_PORT_NAME => instance.envoy.http_container_port = port.container_port,
                        HTTPS_PORT_NAME => instance.envoy.https_container_port = port.container_port,
                        _ => {}
                    }
                }

                if let Some(exposed) = instance.envoy.ports.iter_mut().find(|p| p.name == port.name) {
                    if port.container_port > 0 {
                        exposed.container_port = port.container_port;
                    }

                    if let Some(node_port) = port.node_port.filter(|node_port| *node_port > 0) {
                        exposed.node_port = Some(node_port);
                    }
                }
            }
        }

        if envoy.node_placement.is_some() {
            instance.envoy.node_placement = envoy.node_placement.to_owned();
        }

        if !envoy.extra_volumes.is_empty() {
            instance.envoy.extra_volumes = envoy.extra_volumes.to_owned();
        }

        if !envoy.extra_volume_mounts.is_empty() {
            instance.envoy.extra_volume_mounts = envoy.extra_volume_mounts.to_owned();
        }

        if !envoy.pod_annotations.is_empty() {
            instance.envoy.pod_annotations = envoy.pod_annotations.to_owned();
        }

        if envoy.resources.is_some() {
            instance.envoy.resources = envoy.resources.to_owned();
        }

        if envoy.update_strategy.is_some() {
            instance.envoy.update_strategy = envoy.update_strategy.to_owned();
        }

        if envoy.strategy.is_some() {
            instance.envoy.strategy = envoy.strategy.to_owned();
        }
    }
}

#[cfg(test)]
mod tests {
    use kube::api::ObjectMeta;

    use super::*;
    use crate::svc::crd::{
        contour_deployment::{self, ContourSettings, EnvoySettings, NetworkPublishing},
        gateway::{GatewayAddress, GatewaySpec, Listener, PROTOCOL_HTTP, PROTOCOL_HTTPS},
    };

    fn gateway(listeners: Vec<Listener>, addresses: Vec<GatewayAddress>) -> Gateway {
        Gateway {
            metadata: ObjectMeta {
                namespace: Some("projectcontour".to_string()),
                name: Some("edge".to_string()),
                ..Default::default()
            },
            spec: GatewaySpec {
                gateway_class_name: "contour".to_string(),
                listeners,
                addresses,
            },
            status: None,
        }
    }

    fn listener(name: &str, protocol: &str, port: i32) -> Listener {
        Listener {
            name: name.to_string(),
            port,
            protocol: protocol.to_string(),
            ..Default::default()
        }
    }

    fn parameters(spec: contour_deployment::Spec) -> ContourDeployment {
        ContourDeployment::new("params", spec)
    }

    #[test]
    fn no_parameters_yields_defaults() {
        let built = build(&gateway(vec![], vec![]), None);

        assert_eq!(built.instance, Instance::new("projectcontour", "edge"));
        assert_eq!(built.instance.contour.replicas, 2);
        assert_eq!(built.instance.envoy.replicas, 2);
        assert_eq!(built.instance.envoy.workload_type, WorkloadType::DaemonSet);
        assert_eq!(built.instance.envoy.publishing, NetworkPublishingType::LoadBalancer);
        assert_eq!(built.instance.contour.log_level, LogLevel::Info);
        assert!(built.instance.envoy.ports.is_empty());
    }

    #[test]
    fn listeners_select_service_ports() {
        let built = build(
            &gateway(
                vec![
                    listener("http", PROTOCOL_HTTP, 80),
                    listener("https", PROTOCOL_HTTPS, 443),
                ],
                vec![],
            ),
            None,
        );

        assert_eq!(
            built.instance.envoy.ports,
            vec![
                Port {
                    name: "http".to_string(),
                    port: 80,
                    container_port: 8080,
                    node_port: None,
                },
                Port {
                    name: "https".to_string(),
                    port: 443,
                    container_port: 8443,
                    node_port: None,
                },
            ]
        );
        assert_eq!(built.instance.envoy.publishing, NetworkPublishingType::LoadBalancer);
        assert_eq!(built.instance.envoy.workload_type, WorkloadType::DaemonSet);
    }

    #[test]
    fn only_first_supported_address_is_honored() {
        let built = build(
            &gateway(
                vec![],
                vec![
                    GatewayAddress {
                        type_: Some(ADDRESS_TYPE_IP.to_string()),
                        value: "10.0.0.1".to_string(),
                    },
                    GatewayAddress {
                        type_: None,
                        value: "10.0.0.2".to_string(),
                    },
                ],
            ),
            None,
        );
        assert_eq!(built.instance.envoy.address.as_deref(), Some("10.0.0.1"));

        let built = build(
            &gateway(
                vec![],
                vec![GatewayAddress {
                    type_: Some("NamedAddress".to_string()),
                    value: "lb".to_string(),
                }],
            ),
            None,
        );
        assert_eq!(built.instance.envoy.address, None);
    }

    #[test]
    fn contour_replicas_only_change_the_control_plane() {
        let gw = gateway(vec![listener("http", PROTOCOL_HTTP, 80)], vec![]);
        let defaults = build(&gw, None).instance;
        let built = build(
            &gw,
            Some(&parameters(contour_deployment::Spec {
                contour: Some(ContourSettings {
                    replicas: 5,
                    ..Default::default()
                }),
                ..Default::default()
            })),
        )
        .instance;

        assert_eq!(built.contour.replicas, 5);
        assert_eq!(
            Instance {
                contour: defaults.contour.to_owned(),
                ..built
            },
            defaults
        );
    }

    #[test]
    fn envoy_replicas_require_deployment_workload() {
        let gw = gateway(vec![], vec![]);
        let with = |workload_type, replicas| {
            build(
                &gw,
                Some(&parameters(contour_deployment::Spec {
                    envoy: Some(EnvoySettings {
                        workload_type,
                        replicas,
                        ..Default::default()
                    }),
                    ..Default::default()
                })),
            )
            .instance
            .envoy
        };

        let envoy = with(Some(WorkloadType::Deployment), 0);
        assert_eq!(envoy.workload_type, WorkloadType::Deployment);
        assert_eq!(envoy.replicas, 2);
        assert_eq!(with(Some(WorkloadType::Deployment), -1).replicas, 2);
        assert_eq!(with(Some(WorkloadType::Deployment), 3).replicas, 3);
        assert_eq!(with(None, 3).replicas, 2);
        assert_eq!(with(Some(WorkloadType::DaemonSet), 3).replicas, 2);
    }

    #[test]
    fn publishing_overrides_are_layered() {
        let built = build(
            &gateway(
                vec![
                    listener("http", PROTOCOL_HTTP, 80),
                    listener("https", PROTOCOL_HTTPS, 443),
                ],
                vec![],
            ),
            Some(&parameters(contour_deployment::Spec {
                envoy: Some(EnvoySettings {
                    network_publishing: Some(NetworkPublishing {
                        type_: Some(NetworkPublishingType::NodePort),
                        service_annotations: BTreeMap::from([(
                            "example.com/lb".to_string(),
                            "internal".to_string(),
                        )]),
                        ports: vec![
                            contour_deployment::Port {
                                name: "http".to_string(),
                                node_port: Some(30080),
                                container_port: 0,
                            },
                            contour_deployment::Port {
                                name: "https".to_string(),
                                node_port: None,
                                container_port: 9443,
                            },
                        ],
                    }),
                    ..Default::default()
                }),
                common_labels: BTreeMap::from([("team".to_string(), "edge".to_string())]),
                ..Default::default()
            })),
        )
        .instance;

        assert_eq!(built.envoy.publishing, NetworkPublishingType::NodePort);
        assert_eq!(built.envoy.service_annotations.len(), 1);
        assert_eq!(built.envoy.ports[0].node_port, Some(30080));
        assert_eq!(built.envoy.ports[0].container_port, 8080);
        assert_eq!(built.envoy.ports[1].node_port, None);
        assert_eq!(built.envoy.ports[1].container_port, 9443);
        assert_eq!(built.envoy.http_container_port, 8080);
        assert_eq!(built.envoy.https_container_port, 9443);
        assert_eq!(built.common_labels.get("team").map(String::as_str), Some("edge"));
    }

    #[test]
    fn strategies_are_carried_to_the_model() {
        let recreate = DeploymentStrategy {
            type_: Some("Recreate".to_string()),
            ..Default::default()
        };
        let on_delete = DaemonSetUpdateStrategy {
            type_: Some("OnDelete".to_string()),
            ..Default::default()
        };

        let built = build(
            &gateway(vec![], vec![]),
            Some(&parameters(contour_deployment::Spec {
                contour: Some(ContourSettings {
                    strategy: Some(recreate.to_owned()),
                    ..Default::default()
                }),
                envoy: Some(EnvoySettings {
                    update_strategy: Some(on_delete.to_owned()),
                    strategy: Some(recreate.to_owned()),
                    ..Default::default()
                }),
                ..Default::default()
            })),
        )
        .instance;

        assert_eq!(built.contour.strategy, Some(recreate.to_owned()));
        assert_eq!(built.envoy.update_strategy, Some(on_delete));
        assert_eq!(built.envoy.strategy, Some(recreate));
    }

    #[test]
    fn zero_values_never_override() {
        let gw = gateway(vec![], vec![]);
        let built = build(
            &gw,
            Some(&parameters(contour_deployment::Spec {
                contour: Some(ContourSettings::default()),
                envoy: Some(EnvoySettings {
                    network_publishing: Some(NetworkPublishing::default()),
                    ..Default::default()
                }),
                ..Default::default()
            })),
        );

        assert_eq!(built.instance, build(&gw, None).instance);
    }
}
