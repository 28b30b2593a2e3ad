//! # Service module
//!
//! This module provide the services exposing the control plane to the data
//! plane and the data plane to the clients of the gateway.

use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::util::intstr::IntOrString,
};

use crate::svc::{
    crd::contour_deployment::NetworkPublishingType,
    k8s::store::Store,
    provisioner::{
        failure::StepError,
        model::Instance,
        objects::{
            self, contour_name, envoy_name, metadata, selector, CONTOUR_COMPONENT,
            ENVOY_COMPONENT, XDS_PORT,
        },
    },
};

// -----------------------------------------------------------------------------
// Constants

const OWNED_PATHS: [&str; 4] = [
    "/spec/type",
    "/spec/selector",
    "/spec/loadBalancerIP",
    "/spec/externalTrafficPolicy",
];

// -----------------------------------------------------------------------------
// Builders

pub fn contour_service(instance: &Instance) -> Service {
    Service {
        metadata: metadata(instance, true, contour_name(instance)),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector(instance, CONTOUR_COMPONENT)),
            ports: Some(vec![ServicePort {
                name: Some("xds".to_string()),
                port: XDS_PORT,
                target_port: Some(IntOrString::Int(XDS_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            session_affinity: Some("None".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn envoy_service(instance: &Instance) -> Service {
    let publishing = instance.envoy.publishing;
    let exposed = publishing != NetworkPublishingType::ClusterIp;

    let ports = instance
        .envoy
        .ports
        .iter()
        .map(|port| ServicePort {
            name: Some(port.name.to_owned()),
            port: port.port,
            target_port: Some(IntOrString::Int(port.container_port)),
            node_port: port.node_port.filter(|_| exposed),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect();

    let mut metadata = metadata(instance, true, envoy_name(instance));
    if !instance.envoy.service_annotations.is_empty() {
        metadata.annotations = Some(instance.envoy.service_annotations.to_owned());
    }

    Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some(publishing.service_type().to_string()),
            selector: Some(selector(instance, ENVOY_COMPONENT)),
            ports: Some(ports),
            external_traffic_policy: exposed.then(|| "Local".to_string()),
            load_balancer_ip: instance
                .envoy
                .address
                .to_owned()
                .filter(|_| publishing == NetworkPublishingType::LoadBalancer),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// copy addresses and ports allocated by the cluster
fn carry(live: &Service, desired: &mut Service) {
    let (Some(live), Some(desired)) = (live.spec.as_ref(), desired.spec.as_mut()) else {
        return;
    };

    desired.cluster_ip = live.cluster_ip.to_owned();
    desired.cluster_ips = live.cluster_ips.to_owned();

    let desired_type = desired.type_.as_deref();
    if desired_type == Some("ClusterIP") {
        return;
    }

    if live.type_.as_deref() == desired_type && desired_type == Some("LoadBalancer") {
        desired.health_check_node_port = live.health_check_node_port;
    }

    for port in desired.ports.iter_mut().flatten() {
        if port.node_port.is_some() {
            continue;
        }

        port.node_port = live
            .ports
            .iter()
            .flatten()
            .find(|live| live.name == port.name)
            .and_then(|live| live.node_port);
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

pub async fn ensure_contour<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    objects::ensure(store, instance, contour_service(instance), &OWNED_PATHS, carry).await
}

pub async fn ensure_envoy<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    objects::ensure(store, instance, envoy_service(instance), &OWNED_PATHS, carry).await
}

pub async fn delete_contour<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    objects::delete::<_, Service>(
        store,
        instance,
        Some(instance.namespace.as_str()),
        &contour_name(instance),
    )
    .await
}

pub async fn delete_envoy<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    objects::delete::<_, Service>(
        store,
        instance,
        Some(instance.namespace.as_str()),
        &envoy_name(instance),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svc::{k8s::store::memory::MemoryStore, provisioner::model::Port};

    fn instance() -> Instance {
        let mut instance = Instance::new("default", "edge");
        instance.envoy.address = Some("10.0.0.10".to_string());
        instance.envoy.ports = vec![
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
                node_port: Some(30443),
            },
        ];

        instance
    }

    #[test]
    fn envoy_service_follows_publishing() {
        let service = envoy_service(&instance());
        let spec = service.spec.expect("spec");

        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        assert_eq!(spec.external_traffic_policy.as_deref(), Some("Local"));
        assert_eq!(spec.load_balancer_ip.as_deref(), Some("10.0.0.10"));

        let ports = spec.ports.expect("ports");
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(8080)));
        assert_eq!(ports[1].node_port, Some(30443));

        let mut instance = instance();
        instance.envoy.publishing = NetworkPublishingType::ClusterIp;
        let spec = envoy_service(&instance).spec.expect("spec");
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(spec.external_traffic_policy, None);
        assert_eq!(spec.load_balancer_ip, None);
        assert!(spec.ports.iter().flatten().all(|port| port.node_port.is_none()));
    }

    #[tokio::test]
    async fn allocated_fields_are_kept_on_update() {
        let store = MemoryStore::default();
        let mut instance = instance();

        ensure_envoy(&store, &instance).await.expect("service to be created");

        let mut live: Service = store.object(Some("default"), "envoy-edge").expect("service");
        let spec = live.spec.as_mut().expect("spec");
        spec.cluster_ip = Some("10.96.0.12".to_string());
        spec.cluster_ips = Some(vec!["10.96.0.12".to_string()]);
        spec.health_check_node_port = Some(31000);
        for port in spec.ports.iter_mut().flatten() {
            port.node_port.get_or_insert(30080);
        }
        store.insert(live);

        ensure_envoy(&store, &instance).await.expect("service to be up to date");
        assert_eq!(store.writes(), 1);

        instance.envoy.service_annotations.insert(
            "service.beta.kubernetes.io/aws-load-balancer-type".to_string(),
            "nlb".to_string(),
        );
        ensure_envoy(&store, &instance).await.expect("service to be updated");
        assert_eq!(store.writes(), 2);

        let live: Service = store.object(Some("default"), "envoy-edge").expect("service");
        let spec = live.spec.expect("spec");
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.96.0.12"));
        assert_eq!(spec.health_check_node_port, Some(31000));
        let node_ports: Vec<_> = spec.ports.iter().flatten().map(|port| port.node_port).collect();
        assert_eq!(node_ports, vec![Some(30080), Some(30443)]);
        assert!(live.metadata.annotations.is_some());
    }

    #[tokio::test]
    async fn contour_service_exposes_xds() {
        let store = MemoryStore::default();
        let instance = instance();

        ensure_contour(&store, &instance).await.expect("service to be created");
        let live: Service = store.object(Some("default"), "contour-edge").expect("service");
        let spec = live.spec.expect("spec");
        assert_eq!(spec.ports.expect("ports")[0].port, 8001);

        delete_contour(&store, &instance).await.expect("service to be deleted");
        delete_envoy(&store, &instance).await.expect("missing service to be ignored");
        assert_eq!(store.len(), 0);
    }
}
