//! # ContourDeployment
//!
//! This module provide the class parameters custom resource. A gateway class
//! may reference one of them to override how instances are provisioned.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSetUpdateStrategy, DeploymentStrategy},
        core::v1::{ResourceRequirements, Toleration, Volume, VolumeMount},
    },
    apimachinery::pkg::apis::meta::v1::Condition,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const GROUP: &str = "projectcontour.io";
pub const KIND: &str = "ContourDeployment";

// -----------------------------------------------------------------------------
// Spec structure

#[derive(CustomResource, JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[kube(group = "projectcontour.io")]
#[kube(version = "v1alpha1")]
#[kube(kind = "ContourDeployment")]
#[kube(singular = "contourdeployment")]
#[kube(plural = "contourdeployments")]
#[kube(shortname = "contourdeploy")]
#[kube(status = "Status")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
pub struct Spec {
    #[serde(rename = "contour", default, skip_serializing_if = "Option::is_none")]
    pub contour: Option<ContourSettings>,
    #[serde(rename = "envoy", default, skip_serializing_if = "Option::is_none")]
    pub envoy: Option<EnvoySettings>,
    #[serde(
        rename = "runtimeSettings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(schema_with = "crate::svc::crd::preserve_unknown_fields")]
    pub runtime_settings: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(rename = "commonLabels", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
}

// -----------------------------------------------------------------------------
// Status structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct Status {
    #[serde(rename = "conditions", default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

// -----------------------------------------------------------------------------
// ContourSettings structure

/// settings of the control plane part of the instance
#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct ContourSettings {
    /// zero means unset
    #[serde(rename = "replicas", default)]
    #[schemars(range(min = 0))]
    pub replicas: i32,
    #[serde(rename = "nodePlacement", default, skip_serializing_if = "Option::is_none")]
    pub node_placement: Option<NodePlacement>,
    #[serde(rename = "kubernetesLogLevel", default)]
    #[schemars(range(min = 0, max = 9))]
    pub kubernetes_log_level: u8,
    #[serde(rename = "logLevel", default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// how control plane pods are replaced
    #[serde(rename = "strategy", default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeploymentStrategy>,
    #[serde(rename = "resources", default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

// -----------------------------------------------------------------------------
// EnvoySettings structure

/// settings of the data plane part of the instance
#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct EnvoySettings {
    #[serde(rename = "workloadType", default, skip_serializing_if = "Option::is_none")]
    pub workload_type: Option<WorkloadType>,
    /// only honored with the `Deployment` workload type, zero means unset
    #[serde(rename = "replicas", default)]
    #[schemars(range(min = 0))]
    pub replicas: i32,
    #[serde(
        rename = "networkPublishing",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub network_publishing: Option<NetworkPublishing>,
    #[serde(rename = "nodePlacement", default, skip_serializing_if = "Option::is_none")]
    pub node_placement: Option<NodePlacement>,
    #[serde(rename = "extraVolumes", default, skip_serializing_if = "Vec::is_empty")]
    pub extra_volumes: Vec<Volume>,
    #[serde(rename = "extraVolumeMounts", default, skip_serializing_if = "Vec::is_empty")]
    pub extra_volume_mounts: Vec<VolumeMount>,
    #[serde(rename = "podAnnotations", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_annotations: BTreeMap<String, String>,
    #[serde(rename = "resources", default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// only honored with the `DaemonSet` workload type
    #[serde(rename = "updateStrategy", default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<DaemonSetUpdateStrategy>,
    /// only honored with the `Deployment` workload type
    #[serde(rename = "strategy", default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeploymentStrategy>,
}

// -----------------------------------------------------------------------------
// NetworkPublishing structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct NetworkPublishing {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<NetworkPublishingType>,
    #[serde(
        rename = "serviceAnnotations",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub service_annotations: BTreeMap<String, String>,
    #[serde(rename = "ports", default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
}

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Port {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "nodePort", default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 65535))]
    pub node_port: Option<i32>,
    #[serde(rename = "containerPort", default)]
    pub container_port: i32,
}

// -----------------------------------------------------------------------------
// NodePlacement structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct NodePlacement {
    #[serde(rename = "nodeSelector", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(rename = "tolerations", default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

// -----------------------------------------------------------------------------
// Enumerations

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum LogLevel {
    #[default]
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "debug")]
    Debug,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum WorkloadType {
    /// one data plane pod per eligible node
    #[default]
    DaemonSet,
    /// a scalable replica set
    Deployment,
}

impl Display for WorkloadType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::DaemonSet => write!(f, "DaemonSet"),
            Self::Deployment => write!(f, "Deployment"),
        }
    }
}

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum NetworkPublishingType {
    #[default]
    #[serde(rename = "LoadBalancerService")]
    LoadBalancer,
    #[serde(rename = "NodePortService")]
    NodePort,
    #[serde(rename = "ClusterIPService")]
    ClusterIp,
}

impl NetworkPublishingType {
    /// returns the kubernetes service type matching the publishing strategy
    pub fn service_type(&self) -> &'static str {
        match self {
            Self::LoadBalancer => "LoadBalancer",
            Self::NodePort => "NodePort",
            Self::ClusterIp => "ClusterIP",
        }
    }
}

impl Display for NetworkPublishingType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::LoadBalancer => write!(f, "LoadBalancerService"),
            Self::NodePort => write!(f, "NodePortService"),
            Self::ClusterIp => write!(f, "ClusterIPService"),
        }
    }
}
