//! # Gateway api resources
//!
//! This module provide the subset of the `gateway.networking.k8s.io` resources
//! read and written by the provisioner. The definitions are owned upstream, so
//! their schema is not generated here.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const GATEWAY_CLASS_CONDITION_ACCEPTED: &str = "Accepted";
pub const GATEWAY_CONDITION_SCHEDULED: &str = "Scheduled";
pub const GATEWAY_REASON_SCHEDULED: &str = "Scheduled";
pub const GATEWAY_REASON_NOT_RECONCILED: &str = "NotReconciled";

pub const ADDRESS_TYPE_IP: &str = "IPAddress";
pub const ADDRESS_TYPE_HOSTNAME: &str = "Hostname";

pub const PROTOCOL_HTTP: &str = "HTTP";
pub const PROTOCOL_HTTPS: &str = "HTTPS";
pub const PROTOCOL_TLS: &str = "TLS";

// -----------------------------------------------------------------------------
// GatewayClass structures

#[derive(CustomResource, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
#[kube(group = "gateway.networking.k8s.io")]
#[kube(version = "v1beta1")]
#[kube(kind = "GatewayClass")]
#[kube(plural = "gatewayclasses")]
#[kube(status = "GatewayClassStatus")]
#[kube(schema = "disabled")]
#[kube(derive = "PartialEq")]
pub struct GatewayClassSpec {
    #[serde(rename = "controllerName")]
    pub controller_name: String,
    #[serde(
        rename = "parametersRef",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parameters_ref: Option<ParametersReference>,
    #[serde(rename = "description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct ParametersReference {
    #[serde(rename = "group")]
    pub group: String,
    #[serde(rename = "kind")]
    pub kind: String,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "namespace", default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct GatewayClassStatus {
    #[serde(rename = "conditions", default)]
    pub conditions: Vec<Condition>,
}

// -----------------------------------------------------------------------------
// Gateway structures

#[derive(CustomResource, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
#[kube(group = "gateway.networking.k8s.io")]
#[kube(version = "v1beta1")]
#[kube(kind = "Gateway")]
#[kube(plural = "gateways")]
#[kube(status = "GatewayStatus")]
#[kube(namespaced)]
#[kube(schema = "disabled")]
#[kube(derive = "PartialEq")]
pub struct GatewaySpec {
    #[serde(rename = "gatewayClassName")]
    pub gateway_class_name: String,
    #[serde(rename = "listeners", default)]
    pub listeners: Vec<Listener>,
    #[serde(rename = "addresses", default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<GatewayAddress>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Listener {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "hostname", default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "port")]
    pub port: i32,
    #[serde(rename = "protocol")]
    pub protocol: String,
    #[serde(rename = "tls", default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<serde_json::Value>,
    #[serde(rename = "allowedRoutes", default, skip_serializing_if = "Option::is_none")]
    pub allowed_routes: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct GatewayAddress {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(rename = "value")]
    pub value: String,
}

/// Listener statuses are maintained by the routing controller, they are kept
/// as-is when the provisioner writes the conditions.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct GatewayStatus {
    #[serde(rename = "addresses", default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<GatewayAddress>,
    #[serde(rename = "conditions", default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "listeners", default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<serde_json::Value>,
}
