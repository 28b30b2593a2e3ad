//! # Orchestrator module
//!
//! This module provide the ordered list of managed resource kinds and the
//! passes ensuring or deleting all of them for an instance.

use std::fmt::{self, Display, Formatter};

use tracing::{error, info};

use crate::svc::{
    k8s::store::Store,
    provisioner::{
        failure::StepError,
        model::Instance,
        objects::{config, dataplane, deployment, rbac, secret, service},
        Images,
    },
};

// -----------------------------------------------------------------------------
// ResourceKind enumeration

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum ResourceKind {
    Rbac,
    ContourConfig,
    XdsSecrets,
    ContourDeployment,
    EnvoyDataPlane,
    ContourService,
    EnvoyService,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Rbac => write!(f, "rbac"),
            Self::ContourConfig => write!(f, "contour config"),
            Self::XdsSecrets => write!(f, "xDS TLS secrets"),
            Self::ContourDeployment => write!(f, "contour deployment"),
            Self::EnvoyDataPlane => write!(f, "envoy data plane"),
            Self::ContourService => write!(f, "contour service"),
            Self::EnvoyService => write!(f, "envoy service"),
        }
    }
}

impl ResourceKind {
    pub const ENSURE_ORDER: [Self; 7] = [
        Self::Rbac,
        Self::ContourConfig,
        Self::XdsSecrets,
        Self::ContourDeployment,
        Self::EnvoyDataPlane,
        Self::ContourService,
        Self::EnvoyService,
    ];

    /// the reverse of [`Self::ENSURE_ORDER`]
    pub fn delete_order() -> impl Iterator<Item = Self> {
        Self::ENSURE_ORDER.into_iter().rev()
    }

    /// returns if the failure of this step stops the ensure pass
    pub fn is_prerequisite(&self) -> bool {
        matches!(self, Self::Rbac)
    }

    pub async fn ensure<S: Store>(
        &self,
        store: &S,
        instance: &Instance,
        images: &Images,
    ) -> Result<(), StepError> {
        match self {
            Self::Rbac => rbac::ensure(store, instance).await,
            Self::ContourConfig => config::ensure(store, instance).await,
            Self::XdsSecrets => secret::ensure(store, instance).await,
            Self::ContourDeployment => deployment::ensure(store, instance, images).await,
            Self::EnvoyDataPlane => dataplane::ensure(store, instance, images).await,
            Self::ContourService => service::ensure_contour(store, instance).await,
            Self::EnvoyService => service::ensure_envoy(store, instance).await,
        }
    }

    pub async fn delete<S: Store>(&self, store: &S, instance: &Instance) -> Result<(), StepError> {
        match self {
            Self::Rbac => rbac::delete(store, instance).await,
            Self::ContourConfig => config::delete(store, instance).await,
            Self::XdsSecrets => secret::delete(store, instance).await,
            Self::ContourDeployment => deployment::delete(store, instance).await,
            Self::EnvoyDataPlane => dataplane::delete(store, instance).await,
            Self::ContourService => service::delete_contour(store, instance).await,
            Self::EnvoyService => service::delete_envoy(store, instance).await,
        }
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// ensure every managed resource in order, a failing prerequisite stops the
/// pass and the following steps are not reported
pub async fn ensure_all<S: Store>(
    store: &S,
    instance: &Instance,
    images: &Images,
) -> Vec<(ResourceKind, Result<(), StepError>)> {
    let mut results = vec![];

    for kind in ResourceKind::ENSURE_ORDER {
        let result = kind.ensure(store, instance, images).await;
        let failed = result.is_err();

        match &result {
            Ok(()) => info!(namespace = &instance.namespace, name = &instance.name, resource = %kind, "Ensured resource for gateway"),
            Err(err) => error!(namespace = &instance.namespace, name = &instance.name, resource = %kind, error = err.to_string(), "Failed to ensure resource for gateway"),
        }

        results.push((kind, result));
        if failed && kind.is_prerequisite() {
            break;
        }
    }

    results
}

/// delete every managed resource in reverse order, whatever fails
pub async fn delete_all<S: Store>(
    store: &S,
    instance: &Instance,
) -> Vec<(ResourceKind, Result<(), StepError>)> {
    let mut results = vec![];

    for kind in ResourceKind::delete_order() {
        let result = kind.delete(store, instance).await;

        match &result {
            Ok(()) => info!(namespace = &instance.namespace, name = &instance.name, resource = %kind, "Deleted resource for gateway"),
            Err(err) => error!(namespace = &instance.namespace, name = &instance.name, resource = %kind, error = err.to_string(), "Failed to delete resource for gateway"),
        }

        results.push((kind, result));
    }

    results
}
