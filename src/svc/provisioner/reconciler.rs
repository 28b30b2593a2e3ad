//! # Reconciler module
//!
//! This module provide the reconciliation of a single gateway: provisioning
//! the contour instance of a gateway of a reconcilable class, cleaning it up
//! when the gateway goes away, and reporting the outcome in the gateway status.

use std::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

use chrono::Utc;
use kube::runtime::{controller, reflector::ObjectRef};
use tracing::{debug, info, warn};

use crate::svc::{
    cfg::Reconciler,
    crd::{
        contour_deployment::{self, ContourDeployment},
        gateway::{Gateway, GatewayClass},
    },
    k8s::{finalizer, recorder, resource, store::Store, Context},
    provisioner::{
        failure::{self, aggregate, Aggregate, Operation},
        filter,
        model::{self, Built, Instance},
        orchestrator::{delete_all, ensure_all},
        status, Images, FINALIZER,
    },
};

// -----------------------------------------------------------------------------
// Constants

pub const NOT_RECONCILED_MESSAGE: &str = "Failed to provision the resources of the gateway, retrying";

// -----------------------------------------------------------------------------
// Action enumeration

/// reasons of the events recorded on the gateway
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Action {
    Scheduled,
    InvalidListener,
    ProvisioningFailed,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "Scheduled"),
            Self::InvalidListener => write!(f, "InvalidListener"),
            Self::ProvisioningFailed => write!(f, "ProvisioningFailed"),
        }
    }
}

// -----------------------------------------------------------------------------
// Outcome enumeration

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Outcome {
    /// every managed resource is up to date
    Scheduled,
    /// managed resources have been removed
    Deleted,
    /// the gateway is not handled by this controller
    Ignored,
}

// -----------------------------------------------------------------------------
// ReconcileError enumeration

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("failed to retrieve gateway, {0}")]
    Gateway(kube::Error),
    #[error("failed to retrieve gateway class '{0}', {1}")]
    Class(String, kube::Error),
    #[error("failed to retrieve parameters '{0}' of gateway class, {1}")]
    Parameters(String, kube::Error),
    #[error("parameters '{0}' of gateway class do not exist")]
    MissingParameters(String),
    #[error("failed to compute patch of gateway finalizers, {0}")]
    Diff(serde_json::Error),
    #[error("failed to update finalizers of gateway, {0}")]
    Finalizer(kube::Error),
    #[error("failed to update status of gateway, {0}")]
    Status(kube::Error),
    #[error("{0}")]
    Aggregate(Aggregate),
    #[error("reconciliation did not complete within {0:?}")]
    Timeout(Duration),
}

impl From<Aggregate> for ReconcileError {
    fn from(err: Aggregate) -> Self {
        Self::Aggregate(err)
    }
}

impl ReconcileError {
    /// returns if a prompt retry could help
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(err)
            | Self::Class(_, err)
            | Self::Parameters(_, err)
            | Self::Finalizer(err)
            | Self::Status(err) => failure::is_retryable(err),
            Self::Aggregate(err) => err.retryable,
            Self::Timeout(_) => true,
            Self::MissingParameters(_) | Self::Diff(_) => false,
        }
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns the action to take after a failed reconciliation
pub fn requeue(config: &Reconciler, err: &ReconcileError) -> controller::Action {
    if err.is_retryable() {
        controller::Action::requeue(config.retry_backoff())
    } else {
        controller::Action::requeue(config.fatal_backoff())
    }
}

/// reconcile the gateway within the configured deadline
pub async fn reconcile_with_deadline<S: Store>(
    ctx: &Context<S>,
    key: &ObjectRef<Gateway>,
) -> Result<Outcome, ReconcileError> {
    let timeout = ctx.config.reconciler.timeout();

    tokio::time::timeout(timeout, reconcile(ctx, key))
        .await
        .unwrap_or_else(|_| Err(ReconcileError::Timeout(timeout)))
}

/// drive the managed resources of the gateway to their desired state
pub async fn reconcile<S: Store>(
    ctx: &Context<S>,
    key: &ObjectRef<Gateway>,
) -> Result<Outcome, ReconcileError> {
    let store = &ctx.store;
    let namespace = key.namespace.as_deref().unwrap_or_default();
    let name = key.name.as_str();

    let gateway = match store
        .get::<Gateway>(Some(namespace), name)
        .await
        .map_err(ReconcileError::Gateway)?
    {
        Some(gateway) => gateway,
        None => {
            info!(namespace = namespace, name = name, "Gateway does not exist anymore, delete its resources");
            return delete(store, &Instance::new(namespace, name)).await;
        }
    };

    if resource::deleted(&gateway) {
        info!(namespace = namespace, name = name, "Gateway is being deleted, delete its resources");
        let outcome = delete(store, &Instance::new(namespace, name)).await?;
        if finalizer::contains(&gateway, FINALIZER) {
            let modified = finalizer::remove(gateway.to_owned(), FINALIZER);
            let patch = resource::diff(&gateway, &modified).map_err(ReconcileError::Diff)?;
            store
                .patch(&gateway, patch)
                .await
                .map_err(ReconcileError::Finalizer)?;
        }

        return Ok(outcome);
    }

    let controller_name = &ctx.config.operator.controller_name;
    if !filter::is_gateway_reconcilable(store, controller_name, &gateway).await {
        debug!(namespace = namespace, name = name, "Gateway is not handled by this controller, skip it");
        return Ok(Outcome::Ignored);
    }

    let gateway = if finalizer::contains(&gateway, FINALIZER) {
        gateway
    } else {
        let modified = finalizer::add(gateway.to_owned(), FINALIZER);
        let patch = resource::diff(&gateway, &modified).map_err(ReconcileError::Diff)?;
        store
            .patch(&gateway, patch)
            .await
            .map_err(ReconcileError::Finalizer)?
    };

    let class_name = &gateway.spec.gateway_class_name;
    let class = match store
        .get::<GatewayClass>(None, class_name)
        .await
        .map_err(|err| ReconcileError::Class(class_name.to_owned(), err))?
    {
        Some(class) => class,
        None => return Ok(Outcome::Ignored),
    };

    let parameters = parameters(store, &class).await?;
    let Built {
        instance,
        listeners,
    } = model::build(&gateway, parameters.as_ref());

    for (listener, reason) in &listeners.invalid {
        let message = format!("listener '{listener}' is invalid, {reason}");
        warn!(namespace = namespace, name = name, listener = listener, reason = %reason, "Ignore invalid listener of gateway");
        if let Err(err) = recorder::warning(store, &gateway, &Action::InvalidListener, &message).await {
            warn!(namespace = namespace, name = name, error = err.to_string(), "Failed to record event on gateway");
        }
    }

    let images = Images::from(&ctx.config.operator);
    let failure = aggregate(Operation::Ensure, ensure_all(store, &instance, &images).await);

    let generation = gateway.metadata.generation;
    let now = Utc::now();
    let condition = match &failure {
        None => status::scheduled(generation, now),
        Some(_) => status::not_reconciled(generation, NOT_RECONCILED_MESSAGE, now),
    };

    let updated = update_status(store, &gateway, condition).await;
    match failure {
        Some(aggregate) => {
            if let Err(err) = updated {
                warn!(namespace = namespace, name = name, error = err.to_string(), "Failed to update status of gateway");
            }

            if let Err(err) = recorder::warning(store, &gateway, &Action::ProvisioningFailed, &aggregate.to_string()).await {
                warn!(namespace = namespace, name = name, error = err.to_string(), "Failed to record event on gateway");
            }

            Err(ReconcileError::Aggregate(aggregate))
        }
        None => {
            if updated? {
                info!(namespace = namespace, name = name, "Gateway is scheduled");
                if let Err(err) = recorder::normal(store, &gateway, &Action::Scheduled, "Gateway is scheduled").await {
                    warn!(namespace = namespace, name = name, error = err.to_string(), "Failed to record event on gateway");
                }
            }

            Ok(Outcome::Scheduled)
        }
    }
}

async fn delete<S: Store>(store: &S, instance: &Instance) -> Result<Outcome, ReconcileError> {
    match aggregate(Operation::Delete, delete_all(store, instance).await) {
        Some(aggregate) => Err(aggregate.into()),
        None => Ok(Outcome::Deleted),
    }
}

/// returns the contour deployment referenced by the class, if any
async fn parameters<S: Store>(
    store: &S,
    class: &GatewayClass,
) -> Result<Option<ContourDeployment>, ReconcileError> {
    let reference = match &class.spec.parameters_ref {
        Some(reference)
            if reference.group == contour_deployment::GROUP
                && reference.kind == contour_deployment::KIND =>
        {
            reference
        }
        _ => return Ok(None),
    };

    let namespace = match &reference.namespace {
        Some(namespace) => namespace,
        None => return Ok(None),
    };

    let key = format!("{}/{}", namespace, reference.name);
    store
        .get::<ContourDeployment>(Some(namespace), &reference.name)
        .await
        .map_err(|err| ReconcileError::Parameters(key.to_owned(), err))?
        .map(Some)
        .ok_or(ReconcileError::MissingParameters(key))
}

/// write the condition on the gateway status, returns if it changed
async fn update_status<S: Store>(
    store: &S,
    gateway: &Gateway,
    condition: k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition,
) -> Result<bool, ReconcileError> {
    let current = gateway
        .status
        .as_ref()
        .map(|status| status.conditions.as_slice())
        .unwrap_or_default();

    let (conditions, changed) = status::upsert_condition(current, condition, Utc::now());
    if !changed {
        return Ok(false);
    }

    let mut modified = gateway.to_owned();
    modified.status.get_or_insert_with(Default::default).conditions = conditions;
    store
        .replace_status(&modified)
        .await
        .map_err(ReconcileError::Status)?;

    Ok(true)
}
