//! # Kubernetes module
//!
//! This module provide the gateway controller, the object store and helpers to
//! interact with kubernetes

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::Service,
};
use kube::{
    runtime::{
        controller::{self, Action},
        reflector::ObjectRef,
        watcher, Controller,
    },
    api::DynamicObject,
    Api, Resource,
};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace};

use crate::svc::{
    cfg::Configuration,
    crd::gateway::{Gateway, GatewayClass},
    k8s::store::{KubeStore, Store},
    provisioner::{
        filter,
        reconciler::{self, ReconcileError},
        OWNING_GATEWAY_NAME_LABEL,
    },
};

pub mod client;
pub mod finalizer;
pub mod recorder;
pub mod resource;
pub mod store;

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static RECONCILIATION_SUCCESS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "contour_provisioner_reconciliation_success",
            "number of successful reconciliation"
        ),
        &["kind"]
    )
    .expect("metrics 'contour_provisioner_reconciliation_success' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_FAILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "contour_provisioner_reconciliation_failed",
            "number of failed reconciliation"
        ),
        &["kind"]
    )
    .expect("metrics 'contour_provisioner_reconciliation_failed' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_OUTCOME: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "contour_provisioner_reconciliation_outcome",
            "number of reconciliation by outcome",
        ),
        &["kind", "namespace", "outcome"]
    )
    .expect("metrics 'contour_provisioner_reconciliation_outcome' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_DURATION: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "contour_provisioner_reconciliation_duration",
            "duration of reconciliation",
        ),
        &["kind", "unit"]
    )
    .expect("metrics 'contour_provisioner_reconciliation_duration' to not be already registered")
});

// -----------------------------------------------------------------------------
// Context structure

/// shared by every reconciliation
pub struct Context<S = KubeStore> {
    pub store: S,
    pub config: Arc<Configuration>,
}

impl<S> From<(S, Arc<Configuration>)> for Context<S> {
    fn from((store, config): (S, Arc<Configuration>)) -> Self {
        Self { store, config }
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// reconcile function given to the controller
async fn reconcile<S: Store>(
    obj: Arc<Gateway>,
    ctx: Arc<Context<S>>,
) -> Result<Action, ReconcileError> {
    let key = ObjectRef::from_obj(&*obj);

    info!(namespace = ?key.namespace, name = &key.name, "Received event for gateway");
    let outcome = reconciler::reconcile_with_deadline(&ctx, &key).await;

    #[cfg(feature = "metrics")]
    {
        let label = match &outcome {
            Ok(reconciler::Outcome::Scheduled) => "scheduled",
            Ok(reconciler::Outcome::Deleted) => "deleted",
            Ok(reconciler::Outcome::Ignored) => "ignored",
            Err(_) => "failed",
        };

        let kind = Gateway::kind(&());
        RECONCILIATION_OUTCOME
            .with_label_values(&[kind.as_ref(), key.namespace.as_deref().unwrap_or_default(), label])
            .inc();
    }

    match outcome {
        Ok(outcome) => {
            debug!(namespace = ?key.namespace, name = &key.name, outcome = ?outcome, "Reconciled gateway");
            Ok(Action::await_change())
        }
        Err(err) => {
            error!(namespace = ?key.namespace, name = &key.name, retryable = err.is_retryable(), error = err.to_string(), "Failed to reconcile gateway");
            Err(err)
        }
    }
}

/// error policy function given to the controller
fn retry<S: Store>(_obj: Arc<Gateway>, err: &ReconcileError, ctx: Arc<Context<S>>) -> Action {
    let action = reconciler::requeue(&ctx.config.reconciler, err);

    trace!(action = ?action, error = err.to_string(), "Requeue failed reconciliation");
    action
}

/// delete what is left of a gateway the controller does not know anymore,
/// e.g. resources carrying the owner labels of a gateway removed while the
/// controller was down
async fn cleanup<S: Store>(
    ctx: &Context<S>,
    obj_ref: &ObjectRef<DynamicObject>,
) -> Result<reconciler::Outcome, ReconcileError> {
    let mut key = ObjectRef::<Gateway>::new(&obj_ref.name);
    if let Some(namespace) = &obj_ref.namespace {
        key = key.within(namespace);
    }

    reconciler::reconcile_with_deadline(ctx, &key).await
}

/// listen for events of gateways, gateway classes and managed workloads and
/// reconcile the gateway concerned
pub async fn watch(client: kube::Client, config: Arc<Configuration>) {
    let controller_name = config.operator.controller_name.to_owned();
    let context = Arc::new(Context::from((KubeStore::from(client.to_owned()), config)));
    let owned = watcher::Config::default().labels(OWNING_GATEWAY_NAME_LABEL);

    let controller = Controller::new(Api::<Gateway>::all(client.to_owned()), watcher::Config::default());
    let gateways = controller.store();

    let mut stream = controller
        .watches(
            Api::<GatewayClass>::all(client.to_owned()),
            watcher::Config::default(),
            move |class| filter::gateways_for_class(&controller_name, &class, &gateways.state()),
        )
        .watches(Api::<Deployment>::all(client.to_owned()), owned.to_owned(), |obj| {
            filter::owning_gateway(&obj)
        })
        .watches(Api::<DaemonSet>::all(client.to_owned()), owned.to_owned(), |obj| {
            filter::owning_gateway(&obj)
        })
        .watches(Api::<Service>::all(client), owned, |obj| filter::owning_gateway(&obj))
        .run(reconcile::<KubeStore>, retry::<KubeStore>, context.to_owned())
        .boxed();

    let kind = Gateway::kind(&()).to_string();
    loop {
        let instant = Instant::now();

        match stream.try_next().await {
            Ok(None) => {
                debug!("We have reached the end of the infinite watch stream");
                return;
            }
            Ok(Some((obj, _action))) => {
                info!(kind = &kind, name = &obj.name, namespace = ?obj.namespace, "Successfully reconcile resource");
                #[cfg(feature = "metrics")]
                RECONCILIATION_SUCCESS.with_label_values(&[&kind]).inc();
            }
            Err(controller::Error::ObjectNotFound(obj_ref)) => {
                debug!(name = &obj_ref.name, namespace = ?obj_ref.namespace, "Received an event about an already deleted resource, clean up its leftovers");
                match cleanup(&context, &obj_ref).await {
                    Ok(outcome) => {
                        debug!(name = &obj_ref.name, namespace = ?obj_ref.namespace, outcome = ?outcome, "Cleaned up leftovers of gateway");
                        #[cfg(feature = "metrics")]
                        RECONCILIATION_SUCCESS.with_label_values(&[&kind]).inc();
                    }
                    Err(err) => {
                        error!(name = &obj_ref.name, namespace = ?obj_ref.namespace, error = err.to_string(), "Failed to clean up leftovers of gateway");
                        #[cfg(feature = "metrics")]
                        RECONCILIATION_FAILED.with_label_values(&[&kind]).inc();
                    }
                }
            }
            Err(err) => {
                error!(kind = &kind, error = err.to_string(), "Failed to reconcile resource");
                #[cfg(feature = "metrics")]
                RECONCILIATION_FAILED.with_label_values(&[&kind]).inc();
            }
        }

        #[cfg(feature = "metrics")]
        RECONCILIATION_DURATION
            .with_label_values(&[&kind, "us"])
            .inc_by(Instant::now().duration_since(instant).as_micros() as f64);

        sleep_until(instant + Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
    use kube::api::ObjectMeta;

    use super::*;
    use crate::svc::{
        crd::{
            gateway::{
                GatewayClassSpec, GatewayClassStatus, GatewaySpec, Listener,
                GATEWAY_CLASS_CONDITION_ACCEPTED,
            },
            CONDITION_TRUE,
        },
        k8s::store::memory::MemoryStore,
        provisioner::reconciler::Outcome,
    };

    #[tokio::test]
    async fn unknown_gateway_leftovers_are_cleaned_up() {
        let ctx = Context::from((
            MemoryStore::default(),
            Arc::new(Configuration::try_default().expect("default configuration")),
        ));

        let mut class = GatewayClass::new(
            "contour",
            GatewayClassSpec {
                controller_name: ctx.config.operator.controller_name.to_owned(),
                ..Default::default()
            },
        );
        class.status = Some(GatewayClassStatus {
            conditions: vec![Condition {
                type_: GATEWAY_CLASS_CONDITION_ACCEPTED.to_string(),
                status: CONDITION_TRUE.to_string(),
                reason: "Accepted".to_string(),
                message: String::new(),
                observed_generation: None,
                last_transition_time: Time(Utc::now()),
            }],
        });
        ctx.store.insert(class);

        let gateway = ctx.store.insert(Gateway {
            metadata: ObjectMeta {
                namespace: Some("projectcontour".to_string()),
                name: Some("edge".to_string()),
                ..Default::default()
            },
            spec: GatewaySpec {
                gateway_class_name: "contour".to_string(),
                listeners: vec![Listener {
                    name: "http".to_string(),
                    port: 80,
                    protocol: "HTTP".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            status: None,
        });

        let key = ObjectRef::from_obj(&gateway);
        reconciler::reconcile(&ctx, &key).await.expect("gateway to be provisioned");
        assert!(ctx.store.contains::<DaemonSet>(Some("projectcontour"), "envoy-edge"));

        ctx.store
            .delete::<Gateway>(Some("projectcontour"), "edge")
            .await
            .expect("gateway to be deleted");

        let outcome = cleanup(&ctx, &key.erase()).await.expect("leftovers to be deleted");
        assert_eq!(outcome, Outcome::Deleted);
        assert!(!ctx.store.contains::<DaemonSet>(Some("projectcontour"), "envoy-edge"));
        assert!(!ctx.store.contains::<Service>(Some("projectcontour"), "envoy-edge"));
        assert!(!ctx.store.contains::<Deployment>(Some("projectcontour"), "contour-edge"));
    }
}
