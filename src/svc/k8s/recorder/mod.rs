//! # Event recorder module
//!
//! This module provide an alternative to the golang EventRecorder structure
//!
//! See following links for more details:
//! - <https://book-v1.book.kubebuilder.io/beyond_basics/creating_events.html>
//! - <https://github.com/kubernetes/client-go/blob/master/tools/record/event.go#L56>

use std::fmt::{self, Debug, Display, Formatter};

use k8s_openapi::api::core::v1::Event;
use kube::ResourceExt;
use tracing::debug;

use crate::svc::k8s::store::{Object, Store};

pub mod event;

// -----------------------------------------------------------------------------
// Level enumeration

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub enum Level {
    Warning,
    Normal,
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "Warning"),
            Self::Normal => write!(f, "Normal"),
        }
    }
}

// -----------------------------------------------------------------------------
// Helper methods

/// record an event for the given object
pub async fn record<S, T, U>(
    store: &S,
    obj: &T,
    kind: Level,
    action: &U,
    message: &str,
) -> Result<Event, kube::Error>
where
    S: Store,
    T: Object,
    U: ToString + Debug,
{
    debug!(
        action = action.to_string(),
        namespace = ?obj.namespace(),
        name = obj.name_any(),
        level = %kind,
        "Create event for resource, {}",
        message
    );

    store.create(&event::new(obj, kind, action, message)).await
}

/// shortcut for the [`record`] method with the 'Normal' [`Level`]
pub async fn normal<S, T, U>(
    store: &S,
    obj: &T,
    action: &U,
    message: &str,
) -> Result<Event, kube::Error>
where
    S: Store,
    T: Object,
    U: ToString + Debug,
{
    record(store, obj, Level::Normal, action, message).await
}

/// shortcut for the [`record`] method with the 'Warning' [`Level`]
pub async fn warning<S, T, U>(
    store: &S,
    obj: &T,
    action: &U,
    message: &str,
) -> Result<Event, kube::Error>
where
    S: Store,
    T: Object,
    U: ToString + Debug,
{
    record(store, obj, Level::Warning, action, message).await
}
