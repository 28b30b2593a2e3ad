//! # Logging module
//!
//! This module provides logging facilities and helpers

use tracing::Level;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, Layer};

// -----------------------------------------------------------------------------
// Constants

/// crates which are logged with less verbosity than the provisioner
const DEPENDENCIES: [&str; 5] = ["hyper", "kube_client", "kube_runtime", "rustls", "tower"];

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to set global default subscriber, {0}")]
    GlobalDefaultSubscriber(tracing::subscriber::SetGlobalDefaultError),
}

// -----------------------------------------------------------------------------
// helpers

pub const fn level(verbosity: usize) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// returns the per-target filter, dependencies are two steps quieter
pub fn targets(verbosity: usize) -> Targets {
    let dependency = level(verbosity.saturating_sub(2));

    DEPENDENCIES
        .into_iter()
        .fold(Targets::new().with_default(level(verbosity)), |targets, target| {
            targets.with_target(target, dependency)
        })
}

pub fn initialize(verbosity: usize) -> Result<(), Error> {
    let layer = tracing_subscriber::fmt::layer()
        .with_thread_names(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_filter(targets(verbosity));

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layer))
        .map_err(Error::GlobalDefaultSubscriber)
}
