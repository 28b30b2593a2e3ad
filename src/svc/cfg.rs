//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the configuration

use std::{convert::TryFrom, net::SocketAddr, path::PathBuf, time::Duration};

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::{Deserialize, Serialize};
use tracing::info;

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_CONTROLLER_NAME: &str = "projectcontour.io/gateway-controller";
pub const DEFAULT_CONTOUR_IMAGE: &str = "ghcr.io/projectcontour/contour:v1.24.0";
pub const DEFAULT_ENVOY_IMAGE: &str = "docker.io/envoyproxy/envoy:v1.25.1";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub const DEFAULT_RETRY_BACKOFF: u64 = 5;
pub const DEFAULT_FATAL_BACKOFF: u64 = 300;
pub const DEFAULT_TIMEOUT: u64 = 60;

// -----------------------------------------------------------------------------
// Operator structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Operator {
    /// identity matched against the `controllerName` of gateway classes
    #[serde(rename = "controller-name")]
    pub controller_name: String,
    #[serde(rename = "contour-image")]
    pub contour_image: String,
    #[serde(rename = "envoy-image")]
    pub envoy_image: String,
    #[serde(rename = "listen")]
    pub listen: SocketAddr,
}

// -----------------------------------------------------------------------------
// Reconciler structure

/// durations are expressed in seconds
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Reconciler {
    #[serde(rename = "retry-backoff")]
    pub retry_backoff: u64,
    #[serde(rename = "fatal-backoff")]
    pub fatal_backoff: u64,
    #[serde(rename = "timeout")]
    pub timeout: u64,
}

impl Reconciler {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff)
    }

    pub fn fatal_backoff(&self) -> Duration {
        Duration::from_secs(self.fatal_backoff)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to build configuration, {0}")]
    Build(ConfigError),
    #[error("failed to deserialize configuration, {0}")]
    Cast(ConfigError),
    #[error("failed to set default for key '{0}', {1}")]
    Default(String, ConfigError),
}

// -----------------------------------------------------------------------------
// Configuration structures

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Configuration {
    #[serde(rename = "operator")]
    pub operator: Operator,
    #[serde(rename = "reconciler")]
    pub reconciler: Reconciler,
}

impl TryFrom<PathBuf> for Configuration {
    type Error = Error;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        defaults()?
            .add_source(environment())
            .add_source(File::from(path).required(true))
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}

impl Configuration {
    pub fn try_default() -> Result<Self, Error> {
        let mut builder = defaults()?.add_source(environment());

        let mut paths = vec![
            PathBuf::from(format!("/usr/share/{}/config", env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!("/etc/{}/config", env!("CARGO_PKG_NAME"))),
        ];

        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            paths.push(home.join(".config").join(env!("CARGO_PKG_NAME")).join("config"));
            paths.push(home.join(".local/share").join(env!("CARGO_PKG_NAME")).join("config"));
        }

        paths.push(PathBuf::from("config"));
        for path in paths {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Cast)
    }

    /// log the configuration in use
    pub fn help(&self) {
        info!(
            controller = &self.operator.controller_name,
            contour = &self.operator.contour_image,
            envoy = &self.operator.envoy_image,
            listen = self.operator.listen.to_string(),
            "Provisioner configuration",
        );
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

fn environment() -> Environment {
    Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_"))
        .prefix_separator("_")
        .separator("__")
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, Error> {
    let defaults: [(&str, config::Value); 7] = [
        ("operator.controller-name", DEFAULT_CONTROLLER_NAME.into()),
        ("operator.contour-image", DEFAULT_CONTOUR_IMAGE.into()),
        ("operator.envoy-image", DEFAULT_ENVOY_IMAGE.into()),
        ("operator.listen", DEFAULT_LISTEN.into()),
        ("reconciler.retry-backoff", DEFAULT_RETRY_BACKOFF.into()),
        ("reconciler.fatal-backoff", DEFAULT_FATAL_BACKOFF.into()),
        ("reconciler.timeout", DEFAULT_TIMEOUT.into()),
    ];

    defaults
        .into_iter()
        .try_fold(Config::builder(), |builder, (key, value)| {
            builder
                .set_default(key, value)
                .map_err(|err| Error::Default(key.to_string(), err))
        })
}
