//! # Custom resource definition module
//!
//! This module provides custom resource module command line interface function
//! implementation

use std::sync::Arc;

use async_trait::async_trait;
use clap::{Subcommand, ValueEnum};
use kube::CustomResourceExt;

use crate::{
    cmd::Executor,
    svc::{
        cfg::Configuration,
        crd::{contour_configuration::ContourConfiguration, contour_deployment::ContourDeployment},
    },
};

// -----------------------------------------------------------------------------
// CustomResource enum

#[derive(ValueEnum, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub enum CustomResource {
    ContourDeployment,
    ContourConfiguration,
}

impl CustomResource {
    pub const ALL: [Self; 2] = [Self::ContourDeployment, Self::ContourConfiguration];

    /// returns the custom resource definition serialized as yaml
    pub fn to_yaml(self) -> Result<String, Error> {
        match self {
            Self::ContourDeployment => serde_yaml::to_string(&ContourDeployment::crd()),
            Self::ContourConfiguration => serde_yaml::to_string(&ContourConfiguration::crd()),
        }
        .map_err(Error::Serialize)
    }
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to serialize custom resource definition, {0}")]
    Serialize(serde_yaml::Error),
}

// -----------------------------------------------------------------------------
// CustomResourceDefinition enum

#[derive(Subcommand, Clone, Debug)]
pub enum CustomResourceDefinition {
    /// View custom resource definition
    #[command(name = "view", aliases = ["v"])]
    View {
        #[arg(name = "custom-resource", value_enum)]
        custom_resource: Option<CustomResource>,
    },
}

#[async_trait]
impl Executor for CustomResourceDefinition {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::View { custom_resource } => view(config, *custom_resource).await,
        }
    }
}

// -----------------------------------------------------------------------------
// view function

pub async fn view(
    _config: Arc<Configuration>,
    custom_resource: Option<CustomResource>,
) -> Result<(), Error> {
    let crds = match custom_resource {
        Some(cr) => vec![cr.to_yaml()?],
        None => CustomResource::ALL
            .into_iter()
            .map(CustomResource::to_yaml)
            .collect::<Result<Vec<_>, _>>()?,
    };

    print!("{}", crds.join("---\n"));
    Ok(())
}
