//! # Failure module
//!
//! This module provide the errors of the managed resources steps and their
//! aggregation into a single outcome which tells whether a retry could help.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use crate::svc::provisioner::orchestrator::ResourceKind;

// -----------------------------------------------------------------------------
// Constants

const RETRYABLE_CODES: [u16; 6] = [409, 429, 500, 502, 503, 504];
const RETRYABLE_REASONS: [&str; 4] = ["Conflict", "ServerTimeout", "Timeout", "TooManyRequests"];

// -----------------------------------------------------------------------------
// StepError enumeration

#[derive(thiserror::Error, Debug)]
pub enum StepError {
    #[error("failed to execute request on kubernetes api, {0}")]
    Kube(kube::Error),
    #[error("failed to generate certificate, {0}")]
    Certificate(rcgen::RcgenError),
    #[error("failed to serialize object, {0}")]
    Serialize(serde_json::Error),
    #[error("object '{0}' already exists and is not owned by the gateway")]
    NotOwned(String),
}

impl From<kube::Error> for StepError {
    fn from(err: kube::Error) -> Self {
        Self::Kube(err)
    }
}

impl From<rcgen::RcgenError> for StepError {
    fn from(err: rcgen::RcgenError) -> Self {
        Self::Certificate(err)
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err)
    }
}

impl StepError {
    /// returns if the failure is transient
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(err) => is_retryable(err),
            Self::Certificate(_) | Self::Serialize(_) | Self::NotOwned(_) => false,
        }
    }
}

/// returns if the kubernetes error is transient
pub fn is_retryable(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(response) => {
            RETRYABLE_CODES.contains(&response.code)
                || RETRYABLE_REASONS.contains(&response.reason.as_str())
        }
        kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_) => true,
        _ => false,
    }
}

// -----------------------------------------------------------------------------
// Operation enumeration

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Operation {
    Ensure,
    Delete,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Ensure => write!(f, "ensure"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

// -----------------------------------------------------------------------------
// Aggregate structure

/// failures of one pass over the managed resources, in execution order
#[derive(Debug)]
pub struct Aggregate {
    pub operation: Operation,
    pub failures: Vec<(ResourceKind, StepError)>,
    /// true if every failure is transient
    pub retryable: bool,
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "failed to {} resources", self.operation)?;
        for (idx, (kind, err)) in self.failures.iter().enumerate() {
            let separator = if idx == 0 { ", " } else { "; " };
            write!(f, "{separator}{kind}: {err}")?;
        }

        Ok(())
    }
}

impl Error for Aggregate {}

/// returns the aggregated failures of the results, if any
pub fn aggregate(
    operation: Operation,
    results: Vec<(ResourceKind, Result<(), StepError>)>,
) -> Option<Aggregate> {
    let failures: Vec<_> = results
        .into_iter()
        .filter_map(|(kind, result)| result.err().map(|err| (kind, err)))
        .collect();

    if failures.is_empty() {
        return None;
    }

    let retryable = failures.iter().all(|(_, err)| err.is_retryable());
    Some(Aggregate {
        operation,
        failures,
        retryable,
    })
}
