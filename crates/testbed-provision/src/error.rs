use std::time::Duration;

use testbed_core::{AdapterKind, Condition, CoreError, Endpoint, ResourceKey};
use testbed_ledger::{BoxError, FailureRecord, SessionClosed};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("timed out after {waited:?} waiting for {condition} of {key}")]
    Timeout {
        key: ResourceKey,
        condition: Condition,
        waited: Duration,
    },

    #[error("{key} failed permanently: {reason}")]
    PermanentlyFailed { key: ResourceKey, reason: String },

    #[error("request for {key} failed: {message}")]
    Client { key: ResourceKey, message: String },

    #[error("{0} not found")]
    NotFound(ResourceKey),

    #[error("{} assertion(s) failed for {key}: {}", findings.len(), findings.join("; "))]
    Assertion {
        key: ResourceKey,
        findings: Vec<String>,
    },

    #[error("endpoint {0} reports no host")]
    MissingHost(ResourceKey),

    #[error("unable to find port '{protocol}' in status of {key}")]
    MissingPort { key: ResourceKey, protocol: String },

    #[error("no external endpoint for '{namespace}/{name}'")]
    NoExternalEndpoint { namespace: String, name: String },

    #[error("adapter '{0}' is disabled in this session")]
    AdapterDisabled(AdapterKind),

    #[error("failed to connect {role} client to {endpoint}")]
    Connect {
        role: String,
        endpoint: Endpoint,
        #[source]
        source: BoxError,
    },

    #[error("failed to close {role} client")]
    ClientClose {
        role: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    SessionClosed(#[from] SessionClosed),

    #[error("nested session failed")]
    Teardown(#[source] Box<FailureRecord<SessionError>>),

    #[error("test workload failed")]
    Workload(#[source] BoxError),
}

impl SessionError {
    /// Wrap any error raised by test code.
    pub fn workload(error: impl Into<BoxError>) -> Self {
        Self::Workload(error.into())
    }

    /// Whether a resource failed to reach readiness.
    #[must_use]
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::PermanentlyFailed { .. })
    }

    /// Identity of the resource the error is about, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceKey> {
        match self {
            Self::Timeout { key, .. }
            | Self::PermanentlyFailed { key, .. }
            | Self::Client { key, .. }
            | Self::Assertion { key, .. }
            | Self::MissingPort { key, .. }
            | Self::NotFound(key)
            | Self::MissingHost(key) => Some(key),
            _ => None,
        }
    }
}

impl From<FailureRecord<SessionError>> for SessionError {
    fn from(record: FailureRecord<SessionError>) -> Self {
        Self::Teardown(Box::new(record))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
