//! Error types for the reconciler crate.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP failure reaching the registry or the cluster.
    #[error("transport error talking to {target}: {reason}")]
    Transport { target: String, reason: String },

    /// A registry or cluster call exceeded the request timeout.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The registry answered with a non-success status.
    #[error("registry returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The registry answered with a body that could not be decoded.
    #[error("invalid registry response: {reason}")]
    InvalidResponse { reason: String },

    /// No registry version carries the configured tag.
    #[error("no version of {image} is tagged '{tag}'")]
    VersionNotFound { image: String, tag: String },

    /// The target deployment does not exist.
    #[error("deployment {namespace}/{name} not found")]
    DeploymentNotFound { namespace: String, name: String },

    /// Listing the deployment's pods failed.
    #[error("failed to list pods matching '{selector}' in {namespace}: {reason}")]
    PodListFailed {
        namespace: String,
        selector: String,
        reason: String,
    },

    /// The deployment has no label selector to find its pods with.
    #[error("deployment {namespace}/{name} has no matchLabels selector")]
    EmptySelector { namespace: String, name: String },

    /// The restart update was rejected because the deployment changed concurrently.
    #[error("deployment {namespace}/{name} was modified concurrently, update rejected")]
    Conflict { namespace: String, name: String },

    /// The restart update failed for another reason.
    #[error("failed to update deployment {namespace}/{name}: {reason}")]
    UpdateFailed {
        namespace: String,
        name: String,
        reason: String,
    },

    /// Invalid reconciler configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Core error (descriptor or digest validation).
    #[error(transparent)]
    Core(#[from] driftwatch_core::Error),
}

/// Failure classes used for reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    NotFound,
    Parse,
    Conflict,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::NotFound => "not_found",
            Self::Parse => "parse",
            Self::Conflict => "conflict",
            Self::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a transport error.
    pub fn transport(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Create a version not found error.
    pub fn version_not_found(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::VersionNotFound {
            image: image.into(),
            tag: tag.into(),
        }
    }

    /// Create a deployment not found error.
    pub fn deployment_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DeploymentNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a pod list failed error.
    pub fn pod_list_failed(
        namespace: impl Into<String>,
        selector: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PodListFailed {
            namespace: namespace.into(),
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Create an empty selector error.
    pub fn empty_selector(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::EmptySelector {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Conflict {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an update failed error.
    pub fn update_failed(
        namespace: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UpdateFailed {
            namespace: namespace.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. }
            | Self::Timeout { .. }
            | Self::UnexpectedStatus { .. }
            | Self::PodListFailed { .. }
            | Self::UpdateFailed { .. } => ErrorKind::Transport,
            Self::VersionNotFound { .. } | Self::DeploymentNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidResponse { .. } | Self::Core(_) => ErrorKind::Parse,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::EmptySelector { .. } | Self::InvalidConfig { .. } => ErrorKind::Configuration,
        }
    }
}
