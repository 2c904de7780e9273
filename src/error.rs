//! Error types for the Cluster Lifecycle Operator
//!
//! Provides structured error types for the admission controllers, the
//! bootstrap discovery coordinator and the clients they depend on.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Pod {namespace}/{name} has no owning StatefulSet")]
    MissingOwner { namespace: String, name: String },

    // =========================================================================
    // Placement Driver (topology) Errors
    // =========================================================================
    #[error("Placement driver connection error: {0}")]
    TopologyConnection(#[from] reqwest::Error),

    #[error("Placement driver request {method} {path} failed with status {status}: {body}")]
    TopologyRequest {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Placement driver quorum of {cluster} has no members yet")]
    QuorumNotReady { cluster: String },

    // =========================================================================
    // Discovery Errors
    // =========================================================================
    #[error("Advertise address has wrong format: {0}")]
    InvalidAdvertiseAddress(String),

    #[error("Peer namespace {peer} is not equal to discovery namespace {expected}")]
    NamespaceMismatch { peer: String, expected: String },

    #[error("Peer cluster {peer} is not served by this discovery service (serving {expected})")]
    ClusterMismatch { peer: String, expected: String },

    // =========================================================================
    // Admission Errors
    // =========================================================================
    #[error("Pod name {0} has no ordinal suffix")]
    InvalidOrdinal(String),

    #[error("Pod {pod} carries an invalid store id label: {value}")]
    InvalidStoreId { pod: String, value: String },

    #[error("Admission request could not be decoded: {0}")]
    InvalidAdmissionRequest(String),

    #[error("JSON patch serialization failed: {0}")]
    PatchSerialization(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action the caller should take after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RequeueWithBackoff,
    /// Retry after specific duration
    RequeueAfter(Duration),
    /// Don't retry, the request itself is wrong
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::TopologyConnection(_)
            | Error::TopologyRequest { .. }
            | Error::Kube(_)
            | Error::ResourceNotFound { .. } => ErrorAction::RequeueWithBackoff,

            // Quorum is being founded by another peer - short wait
            Error::QuorumNotReady { .. } => ErrorAction::RequeueAfter(Duration::from_secs(5)),

            // Malformed or out-of-scope requests - don't retry automatically
            Error::Configuration(_)
            | Error::InvalidAdvertiseAddress(_)
            | Error::NamespaceMismatch { .. }
            | Error::ClusterMismatch { .. }
            | Error::InvalidOrdinal(_)
            | Error::InvalidStoreId { .. }
            | Error::InvalidAdmissionRequest(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TopologyConnection(_)
                | Error::TopologyRequest { .. }
                | Error::Kube(_)
                | Error::ResourceNotFound { .. }
                | Error::QuorumNotReady { .. }
        )
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
