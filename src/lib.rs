//! Cluster Lifecycle Operator
//!
//! Injects cluster awareness into the Kubernetes pod lifecycle of a sharded,
//! replicated database cluster (placement-driver quorum, storage nodes,
//! compute nodes).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            REST API (axum)                           │
//! │      POST /admission/pods                GET /new/:advertise_url     │
//! └──────────────┬─────────────────────────────────────┬─────────────────┘
//!                │                                     │
//!     ┌──────────┴──────────┐               ┌──────────┴──────────┐
//!     │  Admission Gateway  │               │ Discovery           │
//!     │  (payload assembly) │               │ Coordinator         │
//!     └──┬───────┬───────┬──┘               └──────────┬──────────┘
//!        │       │       │                             │
//!   ┌────┴──┐ ┌──┴────┐ ┌┴───────┐                     │
//!   │  PD   │ │ Store │ │ Create │                     │
//!   └───┬───┘ └───┬───┘ └───┬────┘                     │
//!       └─────────┼─────────┴──────────────────────────┤
//!        ┌────────┴────────┐                  ┌────────┴────────┐
//!        │ KubeStateClient │                  │ TopologyClient  │
//!        │ (kube::Api)     │                  │ (PD HTTP API)   │
//!        └─────────────────┘                  └─────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`admission`]: Deletion and creation policies for cluster pods
//! - [`discovery`]: Bootstrap founder/join decisions for new quorum members
//! - [`api`]: HTTP server exposing both
//! - [`topology`]: Placement-driver API client
//! - [`k8s`]: Kubernetes API client
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Naming rules and port traits
//! - [`error`]: Error types and handling

pub mod admission;
pub mod api;
pub mod crd;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod topology;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use admission::{
    AdmissionConfig, AdmissionContext, AdmissionDecision, AdmissionGateway, AdmissionPayload,
    CreateAdmissionController, PdAdmissionController, StoreAdmissionController,
};

pub use api::{ApiServer, ApiServerConfig, RestRouter};

pub use crd::{DbCluster, DbClusterSpec, DbClusterStatus, MemberPhase};

pub use discovery::{DiscoveryConfig, DiscoveryCoordinator};

pub use domain::ports::{
    KubeStateClient, StoreInfo, StoreState, TopologyClient, TopologyControl,
};

pub use error::{Error, ErrorAction, Result};

pub use k8s::KubeApiClient;

pub use metrics::OperatorMetrics;

pub use topology::{PdClient, PdControl, PdControlConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
