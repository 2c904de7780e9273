//! Domain Ports - Core trait definitions for the lifecycle operator
//!
//! These traits define the boundaries between the admission and discovery
//! logic and the systems they mediate: the placement-driver quorum and the
//! Kubernetes API. Adapters implement these traits to provide concrete
//! functionality; tests substitute in-memory fakes.

use crate::crd::DbCluster;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Quorum Members
// =============================================================================

/// A placement-driver quorum member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    #[serde(default)]
    pub member_id: u64,
    #[serde(default)]
    pub peer_urls: Vec<String>,
    #[serde(default)]
    pub client_urls: Vec<String>,
}

impl Member {
    /// URL clients should use to reach this member.
    /// Falls back to the peer URL moved onto the client port.
    pub fn client_url(&self) -> Option<String> {
        if let Some(url) = self.client_urls.first() {
            return Some(url.clone());
        }
        self.peer_urls
            .first()
            .map(|url| url.replace(":2380", ":2379"))
    }
}

/// Response of the members endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembersInfo {
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub leader: Option<Member>,
}

// =============================================================================
// Stores
// =============================================================================

/// State of a store in the quorum's registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreState {
    Up,
    Offline,
    Tombstone,
    Down,
    Disconnected,
    /// A state name this client does not know
    #[serde(other)]
    Unrecognized,
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreState::Up => write!(f, "Up"),
            StoreState::Offline => write!(f, "Offline"),
            StoreState::Tombstone => write!(f, "Tombstone"),
            StoreState::Down => write!(f, "Down"),
            StoreState::Disconnected => write!(f, "Disconnected"),
            StoreState::Unrecognized => write!(f, "Unrecognized"),
        }
    }
}

/// Store identity as registered with the quorum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub id: u64,
    #[serde(default)]
    pub address: String,
    #[serde(rename = "state_name")]
    pub state: StoreState,
}

/// Store runtime statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    #[serde(default)]
    pub leader_count: u64,
    #[serde(default)]
    pub region_count: u64,
}

/// A storage node's registration (StoreInfo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub store: StoreMeta,
    #[serde(default)]
    pub status: StoreStatus,
}

/// Response of the stores endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoresInfo {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub stores: Vec<StoreInfo>,
}

impl StoresInfo {
    /// Find a store by id
    pub fn find(&self, store_id: u64) -> Option<&StoreInfo> {
        self.stores.iter().find(|s| s.store.id == store_id)
    }
}

// =============================================================================
// Topology Client Port
// =============================================================================

/// Port for querying and mutating one cluster's placement-driver quorum
#[async_trait]
pub trait TopologyClient: Send + Sync {
    /// List quorum members
    async fn get_members(&self) -> Result<MembersInfo>;

    /// List registered stores
    async fn get_stores(&self) -> Result<StoresInfo>;

    /// Get one store, `None` when the quorum does not know it
    async fn get_store(&self, store_id: u64) -> Result<Option<StoreInfo>>;

    /// Start removing a store from the cluster
    async fn delete_store(&self, store_id: u64) -> Result<()>;

    /// Remove a member from the quorum; removing an absent member succeeds
    async fn delete_member(&self, name: &str) -> Result<()>;

    /// Current quorum leader
    async fn get_leader(&self) -> Result<Member>;

    /// Move quorum leadership to `target`
    async fn transfer_leader(&self, target: &str) -> Result<()>;

    /// Ask the quorum to move every leadership off a store
    async fn begin_evict_leader(&self, store_id: u64) -> Result<()>;
}

/// Hands out a topology client for a cluster
pub trait TopologyControl: Send + Sync {
    fn client(&self, namespace: &str, cluster: &str, tls: bool) -> Result<TopologyClientRef>;
}

// =============================================================================
// Kubernetes State Port
// =============================================================================

/// Port for reading and annotating Kubernetes objects.
/// Lookups return `Ok(None)` when the object does not exist.
#[async_trait]
pub trait KubeStateClient: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    /// Set one annotation on a pod
    async fn annotate_pod(&self, namespace: &str, name: &str, key: &str, value: &str)
        -> Result<()>;

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>>;

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>>;

    /// Set one annotation on a volume claim
    async fn annotate_pvc(&self, namespace: &str, name: &str, key: &str, value: &str)
        -> Result<()>;

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<DbCluster>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type TopologyClientRef = Arc<dyn TopologyClient>;
pub type TopologyControlRef = Arc<dyn TopologyControl>;
pub type KubeStateClientRef = Arc<dyn KubeStateClient>;
