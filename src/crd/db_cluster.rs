//! DbCluster CRD
//!
//! Declares a sharded, replicated database cluster: a placement-driver
//! quorum, storage nodes and optional compute nodes, each backed by a
//! StatefulSet.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Placement-driver client port
pub const PD_CLIENT_PORT: u16 = 2379;

/// Placement-driver peer port
pub const PD_PEER_PORT: u16 = 2380;

/// Suffix of the headless peer service of the placement-driver StatefulSet
pub const PD_PEER_SERVICE_SUFFIX: &str = "-pd-peer";

// =============================================================================
// DbCluster CRD
// =============================================================================

/// DbCluster declares the desired replica counts of every cluster component.
/// The operator's admission webhook and discovery service read it to decide
/// how pods may join or leave the cluster.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dbops.io",
    version = "v1alpha1",
    kind = "DbCluster",
    plural = "dbclusters",
    shortname = "dbc",
    status = "DbClusterStatus",
    printcolumn = r#"{"name": "PD", "type": "integer", "jsonPath": ".spec.pd.replicas"}"#,
    printcolumn = r#"{"name": "Stores", "type": "integer", "jsonPath": ".spec.tikv.replicas"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterSpec {
    /// Placement-driver quorum
    pub pd: ComponentSpec,

    /// Storage nodes
    pub tikv: ComponentSpec,

    /// Compute nodes
    #[serde(default)]
    pub tidb: Option<ComponentSpec>,

    /// Serve every intra-cluster endpoint over TLS
    #[serde(default)]
    pub enable_tls_cluster: bool,
}

/// Desired state of one component
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Desired replica count
    pub replicas: i32,

    /// Container image
    #[serde(default)]
    pub image: Option<String>,
}

// =============================================================================
// Status
// =============================================================================

/// Observed state of the cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterStatus {
    #[serde(default)]
    pub pd: ComponentStatus,

    #[serde(default)]
    pub tikv: ComponentStatus,

    #[serde(default)]
    pub tidb: ComponentStatus,
}

/// Observed state of one component
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    #[serde(default)]
    pub phase: MemberPhase,

    #[serde(default)]
    pub stateful_set: Option<StatefulSetSnapshot>,
}

/// Component lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MemberPhase {
    #[default]
    Normal,
    Upgrade,
    ScaleIn,
    ScaleOut,
}

/// Copy of the owning StatefulSet's status
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetSnapshot {
    pub replicas: i32,
    #[serde(default)]
    pub current_revision: Option<String>,
    #[serde(default)]
    pub update_revision: Option<String>,
}

impl DbCluster {
    /// URL scheme spoken by the cluster's components
    pub fn scheme(&self) -> &'static str {
        if self.spec.enable_tls_cluster {
            "https"
        } else {
            "http"
        }
    }

    /// Name of the placement-driver StatefulSet (also its client service)
    pub fn pd_member_name(&self) -> String {
        format!("{}-pd", self.name_any())
    }

    /// Name of the placement-driver headless peer service
    pub fn pd_peer_service_name(&self) -> String {
        format!("{}{}", self.name_any(), PD_PEER_SERVICE_SUFFIX)
    }

    /// Whether the placement-driver component is being upgraded
    pub fn pd_upgrading(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.pd.phase == MemberPhase::Upgrade)
            .unwrap_or(false)
    }

    /// Whether the storage component is being upgraded
    pub fn tikv_upgrading(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.tikv.phase == MemberPhase::Upgrade)
            .unwrap_or(false)
    }
}

/// Client URL of a cluster's placement-driver service
pub fn pd_client_url(scheme: &str, cluster: &str, namespace: &str) -> String {
    format!("{}://{}-pd.{}:{}", scheme, cluster, namespace, PD_CLIENT_PORT)
}

#[cfg(test)]
pub(crate) fn test_cluster(name: &str, namespace: &str, pd_replicas: i32) -> DbCluster {
    let mut cluster = DbCluster::new(
        name,
        DbClusterSpec {
            pd: ComponentSpec {
                replicas: pd_replicas,
                image: None,
            },
            tikv: ComponentSpec {
                replicas: 3,
                image: None,
            },
            tidb: None,
            enable_tls_cluster: false,
        },
    );
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster.metadata.resource_version = Some("1".to_string());
    cluster
}
