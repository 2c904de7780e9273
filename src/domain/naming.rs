//! Naming conventions shared by the admission controllers and discovery
//!
//! Label and annotation keys, plus the pure functions that derive ordinals,
//! pod names and volume claim names from StatefulSet conventions.

/// Component label (`pd`, `tikv`, `tidb`)
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Instance label, carries the owning cluster's name
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Store id assigned by the placement driver to a storage pod
pub const STORE_ID_LABEL: &str = "dbops.io/store-id";

/// Revision label set by the StatefulSet controller
pub const REVISION_LABEL: &str = "controller-revision-hash";

/// DeferredDeletionMarker: set on a claim whose pod left the cluster
pub const PVC_DEFER_DELETING_ANNOTATION: &str = "dbops.io/pvc-defer-deleting";

/// LeaderEvictionMarker: set on a storage pod once leader eviction began
pub const EVICT_LEADER_BEGIN_ANNOTATION: &str = "dbops.io/evict-leader-begin-time";

/// Role of a pod inside a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodRole {
    Pd,
    Tikv,
    Tidb,
    Unrelated,
}

impl PodRole {
    /// Role from the value of the component label
    pub fn from_component(component: Option<&str>) -> Self {
        match component {
            Some("pd") => PodRole::Pd,
            Some("tikv") => PodRole::Tikv,
            Some("tidb") => PodRole::Tidb,
            _ => PodRole::Unrelated,
        }
    }
}

impl std::fmt::Display for PodRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodRole::Pd => write!(f, "pd"),
            PodRole::Tikv => write!(f, "tikv"),
            PodRole::Tidb => write!(f, "tidb"),
            PodRole::Unrelated => write!(f, "unrelated"),
        }
    }
}

/// Ordinal of a StatefulSet pod: the digits after the last `-`.
/// Returns `None` for names without such a suffix.
pub fn ordinal(pod_name: &str) -> Option<i32> {
    let (_, suffix) = pod_name.rsplit_once('-')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Name of the pod at `ordinal` in StatefulSet `set_name`
pub fn ordinal_pod_name(set_name: &str, ordinal: i32) -> String {
    format!("{}-{}", set_name, ordinal)
}

/// Name of the claim created from template `claim_template` for the pod at `ordinal`
pub fn ordinal_pvc_name(claim_template: &str, set_name: &str, ordinal: i32) -> String {
    format!("{}-{}-{}", claim_template, set_name, ordinal)
}
