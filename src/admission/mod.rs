//! Admission Control Module
//!
//! Injects cluster awareness into the pod lifecycle: deletion requests for
//! placement-driver and storage pods are only admitted once the quorum has
//! been told about them. New placement-driver pods can optionally get their
//! start command injected.

pub mod create;
pub mod gateway;
pub mod payload;
pub mod pd;
pub mod store;

pub use create::*;
pub use gateway::*;
pub use payload::*;
pub use pd::*;
pub use store::*;

use crate::domain::ports::{KubeStateClientRef, TopologyControlRef};
use crate::metrics::OperatorMetrics;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the admission controllers
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// How long a store may stay in leader eviction before it is
    /// considered ready regardless of its remaining leader count
    pub evict_leader_timeout: Duration,
    /// Rewrite the start command of new placement-driver pods
    pub patch_pd_command: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            evict_leader_timeout: Duration::from_secs(180),
            patch_pd_command: false,
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Dependencies shared by every admission controller.
/// Built once at process start.
pub struct AdmissionContext {
    pub kube: KubeStateClientRef,
    pub topology: TopologyControlRef,
    pub config: AdmissionConfig,
    pub metrics: Arc<OperatorMetrics>,
}

impl AdmissionContext {
    pub fn new(
        kube: KubeStateClientRef,
        topology: TopologyControlRef,
        config: AdmissionConfig,
        metrics: Arc<OperatorMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kube,
            topology,
            config,
            metrics,
        })
    }
}

// =============================================================================
// Decision
// =============================================================================

/// Outcome of one admission check.
/// A denial is a deliberate "not yet": the caller's retry drives progress.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    Allow,
    AllowWithPatch(json_patch::Patch),
    Deny { reason: String },
}

impl AdmissionDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        AdmissionDecision::Deny {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        !matches!(self, AdmissionDecision::Deny { .. })
    }

    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            AdmissionDecision::Allow => "allow",
            AdmissionDecision::AllowWithPatch(_) => "patch",
            AdmissionDecision::Deny { .. } => "deny",
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_helpers() {
        assert!(AdmissionDecision::Allow.is_allowed());
        assert!(AdmissionDecision::AllowWithPatch(json_patch::Patch(vec![])).is_allowed());

        let deny = AdmissionDecision::deny("store is offline");
        assert!(!deny.is_allowed());
        assert_eq!(deny.label(), "deny");
    }

    #[test]
    fn test_default_config() {
        let config = AdmissionConfig::default();
        assert_eq!(config.evict_leader_timeout, Duration::from_secs(180));
        assert!(!config.patch_pd_command);
    }
}
