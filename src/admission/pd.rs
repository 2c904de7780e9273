//! Placement Driver Admission Controller
//!
//! Safe-deletion policy for quorum members. A member is only admitted for
//! deletion once it is no longer part of the quorum, or once it no longer
//! holds the quorum's leadership.

use super::{AdmissionContext, AdmissionDecision, AdmissionPayload};
use crate::domain::naming::ordinal_pod_name;
use crate::error::Result;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

/// Deletion policy for placement-driver pods
pub struct PdAdmissionController {
    ctx: Arc<AdmissionContext>,
}

impl PdAdmissionController {
    pub fn new(ctx: Arc<AdmissionContext>) -> Self {
        Self { ctx }
    }

    /// Decide whether a placement-driver pod may be deleted now
    pub async fn admit_delete(&self, payload: &AdmissionPayload) -> Result<AdmissionDecision> {
        let name = payload.name();
        let namespace = payload.namespace();
        let cluster = payload.cluster.name_any();

        let members = payload.topology.get_members().await?;
        if !members.members.iter().any(|m| m.name == name) {
            info!(namespace = %namespace, cluster = %cluster, pod = %name, "pod is not a quorum member, admit to delete");
            return Ok(AdmissionDecision::Allow);
        }

        if !payload.in_range {
            // Demote first; the retried deletion finds a non-member and passes.
            payload.mark_deferred_deletion(&self.ctx).await?;
            payload.topology.delete_member(&name).await?;
            info!(namespace = %namespace, cluster = %cluster, pod = %name, ordinal = payload.ordinal, replicas = payload.replicas, "removed member during scale-in, refuse to delete until it is gone");
            return Ok(AdmissionDecision::deny(format!(
                "member {} is being removed from the quorum",
                name
            )));
        }

        let leader = payload.topology.get_leader().await?;
        debug!(namespace = %namespace, cluster = %cluster, leader = %leader.name, pod = %name, "current quorum leader");
        if leader.name != name {
            info!(namespace = %namespace, cluster = %cluster, pod = %name, "pod is not quorum leader, admit to delete");
            return Ok(AdmissionDecision::Allow);
        }

        let target = transfer_target(payload.ordinal, payload.replicas);
        let target_name = ordinal_pod_name(&payload.owner_name(), target);
        payload.topology.transfer_leader(&target_name).await?;
        info!(namespace = %namespace, cluster = %cluster, pod = %name, target = %target_name, "transferring leadership, refuse to delete");

        Ok(AdmissionDecision::deny(format!(
            "leadership is moving from {} to {}",
            name, target_name
        )))
    }
}

/// Ordinal that receives leadership from the leader at `ordinal`:
/// the last replica, or the first when the leader is itself the last.
pub fn transfer_target(ordinal: i32, replicas: i32) -> i32 {
    let last = replicas - 1;
    if ordinal == last {
        0
    } else {
        last
    }
}
