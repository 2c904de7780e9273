//! Admission Payload
//!
//! Per-request context assembled once by the gateway and handed to the
//! controller matching the pod's role.

use super::AdmissionContext;
use crate::crd::DbCluster;
use crate::domain::naming::{
    ordinal, ordinal_pvc_name, PodRole, INSTANCE_LABEL, PVC_DEFER_DELETING_ANNOTATION,
};
use crate::domain::ports::TopologyClientRef;
use crate::error::{Error, Result};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

/// Everything a controller needs to judge one pod deletion
pub struct AdmissionPayload {
    pub pod: Pod,
    pub role: PodRole,
    pub owner: StatefulSet,
    pub cluster: DbCluster,
    /// Ordinal parsed from the pod name
    pub ordinal: i32,
    /// Desired replicas of the owner StatefulSet
    pub replicas: i32,
    /// Whether the ordinal is inside the desired replica range
    pub in_range: bool,
    /// Whether the pod's component is being upgraded
    pub upgrading: bool,
    pub topology: TopologyClientRef,
}

impl AdmissionPayload {
    /// Resolve owner StatefulSet, cluster and topology client for `pod`.
    /// Returns `None` when the owner or the cluster no longer exists.
    pub async fn assemble(
        ctx: &AdmissionContext,
        pod: Pod,
        role: PodRole,
    ) -> Result<Option<Self>> {
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();

        let ordinal = ordinal(&name).ok_or_else(|| Error::InvalidOrdinal(name.clone()))?;

        let owner_name = owner_stateful_set(&pod).ok_or_else(|| Error::MissingOwner {
            namespace: namespace.clone(),
            name: name.clone(),
        })?;

        let owner = match ctx.kube.get_stateful_set(&namespace, &owner_name).await? {
            Some(set) => set,
            None => {
                debug!(namespace = %namespace, pod = %name, statefulset = %owner_name, "owner statefulset is gone");
                return Ok(None);
            }
        };

        let cluster_name = match pod.labels().get(INSTANCE_LABEL) {
            Some(cluster) => cluster.clone(),
            None => {
                debug!(namespace = %namespace, pod = %name, "pod carries no instance label");
                return Ok(None);
            }
        };

        let cluster = match ctx.kube.get_cluster(&namespace, &cluster_name).await? {
            Some(cluster) => cluster,
            None => {
                debug!(namespace = %namespace, pod = %name, cluster = %cluster_name, "cluster is gone");
                return Ok(None);
            }
        };

        let replicas = desired_replicas(&owner);
        let upgrading = match role {
            PodRole::Pd => cluster.pd_upgrading(),
            PodRole::Tikv => cluster.tikv_upgrading(),
            _ => false,
        };
        let topology = ctx
            .topology
            .client(&namespace, &cluster_name, cluster.spec.enable_tls_cluster)?;

        Ok(Some(Self {
            pod,
            role,
            owner,
            cluster,
            ordinal,
            replicas,
            in_range: ordinal < replicas,
            upgrading,
            topology,
        }))
    }

    pub fn name(&self) -> String {
        self.pod.name_any()
    }

    pub fn namespace(&self) -> String {
        self.pod.namespace().unwrap_or_default()
    }

    pub fn owner_name(&self) -> String {
        self.owner.name_any()
    }

    /// Name of the volume claim backing this pod
    pub fn pvc_name(&self) -> String {
        let template = claim_template_name(&self.owner, self.role);
        ordinal_pvc_name(&template, &self.owner_name(), self.ordinal)
    }

    /// Record the deferred-deletion marker on this pod's claim.
    /// Idempotent; a claim that no longer exists needs no marker.
    pub async fn mark_deferred_deletion(&self, ctx: &AdmissionContext) -> Result<()> {
        let namespace = self.namespace();
        let pvc_name = self.pvc_name();

        let pvc = match ctx.kube.get_pvc(&namespace, &pvc_name).await? {
            Some(pvc) => pvc,
            None => {
                debug!(namespace = %namespace, pvc = %pvc_name, "claim already gone");
                return Ok(());
            }
        };

        if pvc.annotations().contains_key(PVC_DEFER_DELETING_ANNOTATION) {
            return Ok(());
        }

        let now = chrono::Utc::now().to_rfc3339();
        ctx.kube
            .annotate_pvc(&namespace, &pvc_name, PVC_DEFER_DELETING_ANNOTATION, &now)
            .await?;
        info!(namespace = %namespace, pvc = %pvc_name, pod = %self.name(), "marked claim for deferred deletion");
        Ok(())
    }
}

/// Name of the StatefulSet owning `pod`
pub fn owner_stateful_set(pod: &Pod) -> Option<String> {
    pod.owner_references()
        .iter()
        .find(|r| r.kind == "StatefulSet")
        .map(|r| r.name.clone())
}

/// Desired replicas of a StatefulSet (Kubernetes defaults a missing value to 1)
pub fn desired_replicas(set: &StatefulSet) -> i32 {
    set.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
}

/// Name of the first volume claim template, or the role name
pub fn claim_template_name(set: &StatefulSet, role: PodRole) -> String {
    set.spec
        .as_ref()
        .and_then(|s| s.volume_claim_templates.as_ref())
        .and_then(|templates| templates.first())
        .and_then(|t| t.metadata.name.clone())
        .unwrap_or_else(|| role.to_string())
}
