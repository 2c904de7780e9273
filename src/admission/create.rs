//! Create Admission Controller
//!
//! Optionally injects the placement-driver start command into new
//! placement-driver pods. Claims carrying the deferred-deletion marker are
//! left to the external collector.

use super::{AdmissionContext, AdmissionDecision, AdmissionPayload};
use crate::crd::{PD_CLIENT_PORT, PD_PEER_PORT};
use crate::domain::naming::{ordinal_pod_name, PodRole};
use crate::error::Result;
use json_patch::{AddOperation, Patch, PatchOperation};
use std::sync::Arc;
use tracing::debug;

/// Data directory of the placement-driver container
pub const PD_DATA_DIR: &str = "/var/lib/pd";

/// Path of the placement-driver container's command
const COMMAND_PATH: &str = "/spec/containers/0/command";

/// Policy for newly created placement-driver and storage pods
pub struct CreateAdmissionController {
    ctx: Arc<AdmissionContext>,
}

impl CreateAdmissionController {
    pub fn new(ctx: Arc<AdmissionContext>) -> Self {
        Self { ctx }
    }

    /// Decide how a new pod is admitted. Creation is never refused.
    pub async fn admit_create(&self, payload: &AdmissionPayload) -> Result<AdmissionDecision> {
        if payload.role == PodRole::Pd && self.ctx.config.patch_pd_command {
            let command = pd_command(payload);
            debug!(namespace = %payload.namespace(), pod = %payload.name(), command = ?command, "patching placement-driver command");
            return Ok(AdmissionDecision::AllowWithPatch(command_patch(command)));
        }

        Ok(AdmissionDecision::Allow)
    }
}

/// Start command of the placement-driver pod described by `payload`
pub fn pd_command(payload: &AdmissionPayload) -> Vec<String> {
    let scheme = payload.cluster.scheme();
    let name = payload.name();
    let host = peer_host(payload, &name);

    let mut command = vec![
        "/pd-server".to_string(),
        format!("--data-dir={}", PD_DATA_DIR),
        format!("--name={}", name),
        format!("--peer-urls={}://0.0.0.0:{}", scheme, PD_PEER_PORT),
        format!("--advertise-peer-urls={}://{}:{}", scheme, host, PD_PEER_PORT),
        format!("--client-urls={}://0.0.0.0:{}", scheme, PD_CLIENT_PORT),
        format!("--advertise-client-urls={}://{}:{}", scheme, host, PD_CLIENT_PORT),
    ];

    if payload.ordinal == 0 {
        command.push(format!(
            "--initial-cluster={}={}://{}:{}",
            name, scheme, host, PD_PEER_PORT
        ));
    } else {
        let set = payload.owner_name();
        let join = (0..payload.ordinal)
            .map(|i| {
                let peer = ordinal_pod_name(&set, i);
                format!("{}://{}:{}", scheme, peer_host(payload, &peer), PD_CLIENT_PORT)
            })
            .collect::<Vec<_>>()
            .join(",");
        command.push(format!("--join={}", join));
    }

    command
}

/// Stable DNS name of `pod` behind the cluster's peer service
fn peer_host(payload: &AdmissionPayload, pod: &str) -> String {
    format!(
        "{}.{}.{}.svc",
        pod,
        payload.cluster.pd_peer_service_name(),
        payload.namespace()
    )
}

/// Patch setting the first container's command
fn command_patch(command: Vec<String>) -> Patch {
    Patch(vec![PatchOperation::Add(AddOperation {
        path: COMMAND_PATH.to_string(),
        value: serde_json::json!(command),
    })])
}
