//! Admission Gateway
//!
//! Entry point of the pod admission webhook. Identifies the target pod's
//! role, assembles the payload once and routes the request to the matching
//! controller. Everything it does not recognise is allowed.

use super::{
    AdmissionContext, AdmissionDecision, AdmissionPayload, CreateAdmissionController,
    PdAdmissionController, StoreAdmissionController,
};
use crate::domain::naming::{PodRole, COMPONENT_LABEL};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Routes pod admission reviews to the role-specific controllers
pub struct AdmissionGateway {
    ctx: Arc<AdmissionContext>,
    pd: PdAdmissionController,
    store: StoreAdmissionController,
    create: CreateAdmissionController,
}

impl AdmissionGateway {
    pub fn new(ctx: Arc<AdmissionContext>) -> Self {
        Self {
            pd: PdAdmissionController::new(ctx.clone()),
            store: StoreAdmissionController::new(ctx.clone()),
            create: CreateAdmissionController::new(ctx.clone()),
            ctx,
        }
    }

    /// Answer one admission review
    pub async fn review(
        &self,
        review: AdmissionReview<DynamicObject>,
    ) -> AdmissionReview<DynamicObject> {
        let request: AdmissionRequest<DynamicObject> = match review.try_into() {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed admission review");
                return AdmissionResponse::invalid(e.to_string()).into_review();
            }
        };

        self.admit(&request).await.into_review()
    }

    /// Answer one admission request
    pub async fn admit(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let response = AdmissionResponse::from(request);
        let namespace = request.namespace.clone().unwrap_or_default();

        let (role, decision) = match self.decide(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(namespace = %namespace, pod = %request.name, operation = ?request.operation, error = %e, "admission failed");
                self.ctx.metrics.record_admission("unknown", "error");
                return response.deny(e.to_string());
            }
        };

        self.ctx
            .metrics
            .record_admission(&role.to_string(), decision.label());

        match decision {
            AdmissionDecision::Allow => response,
            AdmissionDecision::AllowWithPatch(patch) => match response.with_patch(patch) {
                Ok(response) => response,
                Err(e) => {
                    let e = Error::PatchSerialization(e.to_string());
                    error!(namespace = %namespace, pod = %request.name, error = %e, "failed to attach patch");
                    AdmissionResponse::from(request).deny(e.to_string())
                }
            },
            AdmissionDecision::Deny { reason } => {
                info!(namespace = %namespace, pod = %request.name, role = %role, operation = ?request.operation, reason = %reason, "admission denied");
                response.deny(reason)
            }
        }
    }

    async fn decide(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> Result<(PodRole, AdmissionDecision)> {
        if request.kind.kind != "Pod" {
            debug!(kind = %request.kind.kind, "not a pod, admit");
            return Ok((PodRole::Unrelated, AdmissionDecision::Allow));
        }

        match request.operation {
            Operation::Delete => self.decide_delete(request).await,
            Operation::Create => self.decide_create(request).await,
            _ => Ok((PodRole::Unrelated, AdmissionDecision::Allow)),
        }
    }

    async fn decide_delete(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> Result<(PodRole, AdmissionDecision)> {
        let namespace = request.namespace.clone().unwrap_or_default();

        let pod = match &request.old_object {
            Some(object) => to_pod(object, request)?,
            None => match self.ctx.kube.get_pod(&namespace, &request.name).await? {
                Some(pod) => pod,
                None => {
                    debug!(namespace = %namespace, pod = %request.name, "pod is already gone, admit");
                    return Ok((PodRole::Unrelated, AdmissionDecision::Allow));
                }
            },
        };

        let role = role_of(&pod);
        let decision = match role {
            PodRole::Pd | PodRole::Tikv => {
                match AdmissionPayload::assemble(&self.ctx, pod, role).await? {
                    Some(payload) if role == PodRole::Pd => self.pd.admit_delete(&payload).await?,
                    Some(payload) => self.store.admit_delete(&payload).await?,
                    None => AdmissionDecision::Allow,
                }
            }
            PodRole::Tidb | PodRole::Unrelated => AdmissionDecision::Allow,
        };
        Ok((role, decision))
    }

    async fn decide_create(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> Result<(PodRole, AdmissionDecision)> {
        let object = request.object.as_ref().ok_or_else(|| {
            Error::InvalidAdmissionRequest("create request carries no object".into())
        })?;
        let pod = to_pod(object, request)?;

        let role = role_of(&pod);
        let decision = match role {
            PodRole::Pd | PodRole::Tikv => {
                match AdmissionPayload::assemble(&self.ctx, pod, role).await? {
                    Some(payload) => self.create.admit_create(&payload).await?,
                    None => AdmissionDecision::Allow,
                }
            }
            PodRole::Tidb | PodRole::Unrelated => AdmissionDecision::Allow,
        };
        Ok((role, decision))
    }
}

/// Typed pod from the request body, with name and namespace filled in from
/// the request when the object omits them
fn to_pod(object: &DynamicObject, request: &AdmissionRequest<DynamicObject>) -> Result<Pod> {
    let mut pod: Pod = serde_json::from_value(serde_json::to_value(object)?)?;
    if pod.metadata.name.is_none() && !request.name.is_empty() {
        pod.metadata.name = Some(request.name.clone());
    }
    if pod.metadata.namespace.is_none() {
        pod.metadata.namespace = request.namespace.clone();
    }
    Ok(pod)
}

fn role_of(pod: &Pod) -> PodRole {
    PodRole::from_component(pod.labels().get(COMPONENT_LABEL).map(String::as_str))
}
