//! Store Admission Controller
//!
//! Safe-deletion policy for storage pods, driven by the state of the pod's
//! store in the quorum's registry:
//!
//! | Store state                 | Action                                          |
//! |-----------------------------|-------------------------------------------------|
//! | not found, Tombstone, Down  | mark claim on scale-in, allow                   |
//! | Offline                     | deny, the quorum is draining it                 |
//! | Up, out of range            | remove store, deny                              |
//! | Up, in range, upgrading     | wait for lower ordinals, evict leaders, allow   |
//! | Up, in range                | allow                                           |
//! | Disconnected, unrecognised  | deny                                            |

use super::{AdmissionContext, AdmissionDecision, AdmissionPayload};
use crate::domain::naming::{
    ordinal_pod_name, EVICT_LEADER_BEGIN_ANNOTATION, REVISION_LABEL, STORE_ID_LABEL,
};
use crate::domain::ports::{StoreInfo, StoreState, StoresInfo};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deletion policy for storage pods
pub struct StoreAdmissionController {
    ctx: Arc<AdmissionContext>,
}

impl StoreAdmissionController {
    pub fn new(ctx: Arc<AdmissionContext>) -> Self {
        Self { ctx }
    }

    /// Decide whether a storage pod may be deleted now
    pub async fn admit_delete(&self, payload: &AdmissionPayload) -> Result<AdmissionDecision> {
        let name = payload.name();
        let namespace = payload.namespace();

        let store = match self.lookup_store(payload).await? {
            Some(store) => store,
            None => {
                info!(namespace = %namespace, pod = %name, "pod has no store, admit to delete");
                return self.admit_without_store(payload).await;
            }
        };

        let store_id = store.store.id;
        debug!(namespace = %namespace, pod = %name, store_id, state = %store.store.state, "store state");

        match store.store.state {
            StoreState::Tombstone | StoreState::Down => self.admit_without_store(payload).await,
            StoreState::Offline => {
                info!(namespace = %namespace, pod = %name, store_id, "store is offline, refuse to delete until drained");
                Ok(AdmissionDecision::deny(format!(
                    "store {} is being drained",
                    store_id
                )))
            }
            StoreState::Up => self.admit_up(payload, &store).await,
            StoreState::Disconnected | StoreState::Unrecognized => {
                warn!(namespace = %namespace, pod = %name, store_id, state = %store.store.state, "store state does not allow deletion");
                Ok(AdmissionDecision::deny(format!(
                    "store {} is in state {}",
                    store_id, store.store.state
                )))
            }
        }
    }

    /// Store registered for the pod's store-id label
    async fn lookup_store(&self, payload: &AdmissionPayload) -> Result<Option<StoreInfo>> {
        let store_id = match store_id_of(&payload.pod)? {
            Some(id) => id,
            None => return Ok(None),
        };
        payload.topology.get_store(store_id).await
    }

    /// The node holds nothing the cluster still needs
    async fn admit_without_store(&self, payload: &AdmissionPayload) -> Result<AdmissionDecision> {
        if !payload.in_range {
            payload.mark_deferred_deletion(&self.ctx).await?;
        }
        Ok(AdmissionDecision::Allow)
    }

    async fn admit_up(
        &self,
        payload: &AdmissionPayload,
        store: &StoreInfo,
    ) -> Result<AdmissionDecision> {
        let name = payload.name();
        let namespace = payload.namespace();
        let store_id = store.store.id;

        if !payload.in_range {
            payload.topology.delete_store(store_id).await?;
            info!(namespace = %namespace, pod = %name, store_id, ordinal = payload.ordinal, replicas = payload.replicas, "removing store during scale-in, refuse to delete");
            return Ok(AdmissionDecision::deny(format!(
                "store {} is being removed",
                store_id
            )));
        }

        if !payload.upgrading {
            return Ok(AdmissionDecision::Allow);
        }

        if let Some(reason) = self.pending_lower_ordinal(payload).await? {
            info!(namespace = %namespace, pod = %name, reason = %reason, "lower ordinals not upgraded yet, refuse to delete");
            return Ok(AdmissionDecision::deny(reason));
        }

        self.admit_during_upgrade(payload, store).await
    }

    /// Reason the upgrade must wait on a lower-ordinal sibling, if any
    async fn pending_lower_ordinal(&self, payload: &AdmissionPayload) -> Result<Option<String>> {
        let namespace = payload.namespace();
        let set_name = payload.owner_name();
        let update_revision = payload
            .owner
            .status
            .as_ref()
            .and_then(|s| s.update_revision.clone());

        let stores = payload.topology.get_stores().await?;
        let siblings = try_join_all((0..payload.ordinal).map(|i| {
            let name = ordinal_pod_name(&set_name, i);
            let namespace = namespace.clone();
            async move {
                let pod = self.ctx.kube.get_pod(&namespace, &name).await?;
                Ok::<_, Error>((name, pod))
            }
        }))
        .await?;

        for (name, pod) in siblings {
            let pod = match pod {
                Some(pod) => pod,
                None => return Ok(Some(format!("pod {} does not exist", name))),
            };
            if let Some(reason) = sibling_pending(&name, &pod, update_revision.as_deref(), &stores)? {
                return Ok(Some(reason));
            }
        }

        Ok(None)
    }

    /// Leader-eviction sub-protocol
    async fn admit_during_upgrade(
        &self,
        payload: &AdmissionPayload,
        store: &StoreInfo,
    ) -> Result<AdmissionDecision> {
        let name = payload.name();
        let namespace = payload.namespace();
        let store_id = store.store.id;

        let begin = match payload.pod.annotations().get(EVICT_LEADER_BEGIN_ANNOTATION) {
            Some(begin) => begin.clone(),
            None => {
                payload.topology.begin_evict_leader(store_id).await?;
                let now = Utc::now().to_rfc3339();
                self.ctx
                    .kube
                    .annotate_pod(&namespace, &name, EVICT_LEADER_BEGIN_ANNOTATION, &now)
                    .await?;
                info!(namespace = %namespace, pod = %name, store_id, "began leader eviction, refuse to delete");
                return Ok(AdmissionDecision::deny(format!(
                    "evicting leaders from store {}",
                    store_id
                )));
            }
        };

        if !ready_to_upgrade(store, &begin, self.ctx.config.evict_leader_timeout, Utc::now()) {
            info!(namespace = %namespace, pod = %name, store_id, leader_count = store.status.leader_count, "leader eviction in progress, refuse to delete");
            return Ok(AdmissionDecision::deny(format!(
                "store {} still holds {} leaders",
                store_id, store.status.leader_count
            )));
        }

        info!(namespace = %namespace, pod = %name, store_id, "leaders evicted, admit to delete");
        Ok(AdmissionDecision::Allow)
    }
}

/// Parse the pod's store-id label
pub fn store_id_of(pod: &Pod) -> Result<Option<u64>> {
    match pod.labels().get(STORE_ID_LABEL) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| Error::InvalidStoreId {
            pod: pod.name_any(),
            value: value.clone(),
        }),
    }
}

/// Reason a sibling has not finished its upgrade step, if any
fn sibling_pending(
    name: &str,
    pod: &Pod,
    update_revision: Option<&str>,
    stores: &StoresInfo,
) -> Result<Option<String>> {
    let revision = pod.labels().get(REVISION_LABEL).map(String::as_str);
    if revision.is_none() || revision != update_revision {
        return Ok(Some(format!("pod {} is not upgraded yet", name)));
    }

    let store_id = match store_id_of(pod)? {
        Some(id) => id,
        None => return Ok(Some(format!("pod {} has no store yet", name))),
    };

    match stores.find(store_id) {
        Some(store) if store.store.state == StoreState::Up => Ok(None),
        Some(store) => Ok(Some(format!(
            "store {} of pod {} is {}",
            store_id, name, store.store.state
        ))),
        None => Ok(Some(format!("store {} of pod {} is not registered", store_id, name))),
    }
}

/// Whether a store under leader eviction may be restarted: it holds no
/// leaders anymore, or eviction started longer than `timeout` ago
pub fn ready_to_upgrade(store: &StoreInfo, begin: &str, timeout: Duration, now: DateTime<Utc>) -> bool {
    if store.status.leader_count == 0 {
        return true;
    }

    match DateTime::parse_from_rfc3339(begin) {
        Ok(begin) => now
            .signed_duration_since(begin.with_timezone(&Utc))
            .to_std()
            .map(|elapsed| elapsed >= timeout)
            .unwrap_or(false),
        Err(_) => false,
    }
}
