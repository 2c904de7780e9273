//! In-memory fakes of the topology and Kubernetes ports for unit tests.
//! Every mutating call is recorded so tests can assert on side effects.

use crate::crd::DbCluster;
use crate::domain::naming::{COMPONENT_LABEL, INSTANCE_LABEL};
use crate::domain::ports::{
    KubeStateClient, Member, MembersInfo, StoreInfo, StoreMeta, StoreState, StoreStatus,
    StoresInfo, TopologyClient, TopologyClientRef, TopologyControl,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetStatus};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// =============================================================================
// Topology
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyCall {
    DeleteStore(u64),
    DeleteMember(String),
    TransferLeader(String),
    BeginEvictLeader(u64),
}

#[derive(Default)]
struct TopologyState {
    members: Vec<Member>,
    leader: Option<String>,
    stores: Vec<StoreInfo>,
    unreachable: bool,
    calls: Vec<TopologyCall>,
}

/// Fake placement-driver quorum
#[derive(Default)]
pub struct FakeTopology {
    state: Mutex<TopologyState>,
}

impl FakeTopology {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_member(&self, name: &str) {
        self.state.lock().members.push(member(name));
    }

    pub fn set_leader(&self, name: &str) {
        self.state.lock().leader = Some(name.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn put_store(&self, id: u64, state: StoreState, leader_count: u64) {
        let mut inner = self.state.lock();
        inner.stores.retain(|s| s.store.id != id);
        inner.stores.push(StoreInfo {
            store: StoreMeta {
                id,
                address: format!("store-{}:20160", id),
                state,
            },
            status: StoreStatus {
                leader_count,
                region_count: 0,
            },
        });
    }

    pub fn calls(&self) -> Vec<TopologyCall> {
        self.state.lock().calls.clone()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.state.lock().unreachable {
            return Err(Error::TopologyRequest {
                method: "GET".into(),
                path: "/members".into(),
                status: 503,
                body: "connection refused".into(),
            });
        }
        Ok(())
    }
}

pub fn member(name: &str) -> Member {
    Member {
        name: name.to_string(),
        member_id: 0,
        peer_urls: vec![format!("http://{}.demo-pd-peer.db.svc:2380", name)],
        client_urls: vec![format!("http://{}.demo-pd-peer.db.svc:2379", name)],
    }
}

#[async_trait]
impl TopologyClient for FakeTopology {
    async fn get_members(&self) -> Result<MembersInfo> {
        self.check_reachable()?;
        let inner = self.state.lock();
        Ok(MembersInfo {
            members: inner.members.clone(),
            leader: inner.leader.as_deref().map(member),
        })
    }

    async fn get_stores(&self) -> Result<StoresInfo> {
        self.check_reachable()?;
        let inner = self.state.lock();
        Ok(StoresInfo {
            count: inner.stores.len(),
            stores: inner.stores.clone(),
        })
    }

    async fn get_store(&self, store_id: u64) -> Result<Option<StoreInfo>> {
        self.check_reachable()?;
        let inner = self.state.lock();
        Ok(inner.stores.iter().find(|s| s.store.id == store_id).cloned())
    }

    async fn delete_store(&self, store_id: u64) -> Result<()> {
        self.check_reachable()?;
        self.state.lock().calls.push(TopologyCall::DeleteStore(store_id));
        Ok(())
    }

    async fn delete_member(&self, name: &str) -> Result<()> {
        self.check_reachable()?;
        let mut inner = self.state.lock();
        inner.members.retain(|m| m.name != name);
        inner.calls.push(TopologyCall::DeleteMember(name.to_string()));
        Ok(())
    }

    async fn get_leader(&self) -> Result<Member> {
        self.check_reachable()?;
        let inner = self.state.lock();
        inner.leader.as_deref().map(member).ok_or_else(|| Error::TopologyRequest {
            method: "GET".into(),
            path: "/leader".into(),
            status: 500,
            body: "no leader".into(),
        })
    }

    async fn transfer_leader(&self, target: &str) -> Result<()> {
        self.check_reachable()?;
        self.state
            .lock()
            .calls
            .push(TopologyCall::TransferLeader(target.to_string()));
        Ok(())
    }

    async fn begin_evict_leader(&self, store_id: u64) -> Result<()> {
        self.check_reachable()?;
        self.state
            .lock()
            .calls
            .push(TopologyCall::BeginEvictLeader(store_id));
        Ok(())
    }
}

/// Control handing out the same fake for every cluster
pub struct FakeTopologyControl {
    pub topology: Arc<FakeTopology>,
}

impl TopologyControl for FakeTopologyControl {
    fn client(&self, _namespace: &str, _cluster: &str, _tls: bool) -> Result<TopologyClientRef> {
        let client: TopologyClientRef = self.topology.clone();
        Ok(client)
    }
}

// =============================================================================
// Kubernetes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeCall {
    AnnotatePod { name: String, key: String },
    AnnotatePvc { name: String, key: String },
}

#[derive(Default)]
struct KubeState {
    pods: HashMap<String, Pod>,
    sets: HashMap<String, StatefulSet>,
    pvcs: HashMap<String, PersistentVolumeClaim>,
    clusters: HashMap<String, DbCluster>,
    cluster_reads: usize,
    calls: Vec<KubeCall>,
}

/// Fake Kubernetes API, keyed by `namespace/name`
#[derive(Default)]
pub struct FakeKube {
    state: Mutex<KubeState>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn object_key(meta: &ObjectMeta) -> String {
    key(
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}

impl FakeKube {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_pod(&self, pod: Pod) {
        self.state.lock().pods.insert(object_key(&pod.metadata), pod);
    }

    pub fn put_stateful_set(&self, set: StatefulSet) {
        self.state.lock().sets.insert(object_key(&set.metadata), set);
    }

    pub fn put_pvc(&self, pvc: PersistentVolumeClaim) {
        self.state.lock().pvcs.insert(object_key(&pvc.metadata), pvc);
    }

    pub fn put_cluster(&self, cluster: DbCluster) {
        self.state
            .lock()
            .clusters
            .insert(object_key(&cluster.metadata), cluster);
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state.lock().pods.get(&key(namespace, name)).cloned()
    }

    pub fn pvc(&self, namespace: &str, name: &str) -> Option<PersistentVolumeClaim> {
        self.state.lock().pvcs.get(&key(namespace, name)).cloned()
    }

    pub fn cluster_reads(&self) -> usize {
        self.state.lock().cluster_reads
    }

    pub fn calls(&self) -> Vec<KubeCall> {
        self.state.lock().calls.clone()
    }
}

fn set_annotation(meta: &mut ObjectMeta, key: &str, value: &str) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}

fn not_found(kind: &str, name: &str) -> Error {
    Error::ResourceNotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl KubeStateClient for FakeKube {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self.pod(namespace, name))
    }

    async fn annotate_pod(
        &self,
        namespace: &str,
        name: &str,
        key_: &str,
        value: &str,
    ) -> Result<()> {
        let mut inner = self.state.lock();
        let pod = inner
            .pods
            .get_mut(&key(namespace, name))
            .ok_or_else(|| not_found("Pod", name))?;
        set_annotation(&mut pod.metadata, key_, value);
        inner.calls.push(KubeCall::AnnotatePod {
            name: name.to_string(),
            key: key_.to_string(),
        });
        Ok(())
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        Ok(self.state.lock().sets.get(&key(namespace, name)).cloned())
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        Ok(self.pvc(namespace, name))
    }

    async fn annotate_pvc(
        &self,
        namespace: &str,
        name: &str,
        key_: &str,
        value: &str,
    ) -> Result<()> {
        let mut inner = self.state.lock();
        let pvc = inner
            .pvcs
            .get_mut(&key(namespace, name))
            .ok_or_else(|| not_found("PersistentVolumeClaim", name))?;
        set_annotation(&mut pvc.metadata, key_, value);
        inner.calls.push(KubeCall::AnnotatePvc {
            name: name.to_string(),
            key: key_.to_string(),
        });
        Ok(())
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<DbCluster>> {
        let mut inner = self.state.lock();
        inner.cluster_reads += 1;
        Ok(inner.clusters.get(&key(namespace, name)).cloned())
    }
}

// =============================================================================
// Object builders
// =============================================================================

/// A pod owned by StatefulSet `set`, labelled for `cluster` and `component`
pub fn pod(namespace: &str, name: &str, cluster: &str, component: &str, set: &str) -> Pod {
    let labels = BTreeMap::from([
        (COMPONENT_LABEL.to_string(), component.to_string()),
        (INSTANCE_LABEL.to_string(), cluster.to_string()),
    ]);
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![OwnerReference {
                api_version: "apps/v1".into(),
                kind: "StatefulSet".into(),
                name: set.to_string(),
                uid: format!("uid-{}", set),
                controller: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn with_label(mut pod: Pod, key: &str, value: &str) -> Pod {
    pod.metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    pod
}

pub fn with_annotation(mut pod: Pod, key: &str, value: &str) -> Pod {
    set_annotation(&mut pod.metadata, key, value);
    pod
}

/// A StatefulSet with one claim template
pub fn stateful_set(
    namespace: &str,
    name: &str,
    replicas: i32,
    claim_template: &str,
    update_revision: Option<&str>,
) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            volume_claim_templates: Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(claim_template.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: Some(StatefulSetStatus {
            replicas,
            update_revision: update_revision.map(str::to_string),
            ..Default::default()
        }),
    }
}

pub fn pvc(namespace: &str, name: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}
