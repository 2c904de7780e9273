//! Discovery Coordinator
//!
//! Tracks, per cluster generation, which placement-driver pods have asked
//! for bootstrap arguments. The last pod of the founding batch founds the
//! quorum; everyone else joins the members the quorum reports.

use super::DiscoveryConfig;
use crate::crd::PD_PEER_SERVICE_SUFFIX;
use crate::domain::ports::{KubeStateClientRef, Member, TopologyControlRef};
use crate::error::{Error, Result};
use kube::ResourceExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Parsed `pod.peerService.namespace.suffix` advertise address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseAddress {
    pub pod: String,
    pub cluster: String,
    pub namespace: String,
}

impl AdvertiseAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let parts: Vec<&str> = address.split('.').collect();
        if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidAdvertiseAddress(address.to_string()));
        }

        let cluster = parts[1]
            .strip_suffix(PD_PEER_SERVICE_SUFFIX)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidAdvertiseAddress(address.to_string()))?;

        Ok(Self {
            pod: parts[0].to_string(),
            cluster: cluster.to_string(),
            namespace: parts[2].to_string(),
        })
    }
}

/// Founding progress of one cluster generation
#[derive(Debug, Default)]
struct ClusterBootstrapState {
    resource_version: String,
    peers: HashSet<String>,
}

/// Decides founder or join arguments for starting placement-driver pods
pub struct DiscoveryCoordinator {
    config: DiscoveryConfig,
    kube: KubeStateClientRef,
    topology: TopologyControlRef,
    clusters: Mutex<HashMap<String, ClusterBootstrapState>>,
}

impl DiscoveryCoordinator {
    pub fn new(
        config: DiscoveryConfig,
        kube: KubeStateClientRef,
        topology: TopologyControlRef,
    ) -> Self {
        Self {
            config,
            kube,
            topology,
            clusters: Mutex::new(HashMap::new()),
        }
    }

    /// Bootstrap arguments for the pod advertising `advertise_peer_url`:
    /// `--initial-cluster=...` for the last pod of the founding batch,
    /// `--join=...` otherwise
    pub async fn discover(&self, advertise_peer_url: &str) -> Result<String> {
        let peer = AdvertiseAddress::parse(advertise_peer_url)?;

        if peer.namespace != self.config.namespace {
            return Err(Error::NamespaceMismatch {
                peer: peer.namespace,
                expected: self.config.namespace.clone(),
            });
        }
        if let Some(expected) = &self.config.cluster_name {
            if &peer.cluster != expected {
                return Err(Error::ClusterMismatch {
                    peer: peer.cluster,
                    expected: expected.clone(),
                });
            }
        }

        let cluster = self
            .kube
            .get_cluster(&peer.namespace, &peer.cluster)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "DbCluster".to_string(),
                name: format!("{}/{}", peer.namespace, peer.cluster),
            })?;

        let key = format!("{}/{}", peer.namespace, peer.cluster);
        let version = cluster.resource_version().unwrap_or_default();
        let replicas = usize::try_from(cluster.spec.pd.replicas).unwrap_or(0);

        {
            let mut clusters = self.clusters.lock();
            let state = clusters.entry(key.clone()).or_default();
            if state.resource_version != version {
                if !state.peers.is_empty() {
                    debug!(cluster = %key, old = %state.resource_version, new = %version, "cluster changed, discarding bootstrap progress");
                }
                state.resource_version = version.clone();
                state.peers.clear();
            }

            state.peers.insert(peer.pod.clone());
            debug!(cluster = %key, pod = %peer.pod, peers = state.peers.len(), replicas, "peer asked for bootstrap arguments");

            if state.peers.len() == replicas {
                state.peers.remove(&peer.pod);
                let scheme = if self.config.tls_enabled {
                    "https"
                } else {
                    cluster.scheme()
                };
                info!(cluster = %key, pod = %peer.pod, "founding quorum");
                return Ok(format!(
                    "--initial-cluster={}={}://{}",
                    peer.pod, scheme, advertise_peer_url
                ));
            }
        }

        let members = self
            .topology
            .client(&peer.namespace, &peer.cluster, cluster.spec.enable_tls_cluster)?
            .get_members()
            .await?;

        let urls: Vec<String> = members.members.iter().filter_map(Member::client_url).collect();
        if urls.is_empty() {
            warn!(cluster = %key, pod = %peer.pod, "quorum has no members yet");
            return Err(Error::QuorumNotReady { cluster: key });
        }

        self.leave(&key, &version, &peer.pod);
        info!(cluster = %key, pod = %peer.pod, members = urls.len(), "joining quorum");
        Ok(format!("--join={}", urls.join(",")))
    }

    /// Number of peers still waiting in the founding batch of a cluster
    pub fn pending_peers(&self, namespace: &str, cluster: &str) -> usize {
        self.clusters
            .lock()
            .get(&format!("{}/{}", namespace, cluster))
            .map(|s| s.peers.len())
            .unwrap_or(0)
    }

    /// Drop `pod` from the founding batch unless the generation moved on
    fn leave(&self, key: &str, version: &str, pod: &str) {
        if let Some(state) = self.clusters.lock().get_mut(key) {
            if state.resource_version == version {
                state.peers.remove(pod);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::db_cluster::test_cluster;
    use crate::testing::{FakeKube, FakeTopology, FakeTopologyControl};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn coordinator(cluster_name: Option<&str>) -> (DiscoveryCoordinator, Arc<FakeKube>, Arc<FakeTopology>) {
        let kube = FakeKube::new();
        kube.put_cluster(test_cluster("demo", "db", 3));
        let topology = FakeTopology::new();
        let coordinator = DiscoveryCoordinator::new(
            DiscoveryConfig {
                namespace: "db".to_string(),
                cluster_name: cluster_name.map(str::to_string),
                tls_enabled: false,
            },
            kube.clone(),
            Arc::new(FakeTopologyControl {
                topology: topology.clone(),
            }),
        );
        (coordinator, kube, topology)
    }

    fn address(ordinal: i32) -> String {
        format!("demo-pd-{}.demo-pd-peer.db.svc:2380", ordinal)
    }

    #[test]
    fn test_parse_advertise_address() {
        let parsed = AdvertiseAddress::parse("demo-pd-0.demo-pd-peer.db.svc:2380").unwrap();
        assert_eq!(
            parsed,
            AdvertiseAddress {
                pod: "demo-pd-0".into(),
                cluster: "demo".into(),
                namespace: "db".into(),
            }
        );

        for bad in [
            "",
            "demo-pd-0.demo-pd-peer.db",
            "demo-pd-0.demo-pd-peer.db.svc.cluster.local",
            "demo-pd-0.demo-peer.db.svc",
            "demo-pd-0.-pd-peer.db.svc",
            "demo-pd-0..db.svc",
        ] {
            assert_matches!(
                AdvertiseAddress::parse(bad),
                Err(Error::InvalidAdvertiseAddress(_)),
                "{}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_scope_checks() {
        let (coordinator, _, _) = coordinator(Some("demo"));

        let err = coordinator
            .discover("demo-pd-0.demo-pd-peer.other.svc:2380")
            .await
            .unwrap_err();
        assert_matches!(err, Error::NamespaceMismatch { .. });
        assert!(!err.is_retryable());

        let err = coordinator
            .discover("x-pd-0.x-pd-peer.db.svc:2380")
            .await
            .unwrap_err();
        assert_matches!(err, Error::ClusterMismatch { .. });
    }

    #[tokio::test]
    async fn test_missing_cluster_is_transient() {
        let (coordinator, _, _) = coordinator(None);
        let err = coordinator
            .discover("x-pd-0.x-pd-peer.db.svc:2380")
            .await
            .unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_last_of_founding_batch_founds() {
        let (coordinator, _, _) = coordinator(None);

        for ordinal in 0..2 {
            let err = coordinator.discover(&address(ordinal)).await.unwrap_err();
            assert_matches!(err, Error::QuorumNotReady { .. });
        }
        // Repeated calls from the same pod do not grow the batch.
        assert!(coordinator.discover(&address(1)).await.is_err());
        assert_eq!(coordinator.pending_peers("db", "demo"), 2);

        let args = coordinator.discover(&address(2)).await.unwrap();
        assert_eq!(
            args,
            "--initial-cluster=demo-pd-2=http://demo-pd-2.demo-pd-peer.db.svc:2380"
        );
        assert_eq!(coordinator.pending_peers("db", "demo"), 2);
    }

    #[tokio::test]
    async fn test_founder_is_returned_exactly_once() {
        let (coordinator, _, topology) = coordinator(None);

        let mut founders = 0;
        for ordinal in 0..3 {
            if let Ok(args) = coordinator.discover(&address(ordinal)).await {
                assert!(args.starts_with("--initial-cluster="));
                founders += 1;
                topology.add_member(&format!("demo-pd-{}", ordinal));
            }
        }
        assert_eq!(founders, 1);

        // Waiting peers retry and join the founded quorum.
        for ordinal in 0..2 {
            let args = coordinator.discover(&address(ordinal)).await.unwrap();
            assert_eq!(args, "--join=http://demo-pd-2.demo-pd-peer.db.svc:2379");
        }
        assert_eq!(coordinator.pending_peers("db", "demo"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_batch_has_one_founder() {
        let (coordinator, _, _) = coordinator(None);

        let (addr0, addr1, addr2) = (address(0), address(1), address(2));
        let (a, b, c) = tokio::join!(
            coordinator.discover(&addr0),
            coordinator.discover(&addr1),
            coordinator.discover(&addr2),
        );

        let founders: Vec<String> = [a, b, c].into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(founders.len(), 1);
        assert!(founders[0].starts_with("--initial-cluster="));
        assert_eq!(coordinator.pending_peers("db", "demo"), 2);
    }

    #[tokio::test]
    async fn test_join_lists_all_members() {
        let (coordinator, _, topology) = coordinator(None);
        topology.add_member("demo-pd-0");
        topology.add_member("demo-pd-1");

        let args = coordinator.discover(&address(2)).await.unwrap();
        assert_eq!(
            args,
            "--join=http://demo-pd-0.demo-pd-peer.db.svc:2379,http://demo-pd-1.demo-pd-peer.db.svc:2379"
        );
        assert_eq!(coordinator.pending_peers("db", "demo"), 0);
    }

    #[tokio::test]
    async fn test_cluster_change_resets_progress() {
        let (coordinator, kube, _) = coordinator(None);

        for ordinal in 0..2 {
            assert!(coordinator.discover(&address(ordinal)).await.is_err());
        }
        assert_eq!(coordinator.pending_peers("db", "demo"), 2);

        let mut cluster = test_cluster("demo", "db", 3);
        cluster.metadata.resource_version = Some("2".to_string());
        kube.put_cluster(cluster);

        let err = coordinator.discover(&address(2)).await.unwrap_err();
        assert_matches!(err, Error::QuorumNotReady { .. });
        assert_eq!(coordinator.pending_peers("db", "demo"), 1);
    }

    #[tokio::test]
    async fn test_unreachable_quorum_keeps_peer_waiting() {
        let (coordinator, _, topology) = coordinator(None);
        topology.set_unreachable(true);

        let err = coordinator.discover(&address(0)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(coordinator.pending_peers("db", "demo"), 1);
    }
}
