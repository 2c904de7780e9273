//! Placement Driver Control
//!
//! Hands out one `PdClient` per cluster, reusing HTTP connection pools
//! across admission requests. Only connection handles are cached; every
//! topology read goes to the quorum.

use super::pd_client::PdClient;
use crate::crd::pd_client_url;
use crate::domain::ports::{TopologyClientRef, TopologyControl};
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for placement-driver clients
#[derive(Debug, Clone)]
pub struct PdControlConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Use TLS for every cluster, regardless of its own setting
    pub force_tls: bool,
}

impl Default for PdControlConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            force_tls: false,
        }
    }
}

/// Factory and cache of placement-driver clients, keyed by cluster
pub struct PdControl {
    config: PdControlConfig,
    clients: DashMap<String, Arc<PdClient>>,
}

impl PdControl {
    /// Create a new control
    pub fn new(config: PdControlConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    /// Number of cached clients
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}

impl TopologyControl for PdControl {
    fn client(&self, namespace: &str, cluster: &str, tls: bool) -> Result<TopologyClientRef> {
        let scheme = if tls || self.config.force_tls {
            "https"
        } else {
            "http"
        };
        let url = pd_client_url(scheme, cluster, namespace);

        if let Some(entry) = self.clients.get(&url) {
            let client: TopologyClientRef = entry.value().clone();
            return Ok(client);
        }

        debug!(url = %url, "creating placement driver client");
        let client = Arc::new(PdClient::new(url.clone(), self.config.request_timeout)?);
        let client: TopologyClientRef = self.clients.entry(url).or_insert(client).value().clone();
        Ok(client)
    }
}
