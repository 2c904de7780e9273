//! Placement Driver HTTP Client
//!
//! Talks to the placement-driver quorum's HTTP API (`/pd/api/v1`).

use crate::domain::ports::{Member, MembersInfo, StoreInfo, StoresInfo, TopologyClient};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

const API_PREFIX: &str = "/pd/api/v1";

/// Scheduler the quorum uses to move leaderships off a store
const EVICT_LEADER_SCHEDULER: &str = "evict-leader-scheduler";

#[derive(Debug, Serialize)]
struct SchedulerRequest<'a> {
    name: &'a str,
    store_id: u64,
}

/// Client for one cluster's placement-driver quorum
pub struct PdClient {
    base_url: String,
    http: reqwest::Client,
}

impl PdClient {
    /// Create a client for the quorum reachable at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::TopologyConnection)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Base URL of the quorum
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(method = %method, path = %path, "placement driver request");
        Ok(request.send().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.send(Method::GET, path, None).await?;
        let resp = check_status(Method::GET, path, resp).await?;
        Ok(resp.json::<T>().await?)
    }
}

/// Turn a non-success response into `Error::TopologyRequest`
async fn check_status(
    method: Method,
    path: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(Error::TopologyRequest {
        method: method.to_string(),
        path: path.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Whether a failed lookup of `store_id` means the store does not exist.
/// Other "not found" errors (a missing leader, say) stay errors.
fn is_store_not_found(store_id: u64, status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND
        || body.contains(&format!("invalid store ID {}, not found", store_id))
}

#[async_trait]
impl TopologyClient for PdClient {
    async fn get_members(&self) -> Result<MembersInfo> {
        self.get_json("/members").await
    }

    async fn get_stores(&self) -> Result<StoresInfo> {
        self.get_json("/stores").await
    }

    async fn get_store(&self, store_id: u64) -> Result<Option<StoreInfo>> {
        let path = format!("/store/{}", store_id);
        let resp = self.send(Method::GET, &path, None).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(Some(resp.json::<StoreInfo>().await?));
        }

        let body = resp.text().await.unwrap_or_default();
        if is_store_not_found(store_id, status, &body) {
            debug!(store_id, "store not found in placement driver");
            return Ok(None);
        }

        Err(Error::TopologyRequest {
            method: Method::GET.to_string(),
            path,
            status: status.as_u16(),
            body,
        })
    }

    async fn delete_store(&self, store_id: u64) -> Result<()> {
        let path = format!("/store/{}", store_id);
        info!(store_id, "removing store from placement driver");
        let resp = self.send(Method::DELETE, &path, None).await?;
        check_status(Method::DELETE, &path, resp).await?;
        Ok(())
    }

    async fn delete_member(&self, name: &str) -> Result<()> {
        let path = format!("/members/name/{}", name);
        info!(member = %name, "removing placement driver member");
        let resp = self.send(Method::DELETE, &path, None).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(member = %name, "member already removed");
            return Ok(());
        }
        check_status(Method::DELETE, &path, resp).await?;
        Ok(())
    }

    async fn get_leader(&self) -> Result<Member> {
        self.get_json("/leader").await
    }

    async fn transfer_leader(&self, target: &str) -> Result<()> {
        let path = format!("/leader/transfer/{}", target);
        info!(target = %target, "transferring placement driver leadership");
        let resp = self.send(Method::POST, &path, None).await?;
        check_status(Method::POST, &path, resp).await?;
        Ok(())
    }

    async fn begin_evict_leader(&self, store_id: u64) -> Result<()> {
        let path = "/schedulers";
        let request = SchedulerRequest {
            name: EVICT_LEADER_SCHEDULER,
            store_id,
        };
        info!(store_id, "beginning leader eviction");
        let resp = self
            .send(Method::POST, path, Some(serde_json::to_value(&request)?))
            .await?;
        check_status(Method::POST, path, resp).await?;
        Ok(())
    }
}
