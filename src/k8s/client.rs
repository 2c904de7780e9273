//! Kubernetes State Client
//!
//! `KubeStateClient` implementation over `kube::Api`.

use crate::crd::DbCluster;
use crate::domain::ports::KubeStateClient;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Kubernetes client backed by the API server
#[derive(Clone)]
pub struct KubeApiClient {
    client: Client,
}

impl KubeApiClient {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Get an object, mapping 404 to `None`
async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Merge patch setting a single annotation
fn annotation_patch(key: &str, value: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                key: value
            }
        }
    })
}

#[async_trait]
impl KubeStateClient for KubeApiClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        get_opt(&self.api::<Pod>(namespace), name).await
    }

    async fn annotate_pod(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        debug!(namespace = %namespace, pod = %name, key = %key, "annotating pod");
        self.api::<Pod>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&annotation_patch(key, value)))
            .await?;
        Ok(())
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        get_opt(&self.api::<StatefulSet>(namespace), name).await
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        get_opt(&self.api::<PersistentVolumeClaim>(namespace), name).await
    }

    async fn annotate_pvc(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        debug!(namespace = %namespace, pvc = %name, key = %key, "annotating volume claim");
        self.api::<PersistentVolumeClaim>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&annotation_patch(key, value)))
            .await?;
        Ok(())
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<DbCluster>> {
        get_opt(&self.api::<DbCluster>(namespace), name).await
    }
}
