//! Kubernetes-backed cluster snapshot

use crate::crd::{Infrastructure, INFRASTRUCTURE_NAME};
use crate::domain::ports::ClusterSnapshot;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node, PersistentVolume, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, ListParams};
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Default timeout of a single Kubernetes call
pub const DEFAULT_KUBERNETES_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads cluster objects through the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    timeout: Duration,
}

impl KubeCluster {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Connect using KUBECONFIG or the in-cluster service account
    pub async fn try_default(timeout: Duration) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, timeout))
    }

    /// Run one API call under the timeout; `name` is empty for list calls
    async fn bounded<T, F>(&self, verb: &str, kind: &str, name: &str, future: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>>,
    {
        debug!("Kubernetes call: {} {} {}", verb, kind, name);
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result.map_err(|e| api_error(kind, name, e)),
            Err(_) => Err(Error::Timeout {
                operation: format!("{} {}", verb, kind),
                duration: self.timeout,
            }),
        }
    }
}

fn api_error(kind: &str, name: &str, error: kube::Error) -> Error {
    match error {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        e => Error::Kube(e),
    }
}

#[async_trait]
impl ClusterSnapshot for KubeCluster {
    async fn get_infrastructure(&self) -> Result<Infrastructure> {
        let api: Api<Infrastructure> = Api::all(self.client.clone());
        self.bounded("get", "Infrastructure", INFRASTRUCTURE_NAME, api.get(INFRASTRUCTURE_NAME))
            .await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let path = format!("{}/{}", namespace, name);
        self.bounded("get", "ConfigMap", &path, api.get(name)).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let path = format!("{}/{}", namespace, name);
        self.bounded("get", "Secret", &path, api.get(name)).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = self
            .bounded("list", "Nodes", "", api.list(&ListParams::default()))
            .await?;
        Ok(list.items)
    }

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        let list = self
            .bounded("list", "StorageClasses", "", api.list(&ListParams::default()))
            .await?;
        Ok(list.items)
    }

    async fn list_pvs(&self) -> Result<Vec<PersistentVolume>> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let list = self
            .bounded("list", "PersistentVolumes", "", api.list(&ListParams::default()))
            .await?;
        Ok(list.items)
    }
}
