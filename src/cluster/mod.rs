//! Cluster access
//!
//! [`KubeCluster`] reads cluster objects through the Kubernetes API. The
//! helpers here locate the vSphere cloud config and the vCenter credentials
//! the cluster itself uses.

pub mod client;

pub use client::*;

use crate::crd::PlatformType;
use crate::domain::ports::ClusterSnapshot;
use crate::error::{Error, Result};
use crate::vsphere::VSphereConfig;
use tracing::debug;

/// Namespace of the cloud provider ConfigMap
pub const CLOUD_CONFIG_NAMESPACE: &str = "openshift-config";

/// vCenter login
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Load the vSphere cloud config referenced by the Infrastructure object
pub async fn load_vsphere_config(cluster: &dyn ClusterSnapshot) -> Result<VSphereConfig> {
    let infra = cluster.get_infrastructure().await?;
    let platform = infra.platform_type();
    debug!("Got Infrastructure with Platform {:?}", platform.to_string());
    if platform != PlatformType::VSphere {
        return Err(Error::UnsupportedPlatform(platform.to_string()));
    }

    let reference = &infra.spec.cloud_config;
    let cm = cluster
        .get_config_map(CLOUD_CONFIG_NAMESPACE, &reference.name)
        .await
        .map_err(|e| e.context("failed to get cluster config"))?;

    let data = cm
        .data
        .as_ref()
        .and_then(|d| d.get(&reference.key))
        .ok_or_else(|| Error::NotFound {
            kind: format!(
                "Cluster config {}/{} key",
                CLOUD_CONFIG_NAMESPACE, reference.name
            ),
            name: reference.key.clone(),
        })?;
    debug!(
        "Got ConfigMap {}/{} with config:\n{}",
        CLOUD_CONFIG_NAMESPACE, reference.name, data
    );

    VSphereConfig::parse(data).map_err(|e| e.context("failed to parse config"))
}

/// Read the vCenter credentials from the Secret named in the config.
///
/// The Secret stores them under `<server>.username` and `<server>.password`.
pub async fn credentials(cluster: &dyn ClusterSnapshot, config: &VSphereConfig) -> Result<Credentials> {
    let namespace = &config.global.secret_namespace;
    let name = &config.global.secret_name;
    let secret = cluster
        .get_secret(namespace, name)
        .await
        .map_err(|e| e.context(format!("failed to get cluster secret {}/{}", namespace, name)))?;
    debug!("Got Secret {}/{}", namespace, name);

    let data = secret.data.unwrap_or_default();
    let field = |suffix: &str| -> Result<String> {
        let key = format!("{}.{}", config.vcenter(), suffix);
        data.get(&key)
            .map(|v| String::from_utf8_lossy(&v.0).into_owned())
            .ok_or_else(|| {
                Error::Configuration(format!("secret {}/{} has no key {}", namespace, name, key))
            })
    };

    Ok(Credentials {
        username: field("username")?,
        password: field("password")?,
    })
}
