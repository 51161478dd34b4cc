//! Infrastructure CRD
//!
//! Read-only mirror of the OpenShift `config.openshift.io/v1` Infrastructure
//! resource. Only the fields the checks consume are modelled: the cloud
//! config ConfigMap reference, the cluster ID used in dynamic volume names,
//! and the platform type.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the singleton Infrastructure object
pub const INFRASTRUCTURE_NAME: &str = "cluster";

// =============================================================================
// Infrastructure CRD
// =============================================================================

/// Cluster-wide infrastructure settings published by the installer.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Infrastructure",
    plural = "infrastructures",
    status = "InfrastructureStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureSpec {
    /// Reference to the ConfigMap holding the cloud provider config
    #[serde(default)]
    pub cloud_config: ConfigMapFileReference,
}

/// Key inside a ConfigMap in the openshift-config namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapFileReference {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
}

// =============================================================================
// Status
// =============================================================================

/// Observed infrastructure state
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    /// Unique cluster ID, used as the prefix of dynamically provisioned disks
    #[serde(default)]
    pub infrastructure_name: String,

    /// Platform the cluster runs on
    #[serde(default)]
    pub platform_status: Option<PlatformStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatus {
    #[serde(rename = "type", default)]
    pub platform_type: PlatformType,
}

/// Platform type as reported in the Infrastructure status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PlatformType {
    VSphere,
    AWS,
    Azure,
    GCP,
    OpenStack,
    BareMetal,
    #[default]
    None,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformType::VSphere => write!(f, "VSphere"),
            PlatformType::AWS => write!(f, "AWS"),
            PlatformType::Azure => write!(f, "Azure"),
            PlatformType::GCP => write!(f, "GCP"),
            PlatformType::OpenStack => write!(f, "OpenStack"),
            PlatformType::BareMetal => write!(f, "BareMetal"),
            PlatformType::None => write!(f, "None"),
            PlatformType::Other => write!(f, "Other"),
        }
    }
}

impl Infrastructure {
    /// Cluster ID, empty when the installer has not published it yet
    pub fn cluster_id(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.infrastructure_name.as_str())
            .unwrap_or_default()
    }

    /// Platform type, `None` when no platform status is present
    pub fn platform_type(&self) -> PlatformType {
        self.status
            .as_ref()
            .and_then(|s| s.platform_status.as_ref())
            .map(|p| p.platform_type.clone())
            .unwrap_or_default()
    }

    /// Build an Infrastructure object for a vSphere cluster
    pub fn vsphere(cluster_id: &str, cloud_config: ConfigMapFileReference) -> Self {
        let mut infra = Infrastructure::new(INFRASTRUCTURE_NAME, InfrastructureSpec { cloud_config });
        infra.status = Some(InfrastructureStatus {
            infrastructure_name: cluster_id.to_string(),
            platform_status: Some(PlatformStatus {
                platform_type: PlatformType::VSphere,
            }),
        });
        infra
    }
}
