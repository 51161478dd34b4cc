//! Domain Ports - Core trait definitions for the problem detector
//!
//! These traits define the boundaries between the checks and the systems
//! they inspect. The checks only ever see already-materialized cluster
//! objects and a live vSphere session; adapters implement these traits to
//! provide concrete functionality.

use crate::crd::Infrastructure;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node, PersistentVolume, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// vSphere Object Types
// =============================================================================

/// Reference to a vSphere managed object (type + moref value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    /// Managed object type, e.g. `Datastore`
    pub kind: String,
    /// Managed object id, e.g. `datastore-123`
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// A managed object together with its `name` property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedObject {
    pub reference: ManagedObjectRef,
    pub name: String,
}

/// Datacenter found by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterRef {
    pub reference: ManagedObjectRef,
    pub name: String,
}

/// Datastore found by name inside a datacenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreRef {
    pub reference: ManagedObjectRef,
    pub name: String,
    /// Name of the datacenter the datastore was found in
    pub datacenter: String,
}

impl DatastoreRef {
    /// Datastore path in `[name] path` notation
    pub fn path(&self, path: &str) -> String {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            format!("[{}]", self.name)
        } else {
            format!("[{}] {}", self.name, trimmed)
        }
    }
}

/// One entry returned by a datastore browser search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
}

/// Virtual machine found by UUID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRef {
    pub reference: ManagedObjectRef,
    pub name: Option<String>,
}

/// Subset of a VM's `config.flags`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmFlags {
    /// `disk.enableUUID`; `None` when the VM config does not set it
    pub disk_uuid_enabled: Option<bool>,
}

/// Entry of the vCenter task manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub key: String,
    pub name: String,
}

// =============================================================================
// Storage Policy Types
// =============================================================================

/// Policy-based-management profile id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageProfileId(pub String);

impl std::fmt::Display for StorageProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage requirement profile ("storage policy")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProfile {
    pub id: StorageProfileId,
    pub name: String,
}

/// Placement hub submitted to a compatibility check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementHub {
    pub hub_type: String,
    pub hub_id: String,
}

impl From<&ManagedObjectRef> for PlacementHub {
    fn from(reference: &ManagedObjectRef) -> Self {
        Self {
            hub_type: reference.kind.clone(),
            hub_id: reference.value.clone(),
        }
    }
}

// =============================================================================
// Cluster Snapshot Port
// =============================================================================

/// Port for reading cluster state. Implementations never mutate objects.
#[async_trait]
pub trait ClusterSnapshot: Send + Sync {
    /// Get the cluster-wide Infrastructure object
    async fn get_infrastructure(&self) -> Result<Infrastructure>;

    /// Get a ConfigMap
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap>;

    /// Get a Secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// List all Nodes
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// List all StorageClasses
    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>>;

    /// List all PersistentVolumes
    async fn list_pvs(&self) -> Result<Vec<PersistentVolume>>;
}

// =============================================================================
// vSphere Session Port
// =============================================================================

/// Port for a live, already authenticated vSphere session.
///
/// Each method is a single remote call; callers bound every call with their
/// own timeout (see [`crate::vsphere::call`]).
#[async_trait]
pub trait VSphereSession: Send + Sync {
    /// Find a datacenter by name
    async fn find_datacenter(&self, name: &str) -> Result<DatacenterRef>;

    /// Find a datastore by name inside a datacenter
    async fn find_datastore(&self, datacenter: &DatacenterRef, name: &str) -> Result<DatastoreRef>;

    /// List files matching `*` under `path` of a datastore.
    ///
    /// A missing directory is reported as [`crate::Error::FileNotFound`].
    async fn search_datastore(&self, datastore: &DatastoreRef, path: &str) -> Result<Vec<FileInfo>>;

    /// List every datastore reachable from the root folder, recursively
    async fn list_datastores(&self) -> Result<Vec<NamedObject>>;

    /// Ids of all storage requirement profiles
    async fn query_storage_profiles(&self) -> Result<Vec<StorageProfileId>>;

    /// Content of the given profiles; unknown ids are omitted
    async fn retrieve_storage_profiles(&self, ids: &[StorageProfileId]) -> Result<Vec<StorageProfile>>;

    /// Hubs compatible with a profile, out of the submitted ones
    async fn check_placement(
        &self,
        profile: &StorageProfileId,
        hubs: &[PlacementHub],
    ) -> Result<Vec<PlacementHub>>;

    /// Collect tasks visible through a task view of the task manager
    async fn collect_tasks(&self) -> Result<Vec<TaskInfo>>;

    /// Find a VM by its BIOS UUID inside a datacenter
    async fn find_vm_by_uuid(&self, datacenter: &DatacenterRef, uuid: &str) -> Result<Option<VmRef>>;

    /// Load the `config.flags` of a VM
    async fn vm_flags(&self, vm: &VmRef) -> Result<VmFlags>;
}

// =============================================================================
// Path Escaper Port
// =============================================================================

/// Port mapping an absolute path to its systemd unit-name form
#[async_trait]
pub trait PathEscaper: Send + Sync {
    /// Escape an absolute path
    async fn escape(&self, path: &str) -> Result<String>;

    /// Short name for logs
    fn name(&self) -> &str;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ClusterSnapshotRef = Arc<dyn ClusterSnapshot>;
pub type VSphereSessionRef = Arc<dyn VSphereSession>;
pub type PathEscaperRef = Arc<dyn PathEscaper>;
