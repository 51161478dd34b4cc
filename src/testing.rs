//! In-memory cluster and vSphere fakes used by unit tests

use crate::crd::{ConfigMapFileReference, Infrastructure};
use crate::domain::ports::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, Node, NodeSpec, PersistentVolume, PersistentVolumeSpec, Secret,
    VsphereVirtualDiskVolumeSource,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

pub const TEST_CLUSTER_ID: &str = "ocp-4xk2p";

fn injected(operation: &str) -> Error {
    Error::Transport {
        operation: operation.to_string(),
        reason: "permission denied".to_string(),
    }
}

// =============================================================================
// Fake vSphere
// =============================================================================

#[derive(Default)]
pub struct FakeVSphere {
    datacenters: Vec<String>,
    datastores: Vec<NamedObject>,
    directories: HashSet<(String, String)>,
    profiles: Vec<StorageProfile>,
    compatible: HashMap<String, Vec<String>>,
    tasks: Vec<TaskInfo>,
    vms: HashMap<String, (VmRef, VmFlags)>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    no_vm_flags: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeVSphere {
    pub fn new() -> Self {
        Self {
            datacenters: vec!["DC0".to_string()],
            ..Default::default()
        }
    }

    pub fn with_datastore(mut self, id: &str, name: &str) -> Self {
        self.datastores.push(NamedObject {
            reference: ManagedObjectRef::new("Datastore", id),
            name: name.to_string(),
        });
        self
    }

    pub fn with_directory(mut self, datastore: &str, path: &str) -> Self {
        self.directories
            .insert((datastore.to_string(), path.to_string()));
        self
    }

    pub fn with_profile(mut self, id: &str, name: &str) -> Self {
        self.profiles.push(StorageProfile {
            id: StorageProfileId(id.to_string()),
            name: name.to_string(),
        });
        self
    }

    pub fn with_compatible(mut self, profile_id: &str, datastore_ids: &[&str]) -> Self {
        self.compatible.insert(
            profile_id.to_string(),
            datastore_ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_task(mut self, name: &str) -> Self {
        let key = format!("task-{}", self.tasks.len() + 1);
        self.tasks.push(TaskInfo {
            key,
            name: name.to_string(),
        });
        self
    }

    pub fn with_vm(mut self, uuid: &str, name: &str, disk_uuid_enabled: Option<bool>) -> Self {
        let vm = VmRef {
            reference: ManagedObjectRef::new("VirtualMachine", format!("vm-{}", self.vms.len() + 1)),
            name: Some(name.to_string()),
        };
        self.vms.insert(
            uuid.to_lowercase(),
            (vm, VmFlags { disk_uuid_enabled }),
        );
        self
    }

    /// Make every call of `operation` fail with a transport error
    pub fn failing(mut self, operation: &str) -> Self {
        self.failing.insert(operation.to_string());
        self
    }

    /// Make every call of `operation` never complete
    pub fn hanging(mut self, operation: &str) -> Self {
        self.hanging.insert(operation.to_string());
        self
    }

    /// Behave like a backend that cannot read VM flags
    pub fn without_vm_flags(mut self) -> Self {
        self.no_vm_flags = true;
        self
    }

    /// Operations called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    async fn enter(&self, operation: &str) -> Result<()> {
        self.calls.lock().push(operation.to_string());
        if self.hanging.contains(operation) {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        if self.failing.contains(operation) {
            return Err(injected(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl VSphereSession for FakeVSphere {
    async fn find_datacenter(&self, name: &str) -> Result<DatacenterRef> {
        self.enter("find datacenter").await?;
        if !self.datacenters.iter().any(|dc| dc == name) {
            return Err(Error::NotFound {
                kind: "Datacenter".into(),
                name: name.into(),
            });
        }
        Ok(DatacenterRef {
            reference: ManagedObjectRef::new("Datacenter", "datacenter-1"),
            name: name.to_string(),
        })
    }

    async fn find_datastore(&self, datacenter: &DatacenterRef, name: &str) -> Result<DatastoreRef> {
        self.enter("find datastore").await?;
        self.datastores
            .iter()
            .find(|ds| ds.name == name)
            .map(|ds| DatastoreRef {
                reference: ds.reference.clone(),
                name: ds.name.clone(),
                datacenter: datacenter.name.clone(),
            })
            .ok_or_else(|| Error::NotFound {
                kind: "Datastore".into(),
                name: name.into(),
            })
    }

    async fn search_datastore(&self, datastore: &DatastoreRef, path: &str) -> Result<Vec<FileInfo>> {
        self.enter("search datastore").await?;
        let exists = path == "/"
            || self
                .directories
                .contains(&(datastore.name.clone(), path.to_string()));
        if !exists {
            return Err(Error::FileNotFound {
                path: datastore.path(path),
            });
        }
        Ok(self
            .directories
            .iter()
            .filter(|(ds, dir)| *ds == datastore.name && dir != path)
            .map(|(_, dir)| FileInfo {
                path: dir.trim_start_matches('/').to_string(),
            })
            .collect())
    }

    async fn list_datastores(&self) -> Result<Vec<NamedObject>> {
        self.enter("list datastores").await?;
        Ok(self.datastores.clone())
    }

    async fn query_storage_profiles(&self) -> Result<Vec<StorageProfileId>> {
        self.enter("query storage profiles").await?;
        Ok(self.profiles.iter().map(|p| p.id.clone()).collect())
    }

    async fn retrieve_storage_profiles(&self, ids: &[StorageProfileId]) -> Result<Vec<StorageProfile>> {
        self.enter("retrieve storage profiles").await?;
        Ok(self
            .profiles
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn check_placement(
        &self,
        profile: &StorageProfileId,
        hubs: &[PlacementHub],
    ) -> Result<Vec<PlacementHub>> {
        self.enter("check placement").await?;
        let compatible = self.compatible.get(&profile.0).cloned().unwrap_or_default();
        Ok(compatible
            .iter()
            .filter_map(|id| hubs.iter().find(|h| &h.hub_id == id).cloned())
            .collect())
    }

    async fn collect_tasks(&self) -> Result<Vec<TaskInfo>> {
        self.enter("collect tasks").await?;
        Ok(self.tasks.clone())
    }

    async fn find_vm_by_uuid(&self, _datacenter: &DatacenterRef, uuid: &str) -> Result<Option<VmRef>> {
        self.enter("find vm").await?;
        Ok(self.vms.get(uuid).map(|(vm, _)| vm.clone()))
    }

    async fn vm_flags(&self, vm: &VmRef) -> Result<VmFlags> {
        self.enter("vm flags").await?;
        if self.no_vm_flags {
            return Err(Error::Unsupported {
                operation: "vm flags".into(),
            });
        }
        self.vms
            .values()
            .find(|(v, _)| v == vm)
            .map(|(_, flags)| *flags)
            .ok_or_else(|| Error::NotFound {
                kind: "VirtualMachine".into(),
                name: vm.reference.value.clone(),
            })
    }
}

// =============================================================================
// Fake Cluster
// =============================================================================

pub struct FakeCluster {
    pub infrastructure: Infrastructure,
    pub config_maps: BTreeMap<(String, String), ConfigMap>,
    pub secrets: BTreeMap<(String, String), Secret>,
    pub nodes: Vec<Node>,
    pub storage_classes: Vec<StorageClass>,
    pub pvs: Vec<PersistentVolume>,
    failing: HashSet<String>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::with_cluster_id(TEST_CLUSTER_ID)
    }

    pub fn with_cluster_id(cluster_id: &str) -> Self {
        Self {
            infrastructure: Infrastructure::vsphere(
                cluster_id,
                ConfigMapFileReference {
                    name: "cloud-provider-config".into(),
                    key: "config".into(),
                },
            ),
            config_maps: BTreeMap::new(),
            secrets: BTreeMap::new(),
            nodes: Vec::new(),
            storage_classes: Vec::new(),
            pvs: Vec::new(),
            failing: HashSet::new(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_storage_class(mut self, sc: StorageClass) -> Self {
        self.storage_classes.push(sc);
        self
    }

    pub fn with_pv(mut self, pv: PersistentVolume) -> Self {
        self.pvs.push(pv);
        self
    }

    pub fn with_config_map(mut self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        let cm = ConfigMap {
            metadata: meta(name),
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        };
        self.config_maps
            .insert((namespace.to_string(), name.to_string()), cm);
        self
    }

    pub fn with_secret(mut self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        let secret = Secret {
            metadata: meta(name),
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        };
        self.secrets
            .insert((namespace.to_string(), name.to_string()), secret);
        self
    }

    pub fn failing(mut self, operation: &str) -> Self {
        self.failing.insert(operation.to_string());
        self
    }

    fn enter(&self, operation: &str) -> Result<()> {
        if self.failing.contains(operation) {
            return Err(injected(operation));
        }
        Ok(())
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterSnapshot for FakeCluster {
    async fn get_infrastructure(&self) -> Result<Infrastructure> {
        self.enter("get infrastructure")?;
        Ok(self.infrastructure.clone())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        self.enter("get configmap")?;
        self.config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "ConfigMap".into(),
                name: format!("{}/{}", namespace, name),
            })
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.enter("get secret")?;
        self.secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "Secret".into(),
                name: format!("{}/{}", namespace, name),
            })
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.enter("list nodes")?;
        Ok(self.nodes.clone())
    }

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>> {
        self.enter("list storageclasses")?;
        Ok(self.storage_classes.clone())
    }

    async fn list_pvs(&self) -> Result<Vec<PersistentVolume>> {
        self.enter("list pvs")?;
        Ok(self.pvs.clone())
    }
}

// =============================================================================
// Object Builders
// =============================================================================

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

pub fn node(name: &str, provider_id: Option<&str>) -> Node {
    Node {
        metadata: meta(name),
        spec: Some(NodeSpec {
            provider_id: provider_id.map(str::to_string),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn storage_class(name: &str, provisioner: &str, parameters: &[(&str, &str)]) -> StorageClass {
    StorageClass {
        metadata: meta(name),
        provisioner: provisioner.to_string(),
        parameters: Some(
            parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn vsphere_pv(name: &str, volume_path: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: meta(name),
        spec: Some(PersistentVolumeSpec {
            vsphere_volume: Some(VsphereVirtualDiskVolumeSource {
                volume_path: volume_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn other_pv(name: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: meta(name),
        spec: Some(PersistentVolumeSpec::default()),
        ..Default::default()
    }
}
