//! vCenter Automation REST API session
//!
//! Implements [`VSphereSession`] on top of the `/api` endpoints of vCenter
//! 7.0 and later. Datastore browsing goes through the `/folder` file
//! access endpoint, which answers with an HTML directory listing.
//!
//! VM lookup by BIOS UUID and `config.flags` are not part of the REST API;
//! those go through a [`SoapSession`] opened on first use.

use super::soap::SoapSession;
use super::VSphereConfig;
use crate::cluster::Credentials;
use crate::domain::ports::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Header carrying the session token
pub const SESSION_HEADER: &str = "vmware-api-session-id";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct DatacenterSummary {
    datacenter: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DatastoreSummary {
    datastore: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct PolicySummary {
    policy: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CompatibilitySpec<'a> {
    datastores: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CompatibilityResult {
    #[serde(default)]
    compatible_datastores: Vec<DatastoreCompatibility>,
}

#[derive(Debug, Deserialize)]
struct DatastoreCompatibility {
    datastore: String,
}

#[derive(Debug, Deserialize)]
struct TaskSummary {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    operation: Option<String>,
}

// =============================================================================
// REST Session
// =============================================================================

/// Authenticated session against one vCenter
pub struct RestSession {
    client: Client,
    base_url: String,
    token: String,
    credentials: Credentials,
    soap: OnceCell<SoapSession>,
}

impl std::fmt::Debug for RestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSession")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestSession {
    /// Log in to the vCenter named in `config`
    pub async fn login(config: &VSphereConfig, credentials: &Credentials) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.global.insecure_flag)
            .build()?;
        Self::login_at(client, base_url(config.vcenter(), config.port()), credentials).await
    }

    async fn login_at(client: Client, base_url: String, credentials: &Credentials) -> Result<Self> {
        info!("Logging in to vCenter {} as {}", base_url, credentials.username);
        let response = client
            .post(format!("{}/api/session", base_url))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await?;
        let response = check_status("login", response).await?;
        let token: String = response.json().await?;

        Ok(Self {
            client,
            base_url,
            token,
            credentials: credentials.clone(),
            soap: OnceCell::new(),
        })
    }

    /// End the session on the server
    pub async fn logout(&self) -> Result<()> {
        if let Some(soap) = self.soap.get() {
            if let Err(e) = soap.logout().await {
                warn!("Failed to end SOAP session: {}", e);
            }
        }
        let request = self.client.delete(self.url("/api/session"));
        self.send("logout", request).await?;
        debug!("Logged out of vCenter {}", self.base_url);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.header(SESSION_HEADER, &self.token).send().await?;
        check_status(operation, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T> {
        debug!("vCenter GET {}", path);
        let response = self.send(operation, self.client.get(self.url(path))).await?;
        Ok(response.json().await?)
    }

    async fn soap(&self) -> Result<&SoapSession> {
        self.soap
            .get_or_try_init(|| SoapSession::login(self.client.clone(), &self.base_url, &self.credentials))
            .await
    }

    async fn policies(&self) -> Result<Vec<PolicySummary>> {
        self.get_json("list storage policies", "/api/vcenter/storage/policies")
            .await
    }
}

#[async_trait]
impl VSphereSession for RestSession {
    async fn find_datacenter(&self, name: &str) -> Result<DatacenterRef> {
        let path = format!("/api/vcenter/datacenter?names={}", encode(name));
        let found: Vec<DatacenterSummary> = self.get_json("find datacenter", &path).await?;
        found
            .into_iter()
            .next()
            .map(|dc| DatacenterRef {
                reference: ManagedObjectRef::new("Datacenter", dc.datacenter),
                name: dc.name,
            })
            .ok_or_else(|| Error::NotFound {
                kind: "Datacenter".into(),
                name: name.into(),
            })
    }

    async fn find_datastore(&self, datacenter: &DatacenterRef, name: &str) -> Result<DatastoreRef> {
        let path = format!(
            "/api/vcenter/datastore?names={}&datacenters={}",
            encode(name),
            encode(&datacenter.reference.value)
        );
        let found: Vec<DatastoreSummary> = self.get_json("find datastore", &path).await?;
        found
            .into_iter()
            .next()
            .map(|ds| DatastoreRef {
                reference: ManagedObjectRef::new("Datastore", ds.datastore),
                name: ds.name,
                datacenter: datacenter.name.clone(),
            })
            .ok_or_else(|| Error::NotFound {
                kind: "Datastore".into(),
                name: name.into(),
            })
    }

    async fn search_datastore(&self, datastore: &DatastoreRef, path: &str) -> Result<Vec<FileInfo>> {
        let url = self.url(&folder_path(path, &datastore.datacenter, &datastore.name));
        debug!("vCenter GET {}", url);
        let response = self
            .client
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::FileNotFound {
                path: datastore.path(path),
            });
        }
        let response = check_status("search datastore", response).await?;
        let body = response.text().await?;
        Ok(parse_folder_listing(&body))
    }

    async fn list_datastores(&self) -> Result<Vec<NamedObject>> {
        let found: Vec<DatastoreSummary> = self
            .get_json("list datastores", "/api/vcenter/datastore")
            .await?;
        Ok(found
            .into_iter()
            .map(|ds| NamedObject {
                reference: ManagedObjectRef::new("Datastore", ds.datastore),
                name: ds.name,
            })
            .collect())
    }

    async fn query_storage_profiles(&self) -> Result<Vec<StorageProfileId>> {
        Ok(self
            .policies()
            .await?
            .into_iter()
            .map(|p| StorageProfileId(p.policy))
            .collect())
    }

    async fn retrieve_storage_profiles(&self, ids: &[StorageProfileId]) -> Result<Vec<StorageProfile>> {
        Ok(self
            .policies()
            .await?
            .into_iter()
            .filter(|p| ids.iter().any(|id| id.0 == p.policy))
            .map(|p| StorageProfile {
                id: StorageProfileId(p.policy),
                name: p.name,
            })
            .collect())
    }

    async fn check_placement(
        &self,
        profile: &StorageProfileId,
        hubs: &[PlacementHub],
    ) -> Result<Vec<PlacementHub>> {
        let path = format!(
            "/api/vcenter/storage/policies/{}?action=check-compatibility",
            encode(&profile.0)
        );
        let spec = CompatibilitySpec {
            datastores: hubs.iter().map(|h| h.hub_id.as_str()).collect(),
        };
        let request = self.client.post(self.url(&path)).json(&spec);
        let result: CompatibilityResult = self
            .send("check placement", request)
            .await?
            .json()
            .await?;

        Ok(result
            .compatible_datastores
            .into_iter()
            .filter_map(|c| hubs.iter().find(|h| h.hub_id == c.datastore).cloned())
            .collect())
    }

    async fn collect_tasks(&self) -> Result<Vec<TaskInfo>> {
        let tasks: BTreeMap<String, TaskSummary> =
            self.get_json("collect tasks", "/api/cis/tasks").await?;
        Ok(tasks
            .into_iter()
            .map(|(key, task)| TaskInfo {
                name: task_name(task.service.as_deref(), task.operation.as_deref()),
                key,
            })
            .collect())
    }

    async fn find_vm_by_uuid(&self, datacenter: &DatacenterRef, uuid: &str) -> Result<Option<VmRef>> {
        let found = self
            .soap()
            .await?
            .find_vm_by_uuid(&datacenter.reference.value, uuid)
            .await?;
        Ok(found.map(|id| VmRef {
            reference: ManagedObjectRef::new("VirtualMachine", id),
            name: None,
        }))
    }

    async fn vm_flags(&self, vm: &VmRef) -> Result<VmFlags> {
        let disk_uuid_enabled = self
            .soap()
            .await?
            .disk_uuid_enabled(&vm.reference.value)
            .await?;
        Ok(VmFlags { disk_uuid_enabled })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn base_url(server: &str, port: u16) -> String {
    if port == 443 {
        format!("https://{}", server)
    } else {
        format!("https://{}:{}", server, port)
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// `/folder` URL of a datastore directory
fn folder_path(path: &str, datacenter: &str, datastore: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(encode)
        .collect();
    format!(
        "/folder/{}?dcPath={}&dsName={}",
        segments.join("/"),
        encode(datacenter),
        encode(datastore)
    )
}

fn task_name(service: Option<&str>, operation: Option<&str>) -> String {
    match (service, operation) {
        (Some(s), Some(o)) => format!("{}.{}", s, o),
        (Some(s), None) => s.to_string(),
        (None, Some(o)) => o.to_string(),
        (None, None) => String::new(),
    }
}

/// Extract the entries of a `/folder` HTML listing
fn parse_folder_listing(body: &str) -> Vec<FileInfo> {
    let mut files = Vec::new();
    for chunk in body.split("href=\"").skip(1) {
        let Some(target) = chunk.split('"').next() else {
            continue;
        };
        let target = target.split('?').next().unwrap_or_default();
        let name = target.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        if name.is_empty() || name == "folder" || name == ".." {
            continue;
        }
        let name = urlencoding::decode(name)
            .map(|n| n.into_owned())
            .unwrap_or_else(|_| name.to_string());
        files.push(FileInfo { path: name });
    }
    files
}

async fn check_status(operation: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Transport {
        operation: operation.to_string(),
        reason: format!("HTTP {}: {}", status, body.trim()),
    })
}
