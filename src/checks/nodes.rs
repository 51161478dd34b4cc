//! Node VM configuration check
//!
//! Every node must run with the vSphere cloud provider (a `vsphere://`
//! providerID) and its VM must have `disk.enableUUID` set, otherwise
//! attached disks get no stable identifier inside the guest.

use super::CheckContext;
use crate::domain::ports::VmRef;
use crate::error::{Error, Result};
use crate::vsphere;
use k8s_openapi::api::core::v1::Node;
use tracing::{debug, info, warn};

/// Scheme of vSphere provider IDs
pub const PROVIDER_ID_PREFIX: &str = "vsphere://";

/// Check every node; fails with the number of bad nodes.
///
/// Per-node errors are logged, not returned.
pub async fn check_nodes(ctx: &CheckContext<'_>) -> Result<()> {
    debug!("CheckNodes started");
    let nodes = ctx.cluster.list_nodes().await?;

    let mut bad_nodes = 0;
    for node in &nodes {
        if let Err(e) = check_node(ctx, node).await {
            bad_nodes += 1;
            warn!("Error on node {:?}: {}", node_name(node), e);
        }
    }

    if bad_nodes > 0 {
        return Err(Error::NodesFailed { count: bad_nodes });
    }
    info!("CheckNodes succeeded, {} nodes checked", nodes.len());
    Ok(())
}

/// VM BIOS UUID encoded in a provider ID
pub fn vm_uuid_from_provider_id(provider_id: &str) -> Option<String> {
    provider_id
        .strip_prefix(PROVIDER_ID_PREFIX)
        .map(|uuid| uuid.trim().to_lowercase())
        .filter(|uuid| !uuid.is_empty())
}

async fn check_node(ctx: &CheckContext<'_>, node: &Node) -> Result<()> {
    let name = node_name(node);
    debug!("Checking node {:?}", name);

    let provider_id = node
        .spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .unwrap_or_default();
    if provider_id.is_empty() {
        return Err(missing(name, "the node has no providerID"));
    }
    debug!("... the node has providerID: {}", provider_id);

    if !provider_id.starts_with(PROVIDER_ID_PREFIX) {
        return Err(missing(
            name,
            format!("the node's providerID does not start with {}", PROVIDER_ID_PREFIX),
        ));
    }
    let uuid = vm_uuid_from_provider_id(provider_id)
        .ok_or_else(|| missing(name, "the node's providerID has an empty VM UUID"))?;

    let vm = find_vm(ctx, &uuid).await?;

    let flags = match vsphere::call(ctx.timeout, "load vm flags", ctx.vsphere.vm_flags(&vm)).await {
        Ok(flags) => flags,
        Err(Error::Unsupported { .. }) => {
            return Err(missing(name, "cannot verify disk.enableUUID"));
        }
        Err(e) => return Err(e.context(format!("failed to load VM {}", name))),
    };

    match flags.disk_uuid_enabled {
        None => Err(missing(name, "node has empty disk.enableUUID")),
        Some(false) => Err(missing(name, "node has disk.enableUUID = FALSE")),
        Some(true) => {
            debug!("... the node has correct disk.enableUUID");
            Ok(())
        }
    }
}

async fn find_vm(ctx: &CheckContext<'_>, uuid: &str) -> Result<VmRef> {
    let dc_name = ctx.config.datacenter();
    let dc = vsphere::call(ctx.timeout, "find datacenter", ctx.vsphere.find_datacenter(dc_name))
        .await
        .map_err(|e| e.context(format!("failed to access Datacenter {}", dc_name)))?;

    vsphere::call(
        ctx.timeout,
        "find vm by uuid",
        ctx.vsphere.find_vm_by_uuid(&dc, uuid),
    )
    .await
    .map_err(|e| e.context(format!("failed to find VM by UUID {}", uuid)))?
    .ok_or_else(|| Error::NotFound {
        kind: "VirtualMachine with UUID".into(),
        name: uuid.to_string(),
    })
}

fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or_default()
}

fn missing(node: &str, reason: impl Into<String>) -> Error {
    Error::MissingCapability {
        subject: format!("node {:?}", node),
        reason: reason.into(),
    }
}
