//! StorageClass datastore and storage policy check
//!
//! For every in-tree vSphere StorageClass, the `datastore` parameter and
//! every datastore compatible with the `storagePolicyName` parameter must be
//! short enough for provisioned volumes to mount.

use super::CheckContext;
use crate::error::{Error, Result};
use crate::validation::PlacementResolver;
use k8s_openapi::api::storage::v1::StorageClass;
use tracing::{debug, info};

/// Provisioner name of the in-tree vSphere volume plugin
pub const VSPHERE_PROVISIONER: &str = "kubernetes.io/vsphere-volume";

/// StorageClass parameter naming a datastore (case-insensitive)
pub const DATASTORE_PARAMETER: &str = "datastore";

/// StorageClass parameter naming a storage policy (case-insensitive)
pub const STORAGE_POLICY_PARAMETER: &str = "storagepolicyname";

pub async fn check_storage_classes(ctx: &CheckContext<'_>) -> Result<()> {
    debug!("CheckStorageClasses started");
    let infra = ctx.cluster.get_infrastructure().await?;
    let cluster_id = infra.cluster_id();
    let classes = ctx.cluster.list_storage_classes().await?;

    let mut errs = Vec::new();
    for sc in &classes {
        let name = sc.metadata.name.as_deref().unwrap_or_default();
        if sc.provisioner != VSPHERE_PROVISIONER {
            debug!("Skipping storage class {:?}: not a vSphere class", name);
            continue;
        }

        for err in check_storage_class(ctx, sc, cluster_id).await {
            errs.push(err.context(format!("StorageClass {:?} is invalid", name)));
        }
    }

    Error::aggregate(errs)?;
    info!(
        "CheckStorageClasses succeeded, {} storage classes checked",
        classes.len()
    );
    Ok(())
}

async fn check_storage_class(
    ctx: &CheckContext<'_>,
    sc: &StorageClass,
    cluster_id: &str,
) -> Vec<Error> {
    let mut errs = Vec::new();
    let Some(parameters) = sc.parameters.as_ref() else {
        return errs;
    };

    for (key, value) in parameters {
        let result = match key.to_lowercase().as_str() {
            DATASTORE_PARAMETER => ctx.datastores.check_datastore(value, cluster_id).await,
            STORAGE_POLICY_PARAMETER => check_storage_policy(ctx, value, cluster_id).await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            errs.push(e);
        }
    }
    errs
}

/// Check every datastore compatible with a storage policy
async fn check_storage_policy(ctx: &CheckContext<'_>, policy: &str, cluster_id: &str) -> Result<()> {
    debug!("Checking storage policy {:?}", policy);
    let resolver = PlacementResolver::new(ctx.vsphere, ctx.timeout);
    let datastores = resolver.resolve_compatible_datastores(policy).await?;

    let mut errs = Vec::new();
    for ds in &datastores {
        if let Err(e) = ctx.datastores.check_datastore(ds, cluster_id).await {
            errs.push(e.context(format!("storage policy {:?}", policy)));
        }
    }
    Error::aggregate(errs)
}
