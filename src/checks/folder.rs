//! Datastore browsing permission check
//!
//! Provisioning needs to list files on the default datastore. "/" must be
//! listable; "/kubevols" may not exist yet, which is tolerated.

use super::CheckContext;
use crate::domain::ports::DatastoreRef;
use crate::error::Result;
use crate::vsphere;
use tracing::{debug, info, warn};

/// Directory the in-tree provisioner creates disks in
pub const KUBEVOLS_DIR: &str = "/kubevols";

pub async fn check_folder_list(ctx: &CheckContext<'_>) -> Result<()> {
    debug!("CheckFolderList started");
    let dc_name = ctx.config.datacenter();
    let ds_name = ctx.config.default_datastore();

    let dc = vsphere::call(ctx.timeout, "find datacenter", ctx.vsphere.find_datacenter(dc_name))
        .await
        .map_err(|e| e.context(format!("failed to access Datacenter {}", dc_name)))?;

    let ds = vsphere::call(
        ctx.timeout,
        "find datastore",
        ctx.vsphere.find_datastore(&dc, ds_name),
    )
    .await
    .map_err(|e| e.context(format!("failed to access Datastore {}", ds_name)))?;

    list_directory(ctx, &ds, "/", false).await?;
    list_directory(ctx, &ds, KUBEVOLS_DIR, true).await?;

    info!("Listing Datastore {:?} succeeded", ds_name);
    Ok(())
}

async fn list_directory(
    ctx: &CheckContext<'_>,
    ds: &DatastoreRef,
    path: &str,
    tolerate_not_found: bool,
) -> Result<()> {
    debug!("Listing datastore {} path {}", ds.name, path);
    let result = vsphere::call(
        ctx.timeout,
        "search datastore",
        ctx.vsphere.search_datastore(ds, path),
    )
    .await;

    match result {
        Ok(files) => {
            for file in files {
                debug!("Found file {}/{}", path.trim_end_matches('/'), file.path);
            }
            Ok(())
        }
        Err(e) if tolerate_not_found && e.is_file_not_found() => {
            warn!("Path {} does not exist in Datastore {}", path, ds.name);
            Ok(())
        }
        Err(e) => Err(e.context(format!("failed to browse Datastore {}", ds.name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::*;
    use crate::testing::{FakeCluster, FakeVSphere};

    #[tokio::test]
    async fn test_lists_root_and_kubevols() {
        let cluster = FakeCluster::new();
        let vsphere = FakeVSphere::new()
            .with_datastore("datastore-1", "LocalDS_0")
            .with_directory("LocalDS_0", KUBEVOLS_DIR);
        let (config, datastores) = (config(), validator());

        check_folder_list(&context(&cluster, &vsphere, &config, &datastores))
            .await
            .unwrap();
        let searches = vsphere
            .calls()
            .iter()
            .filter(|c| *c == "search datastore")
            .count();
        assert_eq!(searches, 2);
    }

    #[tokio::test]
    async fn test_missing_kubevols_is_tolerated() {
        let cluster = FakeCluster::new();
        let vsphere = FakeVSphere::new().with_datastore("datastore-1", "LocalDS_0");
        let (config, datastores) = (config(), validator());

        check_folder_list(&context(&cluster, &vsphere, &config, &datastores))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_default_datastore() {
        let cluster = FakeCluster::new();
        let vsphere = FakeVSphere::new().with_datastore("datastore-1", "OtherDS");
        let (config, datastores) = (config(), validator());

        let err = check_folder_list(&context(&cluster, &vsphere, &config, &datastores))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to access Datastore LocalDS_0"));
    }

    #[tokio::test]
    async fn test_missing_datacenter() {
        let cluster = FakeCluster::new();
        let vsphere = FakeVSphere::new().with_datastore("datastore-1", "LocalDS_0");
        let mut config = config();
        config.workspace.datacenter = "DC9".into();
        let datastores = validator();

        let err = check_folder_list(&context(&cluster, &vsphere, &config, &datastores))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to access Datacenter DC9"));
    }

    #[tokio::test]
    async fn test_browse_denied() {
        let cluster = FakeCluster::new();
        let vsphere = FakeVSphere::new()
            .with_datastore("datastore-1", "LocalDS_0")
            .failing("search datastore");
        let (config, datastores) = (config(), validator());

        let err = check_folder_list(&context(&cluster, &vsphere, &config, &datastores))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to browse Datastore LocalDS_0"));
    }
}
