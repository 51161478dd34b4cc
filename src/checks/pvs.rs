//! PersistentVolume path check

use super::CheckContext;
use crate::error::{Error, Result};
use tracing::{debug, info};

/// Check that every existing in-tree vSphere PV can be mounted.
///
/// PVs of other volume types are skipped.
pub async fn check_pvs(ctx: &CheckContext<'_>) -> Result<()> {
    debug!("CheckPVs started");
    let pvs = ctx.cluster.list_pvs().await?;

    let mut errs = Vec::new();
    for pv in &pvs {
        let Some(volume) = pv.spec.as_ref().and_then(|s| s.vsphere_volume.as_ref()) else {
            continue;
        };
        let name = pv.metadata.name.as_deref().unwrap_or_default();
        debug!("Checking PV {:?}: {}", name, volume.volume_path);

        if let Err(e) = ctx.datastores.volumes().check_volume_name(&volume.volume_path).await {
            errs.push(e.context(format!("error checking PV {:?}", name)));
        }
    }

    Error::aggregate(errs)?;
    info!("CheckPVs succeeded, {} PVs checked", pvs.len());
    Ok(())
}
