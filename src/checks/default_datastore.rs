//! Default datastore name check

use super::CheckContext;
use crate::error::Result;
use tracing::{debug, info};

/// Check that volumes provisioned on the configured default datastore would
/// mount.
pub async fn check_default_datastore(ctx: &CheckContext<'_>) -> Result<()> {
    debug!("CheckDefaultDatastore started");
    let infra = ctx.cluster.get_infrastructure().await?;

    let ds_name = ctx.config.default_datastore();
    ctx.datastores
        .check_datastore(ds_name, infra.cluster_id())
        .await
        .map_err(|e| e.context(format!("Default data store {:?} is invalid", ds_name)))?;

    info!("CheckDefaultDatastore succeeded");
    Ok(())
}
