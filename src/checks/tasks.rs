//! Task manager permission check

use super::CheckContext;
use crate::error::Result;
use crate::vsphere;
use tracing::{debug, info};

/// Check that the service account may enumerate vCenter tasks.
///
/// Success only requires the enumeration to complete; the number of tasks
/// found is informational.
pub async fn check_task_permissions(ctx: &CheckContext<'_>) -> Result<()> {
    debug!("CheckTaskPermissions started");

    let tasks = vsphere::call(ctx.timeout, "collect tasks", ctx.vsphere.collect_tasks())
        .await
        .map_err(|e| e.context("error collecting tasks"))?;

    for task in &tasks {
        debug!("Found task {}", task.name);
    }
    info!("CheckTaskPermissions succeeded, {} tasks found", tasks.len());
    Ok(())
}
