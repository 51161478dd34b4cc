//! vSphere access
//!
//! - [`config`]: cloud provider config parsing
//! - [`rest`]: session over the vCenter Automation REST API
//! - [`soap`]: the vim25 calls the REST API lacks
//! - [`call`]: per-call timeout used around every session method

pub mod config;
pub mod rest;
pub mod soap;

pub use config::*;
pub use rest::*;

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Default timeout of a single vSphere call
pub const DEFAULT_VSPHERE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run one vSphere call, failing it once `timeout` elapses.
///
/// Nothing is retried; an expired call becomes [`Error::Timeout`].
pub async fn call<T, F>(timeout: Duration, operation: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            duration: timeout,
        }),
    }
}
