//! Custom Resource Definitions read by the detector
//!
//! - Infrastructure: OpenShift cluster infrastructure (cluster ID, platform,
//!   cloud config reference)

pub mod infrastructure;

pub use infrastructure::*;
