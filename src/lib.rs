//! vSphere Problem Detector
//!
//! Detects vSphere configuration problems that break the in-tree vSphere
//! volume plugin of a Kubernetes cluster: missing vCenter privileges,
//! unreadable datastores, node VMs without `disk.enableUUID`, and datastore
//! or volume names whose escaped kubelet mount path exceeds the OS limit.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            CheckRunner                               │
//! │  TaskPermissions · FolderList · Nodes · DefaultDatastore ·           │
//! │  StorageClasses · PVs                                                │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                         Validation Engine                            │
//! │  PlacementResolver ─► DatastoreValidator ─► VolumeNameValidator      │
//! │                                                 └─► PathEscaper      │
//! ├───────────────────────────────┬──────────────────────────────────────┤
//! │  ClusterSnapshot (KubeCluster)│  VSphereSession (RestSession)        │
//! └───────────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`checks`]: the six checks and the run report
//! - [`validation`]: path escaping, length and datastore checks, policy resolution
//! - [`vsphere`]: cloud config parsing and the vCenter REST session
//! - [`cluster`]: Kubernetes access, config and credential loading
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod checks;
pub mod cluster;
pub mod crd;
pub mod domain;
pub mod error;
pub mod validation;
pub mod vsphere;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use checks::{CheckConfig, CheckKind, CheckOutcome, CheckReport, CheckRunner, ReportSummary};

pub use cluster::{Credentials, KubeCluster};

pub use crd::{Infrastructure, PlatformType};

pub use domain::ports::{
    ClusterSnapshot, PathEscaper, PathEscaperRef, VSphereSession, VSphereSessionRef,
};

pub use error::{AggregateError, Error, Result};

pub use validation::{
    DatastoreValidator, PlacementResolver, SystemdEscape, UnitNameEscaper, VolumeNameValidator,
};

pub use vsphere::{RestSession, VSphereConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
