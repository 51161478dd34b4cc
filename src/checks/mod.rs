//! Cluster checks
//!
//! Six independent checks, each combining cluster objects with live vSphere
//! state:
//!
//! ```text
//!   CheckTaskPermissions ── task view enumeration
//!   CheckFolderList ─────── browse "/" and "/kubevols" of the default datastore
//!   CheckNodes ──────────── providerID + disk.enableUUID of every node VM
//!   CheckDefaultDatastore ─ ┐
//!   CheckStorageClasses ─── ┼─ DatastoreValidator ── VolumeNameValidator
//!   CheckPVs ────────────── ┘        (PlacementResolver for storage policies)
//! ```
//!
//! [`CheckRunner::run`] invokes all of them in order, never stopping at a
//! failed one, and collects a [`CheckReport`].

pub mod default_datastore;
pub mod folder;
pub mod nodes;
pub mod pvs;
pub mod storage_classes;
pub mod tasks;

pub use default_datastore::check_default_datastore;
pub use folder::check_folder_list;
pub use nodes::check_nodes;
pub use pvs::check_pvs;
pub use storage_classes::check_storage_classes;
pub use tasks::check_task_permissions;

use crate::domain::ports::{ClusterSnapshot, PathEscaperRef, VSphereSession};
use crate::error::Result;
use crate::validation::DatastoreValidator;
use crate::vsphere::{VSphereConfig, DEFAULT_VSPHERE_TIMEOUT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

// =============================================================================
// Check Kinds
// =============================================================================

/// The checks, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    TaskPermissions,
    FolderList,
    Nodes,
    DefaultDatastore,
    StorageClasses,
    PVs,
}

impl CheckKind {
    pub const ALL: [CheckKind; 6] = [
        CheckKind::TaskPermissions,
        CheckKind::FolderList,
        CheckKind::Nodes,
        CheckKind::DefaultDatastore,
        CheckKind::StorageClasses,
        CheckKind::PVs,
    ];

    /// Stable name used in logs, reports and metrics
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::TaskPermissions => "CheckTaskPermissions",
            CheckKind::FolderList => "CheckFolderList",
            CheckKind::Nodes => "CheckNodes",
            CheckKind::DefaultDatastore => "CheckDefaultDatastore",
            CheckKind::StorageClasses => "CheckStorageClasses",
            CheckKind::PVs => "CheckPVs",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Check Context
// =============================================================================

/// Settings of a check run
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Timeout of every single vSphere call
    pub vsphere_timeout: Duration,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            vsphere_timeout: DEFAULT_VSPHERE_TIMEOUT,
        }
    }
}

/// Everything a check reads. Borrowed for the duration of one run.
pub struct CheckContext<'a> {
    pub cluster: &'a dyn ClusterSnapshot,
    pub vsphere: &'a dyn VSphereSession,
    pub config: &'a VSphereConfig,
    /// Run-scoped datastore validator
    pub datastores: &'a DatastoreValidator,
    /// Timeout of every single vSphere call
    pub timeout: Duration,
}

impl<'a> CheckContext<'a> {
    /// Run one check
    pub async fn run(&self, kind: CheckKind) -> Result<()> {
        match kind {
            CheckKind::TaskPermissions => check_task_permissions(self).await,
            CheckKind::FolderList => check_folder_list(self).await,
            CheckKind::Nodes => check_nodes(self).await,
            CheckKind::DefaultDatastore => check_default_datastore(self).await,
            CheckKind::StorageClasses => check_storage_classes(self).await,
            CheckKind::PVs => check_pvs(self).await,
        }
    }
}

// =============================================================================
// Check Runner
// =============================================================================

/// Runs every check against one cluster and one vSphere session
pub struct CheckRunner {
    escaper: PathEscaperRef,
    config: CheckConfig,
}

impl CheckRunner {
    pub fn new(escaper: PathEscaperRef, config: CheckConfig) -> Self {
        Self { escaper, config }
    }

    /// Run all checks sequentially.
    ///
    /// Each run starts with an empty validated datastore set.
    pub async fn run(
        &self,
        cluster: &dyn ClusterSnapshot,
        vsphere: &dyn VSphereSession,
        config: &VSphereConfig,
    ) -> CheckReport {
        let datastores = DatastoreValidator::new(self.escaper.clone());
        let ctx = CheckContext {
            cluster,
            vsphere,
            config,
            datastores: &datastores,
            timeout: self.config.vsphere_timeout,
        };

        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(CheckKind::ALL.len());
        for kind in CheckKind::ALL {
            info!("{} started", kind);
            let start = Instant::now();
            let result = ctx.run(kind).await;
            let duration = start.elapsed();
            match &result {
                Ok(()) => info!("{} passed in {:?}", kind, duration),
                Err(e) => error!("Check {} failed: {}", kind, e),
            }
            outcomes.push(CheckOutcome {
                kind,
                result,
                duration,
            });
        }

        CheckReport {
            started_at,
            outcomes,
        }
    }
}

// =============================================================================
// Check Report
// =============================================================================

/// Result of one check
#[derive(Debug)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    pub result: Result<()>,
    pub duration: Duration,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Results of one run of all checks
#[derive(Debug)]
pub struct CheckReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    /// Outcomes of the checks that failed
    pub fn failed(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn outcome(&self, kind: CheckKind) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }

    /// Serializable form of the report
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            started_at: self.started_at,
            success: self.is_success(),
            checks: self
                .outcomes
                .iter()
                .map(|o| CheckSummary {
                    name: o.kind.name().to_string(),
                    passed: o.passed(),
                    error: o.result.as_ref().err().map(|e| e.to_string()),
                    duration_ms: o.duration.as_millis() as u64,
                })
                .collect(),
        }
    }
}

impl std::fmt::Display for CheckReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(()) => writeln!(f, "{:<24} PASS", outcome.kind.name())?,
                Err(e) => writeln!(f, "{:<24} FAIL  {}", outcome.kind.name(), e)?,
            }
        }
        let failed = self.failed().count();
        write!(
            f,
            "{} of {} checks failed",
            failed,
            self.outcomes.len()
        )
    }
}

/// Serializable summary of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub started_at: DateTime<Utc>,
    pub success: bool,
    pub checks: Vec<CheckSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}
