//! Datastore name validation
//!
//! A datastore name is valid when a volume dynamically provisioned on it
//! would still mount. The check synthesizes a disk path in the provisioner's
//! naming scheme and runs it through the volume name validator. Names are
//! only checked once per run.

use super::volume::VolumeNameValidator;
use crate::domain::ports::PathEscaperRef;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;

/// Placeholder VM folder UUID of a dynamically provisioned disk
const PLACEHOLDER_FOLDER_UUID: &str = "5137595f-7ce3-e95a-5c03-06d835dea807";

/// Placeholder PVC UUID of a dynamically provisioned disk
const PLACEHOLDER_PVC_UUID: &str = "8533f1d0-178d-460b-8403-bc5e7dc7f778";

// =============================================================================
// Validated Datastore Set
// =============================================================================

/// Datastore names already checked in the current run.
///
/// Keyed by name only. One instance belongs to one run.
#[derive(Debug, Default)]
pub struct ValidatedDatastores {
    names: Mutex<HashSet<String>>,
}

impl ValidatedDatastores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name`; returns `false` if it was already recorded
    pub fn insert(&self, name: &str) -> bool {
        self.names.lock().insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }
}

// =============================================================================
// Datastore Validator
// =============================================================================

/// Validates datastore names against the mount path limit
pub struct DatastoreValidator {
    volumes: VolumeNameValidator,
    checked: ValidatedDatastores,
}

impl DatastoreValidator {
    /// Create a validator with an empty validated set
    pub fn new(escaper: PathEscaperRef) -> Self {
        Self::with_volume_validator(VolumeNameValidator::new(escaper))
    }

    pub fn with_volume_validator(volumes: VolumeNameValidator) -> Self {
        Self {
            volumes,
            checked: ValidatedDatastores::new(),
        }
    }

    /// Volume validator shared with the PV check
    pub fn volumes(&self) -> &VolumeNameValidator {
        &self.volumes
    }

    /// Names checked so far in this run
    pub fn checked(&self) -> &ValidatedDatastores {
        &self.checked
    }

    /// Disk path the in-tree provisioner would create on `datastore`
    pub fn dynamic_volume_path(datastore: &str, cluster_id: &str) -> String {
        format!(
            "[{}] {}/{}-dynamic-pvc-{}.vmdk",
            datastore, PLACEHOLDER_FOLDER_UUID, cluster_id, PLACEHOLDER_PVC_UUID
        )
    }

    /// Check that volumes provisioned on `datastore` can be mounted.
    ///
    /// The first call for a name does the check; later calls with the same
    /// name return `Ok(())` whatever the cluster ID.
    pub async fn check_datastore(&self, datastore: &str, cluster_id: &str) -> Result<()> {
        debug!("Checking datastore {:?}", datastore);
        if !self.checked.insert(datastore) {
            debug!("Skipping check of already checked datastore {:?}", datastore);
            return Ok(());
        }

        let volume_path = Self::dynamic_volume_path(datastore, cluster_id);
        debug!(
            "Checking data store {:?} with potential volume name {}",
            datastore, volume_path
        );
        self.volumes
            .check_volume_name(&volume_path)
            .await
            .map_err(|e| e.context(format!("error checking datastore {:?}", datastore)))
    }
}
