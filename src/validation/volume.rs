//! Volume path length validation
//!
//! A vSphere volume is mounted by kubelet under the in-tree plugin's mounts
//! directory. The escaped form of that mount path has to stay under the
//! file name limit, otherwise the volume can never be mounted.

use crate::domain::ports::PathEscaperRef;
use crate::error::{Error, Result};
use tracing::debug;

/// Directory kubelet mounts in-tree vSphere volumes under
pub const KUBELET_MOUNT_DIR: &str = "/var/lib/kubelet/plugins/kubernetes.io/vsphere-volume/mounts";

/// Escaped mount paths must be strictly shorter than this
pub const MAX_ESCAPED_PATH_LEN: usize = 255;

/// Checks that a volume path still fits once kubelet mounts it
#[derive(Clone)]
pub struct VolumeNameValidator {
    escaper: PathEscaperRef,
}

impl VolumeNameValidator {
    pub fn new(escaper: PathEscaperRef) -> Self {
        Self { escaper }
    }

    /// Absolute kubelet mount path of a volume
    pub fn mount_path(volume_path: &str) -> String {
        format!("{}/{}", KUBELET_MOUNT_DIR, volume_path)
    }

    /// Escape the mount path of `volume_path` and check its length.
    ///
    /// Fails with [`Error::PathTooLong`] when the escaped path has
    /// [`MAX_ESCAPED_PATH_LEN`] or more characters.
    pub async fn check_volume_name(&self, volume_path: &str) -> Result<()> {
        let path = Self::mount_path(volume_path);
        let escaped = self.escaper.escape(&path).await?;
        debug!(
            "Volume {:?} mounts at {:?} ({} characters escaped by {})",
            volume_path,
            escaped,
            escaped.len(),
            self.escaper.name()
        );

        if escaped.len() >= MAX_ESCAPED_PATH_LEN {
            return Err(Error::PathTooLong {
                length: escaped.len(),
                path: escaped,
                limit: MAX_ESCAPED_PATH_LEN,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::escape::{escape_path, UnitNameEscaper};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn validator() -> VolumeNameValidator {
        VolumeNameValidator::new(Arc::new(UnitNameEscaper))
    }

    /// Volume path whose escaped mount path is exactly `target` characters
    fn volume_with_escaped_len(target: usize) -> String {
        let prefix_len = escape_path(&VolumeNameValidator::mount_path("a")).unwrap().len() - 1;
        "a".repeat(target - prefix_len)
    }

    #[test]
    fn test_mount_path() {
        assert_eq!(
            VolumeNameValidator::mount_path("[ds] vol.vmdk"),
            "/var/lib/kubelet/plugins/kubernetes.io/vsphere-volume/mounts/[ds] vol.vmdk"
        );
    }

    #[tokio::test]
    async fn test_short_volume_passes() {
        validator()
            .check_volume_name("[LocalDS_0] kubevols/pvc-1.vmdk")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_length_boundary() {
        let v = validator();

        v.check_volume_name(&volume_with_escaped_len(254)).await.unwrap();

        let err = v
            .check_volume_name(&volume_with_escaped_len(255))
            .await
            .unwrap_err();
        assert_matches!(err, Error::PathTooLong { length: 255, limit: 255, .. });

        let err = v
            .check_volume_name(&volume_with_escaped_len(256))
            .await
            .unwrap_err();
        assert_matches!(err, Error::PathTooLong { length: 256, .. });
    }

    #[tokio::test]
    async fn test_bound_applies_to_escaped_length() {
        let v = validator();
        // Every space costs 4 characters once escaped, so the raw mount path
        // is well under the limit while the escaped one is not.
        let volume = format!("[ds] {}", " ".repeat(50));
        assert!(VolumeNameValidator::mount_path(&volume).len() < MAX_ESCAPED_PATH_LEN);

        let err = v.check_volume_name(&volume).await.unwrap_err();
        assert_matches!(err, Error::PathTooLong { length, .. } if length >= MAX_ESCAPED_PATH_LEN);
        assert!(err.to_string().contains("is too long"));
    }

    #[tokio::test]
    async fn test_escape_failure_propagates() {
        let err = validator().check_volume_name("../etc").await.unwrap_err();
        assert_matches!(err, Error::EscapeFailed { .. });
    }
}
