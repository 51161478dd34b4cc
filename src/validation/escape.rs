//! Unit-name path escaping
//!
//! kubelet mounts every vSphere volume under a directory whose name ends up
//! in a systemd mount unit, so the escaped form of the mount path is what
//! has to fit into the OS name limit. Two strategies are provided: an
//! in-process implementation of the escaping rules and one that shells out
//! to `systemd-escape --path`.

use crate::domain::ports::PathEscaper;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Escaped form of the root path
const ROOT_UNIT_NAME: &str = "-";

/// Escape an absolute path into its unit-name form.
///
/// Path components are escaped independently and joined with `-`. Empty
/// components (leading, trailing or repeated `/`) are dropped. Bytes outside
/// `[A-Za-z0-9_.]` become `\xHH`, and a `.` opening a component is always
/// escaped. `.` and `..` components are rejected.
pub fn escape_path(path: &str) -> Result<String> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Ok(ROOT_UNIT_NAME.to_string());
    }

    let mut escaped = String::with_capacity(path.len());
    for (i, component) in components.iter().enumerate() {
        if *component == "." || *component == ".." {
            return Err(Error::EscapeFailed {
                path: path.to_string(),
                reason: format!("path is not normalized: contains {:?} component", component),
            });
        }
        if i > 0 {
            escaped.push('-');
        }
        escape_component(component, &mut escaped);
    }
    Ok(escaped)
}

fn escape_component(component: &str, out: &mut String) {
    for (i, byte) in component.bytes().enumerate() {
        let keep = match byte {
            b'.' => i > 0,
            b'_' => true,
            b if b.is_ascii_alphanumeric() => true,
            _ => false,
        };
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\x{:02x}", byte));
        }
    }
}

// =============================================================================
// Strategies
// =============================================================================

/// Escapes paths without spawning any process
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitNameEscaper;

#[async_trait]
impl PathEscaper for UnitNameEscaper {
    async fn escape(&self, path: &str) -> Result<String> {
        escape_path(path)
    }

    fn name(&self) -> &str {
        "builtin"
    }
}

/// Escapes paths by running `systemd-escape --path`
#[derive(Debug, Clone)]
pub struct SystemdEscape {
    binary: String,
}

impl SystemdEscape {
    pub fn new() -> Self {
        Self::with_binary("systemd-escape")
    }

    /// Use a specific `systemd-escape` binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SystemdEscape {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PathEscaper for SystemdEscape {
    async fn escape(&self, path: &str) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--path")
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::EscapeFailed {
                path: path.to_string(),
                reason: format!("failed to run {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(Error::EscapeFailed {
                path: path.to_string(),
                reason: format!(
                    "{} exited with {}: {}{}",
                    self.binary,
                    output.status,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let escaped = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(
            "path {:?} systemd-escaped to {:?} ({})",
            path,
            escaped,
            escaped.len()
        );
        Ok(escaped)
    }

    fn name(&self) -> &str {
        "systemd"
    }
}
