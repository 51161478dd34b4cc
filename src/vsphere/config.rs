//! vSphere cloud provider configuration
//!
//! Parses the gcfg (INI-like) config consumed by the in-tree vSphere cloud
//! provider:
//!
//! ```text
//! [Global]
//! secret-name = "vsphere-creds"
//! secret-namespace = "kube-system"
//! insecure-flag = "1"
//!
//! [Workspace]
//! server = "vcenter.example.com"
//! datacenter = "DC0"
//! default-datastore = "LocalDS_0"
//! folder = "/DC0/vm/ocp-4xk2p"
//!
//! [VirtualCenter "vcenter.example.com"]
//! datacenters = "DC0"
//! ```
//!
//! Section and key names are case-insensitive. Sections and keys the
//! checks do not use are ignored.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const DEFAULT_SECRET_NAME: &str = "vsphere-creds";
const DEFAULT_SECRET_NAMESPACE: &str = "kube-system";
const DEFAULT_PORT: u16 = 443;

// =============================================================================
// Configuration Types
// =============================================================================

/// `[Global]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Name of the Secret with vCenter credentials
    pub secret_name: String,
    /// Namespace of the Secret with vCenter credentials
    pub secret_namespace: String,
    /// Skip TLS verification of the vCenter certificate
    pub insecure_flag: bool,
    /// vCenter port
    pub port: u16,
    /// Legacy location of the vCenter address
    pub server: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            secret_name: DEFAULT_SECRET_NAME.to_string(),
            secret_namespace: DEFAULT_SECRET_NAMESPACE.to_string(),
            insecure_flag: false,
            port: DEFAULT_PORT,
            server: None,
        }
    }
}

/// `[Workspace]` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceConfig {
    pub server: String,
    pub datacenter: String,
    pub default_datastore: String,
    pub folder: Option<String>,
}

/// `[VirtualCenter "<host>"]` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualCenterConfig {
    pub datacenters: Vec<String>,
    pub port: Option<u16>,
}

/// Parsed cloud provider config. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VSphereConfig {
    pub global: GlobalConfig,
    pub workspace: WorkspaceConfig,
    pub virtual_centers: BTreeMap<String, VirtualCenterConfig>,
}

impl VSphereConfig {
    /// Parse and validate a config
    pub fn parse(data: &str) -> Result<Self> {
        let mut cfg = VSphereConfig::default();
        let mut section: Option<Section> = None;

        for (idx, raw) in data.lines().enumerate() {
            let lineno = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') {
                section = Some(parse_section_header(line, lineno)?);
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::Configuration(format!("line {}: expected `key = value`, got {:?}", lineno, line))
            })?;
            let key = key.trim().to_lowercase();
            let value = parse_value(value.trim(), lineno)?;

            let current = section.as_ref().ok_or_else(|| {
                Error::Configuration(format!("line {}: variable {:?} outside of any section", lineno, key))
            })?;
            cfg.set(current, &key, value, lineno)?;
        }

        cfg.apply_fallbacks();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&data)
    }

    /// vCenter address
    pub fn vcenter(&self) -> &str {
        &self.workspace.server
    }

    /// Datacenter the cluster runs in
    pub fn datacenter(&self) -> &str {
        &self.workspace.datacenter
    }

    /// Datastore used for volumes without explicit placement
    pub fn default_datastore(&self) -> &str {
        &self.workspace.default_datastore
    }

    /// Port of the configured vCenter
    pub fn port(&self) -> u16 {
        self.virtual_centers
            .get(&self.workspace.server)
            .and_then(|vc| vc.port)
            .unwrap_or(self.global.port)
    }

    fn set(&mut self, section: &Section, key: &str, value: String, lineno: usize) -> Result<()> {
        match (section.name.as_str(), section.subsection.as_deref()) {
            ("global", None) => match key {
                "secret-name" => self.global.secret_name = value,
                "secret-namespace" => self.global.secret_namespace = value,
                "insecure-flag" => self.global.insecure_flag = parse_bool(&value, lineno)?,
                "port" => self.global.port = parse_port(&value, lineno)?,
                "server" => self.global.server = Some(value),
                _ => debug!("Ignoring [Global] variable {:?}", key),
            },
            ("workspace", None) => match key {
                "server" => self.workspace.server = value,
                "datacenter" => self.workspace.datacenter = value,
                "default-datastore" => self.workspace.default_datastore = value,
                "folder" => self.workspace.folder = Some(value),
                _ => debug!("Ignoring [Workspace] variable {:?}", key),
            },
            ("virtualcenter", Some(host)) => {
                let vc = self.virtual_centers.entry(host.to_string()).or_default();
                match key {
                    "datacenters" => {
                        vc.datacenters = value
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    }
                    "port" => vc.port = Some(parse_port(&value, lineno)?),
                    _ => debug!("Ignoring [VirtualCenter {:?}] variable {:?}", host, key),
                }
            }
            (name, _) => debug!("Ignoring variable {:?} in section {:?}", key, name),
        }
        Ok(())
    }

    fn apply_fallbacks(&mut self) {
        if self.workspace.server.is_empty() {
            if let Some(server) = self.global.server.clone() {
                self.workspace.server = server;
            } else if self.virtual_centers.len() == 1 {
                if let Some(host) = self.virtual_centers.keys().next() {
                    self.workspace.server = host.clone();
                }
            }
        }
        if self.workspace.datacenter.is_empty() {
            if let Some(dc) = self
                .virtual_centers
                .get(&self.workspace.server)
                .and_then(|vc| vc.datacenters.first())
            {
                self.workspace.datacenter = dc.clone();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.workspace.server.is_empty() {
            missing.push("server");
        }
        if self.workspace.datacenter.is_empty() {
            missing.push("datacenter");
        }
        if self.workspace.default_datastore.is_empty() {
            missing.push("default-datastore");
        }
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "[Workspace] is missing {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Parsing Helpers
// =============================================================================

#[derive(Debug)]
struct Section {
    name: String,
    subsection: Option<String>,
}

fn parse_section_header(line: &str, lineno: usize) -> Result<Section> {
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| Error::Configuration(format!("line {}: malformed section header {:?}", lineno, line)))?
        .trim();

    match inner.split_once(char::is_whitespace) {
        Some((name, sub)) => {
            let sub = sub.trim();
            let unquoted = sub
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .ok_or_else(|| {
                    Error::Configuration(format!("line {}: subsection {:?} must be quoted", lineno, sub))
                })?;
            Ok(Section {
                name: name.to_lowercase(),
                subsection: Some(unquoted.to_string()),
            })
        }
        None => Ok(Section {
            name: inner.to_lowercase(),
            subsection: None,
        }),
    }
}

/// Unquote a value. Unquoted values end at the first `;` or `#`.
fn parse_value(value: &str, lineno: usize) -> Result<String> {
    let Some(rest) = value.strip_prefix('"') else {
        let end = value.find([';', '#']).unwrap_or(value.len());
        return Ok(value[..end].trim().to_string());
    };

    let mut out = String::with_capacity(rest.len());
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(out),
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => break,
            },
            _ => out.push(c),
        }
    }
    Err(Error::Configuration(format!("line {}: unterminated quoted value", lineno)))
}

fn parse_bool(value: &str, lineno: usize) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Configuration(format!("line {}: invalid boolean {:?}", lineno, value))),
    }
}

fn parse_port(value: &str, lineno: usize) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::Configuration(format!("line {}: invalid port {:?}", lineno, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const OPENSHIFT_CONFIG: &str = r#"
[Global]
secret-name = "vsphere-creds"
secret-namespace = "kube-system"
insecure-flag = "1"

[Workspace]
server = "vcenter.example.com"
datacenter = "DC0"
default-datastore = "LocalDS_0"
folder = "/DC0/vm/ocp-4xk2p"

[VirtualCenter "vcenter.example.com"]
datacenters = "DC0"
"#;

    #[test]
    fn test_parse_openshift_config() {
        let cfg = VSphereConfig::parse(OPENSHIFT_CONFIG).unwrap();
        assert_eq!(cfg.vcenter(), "vcenter.example.com");
        assert_eq!(cfg.datacenter(), "DC0");
        assert_eq!(cfg.default_datastore(), "LocalDS_0");
        assert_eq!(cfg.workspace.folder.as_deref(), Some("/DC0/vm/ocp-4xk2p"));
        assert_eq!(cfg.global.secret_name, "vsphere-creds");
        assert_eq!(cfg.global.secret_namespace, "kube-system");
        assert!(cfg.global.insecure_flag);
        assert_eq!(cfg.port(), 443);
        assert_eq!(
            cfg.virtual_centers["vcenter.example.com"].datacenters,
            vec!["DC0".to_string()]
        );
    }

    #[test]
    fn test_case_insensitive_names_and_comments() {
        let cfg = VSphereConfig::parse(
            r#"
; comment
[WORKSPACE]
Server = vc.local   # trailing comment
DataCenter = "DC 1"
Default-Datastore = ds;comment
[Disk]
scsicontrollertype = pvscsi
"#,
        )
        .unwrap();
        assert_eq!(cfg.vcenter(), "vc.local");
        assert_eq!(cfg.datacenter(), "DC 1");
        assert_eq!(cfg.default_datastore(), "ds");
        assert!(!cfg.global.insecure_flag);
    }

    #[test]
    fn test_server_and_datacenter_fallback_to_virtual_center() {
        let cfg = VSphereConfig::parse(
            r#"
[Workspace]
default-datastore = "ds1"

[VirtualCenter "10.0.0.1"]
datacenters = "DC-A, DC-B"
port = "8443"
"#,
        )
        .unwrap();
        assert_eq!(cfg.vcenter(), "10.0.0.1");
        assert_eq!(cfg.datacenter(), "DC-A");
        assert_eq!(cfg.port(), 8443);
    }

    #[test]
    fn test_missing_required_fields() {
        let err = VSphereConfig::parse("[Workspace]\nserver = vc\n").unwrap_err();
        assert_matches!(&err, Error::Configuration(msg) if msg.contains("datacenter") && msg.contains("default-datastore"));
    }

    #[test]
    fn test_syntax_errors() {
        assert_matches!(
            VSphereConfig::parse("server = vc\n"),
            Err(Error::Configuration(msg)) if msg.contains("outside of any section")
        );
        assert_matches!(
            VSphereConfig::parse("[Workspace]\nnot a variable\n"),
            Err(Error::Configuration(msg)) if msg.contains("line 2")
        );
        assert_matches!(
            VSphereConfig::parse("[Workspace\n"),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            VSphereConfig::parse("[Global]\ninsecure-flag = maybe\n"),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            VSphereConfig::parse("[Workspace]\nserver = \"vc\n"),
            Err(Error::Configuration(msg)) if msg.contains("unterminated")
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(OPENSHIFT_CONFIG.as_bytes()).unwrap();
        let cfg = VSphereConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.default_datastore(), "LocalDS_0");

        assert_matches!(
            VSphereConfig::from_file("/nonexistent/vsphere.conf"),
            Err(Error::Io(_))
        );
    }
}
