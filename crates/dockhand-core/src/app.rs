// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The app aggregate and its manifest.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{Health, InstallationState, RunState};

/// Network protocol of a port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// A port the app image exposes besides its HTTP port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposedPort {
    /// Short title shown to operators.
    #[serde(default)]
    pub title: String,
    /// Suggested host port.
    pub default_value: u16,
    /// Port inside the container. Defaults to `default_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<u16>,
}

impl ExposedPort {
    /// Port the container listens on.
    pub fn container_port(&self) -> u16 {
        self.container_port.unwrap_or(self.default_value)
    }
}

/// Declarative description of an app image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Catalog identifier of the app package.
    #[serde(default)]
    pub id: String,
    /// Package version.
    pub version: String,
    /// Image reference.
    pub docker_image: String,
    /// Path polled by the health monitor.
    pub health_check_path: String,
    /// HTTP port inside the container.
    pub http_port: u16,
    /// Named TCP ports, keyed by the environment variable the app reads.
    #[serde(default)]
    pub tcp_ports: BTreeMap<String, ExposedPort>,
    /// Named UDP ports.
    #[serde(default)]
    pub udp_ports: BTreeMap<String, ExposedPort>,
    /// Declared addons and their options.
    #[serde(default)]
    pub addons: BTreeMap<String, serde_json::Value>,
    /// Memory limit in bytes, 0 for the platform default.
    #[serde(default)]
    pub memory_limit: i64,
    /// Oldest platform version the package supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_box_version: Option<String>,
    /// Newest platform version the package supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_box_version: Option<String>,
}

impl Manifest {
    /// Names of declared addons.
    pub fn addon_names(&self) -> BTreeSet<&str> {
        self.addons.keys().map(String::as_str).collect()
    }

    /// Look up an exposed port by name and protocol.
    pub fn exposed_port(&self, name: &str, protocol: Protocol) -> Option<&ExposedPort> {
        match protocol {
            Protocol::Tcp => self.tcp_ports.get(name),
            Protocol::Udp => self.udp_ports.get(name),
        }
    }
}

/// Host side of a named port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    /// Port on the host.
    pub host_port: u16,
    /// Protocol.
    pub protocol: Protocol,
}

/// An additional hostname served by the app.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateDomain {
    /// Subdomain part, empty for the bare domain.
    pub subdomain: String,
    /// Zone.
    pub domain: String,
}

impl AlternateDomain {
    /// Fully qualified hostname.
    pub fn fqdn(&self) -> String {
        fqdn(&self.subdomain, &self.domain)
    }
}

/// Users and groups allowed to sign in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRestriction {
    /// Allowed user ids.
    #[serde(default)]
    pub users: Vec<String>,
    /// Allowed group ids.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Debug overrides for the primary container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugMode {
    /// Mount the root filesystem read-only.
    #[serde(default)]
    pub readonly_rootfs: bool,
    /// Replacement command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
}

/// Snapshot of the desired state before a configure or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OldConfig {
    /// Previous manifest.
    pub manifest: Manifest,
    /// Previous location.
    pub location: String,
    /// Previous domain.
    pub domain: String,
    /// Previous alternate domains.
    #[serde(default)]
    pub alternate_domains: Vec<AlternateDomain>,
    /// Previous port bindings.
    #[serde(default)]
    pub port_bindings: BTreeMap<String, PortBinding>,
}

impl OldConfig {
    /// Previous fully qualified hostname.
    pub fn fqdn(&self) -> String {
        fqdn(&self.location, &self.domain)
    }
}

/// Pending manifest for an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfig {
    /// Manifest to switch to.
    pub manifest: Manifest,
    /// Skip the pre-update backup.
    #[serde(default)]
    pub force: bool,
}

/// Backup coordinates for installing from a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreConfig {
    /// Backup identifier understood by the backup transport.
    pub backup_id: String,
    /// Archive format.
    #[serde(default = "default_backup_format")]
    pub backup_format: String,
}

fn default_backup_format() -> String {
    "tgz".to_string()
}

/// Environment variables each addon hands to the app, keyed by addon name.
pub type AddonConfig = BTreeMap<String, BTreeMap<String, String>>;

/// The aggregate under management.
#[derive(Debug, Clone, PartialEq)]
pub struct App {
    /// Stable identifier.
    pub id: String,
    /// Catalog reference, if installed from the catalog.
    pub app_store_id: Option<String>,
    /// Selects the next pipeline.
    pub installation_state: InstallationState,
    /// `"<percent>, <message>"` while a pipeline runs, failure message after an error.
    pub installation_progress: String,
    /// Run state of the primary container.
    pub run_state: RunState,
    /// Last reported health.
    pub health: Option<Health>,
    /// Primary container, set only while it is believed to exist.
    pub container_id: Option<String>,
    /// Current manifest.
    pub manifest: Manifest,
    /// Subdomain part of the primary hostname.
    pub location: String,
    /// Zone of the primary hostname.
    pub domain: String,
    /// Additional hostnames.
    pub alternate_domains: Vec<AlternateDomain>,
    /// Named port to host port.
    pub port_bindings: BTreeMap<String, PortBinding>,
    /// User environment overrides.
    pub env: BTreeMap<String, String>,
    /// Environment handed out by provisioned addons.
    pub addon_config: AddonConfig,
    /// Sign-in restriction.
    pub access_restriction: Option<AccessRestriction>,
    /// Memory limit override in bytes, 0 for the manifest value.
    pub memory_limit: i64,
    /// Debug overrides.
    pub debug_mode: Option<DebugMode>,
    /// Desired state before the running configure/update.
    pub old_config: Option<OldConfig>,
    /// Pending update.
    pub update_config: Option<UpdateConfig>,
    /// Pending restore or clone.
    pub restore_config: Option<RestoreConfig>,
    /// Reserved host port for the container's HTTP port.
    pub http_port: Option<u16>,
    /// Custom data directory.
    pub data_dir: Option<String>,
    /// When the last update finished.
    pub update_time: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl App {
    /// Build a new record in `pending_install`.
    pub fn new(
        id: impl Into<String>,
        manifest: Manifest,
        location: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            app_store_id: None,
            installation_state: InstallationState::PendingInstall,
            installation_progress: String::new(),
            run_state: RunState::PendingStart,
            health: None,
            container_id: None,
            manifest,
            location: location.into(),
            domain: domain.into(),
            alternate_domains: Vec::new(),
            port_bindings: BTreeMap::new(),
            env: BTreeMap::new(),
            addon_config: AddonConfig::new(),
            access_restriction: None,
            memory_limit: 0,
            debug_mode: None,
            old_config: None,
            update_config: None,
            restore_config: None,
            http_port: None,
            data_dir: None,
            update_time: None,
            created_at: Utc::now(),
        }
    }

    /// Primary fully qualified hostname.
    pub fn fqdn(&self) -> String {
        fqdn(&self.location, &self.domain)
    }

    /// Snapshot the current desired state.
    pub fn snapshot(&self) -> OldConfig {
        OldConfig {
            manifest: self.manifest.clone(),
            location: self.location.clone(),
            domain: self.domain.clone(),
            alternate_domains: self.alternate_domains.clone(),
            port_bindings: self.port_bindings.clone(),
        }
    }

    /// Environment from every provisioned addon.
    pub fn addon_env(&self) -> BTreeMap<String, String> {
        self.addon_config
            .values()
            .flat_map(|env| env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    /// Effective memory limit in bytes, 0 meaning unlimited.
    pub fn effective_memory_limit(&self) -> i64 {
        if self.memory_limit > 0 {
            self.memory_limit
        } else {
            self.manifest.memory_limit
        }
    }
}

/// Join a subdomain and zone into a hostname.
pub fn fqdn(location: &str, domain: &str) -> String {
    if location.is_empty() {
        domain.to_string()
    } else {
        format!("{}.{}", location, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        serde_json::from_value(serde_json::json!({
            "id": "io.example.notes",
            "version": "1.2.0",
            "dockerImage": "example/notes:1.2.0",
            "healthCheckPath": "/",
            "httpPort": 3000,
            "tcpPorts": { "SSH_PORT": { "title": "SSH", "defaultValue": 2222 } },
            "addons": { "redis": {}, "localstorage": {} }
        }))
        .unwrap()
    }

    #[test]
    fn test_fqdn_with_and_without_location() {
        assert_eq!(fqdn("notes", "example.com"), "notes.example.com");
        assert_eq!(fqdn("", "example.com"), "example.com");
    }

    #[test]
    fn test_manifest_deserializes_camel_case() {
        let m = manifest();
        assert_eq!(m.docker_image, "example/notes:1.2.0");
        assert_eq!(m.http_port, 3000);
        assert_eq!(m.tcp_ports["SSH_PORT"].container_port(), 2222);
        assert_eq!(
            m.addon_names().into_iter().collect::<Vec<_>>(),
            vec!["localstorage", "redis"]
        );
        assert!(m.exposed_port("SSH_PORT", Protocol::Udp).is_none());
    }

    #[test]
    fn test_new_app_defaults() {
        let app = App::new("app-1", manifest(), "notes", "example.com");
        assert_eq!(app.installation_state, InstallationState::PendingInstall);
        assert_eq!(app.fqdn(), "notes.example.com");
        assert!(app.container_id.is_none());
        assert_eq!(app.effective_memory_limit(), 0);
    }

    #[test]
    fn test_snapshot_captures_hostnames() {
        let mut app = App::new("app-1", manifest(), "notes", "example.com");
        app.alternate_domains.push(AlternateDomain {
            subdomain: "www".into(),
            domain: "example.org".into(),
        });
        let snap = app.snapshot();
        assert_eq!(snap.fqdn(), "notes.example.com");
        assert_eq!(snap.alternate_domains[0].fqdn(), "www.example.org");
    }
}
