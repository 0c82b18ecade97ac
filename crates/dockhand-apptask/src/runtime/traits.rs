// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime trait definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use dockhand_core::app::{App, Manifest, Protocol};
use thiserror::Error;

/// Label carrying the owning app id on every container.
pub const APP_ID_LABEL: &str = "dockhand.appId";

/// Label distinguishing addon-spawned containers from the primary one.
pub const SUBCONTAINER_LABEL: &str = "dockhand.isSubcontainer";

/// Mount point of the app data volume inside the primary container.
pub const DATA_MOUNT: &str = "/app/data";

/// Network shared by apps and their addon containers.
pub const APP_NETWORK: &str = "dockhand";

/// Errors from container runtime operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// Container or image does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Image is still used by a container.
    #[error("{0} is in use")]
    InUse(String),

    /// Runtime or registry could not be reached.
    #[error("Runtime unavailable: {0}")]
    Unavailable(String),

    /// Runtime rejected the command.
    #[error("{command} failed: {stderr}")]
    CommandFailed {
        /// Command that failed.
        command: String,
        /// Standard error output.
        stderr: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Whether retrying may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Host to container port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Host port.
    pub host_port: u16,
    /// Container port.
    pub container_port: u16,
    /// Protocol.
    pub protocol: Protocol,
    /// Bind on loopback only.
    pub loopback_only: bool,
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Owning app.
    pub app_id: String,
    /// Image reference.
    pub image: String,
    /// Addon-spawned container.
    pub is_subcontainer: bool,
    /// Environment.
    pub env: BTreeMap<String, String>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Memory limit in bytes, 0 for none.
    pub memory_limit: i64,
    /// Host directory mounted at `data_mount`.
    pub data_volume: Option<PathBuf>,
    /// Mount point of `data_volume` inside the container.
    pub data_mount: String,
    /// Network joined under the container name as alias.
    pub network: Option<String>,
    /// Read-only root filesystem.
    pub readonly_rootfs: bool,
    /// Command override.
    pub cmd: Option<Vec<String>>,
}

impl ContainerSpec {
    /// Spec for an app's primary container.
    pub fn for_app(app: &App, http_port: u16, data_volume: PathBuf) -> Self {
        let fqdn = app.fqdn();
        let mut env = BTreeMap::new();
        env.insert("APP_ORIGIN".to_string(), format!("https://{}", fqdn));
        env.insert("APP_DOMAIN".to_string(), fqdn);

        let mut ports = vec![PortMapping {
            host_port: http_port,
            container_port: app.manifest.http_port,
            protocol: Protocol::Tcp,
            loopback_only: true,
        }];

        for (name, binding) in &app.port_bindings {
            let Some(exposed) = app.manifest.exposed_port(name, binding.protocol) else {
                continue;
            };
            env.insert(name.clone(), exposed.container_port().to_string());
            ports.push(PortMapping {
                host_port: binding.host_port,
                container_port: exposed.container_port(),
                protocol: binding.protocol,
                loopback_only: false,
            });
        }

        env.extend(app.addon_env());
        // user overrides win
        env.extend(app.env.clone());

        let debug = app.debug_mode.clone().unwrap_or_default();

        Self {
            name: app.id.clone(),
            app_id: app.id.clone(),
            image: app.manifest.docker_image.clone(),
            is_subcontainer: false,
            env,
            ports,
            memory_limit: app.effective_memory_limit(),
            data_volume: Some(data_volume),
            data_mount: DATA_MOUNT.to_string(),
            network: Some(APP_NETWORK.to_string()),
            readonly_rootfs: debug.readonly_rootfs,
            cmd: debug.cmd,
        }
    }

    /// Spec for an addon-spawned container.
    pub fn subcontainer(app_id: &str, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_id: app_id.to_string(),
            image: image.into(),
            is_subcontainer: true,
            env: BTreeMap::new(),
            ports: Vec::new(),
            memory_limit: 0,
            data_volume: None,
            data_mount: DATA_MOUNT.to_string(),
            network: Some(APP_NETWORK.to_string()),
            readonly_rootfs: false,
            cmd: None,
        }
    }
}

/// Observed container state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    /// Container id.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Whether the container is running.
    pub running: bool,
}

/// Trait for container runtimes.
///
/// Stop and delete operations tolerate containers that are already gone.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime type identifier (e.g., "docker", "mock")
    fn runtime_type(&self) -> &'static str;

    /// Create (but do not start) a container, returning its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a container.
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Stop every container labeled with the app id.
    async fn stop_containers(&self, app_id: &str) -> Result<()>;

    /// Delete every container labeled with the app id.
    async fn delete_containers(&self, app_id: &str) -> Result<()>;

    /// Delete one container by name or id.
    async fn delete_container(&self, name_or_id: &str) -> Result<()>;

    /// Pull the manifest's image.
    async fn download_image(&self, manifest: &Manifest) -> Result<()>;

    /// Remove the manifest's image.
    async fn delete_image(&self, manifest: &Manifest) -> Result<()>;

    /// Inspect a container by name or id.
    async fn inspect(&self, container_id: &str) -> Result<ContainerState>;
}
