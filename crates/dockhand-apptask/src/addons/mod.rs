// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Addon provisioner registry.
//!
//! Maps addon names declared in manifests to provisioners. An unknown name
//! is a configuration error; a no-op provisioner is a valid entry.

pub mod mock;
pub mod redis;

pub use mock::RecordingAddon;
pub use redis::RedisAddon;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dockhand_core::app::{AddonConfig, App};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::host::{HostError, HostIntegration};
use crate::runtime::{ContainerRuntime, RuntimeError};

/// Errors from addon provisioning.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AddonError {
    /// Manifest declares an addon nobody provides.
    #[error("No such addon: {0}")]
    UnknownAddon(String),

    /// Provisioner reported a failure.
    #[error("{addon}: {message}")]
    Failed {
        /// Addon name.
        addon: String,
        /// Failure description.
        message: String,
    },

    /// Backing service could not be reached.
    #[error("{addon} service unavailable: {message}")]
    Unavailable {
        /// Addon name.
        addon: String,
        /// Failure description.
        message: String,
    },

    /// Container runtime call failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Addon data could not be moved on the host.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl AddonError {
    /// Whether retrying may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Runtime(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for addon operations.
pub type Result<T> = std::result::Result<T, AddonError>;

/// Environment variables an addon hands to the app.
pub type AddonEnv = BTreeMap<String, String>;

/// Per-addon provisioner.
#[async_trait]
pub trait Addon: Send + Sync {
    /// Provision the addon for the app, returning the environment the app
    /// needs to reach it. Must be idempotent and keep existing data.
    async fn setup(&self, app: &App, options: &Value) -> Result<AddonEnv>;

    /// Remove the addon and its data.
    async fn teardown(&self, app: &App, options: &Value) -> Result<()>;

    /// Dump addon data into the app's backup area.
    async fn backup(&self, app: &App, options: &Value) -> Result<()>;

    /// Load addon data from the app's backup area.
    async fn restore(&self, app: &App, options: &Value) -> Result<()>;

    /// Wipe addon data but keep it provisioned.
    async fn clear(&self, app: &App, options: &Value) -> Result<()>;
}

/// Provisioner that does nothing, for addons handled elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAddon;

#[async_trait]
impl Addon for NoopAddon {
    async fn setup(&self, _app: &App, _options: &Value) -> Result<AddonEnv> {
        Ok(AddonEnv::new())
    }

    async fn teardown(&self, _app: &App, _options: &Value) -> Result<()> {
        Ok(())
    }

    async fn backup(&self, _app: &App, _options: &Value) -> Result<()> {
        Ok(())
    }

    async fn restore(&self, _app: &App, _options: &Value) -> Result<()> {
        Ok(())
    }

    async fn clear(&self, _app: &App, _options: &Value) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Setup,
    Teardown,
    Backup,
    Restore,
    Clear,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Teardown => "teardown",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Clear => "clear",
        }
    }
}

/// Registry of addon provisioners.
#[derive(Clone, Default)]
pub struct AddonRegistry {
    addons: BTreeMap<String, Arc<dyn Addon>>,
}

impl AddonRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in provisioners: `scheduler`, `docker` and
    /// `localstorage` as no-ops (volumes are handled by the host), `redis`
    /// as a subcontainer.
    pub fn builtin(
        runtime: Arc<dyn ContainerRuntime>,
        host: Arc<dyn HostIntegration>,
        redis_image: impl Into<String>,
    ) -> Self {
        Self::new()
            .with("scheduler", Arc::new(NoopAddon))
            .with("docker", Arc::new(NoopAddon))
            .with("localstorage", Arc::new(NoopAddon))
            .with("redis", Arc::new(RedisAddon::new(runtime, host, redis_image)))
    }

    /// Register (or replace) a provisioner.
    pub fn with(mut self, name: impl Into<String>, addon: Arc<dyn Addon>) -> Self {
        self.addons.insert(name.into(), addon);
        self
    }

    /// Look up a provisioner.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn Addon>> {
        self.addons
            .get(name)
            .ok_or_else(|| AddonError::UnknownAddon(name.to_string()))
    }

    /// Registered addon names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.addons.keys().map(String::as_str)
    }

    /// Fail if any declared addon has no provisioner.
    pub fn validate(&self, addons: &BTreeMap<String, Value>) -> Result<()> {
        for name in addons.keys() {
            self.get(name)?;
        }
        Ok(())
    }

    /// Set up every addon in `addons`, returning the environment of each
    /// addon that provides one.
    pub async fn setup_addons(
        &self,
        app: &App,
        addons: &BTreeMap<String, Value>,
    ) -> Result<AddonConfig> {
        self.each(app, addons, Operation::Setup).await
    }

    /// Tear down every addon in `addons`.
    pub async fn teardown_addons(
        &self,
        app: &App,
        addons: &BTreeMap<String, Value>,
    ) -> Result<()> {
        self.each(app, addons, Operation::Teardown).await.map(drop)
    }

    /// Back up every addon in `addons`.
    pub async fn backup_addons(&self, app: &App, addons: &BTreeMap<String, Value>) -> Result<()> {
        self.each(app, addons, Operation::Backup).await.map(drop)
    }

    /// Restore every addon in `addons`.
    pub async fn restore_addons(
        &self,
        app: &App,
        addons: &BTreeMap<String, Value>,
    ) -> Result<()> {
        self.each(app, addons, Operation::Restore).await.map(drop)
    }

    /// Clear every addon in `addons`.
    pub async fn clear_addons(&self, app: &App, addons: &BTreeMap<String, Value>) -> Result<()> {
        self.each(app, addons, Operation::Clear).await.map(drop)
    }

    async fn each(
        &self,
        app: &App,
        addons: &BTreeMap<String, Value>,
        operation: Operation,
    ) -> Result<AddonConfig> {
        let mut config = AddonConfig::new();
        for (name, options) in addons {
            let addon = self.get(name)?;
            info!(
                app_id = %app.id,
                addon = %name,
                operation = operation.as_str(),
                "Addon operation"
            );
            match operation {
                Operation::Setup => {
                    let env = addon.setup(app, options).await?;
                    if !env.is_empty() {
                        config.insert(name.clone(), env);
                    }
                }
                Operation::Teardown => addon.teardown(app, options).await?,
                Operation::Backup => addon.backup(app, options).await?,
                Operation::Restore => addon.restore(app, options).await?,
                Operation::Clear => addon.clear(app, options).await?,
            }
        }
        Ok(config)
    }
}

/// Addons declared in `old` but not in `new`.
pub fn removed_addons(
    old: &BTreeMap<String, Value>,
    new: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    old.iter()
        .filter(|(name, _)| !new.contains_key(*name))
        .map(|(name, options)| (name.clone(), options.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalHost;
    use crate::runtime::MockContainerRuntime;
    use dockhand_core::app::Manifest;
    use serde_json::json;

    fn builtin() -> AddonRegistry {
        let host = Arc::new(LocalHost::new("apps", "logs", "logrotate.d", "collectd"));
        AddonRegistry::builtin(Arc::new(MockContainerRuntime::new()), host, "redis:7")
    }

    fn app() -> App {
        let manifest: Manifest = serde_json::from_value(json!({
            "version": "1.0.0",
            "dockerImage": "example/notes:1.0.0",
            "healthCheckPath": "/",
            "httpPort": 3000
        }))
        .unwrap();
        App::new("app-1", manifest, "notes", "example.com")
    }

    fn declared(names: &[&str]) -> BTreeMap<String, Value> {
        names.iter().map(|n| (n.to_string(), json!({}))).collect()
    }

    #[tokio::test]
    async fn test_unknown_addon_is_rejected() {
        let registry = builtin();
        let err = registry
            .validate(&declared(&["redis", "couchdb"]))
            .unwrap_err();
        assert!(matches!(err, AddonError::UnknownAddon(name) if name == "couchdb"));
    }

    #[tokio::test]
    async fn test_operations_run_in_name_order() {
        let recorder = Arc::new(RecordingAddon::new());
        let registry = AddonRegistry::new()
            .with("sendmail", recorder.clone())
            .with("mysql", recorder.clone());

        let config = registry
            .setup_addons(&app(), &declared(&["sendmail", "mysql"]))
            .await
            .unwrap();
        assert_eq!(config["mysql"]["RECORDED_BY"], "app-1");
        registry
            .teardown_addons(&app(), &declared(&["mysql"]))
            .await
            .unwrap();

        assert_eq!(
            recorder.calls().await,
            vec!["setup app-1", "setup app-1", "teardown app-1"]
        );
    }

    #[test]
    fn test_removed_addons() {
        let removed = removed_addons(
            &declared(&["redis", "sendmail", "localstorage"]),
            &declared(&["localstorage", "mysql"]),
        );
        assert_eq!(
            removed.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["redis", "sendmail"]
        );
    }

    #[test]
    fn test_builtin_names() {
        let registry = builtin();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["docker", "localstorage", "redis", "scheduler"]
        );
    }
}
