// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Directory snapshot backups on the local filesystem.
//!
//! Layout of a backup:
//!
//! ```text
//! <backup_dir>/<backup_id>/
//!   config.json   desired state at backup time
//!   data/         copy of the data volume
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dockhand_core::app::{AddonConfig, App, RestoreConfig};
use serde_json::Value;
use tracing::info;

use super::{BackupError, BackupTransport, Result};
use crate::addons::AddonRegistry;
use crate::host::{HostIntegration, copy_dir};

/// Snapshots app data into `<backup_dir>/<backup_id>`.
pub struct LocalBackupTransport {
    backup_dir: PathBuf,
    addons: Arc<AddonRegistry>,
    host: Arc<dyn HostIntegration>,
}

impl LocalBackupTransport {
    /// Create a transport.
    pub fn new(
        backup_dir: impl Into<PathBuf>,
        addons: Arc<AddonRegistry>,
        host: Arc<dyn HostIntegration>,
    ) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            addons,
            host,
        }
    }

    /// Directory of a backup.
    pub fn backup_path(&self, backup_id: &str) -> PathBuf {
        self.backup_dir.join(backup_id)
    }
}

#[async_trait]
impl BackupTransport for LocalBackupTransport {
    fn transport_type(&self) -> &'static str {
        "local"
    }

    async fn backup_app(&self, app: &App) -> Result<String> {
        let backup_id = format!("app_{}_{}", app.id, Utc::now().format("%Y%m%d%H%M%S%3f"));
        let target = self.backup_path(&backup_id);
        info!(app_id = %app.id, backup_id = %backup_id, "Creating backup");

        self.addons.backup_addons(app, &app.manifest.addons).await?;

        tokio::fs::create_dir_all(&target).await?;
        let config = serde_json::to_vec_pretty(&app.snapshot())
            .map_err(|e| BackupError::Failed(format!("Failed to serialize config: {}", e)))?;
        tokio::fs::write(target.join("config.json"), config).await?;

        let volume = self.host.volume_path(app);
        if tokio::fs::try_exists(&volume).await? {
            copy_dir(&volume, &target.join("data")).await?;
        }
        Ok(backup_id)
    }

    async fn restore_app(
        &self,
        app: &App,
        addons: &BTreeMap<String, Value>,
        restore_config: &RestoreConfig,
    ) -> Result<AddonConfig> {
        let source = self.backup_path(&restore_config.backup_id);
        if !tokio::fs::try_exists(&source).await? {
            return Err(BackupError::NotFound(restore_config.backup_id.clone()));
        }
        info!(
            app_id = %app.id,
            backup_id = %restore_config.backup_id,
            format = %restore_config.backup_format,
            "Restoring backup"
        );

        let data = source.join("data");
        if tokio::fs::try_exists(&data).await? {
            self.host.delete_volume(app, false).await?;
            copy_dir(&data, &self.host.volume_path(app)).await?;
        }

        let config = self.addons.setup_addons(app, addons).await?;
        // restore against the credentials setup just handed out
        let mut provisioned = app.clone();
        provisioned.addon_config = config.clone();
        self.addons.restore_addons(&provisioned, addons).await?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::RecordingAddon;
    use crate::host::LocalHost;
    use dockhand_core::app::Manifest;
    use serde_json::json;
    use tempfile::TempDir;

    fn app() -> App {
        let manifest: Manifest = serde_json::from_value(json!({
            "version": "1.0.0",
            "dockerImage": "example/notes:1.0.0",
            "healthCheckPath": "/",
            "httpPort": 3000,
            "addons": { "sendmail": {} }
        }))
        .unwrap();
        App::new("app-1", manifest, "notes", "example.com")
    }

    #[tokio::test]
    async fn test_backup_then_restore() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(LocalHost::new(
            dir.path().join("apps"),
            dir.path().join("logs"),
            dir.path().join("logrotate.d"),
            dir.path().join("collectd"),
        ));
        let recorder = Arc::new(RecordingAddon::new());
        let addons = Arc::new(AddonRegistry::new().with("sendmail", recorder.clone()));
        let transport = LocalBackupTransport::new(dir.path().join("backups"), addons, host.clone());
        let app = app();

        host.create_volume(&app).await.unwrap();
        let volume = host.volume_path(&app);
        std::fs::create_dir(volume.join("uploads")).unwrap();
        std::fs::write(volume.join("uploads/a.txt"), "hello").unwrap();

        let backup_id = transport.backup_app(&app).await.unwrap();
        assert!(transport.backup_path(&backup_id).join("config.json").exists());

        host.delete_volume(&app, true).await.unwrap();
        let restore = RestoreConfig {
            backup_id,
            backup_format: "tgz".into(),
        };
        let config = transport
            .restore_app(&app, &app.manifest.addons, &restore)
            .await
            .unwrap();
        assert_eq!(config["sendmail"]["RECORDED_BY"], "app-1");

        assert_eq!(
            std::fs::read_to_string(volume.join("uploads/a.txt")).unwrap(),
            "hello"
        );
        assert_eq!(
            recorder.calls().await,
            vec!["backup app-1", "setup app-1", "restore app-1"]
        );
    }

    #[tokio::test]
    async fn test_restore_unknown_backup() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(LocalHost::new(
            dir.path().join("apps"),
            dir.path().join("logs"),
            dir.path().join("logrotate.d"),
            dir.path().join("collectd"),
        ));
        let transport = LocalBackupTransport::new(
            dir.path().join("backups"),
            Arc::new(AddonRegistry::new()),
            host,
        );
        let restore = RestoreConfig {
            backup_id: "missing".into(),
            backup_format: "tgz".into(),
        };

        let err = transport
            .restore_app(&app(), &BTreeMap::new(), &restore)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NotFound(id) if id == "missing"));
    }
}
