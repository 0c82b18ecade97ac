// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Host integration on the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dockhand_core::app::App;
use tracing::debug;

use super::{HostError, HostIntegration, Result};

/// Writes volumes and config snippets under configured directories.
#[derive(Debug, Clone)]
pub struct LocalHost {
    apps_data_dir: PathBuf,
    log_dir: PathBuf,
    logrotate_dir: PathBuf,
    collectd_dir: PathBuf,
}

impl LocalHost {
    /// Create a host integration.
    pub fn new(
        apps_data_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        logrotate_dir: impl Into<PathBuf>,
        collectd_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            apps_data_dir: apps_data_dir.into(),
            log_dir: log_dir.into(),
            logrotate_dir: logrotate_dir.into(),
            collectd_dir: collectd_dir.into(),
        }
    }

    /// Log directory of an app.
    pub fn log_dir(&self, app_id: &str) -> PathBuf {
        self.log_dir.join(app_id)
    }

    /// Log rotation config path of an app.
    pub fn logrotate_path(&self, app_id: &str) -> PathBuf {
        self.logrotate_dir.join(app_id)
    }

    /// Metrics profile path of an app.
    pub fn collectd_path(&self, app_id: &str) -> PathBuf {
        self.collectd_dir.join(format!("{}.conf", app_id))
    }

    async fn write(&self, path: &Path, contents: String) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(HostError::io("create directory", parent))?;
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(HostError::io("write", path))
    }
}

async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(HostError::io("remove", path)(e)),
        _ => Ok(()),
    }
}

async fn remove_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(HostError::io("remove", path)(e)),
        _ => Ok(()),
    }
}

#[async_trait]
impl HostIntegration for LocalHost {
    fn volume_path(&self, app: &App) -> PathBuf {
        match &app.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.apps_data_dir.join(&app.id).join("data"),
        }
    }

    fn addon_path(&self, app: &App, addon: &str) -> PathBuf {
        self.apps_data_dir.join(&app.id).join(addon)
    }

    async fn create_volume(&self, app: &App) -> Result<()> {
        let path = self.volume_path(app);
        debug!(app_id = %app.id, path = %path.display(), "Creating data volume");
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(HostError::io("create volume", &path))
    }

    async fn delete_volume(&self, app: &App, remove_directory: bool) -> Result<()> {
        let path = self.volume_path(app);
        debug!(app_id = %app.id, remove_directory, "Deleting data volume");
        if remove_directory {
            return remove_dir(&path).await;
        }

        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(HostError::io("read volume", &path)(e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(HostError::io("read volume", &path))?
        {
            let entry_path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map_err(HostError::io("inspect", &entry_path))?
                .is_dir();
            if is_dir {
                remove_dir(&entry_path).await?;
            } else {
                remove_file(&entry_path).await?;
            }
        }
        Ok(())
    }

    async fn add_logrotate(&self, app: &App) -> Result<()> {
        let log_dir = self.log_dir(&app.id);
        tokio::fs::create_dir_all(&log_dir)
            .await
            .map_err(HostError::io("create directory", &log_dir))?;
        let config = format!(
            "{}/*.log {{\n    daily\n    rotate 7\n    compress\n    missingok\n    notifempty\n    copytruncate\n    maxsize 10M\n}}\n",
            log_dir.display()
        );
        self.write(&self.logrotate_path(&app.id), config).await
    }

    async fn remove_logrotate(&self, app_id: &str) -> Result<()> {
        remove_file(&self.logrotate_path(app_id)).await
    }

    async fn add_collectd(&self, app: &App) -> Result<()> {
        let Some(container_id) = &app.container_id else {
            debug!(app_id = %app.id, "No container, skipping metrics profile");
            return Ok(());
        };
        let config = format!(
            "LoadPlugin \"table\"\n<Plugin table>\n  <Table \"/sys/fs/cgroup/system.slice/docker-{container}.scope/memory.stat\">\n    Instance \"{app}-memory\"\n    Separator \" \\n\"\n    <Result>\n      Type gauge\n      InstancesFrom 0\n      ValuesFrom 1\n    </Result>\n  </Table>\n</Plugin>\n",
            container = container_id,
            app = app.id
        );
        self.write(&self.collectd_path(&app.id), config).await
    }

    async fn remove_collectd(&self, app_id: &str) -> Result<()> {
        remove_file(&self.collectd_path(app_id)).await
    }

    async fn remove_log_dir(&self, app_id: &str) -> Result<()> {
        remove_dir(&self.log_dir(app_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_core::app::Manifest;
    use tempfile::TempDir;

    fn host(dir: &TempDir) -> LocalHost {
        LocalHost::new(
            dir.path().join("apps"),
            dir.path().join("logs"),
            dir.path().join("logrotate.d"),
            dir.path().join("collectd"),
        )
    }

    fn app() -> App {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "version": "1.0.0",
            "dockerImage": "example/notes:1.0.0",
            "healthCheckPath": "/",
            "httpPort": 3000
        }))
        .unwrap();
        App::new("app-1", manifest, "notes", "example.com")
    }

    #[tokio::test]
    async fn test_delete_volume_keeps_directory() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir);
        let app = app();

        host.create_volume(&app).await.unwrap();
        let volume = host.volume_path(&app);
        std::fs::write(volume.join("db.sqlite"), "data").unwrap();
        std::fs::create_dir(volume.join("uploads")).unwrap();

        host.delete_volume(&app, false).await.unwrap();
        assert!(volume.exists());
        assert_eq!(std::fs::read_dir(&volume).unwrap().count(), 0);

        host.delete_volume(&app, true).await.unwrap();
        assert!(!volume.exists());

        // already gone
        host.delete_volume(&app, false).await.unwrap();
        host.delete_volume(&app, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_custom_data_dir() {
        let dir = TempDir::new().unwrap();
        let mut app = app();
        app.data_dir = Some(dir.path().join("custom").display().to_string());
        assert_eq!(host(&dir).volume_path(&app), dir.path().join("custom"));
    }

    #[tokio::test]
    async fn test_logrotate_and_collectd_lifecycle() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir);
        let mut app = app();
        app.container_id = Some("abc123".into());

        host.add_logrotate(&app).await.unwrap();
        host.add_collectd(&app).await.unwrap();
        assert!(host.logrotate_path("app-1").exists());
        let collectd = std::fs::read_to_string(host.collectd_path("app-1")).unwrap();
        assert!(collectd.contains("docker-abc123.scope"));

        host.remove_logrotate("app-1").await.unwrap();
        host.remove_collectd("app-1").await.unwrap();
        host.remove_log_dir("app-1").await.unwrap();
        assert!(!host.logrotate_path("app-1").exists());
        assert!(!host.collectd_path("app-1").exists());
        assert!(!host.log_dir("app-1").exists());

        host.remove_logrotate("app-1").await.unwrap();
        host.remove_collectd("app-1").await.unwrap();
        host.remove_log_dir("app-1").await.unwrap();
    }
}
