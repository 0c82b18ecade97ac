// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Host-side resources of an app: data volume, log rotation, metrics
//! collection and log directory.

pub mod local;

pub use local::LocalHost;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dockhand_core::app::App;
use thiserror::Error;

/// Host integration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HostError {
    /// Filesystem operation failed.
    #[error("Failed to {operation} {}: {source}", .path.display())]
    Io {
        /// What was attempted.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    pub(crate) fn io(
        operation: &'static str,
        path: &Path,
    ) -> impl FnOnce(std::io::Error) -> Self + use<> {
        let path = path.to_path_buf();
        move |source| Self::Io {
            operation,
            path,
            source,
        }
    }
}

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Copy the contents of `from` into `to`, creating `to`.
pub(crate) async fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        tokio::fs::create_dir_all(&dst).await?;
        let mut entries = tokio::fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), target).await?;
            }
        }
    }
    Ok(())
}

/// Host filesystem integration.
#[async_trait]
pub trait HostIntegration: Send + Sync {
    /// Directory mounted as the app's data volume.
    fn volume_path(&self, app: &App) -> PathBuf;

    /// Directory holding live data of an addon container.
    fn addon_path(&self, app: &App, addon: &str) -> PathBuf;

    /// Create the data volume. Existing data is kept.
    async fn create_volume(&self, app: &App) -> Result<()>;

    /// Empty the data volume, removing the directory itself only when
    /// `remove_directory` is set.
    async fn delete_volume(&self, app: &App, remove_directory: bool) -> Result<()>;

    /// Install the log rotation config for the app's container logs.
    async fn add_logrotate(&self, app: &App) -> Result<()>;

    /// Remove the log rotation config. Succeeds when absent.
    async fn remove_logrotate(&self, app_id: &str) -> Result<()>;

    /// Install the metrics collection profile for the app's container.
    async fn add_collectd(&self, app: &App) -> Result<()>;

    /// Remove the metrics collection profile. Succeeds when absent.
    async fn remove_collectd(&self, app_id: &str) -> Result<()>;

    /// Remove the app's log directory. Succeeds when absent.
    async fn remove_log_dir(&self, app_id: &str) -> Result<()>;
}
