// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backup and restore transport.

pub mod local;
pub mod mock;

pub use local::LocalBackupTransport;
pub use mock::MockBackupTransport;

use std::collections::BTreeMap;

use async_trait::async_trait;
use dockhand_core::app::{AddonConfig, App, RestoreConfig};
use serde_json::Value;
use thiserror::Error;

use crate::addons::AddonError;
use crate::host::HostError;

/// Backup transport errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackupError {
    /// Backup id does not exist.
    #[error("Backup {0} not found")]
    NotFound(String),

    /// Addon backup or restore failed.
    #[error(transparent)]
    Addon(#[from] AddonError),

    /// Volume could not be located or prepared.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Archive could not be read or written.
    #[error("Backup IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport reported a failure.
    #[error("{0}")]
    Failed(String),
}

/// Result type for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Stores and retrieves app backups.
#[async_trait]
pub trait BackupTransport: Send + Sync {
    /// Transport name for logging.
    fn transport_type(&self) -> &'static str;

    /// Back up the app's addons and data volume, returning the backup id.
    async fn backup_app(&self, app: &App) -> Result<String>;

    /// Provision `addons` and repopulate them and the data volume from
    /// the backup named in `restore_config`, returning the environment of
    /// the provisioned addons.
    async fn restore_app(
        &self,
        app: &App,
        addons: &BTreeMap<String, Value>,
        restore_config: &RestoreConfig,
    ) -> Result<AddonConfig>;
}
