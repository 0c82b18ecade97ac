// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock backup transport for testing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dockhand_core::app::{AddonConfig, App, RestoreConfig};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{BackupError, BackupTransport, Result};

/// Records backups and restores in memory.
#[derive(Default)]
pub struct MockBackupTransport {
    backups: Arc<Mutex<Vec<String>>>,
    restores: Arc<Mutex<Vec<(String, String)>>>,
    /// If true, backups fail
    pub should_fail: bool,
}

impl MockBackupTransport {
    /// Create a mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport whose backups fail.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Ids of backups taken.
    pub async fn backups(&self) -> Vec<String> {
        self.backups.lock().await.clone()
    }

    /// `(app id, backup id)` of restores performed.
    pub async fn restores(&self) -> Vec<(String, String)> {
        self.restores.lock().await.clone()
    }
}

#[async_trait]
impl BackupTransport for MockBackupTransport {
    fn transport_type(&self) -> &'static str {
        "mock"
    }

    async fn backup_app(&self, app: &App) -> Result<String> {
        if self.should_fail {
            return Err(BackupError::Failed("Backup storage unavailable".into()));
        }
        let mut backups = self.backups.lock().await;
        let backup_id = format!("backup-{}-{}", app.id, backups.len() + 1);
        backups.push(backup_id.clone());
        Ok(backup_id)
    }

    async fn restore_app(
        &self,
        app: &App,
        _addons: &BTreeMap<String, Value>,
        restore_config: &RestoreConfig,
    ) -> Result<AddonConfig> {
        self.restores
            .lock()
            .await
            .push((app.id.clone(), restore_config.backup_id.clone()));
        Ok(app.addon_config.clone())
    }
}
