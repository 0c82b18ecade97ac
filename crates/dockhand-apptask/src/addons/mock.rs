// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recording addon for testing.

use std::sync::Arc;

use async_trait::async_trait;
use dockhand_core::app::App;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Addon, AddonEnv, AddonError, Result};

/// Addon that records every call as `"<operation> <app id>"`. Setup hands
/// out `RECORDED_BY=<app id>`.
#[derive(Default)]
pub struct RecordingAddon {
    calls: Arc<Mutex<Vec<String>>>,
    /// Operation that fails, e.g. `"setup"`
    pub fail_on: Option<&'static str>,
}

impl RecordingAddon {
    /// Create a recording addon.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recording addon that fails on `operation`.
    pub fn failing_on(operation: &'static str) -> Self {
        Self {
            fail_on: Some(operation),
            ..Self::default()
        }
    }

    /// Recorded calls.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, operation: &'static str, app: &App) -> Result<()> {
        self.calls
            .lock()
            .await
            .push(format!("{} {}", operation, app.id));
        if self.fail_on == Some(operation) {
            return Err(AddonError::Failed {
                addon: "recording".to_string(),
                message: format!("{} failed", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Addon for RecordingAddon {
    async fn setup(&self, app: &App, _options: &Value) -> Result<AddonEnv> {
        self.record("setup", app).await?;
        Ok([("RECORDED_BY".to_string(), app.id.clone())].into())
    }

    async fn teardown(&self, app: &App, _options: &Value) -> Result<()> {
        self.record("teardown", app).await
    }

    async fn backup(&self, app: &App, _options: &Value) -> Result<()> {
        self.record("backup", app).await
    }

    async fn restore(&self, app: &App, _options: &Value) -> Result<()> {
        self.record("restore", app).await
    }

    async fn clear(&self, app: &App, _options: &Value) -> Result<()> {
        self.record("clear", app).await
    }
}
