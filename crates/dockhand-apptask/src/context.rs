// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-run task context shared by all pipeline steps.

use std::sync::Arc;

use async_trait::async_trait;
use dockhand_core::app::App;
use dockhand_core::persistence::{AppPatch, AppStore, StateConstraint};
use dockhand_core::state::InstallationState;
use tracing::info;

use crate::addons::AddonRegistry;
use crate::backup::BackupTransport;
use crate::dns::DomainProvider;
use crate::error::Result;
use crate::host::HostIntegration;
use crate::icons::IconFetcher;
use crate::pipeline::ProgressReporter;
use crate::proxy::ReverseProxy;
use crate::retry::RetryPolicies;
use crate::runtime::ContainerRuntime;

/// External collaborators a pipeline drives.
#[derive(Clone)]
pub struct Services {
    /// Container runtime.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Addon provisioners.
    pub addons: Arc<AddonRegistry>,
    /// DNS provider.
    pub dns: Arc<dyn DomainProvider>,
    /// Reverse proxy.
    pub proxy: Arc<dyn ReverseProxy>,
    /// Backup transport.
    pub backups: Arc<dyn BackupTransport>,
    /// Icon cache.
    pub icons: Arc<dyn IconFetcher>,
    /// Host filesystem integration.
    pub host: Arc<dyn HostIntegration>,
}

/// Facts about the platform the app runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Address DNS records point at.
    pub public_ip: String,
    /// Version checked against manifest bounds.
    pub version: String,
}

/// State of one task run.
///
/// `app` mirrors the stored record: every write goes through
/// [`TaskContext::update`], which persists first and then applies the
/// patch locally.
pub struct TaskContext {
    /// App being processed.
    pub app: App,
    /// Record store.
    pub store: Arc<dyn AppStore>,
    /// Collaborators.
    pub services: Services,
    /// Platform facts.
    pub platform: Platform,
    /// Retry budgets.
    pub policies: RetryPolicies,
}

impl TaskContext {
    /// Create a context for `app`.
    pub fn new(
        app: App,
        store: Arc<dyn AppStore>,
        services: Services,
        platform: Platform,
        policies: RetryPolicies,
    ) -> Self {
        Self {
            app,
            store,
            services,
            platform,
            policies,
        }
    }

    /// Persist `patch` and apply it to the in-memory record.
    pub async fn update(&mut self, patch: AppPatch) -> Result<()> {
        self.store
            .update(&self.app.id, &patch, StateConstraint::Any)
            .await?;
        patch.apply_to(&mut self.app);
        Ok(())
    }

    /// Whether this install repopulates the app from a backup.
    pub fn is_restoring(&self) -> bool {
        self.app.restore_config.is_some()
            || matches!(
                self.app.installation_state,
                InstallationState::PendingRestore | InstallationState::PendingClone
            )
    }
}

#[async_trait]
impl ProgressReporter for TaskContext {
    async fn report_progress(&mut self, percent: u8, message: &str) -> Result<()> {
        info!(app_id = %self.app.id, percent, message, "Progress");
        self.update(AppPatch::progress(format!("{}, {}", percent, message)))
            .await
    }
}
