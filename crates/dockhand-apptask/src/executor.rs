// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task dispatcher.
//!
//! Loads an app, picks the pipeline from its installation state, runs it
//! and, when it fails, moves the record to the failure state with the
//! error message as progress.

use std::sync::Arc;

use chrono::Utc;
use dockhand_core::app::App;
use dockhand_core::error::CoreError;
use dockhand_core::persistence::{AppPatch, AppStore, StateConstraint};
use dockhand_core::state::InstallationState;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::addons::AddonRegistry;
use crate::backup::LocalBackupTransport;
use crate::config::{Config, DnsProviderKind};
use crate::context::{Platform, Services, TaskContext};
use crate::dns::{DomainProvider, ManualDomainProvider, NoopDomainProvider};
use crate::error::{Error, Result};
use crate::host::LocalHost;
use crate::icons::HttpIconFetcher;
use crate::pipelines::TaskKind;
use crate::proxy::NginxConfigWriter;
use crate::retry::RetryPolicies;
use crate::runtime::DockerCliRuntime;

/// Result of a task run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// A pipeline ran to completion.
    Completed(TaskKind),
    /// The app is in `error`; nothing to do until a new command is issued.
    Skipped,
}

impl Services {
    /// Built-in collaborators for a configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let runtime = Arc::new(DockerCliRuntime::new(&config.docker_bin));
        let host = Arc::new(LocalHost::new(
            config.apps_data_dir(),
            &config.log_dir,
            &config.logrotate_dir,
            &config.collectd_dir,
        ));
        let addons = Arc::new(AddonRegistry::builtin(
            runtime.clone(),
            host.clone(),
            &config.redis_image,
        ));
        let backups = Arc::new(LocalBackupTransport::new(
            config.backup_dir(),
            addons.clone(),
            host.clone(),
        ));
        let icons = Arc::new(HttpIconFetcher::new(
            &config.catalog_url,
            config.icons_dir(),
        )?);
        let proxy = Arc::new(NginxConfigWriter::new(
            &config.nginx_dir,
            config.nginx_reload.clone(),
        ));

        let dns: Arc<dyn DomainProvider> = match config.dns_provider {
            DnsProviderKind::Manual => Arc::new(ManualDomainProvider),
            DnsProviderKind::Noop => Arc::new(NoopDomainProvider),
        };

        Ok(Self {
            runtime,
            addons,
            dns,
            proxy,
            backups,
            icons,
            host,
        })
    }
}

/// Runs lifecycle tasks for apps.
pub struct TaskExecutor {
    store: Arc<dyn AppStore>,
    services: Services,
    platform: Platform,
    policies: RetryPolicies,
}

impl TaskExecutor {
    /// Create an executor with production retry budgets.
    pub fn new(store: Arc<dyn AppStore>, services: Services, platform: Platform) -> Self {
        Self {
            store,
            services,
            platform,
            policies: RetryPolicies::default(),
        }
    }

    /// Create an executor wired with the built-in collaborators.
    pub fn from_config(config: &Config, store: Arc<dyn AppStore>) -> Result<Self> {
        let platform = Platform {
            public_ip: config.public_ip.to_string(),
            version: config.platform_version.clone(),
        };
        Ok(Self::new(store, Services::from_config(config)?, platform))
    }

    /// Replace the retry budgets.
    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Load the app and run the pipeline its installation state asks for.
    pub async fn run_task(&self, app_id: &str) -> Result<TaskOutcome> {
        let app = self.load(app_id).await?;
        self.run_app(app).await
    }

    /// Load an app record. Fails with `AppNotFound` when there is none.
    pub async fn load(&self, app_id: &str) -> Result<App> {
        let app = self
            .store
            .get(app_id)
            .await?
            .ok_or_else(|| CoreError::AppNotFound {
                app_id: app_id.to_string(),
            })?;
        Ok(app)
    }

    /// Run the pipeline the installation state of `app` asks for.
    ///
    /// On pipeline failure the app is moved to its failure state before the
    /// error is returned.
    pub async fn run_app(&self, app: App) -> Result<TaskOutcome> {
        let app_id = app.id.clone();
        let run_id = Uuid::new_v4();
        info!(
            app_id = %app_id,
            %run_id,
            installation_state = %app.installation_state,
            run_state = %app.run_state,
            "Starting task"
        );

        let Some(kind) = TaskKind::for_state(app.installation_state) else {
            warn!(app_id = %app_id, "App is in error state, nothing to do");
            return Ok(TaskOutcome::Skipped);
        };

        let mut ctx = TaskContext::new(
            app,
            self.store.clone(),
            self.services.clone(),
            self.platform.clone(),
            self.policies,
        );

        match kind.run(&mut ctx).await {
            Ok(()) => {
                info!(app_id = %app_id, %run_id, task = %kind, "Task completed");
                Ok(TaskOutcome::Completed(kind))
            }
            Err(e) => {
                error!(
                    app_id = %app_id,
                    %run_id,
                    task = %kind,
                    error = %e,
                    error_kind = ?e.kind(),
                    "Task failed"
                );
                self.record_failure(&ctx, kind, &e).await;
                Err(e)
            }
        }
    }

    async fn record_failure(&self, ctx: &TaskContext, kind: TaskKind, err: &Error) {
        let Some(patch) = failure_patch(kind, err) else {
            return;
        };
        if let Err(store_err) = self
            .store
            .update(&ctx.app.id, &patch, StateConstraint::Any)
            .await
        {
            error!(
                app_id = %ctx.app.id,
                error = %store_err,
                "Failed to record task failure"
            );
        }
    }
}

/// Record update applied when a pipeline fails, `None` to leave the app as
/// it is.
///
/// Backups and update backups fall back to `installed` since nothing was
/// torn down yet; run-state reconciliation never touches the installation
/// state.
pub fn failure_patch(kind: TaskKind, err: &Error) -> Option<AppPatch> {
    let state = match (kind, err) {
        (TaskKind::RunState, _) => return None,
        (TaskKind::Backup, _) | (TaskKind::Update, Error::Backup(_)) => InstallationState::Installed,
        _ => InstallationState::Error,
    };
    let update_time = (kind == TaskKind::Update).then(|| Some(Utc::now()));

    Some(AppPatch {
        installation_state: Some(state),
        installation_progress: Some(err.to_string()),
        update_time,
        ..Default::default()
    })
}
