// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for dockhand-apptask lifecycle tests.
//!
//! Provides TestContext wiring an in-memory store, mock runtime, mock DNS
//! and mock backups into a TaskExecutor.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use dockhand_core::app::{App, Manifest, PortBinding, Protocol};
use dockhand_core::persistence::sqlite::migrate;
use dockhand_core::persistence::{AppPatch, AppStore, SqliteAppStore, StateConstraint};
use dockhand_core::state::InstallationState;
use sqlx::sqlite::SqlitePoolOptions;

use dockhand_apptask::addons::AddonRegistry;
use dockhand_apptask::backup::MockBackupTransport;
use dockhand_apptask::dns::MockDomainProvider;
use dockhand_apptask::host::LocalHost;
use dockhand_apptask::icons::HttpIconFetcher;
use dockhand_apptask::proxy::NginxConfigWriter;
use dockhand_apptask::runtime::MockContainerRuntime;
use dockhand_apptask::{Platform, RetryPolicies, Services, TaskExecutor};

pub const PUBLIC_IP: &str = "203.0.113.10";
pub const APP_ID: &str = "app-1";
pub const FQDN: &str = "notes.example.com";
pub const SSH_HOST_PORT: u16 = 2222;

/// Executor and the collaborators behind it.
pub struct TestContext {
    pub store: Arc<SqliteAppStore>,
    pub runtime: Arc<MockContainerRuntime>,
    pub dns: Arc<MockDomainProvider>,
    pub backups: Arc<MockBackupTransport>,
    pub proxy: Arc<NginxConfigWriter>,
    pub host: Arc<LocalHost>,
    pub executor: TaskExecutor,
    pub services: Services,
    pub platform: Platform,
    pub data_dir: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TestContext {
    /// Context with default mocks.
    pub async fn new() -> Self {
        Self::with_mocks(
            MockContainerRuntime::new(),
            MockDomainProvider::new(),
            MockBackupTransport::new(),
        )
        .await
    }

    /// Context with a pre-seeded DNS provider.
    pub async fn with_dns(dns: MockDomainProvider) -> Self {
        Self::with_mocks(MockContainerRuntime::new(), dns, MockBackupTransport::new()).await
    }

    /// Context with a custom backup transport.
    pub async fn with_backups(backups: MockBackupTransport) -> Self {
        Self::with_mocks(MockContainerRuntime::new(), MockDomainProvider::new(), backups).await
    }

    /// Context with a custom container runtime.
    pub async fn with_runtime(runtime: MockContainerRuntime) -> Self {
        Self::with_mocks(runtime, MockDomainProvider::new(), MockBackupTransport::new()).await
    }

    /// Context with every mock supplied by the caller.
    pub async fn with_mocks(
        runtime: MockContainerRuntime,
        dns: MockDomainProvider,
        backups: MockBackupTransport,
    ) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        migrate(&pool).await.expect("Failed to run migrations");
        let store = Arc::new(SqliteAppStore::new(pool));

        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().to_path_buf();

        let runtime = Arc::new(runtime);
        let dns = Arc::new(dns);
        let backups = Arc::new(backups);
        let proxy = Arc::new(NginxConfigWriter::new(data_dir.join("nginx"), None));
        let host = Arc::new(LocalHost::new(
            data_dir.join("apps"),
            data_dir.join("logs"),
            data_dir.join("logrotate.d"),
            data_dir.join("collectd"),
        ));

        let services = Services {
            runtime: runtime.clone(),
            addons: Arc::new(AddonRegistry::builtin(
                runtime.clone(),
                host.clone(),
                "redis:7-alpine",
            )),
            dns: dns.clone(),
            proxy: proxy.clone(),
            backups: backups.clone(),
            // Unreachable; apps without a store id never fetch.
            icons: Arc::new(
                HttpIconFetcher::new("http://127.0.0.1:1", data_dir.join("icons"))
                    .expect("Failed to build icon fetcher"),
            ),
            host: host.clone(),
        };
        let platform = Platform {
            public_ip: PUBLIC_IP.to_string(),
            version: "8.0.0".to_string(),
        };
        let executor = TaskExecutor::new(store.clone(), services.clone(), platform.clone())
            .with_policies(RetryPolicies::immediate());

        Self {
            store,
            runtime,
            dns,
            backups,
            proxy,
            host,
            executor,
            services,
            platform,
            data_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Executor sharing this context's store and mocks, with `services`
    /// adjusted by the caller.
    pub fn executor_with(&self, adjust: impl FnOnce(&mut Services)) -> TaskExecutor {
        let mut services = self.services.clone();
        adjust(&mut services);
        TaskExecutor::new(self.store.clone(), services, self.platform.clone())
            .with_policies(RetryPolicies::immediate())
    }

    /// Insert a new app in `pending_install` with `SSH_PORT` bound to 2222.
    pub async fn add_app(&self, manifest: Manifest) -> App {
        self.add_app_with(manifest, |_| {}).await
    }

    /// Like [`TestContext::add_app`], with the record adjusted before insert.
    pub async fn add_app_with(&self, manifest: Manifest, adjust: impl FnOnce(&mut App)) -> App {
        let mut app = App::new(APP_ID, manifest, "notes", "example.com");
        app.port_bindings.insert(
            "SSH_PORT".to_string(),
            PortBinding {
                host_port: SSH_HOST_PORT,
                protocol: Protocol::Tcp,
            },
        );
        adjust(&mut app);
        self.store.add(&app).await.expect("Failed to add app");
        app
    }

    /// Load the app, panicking if it is gone.
    pub async fn get(&self) -> App {
        self.store
            .get(APP_ID)
            .await
            .expect("Failed to load app")
            .expect("App exists")
    }

    /// Insert and install an app.
    pub async fn installed(&self, manifest: Manifest) -> App {
        self.add_app(manifest).await;
        self.executor
            .run_task(APP_ID)
            .await
            .expect("Install should succeed");
        self.get().await
    }

    /// Issue an installation command through the transition table.
    pub async fn command(&self, target: InstallationState, extra: AppPatch) {
        self.store
            .set_installation_command(APP_ID, target, extra)
            .await
            .expect("Command should be accepted");
    }

    /// Force the installation state, bypassing the transition table.
    pub async fn force_state(&self, state: InstallationState) {
        let patch = AppPatch {
            installation_state: Some(state),
            ..Default::default()
        };
        self.store
            .update(APP_ID, &patch, StateConstraint::Any)
            .await
            .expect("Failed to force state");
    }
}

/// Manifest with an SSH port and a redis addon.
pub fn manifest() -> Manifest {
    manifest_with_image("example/notes:1.0.0", "1.0.0")
}

pub fn manifest_with_image(image: &str, version: &str) -> Manifest {
    serde_json::from_value(serde_json::json!({
        "id": "org.example.notes",
        "version": version,
        "dockerImage": image,
        "healthCheckPath": "/healthz",
        "httpPort": 3000,
        "tcpPorts": {
            "SSH_PORT": { "title": "SSH", "defaultValue": 2222, "containerPort": 22 }
        },
        "addons": { "redis": {}, "localstorage": {} }
    }))
    .expect("Valid manifest")
}

/// Manifest without ports or addons.
pub fn plain_manifest() -> Manifest {
    serde_json::from_value(serde_json::json!({
        "version": "1.0.0",
        "dockerImage": "example/notes:1.0.0",
        "healthCheckPath": "/",
        "httpPort": 3000
    }))
    .expect("Valid manifest")
}
