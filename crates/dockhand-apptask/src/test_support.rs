// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task contexts backed by mocks for unit tests.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use dockhand_core::app::{App, Manifest};
use dockhand_core::persistence::SqliteAppStore;
use dockhand_core::persistence::sqlite::migrate;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

use crate::addons::AddonRegistry;
use crate::backup::MockBackupTransport;
use crate::context::{Platform, Services, TaskContext};
use crate::dns::MockDomainProvider;
use crate::host::LocalHost;
use crate::icons::HttpIconFetcher;
use crate::proxy::NginxConfigWriter;
use crate::retry::RetryPolicies;
use crate::runtime::MockContainerRuntime;

pub(crate) fn manifest() -> Manifest {
    serde_json::from_value(serde_json::json!({
        "version": "1.0.0",
        "dockerImage": "example/notes:1.0.0",
        "healthCheckPath": "/",
        "httpPort": 3000
    }))
    .unwrap()
}

/// Task context whose collaborators write under a temp dir removed on drop.
pub(crate) struct TestTaskContext {
    ctx: TaskContext,
    _dir: TempDir,
}

impl Deref for TestTaskContext {
    type Target = TaskContext;

    fn deref(&self) -> &TaskContext {
        &self.ctx
    }
}

impl DerefMut for TestTaskContext {
    fn deref_mut(&mut self) -> &mut TaskContext {
        &mut self.ctx
    }
}

/// Context for an unsaved app.
pub(crate) async fn context() -> TestTaskContext {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    migrate(&pool).await.expect("Failed to run migrations");

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    let runtime = Arc::new(MockContainerRuntime::new());
    let host = Arc::new(LocalHost::new(
        dir.join("apps"),
        dir.join("logs"),
        dir.join("logrotate.d"),
        dir.join("collectd"),
    ));
    let services = Services {
        runtime: runtime.clone(),
        addons: Arc::new(AddonRegistry::builtin(
            runtime,
            host.clone(),
            "redis:7-alpine",
        )),
        dns: Arc::new(MockDomainProvider::new()),
        proxy: Arc::new(NginxConfigWriter::new(dir.join("nginx"), None)),
        backups: Arc::new(MockBackupTransport::new()),
        icons: Arc::new(HttpIconFetcher::new("http://127.0.0.1:1", dir.join("icons")).unwrap()),
        host,
    };

    let ctx = TaskContext::new(
        App::new("app-1", manifest(), "notes", "example.com"),
        Arc::new(SqliteAppStore::new(pool)),
        services,
        Platform {
            public_ip: "203.0.113.10".into(),
            version: "8.0.0".into(),
        },
        RetryPolicies::immediate(),
    );
    TestTaskContext {
        ctx,
        _dir: temp_dir,
    }
}
