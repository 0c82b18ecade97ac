// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis addon: a per-app redis subcontainer.
//!
//! Live data sits in the host's addon directory mounted at `/data`. Backups
//! copy it into `redisdump/` inside the app data volume so the volume
//! snapshot carries it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dockhand_core::app::App;
use serde_json::Value;
use tracing::{debug, info};

use super::{Addon, AddonEnv, Result};
use crate::host::{HostError, HostIntegration, copy_dir};
use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeError};

const ADDON: &str = "redis";
const REDIS_PORT: u16 = 6379;
const REDIS_DATA_MOUNT: &str = "/data";
const DUMP_DIR: &str = "redisdump";

const MIB: i64 = 1024 * 1024;

/// Runs one redis container per app, labeled as a subcontainer of the app.
pub struct RedisAddon {
    runtime: Arc<dyn ContainerRuntime>,
    host: Arc<dyn HostIntegration>,
    image: String,
}

impl RedisAddon {
    /// Create the provisioner.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        host: Arc<dyn HostIntegration>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            host,
            image: image.into(),
        }
    }

    /// Name of the app's redis container, also its hostname on the app network.
    pub fn container_name(app_id: &str) -> String {
        format!("redis-{}", app_id)
    }

    /// Live data directory of the app's redis.
    pub fn data_path(&self, app: &App) -> PathBuf {
        self.host.addon_path(app, ADDON)
    }

    /// Where backups leave the redis data.
    pub fn dump_path(&self, app: &App) -> PathBuf {
        self.host.volume_path(app).join(DUMP_DIR)
    }

    /// Password already handed to the app, or a fresh one.
    fn password(app: &App) -> String {
        app.addon_config
            .get(ADDON)
            .and_then(|env| env.get("REDIS_PASSWORD"))
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
    }

    fn env(app: &App, password: &str) -> AddonEnv {
        let host = Self::container_name(&app.id);

        let mut env = AddonEnv::new();
        env.insert(
            "REDIS_URL".to_string(),
            format!("redis://:{}@{}:{}", password, host, REDIS_PORT),
        );
        env.insert("REDIS_HOST".to_string(), host);
        env.insert("REDIS_PORT".to_string(), REDIS_PORT.to_string());
        env.insert("REDIS_PASSWORD".to_string(), password.to_string());
        env
    }

    /// 150 MiB for apps up to 2 GiB, 600 MiB above.
    fn memory_limit(app: &App) -> i64 {
        if app.effective_memory_limit() > 2048 * MIB {
            600 * MIB
        } else {
            150 * MIB
        }
    }

    /// Start the existing container, or create one on the data directory.
    async fn ensure_running(&self, app: &App, password: &str) -> Result<()> {
        let name = Self::container_name(&app.id);
        match self.runtime.inspect(&name).await {
            Ok(state) => {
                debug!(app_id = %app.id, running = state.running, "Re-using redis container");
                if !state.running {
                    self.runtime.start_container(&state.id).await?;
                }
                return Ok(());
            }
            Err(RuntimeError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let data = self.data_path(app);
        tokio::fs::create_dir_all(&data)
            .await
            .map_err(HostError::io("create directory", &data))?;

        let mut spec = ContainerSpec::subcontainer(&app.id, &name, &self.image);
        spec.data_volume = Some(data);
        spec.data_mount = REDIS_DATA_MOUNT.to_string();
        spec.memory_limit = Self::memory_limit(app);
        spec.cmd = Some(vec![
            "redis-server".to_string(),
            "--appendonly".to_string(),
            "yes".to_string(),
            "--requirepass".to_string(),
            password.to_string(),
        ]);

        let id = self.runtime.create_container(&spec).await?;
        self.runtime.start_container(&id).await?;
        info!(app_id = %app.id, container_id = %id, "Redis container started");
        Ok(())
    }

    /// Delete the container and replace its data with `source`, if given.
    async fn reset_data(&self, app: &App, source: Option<&Path>) -> Result<()> {
        self.runtime
            .delete_container(&Self::container_name(&app.id))
            .await?;
        let data = self.data_path(app);
        remove_dir(&data).await?;
        if let Some(source) = source {
            copy_dir(source, &data)
                .await
                .map_err(HostError::io("copy redis data", source))?;
        }
        Ok(())
    }
}

async fn remove_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(HostError::io("remove", path)(e).into())
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl Addon for RedisAddon {
    async fn setup(&self, app: &App, _options: &Value) -> Result<AddonEnv> {
        let password = Self::password(app);
        self.ensure_running(app, &password).await?;
        Ok(Self::env(app, &password))
    }

    async fn teardown(&self, app: &App, _options: &Value) -> Result<()> {
        self.reset_data(app, None).await
    }

    async fn backup(&self, app: &App, _options: &Value) -> Result<()> {
        let data = self.data_path(app);
        let dump = self.dump_path(app);
        remove_dir(&dump).await?;
        if tokio::fs::try_exists(&data)
            .await
            .map_err(HostError::io("inspect", &data))?
        {
            copy_dir(&data, &dump)
                .await
                .map_err(HostError::io("dump redis data", &dump))?;
        }
        debug!(app_id = %app.id, "Redis data dumped");
        Ok(())
    }

    async fn restore(&self, app: &App, _options: &Value) -> Result<()> {
        let dump = self.dump_path(app);
        let has_dump = tokio::fs::try_exists(&dump)
            .await
            .map_err(HostError::io("inspect", &dump))?;
        if !has_dump {
            debug!(app_id = %app.id, "No redis dump to restore");
            return Ok(());
        }
        self.reset_data(app, Some(&dump)).await?;
        self.ensure_running(app, &Self::password(app)).await
    }

    async fn clear(&self, app: &App, _options: &Value) -> Result<()> {
        self.reset_data(app, None).await?;
        self.ensure_running(app, &Self::password(app)).await
    }
}
