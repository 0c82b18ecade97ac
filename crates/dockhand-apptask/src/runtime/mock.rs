// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock container runtime for testing.
//!
//! Keeps containers and images in memory and behaves like the docker CLI
//! for name conflicts, images in use and already-gone containers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dockhand_core::app::Manifest;
use tokio::sync::Mutex;

use super::traits::*;

/// Container tracked by the mock runtime.
#[derive(Debug, Clone)]
pub struct MockContainer {
    /// Generated id.
    pub id: String,
    /// Creation spec.
    pub spec: ContainerSpec,
    /// Whether the container is running.
    pub running: bool,
}

/// Mock container runtime for testing.
pub struct MockContainerRuntime {
    containers: Arc<Mutex<HashMap<String, MockContainer>>>,
    images: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    next_id: AtomicU64,
    /// Number of image pulls that fail with a transient error before succeeding
    pub pull_failures: AtomicU32,
    /// If true, container creation fails
    pub fail_create: bool,
}

impl Default for MockContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContainerRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            containers: Arc::new(Mutex::new(HashMap::new())),
            images: Arc::new(Mutex::new(HashSet::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            pull_failures: AtomicU32::new(0),
            fail_create: false,
        }
    }

    /// Create a mock runtime whose container creation always fails.
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }

    /// Create a mock runtime whose first `n` image pulls fail transiently.
    pub fn with_pull_failures(n: u32) -> Self {
        let runtime = Self::new();
        runtime.pull_failures.store(n, Ordering::SeqCst);
        runtime
    }

    /// Containers labeled with the app id.
    pub async fn containers_for_app(&self, app_id: &str) -> Vec<MockContainer> {
        let containers = self.containers.lock().await;
        let mut found: Vec<_> = containers
            .values()
            .filter(|c| c.spec.app_id == app_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        found
    }

    /// Look up a container by id.
    pub async fn container(&self, id: &str) -> Option<MockContainer> {
        self.containers.lock().await.get(id).cloned()
    }

    /// Whether an image has been pulled.
    pub async fn has_image(&self, image: &str) -> bool {
        self.images.lock().await.contains(image)
    }

    /// Recorded calls, e.g. `"create app-1"`.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: String) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl ContainerRuntime for MockContainerRuntime {
    fn runtime_type(&self) -> &'static str {
        "mock"
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record(format!("create {}", spec.name)).await;

        if self.fail_create {
            return Err(RuntimeError::CommandFailed {
                command: "create".to_string(),
                stderr: "Mock failure".to_string(),
            });
        }

        let mut containers = self.containers.lock().await;
        if containers.values().any(|c| c.spec.name == spec.name) {
            return Err(RuntimeError::CommandFailed {
                command: "create".to_string(),
                stderr: format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    spec.name
                ),
            });
        }

        let id = format!("mock-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        containers.insert(
            id.clone(),
            MockContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.record(format!("start {}", container_id)).await;
        let mut containers = self.containers.lock().await;
        let found = containers
            .values_mut()
            .find(|c| c.id == container_id || c.spec.name == container_id);
        match found {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(container_id.to_string())),
        }
    }

    async fn stop_containers(&self, app_id: &str) -> Result<()> {
        self.record(format!("stop {}", app_id)).await;
        let mut containers = self.containers.lock().await;
        for container in containers.values_mut() {
            if container.spec.app_id == app_id {
                container.running = false;
            }
        }
        Ok(())
    }

    async fn delete_containers(&self, app_id: &str) -> Result<()> {
        self.record(format!("delete {}", app_id)).await;
        self.containers
            .lock()
            .await
            .retain(|_, c| c.spec.app_id != app_id);
        Ok(())
    }

    async fn delete_container(&self, name_or_id: &str) -> Result<()> {
        self.record(format!("delete_container {}", name_or_id)).await;
        self.containers
            .lock()
            .await
            .retain(|id, c| id != name_or_id && c.spec.name != name_or_id);
        Ok(())
    }

    async fn download_image(&self, manifest: &Manifest) -> Result<()> {
        self.record(format!("pull {}", manifest.docker_image)).await;

        let remaining = self.pull_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.pull_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RuntimeError::Unavailable(
                "registry connection reset".to_string(),
            ));
        }

        self.images
            .lock()
            .await
            .insert(manifest.docker_image.clone());
        Ok(())
    }

    async fn delete_image(&self, manifest: &Manifest) -> Result<()> {
        self.record(format!("rmi {}", manifest.docker_image)).await;

        let in_use = self
            .containers
            .lock()
            .await
            .values()
            .any(|c| c.spec.image == manifest.docker_image);
        if in_use {
            return Err(RuntimeError::InUse(manifest.docker_image.clone()));
        }

        if !self.images.lock().await.remove(&manifest.docker_image) {
            return Err(RuntimeError::NotFound(manifest.docker_image.clone()));
        }
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerState> {
        let containers = self.containers.lock().await;
        let container = containers
            .get(container_id)
            .or_else(|| containers.values().find(|c| c.spec.name == container_id))
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        Ok(ContainerState {
            id: container.id.clone(),
            name: container.spec.name.clone(),
            image: container.spec.image.clone(),
            running: container.running,
        })
    }
}
