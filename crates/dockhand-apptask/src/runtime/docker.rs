// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime backed by the docker CLI.
//!
//! Every invocation goes through [`DockerCliRuntime::run`], which applies a
//! timeout and maps failures onto [`RuntimeError`] by inspecting stderr.

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use dockhand_core::app::Manifest;
use tracing::{debug, info};

use super::traits::*;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const PULL_TIMEOUT: Duration = Duration::from_secs(600);
const STOP_GRACE_SECS: &str = "10";

/// Docker CLI runtime.
#[derive(Debug, Clone)]
pub struct DockerCliRuntime {
    docker_bin: String,
}

impl DockerCliRuntime {
    /// Create a runtime using the given docker binary.
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output> {
        let result = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(&self.docker_bin)
                .args(args)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RuntimeError::Io(e)),
            Err(_) => Err(RuntimeError::Unavailable(format!(
                "docker {} timed out after {}s",
                args.first().unwrap_or(&""),
                timeout.as_secs()
            ))),
        }
    }

    async fn run_success(&self, args: &[&str], timeout: Duration) -> Result<String> {
        let output = self.run(args, timeout).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(classify_failure(args, &output))
        }
    }

    async fn ensure_network(&self, network: &str) -> Result<()> {
        match self
            .run_success(&["network", "inspect", network], COMMAND_TIMEOUT)
            .await
        {
            Ok(_) => Ok(()),
            Err(RuntimeError::NotFound(_)) => {
                info!(network, "Creating network");
                self.run_success(&["network", "create", network], COMMAND_TIMEOUT)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    async fn app_container_ids(&self, app_id: &str, include_stopped: bool) -> Result<Vec<String>> {
        let filter = format!("label={}={}", APP_ID_LABEL, app_id);
        let mut args = vec!["ps", "-q", "--no-trunc", "--filter", filter.as_str()];
        if include_stopped {
            args.insert(1, "-a");
        }
        let stdout = self.run_success(&args, COMMAND_TIMEOUT).await?;
        Ok(stdout.lines().map(str::to_string).collect())
    }
}

/// Map a failed docker invocation onto a runtime error.
fn classify_failure(args: &[&str], output: &Output) -> RuntimeError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let subject = args.last().copied().unwrap_or_default().to_string();
    let lower = stderr.to_lowercase();

    if lower.contains("no such container")
        || lower.contains("no such image")
        || lower.contains("no such network")
        || lower.contains("manifest unknown")
        || lower.contains("not found")
    {
        RuntimeError::NotFound(subject)
    } else if lower.contains("image is being used")
        || lower.contains("image is referenced")
        || lower.contains("conflict: unable to remove")
    {
        RuntimeError::InUse(subject)
    } else if lower.contains("cannot connect to the docker daemon")
        || lower.contains("timeout")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
        || lower.contains("tls handshake")
        || lower.contains("toomanyrequests")
    {
        RuntimeError::Unavailable(stderr)
    } else {
        RuntimeError::CommandFailed {
            command: format!("docker {}", args.first().unwrap_or(&"")),
            stderr,
        }
    }
}

/// Arguments for `docker create`.
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--label".to_string(),
        format!("{}={}", APP_ID_LABEL, spec.app_id),
        "--label".to_string(),
        format!("{}={}", SUBCONTAINER_LABEL, spec.is_subcontainer),
        "--restart".to_string(),
        "unless-stopped".to_string(),
    ];

    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    for port in &spec.ports {
        args.push("-p".to_string());
        let host = if port.loopback_only { "127.0.0.1:" } else { "" };
        args.push(format!(
            "{}{}:{}/{}",
            host, port.host_port, port.container_port, port.protocol
        ));
    }

    if spec.memory_limit > 0 {
        args.push("--memory".to_string());
        args.push(spec.memory_limit.to_string());
    }

    if spec.readonly_rootfs {
        args.push("--read-only".to_string());
    }

    if let Some(volume) = &spec.data_volume {
        args.push("-v".to_string());
        args.push(format!("{}:{}", volume.display(), spec.data_mount));
    }

    if let Some(network) = &spec.network {
        args.push("--network".to_string());
        args.push(network.clone());
        args.push("--network-alias".to_string());
        args.push(spec.name.clone());
    }

    args.push(spec.image.clone());
    if let Some(cmd) = &spec.cmd {
        args.extend(cmd.iter().cloned());
    }
    args
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    fn runtime_type(&self) -> &'static str {
        "docker"
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        if let Some(network) = &spec.network {
            self.ensure_network(network).await?;
        }
        let args = create_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let id = self.run_success(&arg_refs, COMMAND_TIMEOUT).await?;
        info!(container = %spec.name, container_id = %id, "Container created");
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.run_success(&["start", container_id], COMMAND_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn stop_containers(&self, app_id: &str) -> Result<()> {
        for id in self.app_container_ids(app_id, false).await? {
            match self
                .run_success(&["stop", "-t", STOP_GRACE_SECS, &id], COMMAND_TIMEOUT)
                .await
            {
                Ok(_) | Err(RuntimeError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn delete_containers(&self, app_id: &str) -> Result<()> {
        for id in self.app_container_ids(app_id, true).await? {
            self.delete_container(&id).await?;
        }
        Ok(())
    }

    async fn delete_container(&self, name_or_id: &str) -> Result<()> {
        match self
            .run_success(&["rm", "-f", "-v", name_or_id], COMMAND_TIMEOUT)
            .await
        {
            Ok(_) => Ok(()),
            Err(RuntimeError::NotFound(_)) => {
                debug!(container = name_or_id, "Container already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn download_image(&self, manifest: &Manifest) -> Result<()> {
        info!(image = %manifest.docker_image, "Pulling image");
        self.run_success(&["pull", &manifest.docker_image], PULL_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn delete_image(&self, manifest: &Manifest) -> Result<()> {
        self.run_success(&["rmi", &manifest.docker_image], COMMAND_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerState> {
        let stdout = self
            .run_success(
                &[
                    "inspect",
                    "-f",
                    "{{.Id}} {{.Name}} {{.State.Running}} {{.Config.Image}}",
                    container_id,
                ],
                COMMAND_TIMEOUT,
            )
            .await?;

        let fields: Vec<&str> = stdout.split_whitespace().collect();
        match fields.as_slice() {
            [id, name, running, image] => Ok(ContainerState {
                id: id.to_string(),
                name: name.trim_start_matches('/').to_string(),
                running: *running == "true",
                image: image.to_string(),
            }),
            _ => Err(RuntimeError::CommandFailed {
                command: "docker inspect".to_string(),
                stderr: format!("unexpected output: {}", stdout),
            }),
        }
    }
}
