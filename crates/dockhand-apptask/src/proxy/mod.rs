// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reverse proxy configuration for app hostnames.

pub mod nginx;

pub use nginx::NginxConfigWriter;

use async_trait::async_trait;
use dockhand_core::app::App;
use thiserror::Error;

/// Reverse proxy errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// Config template failed to render.
    #[error("Failed to render proxy config: {0}")]
    Template(String),

    /// Config file could not be written or removed.
    #[error("Failed to write proxy config: {0}")]
    Io(#[from] std::io::Error),

    /// Reload command failed.
    #[error("Proxy reload `{command}` failed: {stderr}")]
    Reload {
        /// Command line.
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// App has no reserved HTTP port yet.
    #[error("App {0} has no HTTP port")]
    MissingHttpPort(String),
}

impl From<minijinja::Error> for ProxyError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Reverse proxy that routes app hostnames to the app's HTTP port.
#[async_trait]
pub trait ReverseProxy: Send + Sync {
    /// Proxy name for logging.
    fn proxy_type(&self) -> &'static str;

    /// Route the app's primary and alternate hostnames to its container.
    async fn configure(&self, app: &App) -> Result<()>;

    /// Remove the app's routes. Succeeds when nothing is configured.
    async fn unconfigure(&self, app: &App) -> Result<()>;
}
