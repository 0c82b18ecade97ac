// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! App icon cache.

pub mod http;

pub use http::HttpIconFetcher;

use async_trait::async_trait;
use dockhand_core::app::App;
use thiserror::Error;

/// Icon fetch errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IconError {
    /// Catalog unreachable.
    #[error("Network error downloading icon: {0}")]
    Network(String),

    /// Icon cache could not be written.
    #[error("Failed to store icon: {0}")]
    Io(#[from] std::io::Error),
}

impl IconError {
    /// Whether retrying may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for IconError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result type for icon operations.
pub type Result<T> = std::result::Result<T, IconError>;

/// Downloads and caches app icons.
#[async_trait]
pub trait IconFetcher: Send + Sync {
    /// Download the app's icon into the cache. A missing icon is not an error.
    async fn fetch_icon(&self, app: &App) -> Result<()>;

    /// Remove the cached icon. Succeeds when absent.
    async fn remove_icon(&self, app_id: &str) -> Result<()>;
}
