// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Icon download from the app catalog over HTTP.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use dockhand_core::app::App;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use super::{IconFetcher, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches `<catalog>/api/v1/apps/<appStoreId>/versions/<version>/icon`.
pub struct HttpIconFetcher {
    client: Client,
    catalog_url: String,
    icons_dir: PathBuf,
}

impl HttpIconFetcher {
    /// Create a fetcher caching icons in `icons_dir`.
    pub fn new(catalog_url: impl Into<String>, icons_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            catalog_url: catalog_url.into().trim_end_matches('/').to_string(),
            icons_dir: icons_dir.into(),
        })
    }

    /// Cached icon path of an app.
    pub fn icon_path(&self, app_id: &str) -> PathBuf {
        self.icons_dir.join(format!("{}.png", app_id))
    }
}

#[async_trait]
impl IconFetcher for HttpIconFetcher {
    async fn fetch_icon(&self, app: &App) -> Result<()> {
        let Some(app_store_id) = &app.app_store_id else {
            debug!(app_id = %app.id, "Not a catalog app, skipping icon");
            return Ok(());
        };
        let url = format!(
            "{}/api/v1/apps/{}/versions/{}/icon",
            self.catalog_url, app_store_id, app.manifest.version
        );

        let response = self.client.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            info!(app_id = %app.id, status = %response.status(), "Icon not available");
            return Ok(());
        }
        let body = response.bytes().await?;

        tokio::fs::create_dir_all(&self.icons_dir).await?;
        tokio::fs::write(self.icon_path(&app.id), &body).await?;
        debug!(app_id = %app.id, bytes = body.len(), "Icon cached");
        Ok(())
    }

    async fn remove_icon(&self, app_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.icon_path(app_id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
