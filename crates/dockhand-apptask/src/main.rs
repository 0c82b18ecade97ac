// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dockhand AppTask - runs one lifecycle task for one app.
//!
//! Usage: `dockhand-apptask <app-id>`
//!
//! Exits 0 when the task completed or there was nothing to do,
//! [`PIPELINE_FAILURE_EXIT_CODE`] when the pipeline failed, and 1 when the
//! task could not start (bad configuration, unreachable store, unknown app).

use std::sync::Arc;

use anyhow::Context;
use dockhand_apptask::{Config, PIPELINE_FAILURE_EXIT_CODE, TaskExecutor};
use dockhand_core::persistence::{AppStore, PostgresAppStore, SqliteAppStore};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dockhand_apptask=info,dockhand_core=info".into()),
        )
        .init();

    let app_id = std::env::args()
        .nth(1)
        .context("usage: dockhand-apptask <app-id>")?;

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        app_id = %app_id,
        data_dir = %config.data_dir.display(),
        public_ip = %config.public_ip,
        "Starting Dockhand AppTask"
    );

    let store: Arc<dyn AppStore> = if config.database_url.starts_with("sqlite:") {
        Arc::new(SqliteAppStore::connect(&config.database_url).await?)
    } else {
        Arc::new(PostgresAppStore::connect(&config.database_url).await?)
    };

    let executor = TaskExecutor::from_config(&config, store)?;

    // nothing has been touched if loading fails
    let app = executor
        .load(&app_id)
        .await
        .with_context(|| format!("Failed to load app {}", app_id))?;

    match executor.run_app(app).await {
        Ok(outcome) => {
            info!(app_id = %app_id, outcome = ?outcome, "Task finished");
            Ok(())
        }
        Err(e) => {
            error!(app_id = %app_id, error = %e, "Task failed");
            std::process::exit(PIPELINE_FAILURE_EXIT_CODE);
        }
    }
}
