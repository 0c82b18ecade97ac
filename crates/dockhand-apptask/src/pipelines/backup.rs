// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backup pipeline.

use dockhand_core::persistence::AppPatch;
use dockhand_core::state::InstallationState;
use tracing::info;

use crate::context::TaskContext;
use crate::error::Result;
use crate::pipeline::{Pipeline, StepFuture};

/// Build the backup pipeline.
pub fn pipeline(_ctx: &TaskContext) -> Pipeline<TaskContext> {
    Pipeline::new("backup")
        .progress(10, "Backing up")
        .step("backup_app", backup_app)
        .step("mark_installed", mark_installed)
}

/// Run the backup pipeline.
pub async fn run(ctx: &mut TaskContext) -> Result<()> {
    pipeline(ctx).run(ctx).await
}

fn backup_app(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let backup_id = ctx.services.backups.backup_app(&ctx.app).await?;
        info!(app_id = %ctx.app.id, backup_id = %backup_id, "Backup created");
        Ok(())
    })
}

fn mark_installed(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.update(AppPatch {
            installation_state: Some(InstallationState::Installed),
            installation_progress: Some(String::new()),
            ..Default::default()
        })
        .await
    })
}
