// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run-state reconciliation for installed apps.

use dockhand_core::state::RunState;
use tracing::debug;

use super::common::{run_app, setup_addons, stop_app};
use crate::context::TaskContext;
use crate::error::Result;
use crate::pipeline::Pipeline;

/// Build the pipeline that brings the app's containers in line with
/// `run_state`. Starting brings addon containers up before the primary.
pub fn pipeline(ctx: &TaskContext) -> Pipeline<TaskContext> {
    let run_state = ctx.app.run_state;
    Pipeline::new("run_state")
        .when(run_state == RunState::PendingStop, |p| {
            p.step("stop_app", stop_app)
        })
        .when(
            matches!(run_state, RunState::PendingStart | RunState::Running),
            |p| p.step("setup_addons", setup_addons).step("run_app", run_app),
        )
}

/// Reconcile the run state.
pub async fn run(ctx: &mut TaskContext) -> Result<()> {
    debug!(app_id = %ctx.app.id, run_state = %ctx.app.run_state, "Reconciling run state");
    pipeline(ctx).run(ctx).await
}
