// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Uninstall pipeline.
//!
//! Teardown runs in a fixed order and deletes the record last, so a failed
//! run keeps everything needed to try again.

use dockhand_core::persistence::AppPatch;
use tracing::{info, warn};

use super::common::*;
use crate::context::TaskContext;
use crate::error::Result;
use crate::pipeline::{Pipeline, StepFuture};

/// Build the uninstall pipeline.
pub fn pipeline(_ctx: &TaskContext) -> Pipeline<TaskContext> {
    Pipeline::new("uninstall")
        .progress(0, "Remove collectd profile")
        .step("remove_collectd", remove_collectd)
        .progress(5, "Remove logrotate config")
        .step("remove_logrotate", remove_logrotate)
        .progress(10, "Stopping app")
        .step("stop_app", stop_app)
        .progress(20, "Deleting container")
        .step("delete_containers", delete_containers)
        .progress(30, "Teardown addons")
        .step("teardown_addons", teardown_addons)
        .progress(40, "Deleting volume")
        .step("delete_volume", delete_volume)
        .progress(50, "Deleting image")
        .step("delete_image", delete_app_image)
        .progress(60, "Unregistering subdomains")
        .step("unregister_subdomains", unregister_subdomains)
        .progress(80, "Cleanup icon")
        .step("remove_icon", remove_icon)
        .progress(90, "Unconfiguring reverse proxy")
        .step("unconfigure_proxy", unconfigure_proxy)
        .progress(92, "Removing log directory")
        .step("remove_log_dir", remove_log_dir)
        .progress(95, "Remove app from database")
        .step("delete_record", delete_record)
}

/// Run the uninstall pipeline.
pub async fn run(ctx: &mut TaskContext) -> Result<()> {
    info!(app_id = %ctx.app.id, "Uninstalling app");
    pipeline(ctx).run(ctx).await
}

/// Delete the primary container and addon subcontainers.
fn delete_containers(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.runtime.delete_containers(&ctx.app.id).await?;
        ctx.update(AppPatch {
            container_id: Some(None),
            ..Default::default()
        })
        .await
    })
}

fn teardown_addons(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services
            .addons
            .teardown_addons(&ctx.app, &ctx.app.manifest.addons)
            .await?;
        Ok(())
    })
}

fn delete_volume(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.host.delete_volume(&ctx.app, true).await?;
        Ok(())
    })
}

fn delete_app_image(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move { delete_image(ctx, &ctx.app.manifest).await })
}

/// Alternate hostnames first, then the primary.
fn unregister_subdomains(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        for alternate in &ctx.app.alternate_domains {
            unregister(ctx, &alternate.subdomain, &alternate.domain).await?;
        }
        unregister(ctx, &ctx.app.location, &ctx.app.domain).await
    })
}

fn remove_icon(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.icons.remove_icon(&ctx.app.id).await?;
        Ok(())
    })
}

fn remove_log_dir(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        if let Err(e) = ctx.services.host.remove_log_dir(&ctx.app.id).await {
            warn!(app_id = %ctx.app.id, error = %e, "Failed to remove log directory");
        }
        Ok(())
    })
}

fn delete_record(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.store.delete(&ctx.app.id).await?;
        info!(app_id = %ctx.app.id, "App removed");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStep;

    #[tokio::test]
    async fn test_record_is_deleted_last() {
        let ctx = crate::test_support::context().await;
        let pipeline = pipeline(&ctx);
        let mutations: Vec<_> = pipeline
            .steps()
            .iter()
            .filter(|s| matches!(s, PipelineStep::Mutate { .. }))
            .map(|s| s.name())
            .collect();
        assert_eq!(
            mutations,
            vec![
                "remove_collectd",
                "remove_logrotate",
                "stop_app",
                "delete_containers",
                "teardown_addons",
                "delete_volume",
                "delete_image",
                "unregister_subdomains",
                "remove_icon",
                "unconfigure_proxy",
                "remove_log_dir",
                "delete_record",
            ]
        );
    }
}
