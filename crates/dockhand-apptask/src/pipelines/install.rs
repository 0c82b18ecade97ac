// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Install pipeline, also used for clone and restore.
//!
//! Starts by tearing down whatever a previous attempt left behind, then
//! provisions in dependency order: proxy and icon, DNS, image, volume,
//! addons, container, metrics, DNS propagation and finally the proxy.

use dockhand_core::persistence::AppPatch;
use tracing::{info, warn};

use super::common::*;
use crate::addons::removed_addons;
use crate::context::TaskContext;
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, StepFuture};

/// Build the install pipeline for `ctx`.
pub fn pipeline(ctx: &TaskContext) -> Pipeline<TaskContext> {
    let policies = ctx.policies;
    let restore = ctx.app.restore_config.is_some();

    Pipeline::new("install")
        .step("verify_manifest", verify_manifest)
        .step("validate_hostnames", validate_hostnames)
        .progress(10, "Cleaning up old install")
        .step("unconfigure_proxy", unconfigure_proxy)
        .step("remove_collectd", remove_collectd)
        .step("remove_logrotate", remove_logrotate)
        .step("stop_app", stop_app)
        .step("delete_container", delete_container)
        .step("teardown_old_addons", teardown_old_addons)
        .step("clear_volume", clear_volume)
        .step("delete_old_image", delete_old_image)
        .step("reserve_http_port", reserve_http_port)
        .progress(20, "Downloading icon")
        .retry("download_icon", download_icon, policies.icon_download)
        .progress(30, "Registering subdomain")
        .step("register_subdomains", register)
        .progress(40, "Downloading image")
        .retry("download_image", download_image, policies.image_download)
        .progress(50, "Creating volume")
        .step("create_volume", create_volume)
        .when(restore, |p| {
            p.progress(60, "Download backup and restoring addons")
                .step("restore_from_backup", restore_from_backup)
        })
        .when(!restore, |p| {
            p.progress(60, "Setting up addons")
                .step("setup_addons", setup_addons)
        })
        .progress(70, "Creating container")
        .step("create_container", create_container)
        .progress(75, "Setting up logrotate config")
        .step("add_logrotate", add_logrotate)
        .progress(80, "Setting up collectd profile")
        .step("add_collectd", add_collectd)
        .step("run_app", run_app)
        .progress(85, "Waiting for DNS propagation")
        .step("wait_for_dns", wait_for_dns)
        .progress(90, "Waiting for alternate domains DNS")
        .step("wait_for_alternate_dns", wait_for_alternate_dns)
        .progress(95, "Configuring reverse proxy")
        .step("configure_proxy", configure_proxy)
        .step("mark_installed", mark_installed)
}

/// Run the install pipeline.
pub async fn run(ctx: &mut TaskContext) -> Result<()> {
    info!(app_id = %ctx.app.id, restoring = ctx.is_restoring(), "Installing app");
    pipeline(ctx).run(ctx).await
}

/// Tear down addons from a previous attempt.
///
/// A restore keeps addons the manifest still declares so their
/// credentials survive; everything else is torn down.
fn teardown_old_addons(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let addons = match (&ctx.app.old_config, ctx.is_restoring()) {
            (Some(old), true) => removed_addons(&old.manifest.addons, &ctx.app.manifest.addons),
            (None, true) => return Ok(()),
            (Some(old), false) => old.manifest.addons.clone(),
            (None, false) => ctx.app.manifest.addons.clone(),
        };
        if let Err(e) = ctx.services.addons.teardown_addons(&ctx.app, &addons).await {
            warn!(app_id = %ctx.app.id, error = %e, "Addon teardown failed, continuing");
        }
        Ok(())
    })
}

fn delete_old_image(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        match &ctx.app.old_config {
            Some(old) if old.manifest.docker_image != ctx.app.manifest.docker_image => {
                delete_image(ctx, &old.manifest).await
            }
            _ => Ok(()),
        }
    })
}

/// Clone and restore reclaim their own former hostname.
fn register(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move { register_subdomains(ctx, ctx.is_restoring()).await })
}

fn restore_from_backup(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let restore_config = ctx.app.restore_config.clone().ok_or_else(|| {
            Error::InvalidState(format!("App {} has no restore config", ctx.app.id))
        })?;
        let addon_config = ctx
            .services
            .backups
            .restore_app(&ctx.app, &ctx.app.manifest.addons, &restore_config)
            .await?;
        ctx.update(AppPatch {
            addon_config: Some(addon_config),
            ..Default::default()
        })
        .await
    })
}
