// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configure pipeline: hostname, port and access changes.
//!
//! Same shape as install from the port reservation onward. Addons are set
//! up again rather than torn down because their configuration depends on
//! the hostname.

use dockhand_core::app::App;
use tracing::info;

use super::common::*;
use crate::context::TaskContext;
use crate::error::Result;
use crate::pipeline::{Pipeline, StepFuture};

/// Whether the primary hostname differs from the one in `old_config`.
pub fn location_changed(app: &App) -> bool {
    app.old_config
        .as_ref()
        .is_some_and(|old| old.fqdn() != app.fqdn())
}

/// Build the configure pipeline for `ctx`.
pub fn pipeline(ctx: &TaskContext) -> Pipeline<TaskContext> {
    let policies = ctx.policies;

    Pipeline::new("configure")
        .step("validate_hostnames", validate_hostnames)
        .progress(10, "Cleaning up old install")
        .step("unconfigure_proxy", unconfigure_proxy)
        .step("remove_collectd", remove_collectd)
        .step("remove_logrotate", remove_logrotate)
        .step("stop_app", stop_app)
        .step("delete_container", delete_container)
        .step("unregister_old_domains", unregister_old_domains)
        .step("reserve_http_port", reserve_http_port)
        .progress(20, "Downloading icon")
        .retry("download_icon", download_icon, policies.icon_download)
        .progress(30, "Registering subdomain")
        .step("register_subdomains", register)
        .progress(40, "Downloading image")
        .retry("download_image", download_image, policies.image_download)
        .progress(45, "Ensuring volume")
        .step("create_volume", create_volume)
        .progress(50, "Setting up addons")
        .step("setup_addons", setup_addons)
        .progress(60, "Creating container")
        .step("create_container", create_container)
        .progress(65, "Setting up logrotate config")
        .step("add_logrotate", add_logrotate)
        .progress(70, "Setting up collectd profile")
        .step("add_collectd", add_collectd)
        .step("run_app", run_app)
        .progress(80, "Waiting for DNS propagation")
        .step("wait_for_dns", wait_for_dns)
        .progress(85, "Waiting for alternate domains DNS")
        .step("wait_for_alternate_dns", wait_for_alternate_dns)
        .progress(90, "Configuring reverse proxy")
        .step("configure_proxy", configure_proxy)
        .step("mark_installed", mark_installed)
}

/// Run the configure pipeline.
pub async fn run(ctx: &mut TaskContext) -> Result<()> {
    info!(
        app_id = %ctx.app.id,
        location_changed = location_changed(&ctx.app),
        "Configuring app"
    );
    pipeline(ctx).run(ctx).await
}

/// Unregister alternate hostnames that were dropped and, when the primary
/// hostname moved, the old primary.
fn unregister_old_domains(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let Some(old) = &ctx.app.old_config else {
            return Ok(());
        };
        for alternate in removed_alternates(&old.alternate_domains, &ctx.app) {
            unregister(ctx, &alternate.subdomain, &alternate.domain).await?;
        }
        if location_changed(&ctx.app) {
            unregister(ctx, &old.location, &old.domain).await?;
        }
        Ok(())
    })
}

/// A moved hostname must not silently take over another app's record.
fn register(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move { register_subdomains(ctx, !location_changed(&ctx.app)).await })
}
