// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Steps shared by several pipelines.
//!
//! Every step re-reads what it needs from `ctx.app` so that it can be
//! re-run from the top after a crash.

use chrono::Utc;
use dockhand_core::app::{AlternateDomain, App, Manifest};
use dockhand_core::manifest::{validate_hostname, verify_manifest as check_manifest};
use dockhand_core::persistence::AppPatch;
use dockhand_core::state::{InstallationState, RunState};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::context::TaskContext;
use crate::dns::{register_subdomain, unregister_subdomain, wait_for_subdomain};
use crate::error::{Error, Result};
use crate::pipeline::StepFuture;
use crate::runtime::{ContainerSpec, RuntimeError};

/// Check a manifest against platform bounds and the addon registry.
pub(crate) fn check(ctx: &TaskContext, manifest: &Manifest) -> Result<()> {
    check_manifest(manifest, &ctx.platform.version)?;
    ctx.services.addons.validate(&manifest.addons)?;
    Ok(())
}

/// Verify the current manifest.
pub fn verify_manifest(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move { check(ctx, &ctx.app.manifest) })
}

/// Validate the primary and alternate hostnames.
pub fn validate_hostnames(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        validate_hostname(&ctx.app.location, &ctx.app.domain)?;
        for alternate in &ctx.app.alternate_domains {
            validate_hostname(&alternate.subdomain, &alternate.domain)?;
        }
        Ok(())
    })
}

pub fn unconfigure_proxy(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.proxy.unconfigure(&ctx.app).await?;
        Ok(())
    })
}

pub fn configure_proxy(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.proxy.configure(&ctx.app).await?;
        Ok(())
    })
}

pub fn remove_collectd(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.host.remove_collectd(&ctx.app.id).await?;
        Ok(())
    })
}

pub fn add_collectd(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.host.add_collectd(&ctx.app).await?;
        Ok(())
    })
}

pub fn remove_logrotate(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.host.remove_logrotate(&ctx.app.id).await?;
        Ok(())
    })
}

pub fn add_logrotate(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.host.add_logrotate(&ctx.app).await?;
        Ok(())
    })
}

/// Stop every container of the app.
pub fn stop_app(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.runtime.stop_containers(&ctx.app.id).await?;
        ctx.update(AppPatch {
            run_state: Some(RunState::Stopped),
            health: Some(None),
            ..Default::default()
        })
        .await
    })
}

/// Start the primary container.
pub fn run_app(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let container_id = ctx.app.container_id.clone().ok_or_else(|| {
            Error::InvalidState(format!("App {} has no container to start", ctx.app.id))
        })?;
        ctx.services.runtime.start_container(&container_id).await?;
        ctx.update(AppPatch {
            run_state: Some(RunState::Running),
            ..Default::default()
        })
        .await
    })
}

/// Delete the primary container. Addon subcontainers are left to their
/// provisioners.
pub fn delete_container(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        if let Some(container_id) = &ctx.app.container_id {
            ctx.services.runtime.delete_container(container_id).await?;
        }
        ctx.services.runtime.delete_container(&ctx.app.id).await?;
        ctx.update(AppPatch {
            container_id: Some(None),
            ..Default::default()
        })
        .await
    })
}

pub fn create_container(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let http_port = ctx.app.http_port.ok_or_else(|| {
            Error::InvalidState(format!("App {} has no reserved HTTP port", ctx.app.id))
        })?;
        let volume = ctx.services.host.volume_path(&ctx.app);
        let spec = ContainerSpec::for_app(&ctx.app, http_port, volume);

        let container_id = ctx.services.runtime.create_container(&spec).await?;
        info!(app_id = %ctx.app.id, container_id = %container_id, "Container created");
        ctx.update(AppPatch {
            container_id: Some(Some(container_id)),
            ..Default::default()
        })
        .await
    })
}

/// Delete an image, ignoring images that are gone or still used.
pub(crate) async fn delete_image(ctx: &TaskContext, manifest: &Manifest) -> Result<()> {
    match ctx.services.runtime.delete_image(manifest).await {
        Ok(()) => Ok(()),
        Err(e @ (RuntimeError::InUse(_) | RuntimeError::NotFound(_))) => {
            warn!(app_id = %ctx.app.id, image = %manifest.docker_image, error = %e, "Image not deleted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn create_volume(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.host.create_volume(&ctx.app).await?;
        Ok(())
    })
}

/// Empty the data volume but keep the directory, which may be a mount.
pub fn clear_volume(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.host.delete_volume(&ctx.app, false).await?;
        Ok(())
    })
}

/// Reserve a host port for the container's HTTP port.
///
/// A port already recorded on the app is kept.
pub fn reserve_http_port(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        if let Some(port) = ctx.app.http_port {
            debug!(app_id = %ctx.app.id, port, "Keeping reserved HTTP port");
            return Ok(());
        }
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        ctx.update(AppPatch {
            http_port: Some(Some(port)),
            ..Default::default()
        })
        .await?;
        drop(listener);
        info!(app_id = %ctx.app.id, port, "Reserved HTTP port");
        Ok(())
    })
}

pub fn download_icon(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services.icons.fetch_icon(&ctx.app).await?;
        Ok(())
    })
}

pub fn download_image(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services
            .runtime
            .download_image(&ctx.app.manifest)
            .await?;
        Ok(())
    })
}

/// Provision the declared addons and record the environment they hand out.
pub fn setup_addons(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let addon_config = ctx
            .services
            .addons
            .setup_addons(&ctx.app, &ctx.app.manifest.addons)
            .await?;
        ctx.update(AppPatch {
            addon_config: Some(addon_config),
            ..Default::default()
        })
        .await
    })
}

/// Register the primary hostname, then every alternate hostname.
pub(crate) async fn register_subdomains(ctx: &TaskContext, overwrite: bool) -> Result<()> {
    let dns = ctx.services.dns.as_ref();
    let policy = ctx.policies.dns_register;
    let ip = ctx.platform.public_ip.as_str();

    register_subdomain(dns, policy, &ctx.app.location, &ctx.app.domain, ip, overwrite).await?;
    for alternate in &ctx.app.alternate_domains {
        register_subdomain(
            dns,
            policy,
            &alternate.subdomain,
            &alternate.domain,
            ip,
            overwrite,
        )
        .await?;
    }
    Ok(())
}

/// Remove the A record of a hostname.
pub(crate) async fn unregister(ctx: &TaskContext, location: &str, domain: &str) -> Result<()> {
    unregister_subdomain(
        ctx.services.dns.as_ref(),
        ctx.policies.dns_unregister,
        location,
        domain,
        &ctx.platform.public_ip,
    )
    .await?;
    Ok(())
}

/// Alternate hostnames of `old` that `app` no longer has.
pub(crate) fn removed_alternates(old: &[AlternateDomain], app: &App) -> Vec<AlternateDomain> {
    old.iter()
        .filter(|d| !app.alternate_domains.contains(d))
        .cloned()
        .collect()
}

/// Wait for the primary hostname to resolve to the platform.
pub fn wait_for_dns(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        wait_for_subdomain(
            ctx.services.dns.as_ref(),
            ctx.policies.dns_propagation,
            &ctx.app.location,
            &ctx.app.domain,
            &ctx.platform.public_ip,
        )
        .await?;
        Ok(())
    })
}

/// Wait for every alternate hostname to resolve to the platform.
pub fn wait_for_alternate_dns(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        for alternate in &ctx.app.alternate_domains {
            wait_for_subdomain(
                ctx.services.dns.as_ref(),
                ctx.policies.dns_propagation,
                &alternate.subdomain,
                &alternate.domain,
                &ctx.platform.public_ip,
            )
            .await?;
        }
        Ok(())
    })
}

/// Finish an install or configure, dropping the payloads it consumed.
pub fn mark_installed(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        info!(app_id = %ctx.app.id, "App installed");
        ctx.update(AppPatch {
            installation_state: Some(InstallationState::Installed),
            installation_progress: Some(String::new()),
            health: Some(None),
            old_config: Some(None),
            restore_config: Some(None),
            ..Default::default()
        })
        .await
    })
}

/// Finish an update, dropping the payloads it consumed.
pub fn mark_updated(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        info!(app_id = %ctx.app.id, version = %ctx.app.manifest.version, "App updated");
        ctx.update(AppPatch {
            installation_state: Some(InstallationState::Installed),
            installation_progress: Some(String::new()),
            health: Some(None),
            update_config: Some(None),
            old_config: Some(None),
            update_time: Some(Some(Utc::now())),
            ..Default::default()
        })
        .await
    })
}
