// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Update pipeline: move an app to a new manifest.
//!
//! The backup and the image download happen while the old version keeps
//! running. Nothing destructive happens before the cleanup marker, so a
//! failed backup leaves the app as it was.

use std::collections::BTreeMap;

use dockhand_core::app::{App, Manifest, PortBinding};
use dockhand_core::persistence::AppPatch;
use dockhand_core::state::InstallationState;
use tracing::{info, warn};

use super::common::*;
use crate::addons::removed_addons;
use crate::context::TaskContext;
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, StepFuture};

/// Whether the update skips the backup.
pub fn is_forced(app: &App) -> bool {
    app.installation_state == InstallationState::PendingForceUpdate
        || app.update_config.as_ref().is_some_and(|u| u.force)
}

fn target_manifest(app: &App) -> Result<&Manifest> {
    app.update_config
        .as_ref()
        .map(|u| &u.manifest)
        .ok_or_else(|| Error::InvalidState(format!("App {} has no pending update", app.id)))
}

/// Port bindings of `app` that `manifest` still exposes.
pub fn retained_port_bindings(app: &App, manifest: &Manifest) -> BTreeMap<String, PortBinding> {
    app.port_bindings
        .iter()
        .filter(|(name, binding)| manifest.exposed_port(name, binding.protocol).is_some())
        .map(|(name, binding)| (name.clone(), *binding))
        .collect()
}

/// Build the update pipeline for `ctx`.
pub fn pipeline(ctx: &TaskContext) -> Pipeline<TaskContext> {
    let policies = ctx.policies;

    Pipeline::new("update")
        .progress(0, "Verify manifest")
        .step("verify_new_manifest", verify_new_manifest)
        .when(!is_forced(&ctx.app), |p| {
            p.progress(15, "Backing up app")
                .step("backup_app", backup_app)
        })
        .progress(25, "Downloading image")
        .retry(
            "download_new_image",
            download_new_image,
            policies.image_download,
        )
        .progress(35, "Cleaning up old install")
        .step("remove_collectd", remove_collectd)
        .step("remove_logrotate", remove_logrotate)
        .step("stop_app", stop_app)
        .step("delete_container", delete_container)
        .step("delete_replaced_image", delete_replaced_image)
        .step("teardown_unused_addons", teardown_unused_addons)
        .step("switch_config", switch_config)
        .progress(45, "Downloading icon")
        .retry("download_icon", download_icon, policies.icon_download)
        .progress(70, "Updating addons")
        .step("setup_addons", setup_addons)
        .progress(80, "Creating container")
        .step("create_container", create_container)
        .progress(85, "Setting up logrotate config")
        .step("add_logrotate", add_logrotate)
        .progress(90, "Setting up collectd profile")
        .step("add_collectd", add_collectd)
        .step("run_app", run_app)
        .step("mark_updated", mark_updated)
}

/// Run the update pipeline.
pub async fn run(ctx: &mut TaskContext) -> Result<()> {
    let version = target_manifest(&ctx.app)?.version.clone();
    info!(
        app_id = %ctx.app.id,
        from = %ctx.app.manifest.version,
        to = %version,
        force = is_forced(&ctx.app),
        "Updating app"
    );
    pipeline(ctx).run(ctx).await
}

fn verify_new_manifest(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move { check(ctx, target_manifest(&ctx.app)?) })
}

fn backup_app(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let backup_id = ctx.services.backups.backup_app(&ctx.app).await?;
        info!(app_id = %ctx.app.id, backup_id = %backup_id, "Pre-update backup created");
        Ok(())
    })
}

fn download_new_image(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let manifest = target_manifest(&ctx.app)?;
        ctx.services.runtime.download_image(manifest).await?;
        Ok(())
    })
}

fn delete_replaced_image(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let target = target_manifest(&ctx.app)?;
        if target.docker_image == ctx.app.manifest.docker_image {
            return Ok(());
        }
        delete_image(ctx, &ctx.app.manifest).await
    })
}

fn teardown_unused_addons(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let target = target_manifest(&ctx.app)?;
        let unused = removed_addons(&ctx.app.manifest.addons, &target.addons);
        if unused.is_empty() {
            return Ok(());
        }
        ctx.services
            .addons
            .teardown_addons(&ctx.app, &unused)
            .await?;
        Ok(())
    })
}

/// Switch the record to the new manifest in a single write.
fn switch_config(ctx: &mut TaskContext) -> StepFuture<'_> {
    Box::pin(async move {
        let target = target_manifest(&ctx.app)?.clone();
        let port_bindings = retained_port_bindings(&ctx.app, &target);
        for name in ctx.app.port_bindings.keys() {
            if !port_bindings.contains_key(name) {
                warn!(app_id = %ctx.app.id, port = %name, "Releasing port binding");
            }
        }

        let patch = AppPatch {
            old_config: Some(Some(ctx.app.snapshot())),
            manifest: Some(target),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };
        ctx.update(patch).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_core::app::{Protocol, UpdateConfig};

    fn manifest(value: serde_json::Value) -> Manifest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_force_update_skips_backup() {
        let mut ctx = crate::test_support::context().await;
        ctx.app.update_config = Some(UpdateConfig {
            manifest: ctx.app.manifest.clone(),
            force: false,
        });
        let names = |p: &Pipeline<TaskContext>| {
            p.steps().iter().map(|s| s.name().to_string()).collect::<Vec<_>>()
        };
        assert!(names(&pipeline(&ctx)).contains(&"backup_app".to_string()));

        ctx.app.installation_state = InstallationState::PendingForceUpdate;
        assert!(!names(&pipeline(&ctx)).contains(&"backup_app".to_string()));
    }

    #[tokio::test]
    async fn test_retained_port_bindings() {
        let mut ctx = crate::test_support::context().await;
        ctx.app.port_bindings = BTreeMap::from([
            (
                "SSH_PORT".to_string(),
                PortBinding {
                    host_port: 2222,
                    protocol: Protocol::Tcp,
                },
            ),
            (
                "DNS_PORT".to_string(),
                PortBinding {
                    host_port: 5353,
                    protocol: Protocol::Udp,
                },
            ),
        ]);
        let target = manifest(serde_json::json!({
            "version": "2.0.0",
            "dockerImage": "example/notes:2.0.0",
            "healthCheckPath": "/",
            "httpPort": 3000,
            "tcpPorts": { "SSH_PORT": { "defaultValue": 22 } }
        }));

        let retained = retained_port_bindings(&ctx.app, &target);
        assert_eq!(retained.keys().collect::<Vec<_>>(), vec!["SSH_PORT"]);
    }
}
