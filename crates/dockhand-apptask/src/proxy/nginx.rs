// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! nginx site config writer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dockhand_core::app::App;
use minijinja::{Environment, context};
use tracing::{debug, info};

use super::{ProxyError, Result, ReverseProxy};

const SITE_TEMPLATE: &str = r#"# app {{ app_id }}
server {
    listen 80;
    listen [::]:80;
    server_name {{ hostnames | join(" ") }};

    client_max_body_size 0;

    location / {
        proxy_pass http://127.0.0.1:{{ http_port }};
        proxy_http_version 1.1;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection "upgrade";
{%- if health_check_path %}
    }

    location = {{ health_check_path }} {
        proxy_pass http://127.0.0.1:{{ http_port }};
        access_log off;
{%- endif %}
    }
}
"#;

const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Writes one nginx `server` block per app and optionally reloads nginx.
pub struct NginxConfigWriter {
    config_dir: PathBuf,
    reload: Option<Vec<String>>,
}

impl NginxConfigWriter {
    /// Writer for `config_dir`, running `reload` after each change.
    pub fn new(config_dir: impl Into<PathBuf>, reload: Option<Vec<String>>) -> Self {
        Self {
            config_dir: config_dir.into(),
            reload,
        }
    }

    /// Config file path for an app.
    pub fn config_path(&self, app_id: &str) -> PathBuf {
        self.config_dir.join(format!("{}.conf", app_id))
    }

    /// Render the site config for an app.
    pub fn render(app: &App) -> Result<String> {
        let http_port = app
            .http_port
            .ok_or_else(|| ProxyError::MissingHttpPort(app.id.clone()))?;

        let mut hostnames = vec![app.fqdn()];
        hostnames.extend(app.alternate_domains.iter().map(|d| d.fqdn()));

        let env = Environment::new();
        let rendered = env.render_str(
            SITE_TEMPLATE,
            context! {
                app_id => app.id,
                hostnames => hostnames,
                http_port => http_port,
                health_check_path => app.manifest.health_check_path,
            },
        )?;
        Ok(rendered)
    }

    async fn reload(&self) -> Result<()> {
        let Some((program, args)) = self.reload.as_ref().and_then(|c| c.split_first()) else {
            return Ok(());
        };
        let command = self.reload.as_ref().map(|c| c.join(" ")).unwrap_or_default();
        debug!(command = %command, "Reloading reverse proxy");

        let output = tokio::time::timeout(
            RELOAD_TIMEOUT,
            tokio::process::Command::new(program).args(args).output(),
        )
        .await
        .map_err(|_| ProxyError::Reload {
            command: command.clone(),
            stderr: "timed out".to_string(),
        })??;

        if !output.status.success() {
            return Err(ProxyError::Reload {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ReverseProxy for NginxConfigWriter {
    fn proxy_type(&self) -> &'static str {
        "nginx"
    }

    async fn configure(&self, app: &App) -> Result<()> {
        let config = Self::render(app)?;
        let path = self.config_path(&app.id);
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::write(&path, config).await?;
        info!(app_id = %app.id, path = %path.display(), "Reverse proxy configured");
        self.reload().await
    }

    async fn unconfigure(&self, app: &App) -> Result<()> {
        let path = self.config_path(&app.id);
        if remove_if_exists(&path).await? {
            info!(app_id = %app.id, "Reverse proxy unconfigured");
            self.reload().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_core::app::{AlternateDomain, Manifest};
    use tempfile::TempDir;

    fn app() -> App {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "version": "1.0.0",
            "dockerImage": "example/notes:1.0.0",
            "healthCheckPath": "/healthz",
            "httpPort": 3000
        }))
        .unwrap();
        let mut app = App::new("app-1", manifest, "notes", "example.com");
        app.http_port = Some(41234);
        app.alternate_domains = vec![AlternateDomain {
            subdomain: "".into(),
            domain: "notes.example.org".into(),
        }];
        app
    }

    #[test]
    fn test_render_includes_all_hostnames() {
        let config = NginxConfigWriter::render(&app()).unwrap();
        assert!(config.contains("server_name notes.example.com notes.example.org;"));
        assert!(config.contains("proxy_pass http://127.0.0.1:41234;"));
        assert!(config.contains("location = /healthz"));
    }

    #[test]
    fn test_render_requires_http_port() {
        let mut app = app();
        app.http_port = None;
        assert!(matches!(
            NginxConfigWriter::render(&app),
            Err(ProxyError::MissingHttpPort(_))
        ));
    }

    #[tokio::test]
    async fn test_configure_and_unconfigure() {
        let dir = TempDir::new().unwrap();
        let writer = NginxConfigWriter::new(dir.path().join("sites"), None);

        writer.configure(&app()).await.unwrap();
        let path = writer.config_path("app-1");
        assert!(path.exists());

        writer.unconfigure(&app()).await.unwrap();
        assert!(!path.exists());

        // already gone
        writer.unconfigure(&app()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_reload_is_reported() {
        let dir = TempDir::new().unwrap();
        let writer = NginxConfigWriter::new(dir.path(), Some(vec!["false".to_string()]));

        let err = writer.configure(&app()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Reload { .. }));
    }
}
