// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for dockhand-apptask.

use std::net::IpAddr;
use std::path::PathBuf;

/// Which DNS provider registers app hostnames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DnsProviderKind {
    /// Records are managed by the operator; propagation is still awaited.
    #[default]
    Manual,
    /// No DNS at all, not even propagation waits.
    Noop,
}

impl DnsProviderKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(Self::Manual),
            "noop" => Some(Self::Noop),
            _ => None,
        }
    }
}

/// Task executor configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// App record store URL (`sqlite:` or `postgres://`)
    pub database_url: String,
    /// Root for app volumes, backups and cached icons
    pub data_dir: PathBuf,
    /// Address DNS A records point at
    pub public_ip: IpAddr,
    /// Platform version checked against manifest min/max versions
    pub platform_version: String,
    /// Directory holding per-app reverse proxy configs
    pub nginx_dir: PathBuf,
    /// Command run after reverse proxy configs change
    pub nginx_reload: Option<Vec<String>>,
    /// Per-app log directories
    pub log_dir: PathBuf,
    /// Per-app logrotate snippets
    pub logrotate_dir: PathBuf,
    /// Per-app collectd profiles
    pub collectd_dir: PathBuf,
    /// App catalog base URL for icons
    pub catalog_url: String,
    /// Container runtime CLI
    pub docker_bin: String,
    /// Image used by the redis addon
    pub redis_image: String,
    /// DNS provider for app hostnames
    pub dns_provider: DnsProviderKind,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DOCKHAND_DATABASE_URL")
            .ok_or(ConfigError::MissingEnvVar("DOCKHAND_DATABASE_URL"))?;

        let public_ip_raw =
            lookup("DOCKHAND_PUBLIC_IP").ok_or(ConfigError::MissingEnvVar("DOCKHAND_PUBLIC_IP"))?;
        let public_ip = public_ip_raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                name: "DOCKHAND_PUBLIC_IP",
                value: public_ip_raw.clone(),
            })?;

        let data_dir = PathBuf::from(lookup("DOCKHAND_DATA_DIR").unwrap_or_else(|| ".data".into()));

        let dir_or = |name: &str, default: &str| {
            lookup(name)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(default))
        };

        let dns_provider = match lookup("DOCKHAND_DNS_PROVIDER") {
            Some(raw) => DnsProviderKind::parse(&raw).ok_or(ConfigError::InvalidValue {
                name: "DOCKHAND_DNS_PROVIDER",
                value: raw,
            })?,
            None => DnsProviderKind::default(),
        };

        let nginx_reload = lookup("DOCKHAND_NGINX_RELOAD")
            .map(|cmd| {
                cmd.split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|args| !args.is_empty());

        Ok(Self {
            nginx_dir: dir_or("DOCKHAND_NGINX_DIR", "nginx"),
            log_dir: dir_or("DOCKHAND_LOG_DIR", "logs"),
            logrotate_dir: dir_or("DOCKHAND_LOGROTATE_DIR", "logrotate.d"),
            collectd_dir: dir_or("DOCKHAND_COLLECTD_DIR", "collectd"),
            platform_version: lookup("DOCKHAND_PLATFORM_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            catalog_url: lookup("DOCKHAND_CATALOG_URL")
                .unwrap_or_else(|| "https://api.cloudron.io".to_string()),
            docker_bin: lookup("DOCKHAND_DOCKER_BIN").unwrap_or_else(|| "docker".to_string()),
            redis_image: lookup("DOCKHAND_REDIS_IMAGE")
                .unwrap_or_else(|| "redis:7-alpine".to_string()),
            nginx_reload,
            dns_provider,
            database_url,
            public_ip,
            data_dir,
        })
    }

    /// Root of per-app data volumes.
    pub fn apps_data_dir(&self) -> PathBuf {
        self.data_dir.join("apps")
    }

    /// Root of local backups.
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// Cached app icons.
    pub fn icons_dir(&self) -> PathBuf {
        self.data_dir.join("icons")
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {name}: {value}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_derive_from_data_dir() {
        let config = Config::from_lookup(lookup(&[
            ("DOCKHAND_DATABASE_URL", "sqlite::memory:"),
            ("DOCKHAND_PUBLIC_IP", "203.0.113.7"),
            ("DOCKHAND_DATA_DIR", "/srv/dockhand"),
        ]))
        .unwrap();

        assert_eq!(config.public_ip.to_string(), "203.0.113.7");
        assert_eq!(config.nginx_dir, PathBuf::from("/srv/dockhand/nginx"));
        assert_eq!(config.apps_data_dir(), PathBuf::from("/srv/dockhand/apps"));
        assert_eq!(config.docker_bin, "docker");
        assert!(config.nginx_reload.is_none());
        assert_eq!(config.dns_provider, DnsProviderKind::Manual);
    }

    #[test]
    fn test_dns_provider_selection() {
        let config = Config::from_lookup(lookup(&[
            ("DOCKHAND_DATABASE_URL", "sqlite::memory:"),
            ("DOCKHAND_PUBLIC_IP", "203.0.113.7"),
            ("DOCKHAND_DNS_PROVIDER", "noop"),
        ]))
        .unwrap();
        assert_eq!(config.dns_provider, DnsProviderKind::Noop);

        let err = Config::from_lookup(lookup(&[
            ("DOCKHAND_DATABASE_URL", "sqlite::memory:"),
            ("DOCKHAND_PUBLIC_IP", "203.0.113.7"),
            ("DOCKHAND_DNS_PROVIDER", "route53"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "DOCKHAND_DNS_PROVIDER", .. }
        ));
    }

    #[test]
    fn test_missing_database_url() {
        let err = Config::from_lookup(lookup(&[("DOCKHAND_PUBLIC_IP", "203.0.113.7")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar("DOCKHAND_DATABASE_URL")
        ));
    }

    #[test]
    fn test_invalid_public_ip() {
        let err = Config::from_lookup(lookup(&[
            ("DOCKHAND_DATABASE_URL", "sqlite::memory:"),
            ("DOCKHAND_PUBLIC_IP", "not-an-ip"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DOCKHAND_PUBLIC_IP"));
    }

    #[test]
    fn test_reload_command_split() {
        let config = Config::from_lookup(lookup(&[
            ("DOCKHAND_DATABASE_URL", "sqlite::memory:"),
            ("DOCKHAND_PUBLIC_IP", "::1"),
            ("DOCKHAND_NGINX_RELOAD", "systemctl reload nginx"),
        ]))
        .unwrap();
        assert_eq!(
            config.nginx_reload,
            Some(vec![
                "systemctl".to_string(),
                "reload".to_string(),
                "nginx".to_string()
            ])
        );
    }
}
