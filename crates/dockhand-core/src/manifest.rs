// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Manifest and hostname validation against platform constraints.

use std::cmp::Ordering;

use thiserror::Error;

use crate::app::Manifest;

/// Host ports the platform keeps for itself.
pub const RESERVED_PORTS: [u16; 16] = [
    22, 25, 53, 80, 143, 202, 443, 465, 587, 993, 2003, 2004, 2020, 3306, 4190, 8000,
];

/// Manifest or hostname validation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ManifestError {
    /// A required field is empty.
    #[error("Manifest is missing {0}")]
    MissingField(&'static str),

    /// The platform is older than the package supports.
    #[error("Package requires platform version {required} or newer, running {running}")]
    PlatformTooOld {
        /// Minimum version declared by the package.
        required: String,
        /// Running platform version.
        running: String,
    },

    /// The platform is newer than the package supports.
    #[error("Package supports platform versions up to {supported}, running {running}")]
    PlatformTooNew {
        /// Maximum version declared by the package.
        supported: String,
        /// Running platform version.
        running: String,
    },

    /// A version string could not be parsed.
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    /// A port collides with a platform service.
    #[error("Port {port} ({name}) is reserved")]
    ReservedPort {
        /// Port name in the manifest.
        name: String,
        /// The port number.
        port: u16,
    },

    /// Hostname is not valid.
    #[error("Invalid hostname '{hostname}': {reason}")]
    InvalidHostname {
        /// The rejected hostname.
        hostname: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Check a manifest against the running platform.
pub fn verify_manifest(manifest: &Manifest, platform_version: &str) -> Result<(), ManifestError> {
    if manifest.docker_image.trim().is_empty() {
        return Err(ManifestError::MissingField("dockerImage"));
    }
    if manifest.version.trim().is_empty() {
        return Err(ManifestError::MissingField("version"));
    }
    if manifest.health_check_path.trim().is_empty() {
        return Err(ManifestError::MissingField("healthCheckPath"));
    }

    if let Some(min) = &manifest.min_box_version
        && compare_versions(platform_version, min)? == Ordering::Less
    {
        return Err(ManifestError::PlatformTooOld {
            required: min.clone(),
            running: platform_version.to_string(),
        });
    }

    if let Some(max) = &manifest.max_box_version
        && compare_versions(platform_version, max)? == Ordering::Greater
    {
        return Err(ManifestError::PlatformTooNew {
            supported: max.clone(),
            running: platform_version.to_string(),
        });
    }

    for (name, port) in manifest.tcp_ports.iter().chain(manifest.udp_ports.iter()) {
        if RESERVED_PORTS.contains(&port.default_value) {
            return Err(ManifestError::ReservedPort {
                name: name.clone(),
                port: port.default_value,
            });
        }
    }

    Ok(())
}

/// Validate `location` + `domain` as a hostname.
pub fn validate_hostname(location: &str, domain: &str) -> Result<(), ManifestError> {
    let hostname = crate::app::fqdn(location, domain);
    let invalid = |reason| ManifestError::InvalidHostname {
        hostname: hostname.clone(),
        reason,
    };

    if hostname.len() > 253 {
        return Err(invalid("hostname exceeds 253 characters"));
    }

    for label in hostname.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > 63 {
            return Err(invalid("label exceeds 63 characters"));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid("only alphanumerics and hyphen are allowed"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("labels cannot start or end with a hyphen"));
        }
    }

    Ok(())
}

/// Compare dotted numeric versions. Missing components count as zero and
/// pre-release suffixes (`-beta.1`) are ignored.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, ManifestError> {
    let parse = |v: &str| -> Result<Vec<u64>, ManifestError> {
        let core = v.split(['-', '+']).next().unwrap_or_default();
        core.split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| ManifestError::InvalidVersion(v.to_string()))
            })
            .collect()
    };

    let (a, b) = (parse(a)?, parse(b)?);
    let len = a.len().max(b.len());
    for i in 0..len {
        let ord = a.get(i).unwrap_or(&0).cmp(b.get(i).unwrap_or(&0));
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}
