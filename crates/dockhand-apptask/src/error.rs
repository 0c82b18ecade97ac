// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for dockhand-apptask.

use dockhand_core::error::CoreError;
use dockhand_core::manifest::ManifestError;
use thiserror::Error;

use crate::addons::AddonError;
use crate::backup::BackupError;
use crate::dns::DomainError;
use crate::host::HostError;
use crate::icons::IconError;
use crate::proxy::ProxyError;
use crate::runtime::RuntimeError;

/// Task executor errors.
///
/// The `Display` form is what ends up in `installation_progress` when a
/// pipeline fails, so messages are written for operators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// App record store operation failed.
    #[error("{0}")]
    Store(#[from] CoreError),

    /// Manifest or hostname failed validation.
    #[error("{0}")]
    Manifest(#[from] ManifestError),

    /// Container runtime call failed.
    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// DNS provider call failed.
    #[error("DNS error: {0}")]
    Domain(#[from] DomainError),

    /// Addon provisioning failed.
    #[error("Addon error: {0}")]
    Addon(#[from] AddonError),

    /// Reverse proxy configuration failed.
    #[error("Reverse proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Backup or restore failed.
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    /// Icon download failed.
    #[error("Icon error: {0}")]
    Icon(#[from] IconError),

    /// Host filesystem integration failed.
    #[error("{0}")]
    Host(#[from] HostError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The app record lacks data the current pipeline needs.
    #[error("Invalid app state: {0}")]
    InvalidState(String),
}

/// Result type using the task executor Error.
pub type Result<T> = std::result::Result<T, Error>;

/// How an error is handled by the pipeline driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad manifest or configuration; never retried.
    Validation,
    /// Ownership or state conflict; needs operator intervention.
    Conflict,
    /// Provider timeout, busy response or network error; retried by a retry step.
    Transient,
    /// Anything else; aborts the pipeline.
    Fatal,
}

impl Error {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Manifest(_) | Self::Config(_) => ErrorKind::Validation,
            Self::Addon(AddonError::UnknownAddon(_)) => ErrorKind::Validation,
            Self::Store(e) if e.is_conflict() => ErrorKind::Conflict,
            Self::Domain(DomainError::AlreadyExists(_)) => ErrorKind::Conflict,
            Self::Domain(e) if e.is_retryable() => ErrorKind::Transient,
            Self::Runtime(e) if e.is_transient() => ErrorKind::Transient,
            Self::Addon(e) if e.is_transient() => ErrorKind::Transient,
            Self::Icon(e) if e.is_transient() => ErrorKind::Transient,
            _ => ErrorKind::Fatal,
        }
    }

    /// Whether a retry step should try again.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
