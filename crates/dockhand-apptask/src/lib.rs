// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dockhand AppTask - App Lifecycle Task Executor
//!
//! Runs one lifecycle task for one app: it reads the app record, selects a
//! pipeline from the installation state and drives the external
//! collaborators (container runtime, DNS, reverse proxy, addons, backups)
//! until the app reaches `installed`, or records the failure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    dockhand-apptask <app-id>                             │
//! │  ┌──────────────┐   ┌──────────────────────────────────────────────┐    │
//! │  │ TaskExecutor │──►│ Pipelines: install, configure, update,        │    │
//! │  │ (dispatcher) │   │ backup, uninstall, run_state                  │    │
//! │  └──────────────┘   └──────────────────────────────────────────────┘    │
//! │         │                          │ TaskContext                         │
//! └─────────┼──────────────────────────┼─────────────────────────────────────┘
//!           │ get / update (CAS)       │
//!           ▼                          ▼
//! ┌───────────────────┐   ┌────────────────────────────────────────────────┐
//! │  dockhand-core    │   │ ContainerRuntime  DomainProvider  ReverseProxy │
//! │  AppStore         │   │ AddonRegistry     BackupTransport IconFetcher  │
//! └───────────────────┘   │ HostIntegration                                │
//!                         └────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline selection
//!
//! | Installation state | Pipeline |
//! |--------------------|----------|
//! | `pending_install`, `pending_clone`, `pending_restore` | install |
//! | `pending_configure` | configure |
//! | `pending_update`, `pending_force_update` | update |
//! | `pending_backup` | backup |
//! | `pending_uninstall` | uninstall |
//! | `installed` | run state reconciliation |
//! | `error` | none |
//!
//! # Failures
//!
//! A failing pipeline moves the app to `error` with the error message as
//! progress. Backups, and updates whose pre-update backup failed, return to
//! `installed` instead. The binary exits with [`PIPELINE_FAILURE_EXIT_CODE`]
//! in both cases.

#![deny(missing_docs)]

/// Addon provisioners.
pub mod addons;

/// Backup and restore transport.
pub mod backup;

/// Configuration from environment variables.
pub mod config;

/// Per-run task context.
pub mod context;

/// DNS provider and registration rules.
pub mod dns;

/// Error types.
pub mod error;

/// Task dispatcher.
pub mod executor;

/// Host filesystem integration.
pub mod host;

/// App icon cache.
pub mod icons;

/// Generic pipeline driver.
pub mod pipeline;

/// Lifecycle pipelines.
pub mod pipelines;

/// Reverse proxy configuration.
pub mod proxy;

/// Retry budgets and helper.
pub mod retry;

/// Container runtime.
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use context::{Platform, Services, TaskContext};
pub use error::{Error, ErrorKind, Result};
pub use executor::{TaskExecutor, TaskOutcome};
pub use pipelines::TaskKind;
pub use retry::{RetryPolicies, RetryPolicy};

/// Process exit code when a pipeline failed and the failure was recorded.
pub const PIPELINE_FAILURE_EXIT_CODE: i32 = 50;
