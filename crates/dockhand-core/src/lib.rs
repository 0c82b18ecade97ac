// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dockhand Core - App Records and State Machine
//!
//! This crate holds everything that is durable about a managed app: the app
//! aggregate, its manifest, the installation/run state model with its
//! transition table, and the App Record Store with SQLite and PostgreSQL
//! backends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Supervisor / API (external)                          │
//! │           issues pending_* commands, launches one task per app           │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │ set_installation_command (CAS)          │ spawns
//!           ▼                                         ▼
//! ┌───────────────────────┐                ┌─────────────────────────────┐
//! │   dockhand-core       │◄───────────────│     dockhand-apptask        │
//! │   (This Crate)        │  get / update  │  dispatcher + pipelines     │
//! │   AppStore            │                │                             │
//! └───────────────────────┘                └─────────────────────────────┘
//!           │
//!           ▼
//! ┌───────────────────────┐
//! │  SQLite / PostgreSQL  │
//! └───────────────────────┘
//! ```
//!
//! # Installation States
//!
//! | Target state | Accepted from |
//! |--------------|---------------|
//! | `pending_uninstall` | any state |
//! | `pending_force_update` | any state |
//! | `pending_restore` | `installed`, `error`, `pending_restore` |
//! | `pending_update` | `installed` |
//! | `pending_backup` | `installed` |
//! | `pending_configure` | `installed`, `pending_configure`, `error` |
//!
//! `pending_install` and `pending_clone` are set when a record is created;
//! `installed` and `error` are written only by the task executor.
//!
//! The rules live in [`state::can_transition`] and are enforced a second time
//! by the store: [`persistence::AppStore::update`] renders a
//! [`persistence::StateConstraint`] into the `WHERE` clause so two racing
//! commands cannot both win.

#![deny(missing_docs)]

/// App aggregate, manifest and configuration snapshots.
pub mod app;

/// Error types.
pub mod error;

/// Manifest and hostname validation.
pub mod manifest;

/// App Record Store trait and database backends.
pub mod persistence;

/// Installation/run state model and transition table.
pub mod state;

pub use app::App;
pub use error::{CoreError, Result};
pub use persistence::{AppPatch, AppStore, StateConstraint};
pub use state::{Health, InstallationState, RunState, can_transition};
