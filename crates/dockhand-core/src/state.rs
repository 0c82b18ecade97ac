// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Installation and run state model.
//!
//! `installation_state` alone decides which pipeline the executor runs next.
//! Requests that move an app into a `pending_*` state are checked against the
//! transition table here and enforced again by the store as a conditional
//! update, so a racing request loses with a conflict instead of overwriting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Installation state of an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationState {
    /// Fresh install requested.
    PendingInstall,
    /// Install from another app's backup requested.
    PendingClone,
    /// Reconfiguration (hostname, ports, access) requested.
    PendingConfigure,
    /// Removal requested.
    PendingUninstall,
    /// Reinstall from backup requested.
    PendingRestore,
    /// Manifest update requested.
    PendingUpdate,
    /// Manifest update without a preceding backup requested.
    PendingForceUpdate,
    /// Backup requested.
    PendingBackup,
    /// Last pipeline failed; waits for an operator to issue a new command.
    Error,
    /// App is installed and idle.
    Installed,
}

impl InstallationState {
    /// All states, in declaration order.
    pub const ALL: [InstallationState; 10] = [
        Self::PendingInstall,
        Self::PendingClone,
        Self::PendingConfigure,
        Self::PendingUninstall,
        Self::PendingRestore,
        Self::PendingUpdate,
        Self::PendingForceUpdate,
        Self::PendingBackup,
        Self::Error,
        Self::Installed,
    ];

    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingInstall => "pending_install",
            Self::PendingClone => "pending_clone",
            Self::PendingConfigure => "pending_configure",
            Self::PendingUninstall => "pending_uninstall",
            Self::PendingRestore => "pending_restore",
            Self::PendingUpdate => "pending_update",
            Self::PendingForceUpdate => "pending_force_update",
            Self::PendingBackup => "pending_backup",
            Self::Error => "error",
            Self::Installed => "installed",
        }
    }

    /// Whether this state requests a pipeline run.
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Error | Self::Installed)
    }
}

impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallationState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::ValidationError {
                field: "installation_state".to_string(),
                message: format!("unknown installation state '{}'", s),
            })
    }
}

/// Run state of the primary container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Container is running.
    Running,
    /// Start requested.
    PendingStart,
    /// Stop requested.
    PendingStop,
    /// Container is stopped.
    Stopped,
}

impl RunState {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::PendingStart => "pending_start",
            Self::PendingStop => "pending_stop",
            Self::Stopped => "stopped",
        }
    }

    /// Whether a start/stop request is outstanding.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingStart | Self::PendingStop)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "pending_start" => Ok(Self::PendingStart),
            "pending_stop" => Ok(Self::PendingStop),
            "stopped" => Ok(Self::Stopped),
            other => Err(CoreError::ValidationError {
                field: "run_state".to_string(),
                message: format!("unknown run state '{}'", other),
            }),
        }
    }
}

/// Health reported by the (external) health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Health check passes.
    Healthy,
    /// Health check fails.
    Unhealthy,
    /// Health check could not be performed.
    Error,
    /// Container is gone.
    Dead,
}

impl Health {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Error => "error",
            Self::Dead => "dead",
        }
    }
}

impl FromStr for Health {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "unhealthy" => Ok(Self::Unhealthy),
            "error" => Ok(Self::Error),
            "dead" => Ok(Self::Dead),
            other => Err(CoreError::ValidationError {
                field: "health".to_string(),
                message: format!("unknown health '{}'", other),
            }),
        }
    }
}

/// Precondition a target state places on the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRule {
    /// Allowed from every state.
    FromAny,
    /// Allowed only from the listed states.
    From(&'static [InstallationState]),
    /// The state is never issued as a command.
    NotIssuable,
}

impl TransitionRule {
    /// Look up the rule for a requested target state.
    pub fn for_target(target: InstallationState) -> Self {
        use InstallationState::*;

        match target {
            PendingUninstall | PendingForceUpdate => Self::FromAny,
            PendingRestore => Self::From(&[Installed, Error, PendingRestore]),
            PendingUpdate | PendingBackup => Self::From(&[Installed]),
            PendingConfigure => Self::From(&[Installed, PendingConfigure, Error]),
            PendingInstall | PendingClone | Installed | Error => Self::NotIssuable,
        }
    }

    /// Whether `current` satisfies this rule.
    pub fn allows(&self, current: InstallationState) -> bool {
        match self {
            Self::FromAny => true,
            Self::From(sources) => sources.contains(&current),
            Self::NotIssuable => false,
        }
    }
}

/// Whether a command may move an app from `current` to `target`.
pub fn can_transition(current: InstallationState, target: InstallationState) -> bool {
    TransitionRule::for_target(target).allows(current)
}
