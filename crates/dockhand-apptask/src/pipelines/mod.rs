// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle pipelines and pipeline selection.

pub mod backup;
mod common;
pub mod configure;
pub mod install;
pub mod run_state;
pub mod uninstall;
pub mod update;

use std::fmt;

use dockhand_core::state::InstallationState;

use crate::context::TaskContext;
use crate::error::Result;

/// Pipeline selected for an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Install, clone or restore.
    Install,
    /// Reconfigure hostnames, ports or access.
    Configure,
    /// Move to a new manifest.
    Update,
    /// Back up.
    Backup,
    /// Remove.
    Uninstall,
    /// Bring the container in line with the run state.
    RunState,
}

impl TaskKind {
    /// Pipeline for an installation state, `None` for `error`.
    pub fn for_state(state: InstallationState) -> Option<Self> {
        match state {
            InstallationState::PendingUninstall => Some(Self::Uninstall),
            InstallationState::PendingConfigure => Some(Self::Configure),
            InstallationState::PendingUpdate | InstallationState::PendingForceUpdate => {
                Some(Self::Update)
            }
            InstallationState::PendingInstall
            | InstallationState::PendingClone
            | InstallationState::PendingRestore => Some(Self::Install),
            InstallationState::PendingBackup => Some(Self::Backup),
            InstallationState::Installed => Some(Self::RunState),
            InstallationState::Error => None,
        }
    }

    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Configure => "configure",
            Self::Update => "update",
            Self::Backup => "backup",
            Self::Uninstall => "uninstall",
            Self::RunState => "run_state",
        }
    }

    /// Run the pipeline.
    pub async fn run(self, ctx: &mut TaskContext) -> Result<()> {
        match self {
            Self::Install => install::run(ctx).await,
            Self::Configure => configure::run(ctx).await,
            Self::Update => update::run(ctx).await,
            Self::Backup => backup::run(ctx).await,
            Self::Uninstall => uninstall::run(ctx).await,
            Self::RunState => run_state::run(ctx).await,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table() {
        use InstallationState::*;
        let expected = [
            (PendingInstall, Some(TaskKind::Install)),
            (PendingClone, Some(TaskKind::Install)),
            (PendingRestore, Some(TaskKind::Install)),
            (PendingConfigure, Some(TaskKind::Configure)),
            (PendingUpdate, Some(TaskKind::Update)),
            (PendingForceUpdate, Some(TaskKind::Update)),
            (PendingBackup, Some(TaskKind::Backup)),
            (PendingUninstall, Some(TaskKind::Uninstall)),
            (Installed, Some(TaskKind::RunState)),
            (Error, None),
        ];
        assert_eq!(expected.len(), InstallationState::ALL.len());
        for (state, kind) in expected {
            assert_eq!(TaskKind::for_state(state), kind, "{}", state);
        }
    }
}
