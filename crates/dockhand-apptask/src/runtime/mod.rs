// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime abstraction.
//!
//! - `traits`: the `ContainerRuntime` contract and container specs
//! - `docker`: implementation driving the docker CLI
//! - `mock`: in-memory implementation for tests

pub mod docker;
pub mod mock;
pub mod traits;

pub use docker::DockerCliRuntime;
pub use mock::{MockContainer, MockContainerRuntime};
pub use traits::*;
