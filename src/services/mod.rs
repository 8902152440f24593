// linkd - Daemon Services
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Services around the device manager.
//!
//! - Discovery: Finds interfaces in sysfs
//! - Autoconnect: Starts autoconnect profiles on idle devices
//! - Daemon: Keeps the registry in sync and runs the main loop

pub mod autoconnect;
pub mod daemon;
pub mod discovery;

pub use autoconnect::AutoconnectService;
pub use daemon::Daemon;
