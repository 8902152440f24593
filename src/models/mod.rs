// linkd - Shared Models
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # linkd Models
//!
//! Plain data shared by the device core, the platform adapter and the
//! daemon services:
//!
//! - **State**: Device lifecycle states, transition reasons, capabilities
//! - **Connection**: Connection profiles and their typed settings
//! - **AccessPoint**: Scan results seen by Wi-Fi devices
//! - **Config**: Daemon configuration file
//! - **Error**: Shared error types

pub mod access_point;
pub mod config;
pub mod connection;
pub mod error;
pub mod state;
pub mod validation;

pub use access_point::{AccessPoint, ApMode};
pub use config::{DaemonConfig, PlatformBackend};
pub use connection::{Connection, ConnectionSettings, OlpcMeshSetting, WirelessSetting};
pub use error::{Error, Result};
pub use state::{DeviceCapabilities, DeviceState, DeviceType, StateReason};


/// Object path prefix under which devices are exported.
pub const DEVICE_PATH_PREFIX: &str = "/com/chrisdaggas/Linkd/Devices";

/// Object path prefix under which access points are exported.
pub const ACCESS_POINT_PATH_PREFIX: &str = "/com/chrisdaggas/Linkd/AccessPoint";

/// Configuration directory name (under XDG_CONFIG_HOME).
pub const CONFIG_DIR_NAME: &str = "linkd";

/// Configuration file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "linkd.toml";
