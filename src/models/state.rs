// linkd - Device State Model
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Device lifecycle states, transition reasons and capability flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a device.
///
/// The declaration order is the progress order: comparisons such as
/// `state >= DeviceState::Prepare` are meaningful and used throughout the
/// activation and companion logic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Not yet initialised by the registry.
    #[default]
    Unknown,
    /// Known but not managed.
    Unmanaged,
    /// Managed, but cannot be activated (no carrier, no companion, ...).
    Unavailable,
    /// Available and idle.
    Disconnected,
    /// Activation stage 1.
    Prepare,
    /// Activation stage 2.
    Config,
    /// Activation stage 3.
    IpConfig,
    /// Fully activated.
    Activated,
    /// Activation failed; always followed by `Disconnected`.
    Failed,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unmanaged => "unmanaged",
            Self::Unavailable => "unavailable",
            Self::Disconnected => "disconnected",
            Self::Prepare => "prepare",
            Self::Config => "config",
            Self::IpConfig => "ip-config",
            Self::Activated => "activated",
            Self::Failed => "failed",
        }
    }

    /// Whether the device is somewhere between `Prepare` and `Activated`.
    pub fn is_active(&self) -> bool {
        (Self::Prepare..=Self::Activated).contains(self)
    }

    /// Whether an activation is still running (not yet `Activated`).
    pub fn is_activating(&self) -> bool {
        (Self::Prepare..=Self::IpConfig).contains(self)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateReason {
    #[default]
    None,
    Unknown,
    /// The device just entered the registry.
    NowManaged,
    /// Deactivation requested by a user or by a peer's policy.
    UserRequested,
    /// A new activation replaced the current one.
    NewActivation,
    /// The connection profile does not fit this device.
    ConnectionIncompatible,
    /// Link-level configuration failed.
    ConfigFailed,
    /// IP configuration could not be started.
    IpConfigUnavailable,
    /// No usable network with the requested SSID.
    SsidNotFound,
    /// Carrier went away.
    Carrier,
    /// The paired companion device is missing.
    CompanionUnavailable,
    /// The device was removed from the registry.
    Removed,
    /// A programming contract was violated; the device was put in a safe state.
    InternalError,
}

impl StateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Unknown => "unknown",
            Self::NowManaged => "now-managed",
            Self::UserRequested => "user-requested",
            Self::NewActivation => "new-activation",
            Self::ConnectionIncompatible => "connection-incompatible",
            Self::ConfigFailed => "config-failed",
            Self::IpConfigUnavailable => "ip-config-unavailable",
            Self::SsidNotFound => "ssid-not-found",
            Self::Carrier => "carrier",
            Self::CompanionUnavailable => "companion-unavailable",
            Self::Removed => "removed",
            Self::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for StateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Ethernet,
    Wifi,
    OlpcMesh,
}

impl DeviceType {
    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Ethernet => "Ethernet",
            Self::Wifi => "802.11 Wi-Fi",
            Self::OlpcMesh => "802.11 OLPC Mesh",
        }
    }
}

/// Capability flags of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceCapabilities(u32);

impl DeviceCapabilities {
    pub const NONE: Self = Self(0);
    /// The daemon can manage this device.
    pub const SUPPORTED: Self = Self(0x1);
    /// The device reports carrier changes.
    pub const CARRIER_DETECT: Self = Self(0x2);
    /// The device is a software interface.
    pub const SOFTWARE: Self = Self(0x4);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DeviceCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
