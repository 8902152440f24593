// linkd - Error Types
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Shared error types for the link daemon.
//!
//! Activation failures are not errors: they travel through device state
//! transitions and [`StateReason`](super::StateReason) codes. The variants here
//! cover platform calls, registry lookups, contract violations and the
//! configuration layer.

use thiserror::Error;

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for daemon operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================
    // Platform Errors
    // ========================================
    #[error("Platform call {operation} failed on {interface}: {reason}")]
    PlatformFailure {
        operation: String,
        interface: String,
        reason: String,
    },

    // ========================================
    // Registry Errors
    // ========================================
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ========================================
    // Validation Errors
    // ========================================
    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(String),

    #[error("Invalid interface name: {0}")]
    InvalidInterfaceName(String),

    #[error("Invalid SSID: {0}")]
    InvalidSsid(String),

    // ========================================
    // D-Bus Errors
    // ========================================
    #[error("Invalid D-Bus object path: {0}")]
    ObjectPath(String),

    // ========================================
    // Configuration Errors
    // ========================================
    #[error("Failed to read configuration: {0}")]
    ConfigReadFailed(String),

    #[error("Failed to write configuration: {0}")]
    ConfigWriteFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParseFailed(String),

    // ========================================
    // System Errors
    // ========================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new platform failure error.
    pub fn platform(
        operation: impl Into<String>,
        interface: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PlatformFailure {
            operation: operation.into(),
            interface: interface.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error came from the platform adapter.
    pub fn is_platform_failure(&self) -> bool {
        matches!(self, Self::PlatformFailure { .. })
    }
}

// Convert from object path errors
impl From<zbus::zvariant::Error> for Error {
    fn from(err: zbus::zvariant::Error) -> Self {
        Error::ObjectPath(err.to_string())
    }
}

// Convert from toml parse errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}

// Convert from toml serialize errors
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::ConfigWriteFailed(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}
