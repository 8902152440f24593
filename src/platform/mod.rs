// linkd - Platform Adapter
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Low-level interface programming.
//!
//! The device core never touches hardware directly. Every link-level change
//! goes through a [`Platform`] implementation: one call, one result, no
//! retries. Retrying is an orchestration decision.

pub mod command;
pub mod memory;

pub use command::CommandPlatform;
pub use memory::MemoryPlatform;

use crate::models::{AccessPoint, DaemonConfig, PlatformBackend, Result};

/// Operations exposed by a platform adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlatformOp {
    LinkUp,
    LinkDown,
    ApplyIdentity,
    ApplyChannel,
    GetChannel,
    StartIpConfig,
    TriggerScan,
    ScanResults,
}

impl PlatformOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkUp => "set_link_up",
            Self::LinkDown => "set_link_down",
            Self::ApplyIdentity => "apply_identity",
            Self::ApplyChannel => "apply_channel",
            Self::GetChannel => "get_channel",
            Self::StartIpConfig => "start_ip_config",
            Self::TriggerScan => "trigger_scan",
            Self::ScanResults => "scan_results",
        }
    }
}

/// Parameters handed to the IP configuration hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpConfigRequest {
    /// DHCP timeout in seconds.
    pub dhcp_timeout: u32,
    /// DHCP anycast address, if the device uses one.
    pub dhcp_anycast_address: Option<String>,
}

/// Synchronous, idempotent link-level operations on an interface.
pub trait Platform {
    /// Bring the interface up.
    fn set_link_up(&self, iface: &str) -> Result<()>;

    /// Bring the interface down.
    fn set_link_down(&self, iface: &str) -> Result<()>;

    /// Apply the network identity (SSID / mesh ID).
    fn apply_identity(&self, iface: &str, identity: &[u8]) -> Result<()>;

    /// Tune to `channel` and return the previous channel.
    fn apply_channel(&self, iface: &str, channel: u32) -> Result<u32>;

    /// Read the current channel.
    fn get_channel(&self, iface: &str) -> Result<u32>;

    /// Kick off IP configuration. DHCP itself lives outside the daemon core.
    fn start_ip_config(&self, iface: &str, request: &IpConfigRequest) -> Result<()> {
        tracing::debug!(
            "{}: IP configuration requested (timeout {}s, anycast {:?})",
            iface,
            request.dhcp_timeout,
            request.dhcp_anycast_address
        );
        Ok(())
    }

    /// Start a scan. Returns once the driver accepted the request; results
    /// are collected later with [`Platform::scan_results`].
    fn trigger_scan(&self, iface: &str) -> Result<()>;

    /// Access points the driver currently knows about.
    fn scan_results(&self, iface: &str) -> Result<Vec<AccessPoint>>;
}

/// Shared handle to an adapter.
impl<P: Platform + ?Sized> Platform for std::rc::Rc<P> {
    fn set_link_up(&self, iface: &str) -> Result<()> {
        (**self).set_link_up(iface)
    }

    fn set_link_down(&self, iface: &str) -> Result<()> {
        (**self).set_link_down(iface)
    }

    fn apply_identity(&self, iface: &str, identity: &[u8]) -> Result<()> {
        (**self).apply_identity(iface, identity)
    }

    fn apply_channel(&self, iface: &str, channel: u32) -> Result<u32> {
        (**self).apply_channel(iface, channel)
    }

    fn get_channel(&self, iface: &str) -> Result<u32> {
        (**self).get_channel(iface)
    }

    fn start_ip_config(&self, iface: &str, request: &IpConfigRequest) -> Result<()> {
        (**self).start_ip_config(iface, request)
    }

    fn trigger_scan(&self, iface: &str) -> Result<()> {
        (**self).trigger_scan(iface)
    }

    fn scan_results(&self, iface: &str) -> Result<Vec<AccessPoint>> {
        (**self).scan_results(iface)
    }
}

/// Build the platform adapter selected in the configuration.
pub fn from_config(config: &DaemonConfig) -> Box<dyn Platform> {
    match config.platform.backend {
        PlatformBackend::Command => Box::new(CommandPlatform::new(
            &config.platform.ip_binary,
            &config.platform.iw_binary,
        )),
        PlatformBackend::Memory => Box::new(MemoryPlatform::new()),
    }
}
