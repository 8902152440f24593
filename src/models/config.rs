// linkd - Daemon Configuration
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Daemon configuration model.

use serde::{Deserialize, Serialize};

use super::connection::Connection;

/// Platform adapter backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformBackend {
    /// Program interfaces through the `ip` and `iw` tools.
    #[default]
    Command,
    /// Keep link state in memory only (dry run).
    Memory,
}

impl PlatformBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Memory => "memory",
        }
    }
}

/// Platform adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Backend used to program interfaces.
    #[serde(default)]
    pub backend: PlatformBackend,

    /// Path or name of the `ip` binary.
    #[serde(default = "default_ip_binary")]
    pub ip_binary: String,

    /// Path or name of the `iw` binary.
    #[serde(default = "default_iw_binary")]
    pub iw_binary: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            backend: PlatformBackend::default(),
            ip_binary: default_ip_binary(),
            iw_binary: default_iw_binary(),
        }
    }
}

fn default_ip_binary() -> String {
    "ip".to_string()
}

fn default_iw_binary() -> String {
    "iw".to_string()
}

/// OLPC mesh defaults used when completing mesh profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Mesh ID used when a profile leaves it empty.
    #[serde(default = "default_mesh_ssid")]
    pub default_ssid: String,

    /// DHCP anycast address used when a profile leaves it empty.
    #[serde(default = "default_anycast_address")]
    pub dhcp_anycast_address: String,

    /// DHCP timeout for mesh links (shorter than the general default).
    #[serde(default = "default_mesh_dhcp_timeout")]
    pub dhcp_timeout_secs: u32,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            default_ssid: default_mesh_ssid(),
            dhcp_anycast_address: default_anycast_address(),
            dhcp_timeout_secs: default_mesh_dhcp_timeout(),
        }
    }
}

fn default_mesh_ssid() -> String {
    "olpc-mesh".to_string()
}

fn default_anycast_address() -> String {
    "c0:27:c0:27:c0:27".to_string()
}

fn default_mesh_dhcp_timeout() -> u32 {
    20
}

/// Wi-Fi scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    /// Seconds between background scans of an idle or connected device.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u32,

    /// Scan results not seen for this many seconds are dropped.
    #[serde(default = "default_ap_max_age")]
    pub ap_max_age_secs: u32,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            ap_max_age_secs: default_ap_max_age(),
        }
    }
}

fn default_scan_interval() -> u32 {
    120
}

fn default_ap_max_age() -> u32 {
    360
}

/// IP configuration hook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpConfig {
    /// DHCP timeout for devices without their own value.
    #[serde(default = "default_dhcp_timeout")]
    pub dhcp_timeout_secs: u32,
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            dhcp_timeout_secs: default_dhcp_timeout(),
        }
    }
}

fn default_dhcp_timeout() -> u32 {
    45
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interval between interface rescans in seconds.
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u32,

    /// Interfaces the daemon must leave alone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmanaged_interfaces: Vec<String>,

    /// Platform adapter settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// OLPC mesh defaults.
    #[serde(default)]
    pub mesh: MeshConfig,

    /// Wi-Fi scan settings.
    #[serde(default)]
    pub wifi: WifiConfig,

    /// IP configuration hook settings.
    #[serde(default)]
    pub ip: IpConfig,

    /// Connection profiles available for activation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rescan_interval() -> u32 {
    5
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            rescan_interval_secs: default_rescan_interval(),
            unmanaged_interfaces: Vec::new(),
            platform: PlatformConfig::default(),
            mesh: MeshConfig::default(),
            wifi: WifiConfig::default(),
            ip: IpConfig::default(),
            connections: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from TOML file.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, super::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| super::Error::ConfigReadFailed(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file with restrictive permissions (0600).
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), super::Error> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    /// Whether the named interface is excluded from management.
    pub fn is_unmanaged(&self, iface: &str) -> bool {
        self.unmanaged_interfaces.iter().any(|name| name == iface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.rescan_interval_secs, 5);
        assert_eq!(config.mesh.default_ssid, "olpc-mesh");
        assert_eq!(config.mesh.dhcp_timeout_secs, 20);
        assert_eq!(config.ip.dhcp_timeout_secs, 45);
        assert_eq!(config.wifi.scan_interval_secs, 120);
        assert_eq!(config.wifi.ap_max_age_secs, 360);
        assert_eq!(config.platform.backend, PlatformBackend::Command);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("linkd-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("linkd.toml");

        let mut config = DaemonConfig::default();
        config.unmanaged_interfaces.push("eth9".into());
        config.platform.backend = PlatformBackend::Memory;
        config.save_to_file(&path).unwrap();

        let loaded = DaemonConfig::load_from_file(&path).unwrap();
        assert!(loaded.is_unmanaged("eth9"));
        assert_eq!(loaded.platform.backend, PlatformBackend::Memory);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
