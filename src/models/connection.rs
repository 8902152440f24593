// linkd - Connection Profiles
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Connection profiles handed to devices on activation.
//!
//! Profiles are stored in the daemon configuration file; the activation core
//! only reads them. Each profile carries exactly one typed setting block that
//! decides which device kinds can activate it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Setting name for wired connections.
pub const SETTING_WIRED: &str = "802-3-ethernet";

/// Setting name for Wi-Fi connections.
pub const SETTING_WIRELESS: &str = "802-11-wireless";

/// Setting name for OLPC mesh connections.
pub const SETTING_OLPC_MESH: &str = "802-11-olpc-mesh";

/// Wi-Fi operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WirelessMode {
    #[default]
    Infrastructure,
    Adhoc,
}

/// Wi-Fi frequency band restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WirelessBand {
    /// 5 GHz.
    A,
    /// 2.4 GHz.
    Bg,
}

/// Key management scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyMgmt {
    /// Static WEP or open.
    None,
    /// WPA ad-hoc.
    WpaNone,
    WpaPsk,
    Ieee8021x,
    WpaEap,
}

/// Security protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProto {
    Wpa,
    Rsn,
}

/// Cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cipher {
    Wep40,
    Wep104,
    Tkip,
    Ccmp,
}

/// Wi-Fi security settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirelessSecurity {
    /// Key management scheme.
    pub key_mgmt: KeyMgmt,
    /// Allowed protocols (empty = all).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protos: Vec<SecurityProto>,
    /// Allowed pairwise ciphers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pairwise: Vec<Cipher>,
    /// Allowed group ciphers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<Cipher>,
    /// Whether any static WEP key is configured.
    #[serde(default)]
    pub wep_keys: bool,
}

impl WirelessSecurity {
    /// Whether the given protocol is allowed by this setting.
    pub fn has_proto(&self, proto: SecurityProto) -> bool {
        self.protos.is_empty() || self.protos.contains(&proto)
    }
}

/// Wi-Fi setting block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirelessSetting {
    /// Network name.
    pub ssid: String,
    /// Operating mode.
    #[serde(default)]
    pub mode: WirelessMode,
    /// Band restriction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<WirelessBand>,
    /// Channel restriction (0 = any).
    #[serde(default)]
    pub channel: u32,
    /// BSSID restriction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
    /// The network does not broadcast its SSID.
    #[serde(default)]
    pub hidden: bool,
    /// Security settings (None = open network).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<WirelessSecurity>,
}

impl WirelessSetting {
    /// Create an open infrastructure setting for an SSID.
    pub fn open(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            mode: WirelessMode::Infrastructure,
            band: None,
            channel: 0,
            bssid: None,
            hidden: false,
            security: None,
        }
    }
}

/// OLPC mesh setting block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OlpcMeshSetting {
    /// Mesh ID; filled with the configured default on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    /// Mesh channel (0 = keep the current channel).
    #[serde(default)]
    pub channel: u32,
    /// DHCP anycast address; filled with the configured default on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp_anycast_address: Option<String>,
}

/// Typed settings of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConnectionSettings {
    Wired,
    Wireless(WirelessSetting),
    OlpcMesh(OlpcMeshSetting),
}

impl ConnectionSettings {
    /// Setting name used for compatibility checks.
    pub fn setting_name(&self) -> &'static str {
        match self {
            Self::Wired => SETTING_WIRED,
            Self::Wireless(_) => SETTING_WIRELESS,
            Self::OlpcMesh(_) => SETTING_OLPC_MESH,
        }
    }
}

/// A connection profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique profile identifier.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Profile name (user-visible).
    pub name: String,
    /// May be activated without user request.
    #[serde(default = "default_true")]
    pub autoconnect: bool,
    /// Restrict the profile to one interface.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    /// Typed settings.
    pub settings: ConnectionSettings,
}

fn default_true() -> bool {
    true
}

impl Connection {
    pub fn new(name: impl Into<String>, settings: ConnectionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            autoconnect: true,
            interface_name: None,
            settings,
        }
    }

    pub fn wired(name: impl Into<String>) -> Self {
        Self::new(name, ConnectionSettings::Wired)
    }

    pub fn wireless(name: impl Into<String>, setting: WirelessSetting) -> Self {
        Self::new(name, ConnectionSettings::Wireless(setting))
    }

    pub fn olpc_mesh(name: impl Into<String>, setting: OlpcMeshSetting) -> Self {
        Self::new(name, ConnectionSettings::OlpcMesh(setting))
    }

    pub fn setting_name(&self) -> &'static str {
        self.settings.setting_name()
    }

    pub fn wireless_setting(&self) -> Option<&WirelessSetting> {
        match &self.settings {
            ConnectionSettings::Wireless(s) => Some(s),
            _ => None,
        }
    }

    pub fn olpc_mesh_setting(&self) -> Option<&OlpcMeshSetting> {
        match &self.settings {
            ConnectionSettings::OlpcMesh(s) => Some(s),
            _ => None,
        }
    }

    pub fn olpc_mesh_setting_mut(&mut self) -> Option<&mut OlpcMeshSetting> {
        match &mut self.settings {
            ConnectionSettings::OlpcMesh(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the profile may be used on the named interface.
    pub fn matches_interface(&self, iface: &str) -> bool {
        self.interface_name.as_deref().map_or(true, |name| name == iface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_toml() {
        let toml_src = r#"
            name = "School mesh"
            interface_name = "msh0"

            [settings]
            type = "olpc-mesh"
            channel = 6
        "#;
        let conn: Connection = toml::from_str(toml_src).unwrap();
        assert_eq!(conn.setting_name(), SETTING_OLPC_MESH);
        assert!(conn.autoconnect);
        assert!(conn.matches_interface("msh0"));
        assert!(!conn.matches_interface("msh1"));
        let mesh = conn.olpc_mesh_setting().unwrap();
        assert_eq!(mesh.channel, 6);
        assert!(mesh.ssid.is_none());
    }

    #[test]
    fn test_wireless_security_proto() {
        let sec = WirelessSecurity {
            key_mgmt: KeyMgmt::WpaPsk,
            protos: vec![SecurityProto::Rsn],
            pairwise: Vec::new(),
            group: Vec::new(),
            wep_keys: false,
        };
        assert!(sec.has_proto(SecurityProto::Rsn));
        assert!(!sec.has_proto(SecurityProto::Wpa));
    }
}
