// linkd - Access Point Model
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Wi-Fi access point information gathered from scans.
//!
//! Setters return `true` when the stored value actually changed, so the
//! owning device can emit exactly one change notification per update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::{
    Cipher, KeyMgmt, SecurityProto, WirelessBand, WirelessMode, WirelessSetting,
};
use super::validation::parse_hw_address;

/// General access point flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApFlags(u32);

impl ApFlags {
    pub const NONE: Self = Self(0);
    /// The AP requires encryption.
    pub const PRIVACY: Self = Self(0x1);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// WPA / RSN security flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityFlags(u32);

impl SecurityFlags {
    pub const NONE: Self = Self(0);
    pub const PAIR_WEP40: Self = Self(0x1);
    pub const PAIR_WEP104: Self = Self(0x2);
    pub const PAIR_TKIP: Self = Self(0x4);
    pub const PAIR_CCMP: Self = Self(0x8);
    pub const GROUP_WEP40: Self = Self(0x10);
    pub const GROUP_WEP104: Self = Self(0x20);
    pub const GROUP_TKIP: Self = Self(0x40);
    pub const GROUP_CCMP: Self = Self(0x80);
    pub const KEY_MGMT_PSK: Self = Self(0x100);
    pub const KEY_MGMT_802_1X: Self = Self(0x200);

    const PAIR_MASK: u32 = 0xF;
    const GROUP_MASK: u32 = 0xF0;
    const KEY_MGMT_MASK: u32 = 0x300;

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    fn pairwise(cipher: Cipher) -> Self {
        match cipher {
            Cipher::Wep40 => Self::PAIR_WEP40,
            Cipher::Wep104 => Self::PAIR_WEP104,
            Cipher::Tkip => Self::PAIR_TKIP,
            Cipher::Ccmp => Self::PAIR_CCMP,
        }
    }

    fn group(cipher: Cipher) -> Self {
        match cipher {
            Cipher::Wep40 => Self::GROUP_WEP40,
            Cipher::Wep104 => Self::GROUP_WEP104,
            Cipher::Tkip => Self::GROUP_TKIP,
            Cipher::Ccmp => Self::GROUP_CCMP,
        }
    }

    /// Whether two flag sets share a key management method, a pairwise
    /// cipher and a group cipher.
    pub fn overlaps(&self, other: Self) -> bool {
        self.0 & other.0 & Self::KEY_MGMT_MASK != 0
            && self.0 & other.0 & Self::PAIR_MASK != 0
            && self.0 & other.0 & Self::GROUP_MASK != 0
    }
}

/// Operating mode reported for an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApMode {
    #[default]
    Unknown,
    Adhoc,
    Infra,
}

impl From<WirelessMode> for ApMode {
    fn from(mode: WirelessMode) -> Self {
        match mode {
            WirelessMode::Infrastructure => Self::Infra,
            WirelessMode::Adhoc => Self::Adhoc,
        }
    }
}

/// Channel/frequency pairs for the 2.4 GHz and 5 GHz bands.
const CHANNEL_FREQUENCIES: &[(u32, u32)] = &[
    (1, 2412),
    (2, 2417),
    (3, 2422),
    (4, 2427),
    (5, 2432),
    (6, 2437),
    (7, 2442),
    (8, 2447),
    (9, 2452),
    (10, 2457),
    (11, 2462),
    (12, 2467),
    (13, 2472),
    (34, 5170),
    (36, 5180),
    (38, 5190),
    (40, 5200),
    (42, 5210),
    (44, 5220),
    (46, 5230),
    (48, 5240),
    (50, 5250),
    (52, 5260),
    (56, 5280),
    (58, 5290),
    (60, 5300),
    (64, 5320),
    (100, 5500),
    (104, 5520),
    (108, 5540),
    (112, 5560),
    (116, 5580),
    (120, 5600),
    (124, 5620),
    (128, 5640),
    (132, 5660),
    (136, 5680),
    (140, 5700),
    (149, 5745),
    (152, 5760),
    (153, 5765),
    (157, 5785),
    (160, 5800),
    (161, 5805),
    (165, 5825),
];

/// Map a frequency in MHz to its channel number (0 if unknown).
pub fn freq_to_channel(freq: u32) -> u32 {
    CHANNEL_FREQUENCIES
        .iter()
        .find(|(_, f)| *f == freq)
        .map_or(0, |(chan, _)| *chan)
}

/// Map a channel number to its frequency in MHz.
pub fn channel_to_freq(channel: u32) -> Option<u32> {
    CHANNEL_FREQUENCIES
        .iter()
        .find(|(c, _)| *c == channel)
        .map(|(_, freq)| *freq)
}

/// An access point seen in a scan (or synthesized from a profile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AccessPoint {
    /// Registry-assigned identifier (0 until registered by a device).
    #[serde(default)]
    pub id: u64,
    ssid: Option<String>,
    bssid: Option<String>,
    mode: ApMode,
    strength: i8,
    /// Frequency in MHz.
    freq: u32,
    /// Maximum bitrate in kbit/s.
    rate: u32,
    flags: ApFlags,
    wpa_flags: SecurityFlags,
    rsn_flags: SecurityFlags,
    /// Synthesized from a profile rather than seen in a scan.
    #[serde(default)]
    fake: bool,
    /// Broadcasts its SSID.
    #[serde(default = "default_true")]
    broadcast: bool,
    /// Last time the AP was seen in a scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl AccessPoint {
    /// Create an AP from scan data.
    pub fn new(ssid: Option<&str>, bssid: &str, mode: ApMode, freq: u32, strength: i8) -> Self {
        Self {
            ssid: ssid.map(str::to_string),
            bssid: Some(bssid.to_uppercase()),
            mode,
            strength,
            freq,
            broadcast: true,
            last_seen: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Synthesize an AP from a Wi-Fi profile (hidden networks).
    ///
    /// Returns `None` when the profile names a channel outside the known
    /// channel table.
    pub fn new_fake_from_connection(setting: &WirelessSetting) -> Option<Self> {
        if setting.ssid.is_empty() {
            return None;
        }

        let mut ap = Self {
            ssid: Some(setting.ssid.clone()),
            mode: setting.mode.into(),
            fake: true,
            broadcast: !setting.hidden,
            ..Default::default()
        };

        if setting.channel != 0 {
            ap.freq = channel_to_freq(setting.channel)?;
        }

        let Some(sec) = &setting.security else {
            return Some(ap);
        };

        if sec.key_mgmt == KeyMgmt::None {
            // static WEP
            if sec.wep_keys {
                ap.flags.insert(ApFlags::PRIVACY);
            }
            return Some(ap);
        }

        ap.flags.insert(ApFlags::PRIVACY);

        let key_mgmt = match sec.key_mgmt {
            KeyMgmt::WpaPsk | KeyMgmt::WpaNone => Some(SecurityFlags::KEY_MGMT_PSK),
            KeyMgmt::Ieee8021x | KeyMgmt::WpaEap => Some(SecurityFlags::KEY_MGMT_802_1X),
            KeyMgmt::None => None,
        };
        if let Some(key_mgmt) = key_mgmt {
            if sec.has_proto(SecurityProto::Wpa) {
                ap.wpa_flags.insert(key_mgmt);
            }
            if sec.has_proto(SecurityProto::Rsn) {
                ap.rsn_flags.insert(key_mgmt);
            }
        }

        let (wpa, rsn) = (sec.has_proto(SecurityProto::Wpa), sec.has_proto(SecurityProto::Rsn));
        for cipher in &sec.pairwise {
            ap.add_cipher(wpa, rsn, SecurityFlags::pairwise(*cipher));
        }
        for cipher in &sec.group {
            ap.add_cipher(wpa, rsn, SecurityFlags::group(*cipher));
        }

        Some(ap)
    }

    fn add_cipher(&mut self, wpa: bool, rsn: bool, flag: SecurityFlags) {
        if wpa {
            self.wpa_flags.insert(flag);
        }
        if rsn {
            self.rsn_flags.insert(flag);
        }
    }

    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    pub fn set_ssid(&mut self, ssid: Option<&str>) -> bool {
        if self.ssid.as_deref() == ssid {
            return false;
        }
        self.ssid = ssid.map(str::to_string);
        true
    }

    pub fn bssid(&self) -> Option<&str> {
        self.bssid.as_deref()
    }

    pub fn set_bssid(&mut self, bssid: Option<&str>) -> bool {
        let bssid = bssid.map(str::to_uppercase);
        if self.bssid == bssid {
            return false;
        }
        self.bssid = bssid;
        true
    }

    pub fn mode(&self) -> ApMode {
        self.mode
    }

    pub fn strength(&self) -> i8 {
        self.strength
    }

    pub fn set_strength(&mut self, strength: i8) -> bool {
        if self.strength == strength {
            return false;
        }
        self.strength = strength;
        true
    }

    pub fn freq(&self) -> u32 {
        self.freq
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: u32) -> bool {
        if self.rate == rate {
            return false;
        }
        self.rate = rate;
        true
    }

    pub fn flags(&self) -> ApFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: ApFlags) -> bool {
        if self.flags == flags {
            return false;
        }
        self.flags = flags;
        true
    }

    pub fn wpa_flags(&self) -> SecurityFlags {
        self.wpa_flags
    }

    pub fn set_wpa_flags(&mut self, flags: SecurityFlags) -> bool {
        if self.wpa_flags == flags {
            return false;
        }
        self.wpa_flags = flags;
        true
    }

    pub fn rsn_flags(&self) -> SecurityFlags {
        self.rsn_flags
    }

    pub fn set_rsn_flags(&mut self, flags: SecurityFlags) -> bool {
        if self.rsn_flags == flags {
            return false;
        }
        self.rsn_flags = flags;
        true
    }

    pub fn is_fake(&self) -> bool {
        self.fake
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    pub fn set_last_seen(&mut self, when: DateTime<Utc>) {
        self.last_seen = Some(when);
    }

    /// Channel derived from the frequency (0 if unknown).
    pub fn channel(&self) -> u32 {
        freq_to_channel(self.freq)
    }

    /// Whether this AP can serve the given Wi-Fi profile.
    pub fn check_compatible(&self, setting: &WirelessSetting) -> bool {
        if self.ssid.as_deref() != Some(setting.ssid.as_str()) {
            return false;
        }

        if let Some(bssid) = &setting.bssid {
            match (parse_hw_address(bssid), self.bssid.as_deref().and_then(parse_hw_address)) {
                (Some(want), Some(have)) if want == have => {}
                _ => return false,
            }
        }

        if ApMode::from(setting.mode) != self.mode {
            return false;
        }

        match setting.band {
            Some(WirelessBand::A) if !(5170..=5825).contains(&self.freq) => return false,
            Some(WirelessBand::Bg) if !(2412..=2472).contains(&self.freq) => return false,
            _ => {}
        }

        if setting.channel != 0 && setting.channel != self.channel() {
            return false;
        }

        self.security_compatible(setting)
    }

    fn security_compatible(&self, setting: &WirelessSetting) -> bool {
        let privacy = self.flags.contains(ApFlags::PRIVACY);
        let Some(sec) = &setting.security else {
            return !privacy && self.wpa_flags.is_empty() && self.rsn_flags.is_empty();
        };

        let (wpa, rsn) = (sec.has_proto(SecurityProto::Wpa), sec.has_proto(SecurityProto::Rsn));
        match sec.key_mgmt {
            KeyMgmt::None => self.wpa_flags.is_empty() && self.rsn_flags.is_empty(),
            KeyMgmt::WpaNone => privacy && self.mode == ApMode::Adhoc,
            KeyMgmt::WpaPsk => privacy && self.offers_key_mgmt(wpa, rsn, SecurityFlags::KEY_MGMT_PSK),
            KeyMgmt::Ieee8021x | KeyMgmt::WpaEap => {
                privacy && self.offers_key_mgmt(wpa, rsn, SecurityFlags::KEY_MGMT_802_1X)
            }
        }
    }

    fn offers_key_mgmt(&self, wpa: bool, rsn: bool, key_mgmt: SecurityFlags) -> bool {
        (wpa && self.wpa_flags.contains(key_mgmt)) || (rsn && self.rsn_flags.contains(key_mgmt))
    }

    /// Find the entry in `list` that describes the same network as `self`.
    ///
    /// With `strict` the BSSID must always match and WPA/RSN flags must be
    /// identical; otherwise an unknown BSSID on `self` is a wildcard and
    /// overlapping security capabilities are enough.
    pub fn match_in_list(&self, list: &[AccessPoint], strict: bool) -> Option<usize> {
        let find_addr = self.bssid.as_deref().and_then(valid_ethernet_address);

        list.iter().position(|candidate| {
            // Hidden APs match each other and continue on the other properties
            if candidate.ssid != self.ssid {
                return false;
            }

            let list_addr = candidate.bssid.as_deref().and_then(valid_ethernet_address);
            if let Some(list_addr) = &list_addr {
                if (strict || find_addr.is_some()) && find_addr.as_ref() != Some(list_addr) {
                    return false;
                }
            }

            if candidate.mode != self.mode
                || candidate.freq != self.freq
                || candidate.flags != self.flags
            {
                return false;
            }

            if strict {
                candidate.wpa_flags == self.wpa_flags && candidate.rsn_flags == self.rsn_flags
            } else {
                candidate.wpa_flags.overlaps(self.wpa_flags)
                    || candidate.rsn_flags.overlaps(self.rsn_flags)
                    || (candidate.wpa_flags == self.wpa_flags && candidate.rsn_flags == self.rsn_flags)
            }
        })
    }
}

/// Parse an Ethernet address, rejecting all-zero, broadcast and multicast.
fn valid_ethernet_address(s: &str) -> Option<Vec<u8>> {
    let bytes = parse_hw_address(s)?;
    if bytes.len() != 6 {
        return None;
    }
    if bytes.iter().all(|b| *b == 0) || bytes.iter().all(|b| *b == 0xFF) || bytes[0] & 0x01 != 0 {
        return None;
    }
    Some(bytes)
}
