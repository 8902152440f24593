// linkd - Command Platform
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Platform adapter that shells out to `ip` and `iw`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Command;
use tracing::debug;

use super::{Platform, PlatformOp};
use crate::models::access_point::{ApFlags, SecurityFlags};
use crate::models::validation::{validate_interface_name, validate_ssid};
use crate::models::{AccessPoint, ApMode, Error, Result};

/// Matches the channel line of `iw dev <iface> info`.
static CHANNEL_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?m)^\s*channel (\d+)").ok());

/// Matches the header line of one BSS in `iw dev <iface> scan dump`.
static BSS_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^BSS ((?:[0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2})").ok());

/// Platform adapter backed by the iproute2 and iw command line tools.
#[derive(Debug, Clone)]
pub struct CommandPlatform {
    ip_binary: String,
    iw_binary: String,
}

impl CommandPlatform {
    pub fn new(ip_binary: &str, iw_binary: &str) -> Self {
        Self {
            ip_binary: ip_binary.to_string(),
            iw_binary: iw_binary.to_string(),
        }
    }

    /// Run a command and return its stdout, mapping any failure to a platform error.
    fn run(&self, op: PlatformOp, iface: &str, program: &str, args: &[&str]) -> Result<String> {
        validate_interface_name(iface)?;
        debug!("{}: {} {}", iface, program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::platform(op.as_str(), iface, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::platform(
                op.as_str(),
                iface,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn set_link(&self, op: PlatformOp, iface: &str, state: &str) -> Result<()> {
        self.run(op, iface, &self.ip_binary, &["link", "set", "dev", iface, state])
            .map(|_| ())
    }
}

impl Default for CommandPlatform {
    fn default() -> Self {
        Self::new("ip", "iw")
    }
}

/// Extract the channel number from `iw dev <iface> info` output.
pub(crate) fn parse_iw_channel(info: &str) -> Option<u32> {
    let re = CHANNEL_RE.as_ref()?;
    re.captures(info)?.get(1)?.as_str().parse().ok()
}

/// Security element being read in a scan dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecurityElement {
    Wpa,
    Rsn,
}

/// One BSS of a scan dump while it is being read.
#[derive(Debug, Default)]
struct BssEntry {
    bssid: String,
    ssid: Option<String>,
    freq: u32,
    signal_dbm: Option<f32>,
    adhoc: bool,
    privacy: bool,
    wpa: SecurityFlags,
    rsn: SecurityFlags,
}

impl BssEntry {
    /// Signal in percent, the way scan lists present it.
    fn strength(&self) -> i8 {
        let dbm = self.signal_dbm.unwrap_or(-100.0);
        (2.0 * (dbm + 100.0)).clamp(0.0, 100.0) as i8
    }

    fn into_access_point(self) -> AccessPoint {
        let mode = if self.adhoc { ApMode::Adhoc } else { ApMode::Infra };
        let mut ap = AccessPoint::new(self.ssid.as_deref(), &self.bssid, mode, self.freq, self.strength());
        if self.privacy {
            ap.set_flags(ApFlags::PRIVACY);
        }
        ap.set_wpa_flags(self.wpa);
        ap.set_rsn_flags(self.rsn);
        ap
    }
}

/// Flags named by a cipher or key management line of a security element.
fn security_flags(key: &str, value: &str) -> SecurityFlags {
    let mut flags = SecurityFlags::NONE;
    let group = key.starts_with("Group cipher");
    for token in value.split_whitespace() {
        let flag = match (token, group) {
            ("WEP-40", false) => SecurityFlags::PAIR_WEP40,
            ("WEP-104", false) => SecurityFlags::PAIR_WEP104,
            ("TKIP", false) => SecurityFlags::PAIR_TKIP,
            ("CCMP", false) => SecurityFlags::PAIR_CCMP,
            ("WEP-40", true) => SecurityFlags::GROUP_WEP40,
            ("WEP-104", true) => SecurityFlags::GROUP_WEP104,
            ("TKIP", true) => SecurityFlags::GROUP_TKIP,
            ("CCMP", true) => SecurityFlags::GROUP_CCMP,
            ("PSK", _) => SecurityFlags::KEY_MGMT_PSK,
            ("802.1X", _) => SecurityFlags::KEY_MGMT_802_1X,
            _ => continue,
        };
        flags.insert(flag);
    }
    flags
}

/// Extract access points from `iw dev <iface> scan dump` output.
pub(crate) fn parse_iw_scan(dump: &str) -> Vec<AccessPoint> {
    let Some(bss_re) = BSS_RE.as_ref() else {
        return Vec::new();
    };
    let mut found = Vec::new();
    let mut current: Option<BssEntry> = None;
    let mut element: Option<SecurityElement> = None;

    for line in dump.lines() {
        if let Some(caps) = bss_re.captures(line) {
            found.extend(current.take().map(BssEntry::into_access_point));
            current = Some(BssEntry {
                bssid: caps[1].to_string(),
                ..Default::default()
            });
            element = None;
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };

        let line = line.trim();
        if let Some(rest) = line.strip_prefix("WPA:") {
            element = Some(SecurityElement::Wpa);
            if rest.trim().is_empty() {
                continue;
            }
        } else if let Some(rest) = line.strip_prefix("RSN:") {
            element = Some(SecurityElement::Rsn);
            if rest.trim().is_empty() {
                continue;
            }
        } else if !line.starts_with('*') {
            element = None;
        }

        let item = line.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
        let Some((key, value)) = item.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match (element, key) {
            (Some(which), _) => {
                let flags = security_flags(key, value);
                match which {
                    SecurityElement::Wpa => entry.wpa.insert(flags),
                    SecurityElement::Rsn => entry.rsn.insert(flags),
                }
            }
            (None, "SSID") => {
                entry.ssid = Some(value.to_string()).filter(|ssid| !ssid.is_empty());
            }
            (None, "freq") => {
                entry.freq = value.parse::<f32>().map_or(0, |freq| freq as u32);
            }
            (None, "signal") => {
                entry.signal_dbm = value.split_whitespace().next().and_then(|v| v.parse().ok());
            }
            (None, "capability") => {
                entry.adhoc = value.split_whitespace().any(|cap| cap == "IBSS");
                entry.privacy = value.split_whitespace().any(|cap| cap == "Privacy");
            }
            _ => {}
        }
    }

    found.extend(current.map(BssEntry::into_access_point));
    found
}

impl Platform for CommandPlatform {
    fn set_link_up(&self, iface: &str) -> Result<()> {
        self.set_link(PlatformOp::LinkUp, iface, "up")
    }

    fn set_link_down(&self, iface: &str) -> Result<()> {
        self.set_link(PlatformOp::LinkDown, iface, "down")
    }

    fn apply_identity(&self, iface: &str, identity: &[u8]) -> Result<()> {
        validate_ssid(identity)?;
        let id = std::str::from_utf8(identity).map_err(|_| {
            Error::platform(
                PlatformOp::ApplyIdentity.as_str(),
                iface,
                "identity is not valid UTF-8",
            )
        })?;
        self.run(
            PlatformOp::ApplyIdentity,
            iface,
            &self.iw_binary,
            &["dev", iface, "set", "meshid", id],
        )
        .map(|_| ())
    }

    fn apply_channel(&self, iface: &str, channel: u32) -> Result<u32> {
        let old = self.get_channel(iface)?;
        let channel_arg = channel.to_string();
        self.run(
            PlatformOp::ApplyChannel,
            iface,
            &self.iw_binary,
            &["dev", iface, "set", "channel", &channel_arg],
        )?;
        Ok(old)
    }

    fn get_channel(&self, iface: &str) -> Result<u32> {
        let info = self.run(PlatformOp::GetChannel, iface, &self.iw_binary, &["dev", iface, "info"])?;
        // An interface that is not tuned yet reports no channel line
        Ok(parse_iw_channel(&info).unwrap_or(0))
    }

    fn trigger_scan(&self, iface: &str) -> Result<()> {
        self.run(
            PlatformOp::TriggerScan,
            iface,
            &self.iw_binary,
            &["dev", iface, "scan", "trigger"],
        )
        .map(|_| ())
    }

    fn scan_results(&self, iface: &str) -> Result<Vec<AccessPoint>> {
        let dump = self.run(
            PlatformOp::ScanResults,
            iface,
            &self.iw_binary,
            &["dev", iface, "scan", "dump"],
        )?;
        Ok(parse_iw_scan(&dump))
    }
}
