// linkd - Validation Utilities
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Input validation for hardware addresses, interface names and SSIDs.

use super::error::{Error, Result};

/// Maximum interface name length accepted by the kernel (IFNAMSIZ - 1).
const MAX_IFACE_LEN: usize = 15;

/// Maximum SSID length in bytes.
const MAX_SSID_LEN: usize = 32;

/// Parse a hardware address of any length into bytes.
///
/// Accepts `:` or `-` separated hex octets.
pub fn parse_hw_address(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.split([':', '-'])
        .map(|part| {
            if part.is_empty() || part.len() > 2 {
                None
            } else {
                u8::from_str_radix(part, 16).ok()
            }
        })
        .collect()
}

/// Compare two hardware addresses, ignoring case and separator style.
///
/// Unparseable addresses never match anything.
pub fn hw_address_matches(a: &str, b: &str) -> bool {
    match (parse_hw_address(a), parse_hw_address(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Validate a network interface name.
pub fn validate_interface_name(s: &str) -> Result<String> {
    if s.is_empty() || s.len() > MAX_IFACE_LEN {
        return Err(Error::InvalidInterfaceName(format!(
            "Interface name must be 1-{} characters: {}",
            MAX_IFACE_LEN, s
        )));
    }
    if s == "." || s == ".." {
        return Err(Error::InvalidInterfaceName(s.to_string()));
    }
    if s.chars().any(|c| c == '/' || c == ':' || c.is_whitespace()) {
        return Err(Error::InvalidInterfaceName(format!(
            "Invalid characters in interface name: {}",
            s
        )));
    }
    Ok(s.to_string())
}

/// Validate an SSID (1-32 bytes).
pub fn validate_ssid(ssid: &[u8]) -> Result<()> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
        return Err(Error::InvalidSsid(format!(
            "SSID must be 1-{} bytes, got {}",
            MAX_SSID_LEN,
            ssid.len()
        )));
    }
    Ok(())
}
