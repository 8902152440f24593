// linkd - Interface Discovery
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Network interface detection.
//!
//! Reads the Linux sysfs tree (`/sys/class/net`) to find the interfaces the
//! daemon should manage, their device type, hardware address and carrier.

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::models::DeviceType;

/// Default sysfs directory listing network interfaces.
pub const SYSFS_NET: &str = "/sys/class/net";

/// An interface found in sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub kind: DeviceType,
    pub hw_address: String,
    pub carrier: bool,
}

/// What sysfs says an interface is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Managed(DeviceType),
    Virtual,
    Loopback,
    Other,
}

/// Detect manageable interfaces under `root`, sorted naturally by name.
pub fn detect_interfaces_in(root: &Path) -> Vec<InterfaceInfo> {
    let mut interfaces = Vec::new();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", root.display(), e);
            return interfaces;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();

        let kind = match determine_link_kind(&path, &name) {
            LinkKind::Managed(kind) => kind,
            other => {
                debug!("{}: skipping ({:?})", name, other);
                continue;
            }
        };

        let Some(hw_address) = read_hw_address(&path) else {
            debug!("{}: skipping, no hardware address", name);
            continue;
        };

        interfaces.push(InterfaceInfo {
            carrier: read_carrier(&path),
            name,
            kind,
            hw_address,
        });
    }

    interfaces.sort_by_cached_key(|info| natural_sort_key(&info.name));
    interfaces
}

fn determine_link_kind(path: &Path, name: &str) -> LinkKind {
    if name == "lo" {
        return LinkKind::Loopback;
    }

    let wireless = path.join("wireless").exists()
        || fs::read_to_string(path.join("uevent"))
            .map(|uevent| uevent.contains("DEVTYPE=wlan"))
            .unwrap_or(false);
    if wireless {
        // OLPC firmware exposes the mesh as a second wireless interface
        if name.starts_with("msh") {
            return LinkKind::Managed(DeviceType::OlpcMesh);
        }
        return LinkKind::Managed(DeviceType::Wifi);
    }

    // 1 = ARPHRD_ETHER, 772 = ARPHRD_LOOPBACK
    if let Ok(type_str) = fs::read_to_string(path.join("type")) {
        match type_str.trim().parse::<u32>().unwrap_or(0) {
            1 => {
                if is_virtual_interface(name) {
                    return LinkKind::Virtual;
                }
                return LinkKind::Managed(DeviceType::Ethernet);
            }
            772 => return LinkKind::Loopback,
            _ => {}
        }
    }

    if name.starts_with("msh") {
        return LinkKind::Managed(DeviceType::OlpcMesh);
    }
    if name.starts_with("wl") || name.starts_with("wifi") {
        return LinkKind::Managed(DeviceType::Wifi);
    }
    if is_virtual_interface(name) {
        return LinkKind::Virtual;
    }
    if name.starts_with("en") || name.starts_with("eth") {
        return LinkKind::Managed(DeviceType::Ethernet);
    }

    LinkKind::Other
}

fn read_hw_address(path: &Path) -> Option<String> {
    let mac = fs::read_to_string(path.join("address")).ok()?;
    let mac = mac.trim().to_uppercase();
    if mac.is_empty() || mac == "00:00:00:00:00:00" {
        return None;
    }
    Some(mac)
}

/// `carrier` cannot be read while the link is down; fall back to operstate.
fn read_carrier(path: &Path) -> bool {
    if let Ok(carrier) = fs::read_to_string(path.join("carrier")) {
        return carrier.trim() == "1";
    }
    fs::read_to_string(path.join("operstate"))
        .map(|state| state.trim() == "up")
        .unwrap_or(false)
}

/// Check if interface name suggests a virtual/tunnel interface.
fn is_virtual_interface(name: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "veth", "br", "virbr", "docker", "vnet", "tun", "tap", "bond", "team", "vlan",
    ];
    PREFIXES.iter().any(|prefix| name.starts_with(prefix)) || name.contains("podman")
}

/// Piece of an interface name: a run of digits or a run of anything else.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NameChunk {
    Number(u64),
    Text(String),
}

/// Sort key that orders digit runs by value, so `enp3s0` < `enp10s0`.
fn natural_sort_key(s: &str) -> Vec<NameChunk> {
    let mut chunks = Vec::new();
    let mut rest = s;

    while let Some(first) = rest.chars().next() {
        let digits = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        chunks.push(if digits {
            NameChunk::Number(run.parse().unwrap_or(u64::MAX))
        } else {
            NameChunk::Text(run.to_string())
        });
        rest = tail;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct FakeSysfs(PathBuf);

    impl FakeSysfs {
        fn new(tag: &str) -> Self {
            let root = std::env::temp_dir().join(format!("linkd-sysfs-{}-{}", tag, std::process::id()));
            let _ = fs::remove_dir_all(&root);
            fs::create_dir_all(&root).unwrap();
            Self(root)
        }

        fn link(&self, name: &str, files: &[(&str, &str)], wireless: bool) {
            let dir = self.0.join(name);
            fs::create_dir_all(&dir).unwrap();
            if wireless {
                fs::create_dir_all(dir.join("wireless")).unwrap();
            }
            for (file, content) in files {
                fs::write(dir.join(file), format!("{}\n", content)).unwrap();
            }
        }
    }

    impl Drop for FakeSysfs {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_natural_sort_key() {
        assert_eq!(
            natural_sort_key("enp3s0"),
            vec![
                NameChunk::Text("enp".into()),
                NameChunk::Number(3),
                NameChunk::Text("s".into()),
                NameChunk::Number(0),
            ]
        );
        assert!(natural_sort_key("lo").len() == 1);

        let mut names = vec!["eth2", "enp10s0", "enp3s0", "eth10"];
        names.sort_by_key(|name| natural_sort_key(name));
        assert_eq!(names, vec!["enp3s0", "enp10s0", "eth2", "eth10"]);
    }

    #[test]
    fn test_detect_interfaces() {
        let sysfs = FakeSysfs::new("detect");
        sysfs.link("eth10", &[("type", "1"), ("address", "00:11:22:33:44:10"), ("carrier", "0")], false);
        sysfs.link("eth0", &[("type", "1"), ("address", "00:11:22:33:44:00"), ("carrier", "1")], false);
        sysfs.link("wlan0", &[("type", "1"), ("address", "aa:bb:cc:dd:ee:ff"), ("operstate", "up")], true);
        sysfs.link("msh0", &[("type", "1"), ("address", "aa:bb:cc:dd:ee:ff")], true);
        sysfs.link("lo", &[("type", "772"), ("address", "00:00:00:00:00:00")], false);
        sysfs.link("docker0", &[("type", "1"), ("address", "02:42:00:00:00:01")], false);
        sysfs.link("eth9", &[("type", "1")], false);

        let found = detect_interfaces_in(&sysfs.0);
        let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["eth0", "eth10", "msh0", "wlan0"]);

        assert_eq!(found[0].kind, DeviceType::Ethernet);
        assert!(found[0].carrier);
        assert!(!found[1].carrier);
        assert_eq!(found[2].kind, DeviceType::OlpcMesh);
        assert_eq!(found[2].hw_address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(found[3].kind, DeviceType::Wifi);
        assert!(found[3].carrier);
    }

    #[test]
    fn test_missing_root() {
        assert!(detect_interfaces_in(Path::new("/nonexistent/linkd/net")).is_empty());
    }
}
