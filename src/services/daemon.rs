// linkd - Daemon Loop
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! The daemon: keeps the device registry in sync with the interfaces the
//! kernel reports, drives Wi-Fi scans and auto-activates idle devices.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::autoconnect::AutoconnectService;
use super::discovery::{self, InterfaceInfo};
use crate::device::{Device, DeviceId};
use crate::manager::events::{Emitter, Event, EventKind, SubscriptionId};
use crate::manager::{DeviceManager, DeviceProperties};
use crate::models::{DaemonConfig, DeviceState, DeviceType, Result};
use crate::platform::Platform;

/// Signals exported on the IPC boundary.
const EXPORTED_SIGNALS: [EventKind; 3] = [
    EventKind::StateChanged,
    EventKind::CarrierChanged,
    EventKind::StrengthChanged,
];

/// Interface changes applied by one rescan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RescanSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub scans_started: usize,
    pub activated: usize,
}

pub struct Daemon {
    manager: DeviceManager,
    config: DaemonConfig,
    autoconnect: AutoconnectService,
    /// Managed interfaces by name.
    known: BTreeMap<String, DeviceId>,
    /// When each Wi-Fi device last started or finished a scan.
    last_scan: HashMap<DeviceId, DateTime<Utc>>,
    signal_subs: Vec<SubscriptionId>,
    sysfs_root: PathBuf,
}

fn log_signal(event: &Event) {
    match event {
        Event::StateChanged {
            device,
            new,
            old,
            reason,
        } => debug!("signal state_changed: device {} {} -> {} ({})", device, old, new, reason),
        Event::CarrierChanged { device, carrier } => {
            debug!("signal carrier_changed: device {} carrier {}", device, carrier)
        }
        Event::StrengthChanged {
            device,
            access_point,
            strength,
        } => trace!(
            "signal strength_changed: device {} access point {} at {}%",
            device,
            access_point,
            strength
        ),
        _ => {}
    }
}

impl Daemon {
    pub fn new(config: DaemonConfig, platform: Box<dyn Platform>) -> Self {
        let mut manager = DeviceManager::new(platform, &config);
        let signal_subs = EXPORTED_SIGNALS
            .iter()
            .map(|kind| manager.subscribe(Emitter::Any, *kind, log_signal))
            .collect();

        Self {
            manager,
            config,
            autoconnect: AutoconnectService::new(),
            known: BTreeMap::new(),
            last_scan: HashMap::new(),
            signal_subs,
            sysfs_root: PathBuf::from(discovery::SYSFS_NET),
        }
    }

    /// Read interfaces from another sysfs tree.
    #[cfg(test)]
    fn with_sysfs_root(mut self, root: impl AsRef<std::path::Path>) -> Self {
        self.sysfs_root = root.as_ref().to_path_buf();
        self
    }

    pub fn manager(&self) -> &DeviceManager {
        &self.manager
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Reconcile the registry with `found`: new interfaces are added, gone
    /// ones removed and carrier changes forwarded.
    pub fn apply_interfaces(&mut self, found: &[InterfaceInfo]) -> RescanSummary {
        let mut summary = RescanSummary::default();

        let gone: Vec<String> = self
            .known
            .keys()
            .filter(|name| !found.iter().any(|info| &info.name == *name))
            .cloned()
            .collect();
        for name in gone {
            if let Some(id) = self.known.remove(&name) {
                info!("{}: interface disappeared", name);
                if let Err(e) = self.manager.remove_device(id) {
                    warn!("{}: failed to remove device: {}", name, e);
                }
                self.autoconnect.reset(id);
                self.last_scan.remove(&id);
                summary.removed.push(name);
            }
        }

        for info in found {
            if self.config.is_unmanaged(&info.name) {
                continue;
            }

            let id = match self.known.get(&info.name) {
                Some(id) => *id,
                None => match self
                    .manager
                    .add_device(&info.name, &info.hw_address, info.kind)
                {
                    Ok(id) => {
                        self.known.insert(info.name.clone(), id);
                        summary.added.push(info.name.clone());
                        id
                    }
                    Err(e) => {
                        warn!("{}: cannot manage interface: {}", info.name, e);
                        continue;
                    }
                },
            };

            if let Err(e) = self.manager.set_carrier(id, info.carrier) {
                warn!("{}: failed to update carrier: {}", info.name, e);
            }
        }

        summary
    }

    /// Start autoconnect profiles on devices that asked for it.
    pub fn process_auto_activation(&mut self) -> usize {
        self.autoconnect
            .process(&mut self.manager, &self.config.connections)
    }

    /// Collect finished scans, expire old results and start scans that are
    /// due. Returns how many scans were started.
    pub fn drive_scans(&mut self) -> usize {
        let now = Utc::now();
        let interval = chrono::Duration::seconds(i64::from(self.config.wifi.scan_interval_secs));
        let max_age = chrono::Duration::seconds(i64::from(self.config.wifi.ap_max_age_secs));
        let mut started = 0;

        let wifi: Vec<(String, DeviceId)> = self
            .known
            .iter()
            .filter(|(_, id)| {
                self.manager.device(**id).map(Device::device_type) == Some(DeviceType::Wifi)
            })
            .map(|(name, id)| (name.clone(), *id))
            .collect();

        for (name, id) in wifi {
            if self.manager.is_scanning(id).unwrap_or(false) {
                match self.manager.finish_scan(id) {
                    Ok(count) => debug!("{}: {} scan result(s)", name, count),
                    Err(e) => warn!("{}: failed to read scan results: {}", name, e),
                }
                self.last_scan.insert(id, now);
            }

            match self.manager.expire_access_points(id, max_age) {
                Ok(0) => {}
                Ok(expired) => debug!("{}: {} access point(s) expired", name, expired),
                Err(e) => warn!("{}: failed to expire access points: {}", name, e),
            }

            let state = self.manager.state(id).unwrap_or_default();
            if state < DeviceState::Disconnected || state.is_activating() {
                continue;
            }
            let due = self
                .last_scan
                .get(&id)
                .map_or(true, |last| now - *last >= interval);
            if !due {
                continue;
            }

            match self.manager.request_scan(id) {
                Ok(true) => {
                    started += 1;
                    self.last_scan.insert(id, now);
                }
                Ok(false) => debug!("{}: background scan deferred", name),
                Err(e) => {
                    warn!("{}: failed to start a scan: {}", name, e);
                    self.last_scan.insert(id, now);
                }
            }
        }

        started
    }

    /// Apply one interface listing, then drive scans and auto-activation.
    pub fn step(&mut self, found: &[InterfaceInfo]) -> RescanSummary {
        let mut summary = self.apply_interfaces(found);
        summary.scans_started = self.drive_scans();
        summary.activated = self.process_auto_activation();
        if !summary.added.is_empty() || !summary.removed.is_empty() || summary.activated > 0 {
            debug!(
                "Rescan: {} added, {} removed, {} activated",
                summary.added.len(),
                summary.removed.len(),
                summary.activated
            );
        }
        summary
    }

    /// Reconcile the registry with sysfs.
    pub fn discover(&mut self) -> RescanSummary {
        let found = discovery::detect_interfaces_in(&self.sysfs_root);
        self.apply_interfaces(&found)
    }

    /// One sysfs pass followed by scans and auto-activation.
    pub fn rescan(&mut self) -> RescanSummary {
        let found = discovery::detect_interfaces_in(&self.sysfs_root);
        self.step(&found)
    }

    pub fn snapshot(&self) -> Result<Vec<DeviceProperties>> {
        self.manager.snapshot()
    }

    pub fn snapshot_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot()?)?)
    }

    /// Tear down every device.
    pub fn shutdown(&mut self) {
        info!("Shutting down {} device(s)", self.known.len());
        self.manager.remove_all();
        self.known.clear();
        self.last_scan.clear();
        for sub in self.signal_subs.drain(..) {
            self.manager.unsubscribe(sub);
        }
    }

    /// Rescan on an interval until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        let period = Duration::from_secs(u64::from(self.config.rescan_interval_secs.max(1)));
        let mut interval = tokio::time::interval(period);
        info!("Watching interfaces every {}s", period.as_secs());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.rescan();
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessPoint, ApMode, Connection, OlpcMeshSetting};
    use crate::platform::{MemoryPlatform, PlatformOp};
    use std::rc::Rc;

    fn iface(name: &str, kind: DeviceType, hw: &str, carrier: bool) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_string(),
            kind,
            hw_address: hw.to_string(),
            carrier,
        }
    }

    fn daemon(config: DaemonConfig) -> Daemon {
        Daemon::new(config, Box::new(MemoryPlatform::new()))
    }

    #[test]
    fn test_apply_interfaces_adds_and_removes() {
        let mut config = DaemonConfig::default();
        config.unmanaged_interfaces.push("eth1".into());
        let mut daemon = daemon(config);

        let summary = daemon.apply_interfaces(&[
            iface("eth0", DeviceType::Ethernet, "00:11:22:33:44:55", true),
            iface("eth1", DeviceType::Ethernet, "00:11:22:33:44:56", true),
        ]);
        assert_eq!(summary.added, vec!["eth0".to_string()]);
        let eth = daemon.known["eth0"];
        assert_eq!(daemon.manager().state(eth).unwrap(), DeviceState::Disconnected);
        assert!(!daemon.known.contains_key("eth1"));

        let summary = daemon.apply_interfaces(&[]);
        assert_eq!(summary.removed, vec!["eth0".to_string()]);
        assert!(daemon.manager().device_ids().is_empty());
    }

    #[test]
    fn test_mesh_pairs_and_autoconnects() {
        let mut config = DaemonConfig::default();
        config
            .connections
            .push(Connection::olpc_mesh("Mesh", OlpcMeshSetting::default()));
        let mut daemon = daemon(config);

        daemon.apply_interfaces(&[
            iface("msh0", DeviceType::OlpcMesh, "AA:BB:CC:DD:EE:FF", false),
            iface("wlan0", DeviceType::Wifi, "aa:bb:cc:dd:ee:ff", false),
        ]);
        let mesh = daemon.known["msh0"];
        let wifi = daemon.known["wlan0"];
        assert_eq!(daemon.manager().companion_of(mesh), Some(wifi));

        assert_eq!(daemon.process_auto_activation(), 1);
        assert_eq!(daemon.manager().state(mesh).unwrap(), DeviceState::Activated);

        let json = daemon.snapshot_json().unwrap();
        assert!(json.contains("\"companion\""));

        daemon.shutdown();
        assert!(daemon.manager().device_ids().is_empty());
    }

    #[test]
    fn test_rescan_reads_sysfs() {
        let root = std::env::temp_dir().join(format!("linkd-daemon-{}", std::process::id()));
        let eth = root.join("eth0");
        std::fs::create_dir_all(&eth).unwrap();
        std::fs::write(eth.join("type"), "1\n").unwrap();
        std::fs::write(eth.join("address"), "00:11:22:33:44:55\n").unwrap();
        std::fs::write(eth.join("carrier"), "1\n").unwrap();

        let mut config = DaemonConfig::default();
        config.connections.push(Connection::wired("Wired"));
        let mut daemon = daemon(config).with_sysfs_root(&root);

        let summary = daemon.rescan();
        assert_eq!(summary.added, vec!["eth0".to_string()]);
        assert_eq!(summary.activated, 1);

        // second pass changes nothing
        assert_eq!(daemon.rescan(), RescanSummary::default());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_removed_interface_forgets_retries() {
        let mut config = DaemonConfig::default();
        config.connections.push(Connection::wired("Wired"));
        let platform = Rc::new(MemoryPlatform::new());
        platform.fail_on(PlatformOp::StartIpConfig);
        let mut daemon = Daemon::new(config, Box::new(Rc::clone(&platform)));
        let profile = daemon.config().connections[0].id;

        daemon.step(&[iface("eth0", DeviceType::Ethernet, "00:11:22:33:44:55", true)]);
        let eth = daemon.known["eth0"];
        assert_eq!(daemon.autoconnect.attempts_for(eth, profile), 1);

        daemon.step(&[]);
        assert_eq!(daemon.autoconnect.attempts_for(eth, profile), 0);
        assert!(daemon.last_scan.is_empty());
    }

    #[test]
    fn test_background_scan_feeds_access_points() {
        let mut config = DaemonConfig::default();
        config
            .connections
            .push(Connection::olpc_mesh("Mesh", OlpcMeshSetting::default()));
        let platform = Rc::new(MemoryPlatform::new());
        let ap = AccessPoint::new(Some("school"), "00:11:22:33:44:55", ApMode::Infra, 2437, 80);
        platform.set_scan_results("wlan0", vec![ap]);
        let mut daemon = Daemon::new(config, Box::new(Rc::clone(&platform)));

        let found = [
            iface("msh0", DeviceType::OlpcMesh, "AA:BB:CC:DD:EE:FF", false),
            iface("wlan0", DeviceType::Wifi, "aa:bb:cc:dd:ee:ff", false),
        ];
        let summary = daemon.step(&found);
        assert_eq!(summary.scans_started, 1);
        assert_eq!(summary.activated, 1);
        let mesh = daemon.known["msh0"];
        let wifi = daemon.known["wlan0"];
        assert!(daemon.manager().is_scanning(wifi).unwrap());
        // the mesh waits for the companion's scan
        assert_eq!(daemon.manager().state(mesh).unwrap(), DeviceState::Prepare);
        assert_eq!(platform.ops_for("wlan0"), vec![PlatformOp::TriggerScan]);

        let summary = daemon.step(&found);
        assert_eq!(summary.scans_started, 0);
        assert!(!daemon.manager().is_scanning(wifi).unwrap());
        assert_eq!(daemon.manager().access_points(wifi).unwrap().len(), 1);
        assert_eq!(daemon.manager().state(mesh).unwrap(), DeviceState::Activated);
    }
}
