// linkd - Wi-Fi Entry Points
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Scan and access point reports for Wi-Fi devices.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use super::dispatch::Dispatch;
use super::events::{Event, Property};
use super::DeviceManager;
use crate::device::wifi::ApUpdate;
use crate::device::{DeviceCore, DeviceId, DeviceTable, WifiClass};
use crate::models::{AccessPoint, Error, Result};

/// Core and Wi-Fi variant of a device.
fn wifi_parts(devices: &mut DeviceTable, id: DeviceId) -> Result<(&mut DeviceCore, &mut WifiClass)> {
    let device = devices
        .get_mut(&id)
        .ok_or_else(|| Error::DeviceNotFound(id.to_string()))?;
    let core = &mut device.core;
    let wifi = device
        .class
        .as_any_mut()
        .downcast_mut::<WifiClass>()
        .ok_or_else(|| Error::InvariantViolation(format!("{} is not a Wi-Fi device", core.iface)))?;
    Ok((core, wifi))
}

impl DeviceManager {
    /// Start a scan. Returns false if a companion currently prohibits it.
    pub fn request_scan(&mut self, id: DeviceId) -> Result<bool> {
        let (core, wifi) = wifi_parts(&mut self.devices, id)?;
        if !wifi.scan_allowed() {
            info!(
                "{}: scan refused, prohibited by {} device(s)",
                core.iface,
                wifi.prohibitions().count()
            );
            return Ok(false);
        }
        if wifi.scanning() {
            return Ok(true);
        }

        let iface = core.iface.clone();
        debug!("{}: scan requested", iface);
        self.platform.trigger_scan(&iface)?;
        self.set_scanning(id, true)?;
        Ok(true)
    }

    /// Collect the results of a running scan. Results are merged into the
    /// list, scan results the driver no longer reports are removed and the
    /// scan is marked done. Returns the number of results read.
    pub fn finish_scan(&mut self, id: DeviceId) -> Result<usize> {
        let (core, wifi) = wifi_parts(&mut self.devices, id)?;
        if !wifi.scanning() {
            return Ok(0);
        }
        let iface = core.iface.clone();

        let results = match self.platform.scan_results(&iface) {
            Ok(results) => results,
            Err(e) => {
                self.set_scanning(id, false)?;
                return Err(e);
            }
        };

        let count = results.len();
        let mut seen = Vec::with_capacity(count);
        for ap in results {
            seen.push(self.update_access_point(id, ap)?);
        }

        let (_, wifi) = wifi_parts(&mut self.devices, id)?;
        let gone: Vec<u64> = wifi
            .access_points()
            .iter()
            .filter(|ap| !ap.is_fake() && !seen.contains(&ap.id))
            .map(|ap| ap.id)
            .collect();
        for ap_id in gone {
            self.remove_access_point(id, ap_id)?;
        }

        debug!("{}: scan done, {} result(s)", iface, count);
        self.set_scanning(id, false)?;
        Ok(count)
    }

    pub fn is_scanning(&self, id: DeviceId) -> Result<bool> {
        Ok(self.device_ref(id)?.class.is_scanning())
    }

    /// Scanning state reported by the platform.
    pub fn set_scanning(&mut self, id: DeviceId, scanning: bool) -> Result<()> {
        let (core, wifi) = wifi_parts(&mut self.devices, id)?;
        if !wifi.set_scanning(scanning) {
            return Ok(());
        }

        debug!("{}: scanning {}", core.iface, if scanning { "started" } else { "done" });
        self.queue.push(Dispatch::Signal(Event::PropertyChanged {
            device: id,
            property: Property::Scanning,
        }));
        self.run_queue();
        Ok(())
    }

    /// Merge a scan result into the device's list. Returns the access
    /// point id.
    pub fn update_access_point(&mut self, id: DeviceId, ap: AccessPoint) -> Result<u64> {
        let (core, wifi) = wifi_parts(&mut self.devices, id)?;
        let ap_id = match wifi.merge_access_point(ap) {
            ApUpdate::Added(ap_id) => {
                debug!("{}: new access point {}", core.iface, ap_id);
                self.queue.push(Dispatch::Signal(Event::PropertyChanged {
                    device: id,
                    property: Property::AccessPoints,
                }));
                ap_id
            }
            ApUpdate::Updated {
                id: ap_id,
                strength_changed,
            } => {
                if strength_changed {
                    if let Some(ap) = wifi.access_point(ap_id) {
                        self.queue.push(Dispatch::Signal(Event::StrengthChanged {
                            device: id,
                            access_point: ap_id,
                            strength: ap.strength(),
                        }));
                    }
                }
                ap_id
            }
        };
        self.run_queue();
        Ok(ap_id)
    }

    pub fn remove_access_point(&mut self, id: DeviceId, ap_id: u64) -> Result<bool> {
        let (core, wifi) = wifi_parts(&mut self.devices, id)?;
        if !wifi.remove_access_point(ap_id) {
            return Ok(false);
        }

        debug!("{}: access point {} gone", core.iface, ap_id);
        self.queue.push(Dispatch::Signal(Event::PropertyChanged {
            device: id,
            property: Property::AccessPoints,
        }));
        self.run_queue();
        Ok(true)
    }

    /// Drop access points not seen for `max_age`. Returns how many went.
    pub fn expire_access_points(&mut self, id: DeviceId, max_age: Duration) -> Result<usize> {
        let (core, wifi) = wifi_parts(&mut self.devices, id)?;
        let expired = wifi.expire_access_points(max_age, Utc::now());
        if expired.is_empty() {
            return Ok(0);
        }

        debug!("{}: expired {} access point(s)", core.iface, expired.len());
        self.queue.push(Dispatch::Signal(Event::PropertyChanged {
            device: id,
            property: Property::AccessPoints,
        }));
        self.run_queue();
        Ok(expired.len())
    }

    pub fn access_points(&self, id: DeviceId) -> Result<Vec<AccessPoint>> {
        let device = self.device_ref(id)?;
        let wifi = device
            .class
            .as_any()
            .downcast_ref::<WifiClass>()
            .ok_or_else(|| Error::InvariantViolation(format!("{} is not a Wi-Fi device", device.iface())))?;
        Ok(wifi.access_points().to_vec())
    }
}
