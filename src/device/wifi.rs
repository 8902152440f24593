// linkd - Wi-Fi Device
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Wi-Fi devices: scan state, scan prohibitions and the access point list.

use chrono::{DateTime, Duration, Utc};
use std::any::Any;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use zbus::zvariant::OwnedObjectPath;

use super::class::{DeviceClass, DeviceContext, StageReturn, VariantProperties};
use super::{DeviceCore, DeviceId, DeviceTable};
use crate::manager::events::Property;
use crate::models::connection::SETTING_WIRELESS;
use crate::models::{
    AccessPoint, DeviceState, DeviceType, Result, StateReason, ACCESS_POINT_PATH_PREFIX,
};

/// Devices currently forbidding this device to scan.
///
/// Each requester holds at most one prohibition; scanning is allowed again
/// only when every requester released its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProhibitions(BTreeSet<DeviceId>);

impl ScanProhibitions {
    /// Hold or release the prohibition of `requester`. Returns true on change.
    pub fn track(&mut self, requester: DeviceId, prohibited: bool) -> bool {
        if prohibited {
            self.0.insert(requester)
        } else {
            self.0.remove(&requester)
        }
    }

    pub fn is_prohibited(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn contains(&self, requester: DeviceId) -> bool {
        self.0.contains(&requester)
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }
}

/// Outcome of merging a scan result into the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApUpdate {
    Added(u64),
    Updated { id: u64, strength_changed: bool },
}

#[derive(Debug, Default)]
pub struct WifiClass {
    scanning: bool,
    prohibitions: ScanProhibitions,
    access_points: Vec<AccessPoint>,
    next_ap_id: u64,
    active_ap: Option<u64>,
}

/// Object path of an access point.
pub fn access_point_path(id: u64) -> Result<OwnedObjectPath> {
    Ok(OwnedObjectPath::try_from(format!(
        "{}/{}",
        ACCESS_POINT_PATH_PREFIX, id
    ))?)
}

impl WifiClass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scanning(&self) -> bool {
        self.scanning
    }

    /// Returns true if the value changed.
    pub fn set_scanning(&mut self, scanning: bool) -> bool {
        if self.scanning == scanning {
            return false;
        }
        self.scanning = scanning;
        true
    }

    pub fn scan_allowed(&self) -> bool {
        !self.prohibitions.is_prohibited()
    }

    pub fn prohibitions(&self) -> &ScanProhibitions {
        &self.prohibitions
    }

    pub fn access_points(&self) -> &[AccessPoint] {
        &self.access_points
    }

    pub fn access_point(&self, id: u64) -> Option<&AccessPoint> {
        self.access_points.iter().find(|ap| ap.id == id)
    }

    pub fn active_access_point(&self) -> Option<&AccessPoint> {
        self.active_ap.and_then(|id| self.access_point(id))
    }

    fn register(&mut self, mut ap: AccessPoint) -> u64 {
        self.next_ap_id += 1;
        ap.id = self.next_ap_id;
        self.access_points.push(ap);
        self.next_ap_id
    }

    /// Merge a scan result: known networks are updated in place.
    pub fn merge_access_point(&mut self, ap: AccessPoint) -> ApUpdate {
        let Some(idx) = ap.match_in_list(&self.access_points, false) else {
            return ApUpdate::Added(self.register(ap));
        };

        let known = &mut self.access_points[idx];
        let strength_changed = known.set_strength(ap.strength());
        known.set_rate(ap.rate());
        if known.ssid().is_none() && ap.ssid().is_some() {
            known.set_ssid(ap.ssid());
        }
        known.set_last_seen(ap.last_seen().unwrap_or_else(Utc::now));
        ApUpdate::Updated {
            id: known.id,
            strength_changed,
        }
    }

    /// Remove an access point; the active one stays.
    pub fn remove_access_point(&mut self, id: u64) -> bool {
        if self.active_ap == Some(id) {
            return false;
        }
        let before = self.access_points.len();
        self.access_points.retain(|ap| ap.id != id);
        self.access_points.len() != before
    }

    /// Drop scan results not seen for longer than `max_age`. Fake and active
    /// access points are kept.
    pub fn expire_access_points(&mut self, max_age: Duration, now: DateTime<Utc>) -> Vec<u64> {
        let active = self.active_ap;
        let mut expired = Vec::new();
        self.access_points.retain(|ap| {
            let stale = !ap.is_fake()
                && Some(ap.id) != active
                && ap.last_seen().is_some_and(|seen| now - seen > max_age);
            if stale {
                expired.push(ap.id);
            }
            !stale
        });
        expired
    }
}

impl DeviceClass for WifiClass {
    fn device_type(&self) -> DeviceType {
        DeviceType::Wifi
    }

    fn connection_type(&self) -> &'static str {
        SETTING_WIRELESS
    }

    fn is_scanning(&self) -> bool {
        self.scanning
    }

    fn track_scan_prohibition(&mut self, requester: DeviceId, prohibited: bool) -> bool {
        let changed = self.prohibitions.track(requester, prohibited);
        if changed {
            debug!(
                "scan prohibition of device {} {} ({} held)",
                requester,
                if prohibited { "added" } else { "released" },
                self.prohibitions.count()
            );
        }
        changed
    }

    fn state_changed(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        new: DeviceState,
        old: DeviceState,
        _reason: StateReason,
    ) {
        if old.is_active() && new <= DeviceState::Disconnected {
            ctx.notify(Property::ActiveAccessPoint);
            ctx.notify(Property::AccessPoints);
        }
    }

    fn act_stage1_prepare(&mut self, ctx: &mut DeviceContext<'_>) -> StageReturn {
        let Some(setting) = ctx
            .core
            .connection()
            .and_then(|c| c.wireless_setting())
            .cloned()
        else {
            return StageReturn::Failure(StateReason::ConnectionIncompatible);
        };

        let visible = self
            .access_points
            .iter()
            .filter(|ap| ap.check_compatible(&setting))
            .max_by_key(|ap| ap.strength())
            .map(|ap| ap.id);

        let ap_id = match visible {
            Some(id) => id,
            None => match AccessPoint::new_fake_from_connection(&setting) {
                Some(fake) => {
                    info!(
                        "{}: '{}' not in scan list, using a hidden access point",
                        ctx.iface(),
                        setting.ssid
                    );
                    let id = self.register(fake);
                    ctx.notify(Property::AccessPoints);
                    id
                }
                None => {
                    warn!("{}: no access point for '{}'", ctx.iface(), setting.ssid);
                    return StageReturn::Failure(StateReason::SsidNotFound);
                }
            },
        };

        self.active_ap = Some(ap_id);
        ctx.notify(Property::ActiveAccessPoint);
        StageReturn::Success
    }

    fn deactivate(&mut self, core: &mut DeviceCore) {
        let Some(id) = self.active_ap.take() else {
            return;
        };
        let fake = self.access_point(id).is_some_and(AccessPoint::is_fake);
        if fake {
            debug!("{}: dropping hidden access point {}", core.iface, id);
            self.access_points.retain(|ap| ap.id != id);
        }
    }

    fn variant_properties(&self, _core: &DeviceCore, _peers: &DeviceTable) -> Result<VariantProperties> {
        Ok(VariantProperties::Wifi {
            scanning: self.scanning,
            access_points: self
                .access_points
                .iter()
                .map(|ap| access_point_path(ap.id))
                .collect::<Result<Vec<_>>>()?,
            active_access_point: self.active_ap.map(access_point_path).transpose()?,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApMode;

    #[test]
    fn test_scan_prohibitions_compose() {
        let mut wifi = WifiClass::new();
        let mesh_a = DeviceId::new(2);
        let mesh_b = DeviceId::new(3);

        assert!(wifi.track_scan_prohibition(mesh_a, true));
        assert!(wifi.track_scan_prohibition(mesh_b, true));
        assert!(!wifi.track_scan_prohibition(mesh_a, true));
        assert!(!wifi.scan_allowed());

        assert!(wifi.track_scan_prohibition(mesh_a, false));
        assert!(!wifi.scan_allowed());
        assert!(wifi.prohibitions().contains(mesh_b));

        assert!(wifi.track_scan_prohibition(mesh_b, false));
        assert!(wifi.scan_allowed());
        assert!(!wifi.track_scan_prohibition(mesh_b, false));
    }

    #[test]
    fn test_merge_access_point() {
        let mut wifi = WifiClass::new();
        let first = AccessPoint::new(Some("school"), "00:11:22:33:44:55", ApMode::Infra, 2437, 40);
        let id = match wifi.merge_access_point(first) {
            ApUpdate::Added(id) => id,
            other => panic!("unexpected {:?}", other),
        };

        let again = AccessPoint::new(Some("school"), "00:11:22:33:44:55", ApMode::Infra, 2437, 70);
        assert_eq!(
            wifi.merge_access_point(again),
            ApUpdate::Updated {
                id,
                strength_changed: true
            }
        );
        assert_eq!(wifi.access_points().len(), 1);
        assert_eq!(wifi.access_point(id).map(AccessPoint::strength), Some(70));
    }

    #[test]
    fn test_expire_keeps_recent_and_active() {
        let mut wifi = WifiClass::new();
        let now = Utc::now();
        let mut old = AccessPoint::new(Some("old"), "00:11:22:33:44:01", ApMode::Infra, 2412, 10);
        old.set_last_seen(now - Duration::seconds(600));
        let mut active = old.clone();
        active.set_ssid(Some("active"));
        active.set_bssid(Some("00:11:22:33:44:02"));
        let fresh = AccessPoint::new(Some("fresh"), "00:11:22:33:44:03", ApMode::Infra, 2412, 10);

        let old_id = wifi.register(old);
        let active_id = wifi.register(active);
        wifi.register(fresh);
        wifi.active_ap = Some(active_id);

        assert_eq!(wifi.expire_access_points(Duration::seconds(360), now), vec![old_id]);
        assert_eq!(wifi.access_points().len(), 2);
        assert!(!wifi.remove_access_point(active_id));
    }

    #[test]
    fn test_deactivate_drops_fake_access_point() {
        let mut wifi = WifiClass::new();
        let setting = crate::models::WirelessSetting {
            hidden: true,
            ..crate::models::WirelessSetting::open("hidden-net")
        };
        let fake = AccessPoint::new_fake_from_connection(&setting).unwrap();
        let id = wifi.register(fake);
        wifi.active_ap = Some(id);

        let mut core = DeviceCore::new(DeviceId::new(1), "wlan0", "00:11:22:33:44:55");
        wifi.deactivate(&mut core);
        assert!(wifi.active_access_point().is_none());
        assert!(wifi.access_points().is_empty());
    }
}
