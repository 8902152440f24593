// linkd - OLPC Mesh Device
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! OLPC mesh devices.
//!
//! A mesh interface shares its radio with a Wi-Fi interface of the same
//! hardware address, its companion. The mesh device finds and binds the
//! companion through registry events, watches it through subscriptions and
//! keeps the two from using the radio at the same time:
//!
//! - while the mesh activates, the companion may not start scans;
//! - while the mesh is active, the companion may not autoconnect;
//! - if the companion starts activating while the mesh is active, the mesh
//!   disconnects;
//! - when the companion goes idle, the mesh asks for an auto-activation
//!   re-evaluation.
//!
//! Without a companion the device stays `Unavailable` with the
//! `waiting-for-companion` pending action.

use std::any::Any;
use tracing::{debug, error, info, warn};

use super::class::{DeviceClass, DeviceContext, Stage, StageReturn, VariantProperties};
use super::pending::WAITING_FOR_COMPANION;
use super::{null_object_path, DeviceCore, DeviceId, DeviceTable};
use crate::manager::events::{Emitter, Event, EventKind, Property, SubscriptionId};
use crate::models::config::MeshConfig;
use crate::models::connection::SETTING_OLPC_MESH;
use crate::models::validation::hw_address_matches;
use crate::models::{
    Connection, DeviceState, DeviceType, Error, OlpcMeshSetting, Result, StateReason,
};

/// Events the mesh device watches on its companion.
const COMPANION_EVENTS: [EventKind; 3] = [
    EventKind::StateChanged,
    EventKind::PropertyChanged,
    EventKind::AutoconnectAllowed,
];

#[derive(Debug)]
pub struct OlpcMeshClass {
    defaults: MeshConfig,
    companion: Option<DeviceId>,
    companion_subs: Vec<SubscriptionId>,
    registry_subs: Vec<SubscriptionId>,
    /// Stage 1 postponed until the companion stops scanning.
    stage1_waiting: bool,
    active_channel: u32,
}

impl OlpcMeshClass {
    pub fn new(defaults: MeshConfig) -> Self {
        Self {
            defaults,
            companion: None,
            companion_subs: Vec::new(),
            registry_subs: Vec::new(),
            stage1_waiting: false,
            active_channel: 0,
        }
    }

    pub fn companion(&self) -> Option<DeviceId> {
        self.companion
    }

    pub fn stage1_waiting(&self) -> bool {
        self.stage1_waiting
    }

    pub fn active_channel(&self) -> u32 {
        self.active_channel
    }

    /// Number of live subscriptions on the companion.
    pub fn companion_subscriptions(&self) -> usize {
        self.companion_subs.len()
    }

    /// Bind `companion`. Fails if a companion is already bound; the existing
    /// binding is left untouched.
    pub fn bind_companion(&mut self, ctx: &mut DeviceContext<'_>, companion: DeviceId) -> Result<()> {
        if let Some(existing) = self.companion {
            return Err(Error::InvariantViolation(format!(
                "{} already has companion device {}, refusing {}",
                ctx.iface(),
                existing,
                companion
            )));
        }
        let Some(peer) = ctx.peer(companion) else {
            return Err(Error::DeviceNotFound(companion.to_string()));
        };
        let peer_iface = peer.iface().to_string();

        self.companion = Some(companion);
        self.companion_subs = COMPANION_EVENTS
            .iter()
            .map(|kind| ctx.subscribe(Emitter::Device(companion), *kind))
            .collect();

        info!("{}: found companion device {}", ctx.iface(), peer_iface);

        ctx.remove_pending(WAITING_FOR_COMPANION);
        ctx.notify(Property::Companion);
        ctx.queue_recheck_available(StateReason::None);
        self.sync_scan_prohibition(ctx);
        Ok(())
    }

    /// Bind `candidate` if it is a Wi-Fi device on the same hardware.
    fn check_companion(&mut self, ctx: &mut DeviceContext<'_>, candidate: DeviceId) -> bool {
        if self.companion.is_some() {
            return false;
        }
        let Some(peer) = ctx.peer(candidate) else {
            return false;
        };
        if peer.device_type() != DeviceType::Wifi
            || !hw_address_matches(&peer.core.hw_address, &ctx.core.hw_address)
        {
            return false;
        }

        match self.bind_companion(ctx, candidate) {
            Ok(()) => true,
            Err(e) => {
                error!("{}: {}", ctx.iface(), e);
                false
            }
        }
    }

    /// Look for a companion among the registered devices.
    fn find_companion(&mut self, ctx: &mut DeviceContext<'_>) {
        if self.companion.is_some() {
            return;
        }

        if !ctx.core.pending.contains(WAITING_FOR_COMPANION) {
            ctx.add_pending(WAITING_FOR_COMPANION);
        }

        for candidate in ctx.peer_ids() {
            if self.check_companion(ctx, candidate) {
                break;
            }
        }

        if self.companion.is_none() {
            debug!("{}: waiting for companion device", ctx.iface());
        }
    }

    /// Release the companion: prohibition first, then subscriptions, then
    /// the reference.
    fn companion_cleanup(&mut self, ctx: &mut DeviceContext<'_>) {
        let Some(companion) = self.companion else {
            return;
        };
        let me = ctx.id();

        if let Some(peer) = ctx.peer_mut(companion) {
            peer.class.track_scan_prohibition(me, false);
        }
        for sub in self.companion_subs.drain(..) {
            ctx.unsubscribe(sub);
        }
        self.companion = None;

        info!("{}: released companion device {}", ctx.iface(), companion);
        ctx.notify(Property::Companion);
        ctx.queue_recheck_available(StateReason::CompanionUnavailable);
    }

    /// Prohibit companion scans while this device is activating.
    fn sync_scan_prohibition(&mut self, ctx: &mut DeviceContext<'_>) {
        let Some(companion) = self.companion else {
            return;
        };
        let me = ctx.id();
        let prohibit = ctx.state().is_activating();
        if let Some(peer) = ctx.peer_mut(companion) {
            peer.class.track_scan_prohibition(me, prohibit);
        }
    }

    fn companion_state_changed(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        new: DeviceState,
        old: DeviceState,
    ) {
        let self_state = ctx.state();
        debug!(
            "{}: companion state changed {} -> {} (own state {})",
            ctx.iface(),
            old,
            new,
            self_state
        );

        if old > DeviceState::Disconnected && new <= DeviceState::Disconnected {
            ctx.recheck_auto_activate();
        }

        if new.is_active() && self_state.is_active() {
            info!("{}: companion is activating, disconnecting", ctx.iface());
            ctx.change_state(self, DeviceState::Disconnected, StateReason::UserRequested);
        }
    }

    fn companion_property_changed(&mut self, ctx: &mut DeviceContext<'_>, property: Property) {
        if property != Property::Scanning || !self.stage1_waiting {
            return;
        }
        let scanning = self
            .companion
            .and_then(|c| ctx.peer(c))
            .is_some_and(|peer| peer.class.is_scanning());
        if scanning {
            return;
        }

        self.stage1_waiting = false;
        if ctx.resume_postponed(Stage::Prepare) {
            debug!("{}: companion finished scanning, resuming activation", ctx.iface());
        }
    }

    /// Tune the mesh channel; 0 keeps the channel the radio is on.
    fn apply_channel(&mut self, ctx: &mut DeviceContext<'_>, channel: u32) -> bool {
        let platform = ctx.platform;
        let iface = ctx.core.iface.clone();

        let channel = if channel == 0 {
            match platform.get_channel(&iface) {
                Ok(current) => current,
                Err(e) => {
                    warn!("{}: unable to read the current channel: {}", iface, e);
                    return false;
                }
            }
        } else {
            channel
        };

        match platform.apply_channel(&iface, channel) {
            Ok(old) => {
                self.active_channel = channel;
                if old != channel {
                    ctx.notify(Property::ActiveChannel);
                }
                true
            }
            Err(e) => {
                warn!("{}: unable to set the mesh channel to {}: {}", iface, channel, e);
                false
            }
        }
    }

    fn mesh_setting(core: &DeviceCore) -> Option<&OlpcMeshSetting> {
        core.connection().and_then(Connection::olpc_mesh_setting)
    }
}

impl DeviceClass for OlpcMeshClass {
    fn device_type(&self) -> DeviceType {
        DeviceType::OlpcMesh
    }

    fn connection_type(&self) -> &'static str {
        SETTING_OLPC_MESH
    }

    fn complete_connection(&self, connection: &mut Connection) {
        if let Some(mesh) = connection.olpc_mesh_setting_mut() {
            if mesh.ssid.as_deref().map_or(true, str::is_empty) {
                mesh.ssid = Some(self.defaults.default_ssid.clone());
            }
            if mesh.dhcp_anycast_address.is_none() {
                mesh.dhcp_anycast_address = Some(self.defaults.dhcp_anycast_address.clone());
            }
        }
    }

    fn is_available(&self, core: &DeviceCore) -> bool {
        if self.companion.is_none() {
            debug!("{}: not available without a companion", core.iface);
            return false;
        }
        true
    }

    fn get_autoconnect_allowed(&self, _core: &DeviceCore, peers: &DeviceTable) -> bool {
        self.companion
            .and_then(|c| peers.get(&c))
            .is_some_and(|peer| peer.state() <= DeviceState::Disconnected)
    }

    fn companion_autoconnect_allowed(&self, core: &DeviceCore) -> bool {
        !core.state.is_active()
    }

    fn on_added(&mut self, ctx: &mut DeviceContext<'_>) {
        self.registry_subs = vec![
            ctx.subscribe(Emitter::Registry, EventKind::DeviceAdded),
            ctx.subscribe(Emitter::Registry, EventKind::DeviceRemoved),
        ];
    }

    fn dispose(&mut self, ctx: &mut DeviceContext<'_>) {
        self.companion_cleanup(ctx);
        for sub in self.registry_subs.drain(..) {
            ctx.unsubscribe(sub);
        }
    }

    fn state_changed(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        new: DeviceState,
        _old: DeviceState,
        _reason: StateReason,
    ) {
        // the channel is only meaningful while the mesh holds the radio
        if new <= DeviceState::Disconnected && self.active_channel != 0 {
            self.active_channel = 0;
            ctx.notify(Property::ActiveChannel);
        }
        if new == DeviceState::Unavailable {
            self.find_companion(ctx);
        }
        self.sync_scan_prohibition(ctx);
    }

    fn on_event(&mut self, ctx: &mut DeviceContext<'_>, event: &Event) {
        match *event {
            Event::DeviceAdded { device } => {
                self.check_companion(ctx, device);
            }
            Event::DeviceRemoved { device } if self.companion == Some(device) => {
                self.companion_cleanup(ctx);
            }
            Event::StateChanged {
                device, new, old, ..
            } if self.companion == Some(device) => {
                self.companion_state_changed(ctx, new, old);
            }
            Event::PropertyChanged { device, property } if self.companion == Some(device) => {
                self.companion_property_changed(ctx, property);
            }
            _ => {}
        }
    }

    fn act_stage1_prepare(&mut self, ctx: &mut DeviceContext<'_>) -> StageReturn {
        let Some(companion) = self.companion else {
            error!("{}: activation without a companion device", ctx.iface());
            return StageReturn::Failure(StateReason::CompanionUnavailable);
        };
        let Some(peer) = ctx.peer(companion) else {
            error!("{}: companion device {} is gone", ctx.iface(), companion);
            return StageReturn::Failure(StateReason::CompanionUnavailable);
        };
        let peer_iface = peer.iface().to_string();

        // Disconnecting the companion here mixes pairing policy with
        // deactivation; it stays local to the mesh device.
        if peer.core.act_request.is_some() {
            info!("{}: disconnecting companion device {}", ctx.iface(), peer_iface);
            ctx.change_peer_state(companion, DeviceState::Disconnected, StateReason::UserRequested);
            info!("{}: companion device {} disconnected", ctx.iface(), peer_iface);
        }

        if ctx.peer(companion).is_some_and(|peer| peer.class.is_scanning()) {
            info!(
                "{}: companion device {} is scanning, postponing activation",
                ctx.iface(),
                peer_iface
            );
            self.stage1_waiting = true;
            return StageReturn::Postpone;
        }

        StageReturn::Success
    }

    fn act_stage2_config(&mut self, ctx: &mut DeviceContext<'_>) -> StageReturn {
        let Some(setting) = Self::mesh_setting(ctx.core).cloned() else {
            error!("{}: no mesh setting in the activation request", ctx.iface());
            return StageReturn::Failure(StateReason::ConfigFailed);
        };
        let platform = ctx.platform;
        let iface = ctx.core.iface.clone();
        let ssid = setting
            .ssid
            .unwrap_or_else(|| self.defaults.default_ssid.clone());

        if let Err(e) = platform.set_link_down(&iface) {
            warn!("{}: unable to take the link down: {}", iface, e);
        }

        let mut success = match platform.apply_identity(&iface, ssid.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: unable to set the mesh ID to '{}': {}", iface, ssid, e);
                false
            }
        };
        if success {
            success = self.apply_channel(ctx, setting.channel);
        }

        if let Err(e) = platform.set_link_up(&iface) {
            warn!("{}: unable to bring the link up: {}", iface, e);
        }

        if success {
            StageReturn::Success
        } else {
            StageReturn::Failure(StateReason::ConfigFailed)
        }
    }

    fn deactivate(&mut self, core: &mut DeviceCore) {
        if self.stage1_waiting {
            debug!("{}: dropping wait for the companion scan", core.iface);
            self.stage1_waiting = false;
        }
    }

    fn dhcp_timeout(&self) -> Option<u32> {
        Some(self.defaults.dhcp_timeout_secs)
    }

    fn dhcp_anycast_address(&self, core: &DeviceCore) -> Option<String> {
        Self::mesh_setting(core).and_then(|s| s.dhcp_anycast_address.clone())
    }

    fn variant_properties(&self, _core: &DeviceCore, peers: &DeviceTable) -> Result<VariantProperties> {
        let companion = match self.companion.filter(|c| peers.contains_key(c)) {
            Some(id) => id.dbus_path()?,
            None => null_object_path()?,
        };
        Ok(VariantProperties::OlpcMesh {
            companion,
            active_channel: self.active_channel,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
