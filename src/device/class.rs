// linkd - Device Class Interface
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! The contract every device variant implements, and the context handed to
//! its hooks.
//!
//! Hooks run on the single control thread. A hook sees its own
//! [`DeviceCore`] and, through the [`DeviceContext`], its peers, the
//! subscription hub, the dispatch queue and the platform adapter. Anything
//! a hook wants to happen later (a stage, an availability recheck, a
//! signal) goes through the queue.

use std::any::Any;
use serde::Serialize;
use tracing::{debug, warn};
use zbus::zvariant::OwnedObjectPath;

use super::{Device, DeviceCore, DeviceId, DeviceTable};
use crate::manager::dispatch::{self, Dispatch, DispatchQueue};
use crate::manager::events::{Emitter, Event, EventKind, Property, SignalHub, Subscriber, SubscriptionId};
use crate::models::{
    Connection, DeviceCapabilities, DeviceState, DeviceType, Result, StateReason,
};
use crate::platform::{IpConfigRequest, Platform};

/// Activation pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Prepare,
    Config,
    IpConfig,
}

impl Stage {
    /// State the device is in while this stage runs.
    pub fn state(&self) -> DeviceState {
        match self {
            Self::Prepare => DeviceState::Prepare,
            Self::Config => DeviceState::Config,
            Self::IpConfig => DeviceState::IpConfig,
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Prepare => Some(Self::Config),
            Self::Config => Some(Self::IpConfig),
            Self::IpConfig => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "stage1 (prepare)",
            Self::Config => "stage2 (config)",
            Self::IpConfig => "stage3 (ip-config)",
        }
    }
}

/// Result of one activation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageReturn {
    Success,
    Failure(StateReason),
    /// Preconditions not met yet; the stage is resumed by a later event.
    Postpone,
}

/// Variant-specific properties exported to the IPC layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VariantProperties {
    Ethernet,
    Wifi {
        scanning: bool,
        access_points: Vec<OwnedObjectPath>,
        active_access_point: Option<OwnedObjectPath>,
    },
    OlpcMesh {
        /// Companion device path, `/` when unbound.
        companion: OwnedObjectPath,
        active_channel: u32,
    },
}

/// What a hook can reach besides its own variant state.
pub struct DeviceContext<'a> {
    pub core: &'a mut DeviceCore,
    /// Every other registered device.
    pub peers: &'a mut DeviceTable,
    pub hub: &'a mut SignalHub,
    pub queue: &'a mut DispatchQueue,
    pub platform: &'a dyn Platform,
    /// DHCP timeout for variants without their own.
    pub default_dhcp_timeout: u32,
}

impl<'a> DeviceContext<'a> {
    pub fn id(&self) -> DeviceId {
        self.core.id
    }

    pub fn iface(&self) -> &str {
        &self.core.iface
    }

    pub fn state(&self) -> DeviceState {
        self.core.state
    }

    pub fn peer(&self, id: DeviceId) -> Option<&Device> {
        self.peers.get(&id)
    }

    pub fn peer_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.peers.get_mut(&id)
    }

    /// Peer ids in registry order.
    pub fn peer_ids(&self) -> Vec<DeviceId> {
        self.peers.keys().copied().collect()
    }

    /// Subscribe this device to `(emitter, kind)`.
    pub fn subscribe(&mut self, emitter: Emitter, kind: EventKind) -> SubscriptionId {
        self.hub
            .subscribe(emitter, kind, Subscriber::Device(self.core.id))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Emit a property change for this device.
    pub fn notify(&mut self, property: Property) {
        self.queue.push(Dispatch::Signal(Event::PropertyChanged {
            device: self.core.id,
            property,
        }));
    }

    pub fn add_pending(&mut self, action: &str) -> bool {
        let added = self.core.pending.add(action);
        if added {
            debug!("{}: add pending action '{}'", self.core.iface, action);
        } else {
            warn!("{}: pending action '{}' already added", self.core.iface, action);
        }
        added
    }

    pub fn remove_pending(&mut self, action: &str) -> bool {
        let removed = self.core.pending.remove(action);
        if removed {
            debug!("{}: remove pending action '{}'", self.core.iface, action);
        } else {
            warn!("{}: pending action '{}' not pending", self.core.iface, action);
        }
        removed
    }

    /// Re-schedule a postponed stage. Returns false if `stage` was not postponed.
    pub fn resume_postponed(&mut self, stage: Stage) -> bool {
        if self.core.postponed != Some(stage) {
            debug!(
                "{}: not resuming {}, postponed stage is {:?}",
                self.core.iface,
                stage.as_str(),
                self.core.postponed
            );
            return false;
        }
        self.core.postponed = None;
        self.queue.push(Dispatch::Stage {
            device: self.core.id,
            stage,
        });
        true
    }

    pub fn queue_recheck_available(&mut self, reason: StateReason) {
        self.queue.push(Dispatch::RecheckAvailable {
            device: self.core.id,
            reason,
        });
    }

    /// Ask orchestration to re-evaluate auto-activation of this device.
    pub fn recheck_auto_activate(&mut self) {
        self.queue.push(Dispatch::RecheckAutoActivate(self.core.id));
    }

    /// Transition this device right away. `class` is the caller's own variant.
    pub fn change_state(
        &mut self,
        class: &mut dyn DeviceClass,
        state: DeviceState,
        reason: StateReason,
    ) -> bool {
        dispatch::transition(self.core, class, state, reason, self.queue)
    }

    /// Transition a peer right away.
    pub fn change_peer_state(
        &mut self,
        id: DeviceId,
        state: DeviceState,
        reason: StateReason,
    ) -> bool {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                let Device { core, class } = peer;
                dispatch::transition(core, class.as_mut(), state, reason, self.queue)
            }
            None => false,
        }
    }
}

/// Per-variant behavior. Every hook has a default except the identity ones.
pub trait DeviceClass {
    fn device_type(&self) -> DeviceType;

    /// Setting name of connections this variant can activate.
    fn connection_type(&self) -> &'static str;

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::SUPPORTED
    }

    fn type_description(&self) -> &'static str {
        self.device_type().description()
    }

    fn check_connection_compatible(&self, core: &DeviceCore, connection: &Connection) -> bool {
        connection.setting_name() == self.connection_type()
            && connection.matches_interface(&core.iface)
    }

    /// Fill in what the profile leaves unspecified.
    fn complete_connection(&self, _connection: &mut Connection) {}

    /// Variant-specific availability; pending actions are checked separately.
    fn is_available(&self, _core: &DeviceCore) -> bool {
        true
    }

    fn get_autoconnect_allowed(&self, _core: &DeviceCore, _peers: &DeviceTable) -> bool {
        true
    }

    /// Answer for a peer this device watches: may that peer autoconnect?
    fn companion_autoconnect_allowed(&self, _core: &DeviceCore) -> bool {
        true
    }

    fn is_scanning(&self) -> bool {
        false
    }

    /// Hold or release a scan prohibition for `requester`. Returns true if
    /// the set of prohibitions changed.
    fn track_scan_prohibition(&mut self, _requester: DeviceId, _prohibited: bool) -> bool {
        false
    }

    /// Called once after the device entered the registry.
    fn on_added(&mut self, _ctx: &mut DeviceContext<'_>) {}

    /// Called once before the device leaves the registry.
    fn dispose(&mut self, _ctx: &mut DeviceContext<'_>) {}

    /// Own state change, run before subscribers see it.
    fn state_changed(
        &mut self,
        _ctx: &mut DeviceContext<'_>,
        _new: DeviceState,
        _old: DeviceState,
        _reason: StateReason,
    ) {
    }

    /// An event this device subscribed to.
    fn on_event(&mut self, _ctx: &mut DeviceContext<'_>, _event: &Event) {}

    fn act_stage1_prepare(&mut self, _ctx: &mut DeviceContext<'_>) -> StageReturn {
        StageReturn::Success
    }

    fn act_stage2_config(&mut self, _ctx: &mut DeviceContext<'_>) -> StageReturn {
        StageReturn::Success
    }

    fn act_stage3_ip_config(&mut self, ctx: &mut DeviceContext<'_>) -> StageReturn {
        let request = IpConfigRequest {
            dhcp_timeout: self.dhcp_timeout().unwrap_or(ctx.default_dhcp_timeout),
            dhcp_anycast_address: self.dhcp_anycast_address(ctx.core),
        };
        match ctx.platform.start_ip_config(&ctx.core.iface, &request) {
            Ok(()) => StageReturn::Success,
            Err(e) => {
                warn!("{}: unable to start IP configuration: {}", ctx.core.iface, e);
                StageReturn::Failure(StateReason::IpConfigUnavailable)
            }
        }
    }

    /// Tear down variant state when the device leaves an active state.
    fn deactivate(&mut self, _core: &mut DeviceCore) {}

    /// DHCP timeout in seconds, `None` for the configured default.
    fn dhcp_timeout(&self) -> Option<u32> {
        None
    }

    fn dhcp_anycast_address(&self, _core: &DeviceCore) -> Option<String> {
        None
    }

    fn variant_properties(&self, core: &DeviceCore, peers: &DeviceTable)
        -> Result<VariantProperties>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
