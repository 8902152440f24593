// linkd - Device Manager
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! The device registry and activation driver.
//!
//! [`DeviceManager`] owns every device, the subscription hub and the
//! dispatch queue. Each public entry point takes `&mut self`, performs its
//! change and then drains the queue, so callers observe every consequence
//! of an operation before it returns.
//!
//! A hook runs with its device taken out of the table: the device sees its
//! own core mutably and every other device through its context.

pub mod dispatch;
pub mod events;
mod wifi;

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use zbus::zvariant::OwnedObjectPath;

use crate::device::{
    self, ActivationRequest, Device, DeviceClass, DeviceContext, DeviceCore, DeviceId,
    DeviceTable, OlpcMeshClass, Stage, VariantProperties,
};
use crate::models::config::MeshConfig;
use crate::models::validation::{parse_hw_address, validate_interface_name};
use crate::models::{
    Connection, DaemonConfig, DeviceState, DeviceType, Error, Result, StateReason,
};
use crate::platform::Platform;
use dispatch::{Dispatch, DispatchQueue};
use events::{Emitter, Event, EventKind, SignalHub, Subscriber, SubscriptionId, Target};

/// Snapshot of a device for the IPC layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceProperties {
    pub path: OwnedObjectPath,
    pub interface: String,
    pub hw_address: String,
    pub device_type: DeviceType,
    pub type_description: &'static str,
    pub state: DeviceState,
    pub state_reason: StateReason,
    pub capabilities: u32,
    pub carrier: bool,
    pub available: bool,
    pub autoconnect: bool,
    pub pending_actions: Vec<String>,
    pub active_connection: Option<String>,
    pub variant: VariantProperties,
}

/// Registry of managed devices.
pub struct DeviceManager {
    devices: DeviceTable,
    hub: SignalHub,
    queue: DispatchQueue,
    platform: Box<dyn Platform>,
    mesh_defaults: MeshConfig,
    default_dhcp_timeout: u32,
    next_id: u32,
    auto_activate: BTreeSet<DeviceId>,
}

impl DeviceManager {
    pub fn new(platform: Box<dyn Platform>, config: &DaemonConfig) -> Self {
        Self {
            devices: DeviceTable::new(),
            hub: SignalHub::new(),
            queue: DispatchQueue::new(),
            platform,
            mesh_defaults: config.mesh.clone(),
            default_dhcp_timeout: config.ip.dhcp_timeout_secs,
            next_id: 0,
            auto_activate: BTreeSet::new(),
        }
    }

    // ========================================
    // Registry
    // ========================================

    /// Register a new interface. The device starts `Unavailable` and moves
    /// on once its variant reports it available.
    pub fn add_device(
        &mut self,
        iface: &str,
        hw_address: &str,
        device_type: DeviceType,
    ) -> Result<DeviceId> {
        let iface = validate_interface_name(iface)?;
        if parse_hw_address(hw_address).is_none() {
            return Err(Error::InvalidMacAddress(hw_address.to_string()));
        }
        if let Some(existing) = self.find_by_iface(&iface) {
            warn!("{}: already managed as device {}", iface, existing);
            return Ok(existing);
        }

        self.next_id += 1;
        let id = DeviceId::new(self.next_id);
        let core = DeviceCore::new(id, &iface, hw_address);
        let class = device::class_for(device_type, &self.mesh_defaults);
        info!("{}: new {} device ({})", iface, class.type_description(), hw_address);

        self.devices.insert(id, Device::new(core, class));
        self.with_device(id, |class, ctx| class.on_added(ctx));
        self.queue.push(Dispatch::Signal(Event::DeviceAdded { device: id }));
        self.change_state(id, DeviceState::Unavailable, StateReason::NowManaged);
        self.queue.push(Dispatch::RecheckAvailable {
            device: id,
            reason: StateReason::None,
        });
        self.run_queue();
        Ok(id)
    }

    /// Unregister a device. Subscribers see `DeviceRemoved` while the device
    /// still exists; afterwards nothing of it remains in the hub or queue.
    pub fn remove_device(&mut self, id: DeviceId) -> Result<()> {
        let iface = self.device_ref(id)?.iface().to_string();
        info!("{}: removing device", iface);

        self.deliver(&Event::DeviceRemoved { device: id });
        self.with_device(id, |class, ctx| class.dispose(ctx));

        let subs = self.hub.remove_device(id);
        let purged = self.queue.purge(id);
        debug!(
            "{}: dropped {} subscription(s) and {} queued item(s)",
            iface, subs, purged
        );

        self.devices.remove(&id);
        self.auto_activate.remove(&id);
        self.run_queue();
        Ok(())
    }

    /// Remove every device, newest first.
    pub fn remove_all(&mut self) {
        let ids: Vec<DeviceId> = self.devices.keys().rev().copied().collect();
        for id in ids {
            if let Err(e) = self.remove_device(id) {
                warn!("Failed to remove device {}: {}", id, e);
            }
        }
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }

    pub fn find_by_iface(&self, iface: &str) -> Option<DeviceId> {
        self.devices
            .values()
            .find(|device| device.iface() == iface)
            .map(Device::id)
    }

    fn device_ref(&self, id: DeviceId) -> Result<&Device> {
        self.devices
            .get(&id)
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))
    }

    // ========================================
    // Device contract
    // ========================================

    /// Start activating `connection`. Problems surface as state
    /// transitions; only an unknown device is an error.
    pub fn activate(
        &mut self,
        id: DeviceId,
        connection: Connection,
        user_requested: bool,
    ) -> Result<()> {
        let device = self.device_ref(id)?;
        let state = device.state();

        if state < DeviceState::Disconnected {
            warn!(
                "{}: cannot activate '{}', device is {}",
                device.iface(),
                connection.name,
                state
            );
            return Ok(());
        }

        if state > DeviceState::Disconnected {
            info!("{}: replacing the current activation", device.iface());
            self.change_state(id, DeviceState::Disconnected, StateReason::NewActivation);
            self.run_queue();

            let device = self.device_ref(id)?;
            if device.state() != DeviceState::Disconnected {
                warn!(
                    "{}: cannot activate '{}', device is {}",
                    device.iface(),
                    connection.name,
                    device.state()
                );
                return Ok(());
            }
        }

        let Some(device) = self.devices.get_mut(&id) else {
            return Err(Error::DeviceNotFound(id.to_string()));
        };
        let mut connection = connection;
        device.class.complete_connection(&mut connection);
        let compatible = device
            .class
            .check_connection_compatible(&device.core, &connection);

        info!(
            "{}: activating '{}' ({})",
            device.iface(),
            connection.name,
            if user_requested { "user request" } else { "automatic" }
        );
        if !compatible {
            warn!(
                "{}: connection '{}' is not compatible with the device",
                device.iface(),
                connection.name
            );
        }
        device.core.act_request = Some(ActivationRequest::new(connection, user_requested));

        if compatible {
            self.change_state(id, DeviceState::Prepare, StateReason::None);
            self.queue.push(Dispatch::Stage {
                device: id,
                stage: Stage::Prepare,
            });
        } else {
            self.change_state(id, DeviceState::Failed, StateReason::ConnectionIncompatible);
        }

        self.run_queue();
        Ok(())
    }

    /// Return the device to `Disconnected`. Idempotent.
    pub fn deactivate(&mut self, id: DeviceId) -> Result<()> {
        let device = self.device_ref(id)?;
        if device.state() <= DeviceState::Disconnected {
            debug!("{}: deactivate on inactive device ({})", device.iface(), device.state());
            return Ok(());
        }

        self.change_state(id, DeviceState::Disconnected, StateReason::UserRequested);
        self.run_queue();
        Ok(())
    }

    pub fn state(&self, id: DeviceId) -> Result<DeviceState> {
        Ok(self.device_ref(id)?.state())
    }

    pub fn is_available(&self, id: DeviceId) -> Result<bool> {
        Ok(self.device_ref(id)?.is_available())
    }

    /// Whether the device may activate without a user request. Devices
    /// watching it through `AutoconnectAllowed` can veto.
    pub fn is_autoconnect_allowed(&self, id: DeviceId) -> Result<bool> {
        let device = self.device_ref(id)?;
        if !device.core.autoconnect || !device.is_available() {
            return Ok(false);
        }
        if !device.class.get_autoconnect_allowed(&device.core, &self.devices) {
            return Ok(false);
        }

        for watcher in self
            .hub
            .device_subscribers(Emitter::Device(id), EventKind::AutoconnectAllowed)
        {
            if let Some(peer) = self.devices.get(&watcher) {
                if !peer.class.companion_autoconnect_allowed(&peer.core) {
                    debug!("{}: autoconnect blocked by {}", device.iface(), peer.iface());
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    pub fn set_autoconnect(&mut self, id: DeviceId, autoconnect: bool) -> Result<()> {
        let device = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))?;
        device.core.autoconnect = autoconnect;
        Ok(())
    }

    /// Whether `connection` could be activated on the device once completed.
    pub fn check_connection(&self, id: DeviceId, connection: &Connection) -> Result<bool> {
        let device = self.device_ref(id)?;
        let mut completed = connection.clone();
        device.class.complete_connection(&mut completed);
        Ok(device.class.check_connection_compatible(&device.core, &completed))
    }

    /// Carrier report from the platform.
    pub fn set_carrier(&mut self, id: DeviceId, carrier: bool) -> Result<()> {
        let device = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))?;
        if device.core.carrier == carrier {
            return Ok(());
        }

        info!("{}: carrier is {}", device.iface(), if carrier { "ON" } else { "OFF" });
        device.core.carrier = carrier;
        self.queue
            .push(Dispatch::Signal(Event::CarrierChanged { device: id, carrier }));
        self.queue.push(Dispatch::RecheckAvailable {
            device: id,
            reason: StateReason::Carrier,
        });
        self.run_queue();
        Ok(())
    }

    /// Companion of a mesh device.
    pub fn companion_of(&self, id: DeviceId) -> Option<DeviceId> {
        self.devices
            .get(&id)?
            .class
            .as_any()
            .downcast_ref::<OlpcMeshClass>()?
            .companion()
    }

    /// Devices that asked for an auto-activation re-evaluation since the
    /// last call.
    pub fn take_auto_activate_requests(&mut self) -> Vec<DeviceId> {
        std::mem::take(&mut self.auto_activate).into_iter().collect()
    }

    // ========================================
    // IPC boundary
    // ========================================

    pub fn properties(&self, id: DeviceId) -> Result<DeviceProperties> {
        let device = self.device_ref(id)?;
        let core = &device.core;
        Ok(DeviceProperties {
            path: id.dbus_path()?,
            interface: core.iface.clone(),
            hw_address: core.hw_address.clone(),
            device_type: device.device_type(),
            type_description: device.class.type_description(),
            state: core.state,
            state_reason: core.state_reason,
            capabilities: device.capabilities().bits(),
            carrier: core.carrier,
            available: device.is_available(),
            autoconnect: core.autoconnect,
            pending_actions: core.pending.iter().map(str::to_string).collect(),
            active_connection: core.connection().map(|c| c.name.clone()),
            variant: device.class.variant_properties(core, &self.devices)?,
        })
    }

    pub fn snapshot(&self) -> Result<Vec<DeviceProperties>> {
        self.devices.keys().map(|id| self.properties(*id)).collect()
    }

    /// Watch events from outside the device graph.
    pub fn subscribe(
        &mut self,
        emitter: Emitter,
        kind: EventKind,
        callback: impl FnMut(&Event) + 'static,
    ) -> SubscriptionId {
        self.hub
            .subscribe(emitter, kind, Subscriber::Observer(Box::new(callback)))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    // ========================================
    // Dispatch
    // ========================================

    /// Run `f` on a device's class with a context over everything else.
    pub(crate) fn with_device<R>(
        &mut self,
        id: DeviceId,
        f: impl FnOnce(&mut dyn DeviceClass, &mut DeviceContext<'_>) -> R,
    ) -> Option<R> {
        let mut device = self.devices.remove(&id)?;
        let result = {
            let Device { core, class } = &mut device;
            let mut ctx = DeviceContext {
                core,
                peers: &mut self.devices,
                hub: &mut self.hub,
                queue: &mut self.queue,
                platform: &*self.platform,
                default_dhcp_timeout: self.default_dhcp_timeout,
            };
            f(class.as_mut(), &mut ctx)
        };
        self.devices.insert(id, device);
        Some(result)
    }

    fn change_state(&mut self, id: DeviceId, state: DeviceState, reason: StateReason) -> bool {
        match self.devices.get_mut(&id) {
            Some(device) => {
                let Device { core, class } = device;
                dispatch::transition(core, class.as_mut(), state, reason, &mut self.queue)
            }
            None => false,
        }
    }

    fn run_queue(&mut self) {
        while let Some(item) = self.queue.pop() {
            match item {
                Dispatch::Signal(event) => self.deliver(&event),
                Dispatch::Stage { device, stage } => self.run_stage(device, stage),
                Dispatch::Transition {
                    device,
                    state,
                    reason,
                } => {
                    self.change_state(device, state, reason);
                }
                Dispatch::RecheckAvailable { device, reason } => {
                    self.recheck_available(device, reason)
                }
                Dispatch::RecheckAutoActivate(device) => {
                    if self.devices.contains_key(&device) {
                        self.auto_activate.insert(device);
                    }
                }
            }
        }
    }

    /// Own hook first for state changes, then subscribers in order.
    fn deliver(&mut self, event: &Event) {
        if let Event::StateChanged {
            device,
            new,
            old,
            reason,
        } = *event
        {
            self.with_device(device, |class, ctx| class.state_changed(ctx, new, old, reason));
        }

        for sub in self.hub.matching(event.emitter(), event.kind()) {
            match self.hub.target(sub) {
                Some(Target::Device(target)) => {
                    self.with_device(target, |class, ctx| class.on_event(ctx, event));
                }
                Some(Target::Observer) => self.hub.notify_observer(sub, event),
                None => debug!("{} withdrawn before delivery of {:?}", sub, event.kind()),
            }
        }
    }

    fn run_stage(&mut self, id: DeviceId, stage: Stage) {
        let Some(device) = self.devices.get(&id) else {
            return;
        };
        if device.core.act_request.is_none() || device.state() != stage.state() {
            debug!(
                "{}: ignoring stale {} in state {}",
                device.iface(),
                stage.as_str(),
                device.state()
            );
            return;
        }
        debug!("{}: running {}", device.iface(), stage.as_str());

        let Some(result) = self.with_device(id, |class, ctx| match stage {
            Stage::Prepare => class.act_stage1_prepare(ctx),
            Stage::Config => class.act_stage2_config(ctx),
            Stage::IpConfig => class.act_stage3_ip_config(ctx),
        }) else {
            return;
        };

        if let Some(device) = self.devices.get_mut(&id) {
            let Device { core, class } = device;
            dispatch::stage_finished(core, class.as_mut(), stage, result, &mut self.queue);
        }
    }

    fn recheck_available(&mut self, id: DeviceId, reason: StateReason) {
        let Some(device) = self.devices.get(&id) else {
            return;
        };
        let available = device.is_available();
        let state = device.state();

        if available && state == DeviceState::Unavailable {
            self.change_state(id, DeviceState::Disconnected, StateReason::None);
            self.queue.push(Dispatch::RecheckAutoActivate(id));
        } else if !available
            && state >= DeviceState::Disconnected
            && state != DeviceState::Failed
        {
            self.change_state(id, DeviceState::Unavailable, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::WAITING_FOR_COMPANION;
    use crate::models::{OlpcMeshSetting, WirelessSetting};
    use crate::platform::{MemoryPlatform, PlatformOp};
    use std::cell::RefCell;
    use std::rc::Rc;

    const HW: &str = "AA:AA:AA:AA:AA:AA";

    struct Harness {
        manager: DeviceManager,
        platform: Rc<MemoryPlatform>,
        events: Rc<RefCell<Vec<Event>>>,
    }

    impl Harness {
        fn new() -> Self {
            let platform = Rc::new(MemoryPlatform::new());
            let mut manager =
                DeviceManager::new(Box::new(Rc::clone(&platform)), &DaemonConfig::default());
            let events = Rc::new(RefCell::new(Vec::new()));
            for kind in [EventKind::StateChanged, EventKind::PropertyChanged] {
                let sink = Rc::clone(&events);
                manager.subscribe(Emitter::Any, kind, move |e| sink.borrow_mut().push(e.clone()));
            }
            Self {
                manager,
                platform,
                events,
            }
        }

        /// Mesh device bound to a Wi-Fi companion, both `Disconnected`.
        fn paired() -> (Self, DeviceId, DeviceId) {
            let mut h = Self::new();
            let wifi = h.manager.add_device("wlan0", HW, DeviceType::Wifi).unwrap();
            let mesh = h.manager.add_device("msh0", HW, DeviceType::OlpcMesh).unwrap();
            assert_eq!(h.manager.companion_of(mesh), Some(wifi));
            h.events.borrow_mut().clear();
            (h, mesh, wifi)
        }

        fn state(&self, id: DeviceId) -> DeviceState {
            self.manager.state(id).unwrap()
        }

        /// States entered by `id`, in order, since the last clear.
        fn states_of(&self, id: DeviceId) -> Vec<(DeviceState, StateReason)> {
            self.events
                .borrow()
                .iter()
                .filter_map(|e| match *e {
                    Event::StateChanged {
                        device,
                        new,
                        reason,
                        ..
                    } if device == id => Some((new, reason)),
                    _ => None,
                })
                .collect()
        }

        fn position(&self, id: DeviceId, state: DeviceState) -> Option<usize> {
            self.events.borrow().iter().position(|e| {
                matches!(*e, Event::StateChanged { device, new, .. } if device == id && new == state)
            })
        }

        fn mesh_class(&self, id: DeviceId) -> &OlpcMeshClass {
            self.manager
                .device(id)
                .and_then(|d| d.class.as_any().downcast_ref::<OlpcMeshClass>())
                .unwrap()
        }
    }

    fn mesh_connection(channel: u32) -> Connection {
        Connection::olpc_mesh(
            "Mesh",
            OlpcMeshSetting {
                channel,
                ..Default::default()
            },
        )
    }

    fn wifi_connection() -> Connection {
        Connection::wireless("School", WirelessSetting::open("school"))
    }

    use DeviceState::*;

    #[test]
    fn test_mesh_waits_for_companion() {
        let mut h = Harness::new();
        let mesh = h.manager.add_device("msh0", HW, DeviceType::OlpcMesh).unwrap();

        assert_eq!(h.state(mesh), Unavailable);
        let props = h.manager.properties(mesh).unwrap();
        assert_eq!(props.pending_actions, vec![WAITING_FOR_COMPANION.to_string()]);
        assert!(!props.available);

        // different hardware address: not a companion
        h.manager
            .add_device("wlan1", "BB:BB:BB:BB:BB:BB", DeviceType::Wifi)
            .unwrap();
        assert_eq!(h.state(mesh), Unavailable);

        let wifi = h
            .manager
            .add_device("wlan0", "aa-aa-aa-aa-aa-aa", DeviceType::Wifi)
            .unwrap();
        assert_eq!(h.manager.companion_of(mesh), Some(wifi));
        assert_eq!(h.state(mesh), Disconnected);
        assert!(h.manager.is_available(mesh).unwrap());
        let props = h.manager.properties(mesh).unwrap();
        assert!(props.pending_actions.is_empty());
        assert_eq!(
            props.variant,
            VariantProperties::OlpcMesh {
                companion: wifi.dbus_path().unwrap(),
                active_channel: 0,
            }
        );
        assert!(h.manager.take_auto_activate_requests().contains(&mesh));
    }

    #[test]
    fn test_mesh_binds_existing_companion() {
        let (h, mesh, _wifi) = Harness::paired();
        assert_eq!(h.state(mesh), Disconnected);
        assert_eq!(h.mesh_class(mesh).companion_subscriptions(), 3);
    }

    #[test]
    fn test_binding_is_exclusive() {
        let (mut h, mesh, wifi) = Harness::paired();
        let other = h.manager.add_device("wlan1", HW, DeviceType::Wifi).unwrap();
        assert_eq!(h.manager.companion_of(mesh), Some(wifi));

        let result = h
            .manager
            .with_device(mesh, |class, ctx| {
                class
                    .as_any_mut()
                    .downcast_mut::<OlpcMeshClass>()
                    .unwrap()
                    .bind_companion(ctx, other)
            })
            .unwrap();
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
        assert_eq!(h.manager.companion_of(mesh), Some(wifi));
        assert_eq!(h.mesh_class(mesh).companion_subscriptions(), 3);
    }

    #[test]
    fn test_mesh_activation_succeeds() {
        let (mut h, mesh, _wifi) = Harness::paired();
        h.manager.activate(mesh, mesh_connection(6), true).unwrap();

        assert_eq!(h.state(mesh), Activated);
        assert_eq!(
            h.states_of(mesh),
            vec![
                (Prepare, StateReason::None),
                (Config, StateReason::None),
                (IpConfig, StateReason::None),
                (Activated, StateReason::None),
            ]
        );
        assert_eq!(h.platform.identity("msh0"), b"olpc-mesh".to_vec());
        assert_eq!(h.platform.channel("msh0"), 6);
        assert!(h.platform.ops_for("msh0").contains(&PlatformOp::StartIpConfig));
        assert!(h.events.borrow().contains(&Event::PropertyChanged {
            device: mesh,
            property: events::Property::ActiveChannel,
        }));
        assert_eq!(h.mesh_class(mesh).active_channel(), 6);
    }

    #[test]
    fn test_mesh_channel_zero_keeps_current() {
        let (mut h, mesh, _wifi) = Harness::paired();
        h.platform.set_channel("msh0", 11);
        h.manager.activate(mesh, mesh_connection(0), true).unwrap();

        assert_eq!(h.state(mesh), Activated);
        assert_eq!(h.platform.channel("msh0"), 11);
        assert_eq!(h.mesh_class(mesh).active_channel(), 11);
        assert!(!h.events.borrow().contains(&Event::PropertyChanged {
            device: mesh,
            property: events::Property::ActiveChannel,
        }));
    }

    #[test]
    fn test_activation_disconnects_active_companion() {
        let (mut h, mesh, wifi) = Harness::paired();
        h.manager.activate(wifi, wifi_connection(), true).unwrap();
        assert_eq!(h.state(wifi), Activated);

        h.manager.activate(mesh, mesh_connection(1), true).unwrap();
        assert_eq!(h.state(wifi), Disconnected);
        assert_eq!(h.state(mesh), Activated);

        let wifi_down = h.position(wifi, Disconnected).unwrap();
        let mesh_config = h.position(mesh, Config).unwrap();
        assert!(wifi_down < mesh_config);
        assert_eq!(
            h.states_of(wifi).last(),
            Some(&(Disconnected, StateReason::UserRequested))
        );
    }

    #[test]
    fn test_prepare_postponed_while_companion_scans() {
        let (mut h, mesh, wifi) = Harness::paired();
        h.manager.set_scanning(wifi, true).unwrap();

        h.manager.activate(mesh, mesh_connection(1), true).unwrap();
        assert_eq!(h.state(mesh), Prepare);
        assert!(h.mesh_class(mesh).stage1_waiting());
        assert!(h.platform.ops_for("msh0").is_empty());

        // an unrelated property change does not resume
        h.manager.set_carrier(wifi, true).unwrap();
        assert_eq!(h.state(mesh), Prepare);

        h.manager.set_scanning(wifi, false).unwrap();
        assert!(!h.mesh_class(mesh).stage1_waiting());
        assert_eq!(h.state(mesh), Activated);
        let prepares = h.states_of(mesh).iter().filter(|(s, _)| *s == Prepare).count();
        assert_eq!(prepares, 1);
    }

    #[test]
    fn test_scan_prohibited_while_mesh_activates() {
        let (mut h, mesh, wifi) = Harness::paired();
        assert!(h.manager.request_scan(wifi).unwrap());
        h.manager.set_scanning(wifi, true).unwrap();

        h.manager.activate(mesh, mesh_connection(1), true).unwrap();
        assert_eq!(h.state(mesh), Prepare);
        assert!(!h.manager.request_scan(wifi).unwrap());

        h.manager.set_scanning(wifi, false).unwrap();
        assert_eq!(h.state(mesh), Activated);
        // only an activation in progress holds the prohibition
        assert!(h.manager.request_scan(wifi).unwrap());
    }

    #[test]
    fn test_config_failure_still_brings_link_up() {
        let (mut h, mesh, _wifi) = Harness::paired();
        h.platform.fail_on(PlatformOp::ApplyChannel);
        h.manager.activate(mesh, mesh_connection(6), true).unwrap();

        assert_eq!(
            h.platform.ops_for("msh0"),
            vec![
                PlatformOp::LinkDown,
                PlatformOp::ApplyIdentity,
                PlatformOp::ApplyChannel,
                PlatformOp::LinkUp,
            ]
        );
        assert!(h.platform.is_up("msh0"));
        assert_eq!(
            h.states_of(mesh),
            vec![
                (Prepare, StateReason::None),
                (Config, StateReason::None),
                (Failed, StateReason::ConfigFailed),
                (Disconnected, StateReason::ConfigFailed),
            ]
        );
        assert!(h.manager.device(mesh).unwrap().core.act_request.is_none());
    }

    #[test]
    fn test_identity_failure_skips_channel() {
        let (mut h, mesh, _wifi) = Harness::paired();
        h.platform.fail_on(PlatformOp::ApplyIdentity);
        h.manager.activate(mesh, mesh_connection(6), true).unwrap();

        let ops = h.platform.ops_for("msh0");
        assert!(!ops.contains(&PlatformOp::ApplyChannel));
        assert_eq!(ops.last(), Some(&PlatformOp::LinkUp));
        assert_eq!(h.state(mesh), Disconnected);
    }

    #[test]
    fn test_companion_activation_disconnects_mesh() {
        let (mut h, mesh, wifi) = Harness::paired();
        h.manager.activate(mesh, mesh_connection(1), true).unwrap();
        assert_eq!(h.state(mesh), Activated);
        h.events.borrow_mut().clear();

        h.manager.activate(wifi, wifi_connection(), true).unwrap();
        assert_eq!(h.state(mesh), Disconnected);
        assert_eq!(h.state(wifi), Activated);
        assert_eq!(
            h.states_of(mesh),
            vec![(Disconnected, StateReason::UserRequested)]
        );
        assert!(h.position(wifi, Prepare).unwrap() < h.position(mesh, Disconnected).unwrap());
    }

    #[test]
    fn test_companion_removal_unbinds() {
        let (mut h, mesh, wifi) = Harness::paired();
        h.manager.activate(mesh, mesh_connection(1), true).unwrap();
        assert_eq!(h.state(mesh), Activated);

        h.events.borrow_mut().clear();
        h.manager.remove_device(wifi).unwrap();

        assert_eq!(h.manager.companion_of(mesh), None);
        assert_eq!(h.mesh_class(mesh).companion_subscriptions(), 0);
        assert_eq!(h.manager.hub.count_for_emitter(Emitter::Device(wifi)), 0);
        assert_eq!(h.state(mesh), Unavailable);
        assert_eq!(
            h.manager.device(mesh).unwrap().core.state_reason,
            StateReason::CompanionUnavailable
        );

        let props = h.manager.properties(mesh).unwrap();
        assert_eq!(props.pending_actions, vec![WAITING_FOR_COMPANION.to_string()]);
        assert_eq!(
            props.variant,
            VariantProperties::OlpcMesh {
                companion: device::null_object_path().unwrap(),
                active_channel: 0,
            }
        );

        assert!(h.manager.set_scanning(wifi, true).is_err());
        assert!(h.events.borrow().iter().all(|e| e.device() != wifi));
        assert!(h.events.borrow().contains(&Event::PropertyChanged {
            device: mesh,
            property: events::Property::Companion,
        }));

        // a new radio with the same address is picked up again
        let again = h.manager.add_device("wlan0", HW, DeviceType::Wifi).unwrap();
        assert_eq!(h.manager.companion_of(mesh), Some(again));
        assert_eq!(h.state(mesh), Disconnected);
    }

    #[test]
    fn test_mesh_removal_releases_companion() {
        let (mut h, mesh, wifi) = Harness::paired();
        h.manager.set_scanning(wifi, true).unwrap();
        h.manager.activate(mesh, mesh_connection(1), true).unwrap();
        assert!(!h.manager.request_scan(wifi).unwrap());

        h.manager.remove_device(mesh).unwrap();
        assert_eq!(h.manager.hub.count_for_subscriber(mesh), 0);
        assert!(h.manager.is_autoconnect_allowed(wifi).unwrap());
        h.manager.set_scanning(wifi, false).unwrap();
        assert!(h.manager.request_scan(wifi).unwrap());
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let (mut h, mesh, _wifi) = Harness::paired();
        h.manager.activate(mesh, mesh_connection(1), true).unwrap();

        h.manager.deactivate(mesh).unwrap();
        let after_first = h.states_of(mesh).len();
        h.manager.deactivate(mesh).unwrap();

        assert_eq!(h.state(mesh), Disconnected);
        assert_eq!(h.states_of(mesh).len(), after_first);
        assert_eq!(
            h.states_of(mesh).last(),
            Some(&(Disconnected, StateReason::UserRequested))
        );
    }

    #[test]
    fn test_active_channel_cleared_on_deactivation() {
        let (mut h, mesh, _wifi) = Harness::paired();
        h.manager.activate(mesh, mesh_connection(6), true).unwrap();
        assert_eq!(h.mesh_class(mesh).active_channel(), 6);
        h.events.borrow_mut().clear();

        h.manager.deactivate(mesh).unwrap();
        assert_eq!(h.mesh_class(mesh).active_channel(), 0);
        assert!(h.events.borrow().contains(&Event::PropertyChanged {
            device: mesh,
            property: events::Property::ActiveChannel,
        }));
        assert!(matches!(
            h.manager.properties(mesh).unwrap().variant,
            VariantProperties::OlpcMesh { active_channel: 0, .. }
        ));
    }

    #[test]
    fn test_active_channel_cleared_after_failed_activation() {
        let (mut h, mesh, _wifi) = Harness::paired();
        h.platform.fail_on(PlatformOp::StartIpConfig);
        h.manager.activate(mesh, mesh_connection(11), true).unwrap();

        assert_eq!(h.state(mesh), Disconnected);
        assert!(h.states_of(mesh).iter().any(|(s, _)| *s == Failed));
        assert_eq!(h.mesh_class(mesh).active_channel(), 0);
    }

    #[test]
    fn test_deactivate_while_postponed() {
        let (mut h, mesh, wifi) = Harness::paired();
        h.manager.set_scanning(wifi, true).unwrap();
        h.manager.activate(mesh, mesh_connection(1), true).unwrap();
        assert_eq!(h.state(mesh), Prepare);

        h.manager.deactivate(mesh).unwrap();
        assert!(!h.mesh_class(mesh).stage1_waiting());
        assert!(h.manager.device(mesh).unwrap().core.postponed.is_none());

        h.manager.set_scanning(wifi, false).unwrap();
        assert_eq!(h.state(mesh), Disconnected);
        assert!(h.platform.ops_for("msh0").is_empty());
    }

    #[test]
    fn test_autoconnect_exclusion() {
        let (mut h, mesh, wifi) = Harness::paired();
        assert!(h.manager.is_autoconnect_allowed(mesh).unwrap());
        assert!(h.manager.is_autoconnect_allowed(wifi).unwrap());

        h.manager.activate(mesh, mesh_connection(1), true).unwrap();
        assert!(!h.manager.is_autoconnect_allowed(wifi).unwrap());

        h.manager.activate(wifi, wifi_connection(), true).unwrap();
        assert_eq!(h.state(mesh), Disconnected);
        assert!(!h.manager.is_autoconnect_allowed(mesh).unwrap());
        h.manager.take_auto_activate_requests();

        h.manager.deactivate(wifi).unwrap();
        assert!(h.manager.is_autoconnect_allowed(mesh).unwrap());
        assert!(h.manager.take_auto_activate_requests().contains(&mesh));
    }

    #[test]
    fn test_autoconnect_flag() {
        let (mut h, mesh, _wifi) = Harness::paired();
        h.manager.set_autoconnect(mesh, false).unwrap();
        assert!(!h.manager.is_autoconnect_allowed(mesh).unwrap());
        assert!(!h.manager.properties(mesh).unwrap().autoconnect);

        h.manager.set_autoconnect(mesh, true).unwrap();
        assert!(h.manager.is_autoconnect_allowed(mesh).unwrap());
    }

    #[test]
    fn test_ethernet_carrier_availability() {
        let mut h = Harness::new();
        let eth = h
            .manager
            .add_device("eth0", "00:11:22:33:44:55", DeviceType::Ethernet)
            .unwrap();
        assert_eq!(h.state(eth), Unavailable);

        // activation of an unavailable device is refused
        h.manager.activate(eth, Connection::wired("Wired"), true).unwrap();
        assert_eq!(h.state(eth), Unavailable);

        h.manager.set_carrier(eth, true).unwrap();
        assert_eq!(h.state(eth), Disconnected);
        assert_eq!(h.manager.take_auto_activate_requests(), vec![eth]);

        h.manager.activate(eth, Connection::wired("Wired"), false).unwrap();
        assert_eq!(h.state(eth), Activated);

        h.manager.set_carrier(eth, false).unwrap();
        assert_eq!(h.state(eth), Unavailable);
        assert_eq!(
            h.states_of(eth).last(),
            Some(&(Unavailable, StateReason::Carrier))
        );
    }

    #[test]
    fn test_incompatible_connection_fails() {
        let mut h = Harness::new();
        let eth = h
            .manager
            .add_device("eth0", "00:11:22:33:44:55", DeviceType::Ethernet)
            .unwrap();
        h.manager.set_carrier(eth, true).unwrap();
        h.events.borrow_mut().clear();

        h.manager.activate(eth, mesh_connection(1), true).unwrap();
        assert_eq!(
            h.states_of(eth),
            vec![
                (Failed, StateReason::ConnectionIncompatible),
                (Disconnected, StateReason::ConnectionIncompatible),
            ]
        );
    }

    #[test]
    fn test_reactivation_replaces_current() {
        let mut h = Harness::new();
        let eth = h
            .manager
            .add_device("eth0", "00:11:22:33:44:55", DeviceType::Ethernet)
            .unwrap();
        h.manager.set_carrier(eth, true).unwrap();
        h.manager.activate(eth, Connection::wired("First"), true).unwrap();
        h.events.borrow_mut().clear();

        h.manager.activate(eth, Connection::wired("Second"), true).unwrap();
        assert_eq!(
            h.states_of(eth).first(),
            Some(&(Disconnected, StateReason::NewActivation))
        );
        assert_eq!(h.state(eth), Activated);
        let props = h.manager.properties(eth).unwrap();
        assert_eq!(props.active_connection.as_deref(), Some("Second"));
    }

    #[test]
    fn test_unknown_device_is_an_error() {
        let mut h = Harness::new();
        let ghost = DeviceId::new(99);
        assert!(matches!(
            h.manager.activate(ghost, Connection::wired("Wired"), true),
            Err(Error::DeviceNotFound(_))
        ));
        assert!(h.manager.deactivate(ghost).is_err());
        assert!(h.manager.remove_device(ghost).is_err());
    }

    #[test]
    fn test_add_device_validates_input() {
        let mut h = Harness::new();
        assert!(h.manager.add_device("bad/if", HW, DeviceType::Wifi).is_err());
        assert!(h.manager.add_device("wlan0", "nonsense", DeviceType::Wifi).is_err());

        let first = h.manager.add_device("wlan0", HW, DeviceType::Wifi).unwrap();
        let second = h.manager.add_device("wlan0", HW, DeviceType::Wifi).unwrap();
        assert_eq!(first, second);
        assert_eq!(h.manager.device_ids().len(), 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let (h, _mesh, _wifi) = Harness::paired();
        let snapshot = h.manager.snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json[1]["variant"]["kind"], "olpc-mesh");
        assert_eq!(json[1]["state"], "disconnected");
    }

    #[test]
    fn test_remove_all() {
        let (mut h, _mesh, _wifi) = Harness::paired();
        h.manager.remove_all();
        assert!(h.manager.device_ids().is_empty());
        // only the external observers remain
        assert_eq!(h.manager.hub.len(), 2);
    }
}
