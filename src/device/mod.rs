// linkd - Devices
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Managed network devices.
//!
//! A [`Device`] is common lifecycle data ([`DeviceCore`]) plus a variant
//! implementation behind the [`DeviceClass`] trait. The manager owns every
//! device; variants only see their peers through a [`DeviceContext`].

pub mod class;
pub mod ethernet;
pub mod olpc_mesh;
pub mod pending;
pub mod wifi;

pub use class::{DeviceClass, DeviceContext, Stage, StageReturn, VariantProperties};
pub use ethernet::EthernetClass;
pub use olpc_mesh::OlpcMeshClass;
pub use pending::{PendingActions, WAITING_FOR_COMPANION};
pub use wifi::WifiClass;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use zbus::zvariant::OwnedObjectPath;

use crate::models::config::MeshConfig;
use crate::models::{
    Connection, DeviceCapabilities, DeviceState, DeviceType, Result, StateReason,
    DEVICE_PATH_PREFIX,
};

/// Registry-assigned device identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u32);

impl DeviceId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Object path under which the device is exported.
    pub fn dbus_path(&self) -> Result<OwnedObjectPath> {
        Ok(OwnedObjectPath::try_from(format!(
            "{}/{}",
            DEVICE_PATH_PREFIX, self.0
        ))?)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The object path meaning "no object".
pub fn null_object_path() -> Result<OwnedObjectPath> {
    Ok(OwnedObjectPath::try_from("/")?)
}

/// Connection currently being activated on a device.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    pub connection: Connection,
    pub user_requested: bool,
    pub started_at: DateTime<Utc>,
}

impl ActivationRequest {
    pub fn new(connection: Connection, user_requested: bool) -> Self {
        Self {
            connection,
            user_requested,
            started_at: Utc::now(),
        }
    }
}

/// Lifecycle data shared by every device variant.
#[derive(Debug, Clone)]
pub struct DeviceCore {
    pub id: DeviceId,
    pub iface: String,
    pub hw_address: String,
    pub state: DeviceState,
    pub state_reason: StateReason,
    pub carrier: bool,
    /// Autoconnect enabled for this device.
    pub autoconnect: bool,
    pub pending: PendingActions,
    pub act_request: Option<ActivationRequest>,
    /// Stage that returned `Postpone` and waits for an event.
    pub postponed: Option<Stage>,
}

impl DeviceCore {
    pub fn new(id: DeviceId, iface: &str, hw_address: &str) -> Self {
        Self {
            id,
            iface: iface.to_string(),
            hw_address: hw_address.to_uppercase(),
            state: DeviceState::Unknown,
            state_reason: StateReason::None,
            carrier: false,
            autoconnect: true,
            pending: PendingActions::new(),
            act_request: None,
            postponed: None,
        }
    }

    /// Connection of the current activation, if any.
    pub fn connection(&self) -> Option<&Connection> {
        self.act_request.as_ref().map(|req| &req.connection)
    }
}

/// A managed device.
pub struct Device {
    pub core: DeviceCore,
    pub class: Box<dyn DeviceClass>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("core", &self.core)
            .field("type", &self.class.device_type())
            .finish()
    }
}

impl Device {
    pub fn new(core: DeviceCore, class: Box<dyn DeviceClass>) -> Self {
        Self { core, class }
    }

    pub fn id(&self) -> DeviceId {
        self.core.id
    }

    pub fn iface(&self) -> &str {
        &self.core.iface
    }

    pub fn state(&self) -> DeviceState {
        self.core.state
    }

    pub fn device_type(&self) -> DeviceType {
        self.class.device_type()
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.class.capabilities()
    }

    /// Available for activation: the variant agrees and nothing is pending.
    pub fn is_available(&self) -> bool {
        self.class.is_available(&self.core) && !self.core.pending.blocks_availability()
    }
}

/// Devices by id, iterated in id order.
pub type DeviceTable = BTreeMap<DeviceId, Device>;

/// Variant implementation for a device type.
pub fn class_for(device_type: DeviceType, mesh: &MeshConfig) -> Box<dyn DeviceClass> {
    match device_type {
        DeviceType::Ethernet => Box::new(EthernetClass::new()),
        DeviceType::Wifi => Box::new(WifiClass::new()),
        DeviceType::OlpcMesh => Box::new(OlpcMeshClass::new(mesh.clone())),
    }
}
