// linkd - Ethernet Device
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Wired Ethernet devices: available while carrier is up, default stages.

use std::any::Any;

use super::class::{DeviceClass, VariantProperties};
use super::{DeviceCore, DeviceTable};
use crate::models::connection::SETTING_WIRED;
use crate::models::{DeviceCapabilities, DeviceType, Result};

#[derive(Debug, Default)]
pub struct EthernetClass;

impl EthernetClass {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceClass for EthernetClass {
    fn device_type(&self) -> DeviceType {
        DeviceType::Ethernet
    }

    fn connection_type(&self) -> &'static str {
        SETTING_WIRED
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::SUPPORTED | DeviceCapabilities::CARRIER_DETECT
    }

    fn is_available(&self, core: &DeviceCore) -> bool {
        core.carrier
    }

    fn variant_properties(&self, _core: &DeviceCore, _peers: &DeviceTable) -> Result<VariantProperties> {
        Ok(VariantProperties::Ethernet)
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
    use crate::device::DeviceId;
    use crate::models::Connection;

    #[test]
    fn test_carrier_decides_availability() {
        let class = EthernetClass::new();
        let mut core = DeviceCore::new(DeviceId::new(1), "eth0", "00:11:22:33:44:55");
        assert!(!class.is_available(&core));
        core.carrier = true;
        assert!(class.is_available(&core));
    }

    #[test]
    fn test_connection_compatibility() {
        let class = EthernetClass::new();
        let core = DeviceCore::new(DeviceId::new(1), "eth0", "00:11:22:33:44:55");
        assert!(class.check_connection_compatible(&core, &Connection::wired("Wired")));

        let mut pinned = Connection::wired("Dock");
        pinned.interface_name = Some("eth1".into());
        assert!(!class.check_connection_compatible(&core, &pinned));
        assert!(!class.check_connection_compatible(
            &core,
            &Connection::olpc_mesh("Mesh", Default::default())
        ));
    }
}
