// linkd - Auto-Activation Service
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Automatic activation of idle devices.
//!
//! Devices ask for re-evaluation when they become available or when a
//! companion releases the hardware. This service picks the first
//! autoconnect profile compatible with each such device and starts it,
//! giving up on a profile after a few failed attempts.

use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::DeviceId;
use crate::manager::DeviceManager;
use crate::models::{Connection, DeviceState};

/// Attempts per device and profile before the profile is skipped.
pub const MAX_RETRIES: u32 = 4;

/// Service for starting autoconnect profiles on idle devices.
#[derive(Debug, Default)]
pub struct AutoconnectService {
    /// Attempts per (device, profile) since the last success.
    attempts: HashMap<(DeviceId, Uuid), u32>,
}

impl AutoconnectService {
    pub fn new() -> Self {
        Self::default()
    }

    /// First profile the device may start on its own.
    pub fn select_profile<'a>(
        &self,
        manager: &DeviceManager,
        id: DeviceId,
        profiles: &'a [Connection],
    ) -> Option<&'a Connection> {
        profiles.iter().find(|profile| {
            if !profile.autoconnect {
                return false;
            }
            if self.attempts_for(id, profile.id) >= MAX_RETRIES {
                debug!("Profile '{}' exhausted its retries on device {}", profile.name, id);
                return false;
            }
            manager.check_connection(id, profile).unwrap_or(false)
        })
    }

    pub fn attempts_for(&self, id: DeviceId, profile: Uuid) -> u32 {
        self.attempts.get(&(id, profile)).copied().unwrap_or(0)
    }

    /// Forget the retry history of a device.
    pub fn reset(&mut self, id: DeviceId) {
        self.attempts.retain(|(device, _), _| *device != id);
    }

    /// Start a profile on every device that asked for re-evaluation.
    /// Returns how many activations were started.
    pub fn process(&mut self, manager: &mut DeviceManager, profiles: &[Connection]) -> usize {
        for id in manager.device_ids() {
            if manager.state(id).ok() == Some(DeviceState::Activated) {
                self.reset(id);
            }
        }

        let mut started = 0;
        for id in manager.take_auto_activate_requests() {
            match manager.is_autoconnect_allowed(id) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Device {} may not autoconnect right now", id);
                    continue;
                }
                Err(e) => {
                    debug!("Skipping auto-activation: {}", e);
                    continue;
                }
            }
            if manager.state(id).ok() != Some(DeviceState::Disconnected) {
                continue;
            }

            let Some(profile) = self.select_profile(manager, id, profiles) else {
                debug!("No autoconnect profile for device {}", id);
                continue;
            };

            info!("Auto-activating '{}' on device {}", profile.name, id);
            *self.attempts.entry((id, profile.id)).or_insert(0) += 1;
            match manager.activate(id, profile.clone(), false) {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!("Auto-activation of '{}' failed: {}", profile.name, e);
                    continue;
                }
            }
            // the pipeline has run as far as it can; a postponed stage
            // counts as an attempt until a later pass sees it activated
            if manager.state(id).ok() == Some(DeviceState::Activated) {
                self.reset(id);
            }
        }
        started
    }
}
