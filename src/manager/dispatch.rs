// linkd - Activation Dispatch
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! State transitions, stage results and the dispatch queue.
//!
//! Every consequence of an operation is pushed onto a FIFO queue that the
//! manager drains before returning to its caller. Events for one device are
//! therefore handled in emission order.

use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::events::Event;
use crate::device::{DeviceClass, DeviceCore, DeviceId, Stage, StageReturn};
use crate::models::{DeviceState, StateReason};

/// One unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Deliver a signal to the emitter's own hook and its subscribers.
    Signal(Event),
    /// Run an activation stage.
    Stage { device: DeviceId, stage: Stage },
    /// Change a device's state.
    Transition {
        device: DeviceId,
        state: DeviceState,
        reason: StateReason,
    },
    /// Re-evaluate whether a device is available.
    RecheckAvailable {
        device: DeviceId,
        reason: StateReason,
    },
    /// Ask orchestration to re-evaluate auto-activation.
    RecheckAutoActivate(DeviceId),
}

impl Dispatch {
    /// Device the work item belongs to.
    pub fn device(&self) -> DeviceId {
        match self {
            Self::Signal(event) => event.device(),
            Self::Stage { device, .. }
            | Self::Transition { device, .. }
            | Self::RecheckAvailable { device, .. }
            | Self::RecheckAutoActivate(device) => *device,
        }
    }
}

/// FIFO of deferred work.
#[derive(Debug, Default)]
pub struct DispatchQueue(VecDeque<Dispatch>);

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Dispatch) {
        self.0.push_back(item);
    }

    pub fn pop(&mut self) -> Option<Dispatch> {
        self.0.pop_front()
    }

    /// Drop every queued item that belongs to `device`. Registry
    /// notifications about the device are kept.
    pub fn purge(&mut self, device: DeviceId) -> usize {
        let before = self.0.len();
        self.0.retain(|item| match item {
            Dispatch::Signal(Event::DeviceAdded { .. } | Event::DeviceRemoved { .. }) => true,
            other => other.device() != device,
        });
        before - self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Move a device to `new`.
///
/// Leaving an active state clears the activation request and postponed
/// stage and lets the variant tear down. `Failed` is always followed by a
/// queued `Disconnected` with the same reason. Returns false if the device
/// already was in `new`.
pub fn transition(
    core: &mut DeviceCore,
    class: &mut dyn DeviceClass,
    new: DeviceState,
    reason: StateReason,
    queue: &mut DispatchQueue,
) -> bool {
    let old = core.state;
    if old == new {
        return false;
    }

    info!(
        "{}: device state change: {} -> {} (reason '{}')",
        core.iface, old, new, reason
    );
    core.state = new;
    core.state_reason = reason;

    if new <= DeviceState::Disconnected && old > DeviceState::Disconnected {
        if let Some(req) = core.act_request.take() {
            debug!(
                "{}: dropping activation of '{}' started {}",
                core.iface, req.connection.name, req.started_at
            );
        }
        core.postponed = None;
        class.deactivate(core);
    } else if new == DeviceState::Failed {
        core.postponed = None;
    }

    queue.push(Dispatch::Signal(Event::StateChanged {
        device: core.id,
        new,
        old,
        reason,
    }));

    match new {
        DeviceState::Failed => queue.push(Dispatch::Transition {
            device: core.id,
            state: DeviceState::Disconnected,
            reason,
        }),
        DeviceState::Disconnected => queue.push(Dispatch::RecheckAvailable {
            device: core.id,
            reason: StateReason::None,
        }),
        _ => {}
    }

    true
}

/// Apply the result of a stage that ran in `stage`'s state.
pub fn stage_finished(
    core: &mut DeviceCore,
    class: &mut dyn DeviceClass,
    stage: Stage,
    result: StageReturn,
    queue: &mut DispatchQueue,
) {
    if core.state != stage.state() {
        debug!(
            "{}: {} result {:?} ignored, device is now {}",
            core.iface,
            stage.as_str(),
            result,
            core.state
        );
        return;
    }

    match result {
        StageReturn::Success => match stage.next() {
            Some(next) => {
                transition(core, class, next.state(), StateReason::None, queue);
                queue.push(Dispatch::Stage {
                    device: core.id,
                    stage: next,
                });
            }
            None => {
                transition(core, class, DeviceState::Activated, StateReason::None, queue);
            }
        },
        StageReturn::Postpone => {
            debug!("{}: {} postponed", core.iface, stage.as_str());
            core.postponed = Some(stage);
        }
        StageReturn::Failure(reason) => {
            warn!("{}: activation {} failed: {}", core.iface, stage.as_str(), reason);
            transition(core, class, DeviceState::Failed, reason, queue);
        }
    }
}
