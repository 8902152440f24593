// linkd - Device Events
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Events emitted by devices and the registry, and the subscription hub
//! that routes them.
//!
//! Subscriptions are keyed by `(emitter, kind)` and identified by an owned
//! [`SubscriptionId`]. Removing a subscription is idempotent, and a
//! subscription removed while an event is being delivered does not receive
//! that event.

use std::fmt;

use crate::device::DeviceId;
use crate::models::{DeviceState, StateReason};

/// Observable device property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// Mesh companion reference.
    Companion,
    /// Mesh channel.
    ActiveChannel,
    /// Wi-Fi scan in progress.
    Scanning,
    /// Wi-Fi access point list.
    AccessPoints,
    /// Access point used by the current Wi-Fi activation.
    ActiveAccessPoint,
}

impl Property {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Companion => "Companion",
            Self::ActiveChannel => "ActiveChannel",
            Self::Scanning => "Scanning",
            Self::AccessPoints => "AccessPoints",
            Self::ActiveAccessPoint => "ActiveAccessPoint",
        }
    }
}

/// An emitted signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StateChanged {
        device: DeviceId,
        new: DeviceState,
        old: DeviceState,
        reason: StateReason,
    },
    CarrierChanged {
        device: DeviceId,
        carrier: bool,
    },
    PropertyChanged {
        device: DeviceId,
        property: Property,
    },
    StrengthChanged {
        device: DeviceId,
        access_point: u64,
        strength: i8,
    },
    DeviceAdded {
        device: DeviceId,
    },
    DeviceRemoved {
        device: DeviceId,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::CarrierChanged { .. } => EventKind::CarrierChanged,
            Self::PropertyChanged { .. } => EventKind::PropertyChanged,
            Self::StrengthChanged { .. } => EventKind::StrengthChanged,
            Self::DeviceAdded { .. } => EventKind::DeviceAdded,
            Self::DeviceRemoved { .. } => EventKind::DeviceRemoved,
        }
    }

    /// Who emitted the event. Add/remove notifications come from the registry.
    pub fn emitter(&self) -> Emitter {
        match self {
            Self::DeviceAdded { .. } | Self::DeviceRemoved { .. } => Emitter::Registry,
            Self::StateChanged { device, .. }
            | Self::CarrierChanged { device, .. }
            | Self::PropertyChanged { device, .. }
            | Self::StrengthChanged { device, .. } => Emitter::Device(*device),
        }
    }

    /// Device the event is about.
    pub fn device(&self) -> DeviceId {
        match self {
            Self::StateChanged { device, .. }
            | Self::CarrierChanged { device, .. }
            | Self::PropertyChanged { device, .. }
            | Self::StrengthChanged { device, .. }
            | Self::DeviceAdded { device }
            | Self::DeviceRemoved { device } => *device,
        }
    }
}

/// Subscription key: which signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    CarrierChanged,
    PropertyChanged,
    StrengthChanged,
    DeviceAdded,
    DeviceRemoved,
    /// Query: subscribers are asked whether the emitter may autoconnect.
    AutoconnectAllowed,
}

/// Subscription key: which emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emitter {
    Registry,
    Device(DeviceId),
    /// Every emitter.
    Any,
}

impl Emitter {
    fn matches(&self, emitter: Emitter) -> bool {
        *self == Emitter::Any || *self == emitter
    }
}

/// Handle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Callback used by subscribers outside the device graph.
pub type Observer = Box<dyn FnMut(&Event)>;

/// Receiver of a subscription.
pub enum Subscriber {
    /// A registered device; events reach its class `on_event` hook.
    Device(DeviceId),
    /// An external callback.
    Observer(Observer),
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => f.debug_tuple("Device").field(id).finish(),
            Self::Observer(_) => f.write_str("Observer"),
        }
    }
}

/// Resolved target of one subscription during delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Device(DeviceId),
    Observer,
}

#[derive(Debug)]
struct Subscription {
    id: SubscriptionId,
    emitter: Emitter,
    kind: EventKind,
    subscriber: Subscriber,
}

/// Subscription registry.
#[derive(Debug, Default)]
pub struct SignalHub {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        emitter: Emitter,
        kind: EventKind,
        subscriber: Subscriber,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Subscription {
            id,
            emitter,
            kind,
            subscriber,
        });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        self.subscriptions.len() != before
    }

    /// Subscriptions interested in `(emitter, kind)`, in subscription order.
    pub fn matching(&self, emitter: Emitter, kind: EventKind) -> Vec<SubscriptionId> {
        self.subscriptions
            .iter()
            .filter(|sub| sub.kind == kind && sub.emitter.matches(emitter))
            .map(|sub| sub.id)
            .collect()
    }

    /// Where a subscription delivers, if it still exists.
    pub fn target(&self, id: SubscriptionId) -> Option<Target> {
        self.subscriptions
            .iter()
            .find(|sub| sub.id == id)
            .map(|sub| match sub.subscriber {
                Subscriber::Device(device) => Target::Device(device),
                Subscriber::Observer(_) => Target::Observer,
            })
    }

    /// Devices subscribed to `(emitter, kind)`.
    pub fn device_subscribers(&self, emitter: Emitter, kind: EventKind) -> Vec<DeviceId> {
        self.matching(emitter, kind)
            .into_iter()
            .filter_map(|id| match self.target(id) {
                Some(Target::Device(device)) => Some(device),
                _ => None,
            })
            .collect()
    }

    /// Run an observer callback.
    pub fn notify_observer(&mut self, id: SubscriptionId, event: &Event) {
        if let Some(Subscription {
            subscriber: Subscriber::Observer(callback),
            ..
        }) = self.subscriptions.iter_mut().find(|sub| sub.id == id)
        {
            callback(event);
        }
    }

    /// Number of live subscriptions on an emitter.
    pub fn count_for_emitter(&self, emitter: Emitter) -> usize {
        self.subscriptions
            .iter()
            .filter(|sub| sub.emitter == emitter)
            .count()
    }

    /// Number of live subscriptions held by a device.
    pub fn count_for_subscriber(&self, device: DeviceId) -> usize {
        self.subscriptions
            .iter()
            .filter(|sub| matches!(sub.subscriber, Subscriber::Device(d) if d == device))
            .count()
    }

    /// Drop every subscription held by or targeting a device.
    pub fn remove_device(&mut self, device: DeviceId) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| {
            sub.emitter != Emitter::Device(device)
                && !matches!(sub.subscriber, Subscriber::Device(d) if d == device)
        });
        before - self.subscriptions.len()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn added(n: u32) -> Event {
        Event::DeviceAdded {
            device: DeviceId::new(n),
        }
    }

    #[test]
    fn test_matching_by_emitter_and_kind() {
        let mut hub = SignalHub::new();
        let a = DeviceId::new(1);
        let b = DeviceId::new(2);
        let on_a = hub.subscribe(Emitter::Device(a), EventKind::StateChanged, Subscriber::Device(b));
        let any = hub.subscribe(Emitter::Any, EventKind::StateChanged, Subscriber::Device(a));
        hub.subscribe(Emitter::Registry, EventKind::DeviceAdded, Subscriber::Device(b));

        assert_eq!(hub.matching(Emitter::Device(a), EventKind::StateChanged), vec![on_a, any]);
        assert_eq!(hub.matching(Emitter::Device(b), EventKind::StateChanged), vec![any]);
        assert!(hub.matching(Emitter::Device(a), EventKind::PropertyChanged).is_empty());
        assert_eq!(hub.device_subscribers(Emitter::Registry, EventKind::DeviceAdded), vec![b]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let mut hub = SignalHub::new();
        let id = hub.subscribe(
            Emitter::Registry,
            EventKind::DeviceAdded,
            Subscriber::Device(DeviceId::new(1)),
        );
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert!(hub.target(id).is_none());
        assert!(hub.is_empty());
    }

    #[test]
    fn test_observer_delivery() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut hub = SignalHub::new();
        let id = hub.subscribe(
            Emitter::Registry,
            EventKind::DeviceAdded,
            Subscriber::Observer(Box::new(move |event| sink.borrow_mut().push(event.clone()))),
        );
        assert_eq!(hub.target(id), Some(Target::Observer));

        hub.notify_observer(id, &added(3));
        hub.unsubscribe(id);
        hub.notify_observer(id, &added(4));
        assert_eq!(*seen.borrow(), vec![added(3)]);
    }

    #[test]
    fn test_remove_device_drops_both_directions() {
        let mut hub = SignalHub::new();
        let a = DeviceId::new(1);
        let b = DeviceId::new(2);
        hub.subscribe(Emitter::Device(a), EventKind::StateChanged, Subscriber::Device(b));
        hub.subscribe(Emitter::Device(b), EventKind::StateChanged, Subscriber::Device(a));
        hub.subscribe(Emitter::Registry, EventKind::DeviceRemoved, Subscriber::Device(b));

        assert_eq!(hub.remove_device(a), 2);
        assert_eq!(hub.count_for_emitter(Emitter::Device(a)), 0);
        assert_eq!(hub.count_for_subscriber(b), 1);
    }

    #[test]
    fn test_event_emitter() {
        let id = DeviceId::new(5);
        assert_eq!(added(5).emitter(), Emitter::Registry);
        let event = Event::CarrierChanged {
            device: id,
            carrier: true,
        };
        assert_eq!(event.emitter(), Emitter::Device(id));
        assert_eq!(event.kind(), EventKind::CarrierChanged);
        assert_eq!(event.device(), id);
    }
}
