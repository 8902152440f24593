// linkd - Pending Actions
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Named flags a device holds while blocked on an external precondition.

use std::collections::BTreeSet;

/// Set while a device is looking for its companion.
pub const WAITING_FOR_COMPANION: &str = "waiting-for-companion";

/// Pending actions that keep a device unavailable.
const AVAILABILITY_BLOCKERS: &[&str] = &[WAITING_FOR_COMPANION];

/// Set of pending action names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingActions(BTreeSet<String>);

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action. Returns false if it was already pending.
    pub fn add(&mut self, action: &str) -> bool {
        self.0.insert(action.to_string())
    }

    /// Remove an action. Returns false if it was not pending.
    pub fn remove(&mut self, action: &str) -> bool {
        self.0.remove(action)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.0.contains(action)
    }

    /// Whether any pending action prevents the device from being available.
    pub fn blocks_availability(&self) -> bool {
        AVAILABILITY_BLOCKERS.iter().any(|action| self.contains(action))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
