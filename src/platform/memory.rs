// linkd - In-Memory Platform
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Platform adapter that keeps link state in memory.
//!
//! Used for `--dry-run` and by the unit tests, which inject failures per
//! operation and inspect the call log.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use super::{IpConfigRequest, Platform, PlatformOp};
use crate::models::{AccessPoint, Error, Result};

/// Recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCall {
    pub op: PlatformOp,
    pub iface: String,
}

#[derive(Debug, Default, Clone)]
struct LinkState {
    up: bool,
    identity: Vec<u8>,
    channel: u32,
    scan_results: Vec<AccessPoint>,
}

#[derive(Debug, Default)]
struct Inner {
    links: BTreeMap<String, LinkState>,
    calls: Vec<PlatformCall>,
    failing: BTreeSet<PlatformOp>,
}

/// In-memory platform adapter.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    inner: RefCell<Inner>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `op` fail.
    pub fn fail_on(&self, op: PlatformOp) {
        self.inner.borrow_mut().failing.insert(op);
    }

    /// Stop injecting failures for `op`.
    pub fn clear_failure(&self, op: PlatformOp) {
        self.inner.borrow_mut().failing.remove(&op);
    }

    /// Preset the channel an interface is tuned to.
    pub fn set_channel(&self, iface: &str, channel: u32) {
        self.inner
            .borrow_mut()
            .links
            .entry(iface.to_string())
            .or_default()
            .channel = channel;
    }

    /// Results returned by the next scans of an interface.
    pub fn set_scan_results(&self, iface: &str, results: Vec<AccessPoint>) {
        self.inner
            .borrow_mut()
            .links
            .entry(iface.to_string())
            .or_default()
            .scan_results = results;
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.inner.borrow().calls.clone()
    }

    /// Operations called on one interface, in order.
    pub fn ops_for(&self, iface: &str) -> Vec<PlatformOp> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|call| call.iface == iface)
            .map(|call| call.op)
            .collect()
    }

    pub fn is_up(&self, iface: &str) -> bool {
        self.inner.borrow().links.get(iface).is_some_and(|l| l.up)
    }

    pub fn channel(&self, iface: &str) -> u32 {
        self.inner.borrow().links.get(iface).map_or(0, |l| l.channel)
    }

    pub fn identity(&self, iface: &str) -> Vec<u8> {
        self.inner
            .borrow()
            .links
            .get(iface)
            .map(|l| l.identity.clone())
            .unwrap_or_default()
    }

    /// Record the call and apply `f` to the link unless a failure is injected.
    fn call<T>(
        &self,
        op: PlatformOp,
        iface: &str,
        f: impl FnOnce(&mut LinkState) -> T,
    ) -> Result<T> {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push(PlatformCall {
            op,
            iface: iface.to_string(),
        });
        if inner.failing.contains(&op) {
            return Err(Error::platform(op.as_str(), iface, "injected failure"));
        }
        Ok(f(inner.links.entry(iface.to_string()).or_default()))
    }
}

impl Platform for MemoryPlatform {
    fn set_link_up(&self, iface: &str) -> Result<()> {
        self.call(PlatformOp::LinkUp, iface, |link| link.up = true)
    }

    fn set_link_down(&self, iface: &str) -> Result<()> {
        self.call(PlatformOp::LinkDown, iface, |link| link.up = false)
    }

    fn apply_identity(&self, iface: &str, identity: &[u8]) -> Result<()> {
        self.call(PlatformOp::ApplyIdentity, iface, |link| {
            link.identity = identity.to_vec()
        })
    }

    fn apply_channel(&self, iface: &str, channel: u32) -> Result<u32> {
        self.call(PlatformOp::ApplyChannel, iface, |link| {
            std::mem::replace(&mut link.channel, channel)
        })
    }

    fn get_channel(&self, iface: &str) -> Result<u32> {
        self.call(PlatformOp::GetChannel, iface, |link| link.channel)
    }

    fn start_ip_config(&self, iface: &str, _request: &IpConfigRequest) -> Result<()> {
        self.call(PlatformOp::StartIpConfig, iface, |_| ())
    }

    fn trigger_scan(&self, iface: &str) -> Result<()> {
        self.call(PlatformOp::TriggerScan, iface, |_| ())
    }

    fn scan_results(&self, iface: &str) -> Result<Vec<AccessPoint>> {
        self.call(PlatformOp::ScanResults, iface, |link| link.scan_results.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_state_and_call_log() {
        let platform = MemoryPlatform::new();
        platform.set_channel("msh0", 1);

        platform.set_link_down("msh0").unwrap();
        platform.apply_identity("msh0", b"olpc-mesh").unwrap();
        assert_eq!(platform.apply_channel("msh0", 11).unwrap(), 1);
        platform.set_link_up("msh0").unwrap();

        assert!(platform.is_up("msh0"));
        assert_eq!(platform.channel("msh0"), 11);
        assert_eq!(platform.identity("msh0"), b"olpc-mesh".to_vec());
        assert_eq!(
            platform.ops_for("msh0"),
            vec![
                PlatformOp::LinkDown,
                PlatformOp::ApplyIdentity,
                PlatformOp::ApplyChannel,
                PlatformOp::LinkUp,
            ]
        );
    }

    #[test]
    fn test_injected_failure() {
        let platform = MemoryPlatform::new();
        platform.fail_on(PlatformOp::ApplyChannel);
        assert!(platform.apply_channel("msh0", 6).unwrap_err().is_platform_failure());
        assert_eq!(platform.channel("msh0"), 0);

        platform.clear_failure(PlatformOp::ApplyChannel);
        assert_eq!(platform.apply_channel("msh0", 6).unwrap(), 0);
    }
}
