// linkd - Library Root
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # linkd
//!
//! Device activation and companion coordination for Linux network links.
//!
//! The crate is organized into:
//! - **device**: Device records, class behavior and the activation stages
//! - **manager**: Device registry, signal hub and dispatch loop
//! - **models**: States, connection profiles, access points and config
//! - **platform**: Link, radio and IP operations
//! - **services**: Discovery, auto-activation and the daemon loop

pub mod device;
pub mod manager;
pub mod models;
pub mod platform;
pub mod services;

pub use manager::DeviceManager;
pub use models::{DaemonConfig, Error, Result};
pub use services::Daemon;

/// Human-readable application name.
pub const APP_NAME: &str = "linkd";

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
