// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! # Brickwire Emulator
//!
//! An in-process Pybricks hub behind a [`brickwire_hub::BleHost`], for tests
//! and for trying the CLI without hardware.

pub mod config;
pub mod device;
pub mod host;

pub use config::{EmulatorConfig, Faults, HostConfig};
pub use device::EmulatedDevice;
pub use host::EmulatorHost;
