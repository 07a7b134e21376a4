// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

/// Firmware version hubs are compared against when connecting
pub const BUNDLED_FIRMWARE_VERSION: &str = "3.5.0";

/// Capacity of the event bus
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// How long to wait for the transport to confirm a disconnect
pub const DISCONNECT_TIMEOUT_MILLISECONDS: u64 = 2000;
