// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing of the stdio relay and the downloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// How long terminal input is collected before it is sent
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
    /// Wait for the hub to echo legacy stdin
    #[serde(default = "default_echo_wait_ms")]
    pub echo_wait_ms: u64,
    #[serde(default = "default_checksum_timeout_ms")]
    pub checksum_timeout_ms: u64,
    /// Delay before reporting a requested disconnect, 0 disables it
    #[serde(default)]
    pub disconnect_grace_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            coalesce_window_ms: default_coalesce_window_ms(),
            echo_wait_ms: default_echo_wait_ms(),
            checksum_timeout_ms: default_checksum_timeout_ms(),
            disconnect_grace_ms: 0,
        }
    }
}

fn default_coalesce_window_ms() -> u64 {
    20
}

fn default_echo_wait_ms() -> u64 {
    100
}

fn default_checksum_timeout_ms() -> u64 {
    1000
}

impl TimingSettings {
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn echo_wait(&self) -> Duration {
        Duration::from_millis(self.echo_wait_ms)
    }

    pub fn checksum_timeout(&self) -> Duration {
        Duration::from_millis(self.checksum_timeout_ms)
    }

    pub fn disconnect_policy(&self) -> DisconnectPolicy {
        DisconnectPolicy::from_grace_ms(self.disconnect_grace_ms)
    }
}

/// What to do between the transport reporting a disconnect and publishing it.
///
/// Some Bluetooth stacks report the disconnect before the device is really
/// released. Reconnecting right away then fails, so a grace period can be
/// inserted for disconnects the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    #[default]
    Immediate,
    Grace(Duration),
}

impl DisconnectPolicy {
    pub fn from_grace_ms(ms: u64) -> Self {
        if ms == 0 {
            DisconnectPolicy::Immediate
        } else {
            DisconnectPolicy::Grace(Duration::from_millis(ms))
        }
    }

    /// Delay to apply for a disconnect
    pub fn delay(&self, user_requested: bool) -> Option<Duration> {
        match self {
            DisconnectPolicy::Grace(grace) if user_requested => Some(*grace),
            _ => None,
        }
    }
}

/// Everything the hub needs to know, the caller maps its config onto this
#[derive(Debug, Clone, PartialEq)]
pub struct HubSettings {
    /// Only offer devices whose name starts with this
    pub name_prefix: Option<String>,
    /// Firmware version shipped with the application, older hubs get an
    /// advisory to update
    pub bundled_firmware_version: String,
    /// Stop whatever runs on the hub right after connecting
    pub stop_on_connect: bool,
    pub timing: TimingSettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            name_prefix: None,
            bundled_firmware_version: crate::constants::BUNDLED_FIRMWARE_VERSION.to_string(),
            stop_on_connect: true,
            timing: TimingSettings::default(),
        }
    }
}

impl HubSettings {
    pub fn with_timing(mut self, timing: TimingSettings) -> Self {
        self.timing = timing;
        self
    }

    pub fn disconnect_policy(&self) -> DisconnectPolicy {
        self.timing.disconnect_policy()
    }
}
