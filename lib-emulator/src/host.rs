// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::config::HostConfig;
use crate::device::EmulatedDevice;
use brickwire_hub::{Availability, BleHost, RequestDeviceOptions, TransportError};
use brickwire_protocol::PYBRICKS_SERVICE_UUID;
use log::{debug, info};

/// Bluetooth host with a single emulated hub in range
#[derive(Debug, Clone)]
pub struct EmulatorHost {
    device: EmulatedDevice,
    config: HostConfig,
}

impl EmulatorHost {
    pub fn new(device: EmulatedDevice) -> Self {
        Self::with_config(device, HostConfig::default())
    }

    pub fn with_config(device: EmulatedDevice, config: HostConfig) -> Self {
        Self { device, config }
    }

    /// The hub in range, for inspecting it
    pub fn device(&self) -> &EmulatedDevice {
        &self.device
    }
}

impl BleHost for EmulatorHost {
    type Device = EmulatedDevice;

    async fn availability(&self) -> Availability {
        self.config.availability
    }

    async fn request_device(
        &self,
        options: &RequestDeviceOptions,
    ) -> Result<EmulatedDevice, TransportError> {
        if self.config.cancel_request {
            info!("Device picker dismissed");
            return Err(TransportError::Cancelled);
        }

        if !options.services.contains(&PYBRICKS_SERVICE_UUID) {
            debug!("Picker filter does not match the emulated hub");
            return Err(TransportError::NotFound("no matching device".to_string()));
        }
        if let Some(prefix) = &options.name_prefix {
            if !self.device.config().name.starts_with(prefix.as_str()) {
                debug!("No device named {}*", prefix);
                return Err(TransportError::NotFound("no matching device".to_string()));
            }
        }

        Ok(self.device.clone())
    }
}
