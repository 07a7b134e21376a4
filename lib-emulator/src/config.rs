// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_hub::Availability;
use brickwire_protocol::{HubCapabilities, HubCapabilityFlags, PnpId, VendorIdSource, LEGO_COMPANY_ID};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// What the emulated hub reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_firmware_revision")]
    pub firmware_revision: String,
    /// Pybricks profile version
    #[serde(default = "default_software_revision")]
    pub software_revision: String,
    /// Hub type byte of the PnP ID, `None` emulates firmware without one
    #[serde(default = "default_hub_type")]
    pub hub_type: Option<u8>,
    #[serde(default)]
    pub hub_variant: u8,
    #[serde(default = "default_max_write_size")]
    pub max_write_size: u16,
    #[serde(default = "default_max_user_program_size")]
    pub max_user_program_size: u32,
    #[serde(default = "default_num_of_slots")]
    pub num_of_slots: u8,
    #[serde(default = "default_capability_flags")]
    pub capability_flags: u32,
    /// Printed when a program starts
    #[serde(default = "default_program_output")]
    pub program_output: String,
}

fn default_name() -> String {
    "Pybricks Hub".to_string()
}

fn default_firmware_revision() -> String {
    "3.5.0".to_string()
}

fn default_software_revision() -> String {
    "1.4.0".to_string()
}

fn default_hub_type() -> Option<u8> {
    // SPIKE Prime
    Some(0x81)
}

fn default_max_write_size() -> u16 {
    158
}

fn default_max_user_program_size() -> u32 {
    261_512
}

fn default_num_of_slots() -> u8 {
    5
}

fn default_capability_flags() -> u32 {
    (HubCapabilityFlags::HAS_REPL
        | HubCapabilityFlags::USER_PROGRAM_MULTI_MPY6
        | HubCapabilityFlags::USER_PROGRAM_MULTI_MPY6_NATIVE6P1)
        .bits()
}

fn default_program_output() -> String {
    "Hello from the emulated hub!\n".to_string()
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            firmware_revision: default_firmware_revision(),
            software_revision: default_software_revision(),
            hub_type: default_hub_type(),
            hub_variant: 0,
            max_write_size: default_max_write_size(),
            max_user_program_size: default_max_user_program_size(),
            num_of_slots: default_num_of_slots(),
            capability_flags: default_capability_flags(),
            program_output: default_program_output(),
        }
    }
}

impl EmulatorConfig {
    /// A hub running old firmware with the given profile
    pub fn legacy(firmware_revision: &str, software_revision: &str) -> Self {
        Self {
            firmware_revision: firmware_revision.to_string(),
            software_revision: software_revision.to_string(),
            ..Self::default()
        }
    }

    pub fn pnp_id(&self) -> Option<PnpId> {
        self.hub_type.map(|hub_type| PnpId {
            vendor_id_source: VendorIdSource::BluetoothSig,
            vendor_id: LEGO_COMPANY_ID,
            product_id: u16::from(hub_type),
            product_version: u16::from(self.hub_variant),
        })
    }

    pub fn capabilities(&self) -> HubCapabilities {
        HubCapabilities {
            max_write_size: self.max_write_size,
            flags: HubCapabilityFlags::from_bits_truncate(self.capability_flags),
            max_user_program_size: self.max_user_program_size,
            num_of_slots: self.num_of_slots,
        }
    }
}

/// Misbehaviour to inject, for tests
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Services the hub does not have
    pub missing_services: Vec<Uuid>,
    /// Characteristics the hub does not have
    pub missing_characteristics: Vec<Uuid>,
    pub no_gatt: bool,
    /// Writes to these characteristics fail
    pub failing_writes: Vec<Uuid>,
    /// Reply to legacy download blocks with a wrong checksum
    pub corrupt_checksum: bool,
    /// Never answer legacy download blocks
    pub drop_checksum: bool,
    /// Drop the connection once this many writes went through
    pub disconnect_after_writes: Option<usize>,
    /// Writes block until a permit is available, see [`crate::EmulatedDevice::release_writes`]
    pub write_gate: Option<Arc<Semaphore>>,
}

/// Host side behaviour
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub availability: Availability,
    /// The user dismisses the device picker
    pub cancel_request: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            availability: Availability::Available,
            cancel_request: false,
        }
    }
}
