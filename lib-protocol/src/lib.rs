// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! # Brickwire Protocol
//!
//! Wire formats spoken by Pybricks hubs, free of any I/O:
//! - Control/event commands and events
//! - Device information (PnP ID) and hub capability records
//! - Legacy checksummed UART download helpers
//! - Profile and firmware version handling
//! - Multi-file program container

pub mod capabilities;
pub mod commands;
pub mod constants;
pub mod device_info;
pub mod error;
pub mod events;
pub mod legacy;
pub mod program;
pub mod version;

// Re-export commonly used types
pub use capabilities::{decode_hub_capabilities, FileFormat, HubCapabilities, HubCapabilityFlags};
pub use commands::{encode_command, Command, CommandType};
pub use constants::*;
pub use device_info::{decode_pnp_id, hub_type_name, HubType, PnpId, VendorIdSource};
pub use error::ProtocolError;
pub use events::{decode_event, status_to_flag, Event, EventType, Status, StatusFlags};
pub use program::{pack_multi_mpy, unpack_multi_mpy, ProgramModule, MAIN_MODULE};
pub use version::{python_version_to_semver, VersionError};
