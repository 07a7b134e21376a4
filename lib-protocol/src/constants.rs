// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use uuid::Uuid;

/// Expands a Bluetooth SIG assigned 16-bit UUID to the full 128-bit form
pub const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5f9b_34fb | ((short as u128) << 96))
}

/// Standard Device Information service
pub const DEVICE_INFO_SERVICE_UUID: Uuid = sig_uuid(0x180a);

/// Firmware Revision String characteristic
pub const FIRMWARE_REVISION_UUID: Uuid = sig_uuid(0x2a26);

/// Software Revision String characteristic (carries the profile version)
pub const SOFTWARE_REVISION_UUID: Uuid = sig_uuid(0x2a28);

/// PnP ID characteristic
pub const PNP_ID_UUID: Uuid = sig_uuid(0x2a50);

/// Vendor control service
pub const PYBRICKS_SERVICE_UUID: Uuid = Uuid::from_u128(0xc5f50001_8280_46da_89f4_6d8051e4aeef);

/// Control/event characteristic: commands are written, events are notified
pub const PYBRICKS_CONTROL_EVENT_UUID: Uuid =
    Uuid::from_u128(0xc5f50002_8280_46da_89f4_6d8051e4aeef);

/// Hub capabilities characteristic (profile v1.2.0 and later)
pub const PYBRICKS_HUB_CAPABILITIES_UUID: Uuid =
    Uuid::from_u128(0xc5f50003_8280_46da_89f4_6d8051e4aeef);

/// Nordic UART service
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// UART RX characteristic, written by the host
pub const UART_RX_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// UART TX characteristic, notified by the hub
pub const UART_TX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Largest write that is safe before the MTU has been negotiated
pub const SAFE_WRITE_SIZE: usize = 20;

/// Legacy download payload size between two checksum replies
pub const LEGACY_DOWNLOAD_CHUNK_SIZE: usize = 100;

/// Command byte plus 32-bit offset of a WriteUserRam command
pub const WRITE_USER_RAM_HEADER_SIZE: usize = 5;

/// LEGO's Bluetooth SIG company identifier
pub const LEGO_COMPANY_ID: u16 = 0x0397;

/// Written on the UART channel to start the REPL on firmware without the
/// StartRepl command
pub const LEGACY_REPL_START: [u8; 4] = *b"    ";

/// BEL control character sent to the terminal when input is rejected
pub const TERMINAL_BELL: char = '\x07';
