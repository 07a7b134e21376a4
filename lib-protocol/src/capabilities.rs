// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::constants::SAFE_WRITE_SIZE;
use crate::error::ProtocolError;
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

bitflags! {
    /// Feature flags advertised by the hub capabilities characteristic
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HubCapabilityFlags: u32 {
        const HAS_REPL = 1 << 0;
        const USER_PROGRAM_MULTI_MPY6 = 1 << 1;
        const USER_PROGRAM_MULTI_MPY6_NATIVE6P1 = 1 << 2;
        const HAS_PORT_VIEW = 1 << 3;
        const HAS_IMU_CALIBRATION = 1 << 4;
    }
}

/// On-wire format of a user program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Single MPY v5 blob, only understood by the legacy download
    Mpy5,
    /// Multi-file container of MPY v6 modules
    MultiMpy6,
    /// Multi-file container of MPY v6 modules with native v6.1 code
    MultiMpy6Native6p1,
}

impl FileFormat {
    pub fn is_multi_file(self) -> bool {
        !matches!(self, FileFormat::Mpy5)
    }

    /// MPY ABI version the compiler must target
    pub fn mpy_abi(self) -> u8 {
        match self {
            FileFormat::Mpy5 => 5,
            FileFormat::MultiMpy6 | FileFormat::MultiMpy6Native6p1 => 6,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFormat::Mpy5 => "mpy-v5",
            FileFormat::MultiMpy6 => "multi-mpy-v6",
            FileFormat::MultiMpy6Native6p1 => "multi-mpy-v6.1-native",
        };
        f.write_str(name)
    }
}

/// Capability record of a connected hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubCapabilities {
    pub max_write_size: u16,
    pub flags: HubCapabilityFlags,
    pub max_user_program_size: u32,
    /// Number of program slots, 0 when the hub has no slot support
    pub num_of_slots: u8,
}

impl HubCapabilities {
    /// Minimum length of the record, the slot count is optional
    pub const MIN_LEN: usize = 10;

    pub fn has_repl(&self) -> bool {
        self.flags.contains(HubCapabilityFlags::HAS_REPL)
    }

    pub fn supports(&self, format: FileFormat) -> bool {
        match format {
            // hubs taking mpy v5 predate the capabilities record
            FileFormat::Mpy5 => !self.supports_multi_file(),
            FileFormat::MultiMpy6 => self
                .flags
                .contains(HubCapabilityFlags::USER_PROGRAM_MULTI_MPY6),
            FileFormat::MultiMpy6Native6p1 => self
                .flags
                .contains(HubCapabilityFlags::USER_PROGRAM_MULTI_MPY6_NATIVE6P1),
        }
    }

    fn supports_multi_file(&self) -> bool {
        self.flags.intersects(
            HubCapabilityFlags::USER_PROGRAM_MULTI_MPY6
                | HubCapabilityFlags::USER_PROGRAM_MULTI_MPY6_NATIVE6P1,
        )
    }

    /// Best file format the hub accepts
    pub fn preferred_file_format(&self) -> FileFormat {
        if self.supports(FileFormat::MultiMpy6Native6p1) {
            FileFormat::MultiMpy6Native6p1
        } else if self.supports(FileFormat::MultiMpy6) {
            FileFormat::MultiMpy6
        } else {
            FileFormat::Mpy5
        }
    }

    /// Largest payload of a single write
    pub fn max_write_size(&self) -> usize {
        usize::from(self.max_write_size).max(1)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::MIN_LEN + 1);
        buf.put_u16_le(self.max_write_size);
        buf.put_u32_le(self.flags.bits());
        buf.put_u32_le(self.max_user_program_size);
        buf.put_u8(self.num_of_slots);
        buf.freeze()
    }
}

impl Default for HubCapabilities {
    fn default() -> Self {
        Self {
            max_write_size: SAFE_WRITE_SIZE as u16,
            flags: HubCapabilityFlags::empty(),
            max_user_program_size: 0,
            num_of_slots: 0,
        }
    }
}

/// Parse the value of the hub capabilities characteristic
pub fn decode_hub_capabilities(data: &[u8]) -> Result<HubCapabilities, ProtocolError> {
    if data.len() < HubCapabilities::MIN_LEN {
        return Err(ProtocolError::too_short(
            "hub capabilities",
            HubCapabilities::MIN_LEN,
            data,
        ));
    }

    Ok(HubCapabilities {
        max_write_size: u16::from_le_bytes([data[0], data[1]]),
        flags: HubCapabilityFlags::from_bits_retain(u32::from_le_bytes([
            data[2], data[3], data[4], data[5],
        ])),
        max_user_program_size: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
        num_of_slots: data.get(10).copied().unwrap_or(0),
    })
}
