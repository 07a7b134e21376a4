// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::error::ProtocolError;
use bitflags::bitflags;
use bytes::Bytes;
use std::fmt;

/// Identifiers for events notified by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    StatusReport = 0,
    WriteStdout = 1,
    WriteAppData = 2,
}

impl TryFrom<u8> for EventType {
    type Error = u8;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(EventType::StatusReport),
            1 => Ok(EventType::WriteStdout),
            2 => Ok(EventType::WriteAppData),
            other => Err(other),
        }
    }
}

/// Status indications carried by a status report, by bit index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    BatteryLowVoltageWarning = 0,
    BatteryLowVoltageShutdown = 1,
    BatteryHighCurrent = 2,
    BleAdvertising = 3,
    BleLowSignal = 4,
    PowerButtonPressed = 5,
    UserProgramRunning = 6,
    Shutdown = 7,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::BatteryLowVoltageWarning,
        Status::BatteryLowVoltageShutdown,
        Status::BatteryHighCurrent,
        Status::BleAdvertising,
        Status::BleLowSignal,
        Status::PowerButtonPressed,
        Status::UserProgramRunning,
        Status::Shutdown,
    ];

    pub fn from_index(index: u8) -> Option<Status> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn flag(self) -> StatusFlags {
        StatusFlags::from_bits_retain(status_to_flag(self))
    }
}

/// Converts a status index to its bit in the status report
pub fn status_to_flag(status: Status) -> u32 {
    1 << status.index()
}

bitflags! {
    /// Bit set received in a status report
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u32 {
        const BATTERY_LOW_VOLTAGE_WARNING = 1 << 0;
        const BATTERY_LOW_VOLTAGE_SHUTDOWN = 1 << 1;
        const BATTERY_HIGH_CURRENT = 1 << 2;
        const BLE_ADVERTISING = 1 << 3;
        const BLE_LOW_SIGNAL = 1 << 4;
        const POWER_BUTTON_PRESSED = 1 << 5;
        const USER_PROGRAM_RUNNING = 1 << 6;
        const SHUTDOWN = 1 << 7;
    }
}

impl StatusFlags {
    /// Flag for a status index, `None` past the 8 defined indices
    pub fn from_index(index: u8) -> Option<StatusFlags> {
        Status::from_index(index).map(Status::flag)
    }

    pub fn is_set(&self, status: Status) -> bool {
        self.contains(status.flag())
    }

    pub fn user_program_running(&self) -> bool {
        self.is_set(Status::UserProgramRunning)
    }
}

/// Event notified by the hub on the control/event characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StatusReport {
        flags: StatusFlags,
        /// Slot of the running program, 0 when the hub doesn't report one
        running_program: u8,
        selected_slot: u8,
    },
    WriteStdout(Bytes),
    WriteAppData(Bytes),
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::StatusReport { .. } => EventType::StatusReport,
            Event::WriteStdout(_) => EventType::WriteStdout,
            Event::WriteAppData(_) => EventType::WriteAppData,
        }
    }

    /// Serialize the event as the hub would send it
    pub fn encode(&self) -> Bytes {
        let mut buf = vec![self.event_type() as u8];
        match self {
            Event::StatusReport {
                flags,
                running_program,
                selected_slot,
            } => {
                buf.extend_from_slice(&flags.bits().to_le_bytes());
                buf.push(*running_program);
                buf.push(*selected_slot);
            }
            Event::WriteStdout(payload) | Event::WriteAppData(payload) => {
                buf.extend_from_slice(payload)
            }
        }
        Bytes::from(buf)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::StatusReport {
                flags,
                running_program,
                selected_slot,
            } => write!(
                f,
                "StatusReport {{ flags: {:#010x}, running: {}, selected: {} }}",
                flags.bits(),
                running_program,
                selected_slot
            ),
            Event::WriteStdout(payload) => write!(f, "WriteStdout {{ len: {} }}", payload.len()),
            Event::WriteAppData(payload) => {
                write!(f, "WriteAppData {{ len: {} }}", payload.len())
            }
        }
    }
}

/// Parse an event notification
pub fn decode_event(data: &[u8]) -> Result<Event, ProtocolError> {
    let Some(&discriminant) = data.first() else {
        return Err(ProtocolError::too_short("event", 1, data));
    };

    match EventType::try_from(discriminant) {
        Ok(EventType::StatusReport) => {
            if data.len() < 5 {
                return Err(ProtocolError::too_short("status report", 5, data));
            }
            let flags = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
            Ok(Event::StatusReport {
                flags: StatusFlags::from_bits_retain(flags),
                running_program: data.get(5).copied().unwrap_or(0),
                selected_slot: data.get(6).copied().unwrap_or(0),
            })
        }
        Ok(EventType::WriteStdout) => Ok(Event::WriteStdout(Bytes::copy_from_slice(&data[1..]))),
        Ok(EventType::WriteAppData) => {
            Ok(Event::WriteAppData(Bytes::copy_from_slice(&data[1..])))
        }
        Err(unknown) => Err(ProtocolError::new(
            format!("unknown pybricks event type: {:#04x}", unknown),
            data,
        )),
    }
}
