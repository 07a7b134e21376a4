// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Identifiers for commands written to the control characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    StopUserProgram = 0,
    StartUserProgram = 1,
    /// Only understood by firmware with profile v1.2.0 or later
    StartRepl = 2,
    WriteUserProgramMeta = 3,
    WriteUserRam = 4,
    ResetInUpdateMode = 5,
    /// Profile v1.3.0 and later
    WriteStdin = 6,
    /// Profile v1.4.0 and later
    WriteAppData = 7,
}

impl From<CommandType> for u8 {
    fn from(val: CommandType) -> Self {
        val as u8
    }
}

/// A command sent to the hub over the control characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request to stop the user program, if it is running
    StopUserProgram,
    /// Start a user program. Without a slot the hub runs the currently
    /// selected one.
    StartUserProgram { slot: Option<u8> },
    StartRepl,
    /// Announces the size of the program in user RAM. Size zero invalidates
    /// whatever is stored.
    WriteUserProgramMeta { size: u32 },
    WriteUserRam { offset: u32, payload: Bytes },
    ResetInUpdateMode,
    WriteStdin { payload: Bytes },
    WriteAppData { offset: u16, payload: Bytes },
}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::StopUserProgram => CommandType::StopUserProgram,
            Command::StartUserProgram { .. } => CommandType::StartUserProgram,
            Command::StartRepl => CommandType::StartRepl,
            Command::WriteUserProgramMeta { .. } => CommandType::WriteUserProgramMeta,
            Command::WriteUserRam { .. } => CommandType::WriteUserRam,
            Command::ResetInUpdateMode => CommandType::ResetInUpdateMode,
            Command::WriteStdin { .. } => CommandType::WriteStdin,
            Command::WriteAppData { .. } => CommandType::WriteAppData,
        }
    }

    /// Serialize the command to its wire format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload_len());
        buf.put_u8(self.command_type().into());

        match self {
            Command::StartUserProgram { slot: Some(slot) } => buf.put_u8(*slot),
            Command::WriteUserProgramMeta { size } => buf.put_u32_le(*size),
            Command::WriteUserRam { offset, payload } => {
                buf.put_u32_le(*offset);
                buf.extend_from_slice(payload);
            }
            Command::WriteStdin { payload } => buf.extend_from_slice(payload),
            Command::WriteAppData { offset, payload } => {
                buf.put_u16_le(*offset);
                buf.extend_from_slice(payload);
            }
            _ => {}
        }

        buf.freeze()
    }

    fn payload_len(&self) -> usize {
        match self {
            Command::StartUserProgram { slot } => usize::from(slot.is_some()),
            Command::WriteUserProgramMeta { .. } => 4,
            Command::WriteUserRam { payload, .. } => 4 + payload.len(),
            Command::WriteStdin { payload } => payload.len(),
            Command::WriteAppData { payload, .. } => 2 + payload.len(),
            _ => 0,
        }
    }
}

/// Serialize a command, see [`Command::encode`]
pub fn encode_command(command: &Command) -> Bytes {
    command.encode()
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StartUserProgram { slot: Some(slot) } => {
                write!(f, "StartUserProgram {{ slot: {} }}", slot)
            }
            Command::WriteUserProgramMeta { size } => {
                write!(f, "WriteUserProgramMeta {{ size: {} }}", size)
            }
            Command::WriteUserRam { offset, payload } => write!(
                f,
                "WriteUserRam {{ offset: {}, len: {} }}",
                offset,
                payload.len()
            ),
            Command::WriteStdin { payload } => {
                write!(f, "WriteStdin {{ len: {} }}", payload.len())
            }
            Command::WriteAppData { offset, payload } => write!(
                f,
                "WriteAppData {{ offset: {}, len: {} }}",
                offset,
                payload.len()
            ),
            other => write!(f, "{:?}", other.command_type()),
        }
    }
}
