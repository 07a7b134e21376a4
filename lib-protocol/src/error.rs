// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use bytes::Bytes;
use std::fmt;

/// Raised when a message from the hub cannot be understood.
///
/// Keeps the offending bytes around since this usually means the firmware
/// speaks a protocol revision we don't know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    message: String,
    value: Bytes,
}

impl ProtocolError {
    pub fn new(message: impl Into<String>, value: &[u8]) -> Self {
        Self {
            message: message.into(),
            value: Bytes::copy_from_slice(value),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Raw bytes that caused the error
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub(crate) fn too_short(what: &str, expected: usize, value: &[u8]) -> Self {
        Self::new(
            format!(
                "{} too short: expected at least {} bytes, got {}",
                what,
                expected,
                value.len()
            ),
            value,
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:02x?})", self.message, &self.value[..])
    }
}

impl std::error::Error for ProtocolError {}
