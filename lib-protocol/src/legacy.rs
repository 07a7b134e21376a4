// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Helpers for the checksummed program download over the UART channel.
//!
//! The legacy protocol has no framing. The host writes the program size as a
//! 32-bit little endian value, then the program in blocks. After each block
//! the hub answers with a single byte: the complemented XOR of the block.

use crate::constants::{LEGACY_DOWNLOAD_CHUNK_SIZE, SAFE_WRITE_SIZE};
use bytes::Bytes;

/// XOR of all bytes
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Checksum the hub replies with after receiving `data`
pub fn checksum(data: &[u8]) -> u8 {
    0xff ^ xor8(data)
}

/// Size header sent before the program
pub fn size_header(size: u32) -> Bytes {
    Bytes::copy_from_slice(&size.to_le_bytes())
}

/// One checksummed block of a legacy download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyBlock {
    /// Offset of the block in the program, the size header has none
    pub offset: Option<usize>,
    pub data: Bytes,
}

impl LegacyBlock {
    pub fn expected_checksum(&self) -> u8 {
        checksum(&self.data)
    }

    /// Splits the block into writes that fit in one BLE packet
    pub fn writes(&self) -> impl Iterator<Item = Bytes> + '_ {
        (0..self.data.len())
            .step_by(SAFE_WRITE_SIZE)
            .map(|start| {
                let end = (start + SAFE_WRITE_SIZE).min(self.data.len());
                self.data.slice(start..end)
            })
    }
}

/// Cuts a program into the blocks of a legacy download, size header first
pub fn plan_download(program: &Bytes) -> Vec<LegacyBlock> {
    let mut blocks = Vec::with_capacity(program.len() / LEGACY_DOWNLOAD_CHUNK_SIZE + 2);
    blocks.push(LegacyBlock {
        offset: None,
        data: size_header(program.len() as u32),
    });

    for start in (0..program.len()).step_by(LEGACY_DOWNLOAD_CHUNK_SIZE) {
        let end = (start + LEGACY_DOWNLOAD_CHUNK_SIZE).min(program.len());
        blocks.push(LegacyBlock {
            offset: Some(start),
            data: program.slice(start..end),
        });
    }

    blocks
}
