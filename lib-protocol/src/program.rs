// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// Name of the module that is executed when the program starts
pub const MAIN_MODULE: &str = "__main__";

/// One compiled module of a multi-file program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramModule {
    pub name: String,
    pub mpy: Bytes,
}

impl ProgramModule {
    pub fn new(name: impl Into<String>, mpy: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mpy: mpy.into(),
        }
    }

    fn packed_len(&self) -> usize {
        4 + self.name.len() + 1 + self.mpy.len()
    }
}

/// Packs compiled modules into the multi-file container.
///
/// Each entry is `[size: u32 LE][name][0x00][mpy]`, the main module goes first.
pub fn pack_multi_mpy(main: Bytes, modules: &[ProgramModule]) -> Bytes {
    let main = ProgramModule {
        name: MAIN_MODULE.to_string(),
        mpy: main,
    };
    let len = main.packed_len() + modules.iter().map(|m| m.packed_len()).sum::<usize>();

    let mut buf = BytesMut::with_capacity(len);
    for module in std::iter::once(&main).chain(modules.iter()) {
        buf.put_u32_le(module.mpy.len() as u32);
        buf.extend_from_slice(module.name.as_bytes());
        buf.put_u8(0);
        buf.extend_from_slice(&module.mpy);
    }
    buf.freeze()
}

/// Splits a multi-file container back into its modules
pub fn unpack_multi_mpy(data: &[u8]) -> Result<Vec<ProgramModule>, ProtocolError> {
    let mut modules = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let rest = &data[pos..];
        if rest.len() < 4 {
            return Err(ProtocolError::new("truncated module size", data));
        }
        let size = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;

        let name_end = rest[4..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ProtocolError::new("unterminated module name", data))?;
        let name = String::from_utf8_lossy(&rest[4..4 + name_end]).into_owned();

        let mpy_start = 4 + name_end + 1;
        let mpy_end = mpy_start + size;
        if rest.len() < mpy_end {
            return Err(ProtocolError::new(
                format!("module '{}' truncated", name),
                data,
            ));
        }

        modules.push(ProgramModule::new(
            name,
            Bytes::copy_from_slice(&rest[mpy_start..mpy_end]),
        ));
        pos += mpy_end;
    }

    Ok(modules)
}
