// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Turns a program file into what the hub downloads.
//!
//! Python sources go through `mpy-cross`, precompiled `.mpy` files are used
//! as they are. Multi-file formats get wrapped in the program container.

use crate::config::CompilerConfig;
use brickwire_hub::{CompileError, ProgramSource};
use brickwire_protocol::{pack_multi_mpy, FileFormat};
use bytes::Bytes;
use log::{debug, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// First byte of every compiled module
const MPY_MAGIC: u8 = b'M';

/// A program file on disk
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    compiler: CompilerConfig,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, compiler: CompilerConfig) -> Self {
        Self {
            path: path.into(),
            compiler,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_precompiled(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mpy"))
    }

    async fn read(&self) -> Result<Bytes, CompileError> {
        tokio::fs::read(&self.path)
            .await
            .map(Bytes::from)
            .map_err(|e| CompileError::Failed(format!("{}: {}", self.path.display(), e)))
    }

    async fn cross_compile(&self) -> Result<Bytes, CompileError> {
        let dir = tempfile::tempdir()
            .map_err(|e| CompileError::Failed(format!("no temporary directory: {}", e)))?;
        let output = dir.path().join("main.mpy");

        info!("Compiling {} with {}", self.path.display(), self.compiler.mpy_cross);
        let result = Command::new(&self.compiler.mpy_cross)
            .args(&self.compiler.args)
            .arg("-o")
            .arg(&output)
            .arg(&self.path)
            .output()
            .await;

        let result = match result {
            Ok(result) => result,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CompileError::Unavailable(self.compiler.mpy_cross.clone()));
            }
            Err(e) => {
                return Err(CompileError::Unavailable(format!(
                    "{}: {}",
                    self.compiler.mpy_cross, e
                )));
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CompileError::Failed(stderr.trim().to_string()));
        }

        tokio::fs::read(&output)
            .await
            .map(Bytes::from)
            .map_err(|e| CompileError::Failed(format!("no compiler output: {}", e)))
    }
}

/// Checks the module was built for the ABI the hub runs
fn check_abi(mpy: &[u8], format: FileFormat) -> Result<(), CompileError> {
    match mpy {
        [MPY_MAGIC, version, ..] if *version == format.mpy_abi() => Ok(()),
        [MPY_MAGIC, version, ..] => Err(CompileError::Failed(format!(
            "module is MPY v{}, the hub needs MPY v{}",
            version,
            format.mpy_abi()
        ))),
        _ => Err(CompileError::Failed("not a compiled MicroPython module".to_string())),
    }
}

impl ProgramSource for SourceFile {
    async fn compile(&self, format: FileFormat) -> Result<Bytes, CompileError> {
        let mpy = if self.is_precompiled() {
            self.read().await?
        } else {
            self.cross_compile().await?
        };
        check_abi(&mpy, format)?;
        debug!("Module is {} bytes, packing as {}", mpy.len(), format);

        if format.is_multi_file() {
            Ok(pack_multi_mpy(mpy, &[]))
        } else {
            Ok(mpy)
        }
    }
}
