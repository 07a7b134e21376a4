// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Command line front end for Pybricks hubs

pub mod app;
pub mod compiler;
pub mod config;

pub use compiler::SourceFile;
pub use config::{CompilerConfig, Config, HubConfig, LoggingConfig};
