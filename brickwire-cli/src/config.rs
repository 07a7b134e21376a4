// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Configuration management for Brickwire
//!
//! Configuration files are searched in the following order:
//! 1. Path given with `--config`
//! 2. Current directory (brickwire.yaml)
//! 3. User's config directory:
//!    - macOS: ~/Library/Application Support/brickwire/brickwire.yaml
//!    - Linux: ~/.config/brickwire/brickwire.yaml
//!    - Windows: %APPDATA%\brickwire\brickwire.yaml
//!
//! If no configuration file is found, a default one is created in the user's config directory.

use anyhow::{bail, Context, Result};
use brickwire_emulator::EmulatorConfig;
use brickwire_hub::constants::BUNDLED_FIRMWARE_VERSION;
use brickwire_hub::{HubSettings, TimingSettings};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "brickwire.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// The hub to talk to when no Bluetooth stack is attached
    #[serde(default)]
    pub emulator: EmulatorConfig,
}

/// Which hub to use and how to treat it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    /// Slot for `run` when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_slot: Option<u8>,
    #[serde(default = "default_bundled_firmware_version")]
    pub bundled_firmware_version: String,
    #[serde(default = "default_true")]
    pub stop_on_connect: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name_prefix: None,
            default_slot: None,
            bundled_firmware_version: default_bundled_firmware_version(),
            stop_on_connect: true,
        }
    }
}

fn default_bundled_firmware_version() -> String {
    BUNDLED_FIRMWARE_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

/// The MicroPython cross compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_mpy_cross")]
    pub mpy_cross: String,
    /// Extra arguments, passed before the source file
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            mpy_cross: default_mpy_cross(),
            args: Vec::new(),
        }
    }
}

fn default_mpy_cross() -> String {
    "mpy-cross".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Per module levels, e.g. `brickwire_hub::correlator: debug`
    #[serde(default)]
    pub submodules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            submodules: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

impl LoggingConfig {
    /// Logger configured from this section, `RUST_LOG` takes precedence
    pub fn builder(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(parse_level(&self.level));
        for (module, level) in &self.submodules {
            builder.filter_module(module, parse_level(level));
        }
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        builder
    }

    pub fn init(&self) {
        // a logger may already be installed in tests
        let _ = self.builder().format_timestamp_millis().try_init();
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse YAML config")?;
        Ok(config)
    }

    /// Find and load the configuration, returns where it came from
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        if let Some(path) = explicit {
            if !path.exists() {
                bail!("Config file {:?} does not exist", path);
            }
            return Ok((Self::from_file(path)?, path.to_path_buf()));
        }

        let config_dir = Self::get_user_config_dir()?;
        Self::load_or_create(
            &Self::get_config_search_paths(CONFIG_FILE_NAME),
            &config_dir.join(CONFIG_FILE_NAME),
        )
    }

    /// Load the first existing file of `search_paths`, or write the default
    /// configuration to `default_path`
    pub fn load_or_create(search_paths: &[PathBuf], default_path: &Path) -> Result<(Self, PathBuf)> {
        for path in search_paths {
            if path.exists() {
                return Ok((Self::from_file(path)?, path.clone()));
            }
        }

        if let Some(config_dir) = default_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir).with_context(|| {
                    format!("Failed to create config directory: {:?}", config_dir)
                })?;
            }
        }

        let default_config = Self::default();
        let yaml = serde_yaml::to_string(&default_config)
            .with_context(|| "Failed to serialize default config")?;
        fs::write(default_path, yaml)
            .with_context(|| format!("Failed to write default config to: {:?}", default_path))?;

        Ok((default_config, default_path.to_path_buf()))
    }

    /// Get search paths for configuration file
    fn get_config_search_paths(filename: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(filename)];
        if let Ok(config_dir) = Self::get_user_config_dir() {
            paths.push(config_dir.join(filename));
        }
        paths
    }

    /// Get user's configuration directory
    fn get_user_config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Failed to get config directory")?
            .join("brickwire"))
    }

    /// Settings for the hub library
    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            name_prefix: self.hub.name_prefix.clone(),
            bundled_firmware_version: self.hub.bundled_firmware_version.clone(),
            stop_on_connect: self.hub.stop_on_connect,
            ..HubSettings::default()
        }
        .with_timing(self.timing.clone())
    }
}
