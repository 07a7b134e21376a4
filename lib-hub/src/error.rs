// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::runtime::RuntimeState;
use crate::transport::TransportError;
use brickwire_protocol::{
    FileFormat, ProtocolError, VersionError, DEVICE_INFO_SERVICE_UUID, PYBRICKS_SERVICE_UUID,
    UART_SERVICE_UUID,
};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Outcome of a single command or raw write
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("hub not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("hub is busy ({0})")]
    Busy(RuntimeState),

    #[error("acknowledgement lost, {0} events skipped")]
    Lagged(u64),
}

impl CommandError {
    /// Whether the command failed because the connection went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            CommandError::NotConnected => true,
            CommandError::Transport(e) => e.is_disconnect(),
            CommandError::Busy(_) | CommandError::Lagged(_) => false,
        }
    }
}

/// Reasons a connection attempt fails
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("no Bluetooth support on this host")]
    NoBluetooth,

    #[error("Bluetooth is not available")]
    BluetoothNotAvailable,

    #[error("device selection cancelled")]
    Cancelled,

    #[error("device has no GATT server")]
    NoGatt,

    #[error("{} service missing on {}", service_name(.service), .device)]
    MissingService { service: Uuid, device: String },

    #[error("characteristic {0} missing")]
    MissingCharacteristic(Uuid),

    #[error("PnP ID characteristic missing, firmware too old")]
    MissingPnpId,

    #[error("already connected or connecting")]
    Busy,

    #[error("hub disconnected during connect")]
    Disconnected,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("version error: {0}")]
    Version(#[from] VersionError),
}

impl ConnectError {
    /// Alert shown to the user for this failure
    pub fn alert(&self) -> Option<Alert> {
        Some(match self {
            ConnectError::NoBluetooth => Alert::NoWebBluetooth,
            ConnectError::BluetoothNotAvailable => Alert::BluetoothNotAvailable,
            ConnectError::Cancelled => Alert::NoHub,
            ConnectError::NoGatt => Alert::NoGatt,
            ConnectError::MissingService { service, device } => Alert::MissingService {
                service: service_name(service).to_string(),
                device: device.clone(),
            },
            ConnectError::MissingPnpId => Alert::OldFirmware,
            ConnectError::Disconnected => Alert::LostConnection,
            ConnectError::Busy => return None,
            other => Alert::UnexpectedError {
                message: other.to_string(),
            },
        })
    }
}

/// Errors of the program compiler collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("compiler not available: {0}")]
    Unavailable(String),

    #[error("compile failed: {0}")]
    Failed(String),
}

/// Reasons a download fails
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("hub not connected")]
    NotConnected,

    #[error("file format {0} not supported by the hub")]
    UnsupportedFormat(FileFormat),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("program is {size} bytes, hub accepts at most {max}")]
    ProgramTooLarge { size: usize, max: usize },

    #[error("hub is busy ({0})")]
    Busy(RuntimeState),

    #[error("command failed: {0}")]
    Command(#[from] CommandError),

    #[error("timeout waiting for checksum")]
    ChecksumTimeout,

    #[error("bad checksum {actual:#04x}, expected {expected:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

impl DownloadError {
    pub fn is_disconnect(&self) -> bool {
        match self {
            DownloadError::NotConnected => true,
            DownloadError::Command(e) => e.is_disconnect(),
            _ => false,
        }
    }

    pub fn alert(&self) -> Alert {
        match self {
            e if e.is_disconnect() => Alert::LostConnection,
            DownloadError::Compile(e) => Alert::CompileError {
                message: e.to_string(),
            },
            DownloadError::ProgramTooLarge { size, max } => Alert::UserProgramSize {
                actual: *size,
                max: *max,
            },
            DownloadError::ChecksumTimeout | DownloadError::ChecksumMismatch { .. } => {
                Alert::DownloadIntegrity
            }
            other => Alert::UnexpectedError {
                message: other.to_string(),
            },
        }
    }
}

/// Follow-up flow an alert offers to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    InstallFirmware,
    UpdateFirmware,
}

/// User facing notification, one per failure or advisory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    NoWebBluetooth,
    BluetoothNotAvailable,
    NoGatt,
    MissingService { service: String, device: String },
    /// Hub firmware is older than the bundled firmware
    OldFirmware,
    /// Hub speaks a newer profile than we implement
    NewPybricksProfile,
    /// No hub was selected
    NoHub,
    UserProgramSize { actual: usize, max: usize },
    LostConnection,
    DownloadIntegrity,
    CompileError { message: String },
    UnexpectedError { message: String },
}

impl Alert {
    pub fn action(&self) -> Option<AlertAction> {
        match self {
            Alert::NoHub => Some(AlertAction::InstallFirmware),
            Alert::OldFirmware | Alert::NewPybricksProfile => Some(AlertAction::UpdateFirmware),
            _ => None,
        }
    }

    /// Advisories don't abort what is going on
    pub fn is_advisory(&self) -> bool {
        matches!(self, Alert::OldFirmware | Alert::NewPybricksProfile)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::NoWebBluetooth => write!(f, "This host does not support Bluetooth"),
            Alert::BluetoothNotAvailable => write!(f, "Bluetooth is turned off or unavailable"),
            Alert::NoGatt => write!(f, "The selected device cannot be connected"),
            Alert::MissingService { service, device } => {
                write!(f, "The {} service was not found on {}", service, device)
            }
            Alert::OldFirmware => write!(f, "The hub firmware is out of date"),
            Alert::NewPybricksProfile => {
                write!(f, "The hub uses a newer protocol, some features may not work")
            }
            Alert::NoHub => write!(f, "No hub selected"),
            Alert::UserProgramSize { actual, max } => write!(
                f,
                "Program is {} bytes but the hub only accepts {} bytes",
                actual, max
            ),
            Alert::LostConnection => write!(f, "Connection to the hub was lost"),
            Alert::DownloadIntegrity => write!(f, "Program download was corrupted"),
            Alert::CompileError { message } => write!(f, "Compile error: {}", message),
            Alert::UnexpectedError { message } => write!(f, "Unexpected error: {}", message),
        }
    }
}

/// Human readable name of a known service
pub fn service_name(service: &Uuid) -> &'static str {
    if *service == DEVICE_INFO_SERVICE_UUID {
        "Device Information"
    } else if *service == PYBRICKS_SERVICE_UUID {
        "Pybricks"
    } else if *service == UART_SERVICE_UUID {
        "Nordic UART"
    } else {
        "unknown"
    }
}
