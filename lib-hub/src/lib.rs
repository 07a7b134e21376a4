// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! # Brickwire Hub
//!
//! Talks to a Pybricks hub over any Bluetooth LE host implementing
//! [`BleHost`]:
//! - Connection handshake with the device information, Pybricks and UART services
//! - Command queue with per-write acknowledgements
//! - Hub runtime state tracking
//! - Program download, legacy and modern
//! - Terminal input and output

pub mod bus;
pub mod cleanup;
mod connection;
pub mod constants;
pub mod correlator;
pub mod download;
pub mod error;
pub mod hub;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod stdio;
pub mod transport;

// Re-export commonly used types
pub use bus::{EventBus, EventStream, HubEvent};
pub use cleanup::CleanupStack;
pub use correlator::{Correlator, PendingCommand, TransactionIds, UartWriter};
pub use download::{Precompiled, ProgramSource};
pub use error::{Alert, AlertAction, CommandError, CompileError, ConnectError, DownloadError};
pub use hub::{ConnectOutcome, Hub};
pub use runtime::{RuntimeInput, RuntimeState, RuntimeTracker, Transition};
pub use session::{ConnectionSession, ConnectionState, LegacyFlags};
pub use settings::{DisconnectPolicy, HubSettings, TimingSettings};
pub use stdio::Utf8StreamDecoder;
pub use transport::{
    Availability, BleHost, Characteristic, GattDevice, Notifications, RequestDeviceOptions,
    TransportError, WriteMode,
};
