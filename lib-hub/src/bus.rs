// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::error::{Alert, CommandError};
use crate::runtime::RuntimeState;
use crate::transport::TransportError;
use brickwire_protocol::{HubCapabilities, PnpId, ProtocolError, StatusFlags};
use bytes::Bytes;
use log::warn;
use tokio::sync::broadcast;

/// Everything the hub tells the outside world, and the acknowledgements the
/// hub components wait on internally
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Connecting,
    Connected { id: String, name: String },
    /// Terminal event of a failed connection attempt
    ConnectFailed(String),
    /// The user dismissed the device picker
    ConnectCancelled,
    Disconnecting,
    Disconnected,

    FirmwareRevision(String),
    SoftwareRevision(String),
    PnpId(PnpId),
    Capabilities(HubCapabilities),

    /// A control command left the host
    CommandDidSend { id: u32 },
    CommandDidFailToSend { id: u32, error: CommandError },
    /// A raw UART write completed
    UartDidWrite { id: u32 },
    UartDidFailToWrite { id: u32, error: TransportError },
    /// Raw notification of the UART TX characteristic
    UartNotify(Bytes),
    /// Checksum reply during a legacy download
    Checksum(u8),

    StatusReport {
        flags: StatusFlags,
        running_program: u8,
        selected_slot: u8,
    },
    /// Text for the terminal
    Stdout(String),
    AppData(Bytes),
    ProtocolError(ProtocolError),
    RuntimeStateChanged(RuntimeState),

    DownloadStarted,
    /// Fraction of the program transferred, 0.0 to 1.0
    DownloadProgress(f32),
    DownloadFinished,
    DownloadFailed(String),

    Alert(Alert),
}

/// Broadcast channel shared by all hub components
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HubEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: HubEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving end of the [`EventBus`]
#[derive(Debug)]
pub struct EventStream {
    rx: broadcast::Receiver<HubEvent>,
}

impl EventStream {
    /// Next event, `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`EventStream::take`] but gives up once events were skipped,
    /// `Err` holds how many
    pub async fn take_lossless<T, F>(&mut self, mut predicate: F) -> Result<Option<T>, u64>
    where
        F: FnMut(&HubEvent) -> Option<T>,
    {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if let Some(value) = predicate(&event) {
                        return Ok(Some(value));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => return Err(skipped),
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }

    /// Wait for the first event the predicate maps to a value
    pub async fn take<T, F>(&mut self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&HubEvent) -> Option<T>,
    {
        while let Some(event) = self.recv().await {
            if let Some(value) = predicate(&event) {
                return Some(value);
            }
        }
        None
    }
}
