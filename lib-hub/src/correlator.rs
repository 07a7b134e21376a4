// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Issues commands and raw writes to the hub and tracks their outcome.
//!
//! Every write gets a transaction id from a counter shared by all writers.
//! The write itself runs as a detached task that reports back on the event
//! bus, so whoever is waiting can be cancelled without losing the result.

use crate::bus::{EventBus, EventStream, HubEvent};
use crate::error::CommandError;
use crate::transport::{Characteristic, GattDevice, TransportError, WriteMode};
use brickwire_protocol::Command;
use bytes::Bytes;
use log::{debug, error, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Source of transaction ids
#[derive(Debug, Clone, Default)]
pub struct TransactionIds(Arc<AtomicU32>);

impl TransactionIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Which acknowledgement events a detached write publishes
#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Command,
    Uart,
}

impl WriteKind {
    fn outcome(self, id: u32, result: Result<(), TransportError>) -> HubEvent {
        match (self, result) {
            (WriteKind::Command, Ok(())) => HubEvent::CommandDidSend { id },
            (WriteKind::Command, Err(e)) => HubEvent::CommandDidFailToSend {
                id,
                error: CommandError::Transport(e),
            },
            (WriteKind::Uart, Ok(())) => HubEvent::UartDidWrite { id },
            (WriteKind::Uart, Err(error)) => HubEvent::UartDidFailToWrite { id, error },
        }
    }
}

/// Write on a task of its own, the outcome is published on the bus
fn spawn_write<D: GattDevice>(
    device: Arc<D>,
    characteristic: Characteristic,
    mode: WriteMode,
    kind: WriteKind,
    id: u32,
    data: Bytes,
    bus: EventBus,
) {
    tokio::spawn(async move {
        debug!("{:?} {} TX: {:02x?}", kind, id, &data[..]);
        let result = device.write_value(characteristic, data, mode).await;
        if let Err(e) = &result {
            error!("{:?} {} write failed: {}", kind, id, e);
        }
        bus.publish(kind.outcome(id, result));
    });
}

/// Wait until the write with `id` completed or the hub went away.
///
/// Fails if the stream lagged, the acknowledgement may have been skipped.
async fn await_outcome(events: &mut EventStream, id: u32) -> Result<(), CommandError> {
    events
        .take_lossless(|event| match event {
            HubEvent::CommandDidSend { id: done } | HubEvent::UartDidWrite { id: done }
                if *done == id =>
            {
                Some(Ok(()))
            }
            HubEvent::CommandDidFailToSend { id: done, error } if *done == id => {
                Some(Err(error.clone()))
            }
            HubEvent::UartDidFailToWrite { id: done, error } if *done == id => {
                Some(Err(CommandError::Transport(error.clone())))
            }
            HubEvent::Disconnected => Some(Err(CommandError::Transport(
                TransportError::Disconnected,
            ))),
            _ => None,
        })
        .await
        .map_err(|skipped| {
            warn!("Lost track of write {}, skipped {} events", id, skipped);
            CommandError::Lagged(skipped)
        })?
        .unwrap_or(Err(CommandError::NotConnected))
}

struct QueuedCommand {
    id: u32,
    command: Command,
}

impl std::fmt::Debug for QueuedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.command)
    }
}

/// A command that has been queued, see [`PendingCommand::outcome`]
#[derive(Debug)]
pub struct PendingCommand {
    id: u32,
    events: EventStream,
}

impl PendingCommand {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Resolves once the command was written or failed to be written
    pub async fn outcome(mut self) -> Result<(), CommandError> {
        await_outcome(&mut self.events, self.id).await
    }
}

/// Serializes commands to the control characteristic.
///
/// Commands are written one at a time, the next one only after the previous
/// one was acknowledged by the transport.
#[derive(Debug, Clone)]
pub struct Correlator {
    queue: mpsc::UnboundedSender<QueuedCommand>,
    ids: TransactionIds,
    bus: EventBus,
}

impl Correlator {
    /// Start the drain loop writing to `control`
    pub fn spawn<D: GattDevice>(
        device: Arc<D>,
        control: Characteristic,
        ids: TransactionIds,
        bus: EventBus,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::drain(device, control, rx, bus.clone()));
        (
            Self {
                queue: tx,
                ids,
                bus,
            },
            task,
        )
    }

    async fn drain<D: GattDevice>(
        device: Arc<D>,
        control: Characteristic,
        mut queue: mpsc::UnboundedReceiver<QueuedCommand>,
        bus: EventBus,
    ) {
        while let Some(QueuedCommand { id, command }) = queue.recv().await {
            debug!("Sending command {}: {}", id, command);
            // subscribe before the write so the acknowledgement can't be missed
            let mut events = bus.subscribe();
            spawn_write(
                device.clone(),
                control,
                WriteMode::WithResponse,
                WriteKind::Command,
                id,
                command.encode(),
                bus.clone(),
            );
            if let Err(e) = await_outcome(&mut events, id).await {
                debug!("Command {} failed: {}", id, e);
            }
        }
        debug!("Command queue closed");
    }

    /// Queue a command, returns a handle to await its outcome
    pub fn issue(&self, command: Command) -> Result<PendingCommand, CommandError> {
        let id = self.ids.next();
        let events = self.bus.subscribe();
        self.queue
            .send(QueuedCommand { id, command })
            .map_err(|_| CommandError::NotConnected)?;
        Ok(PendingCommand { id, events })
    }

    /// Queue a command and wait for its outcome
    pub async fn send(&self, command: Command) -> Result<(), CommandError> {
        self.issue(command)?.outcome().await
    }
}

/// Raw writes to the UART RX characteristic.
///
/// Not queued, callers serialize their own writes.
pub struct UartWriter<D: GattDevice> {
    device: Arc<D>,
    rx: Characteristic,
    ids: TransactionIds,
    bus: EventBus,
}

impl<D: GattDevice> Clone for UartWriter<D> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            rx: self.rx,
            ids: self.ids.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<D: GattDevice> UartWriter<D> {
    pub fn new(device: Arc<D>, rx: Characteristic, ids: TransactionIds, bus: EventBus) -> Self {
        Self {
            device,
            rx,
            ids,
            bus,
        }
    }

    /// Write and wait until the transport acknowledged it
    pub async fn write(&self, data: Bytes) -> Result<(), CommandError> {
        let id = self.ids.next();
        let mut events = self.bus.subscribe();
        spawn_write(
            self.device.clone(),
            self.rx,
            WriteMode::WithoutResponse,
            WriteKind::Uart,
            id,
            data,
            self.bus.clone(),
        );
        await_outcome(&mut events, id).await
    }
}
