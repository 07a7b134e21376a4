// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Terminal traffic in both directions.
//!
//! Hub output arrives either as WriteStdout events on the control
//! characteristic or as plain bytes on the UART. Terminal input is batched
//! and written one chunk at a time, over the UART on legacy hubs and with
//! WriteStdin commands otherwise.

use crate::bus::{EventBus, HubEvent};
use crate::connection::LinkSlot;
use crate::runtime::{RuntimeInput, RuntimeState, RuntimeTracker};
use crate::settings::TimingSettings;
use crate::transport::{GattDevice, Notifications};
use brickwire_protocol::{decode_event, Command, Event, SAFE_WRITE_SIZE, TERMINAL_BELL};
use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Decodes UTF-8 that may be split across notifications
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode what is complete, keep a trailing partial sequence
    pub fn decode(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Bytes of an incomplete sequence waiting for the rest
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Handles notifications of the control/event characteristic
pub(crate) async fn control_events(
    mut notifications: Notifications,
    bus: EventBus,
    runtime: RuntimeTracker,
) {
    let mut decoder = Utf8StreamDecoder::new();

    while let Some(value) = notifications.recv().await {
        debug!("Control RX: {:02x?}", &value[..]);
        match decode_event(&value) {
            Ok(Event::StatusReport {
                flags,
                running_program,
                selected_slot,
            }) => {
                bus.publish(HubEvent::StatusReport {
                    flags,
                    running_program,
                    selected_slot,
                });
                runtime
                    .apply(RuntimeInput::StatusReport {
                        running: flags.user_program_running(),
                    })
                    .await;
            }
            Ok(Event::WriteStdout(payload)) => {
                let text = decoder.decode(&payload);
                if !text.is_empty() {
                    bus.publish(HubEvent::Stdout(text));
                }
            }
            Ok(Event::WriteAppData(payload)) => bus.publish(HubEvent::AppData(payload)),
            Err(e) => {
                warn!("Protocol error: {}", e);
                bus.publish(HubEvent::ProtocolError(e));
            }
        }
    }
    debug!("Control notifications ended");
}

/// Handles notifications of the UART TX characteristic.
///
/// A single byte while a legacy download is loading is the checksum reply.
pub(crate) async fn uart_events(
    mut notifications: Notifications,
    bus: EventBus,
    runtime: RuntimeTracker,
    legacy_download: bool,
) {
    let mut decoder = Utf8StreamDecoder::new();

    while let Some(value) = notifications.recv().await {
        debug!("UART RX: {:02x?}", &value[..]);
        bus.publish(HubEvent::UartNotify(value.clone()));

        if legacy_download && value.len() == 1 && runtime.get().await == RuntimeState::Loading {
            bus.publish(HubEvent::Checksum(value[0]));
            continue;
        }

        let text = decoder.decode(&value);
        if !text.is_empty() {
            bus.publish(HubEvent::Stdout(text));
        }
    }
    debug!("UART notifications ended");
}

/// Perpetual consumer of terminal input
pub(crate) struct StdinRelay<D: GattDevice> {
    link: LinkSlot<D>,
    runtime: RuntimeTracker,
    bus: EventBus,
    timing: TimingSettings,
}

impl<D: GattDevice> StdinRelay<D> {
    pub fn new(
        link: LinkSlot<D>,
        runtime: RuntimeTracker,
        bus: EventBus,
        timing: TimingSettings,
    ) -> Self {
        Self {
            link,
            runtime,
            bus,
            timing,
        }
    }

    pub fn spawn(self, input: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        tokio::spawn(self.run(input))
    }

    async fn chunk_size(&self) -> usize {
        match self.link.read().await.as_ref() {
            Some(link) => link.session.stdin_chunk_size(),
            None => SAFE_WRITE_SIZE,
        }
    }

    async fn run(self, mut input: mpsc::UnboundedReceiver<String>) {
        while let Some(mut text) = input.recv().await {
            // collect more input so we don't send one keystroke per write
            let chunk_size = self.chunk_size().await;
            while text.len() < chunk_size {
                match timeout(self.timing.coalesce_window(), input.recv()).await {
                    Ok(Some(more)) => text.push_str(&more),
                    _ => break,
                }
            }

            let link = self.link.read().await.clone();
            let link = match link {
                Some(link) if self.runtime.get().await == RuntimeState::Running => link,
                _ => {
                    debug!("No program running, dropping {} bytes of input", text.len());
                    self.bus.publish(HubEvent::Stdout(TERMINAL_BELL.to_string()));
                    continue;
                }
            };

            let data = Bytes::from(text.into_bytes());
            let chunk_size = link.session.stdin_chunk_size();
            for start in (0..data.len()).step_by(chunk_size) {
                let chunk = data.slice(start..(start + chunk_size).min(data.len()));

                if link.session.legacy.stdio {
                    let mut events = self.bus.subscribe();
                    if let Err(e) = link.uart.write(chunk).await {
                        warn!("Failed to write stdin: {}", e);
                    }
                    // no flow control on the UART, give the hub time to echo
                    let _ = timeout(
                        self.timing.echo_wait(),
                        events.take(|event| match event {
                            HubEvent::UartNotify(_) => Some(()),
                            _ => None,
                        }),
                    )
                    .await;
                } else if let Err(e) = link
                    .correlator
                    .send(Command::WriteStdin { payload: chunk })
                    .await
                {
                    warn!("Failed to send stdin: {}", e);
                }
            }
        }
        debug!("Stdin relay stopped");
    }
}
