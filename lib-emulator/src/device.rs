// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! The emulated hub.
//!
//! Implements enough of the Pybricks firmware to run the host side against
//! it: device information, control commands, status reports, stdio and the
//! legacy checksummed download over the UART.

use crate::config::{EmulatorConfig, Faults};
use brickwire_hub::{Characteristic, GattDevice, Notifications, TransportError, WriteMode};
use brickwire_protocol::legacy::checksum;
use brickwire_protocol::version::{PROFILE_HUB_CAPABILITIES, PROFILE_WRITE_STDIN};
use brickwire_protocol::{
    python_version_to_semver, CommandType, Event, StatusFlags, DEVICE_INFO_SERVICE_UUID,
    FIRMWARE_REVISION_UUID, LEGACY_DOWNLOAD_CHUNK_SIZE, LEGACY_REPL_START, PNP_ID_UUID,
    PYBRICKS_CONTROL_EVENT_UUID, PYBRICKS_HUB_CAPABILITIES_UUID, PYBRICKS_SERVICE_UUID,
    SAFE_WRITE_SIZE, SOFTWARE_REVISION_UUID, UART_RX_UUID, UART_SERVICE_UUID, UART_TX_UUID,
};
use bytes::{Buf, Bytes};
use log::{debug, info, warn};
use semver::Version;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

/// Interval of the periodic status report
const STATUS_INTERVAL_MILLISECONDS: u64 = 500;

#[derive(Debug, Default)]
struct LegacyDownload {
    expected: Option<usize>,
    received: Vec<u8>,
    block: Vec<u8>,
}

#[derive(Debug, Default)]
struct DeviceState {
    connected: bool,
    /// Increments on every connect, stale background tasks compare against it
    generation: u64,
    subscriptions: HashMap<Uuid, mpsc::UnboundedSender<Bytes>>,
    running: bool,
    repl: bool,
    selected_slot: u8,
    ram: Vec<u8>,
    program: Bytes,
    legacy: LegacyDownload,
    writes: Vec<(Uuid, Bytes)>,
    completed_writes: usize,
}

struct DeviceInner {
    id: String,
    config: EmulatorConfig,
    profile: Version,
    faults: Faults,
    state: Mutex<DeviceState>,
    disconnects: broadcast::Sender<()>,
}

/// Handle to an emulated hub, clones share the hub
#[derive(Clone)]
pub struct EmulatedDevice {
    inner: Arc<DeviceInner>,
}

impl std::fmt::Debug for EmulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedDevice")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .finish()
    }
}

impl EmulatedDevice {
    pub fn new(config: EmulatorConfig) -> Self {
        Self::with_faults(config, Faults::default())
    }

    pub fn with_faults(config: EmulatorConfig, faults: Faults) -> Self {
        let profile = python_version_to_semver(&config.software_revision).unwrap_or_else(|e| {
            warn!("Emulator profile version invalid, assuming newest: {}", e);
            brickwire_protocol::version::SUPPORTED_PROFILE_VERSION
        });
        let (disconnects, _) = broadcast::channel(8);

        Self {
            inner: Arc::new(DeviceInner {
                id: "emulator-0001".to_string(),
                config,
                profile,
                faults,
                state: Mutex::new(DeviceState::default()),
                disconnects,
            }),
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.inner.config
    }

    fn legacy_download(&self) -> bool {
        self.inner.profile < PROFILE_HUB_CAPABILITIES
    }

    fn stdout_over_uart(&self) -> bool {
        self.inner.profile < PROFILE_WRITE_STDIN
    }

    /// Every write the hub received, including those still in flight
    pub async fn writes(&self) -> Vec<(Uuid, Bytes)> {
        self.inner.state.lock().await.writes.clone()
    }

    /// Values written to the control characteristic
    pub async fn control_writes(&self) -> Vec<Bytes> {
        self.writes_to(PYBRICKS_CONTROL_EVENT_UUID).await
    }

    /// Values written to the UART RX characteristic
    pub async fn uart_writes(&self) -> Vec<Bytes> {
        self.writes_to(UART_RX_UUID).await
    }

    async fn writes_to(&self, uuid: Uuid) -> Vec<Bytes> {
        self.inner
            .state
            .lock()
            .await
            .writes
            .iter()
            .filter(|(target, _)| *target == uuid)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Let `count` gated writes through
    pub fn release_writes(&self, count: usize) {
        match &self.inner.faults.write_gate {
            Some(gate) => gate.add_permits(count),
            None => warn!("Writes are not gated"),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.connected
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    /// The last program downloaded
    pub async fn program(&self) -> Bytes {
        self.inner.state.lock().await.program.clone()
    }

    /// Print on the hub's stdout
    pub async fn print(&self, text: &str) {
        let state = self.inner.state.lock().await;
        self.stdout(&state, text.as_bytes());
    }

    /// Pretend a program was started with the button on the hub
    pub async fn press_button(&self) {
        let mut state = self.inner.state.lock().await;
        if state.running {
            self.stop_program(&mut state);
        } else {
            self.start_program(&mut state);
        }
    }

    /// Drop the connection from the hub side
    pub async fn simulate_disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        self.drop_connection(&mut state);
    }

    fn drop_connection(&self, state: &mut DeviceState) {
        if !state.connected {
            return;
        }
        info!("Emulated hub disconnected");
        state.connected = false;
        state.subscriptions.clear();
        state.running = false;
        state.repl = false;
        state.legacy = LegacyDownload::default();
        let _ = self.inner.disconnects.send(());
    }

    fn notify(&self, state: &DeviceState, uuid: Uuid, value: Bytes) {
        if let Some(tx) = state.subscriptions.get(&uuid) {
            let _ = tx.send(value);
        }
    }

    fn send_status(&self, state: &DeviceState) {
        let mut flags = StatusFlags::empty();
        flags.set(StatusFlags::USER_PROGRAM_RUNNING, state.running);
        let report = Event::StatusReport {
            flags,
            running_program: 0,
            selected_slot: state.selected_slot,
        };
        self.notify(state, PYBRICKS_CONTROL_EVENT_UUID, report.encode());
    }

    fn stdout(&self, state: &DeviceState, data: &[u8]) {
        if self.stdout_over_uart() {
            for chunk in data.chunks(SAFE_WRITE_SIZE) {
                self.notify(state, UART_TX_UUID, Bytes::copy_from_slice(chunk));
            }
        } else {
            let size = usize::from(self.inner.config.max_write_size)
                .saturating_sub(1)
                .max(1);
            for chunk in data.chunks(size) {
                let event = Event::WriteStdout(Bytes::copy_from_slice(chunk));
                self.notify(state, PYBRICKS_CONTROL_EVENT_UUID, event.encode());
            }
        }
    }

    fn start_program(&self, state: &mut DeviceState) {
        debug!("Emulated hub starts program of {} bytes", state.program.len());
        state.running = true;
        state.repl = false;
        self.send_status(state);
        self.stdout(state, self.inner.config.program_output.as_bytes());
    }

    fn start_repl(&self, state: &mut DeviceState) {
        debug!("Emulated hub starts REPL");
        state.running = true;
        state.repl = true;
        self.send_status(state);
        self.stdout(state, b">>> ");
    }

    fn stop_program(&self, state: &mut DeviceState) {
        if state.running {
            state.running = false;
            state.repl = false;
            self.send_status(state);
        }
    }

    fn handle_command(&self, state: &mut DeviceState, value: &Bytes) -> Result<(), TransportError> {
        let mut data = value.clone();
        if data.is_empty() {
            return Err(TransportError::Other("empty command".to_string()));
        }
        let command = data.get_u8();

        match command {
            c if c == CommandType::StopUserProgram as u8 => self.stop_program(state),
            c if c == CommandType::StartUserProgram as u8 => {
                if data.has_remaining() {
                    state.selected_slot = data.get_u8();
                }
                if !state.running {
                    self.start_program(state);
                }
            }
            c if c == CommandType::StartRepl as u8 => {
                if !state.running {
                    self.start_repl(state);
                }
            }
            c if c == CommandType::WriteUserProgramMeta as u8 => {
                if data.remaining() < 4 {
                    return Err(TransportError::Other("short meta command".to_string()));
                }
                let size = data.get_u32_le() as usize;
                if size == 0 {
                    state.program = Bytes::new();
                } else {
                    state.ram.resize(size.max(state.ram.len()), 0);
                    state.program = Bytes::copy_from_slice(&state.ram[..size]);
                }
            }
            c if c == CommandType::WriteUserRam as u8 => {
                if data.remaining() < 4 {
                    return Err(TransportError::Other("short RAM command".to_string()));
                }
                let offset = data.get_u32_le() as usize;
                let end = offset + data.remaining();
                if end > self.inner.config.max_user_program_size as usize {
                    return Err(TransportError::Other("write past user RAM".to_string()));
                }
                if state.ram.len() < end {
                    state.ram.resize(end, 0);
                }
                state.ram[offset..end].copy_from_slice(&data);
            }
            c if c == CommandType::ResetInUpdateMode as u8 => {
                info!("Emulated hub reboots to update mode");
                self.drop_connection(state);
            }
            c if c == CommandType::WriteStdin as u8 => {
                if state.running {
                    self.stdout(state, &data);
                }
            }
            c if c == CommandType::WriteAppData as u8 => {
                if data.remaining() < 2 {
                    return Err(TransportError::Other("short app data command".to_string()));
                }
                data.advance(2);
                let event = Event::WriteAppData(data);
                self.notify(state, PYBRICKS_CONTROL_EVENT_UUID, event.encode());
            }
            other => {
                warn!("Emulated hub got unknown command {:#04x}", other);
                return Err(TransportError::Other("command not supported".to_string()));
            }
        }
        Ok(())
    }

    fn handle_uart(&self, state: &mut DeviceState, data: &[u8]) {
        if state.running {
            // echo, like the REPL and most programs do
            self.stdout(state, data);
            return;
        }

        if !self.legacy_download() {
            debug!("Emulated hub ignores UART input while idle");
            return;
        }

        let Some(expected) = state.legacy.expected else {
            if data == LEGACY_REPL_START {
                self.start_repl(state);
            } else if data.len() == 4 {
                let size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
                debug!("Emulated hub expects {} bytes", size);
                state.legacy.expected = Some(size);
                self.reply_checksum(state, checksum(data));
            } else {
                debug!("Emulated hub ignores {} bytes of UART input", data.len());
            }
            return;
        };

        state.legacy.block.extend_from_slice(data);
        let done = state.legacy.received.len() + state.legacy.block.len() >= expected;
        if state.legacy.block.len() < LEGACY_DOWNLOAD_CHUNK_SIZE && !done {
            return;
        }

        let block = std::mem::take(&mut state.legacy.block);
        self.reply_checksum(state, checksum(&block));
        state.legacy.received.extend_from_slice(&block);

        if done {
            let legacy = std::mem::take(&mut state.legacy);
            state.program = Bytes::from(legacy.received);
            self.start_program(state);
        }
    }

    fn reply_checksum(&self, state: &DeviceState, mut value: u8) {
        if self.inner.faults.drop_checksum {
            debug!("Dropping checksum {:#04x}", value);
            return;
        }
        if self.inner.faults.corrupt_checksum {
            value ^= 0xff;
        }
        self.notify(state, UART_TX_UUID, Bytes::copy_from_slice(&[value]));
    }

    async fn status_loop(self, generation: u64) {
        let interval = Duration::from_millis(STATUS_INTERVAL_MILLISECONDS);
        loop {
            tokio::time::sleep(interval).await;
            let state = self.inner.state.lock().await;
            if !state.connected || state.generation != generation {
                break;
            }
            self.send_status(&state);
        }
    }

    fn known_characteristic(&self, service: Uuid, uuid: Uuid) -> bool {
        if self.inner.faults.missing_characteristics.contains(&uuid) {
            return false;
        }
        if service == DEVICE_INFO_SERVICE_UUID {
            uuid == FIRMWARE_REVISION_UUID
                || uuid == SOFTWARE_REVISION_UUID
                || (uuid == PNP_ID_UUID && self.inner.config.hub_type.is_some())
        } else if service == PYBRICKS_SERVICE_UUID {
            uuid == PYBRICKS_CONTROL_EVENT_UUID
                || (uuid == PYBRICKS_HUB_CAPABILITIES_UUID && !self.legacy_download())
        } else if service == UART_SERVICE_UUID {
            uuid == UART_RX_UUID || uuid == UART_TX_UUID
        } else {
            false
        }
    }
}

impl GattDevice for EmulatedDevice {
    fn id(&self) -> String {
        self.inner.id.clone()
    }

    fn name(&self) -> Option<String> {
        Some(self.inner.config.name.clone())
    }

    fn has_gatt(&self) -> bool {
        !self.inner.faults.no_gatt
    }

    fn disconnect_events(&self) -> broadcast::Receiver<()> {
        self.inner.disconnects.subscribe()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock().await;
        state.connected = true;
        state.generation += 1;
        info!("Emulated hub connected");
        tokio::spawn(self.clone().status_loop(state.generation));
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        self.drop_connection(&mut state);
    }

    async fn primary_service(&self, service: Uuid) -> Result<(), TransportError> {
        if !self.inner.state.lock().await.connected {
            return Err(TransportError::Disconnected);
        }
        let known = service == DEVICE_INFO_SERVICE_UUID
            || service == PYBRICKS_SERVICE_UUID
            || service == UART_SERVICE_UUID;
        if !known || self.inner.faults.missing_services.contains(&service) {
            return Err(TransportError::NotFound(format!("service {}", service)));
        }
        Ok(())
    }

    async fn characteristic(
        &self,
        service: Uuid,
        uuid: Uuid,
    ) -> Result<Characteristic, TransportError> {
        if !self.inner.state.lock().await.connected {
            return Err(TransportError::Disconnected);
        }
        if !self.known_characteristic(service, uuid) {
            return Err(TransportError::NotFound(format!("characteristic {}", uuid)));
        }
        Ok(Characteristic { service, uuid })
    }

    async fn read_value(&self, characteristic: Characteristic) -> Result<Bytes, TransportError> {
        if !self.inner.state.lock().await.connected {
            return Err(TransportError::Disconnected);
        }
        let config = &self.inner.config;
        let uuid = characteristic.uuid;

        if uuid == FIRMWARE_REVISION_UUID {
            Ok(Bytes::from(config.firmware_revision.clone()))
        } else if uuid == SOFTWARE_REVISION_UUID {
            Ok(Bytes::from(config.software_revision.clone()))
        } else if uuid == PNP_ID_UUID {
            config
                .pnp_id()
                .map(|pnp_id| pnp_id.encode())
                .ok_or_else(|| TransportError::NotFound("PnP ID".to_string()))
        } else if uuid == PYBRICKS_HUB_CAPABILITIES_UUID {
            Ok(config.capabilities().encode())
        } else {
            Err(TransportError::Other(format!("{} is not readable", uuid)))
        }
    }

    async fn write_value(
        &self,
        characteristic: Characteristic,
        value: Bytes,
        _mode: WriteMode,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.inner.state.lock().await;
            if !state.connected {
                return Err(TransportError::Disconnected);
            }
            state.writes.push((characteristic.uuid, value.clone()));
        }

        if let Some(gate) = &self.inner.faults.write_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.inner.state.lock().await;
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        if self.inner.faults.failing_writes.contains(&characteristic.uuid) {
            return Err(TransportError::Other("write rejected".to_string()));
        }

        let result = if characteristic.uuid == PYBRICKS_CONTROL_EVENT_UUID {
            self.handle_command(&mut state, &value)
        } else if characteristic.uuid == UART_RX_UUID {
            self.handle_uart(&mut state, &value);
            Ok(())
        } else {
            Err(TransportError::Other(format!(
                "{} is not writable",
                characteristic.uuid
            )))
        };

        state.completed_writes += 1;
        if let Some(limit) = self.inner.faults.disconnect_after_writes {
            if state.completed_writes >= limit {
                self.drop_connection(&mut state);
                return Err(TransportError::Disconnected);
            }
        }
        result
    }

    async fn start_notifications(
        &self,
        characteristic: Characteristic,
    ) -> Result<Notifications, TransportError> {
        let mut state = self.inner.state.lock().await;
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscriptions.insert(characteristic.uuid, tx);
        if characteristic.uuid == PYBRICKS_CONTROL_EVENT_UUID {
            self.send_status(&state);
        }
        Ok(rx)
    }

    async fn stop_notifications(&self, characteristic: Characteristic) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock().await;
        state.subscriptions.remove(&characteristic.uuid);
        Ok(())
    }
}
