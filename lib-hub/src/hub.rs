// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::bus::{EventBus, EventStream, HubEvent};
use crate::cleanup::CleanupStack;
use crate::connection::{handshake, request_device, Link, LinkSlot};
use crate::constants::{DISCONNECT_TIMEOUT_MILLISECONDS, EVENT_BUS_CAPACITY};
use crate::correlator::TransactionIds;
use crate::download::{self, ProgramSource};
use crate::error::{Alert, CommandError, ConnectError, DownloadError};
use crate::runtime::{RuntimeInput, RuntimeState, RuntimeTracker};
use crate::session::{ConnectionSession, ConnectionState};
use crate::settings::{DisconnectPolicy, HubSettings};
use crate::stdio::StdinRelay;
use crate::transport::{BleHost, GattDevice};
use brickwire_protocol::{Command, FileFormat, LEGACY_REPL_START};
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::timeout;

/// How a connection attempt ended if it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// The user dismissed the device picker
    Cancelled,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner<H: BleHost> {
    host: H,
    settings: HubSettings,
    bus: EventBus,
    ids: TransactionIds,
    runtime: RuntimeTracker,
    state: StdMutex<ConnectionState>,
    link: LinkSlot<H::Device>,
    cleanup: Mutex<CleanupStack>,
    user_disconnect: AtomicBool,
    stdin: mpsc::UnboundedSender<String>,
}

impl<H: BleHost> Inner<H> {
    fn set_state(&self, state: ConnectionState) {
        debug!("Connection state: {:?}", state);
        *lock(&self.state) = state;
    }

    fn fail_connect(&self, e: ConnectError) -> ConnectError {
        error!("Connect failed: {}", e);
        if let Some(alert) = e.alert() {
            self.bus.publish(HubEvent::Alert(alert));
        }
        self.bus.publish(HubEvent::ConnectFailed(e.to_string()));
        e
    }

    async fn finish_disconnect(&self) {
        let user_requested = self.user_disconnect.swap(false, Ordering::SeqCst);
        if user_requested {
            info!("Hub disconnected");
        } else {
            warn!("Hub disconnected unexpectedly");
        }

        if let Some(delay) = self.settings.disconnect_policy().delay(user_requested) {
            tokio::time::sleep(delay).await;
        }

        self.cleanup.lock().await.unwind();
        *self.link.write().await = None;
        self.set_state(ConnectionState::Disconnected);
        self.runtime.apply(RuntimeInput::Disconnected).await;
        self.bus.publish(HubEvent::Disconnected);
    }
}

/// Resets the connection state if a connect attempt is abandoned
struct ConnectingGuard<'a> {
    state: &'a StdMutex<ConnectionState>,
    armed: bool,
}

impl ConnectingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *lock(self.state) = ConnectionState::Disconnected;
        }
    }
}

/// Watches the transport for the disconnect of an established connection
async fn supervise<H: BleHost>(inner: Weak<Inner<H>>, mut disconnects: broadcast::Receiver<()>) {
    // lagged or closed counts as disconnected as well
    let _ = disconnects.recv().await;
    if let Some(inner) = inner.upgrade() {
        inner.finish_disconnect().await;
    }
}

/// Connection to one Pybricks hub at a time.
///
/// Cloning is cheap, all clones drive the same connection.
pub struct Hub<H: BleHost> {
    inner: Arc<Inner<H>>,
}

impl<H: BleHost> Clone for Hub<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: BleHost> Hub<H> {
    /// Create the hub and start the stdin relay, needs a tokio runtime
    pub fn new(host: H, settings: HubSettings) -> Self {
        let bus = EventBus::new(EVENT_BUS_CAPACITY);
        let runtime = RuntimeTracker::new(bus.clone());
        let link: LinkSlot<H::Device> = Arc::new(RwLock::new(None));
        let (stdin, input) = mpsc::unbounded_channel();

        StdinRelay::new(
            link.clone(),
            runtime.clone(),
            bus.clone(),
            settings.timing.clone(),
        )
        .spawn(input);

        Self {
            inner: Arc::new(Inner {
                host,
                settings,
                bus,
                ids: TransactionIds::new(),
                runtime,
                state: StdMutex::new(ConnectionState::Disconnected),
                link,
                cleanup: Mutex::new(CleanupStack::new()),
                user_disconnect: AtomicBool::new(false),
                stdin,
            }),
        }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.inner.settings
    }

    /// Subscribe to everything the hub reports
    pub fn events(&self) -> EventStream {
        self.inner.bus.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    pub async fn runtime_state(&self) -> RuntimeState {
        self.inner.runtime.get().await
    }

    /// What the handshake learned, `None` while not connected
    pub async fn session(&self) -> Option<ConnectionSession> {
        self.link().await.map(|link| link.session.clone())
    }

    pub async fn preferred_file_format(&self) -> Option<FileFormat> {
        self.link()
            .await
            .map(|link| link.session.preferred_file_format())
    }

    async fn link(&self) -> Option<Arc<Link<H::Device>>> {
        self.inner.link.read().await.clone()
    }

    /// Pick a hub and connect to it.
    ///
    /// Dropping the returned future aborts the attempt and releases
    /// everything acquired so far.
    pub async fn connect(&self) -> Result<ConnectOutcome, ConnectError> {
        let inner = &self.inner;

        {
            let mut state = lock(&inner.state);
            if *state != ConnectionState::Disconnected {
                warn!("Connect requested while {:?}", *state);
                return Err(ConnectError::Busy);
            }
            *state = ConnectionState::Connecting;
        }
        let mut guard = ConnectingGuard {
            state: &inner.state,
            armed: true,
        };
        inner.bus.publish(HubEvent::Connecting);

        let device = match request_device(&inner.host, &inner.settings).await {
            Ok(device) => Arc::new(device),
            Err(ConnectError::Cancelled) => {
                info!("No hub selected");
                inner.bus.publish(HubEvent::Alert(Alert::NoHub));
                inner.bus.publish(HubEvent::ConnectCancelled);
                return Ok(ConnectOutcome::Cancelled);
            }
            Err(e) => return Err(inner.fail_connect(e)),
        };

        let mut disconnects = device.disconnect_events();
        let result = tokio::select! {
            result = handshake(device.clone(), &inner.settings, &inner.bus, &inner.runtime, &inner.ids) => result,
            _ = disconnects.recv() => Err(ConnectError::Disconnected),
        };

        let (link, cleanup) = match result {
            Ok(established) => established,
            Err(e) => {
                if !matches!(e, ConnectError::NoGatt | ConnectError::Disconnected) {
                    device.disconnect().await;
                    let wait = Duration::from_millis(DISCONNECT_TIMEOUT_MILLISECONDS);
                    if timeout(wait, disconnects.recv()).await.is_err() {
                        warn!("Timeout waiting for disconnect");
                    }
                }
                return Err(inner.fail_connect(e));
            }
        };

        let id = link.session.device_id.clone();
        let name = link.session.device_name.clone();
        *inner.cleanup.lock().await = cleanup;
        *inner.link.write().await = Some(Arc::new(link));
        inner.user_disconnect.store(false, Ordering::SeqCst);
        guard.disarm();
        inner.set_state(ConnectionState::Connected);
        inner.runtime.apply(RuntimeInput::Connected).await;

        tokio::spawn(supervise(Arc::downgrade(&self.inner), disconnects));

        info!("Connected to {} ({})", name, id);
        inner.bus.publish(HubEvent::Connected { id, name });

        if inner.settings.stop_on_connect {
            if let Err(e) = self.send_stop().await {
                warn!("Failed to stop user program: {}", e);
            }
        }

        Ok(ConnectOutcome::Connected)
    }

    /// Disconnect and wait until the teardown has finished
    pub async fn disconnect(&self) {
        let Some(link) = self.link().await else {
            debug!("Disconnect requested while not connected");
            return;
        };

        let mut events = self.events();
        self.inner.user_disconnect.store(true, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Disconnecting);
        self.inner.bus.publish(HubEvent::Disconnecting);
        self.inner
            .runtime
            .apply(RuntimeInput::DisconnectRequested)
            .await;

        info!("Disconnecting from {}", link.session.device_name);
        link.device.disconnect().await;

        let mut wait = Duration::from_millis(DISCONNECT_TIMEOUT_MILLISECONDS);
        if let DisconnectPolicy::Grace(grace) = self.inner.settings.disconnect_policy() {
            wait += grace;
        }
        let done = events.take(|event| match event {
            HubEvent::Disconnected => Some(()),
            _ => None,
        });
        if timeout(wait, done).await.is_err() {
            warn!("Timeout waiting for disconnect");
        }
    }

    /// Compile `program`, send it to the hub and start it
    pub async fn download_and_run<P: ProgramSource>(
        &self,
        program: &P,
        format: FileFormat,
        slot: Option<u8>,
    ) -> Result<(), DownloadError> {
        let result = match self.link().await {
            Some(link) => {
                download::download_and_run(
                    &link,
                    &self.inner.runtime,
                    &self.inner.bus,
                    &self.inner.settings.timing,
                    program,
                    format,
                    slot,
                )
                .await
            }
            None => Err(DownloadError::NotConnected),
        };

        if let Err(e) = &result {
            error!("Download failed: {}", e);
            self.inner.bus.publish(HubEvent::Alert(e.alert()));
            self.inner.bus.publish(HubEvent::DownloadFailed(e.to_string()));
        }
        result
    }

    async fn send_stop(&self) -> Result<(), CommandError> {
        let link = self.link().await.ok_or(CommandError::NotConnected)?;
        let transition = self.inner.runtime.apply(RuntimeInput::StopProgram).await;
        if transition.from == RuntimeState::Loading {
            warn!("Refusing to stop program while hub is {}", transition.from);
            return Err(CommandError::Busy(transition.from));
        }
        let result = link.correlator.send(Command::StopUserProgram).await;
        self.inner.runtime.apply(RuntimeInput::StopProgramDone).await;
        result
    }

    fn alert_command_failure(&self, e: &CommandError) {
        let alert = match e {
            CommandError::NotConnected | CommandError::Busy(_) => return,
            e if e.is_disconnect() => Alert::LostConnection,
            e => Alert::UnexpectedError {
                message: e.to_string(),
            },
        };
        self.inner.bus.publish(HubEvent::Alert(alert));
    }

    pub async fn stop_user_program(&self) -> Result<(), CommandError> {
        let result = self.send_stop().await;
        if let Err(e) = &result {
            error!("Failed to stop user program: {}", e);
            self.alert_command_failure(e);
        }
        result
    }

    /// Start the interactive prompt
    pub async fn start_repl(&self) -> Result<(), CommandError> {
        let link = self.link().await.ok_or(CommandError::NotConnected)?;
        if !link.session.capabilities.has_repl() {
            warn!("Hub does not report REPL support");
        }

        let transition = self.inner.runtime.apply(RuntimeInput::StartRepl).await;
        if transition.from == RuntimeState::Loading {
            warn!("Refusing to start REPL while hub is {}", transition.from);
            return Err(CommandError::Busy(transition.from));
        }
        let result = if link.session.legacy.repl {
            // legacy firmware starts the REPL on any keypress while idle
            link.uart.write(Bytes::from_static(&LEGACY_REPL_START)).await
        } else {
            link.correlator.send(Command::StartRepl).await
        };
        self.inner.runtime.apply(RuntimeInput::StartReplDone).await;

        if let Err(e) = &result {
            error!("Failed to start REPL: {}", e);
            self.alert_command_failure(e);
        }
        result
    }

    /// Queue terminal input, it is sent while a program is running
    pub fn send_stdin(&self, text: impl Into<String>) {
        if self.inner.stdin.send(text.into()).is_err() {
            warn!("Stdin relay is gone");
        }
    }

    /// Send data to the running program, outside of stdio
    pub async fn write_app_data(&self, offset: u16, payload: Bytes) -> Result<(), CommandError> {
        let link = self.link().await.ok_or(CommandError::NotConnected)?;
        link.correlator
            .send(Command::WriteAppData { offset, payload })
            .await
    }
}

impl<H: BleHost> std::fmt::Debug for Hub<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("state", &self.connection_state())
            .finish()
    }
}
