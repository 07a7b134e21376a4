// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::bus::{EventBus, HubEvent};
use log::debug;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// What the hub is doing with user programs, as far as we know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    Disconnected,
    /// Connected but no status report seen since the last command
    Unknown,
    Idle,
    /// A program download is in progress
    Loading,
    Running,
    StartingRepl,
    StoppingUserProgram,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeState::Disconnected => "disconnected",
            RuntimeState::Unknown => "unknown",
            RuntimeState::Idle => "idle",
            RuntimeState::Loading => "loading",
            RuntimeState::Running => "running",
            RuntimeState::StartingRepl => "starting repl",
            RuntimeState::StoppingUserProgram => "stopping user program",
        };
        f.write_str(name)
    }
}

/// Inputs driving [`RuntimeState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeInput {
    Connected,
    DisconnectRequested,
    Disconnected,
    StartDownload,
    FinishDownload,
    FailDownload,
    StatusReport { running: bool },
    StartRepl,
    StartReplDone,
    StopProgram,
    StopProgramDone,
}

impl RuntimeState {
    /// Pure transition function, returns `self` when the input is ignored
    pub fn next(self, input: RuntimeInput) -> RuntimeState {
        use RuntimeInput as I;
        use RuntimeState as S;

        match (self, input) {
            (_, I::Disconnected) => S::Disconnected,
            (S::Disconnected, I::Connected) => S::Unknown,
            (S::Disconnected, _) => S::Disconnected,
            (_, I::DisconnectRequested) => S::Unknown,

            (S::Loading, I::FinishDownload) => S::Unknown,
            (S::Loading, I::FailDownload) => S::Idle,
            (S::Loading, _) => S::Loading,

            (S::StartingRepl, I::StartReplDone) => S::Unknown,
            (S::StartingRepl, _) => S::StartingRepl,

            (S::StoppingUserProgram, I::StopProgramDone) => S::Unknown,
            (S::StoppingUserProgram, _) => S::StoppingUserProgram,

            (S::Unknown | S::Idle, I::StartDownload) => S::Loading,
            (S::Unknown | S::Idle | S::Running, I::StatusReport { running: true }) => S::Running,
            (S::Unknown | S::Idle | S::Running, I::StatusReport { running: false }) => S::Idle,
            (S::Unknown | S::Idle | S::Running, I::StartRepl) => S::StartingRepl,
            (S::Unknown | S::Idle | S::Running, I::StartReplDone) => S::Unknown,
            (S::Unknown | S::Idle | S::Running, I::StopProgram) => S::StoppingUserProgram,
            (S::Unknown | S::Idle | S::Running, I::StopProgramDone) => S::Unknown,

            (state, _) => state,
        }
    }
}

/// Result of applying an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: RuntimeState,
    pub to: RuntimeState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Shared runtime state, publishes every change on the bus
#[derive(Debug, Clone)]
pub struct RuntimeTracker {
    state: Arc<RwLock<RuntimeState>>,
    bus: EventBus,
}

impl RuntimeTracker {
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: Arc::new(RwLock::new(RuntimeState::Disconnected)),
            bus,
        }
    }

    pub async fn get(&self) -> RuntimeState {
        *self.state.read().await
    }

    pub async fn apply(&self, input: RuntimeInput) -> Transition {
        let mut state = self.state.write().await;
        let transition = Transition {
            from: *state,
            to: state.next(input),
        };
        *state = transition.to;
        drop(state);

        if transition.changed() {
            debug!(
                "Runtime {} -> {} on {:?}",
                transition.from, transition.to, input
            );
            self.bus
                .publish(HubEvent::RuntimeStateChanged(transition.to));
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_ignores_disconnect_request() {
        assert_eq!(
            RuntimeState::Disconnected.next(RuntimeInput::DisconnectRequested),
            RuntimeState::Disconnected
        );
    }

    #[test]
    fn test_running_ignores_start_download() {
        assert_eq!(
            RuntimeState::Running.next(RuntimeInput::StartDownload),
            RuntimeState::Running
        );
    }
}
