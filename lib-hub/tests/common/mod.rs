// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

#![allow(dead_code)]

use brickwire_emulator::{EmulatedDevice, EmulatorConfig, EmulatorHost, Faults};
use brickwire_hub::{ConnectOutcome, EventStream, Hub, HubEvent, HubSettings, RuntimeState};
use std::time::Duration;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn settings() -> HubSettings {
    HubSettings {
        stop_on_connect: false,
        ..HubSettings::default()
    }
}

pub fn hub(config: EmulatorConfig, faults: Faults) -> (Hub<EmulatorHost>, EmulatedDevice) {
    hub_with_settings(config, faults, settings())
}

pub fn hub_with_settings(
    config: EmulatorConfig,
    faults: Faults,
    settings: HubSettings,
) -> (Hub<EmulatorHost>, EmulatedDevice) {
    let device = EmulatedDevice::with_faults(config, faults);
    let hub = Hub::new(EmulatorHost::new(device.clone()), settings);
    (hub, device)
}

pub async fn connected(config: EmulatorConfig) -> (Hub<EmulatorHost>, EmulatedDevice) {
    connected_with(config, Faults::default()).await
}

pub async fn connected_with(
    config: EmulatorConfig,
    faults: Faults,
) -> (Hub<EmulatorHost>, EmulatedDevice) {
    let (hub, device) = hub(config, faults);
    assert_eq!(hub.connect().await.unwrap(), ConnectOutcome::Connected);
    (hub, device)
}

/// Wait for the first event `f` maps to a value
pub async fn wait_for<T, F>(events: &mut EventStream, f: F) -> T
where
    F: FnMut(&HubEvent) -> Option<T>,
{
    timeout(WAIT, events.take(f))
        .await
        .expect("timeout waiting for event")
        .expect("event bus closed")
}

pub async fn wait_for_event(events: &mut EventStream, expected: HubEvent) {
    wait_for(events, |event| (*event == expected).then_some(())).await
}

pub async fn wait_for_runtime(events: &mut EventStream, state: RuntimeState) {
    wait_for_event(events, HubEvent::RuntimeStateChanged(state)).await
}

/// Everything published until nothing happened for a while
pub async fn drain(events: &mut EventStream) -> Vec<HubEvent> {
    let mut collected = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_millis(100), events.recv()).await {
        collected.push(event);
    }
    collected
}

/// Text printed to the terminal, in order
pub fn stdout_of(events: &[HubEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            HubEvent::Stdout(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
