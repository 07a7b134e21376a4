// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

mod common;

use brickwire_emulator::{EmulatedDevice, EmulatorConfig};
use brickwire_hub::{EventStream, HubEvent, RuntimeState};
use bytes::Bytes;
use common::*;
use std::time::Duration;
use tokio::time::{sleep, timeout};

async fn start_program(device: &EmulatedDevice, events: &mut EventStream) {
    device.press_button().await;
    wait_for_runtime(events, RuntimeState::Running).await;
}

async fn wait_for_stdin(device: &EmulatedDevice, count: usize, uart: bool) -> Vec<Bytes> {
    timeout(Duration::from_secs(2), async {
        loop {
            let writes: Vec<Bytes> = if uart {
                device.uart_writes().await
            } else {
                device
                    .control_writes()
                    .await
                    .into_iter()
                    .filter(|w| w[0] == 0x06)
                    .collect()
            };
            if writes.len() >= count {
                return writes;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timeout waiting for stdin")
}

#[tokio::test]
async fn test_stdout_from_control_events() {
    let (hub, device) = connected(EmulatorConfig::default()).await;
    let mut events = hub.events();

    device.print("hello").await;
    wait_for_event(&mut events, HubEvent::Stdout("hello".to_string())).await;
}

#[tokio::test]
async fn test_stdout_split_utf8() {
    // three bytes per WriteStdout event
    let config = EmulatorConfig {
        max_write_size: 4,
        ..EmulatorConfig::default()
    };
    let (hub, device) = connected(config).await;
    let mut events = hub.events();

    device.print("äöü").await;

    let published = drain(&mut events).await;
    assert_eq!(stdout_of(&published), "äöü");
    assert!(published.contains(&HubEvent::Stdout("ä".to_string())));
}

#[tokio::test]
async fn test_stdout_from_uart() {
    let (hub, device) = connected(EmulatorConfig::legacy("3.2.0", "1.2.0")).await;
    let mut events = hub.events();

    device.print("legacy hub says hi\n").await;

    let published = drain(&mut events).await;
    assert_eq!(stdout_of(&published), "legacy hub says hi\n");
}

#[tokio::test]
async fn test_stdin_rejected_without_program() {
    let (hub, device) = connected(EmulatorConfig::default()).await;
    let mut events = hub.events();

    hub.send_stdin("x");

    wait_for_event(&mut events, HubEvent::Stdout("\x07".to_string())).await;
    assert!(device.control_writes().await.is_empty());
}

#[tokio::test]
async fn test_stdin_is_coalesced() {
    let (hub, device) = connected(EmulatorConfig::default()).await;
    let mut events = hub.events();
    start_program(&device, &mut events).await;

    hub.send_stdin("12345678");
    hub.send_stdin("abcdefgh");

    let writes = wait_for_stdin(&device, 1, false).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(wait_for_stdin(&device, 1, false).await.len(), 1);
    assert_eq!(&writes[0][1..], b"12345678abcdefgh");

    // the emulated program echoes
    let published = drain(&mut events).await;
    assert!(stdout_of(&published).contains("12345678abcdefgh"));
}

#[tokio::test]
async fn test_stdin_is_chunked() {
    let config = EmulatorConfig {
        max_write_size: 20,
        ..EmulatorConfig::default()
    };
    let (hub, device) = connected(config).await;
    let mut events = hub.events();
    start_program(&device, &mut events).await;

    let text = "0123456789abcdefghijklmnopqrstuv";
    hub.send_stdin(text);

    let writes = wait_for_stdin(&device, 2, false).await;
    assert_eq!(writes[0].len() - 1, 20);
    assert_eq!(writes[1].len() - 1, 12);
    assert_eq!(&writes[0][1..], &text.as_bytes()[..20]);
    assert_eq!(&writes[1][1..], &text.as_bytes()[20..]);
}

#[tokio::test]
async fn test_legacy_stdin_over_uart() {
    let (hub, device) = connected(EmulatorConfig::legacy("3.2.0", "1.2.0")).await;
    let mut events = hub.events();
    start_program(&device, &mut events).await;

    let text = "0123456789abcdefghijklmnopqrstuv";
    hub.send_stdin(text);

    let writes = wait_for_stdin(&device, 2, true).await;
    assert_eq!(&writes[0][..], &text.as_bytes()[..20]);
    assert_eq!(&writes[1][..], &text.as_bytes()[20..]);
    assert!(device
        .control_writes()
        .await
        .iter()
        .all(|w| w[0] != 0x06));
}

#[tokio::test]
async fn test_app_data() {
    let (hub, _device) = connected(EmulatorConfig::default()).await;
    let mut events = hub.events();

    hub.write_app_data(0, Bytes::from_static(b"\x01\x02"))
        .await
        .unwrap();
    wait_for_event(&mut events, HubEvent::AppData(Bytes::from_static(b"\x01\x02"))).await;
}

#[tokio::test]
async fn test_start_repl() {
    let (hub, device) = connected(EmulatorConfig::default()).await;
    let mut events = hub.events();

    hub.start_repl().await.unwrap();

    wait_for_event(&mut events, HubEvent::Stdout(">>> ".to_string())).await;
    assert_eq!(device.control_writes().await, vec![Bytes::from_static(&[0x02])]);
    wait_for_runtime(&mut events, RuntimeState::Running).await;
}

#[tokio::test]
async fn test_legacy_start_repl() {
    let (hub, device) = connected(EmulatorConfig::legacy("3.1.0", "1.1.0")).await;
    let mut events = hub.events();

    hub.start_repl().await.unwrap();

    wait_for_event(&mut events, HubEvent::Stdout(">>> ".to_string())).await;
    assert_eq!(device.uart_writes().await, vec![Bytes::from_static(b"    ")]);
    assert!(device.control_writes().await.is_empty());
}

#[tokio::test]
async fn test_stop_user_program() {
    let (hub, device) = connected(EmulatorConfig::default()).await;
    let mut events = hub.events();
    start_program(&device, &mut events).await;

    hub.stop_user_program().await.unwrap();

    wait_for_runtime(&mut events, RuntimeState::Idle).await;
    assert!(!device.is_running().await);
}
