// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_emulator::{EmulatedDevice, EmulatorConfig, Faults};
use brickwire_hub::{
    Characteristic, CommandError, Correlator, EventBus, GattDevice, HubEvent, TransactionIds,
    TransportError, UartWriter,
};
use brickwire_protocol::{
    Command, PYBRICKS_CONTROL_EVENT_UUID, PYBRICKS_SERVICE_UUID, UART_RX_UUID, UART_SERVICE_UUID,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};

const CONTROL: Characteristic = Characteristic {
    service: PYBRICKS_SERVICE_UUID,
    uuid: PYBRICKS_CONTROL_EVENT_UUID,
};

const UART_RX: Characteristic = Characteristic {
    service: UART_SERVICE_UUID,
    uuid: UART_RX_UUID,
};

async fn setup(faults: Faults) -> (EmulatedDevice, Correlator, EventBus) {
    let device = EmulatedDevice::with_faults(EmulatorConfig::default(), faults);
    device.connect().await.unwrap();
    let bus = EventBus::new(64);
    let (correlator, _task) = Correlator::spawn(
        Arc::new(device.clone()),
        CONTROL,
        TransactionIds::new(),
        bus.clone(),
    );
    (device, correlator, bus)
}

async fn wait_for_writes(device: &EmulatedDevice, count: usize) {
    timeout(Duration::from_secs(2), async {
        while device.control_writes().await.len() < count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timeout waiting for writes");
}

#[tokio::test]
async fn test_commands_are_written_one_at_a_time() {
    let gate = Arc::new(Semaphore::new(0));
    let (device, correlator, _bus) = setup(Faults {
        write_gate: Some(gate),
        ..Faults::default()
    })
    .await;

    let mut pending = Vec::new();
    for _ in 0..4 {
        pending.push(correlator.issue(Command::StopUserProgram).unwrap());
    }

    wait_for_writes(&device, 1).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(device.control_writes().await.len(), 1);

    device.release_writes(2);
    let mut pending = pending.into_iter();
    pending.next().unwrap().outcome().await.unwrap();
    pending.next().unwrap().outcome().await.unwrap();

    wait_for_writes(&device, 3).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(device.control_writes().await.len(), 3);

    device.release_writes(2);
    for command in pending {
        command.outcome().await.unwrap();
    }
    assert_eq!(device.control_writes().await.len(), 4);
}

#[tokio::test]
async fn test_transaction_ids_are_unique() {
    let (_device, correlator, _bus) = setup(Faults::default()).await;

    let first = correlator.issue(Command::StartRepl).unwrap();
    let second = correlator.issue(Command::StopUserProgram).unwrap();
    assert!(second.id() > first.id());

    first.outcome().await.unwrap();
    second.outcome().await.unwrap();
}

#[tokio::test]
async fn test_acknowledgements_are_published() {
    let (_device, correlator, bus) = setup(Faults::default()).await;
    let mut events = bus.subscribe();

    let pending = correlator.issue(Command::StopUserProgram).unwrap();
    let id = pending.id();
    pending.outcome().await.unwrap();

    let acked = timeout(
        Duration::from_secs(1),
        events.take(|event| match event {
            HubEvent::CommandDidSend { id: done } => Some(*done),
            _ => None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(acked, Some(id));
}

#[tokio::test]
async fn test_failed_write_reports_disconnect() {
    let (_device, correlator, bus) = setup(Faults {
        disconnect_after_writes: Some(1),
        ..Faults::default()
    })
    .await;
    let mut events = bus.subscribe();

    let err = correlator.send(Command::StopUserProgram).await.unwrap_err();
    assert_eq!(err, CommandError::Transport(TransportError::Disconnected));
    assert!(err.is_disconnect());

    let failed = timeout(
        Duration::from_secs(1),
        events.take(|event| match event {
            HubEvent::CommandDidFailToSend { error, .. } => Some(error.clone()),
            _ => None,
        }),
    )
    .await
    .unwrap();
    assert!(failed.is_some());

    // the queue keeps going, the hub is just gone
    let err = correlator.send(Command::StopUserProgram).await.unwrap_err();
    assert!(err.is_disconnect());
}

#[tokio::test]
async fn test_uart_writes_are_acknowledged() {
    let device = EmulatedDevice::new(EmulatorConfig::default());
    device.connect().await.unwrap();
    let bus = EventBus::new(64);
    let uart = UartWriter::new(
        Arc::new(device.clone()),
        UART_RX,
        TransactionIds::new(),
        bus.clone(),
    );

    uart.write(Bytes::from_static(b"hello")).await.unwrap();
    assert_eq!(device.uart_writes().await, vec![Bytes::from_static(b"hello")]);
}
