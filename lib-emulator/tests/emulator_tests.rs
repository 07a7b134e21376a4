// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_emulator::{EmulatedDevice, EmulatorConfig, EmulatorHost};
use brickwire_hub::{
    BleHost, Characteristic, GattDevice, RequestDeviceOptions, TransportError, WriteMode,
};
use brickwire_protocol::legacy::checksum;
use brickwire_protocol::{
    decode_event, decode_hub_capabilities, decode_pnp_id, hub_type_name, Event,
    DEVICE_INFO_SERVICE_UUID, PNP_ID_UUID, PYBRICKS_CONTROL_EVENT_UUID,
    PYBRICKS_HUB_CAPABILITIES_UUID, PYBRICKS_SERVICE_UUID, UART_RX_UUID, UART_SERVICE_UUID,
    UART_TX_UUID,
};
use bytes::Bytes;

async fn characteristic(device: &EmulatedDevice, service: uuid::Uuid, uuid: uuid::Uuid) -> Characteristic {
    device.characteristic(service, uuid).await.unwrap()
}

#[tokio::test]
async fn test_requires_connection() {
    let device = EmulatedDevice::new(EmulatorConfig::default());
    assert_eq!(
        device.primary_service(PYBRICKS_SERVICE_UUID).await,
        Err(TransportError::Disconnected)
    );
}

#[tokio::test]
async fn test_name_prefix_filter() {
    let host = EmulatorHost::new(EmulatedDevice::new(EmulatorConfig::default()));
    let mut options = RequestDeviceOptions {
        services: vec![PYBRICKS_SERVICE_UUID],
        ..RequestDeviceOptions::default()
    };
    assert!(host.request_device(&options).await.is_ok());

    options.name_prefix = Some("Technic".to_string());
    assert!(matches!(
        host.request_device(&options).await,
        Err(TransportError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_identity() {
    let device = EmulatedDevice::new(EmulatorConfig::default());
    device.connect().await.unwrap();

    let pnp = characteristic(&device, DEVICE_INFO_SERVICE_UUID, PNP_ID_UUID).await;
    let pnp_id = decode_pnp_id(&device.read_value(pnp).await.unwrap()).unwrap();
    assert_eq!(hub_type_name(&pnp_id), "Prime hub");

    let caps = characteristic(&device, PYBRICKS_SERVICE_UUID, PYBRICKS_HUB_CAPABILITIES_UUID).await;
    let capabilities = decode_hub_capabilities(&device.read_value(caps).await.unwrap()).unwrap();
    assert_eq!(capabilities, EmulatorConfig::default().capabilities());
}

#[tokio::test]
async fn test_legacy_profile_has_no_capabilities() {
    let device = EmulatedDevice::new(EmulatorConfig::legacy("3.1.0", "1.1.0"));
    device.connect().await.unwrap();

    let result = device
        .characteristic(PYBRICKS_SERVICE_UUID, PYBRICKS_HUB_CAPABILITIES_UUID)
        .await;
    assert!(matches!(result, Err(TransportError::NotFound(_))));
}

#[tokio::test]
async fn test_status_report_on_subscribe() {
    let device = EmulatedDevice::new(EmulatorConfig::default());
    device.connect().await.unwrap();

    let control = characteristic(&device, PYBRICKS_SERVICE_UUID, PYBRICKS_CONTROL_EVENT_UUID).await;
    let mut notifications = device.start_notifications(control).await.unwrap();
    let value = notifications.recv().await.unwrap();
    match decode_event(&value).unwrap() {
        Event::StatusReport { flags, .. } => assert!(!flags.user_program_running()),
        other => panic!("unexpected event {:?}", other),
    }

    device
        .write_value(control, Bytes::from_static(&[0x02]), WriteMode::WithResponse)
        .await
        .unwrap();
    assert!(device.is_running().await);
}

#[tokio::test]
async fn test_legacy_checksum_replies() {
    let device = EmulatedDevice::new(EmulatorConfig::legacy("3.1.0", "1.1.0"));
    device.connect().await.unwrap();

    let rx = characteristic(&device, UART_SERVICE_UUID, UART_RX_UUID).await;
    let tx = characteristic(&device, UART_SERVICE_UUID, UART_TX_UUID).await;
    let mut notifications = device.start_notifications(tx).await.unwrap();

    let header = Bytes::from_static(&[3, 0, 0, 0]);
    device
        .write_value(rx, header.clone(), WriteMode::WithoutResponse)
        .await
        .unwrap();
    assert_eq!(notifications.recv().await.unwrap()[..], [checksum(&header)]);

    let body = Bytes::from_static(b"abc");
    device
        .write_value(rx, body.clone(), WriteMode::WithoutResponse)
        .await
        .unwrap();
    assert_eq!(notifications.recv().await.unwrap()[..], [checksum(&body)]);

    assert_eq!(device.program().await, body);
    assert!(device.is_running().await);
}

#[tokio::test]
async fn test_simulated_disconnect() {
    let device = EmulatedDevice::new(EmulatorConfig::default());
    let mut disconnects = device.disconnect_events();
    device.connect().await.unwrap();

    device.simulate_disconnect().await;
    disconnects.recv().await.unwrap();
    assert!(!device.is_connected().await);
}
