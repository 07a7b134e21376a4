// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Connection handshake.
//!
//! Phases run strictly in order. Everything acquired on the way goes on a
//! [`CleanupStack`], which is unwound when a later phase fails, when the
//! handshake is dropped, or when the established connection goes away.

use crate::bus::{EventBus, HubEvent};
use crate::cleanup::CleanupStack;
use crate::correlator::{Correlator, TransactionIds, UartWriter};
use crate::error::{Alert, ConnectError};
use crate::runtime::RuntimeTracker;
use crate::session::{ConnectionSession, LegacyFlags};
use crate::settings::HubSettings;
use crate::stdio::{control_events, uart_events};
use crate::transport::{
    Availability, BleHost, Characteristic, GattDevice, Notifications, RequestDeviceOptions,
    TransportError,
};
use brickwire_protocol::version::{
    has_capabilities_characteristic, infer_capabilities, profile_is_newer,
};
use brickwire_protocol::{
    decode_hub_capabilities, decode_pnp_id, hub_type_name, python_version_to_semver,
    DEVICE_INFO_SERVICE_UUID, FIRMWARE_REVISION_UUID, PNP_ID_UUID, PYBRICKS_CONTROL_EVENT_UUID,
    PYBRICKS_HUB_CAPABILITIES_UUID, PYBRICKS_SERVICE_UUID, SOFTWARE_REVISION_UUID, UART_RX_UUID,
    UART_SERVICE_UUID, UART_TX_UUID,
};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A live connection to a hub
pub(crate) struct Link<D: GattDevice> {
    pub device: Arc<D>,
    pub correlator: Correlator,
    pub uart: UartWriter<D>,
    pub session: ConnectionSession,
}

/// The current connection, if any
pub(crate) type LinkSlot<D> = Arc<RwLock<Option<Arc<Link<D>>>>>;

/// Check for Bluetooth and let the user pick a hub
pub(crate) async fn request_device<H: BleHost>(
    host: &H,
    settings: &HubSettings,
) -> Result<H::Device, ConnectError> {
    match host.availability().await {
        Availability::Unsupported => return Err(ConnectError::NoBluetooth),
        Availability::Unavailable => return Err(ConnectError::BluetoothNotAvailable),
        Availability::Available => {}
    }

    let options = RequestDeviceOptions {
        services: vec![PYBRICKS_SERVICE_UUID],
        optional_services: vec![DEVICE_INFO_SERVICE_UUID, UART_SERVICE_UUID],
        name_prefix: settings.name_prefix.clone(),
    };

    host.request_device(&options).await.map_err(|e| match e {
        TransportError::Cancelled => ConnectError::Cancelled,
        other => ConnectError::Transport(other),
    })
}

async fn open_service<D: GattDevice>(
    device: &D,
    service: Uuid,
    device_name: &str,
) -> Result<(), ConnectError> {
    device.primary_service(service).await.map_err(|e| {
        if e.is_not_found() {
            ConnectError::MissingService {
                service,
                device: device_name.to_string(),
            }
        } else {
            e.into()
        }
    })
}

async fn characteristic<D: GattDevice>(
    device: &D,
    service: Uuid,
    uuid: Uuid,
) -> Result<Characteristic, ConnectError> {
    device.characteristic(service, uuid).await.map_err(|e| {
        if e.is_not_found() {
            ConnectError::MissingCharacteristic(uuid)
        } else {
            e.into()
        }
    })
}

async fn read_string<D: GattDevice>(
    device: &D,
    service: Uuid,
    uuid: Uuid,
) -> Result<String, ConnectError> {
    let characteristic = characteristic(device, service, uuid).await?;
    let value = device.read_value(characteristic).await?;
    Ok(String::from_utf8_lossy(&value)
        .trim_end_matches('\0')
        .to_string())
}

/// Start notifications and register their shutdown
async fn subscribe<D: GattDevice>(
    device: &Arc<D>,
    characteristic: Characteristic,
    label: &'static str,
    cleanup: &mut CleanupStack,
) -> Result<Notifications, ConnectError> {
    // stop first, some stacks deliver nothing after a reconnect otherwise
    device.stop_notifications(characteristic).await?;
    let notifications = device.start_notifications(characteristic).await?;

    let device = device.clone();
    cleanup.push(label, move || {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = device.stop_notifications(characteristic).await {
                    debug!("Failed to stop notifications: {}", e);
                }
            });
        }
    });

    Ok(notifications)
}

/// Run the handshake on a picked device.
///
/// On success the caller owns the returned cleanup stack, on failure it has
/// already been unwound.
pub(crate) async fn handshake<D: GattDevice>(
    device: Arc<D>,
    settings: &HubSettings,
    bus: &EventBus,
    runtime: &RuntimeTracker,
    ids: &TransactionIds,
) -> Result<(Link<D>, CleanupStack), ConnectError> {
    let mut cleanup = CleanupStack::new();
    let device_id = device.id();
    let device_name = device.name().unwrap_or_default();

    if !device.has_gatt() {
        return Err(ConnectError::NoGatt);
    }
    info!("Connecting to {} ({})", device_name, device_id);
    device.connect().await?;

    // identity
    open_service(&*device, DEVICE_INFO_SERVICE_UUID, &device_name).await?;

    let firmware_revision =
        read_string(&*device, DEVICE_INFO_SERVICE_UUID, FIRMWARE_REVISION_UUID).await?;
    info!("Firmware revision: {}", firmware_revision);
    bus.publish(HubEvent::FirmwareRevision(firmware_revision.clone()));
    let firmware_version = python_version_to_semver(&firmware_revision)?;
    match python_version_to_semver(&settings.bundled_firmware_version) {
        Ok(bundled) if firmware_version < bundled => {
            warn!(
                "Hub firmware {} is older than {}",
                firmware_version, bundled
            );
            bus.publish(HubEvent::Alert(Alert::OldFirmware));
        }
        Ok(_) => {}
        Err(e) => warn!("Ignoring bundled firmware version: {}", e),
    }

    let software_revision =
        read_string(&*device, DEVICE_INFO_SERVICE_UUID, SOFTWARE_REVISION_UUID).await?;
    info!("Profile version: {}", software_revision);
    bus.publish(HubEvent::SoftwareRevision(software_revision.clone()));
    let profile_version = python_version_to_semver(&software_revision)?;
    if profile_is_newer(&profile_version) {
        warn!("Hub profile {} is newer than supported", profile_version);
        bus.publish(HubEvent::Alert(Alert::NewPybricksProfile));
    }

    let pnp_char = device
        .characteristic(DEVICE_INFO_SERVICE_UUID, PNP_ID_UUID)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                ConnectError::MissingPnpId
            } else {
                e.into()
            }
        })?;
    let pnp_id = decode_pnp_id(&device.read_value(pnp_char).await?)?;
    info!("Hub type: {}", hub_type_name(&pnp_id));
    bus.publish(HubEvent::PnpId(pnp_id));

    // control channel
    open_service(&*device, PYBRICKS_SERVICE_UUID, &device_name).await?;
    let control = characteristic(&*device, PYBRICKS_SERVICE_UUID, PYBRICKS_CONTROL_EVENT_UUID).await?;
    let notifications = subscribe(&device, control, "control notifications", &mut cleanup).await?;
    cleanup.track(
        "control events",
        tokio::spawn(control_events(notifications, bus.clone(), runtime.clone())),
    );
    let (correlator, drain) = Correlator::spawn(device.clone(), control, ids.clone(), bus.clone());
    cleanup.track("command queue", drain);

    let (capabilities, capabilities_reported) = if has_capabilities_characteristic(&profile_version)
    {
        let caps_char =
            characteristic(&*device, PYBRICKS_SERVICE_UUID, PYBRICKS_HUB_CAPABILITIES_UUID).await?;
        let capabilities = decode_hub_capabilities(&device.read_value(caps_char).await?)?;
        (capabilities, true)
    } else {
        debug!("No capabilities characteristic, inferring from firmware version");
        (infer_capabilities(&firmware_version), false)
    };
    info!("Hub capabilities: {:?}", capabilities);
    bus.publish(HubEvent::Capabilities(capabilities.clone()));
    let legacy = LegacyFlags::for_profile(&profile_version);

    // UART channel
    open_service(&*device, UART_SERVICE_UUID, &device_name).await?;
    let uart_rx = characteristic(&*device, UART_SERVICE_UUID, UART_RX_UUID).await?;
    let uart_tx = characteristic(&*device, UART_SERVICE_UUID, UART_TX_UUID).await?;
    let notifications = subscribe(&device, uart_tx, "uart notifications", &mut cleanup).await?;
    cleanup.track(
        "uart events",
        tokio::spawn(uart_events(
            notifications,
            bus.clone(),
            runtime.clone(),
            legacy.download,
        )),
    );
    let uart = UartWriter::new(device.clone(), uart_rx, ids.clone(), bus.clone());

    let session = ConnectionSession {
        device_id,
        device_name,
        firmware_revision,
        firmware_version,
        profile_version,
        pnp_id,
        capabilities,
        capabilities_reported,
        legacy,
    };

    Ok((
        Link {
            device,
            correlator,
            uart,
            session,
        },
        cleanup,
    ))
}
