// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Abstraction over the GATT capability of the host.
//!
//! A real implementation wraps a BLE stack, the emulator crate provides an
//! in-process hub. The hub logic only ever talks to these traits.

use bytes::Bytes;
use std::future::Future;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Errors reported by the transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("cancelled by user")]
    Cancelled,

    #[error("operation already in progress")]
    Busy,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Bluetooth support of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The host has no Bluetooth API at all
    Unsupported,
    /// There is an API but no usable adapter
    Unavailable,
    Available,
}

/// Write with or without a link layer acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// Filter for the device picker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDeviceOptions {
    /// Devices must advertise one of these services
    pub services: Vec<Uuid>,
    /// Services we want to access besides the advertised one
    pub optional_services: Vec<Uuid>,
    pub name_prefix: Option<String>,
}

/// Handle to a characteristic of a connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Characteristic {
    pub service: Uuid,
    pub uuid: Uuid,
}

/// Stream of notified values of one characteristic
pub type Notifications = mpsc::UnboundedReceiver<Bytes>;

/// The Bluetooth stack of the host
pub trait BleHost: Send + Sync + 'static {
    type Device: GattDevice;

    fn availability(&self) -> impl Future<Output = Availability> + Send;

    /// Let the user pick a device. Dismissing the picker yields
    /// [`TransportError::Cancelled`].
    fn request_device(
        &self,
        options: &RequestDeviceOptions,
    ) -> impl Future<Output = Result<Self::Device, TransportError>> + Send;
}

/// A device picked by the user
pub trait GattDevice: Send + Sync + 'static {
    fn id(&self) -> String;

    fn name(&self) -> Option<String>;

    /// Whether the device can be connected to at all
    fn has_gatt(&self) -> bool;

    /// Fires once per lost connection, whether requested or not
    fn disconnect_events(&self) -> broadcast::Receiver<()>;

    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Request a disconnect. Completion is signalled through
    /// [`GattDevice::disconnect_events`].
    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    fn primary_service(
        &self,
        service: Uuid,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn characteristic(
        &self,
        service: Uuid,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Characteristic, TransportError>> + Send;

    fn read_value(
        &self,
        characteristic: Characteristic,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;

    fn write_value(
        &self,
        characteristic: Characteristic,
        data: Bytes,
        mode: WriteMode,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn start_notifications(
        &self,
        characteristic: Characteristic,
    ) -> impl Future<Output = Result<Notifications, TransportError>> + Send;

    fn stop_notifications(
        &self,
        characteristic: Characteristic,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
