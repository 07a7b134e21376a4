// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::constants::LEGO_COMPANY_ID;
use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// Origin of the vendor id in a PnP ID record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorIdSource {
    BluetoothSig,
    UsbForum,
    Other(u8),
}

impl From<u8> for VendorIdSource {
    fn from(value: u8) -> Self {
        match value {
            1 => VendorIdSource::BluetoothSig,
            2 => VendorIdSource::UsbForum,
            other => VendorIdSource::Other(other),
        }
    }
}

impl From<VendorIdSource> for u8 {
    fn from(value: VendorIdSource) -> Self {
        match value {
            VendorIdSource::BluetoothSig => 1,
            VendorIdSource::UsbForum => 2,
            VendorIdSource::Other(other) => other,
        }
    }
}

/// Decoded PnP ID characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnpId {
    pub vendor_id_source: VendorIdSource,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_version: u16,
}

impl PnpId {
    pub const LEN: usize = 7;

    /// PnP ID as reported by a LEGO hub of the given type
    pub fn lego(hub_type: HubType, variant: u8) -> Self {
        Self {
            vendor_id_source: VendorIdSource::BluetoothSig,
            vendor_id: LEGO_COMPANY_ID,
            product_id: u16::from(u8::from(hub_type)),
            product_version: u16::from(variant),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::LEN);
        buf.put_u8(self.vendor_id_source.into());
        buf.put_u16_le(self.vendor_id);
        buf.put_u16_le(self.product_id);
        buf.put_u16_le(self.product_version);
        buf.freeze()
    }

    pub fn hub_type(&self) -> Option<HubType> {
        if self.vendor_id_source != VendorIdSource::BluetoothSig
            || self.vendor_id != LEGO_COMPANY_ID
        {
            return None;
        }
        u8::try_from(self.product_id)
            .ok()
            .and_then(|id| HubType::try_from(id).ok())
    }
}

/// Parse the 7 byte PnP ID record
pub fn decode_pnp_id(data: &[u8]) -> Result<PnpId, ProtocolError> {
    if data.len() < PnpId::LEN {
        return Err(ProtocolError::too_short("pnp id", PnpId::LEN, data));
    }

    Ok(PnpId {
        vendor_id_source: VendorIdSource::from(data[0]),
        vendor_id: u16::from_le_bytes([data[1], data[2]]),
        product_id: u16::from_le_bytes([data[3], data[4]]),
        product_version: u16::from_le_bytes([data[5], data[6]]),
    })
}

/// LEGO wireless protocol hub type ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HubType {
    WeDo2Hub = 0x00,
    DuploTrainHub = 0x20,
    MoveHub = 0x40,
    CityHub = 0x41,
    Handset = 0x42,
    MarioHub = 0x43,
    LuigiHub = 0x44,
    TechnicHub = 0x80,
    TechnicLargeHub = 0x81,
    TechnicSmallHub = 0x83,
}

impl From<HubType> for u8 {
    fn from(val: HubType) -> Self {
        val as u8
    }
}

impl TryFrom<u8> for HubType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => HubType::WeDo2Hub,
            0x20 => HubType::DuploTrainHub,
            0x40 => HubType::MoveHub,
            0x41 => HubType::CityHub,
            0x42 => HubType::Handset,
            0x43 => HubType::MarioHub,
            0x44 => HubType::LuigiHub,
            0x80 => HubType::TechnicHub,
            0x81 => HubType::TechnicLargeHub,
            0x83 => HubType::TechnicSmallHub,
            other => return Err(other),
        })
    }
}

/// Variants of [`HubType::TechnicLargeHub`]
pub mod technic_large_hub_variant {
    pub const SPIKE_PRIME_HUB: u8 = 0;
    pub const MINDSTORMS_INVENTOR_HUB: u8 = 1;
}

/// Variants of [`HubType::TechnicSmallHub`]
pub mod technic_small_hub_variant {
    pub const SPIKE_ESSENTIAL_HUB: u8 = 0;
}

/// Human readable hub name for a PnP ID.
///
/// Never fails, unknown ids map to "USB", "non-LEGO" or "Unsupported".
pub fn hub_type_name(pnp_id: &PnpId) -> &'static str {
    if pnp_id.vendor_id_source != VendorIdSource::BluetoothSig {
        return "USB";
    }
    if pnp_id.vendor_id != LEGO_COMPANY_ID {
        return "non-LEGO";
    }

    let Some(hub_type) = pnp_id.hub_type() else {
        return "Unsupported";
    };

    match (hub_type, pnp_id.product_version) {
        (HubType::MoveHub, _) => "Move hub",
        (HubType::CityHub, _) => "City hub",
        (HubType::TechnicHub, _) => "Technic hub",
        (HubType::TechnicLargeHub, version) => match u8::try_from(version) {
            Ok(technic_large_hub_variant::SPIKE_PRIME_HUB) => "Prime hub",
            Ok(technic_large_hub_variant::MINDSTORMS_INVENTOR_HUB) => "Inventor hub",
            _ => "Unsupported",
        },
        (HubType::TechnicSmallHub, version) => match u8::try_from(version) {
            Ok(technic_small_hub_variant::SPIKE_ESSENTIAL_HUB) => "Essential hub",
            _ => "Unsupported",
        },
        _ => "Unsupported",
    }
}
