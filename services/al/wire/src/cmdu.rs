//! CMDU header and message model.

use crate::cursor::{Reader, Writer};
use crate::error::{TypeKind, WireError};
use crate::mac::MacAddr;
use crate::tlv::{DeviceInformation, Tlv, TlvType};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// CMDU header size in bytes
pub const CMDU_HEADER_SIZE: usize = 8;

/// Message version (1905.1-2013)
pub const MESSAGE_VERSION: u8 = 0x00;

/// CMDU message types handled by the abstraction layer
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Periodic presence announcement
    TopologyDiscovery = 0x0000,
    /// Topology change notification
    TopologyNotification = 0x0001,
    /// Request for a topology response
    TopologyQuery = 0x0002,
    /// Answer to a topology query
    TopologyResponse = 0x0003,
}

impl TryFrom<u16> for MessageType {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(MessageType::TopologyDiscovery),
            0x0001 => Ok(MessageType::TopologyNotification),
            0x0002 => Ok(MessageType::TopologyQuery),
            0x0003 => Ok(MessageType::TopologyResponse),
            _ => Err(WireError::UnknownType {
                kind: TypeKind::Message,
                value,
            }),
        }
    }
}

impl MessageType {
    /// TLVs that must be present for the message to be accepted
    pub fn required_tlvs(self) -> &'static [TlvType] {
        match self {
            MessageType::TopologyDiscovery => &[TlvType::AlMacAddress, TlvType::MacAddress],
            MessageType::TopologyNotification => &[TlvType::AlMacAddress],
            MessageType::TopologyQuery => &[],
            // 2013-only peers send the bare minimum, so only device
            // information is insisted upon when receiving
            MessageType::TopologyResponse => &[TlvType::DeviceInformation],
        }
    }
}

bitflags! {
    /// CMDU header flags byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CmduFlags: u8 {
        /// Last fragment of this message id
        const LAST_FRAGMENT = 0x80;
        /// Receivers relay the message on their other interfaces
        const RELAY = 0x40;
    }
}

/// Fixed 8-byte CMDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmduHeader {
    /// Message type
    pub message_type: MessageType,
    /// Message id, scoped to the sender
    pub message_id: u16,
    /// Fragment index, starting at 0
    pub fragment_id: u8,
    /// Flags byte
    pub flags: CmduFlags,
}

impl CmduHeader {
    /// Header for the first and only fragment of a message
    pub fn new(message_type: MessageType, message_id: u16) -> Self {
        Self {
            message_type,
            message_id,
            fragment_id: 0,
            flags: CmduFlags::LAST_FRAGMENT,
        }
    }

    /// Whether this is the last fragment
    pub fn is_last_fragment(&self) -> bool {
        self.flags.contains(CmduFlags::LAST_FRAGMENT)
    }

    /// Whether the relay indicator is set
    pub fn is_relay(&self) -> bool {
        self.flags.contains(CmduFlags::RELAY)
    }

    /// Write the header
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        w.insert_u8(MESSAGE_VERSION)?;
        w.insert_u8(0)?;
        w.insert_u16(self.message_type as u16)?;
        w.insert_u16(self.message_id)?;
        w.insert_u8(self.fragment_id)?;
        w.insert_u8(self.flags.bits())
    }

    /// Encode into a standalone buffer
    pub fn to_bytes(&self) -> Result<[u8; CMDU_HEADER_SIZE], WireError> {
        let mut out = [0u8; CMDU_HEADER_SIZE];
        self.encode(&mut Writer::new(&mut out))?;
        Ok(out)
    }

    /// Read a header. The cursor only moves when the full header decodes.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut ahead = r.clone();
        let version = ahead.extract_u8()?;
        let _reserved = ahead.extract_u8()?;
        let raw_type = ahead.extract_u16()?;
        let message_id = ahead.extract_u16()?;
        let fragment_id = ahead.extract_u8()?;
        let flags = CmduFlags::from_bits_truncate(ahead.extract_u8()?);
        if version != MESSAGE_VERSION {
            return Err(WireError::Version(version));
        }
        let message_type = MessageType::try_from(raw_type)?;
        *r = ahead;
        Ok(Self {
            message_type,
            message_id,
            fragment_id,
            flags,
        })
    }

    /// Split a CMDU payload into its header and TLV bytes
    pub fn split(payload: &[u8]) -> Result<(Self, &[u8]), WireError> {
        let mut r = Reader::new(payload);
        let header = Self::decode(&mut r)?;
        Ok((header, r.rest()))
    }
}

/// A complete control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmdu {
    /// Message type
    pub message_type: MessageType,
    /// Message id
    pub message_id: u16,
    /// Relay indicator
    pub relay: bool,
    /// TLVs in order, without the end of message marker
    pub tlvs: Vec<Tlv>,
}

impl Cmdu {
    /// Build a message from parts
    pub fn new(message_type: MessageType, message_id: u16, relay: bool, tlvs: Vec<Tlv>) -> Self {
        Self {
            message_type,
            message_id,
            relay,
            tlvs,
        }
    }

    /// Topology discovery announcing `al_mac` on the interface `iface_mac`
    pub fn topology_discovery(message_id: u16, al_mac: MacAddr, iface_mac: MacAddr) -> Self {
        Self::new(
            MessageType::TopologyDiscovery,
            message_id,
            false,
            vec![Tlv::AlMacAddress(al_mac), Tlv::MacAddress(iface_mac)],
        )
    }

    /// Relayed topology notification
    pub fn topology_notification(message_id: u16, al_mac: MacAddr) -> Self {
        Self::new(
            MessageType::TopologyNotification,
            message_id,
            true,
            vec![Tlv::AlMacAddress(al_mac)],
        )
    }

    /// Topology query, which carries no TLVs
    pub fn topology_query(message_id: u16) -> Self {
        Self::new(MessageType::TopologyQuery, message_id, false, Vec::new())
    }

    /// Topology response carrying the given TLVs
    pub fn topology_response(message_id: u16, tlvs: Vec<Tlv>) -> Self {
        Self::new(MessageType::TopologyResponse, message_id, false, tlvs)
    }

    /// Check the required TLV set of the message type
    pub fn validate(&self) -> Result<(), WireError> {
        for required in self.message_type.required_tlvs() {
            if !self.tlvs.iter().any(|tlv| tlv.tlv_type() == *required) {
                return Err(WireError::Malformed("missing required tlv"));
            }
        }
        Ok(())
    }

    /// First AL MAC address TLV
    pub fn al_mac(&self) -> Option<MacAddr> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            Tlv::AlMacAddress(mac) => Some(*mac),
            _ => None,
        })
    }

    /// First interface MAC address TLV
    pub fn interface_mac(&self) -> Option<MacAddr> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            Tlv::MacAddress(mac) => Some(*mac),
            _ => None,
        })
    }

    /// Device information TLV, if present
    pub fn device_information(&self) -> Option<&DeviceInformation> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            Tlv::DeviceInformation(info) => Some(info),
            _ => None,
        })
    }
}
