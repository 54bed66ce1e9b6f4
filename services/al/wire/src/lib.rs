//! IEEE 1905.1 wire format for the abstraction layer.
//!
//! This crate holds everything that touches bytes on the link: the
//! bounds-checked byte cursors, the TLV catalogue used by topology discovery,
//! the CMDU header and message model, and the framer that fragments outgoing
//! messages and reassembles incoming ones.
//!
//! ## Wire Format
//!
//! ```text
//! +-----------------------+-------------------------------------+
//! | u8  message_version   | 0x00                                |
//! | u8  reserved          | 0x00                                |
//! | u16 message_type      | discovery, notification, query, ... |
//! | u16 message_id        | sender scoped                       |
//! | u8  fragment_id       | 0..255                              |
//! | u8  flags             | bit 7 last fragment, bit 6 relay    |
//! +-----------------------+-------------------------------------+
//! | TLV*                  | u8 type, u16 length, body           |
//! +-----------------------+-------------------------------------+
//! | end of message        | 0x00 0x00 0x00                      |
//! +-----------------------+-------------------------------------+
//! ```
//!
//! All integers are big-endian.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cmdu;
pub mod cursor;
pub mod error;
pub mod framer;
pub mod mac;
pub mod reassembly;
pub mod tlv;

pub use cmdu::{Cmdu, CmduFlags, CmduHeader, MessageType, CMDU_HEADER_SIZE, MESSAGE_VERSION};
pub use cursor::{Reader, Writer};
pub use error::{TypeKind, WireError};
pub use framer::{Frame, Framer, ETHERTYPE_1905, MAX_CMDU_PAYLOAD};
pub use mac::{MacAddr, ParseMacError, MAC_LEN, MCAST_1905};
pub use reassembly::{Reassembled, Reassembler, DEFAULT_REASSEMBLY_TIMEOUT};
pub use tlv::{
    ApBss, ApRadio, BridgingTuple, DeviceInformation, Ieee80211Info, Ieee80211Role, L2Interface,
    L2Neighbor, LocalInterface, MediaSpecific, MediaType, NeighborDevice, NeighborDeviceList,
    PowerOffInterface, RawTlv, ServiceType, Ssid, Tlv, TlvType, MAX_SSID_LEN,
};
