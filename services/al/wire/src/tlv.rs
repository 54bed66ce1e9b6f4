//! TLV catalogue for topology discovery and exchange.
//!
//! Every TLV is a type octet, a 16-bit big-endian body length and exactly that
//! many body bytes. Repeated sub-structures carry an explicit count octet in
//! front of their records. Decoding a body must consume it exactly: records
//! that would run past the declared length, or bytes left over after the last
//! record, make the TLV malformed.

use crate::cursor::{Reader, Writer};
use crate::error::{TypeKind, WireError};
use crate::mac::{MacAddr, MAC_LEN};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// TLV type octet plus 16-bit length
pub const TLV_HEADER_SIZE: usize = 3;

/// Longest SSID carried in an AP operational BSS record
pub const MAX_SSID_LEN: usize = 32;

/// Size of the IEEE 802.11 media-specific descriptor
pub const IEEE80211_INFO_LEN: usize = 10;

/// Recognised TLV types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TlvType {
    /// End of message marker
    EndOfMessage = 0x00,
    /// AL MAC address
    AlMacAddress = 0x01,
    /// Transmitting interface MAC address
    MacAddress = 0x02,
    /// Device information
    DeviceInformation = 0x03,
    /// Device bridging capability
    DeviceBridgingCapability = 0x04,
    /// 1905 neighbor device list
    NeighborDeviceList = 0x07,
    /// Power off interfaces
    PowerOffInterface = 0x1b,
    /// L2 neighbor device
    L2NeighborDevice = 0x1e,
    /// Multi-AP supported service
    SupportedService = 0x80,
    /// Multi-AP operational BSS
    ApOperationalBss = 0x83,
}

impl TryFrom<u8> for TlvType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(TlvType::EndOfMessage),
            0x01 => Ok(TlvType::AlMacAddress),
            0x02 => Ok(TlvType::MacAddress),
            0x03 => Ok(TlvType::DeviceInformation),
            0x04 => Ok(TlvType::DeviceBridgingCapability),
            0x07 => Ok(TlvType::NeighborDeviceList),
            0x1b => Ok(TlvType::PowerOffInterface),
            0x1e => Ok(TlvType::L2NeighborDevice),
            0x80 => Ok(TlvType::SupportedService),
            0x83 => Ok(TlvType::ApOperationalBss),
            _ => Err(WireError::UnknownType {
                kind: TypeKind::Tlv,
                value: value as u16,
            }),
        }
    }
}

/// 1905 media type of a local interface
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaType(pub u16);

impl MediaType {
    /// IEEE 802.3u fast ethernet
    pub const FAST_ETHERNET: MediaType = MediaType(0x0000);
    /// IEEE 802.3ab gigabit ethernet
    pub const GIGABIT_ETHERNET: MediaType = MediaType(0x0001);
    /// IEEE 802.11b, 2.4 GHz
    pub const IEEE80211B_2_4: MediaType = MediaType(0x0100);
    /// IEEE 802.11g, 2.4 GHz
    pub const IEEE80211G_2_4: MediaType = MediaType(0x0101);
    /// IEEE 802.11a, 5 GHz
    pub const IEEE80211A_5: MediaType = MediaType(0x0102);
    /// IEEE 802.11n, 2.4 GHz
    pub const IEEE80211N_2_4: MediaType = MediaType(0x0103);
    /// IEEE 802.11n, 5 GHz
    pub const IEEE80211N_5: MediaType = MediaType(0x0104);
    /// IEEE 802.11ac, 5 GHz
    pub const IEEE80211AC_5: MediaType = MediaType(0x0105);
    /// IEEE 802.11ad, 60 GHz
    pub const IEEE80211AD_60: MediaType = MediaType(0x0106);
    /// IEEE 802.11af
    pub const IEEE80211AF: MediaType = MediaType(0x0107);
    /// IEEE 1901 wavelet
    pub const IEEE1901_WAVELET: MediaType = MediaType(0x0200);
    /// IEEE 1901 FFT
    pub const IEEE1901_FFT: MediaType = MediaType(0x0201);
    /// MoCA v1.1
    pub const MOCA_1_1: MediaType = MediaType(0x0300);
    /// Unknown media
    pub const UNKNOWN: MediaType = MediaType(0xffff);

    const NAMES: &'static [(MediaType, &'static str)] = &[
        (Self::FAST_ETHERNET, "fast_ethernet"),
        (Self::GIGABIT_ETHERNET, "gigabit_ethernet"),
        (Self::IEEE80211B_2_4, "ieee80211b_2_4"),
        (Self::IEEE80211G_2_4, "ieee80211g_2_4"),
        (Self::IEEE80211A_5, "ieee80211a_5"),
        (Self::IEEE80211N_2_4, "ieee80211n_2_4"),
        (Self::IEEE80211N_5, "ieee80211n_5"),
        (Self::IEEE80211AC_5, "ieee80211ac_5"),
        (Self::IEEE80211AD_60, "ieee80211ad_60"),
        (Self::IEEE80211AF, "ieee80211af"),
        (Self::IEEE1901_WAVELET, "ieee1901_wavelet"),
        (Self::IEEE1901_FFT, "ieee1901_fft"),
        (Self::MOCA_1_1, "moca_1_1"),
        (Self::UNKNOWN, "unknown"),
    ];

    /// Whether the interface is an IEEE 802.11 radio
    pub fn is_ieee80211(self) -> bool {
        self.0 >> 8 == 0x01
    }

    /// Catalogue name, if the code is a known one
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(media, _)| *media == self)
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

impl fmt::Debug for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaType({self})")
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((media, _)) = Self::NAMES.iter().find(|(_, name)| *name == s) {
            return Ok(*media);
        }
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => u16::from_str_radix(hex, 16),
            None => s.parse(),
        };
        parsed
            .map(MediaType)
            .map_err(|_| format!("unknown media type: {s}"))
    }
}

impl Serialize for MediaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_u16(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(u16),
            Name(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => Ok(MediaType(code)),
            Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Role of an 802.11 interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ieee80211Role {
    /// Access point
    Ap,
    /// Non-AP station
    Sta,
    /// Wi-Fi P2P client
    P2pClient,
    /// Wi-Fi P2P group owner
    P2pGroupOwner,
}

impl Ieee80211Role {
    fn to_bits(self) -> u8 {
        let nibble = match self {
            Ieee80211Role::Ap => 0x0,
            Ieee80211Role::Sta => 0x4,
            Ieee80211Role::P2pClient => 0x8,
            Ieee80211Role::P2pGroupOwner => 0x9,
        };
        nibble << 4
    }

    /// Role in the upper nibble; the lower nibble is reserved and must be zero
    fn from_bits(bits: u8) -> Option<Self> {
        if bits & 0x0f != 0 {
            return None;
        }
        match bits >> 4 {
            0x0 => Some(Ieee80211Role::Ap),
            0x4 => Some(Ieee80211Role::Sta),
            0x8 => Some(Ieee80211Role::P2pClient),
            0x9 => Some(Ieee80211Role::P2pGroupOwner),
            _ => None,
        }
    }
}

/// IEEE 802.11 media-specific descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ieee80211Info {
    /// BSSID of the network the interface belongs to
    pub network_membership: MacAddr,
    /// Interface role
    pub role: Ieee80211Role,
    /// AP channel band (bandwidth code)
    #[serde(default)]
    pub ap_channel_band: u8,
    /// First channel center frequency index
    #[serde(default)]
    pub center_freq_index_1: u8,
    /// Second channel center frequency index
    #[serde(default)]
    pub center_freq_index_2: u8,
}

impl Ieee80211Info {
    /// Parse a 10-byte descriptor; `None` for any other length or a reserved role
    fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; IEEE80211_INFO_LEN] = bytes.try_into().ok()?;
        let mut network_membership = [0u8; MAC_LEN];
        network_membership.copy_from_slice(&bytes[..MAC_LEN]);
        Some(Ieee80211Info {
            network_membership: MacAddr(network_membership),
            role: Ieee80211Role::from_bits(bytes[6])?,
            ap_channel_band: bytes[7],
            center_freq_index_1: bytes[8],
            center_freq_index_2: bytes[9],
        })
    }
}

/// Media-specific part of a local interface entry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MediaSpecific {
    /// No descriptor
    #[default]
    None,
    /// IEEE 802.11 descriptor
    Ieee80211(Ieee80211Info),
    /// Descriptor for another media family, carried opaquely
    Other(Vec<u8>),
}

impl MediaSpecific {
    fn len(&self) -> usize {
        match self {
            MediaSpecific::None => 0,
            MediaSpecific::Ieee80211(_) => IEEE80211_INFO_LEN,
            MediaSpecific::Other(bytes) => bytes.len(),
        }
    }

    /// Reject descriptors that would decode to something else
    fn check(&self, media_type: MediaType) -> Result<(), WireError> {
        match self {
            MediaSpecific::None => Ok(()),
            MediaSpecific::Ieee80211(_) if !media_type.is_ieee80211() => {
                Err(WireError::Invalid("802.11 descriptor on non-802.11 media"))
            }
            MediaSpecific::Ieee80211(_) => Ok(()),
            MediaSpecific::Other(bytes) if bytes.is_empty() => {
                Err(WireError::Invalid("empty opaque media descriptor"))
            }
            MediaSpecific::Other(bytes)
                if media_type.is_ieee80211() && Ieee80211Info::parse(bytes).is_some() =>
            {
                Err(WireError::Invalid("opaque bytes form an 802.11 descriptor"))
            }
            MediaSpecific::Other(_) => Ok(()),
        }
    }

    fn encode(&self, media_type: MediaType, w: &mut Writer<'_>) -> Result<(), WireError> {
        self.check(media_type)?;
        w.insert_u8(count_u8(self.len())?)?;
        match self {
            MediaSpecific::None => {}
            MediaSpecific::Ieee80211(info) => {
                w.insert_mac(&info.network_membership)?;
                w.insert_u8(info.role.to_bits())?;
                w.insert_u8(info.ap_channel_band)?;
                w.insert_u8(info.center_freq_index_1)?;
                w.insert_u8(info.center_freq_index_2)?;
            }
            MediaSpecific::Other(bytes) => w.insert_n(bytes)?,
        }
        Ok(())
    }

    /// Reserved role values are kept opaque rather than rejected
    fn decode(media_type: MediaType, r: &mut Reader<'_>) -> Result<Self, WireError> {
        let len = r.extract_u8()? as usize;
        let body = r.extract_n(len)?;
        if body.is_empty() {
            return Ok(MediaSpecific::None);
        }
        if media_type.is_ieee80211() {
            if let Some(info) = Ieee80211Info::parse(body) {
                return Ok(MediaSpecific::Ieee80211(info));
            }
        }
        Ok(MediaSpecific::Other(body.to_vec()))
    }
}

/// One local interface within a device information TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    /// Interface hardware address
    pub mac: MacAddr,
    /// 1905 media type
    pub media_type: MediaType,
    /// Media-specific descriptor
    pub media_specific: MediaSpecific,
}

/// Body of a device information TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInformation {
    /// AL address of the reporting device
    pub al_mac: MacAddr,
    /// Local interfaces in collector order
    pub interfaces: Vec<LocalInterface>,
}

/// A group of interfaces bridged together
pub type BridgingTuple = Vec<MacAddr>;

/// One neighbor entry of a neighbor device list TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborDevice {
    /// Neighbor AL address
    pub mac: MacAddr,
    /// Whether an IEEE 802.1 bridge sits between us and the neighbor
    pub bridge: bool,
}

/// Body of a neighbor device list TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborDeviceList {
    /// Local interface the neighbors were seen on
    pub local_mac: MacAddr,
    /// Neighbors reachable through that interface
    pub neighbors: Vec<NeighborDevice>,
}

/// A powered-off interface with its generic PHY descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerOffInterface {
    /// Interface hardware address
    pub mac: MacAddr,
    /// 1905 media type
    pub media_type: MediaType,
    /// Generic PHY OUI
    pub oui: [u8; 3],
    /// Generic PHY variant index
    pub variant_index: u8,
    /// Media-specific information, opaque
    pub media_info: Vec<u8>,
}

/// A non-1905 neighbor and the addresses reachable behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Neighbor {
    /// Neighbor hardware address
    pub mac: MacAddr,
    /// Addresses behind the neighbor
    pub behind: Vec<MacAddr>,
}

/// L2 neighbors seen on one local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Interface {
    /// Local interface hardware address
    pub local_mac: MacAddr,
    /// Neighbors seen on it
    pub neighbors: Vec<L2Neighbor>,
}

/// Multi-AP service advertised in a supported service TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Multi-AP controller
    Controller,
    /// Multi-AP agent
    Agent,
    /// Reserved value, 0x02 and above
    Other(u8),
}

impl From<u8> for ServiceType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ServiceType::Controller,
            0x01 => ServiceType::Agent,
            other => ServiceType::Other(other),
        }
    }
}

impl TryFrom<ServiceType> for u8 {
    type Error = WireError;

    fn try_from(service: ServiceType) -> Result<Self, Self::Error> {
        match service {
            ServiceType::Controller => Ok(0x00),
            ServiceType::Agent => Ok(0x01),
            ServiceType::Other(value @ 0x02..=0xff) => Ok(value),
            ServiceType::Other(_) => {
                Err(WireError::Invalid("reserved service aliases a known one"))
            }
        }
    }
}

/// Service set identifier, at most [`MAX_SSID_LEN`] bytes
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Ssid(Vec<u8>);

impl Ssid {
    /// Raw SSID bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the SSID is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<u8>> for Ssid {
    type Error = WireError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() > MAX_SSID_LEN {
            return Err(WireError::Size(bytes.len()));
        }
        Ok(Ssid(bytes))
    }
}

impl TryFrom<&str> for Ssid {
    type Error = WireError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Ssid::try_from(s.as_bytes().to_vec())
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for Ssid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ssid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ssid::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

/// An operational BSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApBss {
    /// BSSID
    pub bssid: MacAddr,
    /// SSID
    pub ssid: Ssid,
}

/// Operational BSSes of one radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApRadio {
    /// Radio unique identifier
    pub radio_id: MacAddr,
    /// BSSes running on the radio
    pub bss: Vec<ApBss>,
}

/// A decoded TLV
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tlv {
    /// End of message marker
    EndOfMessage,
    /// AL MAC address of the sender
    AlMacAddress(MacAddr),
    /// MAC address of the transmitting interface
    MacAddress(MacAddr),
    /// Device information
    DeviceInformation(DeviceInformation),
    /// Bridging tuples, possibly none
    DeviceBridgingCapability(Vec<BridgingTuple>),
    /// 1905 neighbors of one local interface
    NeighborDeviceList(NeighborDeviceList),
    /// Powered-off interfaces
    PowerOffInterface(Vec<PowerOffInterface>),
    /// Non-1905 neighbors per local interface
    L2NeighborDevice(Vec<L2Interface>),
    /// Supported Multi-AP services
    SupportedService(Vec<ServiceType>),
    /// Operational BSSes per radio
    ApOperationalBss(Vec<ApRadio>),
}

/// An undecoded TLV: type octet and body slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTlv<'a> {
    /// Raw type octet
    pub tlv_type: u8,
    /// Body, exactly as long as the declared length
    pub body: &'a [u8],
}

impl<'a> RawTlv<'a> {
    /// Read one TLV header and body from the cursor.
    ///
    /// Nothing is consumed unless the whole TLV is present.
    pub fn read(r: &mut Reader<'a>) -> Result<Self, WireError> {
        let mut ahead = r.clone();
        let tlv_type = ahead.extract_u8()?;
        let len = ahead.extract_u16()? as usize;
        let body = ahead.extract_n(len)?;
        *r = ahead;
        Ok(RawTlv { tlv_type, body })
    }

    /// Size on the wire including the header
    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_SIZE + self.body.len()
    }
}

fn count_u8(n: usize) -> Result<u8, WireError> {
    u8::try_from(n).map_err(|_| WireError::Size(n))
}

fn count_u16(n: usize) -> Result<u16, WireError> {
    u16::try_from(n).map_err(|_| WireError::Size(n))
}

impl Tlv {
    /// Type of this TLV
    pub fn tlv_type(&self) -> TlvType {
        match self {
            Tlv::EndOfMessage => TlvType::EndOfMessage,
            Tlv::AlMacAddress(_) => TlvType::AlMacAddress,
            Tlv::MacAddress(_) => TlvType::MacAddress,
            Tlv::DeviceInformation(_) => TlvType::DeviceInformation,
            Tlv::DeviceBridgingCapability(_) => TlvType::DeviceBridgingCapability,
            Tlv::NeighborDeviceList(_) => TlvType::NeighborDeviceList,
            Tlv::PowerOffInterface(_) => TlvType::PowerOffInterface,
            Tlv::L2NeighborDevice(_) => TlvType::L2NeighborDevice,
            Tlv::SupportedService(_) => TlvType::SupportedService,
            Tlv::ApOperationalBss(_) => TlvType::ApOperationalBss,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Tlv::EndOfMessage => 0,
            Tlv::AlMacAddress(_) | Tlv::MacAddress(_) => MAC_LEN,
            Tlv::DeviceInformation(info) => {
                MAC_LEN
                    + 1
                    + info
                        .interfaces
                        .iter()
                        .map(|i| MAC_LEN + 2 + 1 + i.media_specific.len())
                        .sum::<usize>()
            }
            Tlv::DeviceBridgingCapability(tuples) => {
                1 + tuples.iter().map(|t| 1 + t.len() * MAC_LEN).sum::<usize>()
            }
            Tlv::NeighborDeviceList(list) => MAC_LEN + 1 + list.neighbors.len() * (MAC_LEN + 1),
            Tlv::PowerOffInterface(entries) => {
                1 + entries
                    .iter()
                    .map(|e| MAC_LEN + 2 + 3 + 1 + 1 + e.media_info.len())
                    .sum::<usize>()
            }
            Tlv::L2NeighborDevice(ifaces) => {
                1 + ifaces
                    .iter()
                    .map(|i| {
                        MAC_LEN
                            + 2
                            + i.neighbors
                                .iter()
                                .map(|n| MAC_LEN + 2 + n.behind.len() * MAC_LEN)
                                .sum::<usize>()
                    })
                    .sum::<usize>()
            }
            Tlv::SupportedService(services) => 1 + services.len(),
            Tlv::ApOperationalBss(radios) => {
                1 + radios
                    .iter()
                    .map(|r| {
                        let bss: usize = r.bss.iter().map(|b| MAC_LEN + 1 + b.ssid.len()).sum();
                        MAC_LEN + 1 + bss
                    })
                    .sum::<usize>()
            }
        }
    }

    /// Size on the wire including the header
    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_SIZE + self.body_len()
    }

    /// Encode type, length and body
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let body_len = self.body_len();
        let declared = count_u16(body_len)?;
        let mut out = vec![0u8; TLV_HEADER_SIZE + body_len];
        let mut w = Writer::new(&mut out);
        w.insert_u8(self.tlv_type() as u8)?;
        w.insert_u16(declared)?;
        self.encode_body(&mut w)?;
        if w.remaining() != 0 {
            return Err(WireError::Malformed("encoded body shorter than declared"));
        }
        Ok(out)
    }

    fn encode_body(&self, w: &mut Writer<'_>) -> Result<(), WireError> {
        match self {
            Tlv::EndOfMessage => {}
            Tlv::AlMacAddress(mac) | Tlv::MacAddress(mac) => w.insert_mac(mac)?,
            Tlv::DeviceInformation(info) => {
                w.insert_mac(&info.al_mac)?;
                w.insert_u8(count_u8(info.interfaces.len())?)?;
                for iface in &info.interfaces {
                    w.insert_mac(&iface.mac)?;
                    w.insert_u16(iface.media_type.0)?;
                    iface.media_specific.encode(iface.media_type, w)?;
                }
            }
            Tlv::DeviceBridgingCapability(tuples) => {
                w.insert_u8(count_u8(tuples.len())?)?;
                for tuple in tuples {
                    w.insert_u8(count_u8(tuple.len())?)?;
                    for mac in tuple {
                        w.insert_mac(mac)?;
                    }
                }
            }
            Tlv::NeighborDeviceList(list) => {
                w.insert_mac(&list.local_mac)?;
                w.insert_u8(count_u8(list.neighbors.len())?)?;
                for neighbor in &list.neighbors {
                    w.insert_mac(&neighbor.mac)?;
                    w.insert_u8(if neighbor.bridge { 0x80 } else { 0x00 })?;
                }
            }
            Tlv::PowerOffInterface(entries) => {
                w.insert_u8(count_u8(entries.len())?)?;
                for entry in entries {
                    w.insert_mac(&entry.mac)?;
                    w.insert_u16(entry.media_type.0)?;
                    w.insert_n(&entry.oui)?;
                    w.insert_u8(entry.variant_index)?;
                    w.insert_u8(count_u8(entry.media_info.len())?)?;
                    w.insert_n(&entry.media_info)?;
                }
            }
            Tlv::L2NeighborDevice(ifaces) => {
                w.insert_u8(count_u8(ifaces.len())?)?;
                for iface in ifaces {
                    w.insert_mac(&iface.local_mac)?;
                    w.insert_u16(count_u16(iface.neighbors.len())?)?;
                    for neighbor in &iface.neighbors {
                        w.insert_mac(&neighbor.mac)?;
                        w.insert_u16(count_u16(neighbor.behind.len())?)?;
                        for mac in &neighbor.behind {
                            w.insert_mac(mac)?;
                        }
                    }
                }
            }
            Tlv::SupportedService(services) => {
                w.insert_u8(count_u8(services.len())?)?;
                for service in services {
                    w.insert_u8(u8::try_from(*service)?)?;
                }
            }
            Tlv::ApOperationalBss(radios) => {
                w.insert_u8(count_u8(radios.len())?)?;
                for radio in radios {
                    w.insert_mac(&radio.radio_id)?;
                    w.insert_u8(count_u8(radio.bss.len())?)?;
                    for bss in &radio.bss {
                        w.insert_mac(&bss.bssid)?;
                        w.insert_u8(count_u8(bss.ssid.len())?)?;
                        w.insert_n(bss.ssid.as_bytes())?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Decode a single TLV from the start of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Tlv, WireError> {
        let mut r = Reader::new(bytes);
        let raw = RawTlv::read(&mut r)?;
        Tlv::from_raw(&raw)
    }

    /// Decode the body of a TLV whose header has already been read
    pub fn from_raw(raw: &RawTlv<'_>) -> Result<Tlv, WireError> {
        let tlv_type = TlvType::try_from(raw.tlv_type)?;
        let mut r = Reader::new(raw.body);
        // the body is complete, so running short inside it means its counts lie
        let tlv = Self::decode_body(tlv_type, &mut r).map_err(|e| match e {
            WireError::Truncated => WireError::Malformed("record overruns tlv length"),
            other => other,
        })?;
        if !r.is_empty() {
            return Err(WireError::Malformed("trailing bytes in tlv body"));
        }
        Ok(tlv)
    }

    fn decode_body(tlv_type: TlvType, r: &mut Reader<'_>) -> Result<Tlv, WireError> {
        let tlv = match tlv_type {
            TlvType::EndOfMessage => Tlv::EndOfMessage,
            TlvType::AlMacAddress => Tlv::AlMacAddress(r.extract_mac()?),
            TlvType::MacAddress => Tlv::MacAddress(r.extract_mac()?),
            TlvType::DeviceInformation => {
                let al_mac = r.extract_mac()?;
                let count = r.extract_u8()?;
                let mut interfaces = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let mac = r.extract_mac()?;
                    let media_type = MediaType(r.extract_u16()?);
                    let media_specific = MediaSpecific::decode(media_type, r)?;
                    interfaces.push(LocalInterface {
                        mac,
                        media_type,
                        media_specific,
                    });
                }
                Tlv::DeviceInformation(DeviceInformation { al_mac, interfaces })
            }
            TlvType::DeviceBridgingCapability => {
                let count = r.extract_u8()?;
                let mut tuples = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let macs = r.extract_u8()?;
                    let mut tuple = Vec::with_capacity(macs as usize);
                    for _ in 0..macs {
                        tuple.push(r.extract_mac()?);
                    }
                    tuples.push(tuple);
                }
                Tlv::DeviceBridgingCapability(tuples)
            }
            TlvType::NeighborDeviceList => {
                let local_mac = r.extract_mac()?;
                let count = r.extract_u8()?;
                let mut neighbors = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let mac = r.extract_mac()?;
                    let flags = r.extract_u8()?;
                    neighbors.push(NeighborDevice {
                        mac,
                        bridge: flags & 0x80 != 0,
                    });
                }
                Tlv::NeighborDeviceList(NeighborDeviceList {
                    local_mac,
                    neighbors,
                })
            }
            TlvType::PowerOffInterface => {
                let count = r.extract_u8()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let mac = r.extract_mac()?;
                    let media_type = MediaType(r.extract_u16()?);
                    let oui = r.extract_array::<3>()?;
                    let variant_index = r.extract_u8()?;
                    let len = r.extract_u8()? as usize;
                    let media_info = r.extract_n(len)?.to_vec();
                    entries.push(PowerOffInterface {
                        mac,
                        media_type,
                        oui,
                        variant_index,
                        media_info,
                    });
                }
                Tlv::PowerOffInterface(entries)
            }
            TlvType::L2NeighborDevice => {
                let count = r.extract_u8()?;
                let mut ifaces = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let local_mac = r.extract_mac()?;
                    let neighbor_count = r.extract_u16()? as usize;
                    let mut neighbors = Vec::new();
                    for _ in 0..neighbor_count {
                        let mac = r.extract_mac()?;
                        let behind_count = r.extract_u16()? as usize;
                        let mut behind = Vec::new();
                        for _ in 0..behind_count {
                            behind.push(r.extract_mac()?);
                        }
                        neighbors.push(L2Neighbor { mac, behind });
                    }
                    ifaces.push(L2Interface {
                        local_mac,
                        neighbors,
                    });
                }
                Tlv::L2NeighborDevice(ifaces)
            }
            TlvType::SupportedService => {
                let count = r.extract_u8()?;
                let services = r
                    .extract_n(count as usize)?
                    .iter()
                    .map(|b| ServiceType::from(*b))
                    .collect();
                Tlv::SupportedService(services)
            }
            TlvType::ApOperationalBss => {
                let count = r.extract_u8()?;
                let mut radios = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let radio_id = r.extract_mac()?;
                    let bss_count = r.extract_u8()?;
                    let mut bss = Vec::with_capacity(bss_count as usize);
                    for _ in 0..bss_count {
                        let bssid = r.extract_mac()?;
                        let len = r.extract_u8()? as usize;
                        if len > MAX_SSID_LEN {
                            return Err(WireError::Malformed("ssid longer than 32 bytes"));
                        }
                        let ssid = Ssid(r.extract_n(len)?.to_vec());
                        bss.push(ApBss { bssid, ssid });
                    }
                    radios.push(ApRadio { radio_id, bss });
                }
                Tlv::ApOperationalBss(radios)
            }
        };
        Ok(tlv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0x02, 0x00, 0x00, 0x00, 0x00, last)
    }

    fn samples() -> Vec<Tlv> {
        vec![
            Tlv::EndOfMessage,
            Tlv::AlMacAddress(mac(1)),
            Tlv::MacAddress(mac(2)),
            Tlv::DeviceInformation(DeviceInformation {
                al_mac: mac(1),
                interfaces: vec![
                    LocalInterface {
                        mac: mac(0x10),
                        media_type: MediaType::IEEE80211G_2_4,
                        media_specific: MediaSpecific::Ieee80211(Ieee80211Info {
                            network_membership: MacAddr::new(0x00, 0x16, 0x03, 0x01, 0x85, 0x1f),
                            role: Ieee80211Role::Ap,
                            ap_channel_band: 0x10,
                            center_freq_index_1: 0x20,
                            center_freq_index_2: 0x30,
                        }),
                    },
                    LocalInterface {
                        mac: mac(0x11),
                        media_type: MediaType::FAST_ETHERNET,
                        media_specific: MediaSpecific::None,
                    },
                    LocalInterface {
                        mac: mac(0x12),
                        media_type: MediaType::IEEE1901_FFT,
                        media_specific: MediaSpecific::Other(vec![1, 2, 3, 4, 5, 6, 7]),
                    },
                ],
            }),
            Tlv::DeviceBridgingCapability(vec![]),
            Tlv::DeviceBridgingCapability(vec![vec![mac(0x10), mac(0x11)], vec![]]),
            Tlv::NeighborDeviceList(NeighborDeviceList {
                local_mac: mac(0x10),
                neighbors: vec![
                    NeighborDevice {
                        mac: mac(0x20),
                        bridge: false,
                    },
                    NeighborDevice {
                        mac: mac(0x21),
                        bridge: true,
                    },
                ],
            }),
            Tlv::PowerOffInterface(vec![]),
            Tlv::PowerOffInterface(vec![PowerOffInterface {
                mac: mac(0x13),
                media_type: MediaType::UNKNOWN,
                oui: [0x00, 0x19, 0xa7],
                variant_index: 2,
                media_info: vec![0xaa, 0xbb],
            }]),
            Tlv::L2NeighborDevice(vec![]),
            Tlv::L2NeighborDevice(vec![L2Interface {
                local_mac: mac(0x11),
                neighbors: vec![L2Neighbor {
                    mac: mac(0x30),
                    behind: vec![mac(0x31), mac(0x32)],
                }],
            }]),
            Tlv::SupportedService(vec![ServiceType::Controller, ServiceType::Agent]),
            Tlv::ApOperationalBss(vec![
                ApRadio {
                    radio_id: mac(0x10),
                    bss: vec![ApBss {
                        bssid: MacAddr::new(0x00, 0x16, 0x03, 0x01, 0x85, 0x1f),
                        ssid: Ssid::try_from("My WIFI network").unwrap(),
                    }],
                },
                ApRadio {
                    radio_id: mac(0x12),
                    bss: vec![],
                },
            ]),
        ]
    }

    #[test]
    fn test_roundtrip_all_variants() {
        for tlv in samples() {
            let bytes = tlv.encode().unwrap();
            assert_eq!(bytes.len(), tlv.encoded_len());
            assert_eq!(bytes[0], tlv.tlv_type() as u8);
            let declared = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
            assert_eq!(declared, bytes.len() - TLV_HEADER_SIZE);
            assert_eq!(Tlv::decode(&bytes).unwrap(), tlv);
        }
    }

    #[test]
    fn test_every_strict_prefix_is_truncated() {
        for tlv in samples() {
            let bytes = tlv.encode().unwrap();
            for n in 0..bytes.len() {
                assert_eq!(
                    Tlv::decode(&bytes[..n]),
                    Err(WireError::Truncated),
                    "{:?} prefix {}",
                    tlv.tlv_type(),
                    n
                );
            }
        }
    }

    #[test]
    fn test_al_mac_wire_layout() {
        let bytes = Tlv::AlMacAddress(mac(0xab)).encode().unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0x06, 0x02, 0, 0, 0, 0, 0xab]);
    }

    #[test]
    fn test_empty_bridging_has_count_only() {
        let bytes = Tlv::DeviceBridgingCapability(vec![]).encode().unwrap();
        assert_eq!(bytes, vec![0x04, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_unknown_type_is_distinguishable() {
        let bytes = [0x42, 0x00, 0x02, 0xde, 0xad];
        let err = Tlv::decode(&bytes).unwrap_err();
        assert!(err.is_unknown_tlv());

        // the raw view still gives the length needed to skip it
        let mut r = Reader::new(&bytes);
        let raw = RawTlv::read(&mut r).unwrap();
        assert_eq!(raw.encoded_len(), 5);
        assert!(r.is_empty());
    }

    #[test]
    fn test_count_overrunning_length_is_malformed() {
        // neighbor list claims two neighbors but carries one
        let mut bytes = Tlv::NeighborDeviceList(NeighborDeviceList {
            local_mac: mac(1),
            neighbors: vec![NeighborDevice {
                mac: mac(2),
                bridge: false,
            }],
        })
        .encode()
        .unwrap();
        bytes[3 + MAC_LEN] = 2;
        assert!(matches!(Tlv::decode(&bytes), Err(WireError::Malformed(_))));
    }

    #[test]
    fn test_trailing_body_bytes_are_malformed() {
        let bytes = [0x01, 0x00, 0x07, 1, 2, 3, 4, 5, 6, 7];
        assert!(matches!(Tlv::decode(&bytes), Err(WireError::Malformed(_))));
    }

    #[test]
    fn test_ssid_bounds() {
        assert!(Ssid::try_from("x".repeat(MAX_SSID_LEN).as_str()).is_ok());
        assert_eq!(
            Ssid::try_from("x".repeat(MAX_SSID_LEN + 1).as_str()),
            Err(WireError::Size(MAX_SSID_LEN + 1))
        );

        // declared ssid length past the end of the tlv body
        let mut bytes = Tlv::ApOperationalBss(vec![ApRadio {
            radio_id: mac(1),
            bss: vec![ApBss {
                bssid: mac(2),
                ssid: Ssid::try_from("ab").unwrap(),
            }],
        }])
        .encode()
        .unwrap();
        let ssid_len_at = TLV_HEADER_SIZE + 1 + MAC_LEN + 1 + MAC_LEN;
        bytes[ssid_len_at] = 3;
        assert!(matches!(Tlv::decode(&bytes), Err(WireError::Malformed(_))));
        bytes[ssid_len_at] = 33;
        assert!(matches!(Tlv::decode(&bytes), Err(WireError::Malformed(_))));
    }

    #[test]
    fn test_oversized_count_fails_encode() {
        let services = vec![ServiceType::Agent; 256];
        assert_eq!(
            Tlv::SupportedService(services).encode(),
            Err(WireError::Size(256))
        );
    }

    #[test]
    fn test_service_values_are_canonical() {
        for reserved in [ServiceType::Other(0x00), ServiceType::Other(0x01)] {
            assert!(matches!(
                Tlv::SupportedService(vec![reserved]).encode(),
                Err(WireError::Invalid(_))
            ));
        }
        let tlv = Tlv::SupportedService(vec![ServiceType::Other(0x02), ServiceType::Other(0xff)]);
        assert_eq!(Tlv::decode(&tlv.encode().unwrap()).unwrap(), tlv);
        assert_eq!(
            Tlv::decode(&[0x80, 0x00, 0x02, 0x01, 0x00]).unwrap(),
            Tlv::SupportedService(vec![ServiceType::Controller])
        );
    }

    fn device_information(media_type: MediaType, media_specific: MediaSpecific) -> Tlv {
        Tlv::DeviceInformation(DeviceInformation {
            al_mac: mac(1),
            interfaces: vec![LocalInterface {
                mac: mac(0x10),
                media_type,
                media_specific,
            }],
        })
    }

    #[test]
    fn test_media_descriptor_must_match_media_type() {
        let info = Ieee80211Info {
            network_membership: mac(0x40),
            role: Ieee80211Role::Sta,
            ap_channel_band: 0,
            center_freq_index_1: 0,
            center_freq_index_2: 0,
        };
        let wired = device_information(
            MediaType::GIGABIT_ETHERNET,
            MediaSpecific::Ieee80211(info),
        );
        assert!(matches!(wired.encode(), Err(WireError::Invalid(_))));

        // opaque bytes that spell a valid descriptor would decode as one
        let mut raw = mac(0x40).0.to_vec();
        raw.extend_from_slice(&[0x40, 0, 0, 0]);
        let disguised = device_information(MediaType::IEEE80211N_5, MediaSpecific::Other(raw));
        assert!(matches!(disguised.encode(), Err(WireError::Invalid(_))));

        let empty = device_information(MediaType::MOCA_1_1, MediaSpecific::Other(Vec::new()));
        assert!(matches!(empty.encode(), Err(WireError::Invalid(_))));

        let wireless = device_information(MediaType::IEEE80211N_5, MediaSpecific::Ieee80211(info));
        assert_eq!(Tlv::decode(&wireless.encode().unwrap()).unwrap(), wireless);
    }

    #[test]
    fn test_reserved_role_is_kept_opaque() {
        for role_byte in [0x10, 0x41] {
            let mut bytes = vec![0x03, 0x00, 26];
            bytes.extend_from_slice(&mac(1).0);
            bytes.push(1);
            bytes.extend_from_slice(&mac(0x10).0);
            bytes.extend_from_slice(&MediaType::IEEE80211N_2_4.0.to_be_bytes());
            bytes.push(IEEE80211_INFO_LEN as u8);
            bytes.extend_from_slice(&mac(0x40).0);
            bytes.extend_from_slice(&[role_byte, 0x00, 0x01, 0x02]);

            let tlv = Tlv::decode(&bytes).unwrap();
            let Tlv::DeviceInformation(info) = &tlv else {
                panic!("expected device information, got {:?}", tlv);
            };
            assert_eq!(
                info.interfaces[0].media_specific,
                MediaSpecific::Other(bytes[bytes.len() - IEEE80211_INFO_LEN..].to_vec())
            );
            assert_eq!(tlv.encode().unwrap(), bytes);
        }
    }

    #[test]
    fn test_media_type_names() {
        assert_eq!(MediaType::IEEE80211G_2_4.to_string(), "ieee80211g_2_4");
        assert_eq!("0x0105".parse::<MediaType>().unwrap(), MediaType::IEEE80211AC_5);
        assert_eq!("fast_ethernet".parse::<MediaType>().unwrap(), MediaType::FAST_ETHERNET);
        assert!(MediaType::IEEE80211N_5.is_ieee80211());
        assert!(!MediaType::MOCA_1_1.is_ieee80211());
        let yaml: MediaType = serde_yaml::from_str("ieee80211n_5").unwrap();
        assert_eq!(yaml, MediaType::IEEE80211N_5);
        let code: MediaType = serde_yaml::from_str("258").unwrap();
        assert_eq!(code, MediaType::IEEE80211A_5);
    }
}
