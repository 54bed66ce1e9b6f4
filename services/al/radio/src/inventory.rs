//! Inventory records produced by a capability collector.

use ieee1905_wire::{
    ApBss, ApRadio, Ieee80211Info, LocalInterface, MacAddr, MediaSpecific, MediaType, Ssid,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One local interface as reported by the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalInterfaceRecord {
    /// OS interface name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Hardware address
    pub mac: MacAddr,
    /// 1905 media type
    pub media_type: MediaType,
    /// 802.11 descriptor for wireless interfaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ieee80211: Option<Ieee80211Info>,
}

impl LocalInterfaceRecord {
    /// Wired interface without media-specific data
    pub fn wired(mac: MacAddr, media_type: MediaType) -> Self {
        Self {
            name: None,
            mac,
            media_type,
            ieee80211: None,
        }
    }

    /// Wireless interface with its 802.11 descriptor
    pub fn wireless(mac: MacAddr, media_type: MediaType, info: Ieee80211Info) -> Self {
        Self {
            name: None,
            mac,
            media_type,
            ieee80211: Some(info),
        }
    }

    /// Entry for a device information TLV.
    ///
    /// An 802.11 descriptor is only carried on 802.11 media types.
    pub fn to_local_interface(&self) -> LocalInterface {
        let media_specific = match self.ieee80211 {
            Some(info) if self.media_type.is_ieee80211() => MediaSpecific::Ieee80211(info),
            Some(_) => {
                warn!(
                    iface = %self.mac,
                    "Ignoring 802.11 descriptor on {} interface", self.media_type
                );
                MediaSpecific::None
            }
            None => MediaSpecific::None,
        };
        LocalInterface {
            mac: self.mac,
            media_type: self.media_type,
            media_specific,
        }
    }
}

/// One channel of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// IEEE channel number
    pub id: u8,
    /// Center frequency in MHz
    pub freq: u32,
    /// Channel disabled by regulatory rules
    pub disabled: bool,
    /// Radar detection required
    pub radar: bool,
    /// Maximum transmit power
    pub max_tx_power: u32,
}

/// One band supported by a radio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    /// Band identifier as reported by the driver
    pub id: u8,
    /// 40 MHz HT operation supported
    pub ht40: bool,
    /// VHT supported channel width set
    pub vht_channel_width: u8,
    /// VHT short guard interval bits (80 MHz, 160 MHz)
    pub vht_short_gi: u8,
    /// Channels in driver order
    pub channels: Vec<Channel>,
}

/// A BSS operated by a radio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalBss {
    /// BSSID
    pub bssid: MacAddr,
    /// SSID
    pub ssid: Ssid,
}

/// Capabilities and operating state of one radio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Radio {
    /// Radio unique identifier
    pub id: MacAddr,
    /// PHY name
    pub name: String,
    /// Configured transmit antenna mask
    pub tx_antennas: u32,
    /// Configured receive antenna mask
    pub rx_antennas: u32,
    /// Maximum associated stations in AP mode
    pub max_assoc_stations: u32,
    /// Maximum simultaneous AP interfaces
    pub max_bss: u32,
    /// Supported bands
    pub bands: Vec<Band>,
    /// Operational BSSes
    pub bss: Vec<OperationalBss>,
}

impl Radio {
    /// Record for an AP operational BSS TLV, if the radio runs any BSS
    pub fn to_ap_radio(&self) -> Option<ApRadio> {
        if self.bss.is_empty() {
            return None;
        }
        Some(ApRadio {
            radio_id: self.id,
            bss: self
                .bss
                .iter()
                .map(|b| ApBss {
                    bssid: b.bssid,
                    ssid: b.ssid.clone(),
                })
                .collect(),
        })
    }
}

/// Every radio of the device, in collection order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioInventory {
    /// Radios
    pub radios: Vec<Radio>,
}

impl RadioInventory {
    /// Look up a radio by identifier
    pub fn get(&self, id: &MacAddr) -> Option<&Radio> {
        self.radios.iter().find(|r| r.id == *id)
    }

    /// Whether there are no radios
    pub fn is_empty(&self) -> bool {
        self.radios.is_empty()
    }

    /// Number of radios
    pub fn len(&self) -> usize {
        self.radios.len()
    }

    /// Radios in collection order
    pub fn iter(&self) -> impl Iterator<Item = &Radio> {
        self.radios.iter()
    }

    /// Operational BSSes grouped by radio, skipping idle radios
    pub fn ap_operational_bss(&self) -> Vec<ApRadio> {
        self.radios.iter().filter_map(Radio::to_ap_radio).collect()
    }
}
