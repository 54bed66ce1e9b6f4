//! Topology database of remote 1905 devices.

use ieee1905_wire::{MacAddr, MediaType, ServiceType, Ssid};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default age after which a device that stopped answering is dropped
pub const DEFAULT_MAX_DEVICE_AGE: Duration = Duration::from_secs(140);

/// An interface reported by a remote device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSummary {
    /// Interface hardware address
    pub mac: MacAddr,
    /// 1905 media type
    pub media_type: MediaType,
}

/// A 1905 adjacency reported by a remote device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    /// Reporting device's interface
    pub local_mac: MacAddr,
    /// AL address of the device on the other side
    pub neighbor_al: MacAddr,
    /// Whether a bridge sits in between
    pub bridge: bool,
}

/// A BSS reported by a remote device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BssSummary {
    /// Radio the BSS runs on
    pub radio_id: MacAddr,
    /// BSSID
    pub bssid: MacAddr,
    /// SSID
    pub ssid: Ssid,
}

/// What a remote device said about itself in its last topology response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    /// AL address
    pub al_mac: MacAddr,
    /// Local interface the response arrived on
    pub reached_via: MacAddr,
    /// Interfaces of the device
    pub interfaces: Vec<InterfaceSummary>,
    /// Bridging tuples
    pub bridges: Vec<Vec<MacAddr>>,
    /// 1905 adjacencies
    pub links: Vec<LinkSummary>,
    /// Non-1905 neighbors
    pub l2_neighbors: Vec<MacAddr>,
    /// Multi-AP services
    pub services: Vec<ServiceType>,
    /// Operational BSSes
    pub bss: Vec<BssSummary>,
    /// Message id of the response
    pub last_message_id: u16,
    /// When the response was processed
    #[serde(skip)]
    pub last_updated: Instant,
}

/// Database of remote devices learned from topology responses
#[derive(Debug)]
pub struct TopologyDatabase {
    /// Local AL address, never stored as a remote device
    local_al: MacAddr,
    /// Remote devices keyed by AL address
    devices: HashMap<MacAddr, DeviceRecord>,
    /// Age after which a device is dropped
    max_age: Duration,
    /// Number of responses applied
    updates: u64,
}

// Include implementation
mod database;
pub use database::TopologyStats;
