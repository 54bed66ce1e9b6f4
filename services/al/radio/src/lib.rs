//! Local capability inventory for the abstraction layer.
//!
//! The discovery engine never enumerates hardware itself. It asks a
//! [`CapabilityCollector`] for the local interfaces and the radio inventory
//! at startup and on refresh, and embeds them in the TLVs it sends.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod collector;
pub mod inventory;

use ieee1905_wire::MacAddr;
use thiserror::Error;

pub use builder::{frequency_to_channel, BandDump, ChannelDump, InventoryBuilder, RadioDump};
pub use collector::{CapabilityCollector, StaticCollector};
pub use inventory::{Band, Channel, LocalInterfaceRecord, OperationalBss, Radio, RadioInventory};

/// Capability collection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// A radio attribute arrived before any radio was started
    #[error("no radio in progress")]
    NoRadio,
    /// A channel or band capability arrived before any band was started
    #[error("no band in progress on radio {0}")]
    NoBand(MacAddr),
    /// The same radio identifier was reported twice
    #[error("duplicate radio {0}")]
    Duplicate(MacAddr),
}
