//! Topology discovery engine of the 1905.1 abstraction layer.
//!
//! The engine runs one task per local interface. Each task owns its
//! interface's timers, fragment reassembly and neighbor table writes, and
//! reacts to events from a single queue: inbound frames from the link layer,
//! forced announcements, and notification fan-out requests. Tasks share only
//! the de-duplication cache, the message id counter, the topology database
//! and read access to each other's neighbor tables.
//!
//! Protocol behaviour:
//!
//! - a discovery is multicast on every interface at start and then every
//!   interval plus a random jitter; any send rearms the timer
//! - a discovery from an AL not yet known on the interface triggers a
//!   unicast topology query to that AL
//! - a query is answered with a topology response reusing its message id
//! - neighbor membership changes, expiries and the external "topology
//!   changed" signal produce one relayed notification per interface

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
mod interface;
pub mod response;


use ieee1905_radio::RadioError;
use ieee1905_wire::{Frame, MacAddr};
use thiserror::Error;

pub use config::EngineConfig;
pub use engine::{Engine, EngineHandle};
pub use response::{topology_response_tlvs, ResponseContext};

/// A frame for the link layer to transmit on a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Local interface to send on
    pub interface: MacAddr,
    /// Frame to send
    pub frame: Frame,
}

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// No task runs for this interface
    #[error("unknown interface {0}")]
    UnknownInterface(MacAddr),
    /// Rejected configuration
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The capability collector failed
    #[error("collector error: {0}")]
    Collector(#[from] RadioError),
    /// The interface task has stopped
    #[error("interface {0} stopped")]
    Stopped(MacAddr),
}
