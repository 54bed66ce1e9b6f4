//! Engine configuration.

use crate::EngineError;
use ieee1905_wire::{BridgingTuple, MacAddr, CMDU_HEADER_SIZE, MAX_CMDU_PAYLOAD};
use std::time::Duration;

/// Configuration of the discovery engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// AL address of this device
    pub al_mac: MacAddr,
    /// Base period between discovery announcements
    pub discovery_interval: Duration,
    /// Upper bound of the random delay added to each period
    pub discovery_jitter: Duration,
    /// Age after which an unrefreshed neighbor is removed
    pub neighbor_expiry: Duration,
    /// Period of the expiry and housekeeping sweeps
    pub sweep_interval: Duration,
    /// Time a partially received message is held
    pub reassembly_timeout: Duration,
    /// Time a processed message id is remembered
    pub dedup_retention: Duration,
    /// Expected upper bound between a query and its response
    pub response_budget: Duration,
    /// CMDU bytes per frame
    pub max_payload: usize,
    /// Include the Multi-AP operational BSS TLV in responses
    pub multi_ap: bool,
    /// Advertise the Multi-AP controller service
    pub controller: bool,
    /// Advertise the Multi-AP agent service
    pub agent: bool,
    /// Re-announce immediately when a new neighbor appears
    pub fast_discovery: bool,
    /// Forward relayed multicast messages on the other interfaces
    pub relay_multicast: bool,
    /// Bridging tuples reported in responses
    pub bridges: Vec<BridgingTuple>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            al_mac: MacAddr::ZERO,
            discovery_interval: Duration::from_secs(60),
            discovery_jitter: Duration::from_secs(1),
            neighbor_expiry: Duration::from_secs(140),
            sweep_interval: Duration::from_secs(1),
            reassembly_timeout: Duration::from_secs(3),
            dedup_retention: Duration::from_secs(30),
            response_budget: Duration::from_secs(1),
            max_payload: MAX_CMDU_PAYLOAD,
            multi_ap: true,
            controller: false,
            agent: true,
            fast_discovery: false,
            relay_multicast: true,
            bridges: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Default configuration for the AL `al_mac`
    pub fn new(al_mac: MacAddr) -> Self {
        Self {
            al_mac,
            ..Self::default()
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.al_mac == MacAddr::ZERO || self.al_mac.is_multicast() {
            return Err(EngineError::Config(format!(
                "AL address {} is not a unicast address",
                self.al_mac
            )));
        }
        if self.discovery_interval.is_zero() || self.sweep_interval.is_zero() {
            return Err(EngineError::Config(
                "discovery and sweep intervals must be positive".to_string(),
            ));
        }
        if self.neighbor_expiry <= self.discovery_interval + self.discovery_jitter {
            return Err(EngineError::Config(
                "neighbor expiry must exceed one jittered discovery interval".to_string(),
            ));
        }
        // header, one AL MAC TLV and the end marker at the very least
        if self.max_payload < CMDU_HEADER_SIZE + 9 + 3 {
            return Err(EngineError::Config(format!(
                "max payload {} too small",
                self.max_payload
            )));
        }
        Ok(())
    }
}
