//! Configuration handling for the AL daemon.
//!
//! The configuration is read from a YAML file and then overridden by
//! environment variables. Durations are written in humantime form
//! (`60s`, `1m 30s`, `500ms`).

use anyhow::Result;
use ieee1905_discovery::EngineConfig;
use ieee1905_radio::{InventoryBuilder, LocalInterfaceRecord, RadioDump, RadioError, RadioInventory};
use ieee1905_wire::{BridgingTuple, MacAddr, MAX_CMDU_PAYLOAD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default path of the topology-change trigger file
pub const DEFAULT_TOPOLOGY_CHANGE_FILE: &str = "/tmp/topology_change";

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Protocol timings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Base period between discovery announcements
    #[serde(with = "duration_str")]
    pub discovery_interval: Duration,
    /// Upper bound of the random delay added to each period
    #[serde(with = "duration_str")]
    pub discovery_jitter: Duration,
    /// Age after which an unrefreshed neighbor is removed
    #[serde(with = "duration_str")]
    pub neighbor_expiry: Duration,
    /// Time a partially received message is held
    #[serde(with = "duration_str")]
    pub reassembly_timeout: Duration,
    /// Time a processed message id is remembered
    #[serde(with = "duration_str")]
    pub dedup_retention: Duration,
    /// Expected upper bound between a query and its response
    #[serde(with = "duration_str")]
    pub response_budget: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            discovery_interval: engine.discovery_interval,
            discovery_jitter: engine.discovery_jitter,
            neighbor_expiry: engine.neighbor_expiry,
            reassembly_timeout: engine.reassembly_timeout,
            dedup_retention: engine.dedup_retention,
            response_budget: engine.response_budget,
        }
    }
}

/// Roles and optional behaviours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Report operational BSSes (Multi-AP)
    pub multi_ap: bool,
    /// Advertise the Multi-AP controller service
    pub controller: bool,
    /// Advertise the Multi-AP agent service
    pub agent: bool,
    /// Re-announce as soon as a new neighbor shows up
    pub fast_discovery: bool,
    /// Forward relayed multicast messages
    pub relay_multicast: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            multi_ap: true,
            controller: false,
            agent: true,
            fast_discovery: false,
            relay_multicast: true,
        }
    }
}

/// AL daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlConfig {
    /// AL address of this device
    pub al_mac: MacAddr,
    /// File whose modification signals a topology change
    pub topology_change_file: PathBuf,
    /// CMDU bytes per frame
    pub max_payload: usize,
    /// Protocol timings
    pub timers: TimerConfig,
    /// Roles and optional behaviours
    pub profile: ProfileConfig,
    /// Bridging tuples
    pub bridges: Vec<BridgingTuple>,
    /// Local interfaces in announcement order
    pub interfaces: Vec<LocalInterfaceRecord>,
    /// Radio capability dumps
    pub radios: Vec<RadioDump>,
}

impl Default for AlConfig {
    fn default() -> Self {
        Self {
            al_mac: MacAddr::ZERO,
            topology_change_file: PathBuf::from(DEFAULT_TOPOLOGY_CHANGE_FILE),
            max_payload: MAX_CMDU_PAYLOAD,
            timers: TimerConfig::default(),
            profile: ProfileConfig::default(),
            bridges: Vec::new(),
            interfaces: Vec::new(),
            radios: Vec::new(),
        }
    }
}

impl AlConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<AlConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_environment_overrides();

        info!(
            "Final AL configuration: al_mac={}, interfaces={}, radios={}, trigger={:?}",
            config.al_mac,
            config.interfaces.len(),
            config.radios.len(),
            config.topology_change_file
        );
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("AL1905_AL_MAC") {
            match value.parse::<MacAddr>() {
                Ok(mac) => {
                    self.al_mac = mac;
                    info!("AL address overridden by environment: {}", mac);
                }
                Err(e) => warn!("Ignoring AL1905_AL_MAC: {}", e),
            }
        }

        if let Some(value) = lookup("AL1905_TOPOLOGY_CHANGE_FILE") {
            self.topology_change_file = PathBuf::from(value);
            info!(
                "Topology change file overridden by environment: {:?}",
                self.topology_change_file
            );
        }
    }

    /// Engine settings
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            al_mac: self.al_mac,
            discovery_interval: self.timers.discovery_interval,
            discovery_jitter: self.timers.discovery_jitter,
            neighbor_expiry: self.timers.neighbor_expiry,
            reassembly_timeout: self.timers.reassembly_timeout,
            dedup_retention: self.timers.dedup_retention,
            response_budget: self.timers.response_budget,
            max_payload: self.max_payload,
            multi_ap: self.profile.multi_ap,
            controller: self.profile.controller,
            agent: self.profile.agent,
            fast_discovery: self.profile.fast_discovery,
            relay_multicast: self.profile.relay_multicast,
            bridges: self.bridges.clone(),
            ..EngineConfig::default()
        }
    }

    /// Radio inventory assembled from the configured dumps
    pub fn radio_inventory(&self) -> Result<RadioInventory, RadioError> {
        let mut builder = InventoryBuilder::new();
        for dump in &self.radios {
            builder.add_dump(dump)?;
        }
        Ok(builder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ieee1905_wire::MediaType;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AlConfig::default();
        assert_eq!(config.al_mac, MacAddr::ZERO);
        assert_eq!(
            config.topology_change_file,
            PathBuf::from("/tmp/topology_change")
        );
        assert_eq!(config.timers.discovery_interval, Duration::from_secs(60));
        assert_eq!(config.timers.neighbor_expiry, Duration::from_secs(140));
        assert!(config.profile.multi_ap);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
al_mac: "00:ee:ff:33:44:00"
topology_change_file: /run/al/topology_change
timers:
  discovery_interval: 30s
  neighbor_expiry: 2m 10s
profile:
  controller: true
  fast_discovery: true
bridges:
  - ["00:ee:ff:33:44:11", "00:ee:ff:33:44:13"]
interfaces:
  - name: wlan0
    mac: "00:ee:ff:33:44:10"
    media_type: ieee80211g_2_4
    ieee80211:
      network_membership: "00:16:03:01:85:1f"
      role: ap
      ap_channel_band: 16
      center_freq_index_1: 32
      center_freq_index_2: 48
  - mac: "00:ee:ff:33:44:11"
    media_type: fast_ethernet
radios:
  - id: "00:ee:ff:33:44:10"
    name: phy0
    ap_interface_limits: [4, 8]
    bands:
      - id: 0
        ht_capa: 2
        channels:
          - freq: 2412
          - freq: 2437
            max_tx_power: 20
    bss:
      - bssid: "00:ee:ff:33:44:10"
        ssid: My WIFI network
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = AlConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.al_mac, "00:ee:ff:33:44:00".parse().unwrap());
        assert_eq!(config.timers.discovery_interval, Duration::from_secs(30));
        assert_eq!(config.timers.neighbor_expiry, Duration::from_secs(130));
        assert_eq!(config.timers.discovery_jitter, Duration::from_secs(1));
        assert!(config.profile.controller);
        assert!(config.profile.agent);
        assert_eq!(config.interfaces.len(), 2);
        assert_eq!(config.interfaces[1].media_type, MediaType::FAST_ETHERNET);
        assert_eq!(config.bridges[0].len(), 2);

        let engine = config.engine_config();
        assert!(engine.validate().is_ok());
        assert!(engine.fast_discovery);
        assert_eq!(engine.discovery_interval, Duration::from_secs(30));

        let inventory = config.radio_inventory().unwrap();
        let radio = &inventory.radios[0];
        assert_eq!(radio.max_bss, 8);
        assert!(radio.bands[0].ht40);
        assert_eq!(radio.bands[0].channels[1].id, 6);
        assert_eq!(radio.bss[0].ssid.to_string(), "My WIFI network");
    }

    #[test]
    fn test_missing_or_broken_file_uses_defaults() {
        let config = AlConfig::load_from_file("/nonexistent/al1905.yaml").unwrap();
        assert_eq!(config.max_payload, MAX_CMDU_PAYLOAD);

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"timers: [not, a, map]").unwrap();
        let config = AlConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.timers, TimerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AL1905_AL_MAC", "02-00-00-00-00-07"),
            ("AL1905_TOPOLOGY_CHANGE_FILE", "/var/run/topo"),
        ]);
        let mut config = AlConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.al_mac, MacAddr::new(0x02, 0, 0, 0, 0, 7));
        assert_eq!(config.topology_change_file, PathBuf::from("/var/run/topo"));

        let mut config = AlConfig::default();
        config.apply_overrides(|key| (key == "AL1905_AL_MAC").then(|| "bogus".to_string()));
        assert_eq!(config.al_mac, MacAddr::ZERO);
    }

    #[test]
    fn test_sample_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/al1905.yaml");
        let config = AlConfig::load_from_file(path).unwrap();
        assert_eq!(config.al_mac, MacAddr::new(0x00, 0xee, 0xff, 0x33, 0x44, 0x00));
        assert_eq!(config.interfaces.len(), 4);
        assert!(config.interfaces[2].ieee80211.is_some());

        let inventory = config.radio_inventory().unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.ap_operational_bss().len(), 2);
        assert!(config.engine_config().validate().is_ok());
    }

    #[test]
    fn test_durations_serialize_in_humantime_form() {
        let yaml = serde_yaml::to_string(&TimerConfig::default()).unwrap();
        assert!(yaml.contains("discovery_interval: 1m"));
        assert!(yaml.contains("response_budget: 1s"));
    }
}
