//! TopologyDatabase implementation methods.

use super::{
    BssSummary, DeviceRecord, InterfaceSummary, LinkSummary, TopologyDatabase,
    DEFAULT_MAX_DEVICE_AGE,
};
use ieee1905_wire::{Cmdu, MacAddr, MessageType, Tlv};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

impl Default for TopologyDatabase {
    fn default() -> Self {
        Self::new(MacAddr::ZERO, DEFAULT_MAX_DEVICE_AGE)
    }
}

impl TopologyDatabase {
    /// Create a database for the AL `local_al`
    pub fn new(local_al: MacAddr, max_age: Duration) -> Self {
        Self {
            local_al,
            devices: HashMap::new(),
            max_age,
            updates: 0,
        }
    }

    /// Apply a topology response received on the local interface `via`.
    ///
    /// Returns true when the device was not known before.
    pub fn process_response(&mut self, via: MacAddr, cmdu: &Cmdu, now: Instant) -> bool {
        if cmdu.message_type != MessageType::TopologyResponse {
            return false;
        }
        let Some(info) = cmdu.device_information() else {
            return false;
        };
        if info.al_mac == self.local_al {
            debug!("Ignoring topology response describing ourselves");
            return false;
        }

        let mut record = DeviceRecord {
            al_mac: info.al_mac,
            reached_via: via,
            interfaces: Vec::new(),
            bridges: Vec::new(),
            links: Vec::new(),
            l2_neighbors: Vec::new(),
            services: Vec::new(),
            bss: Vec::new(),
            last_message_id: cmdu.message_id,
            last_updated: now,
        };

        // tolerate any TLV order
        for tlv in &cmdu.tlvs {
            match tlv {
                Tlv::DeviceInformation(info) => {
                    record.interfaces = info
                        .interfaces
                        .iter()
                        .map(|i| InterfaceSummary {
                            mac: i.mac,
                            media_type: i.media_type,
                        })
                        .collect();
                }
                Tlv::DeviceBridgingCapability(tuples) => record.bridges = tuples.clone(),
                Tlv::NeighborDeviceList(list) => {
                    record
                        .links
                        .extend(list.neighbors.iter().map(|n| LinkSummary {
                            local_mac: list.local_mac,
                            neighbor_al: n.mac,
                            bridge: n.bridge,
                        }));
                }
                Tlv::L2NeighborDevice(ifaces) => {
                    record.l2_neighbors.extend(
                        ifaces
                            .iter()
                            .flat_map(|i| i.neighbors.iter().map(|n| n.mac)),
                    );
                }
                Tlv::SupportedService(services) => record.services = services.clone(),
                Tlv::ApOperationalBss(radios) => {
                    record.bss = radios
                        .iter()
                        .flat_map(|r| {
                            r.bss.iter().map(move |b| BssSummary {
                                radio_id: r.radio_id,
                                bssid: b.bssid,
                                ssid: b.ssid.clone(),
                            })
                        })
                        .collect();
                }
                _ => {}
            }
        }

        self.updates += 1;
        let is_new = !self.devices.contains_key(&record.al_mac);
        if is_new {
            info!(
                "Learned device {} via {} ({} interfaces, {} links)",
                record.al_mac,
                via,
                record.interfaces.len(),
                record.links.len()
            );
        } else {
            debug!("Updated device {} (mid {})", record.al_mac, record.last_message_id);
        }
        self.devices.insert(record.al_mac, record);
        is_new
    }

    /// Get a device record
    pub fn get_device(&self, al_mac: &MacAddr) -> Option<&DeviceRecord> {
        self.devices.get(al_mac)
    }

    /// Get all known devices
    pub fn get_devices(&self) -> &HashMap<MacAddr, DeviceRecord> {
        &self.devices
    }

    /// Copy of every record, ordered by AL address
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.devices.values().cloned().collect();
        records.sort_by_key(|r| r.al_mac);
        records
    }

    /// Clean up devices not refreshed within the maximum age
    pub fn cleanup_old_entries(&mut self, now: Instant) -> Vec<MacAddr> {
        let max_age = self.max_age;
        let to_remove: Vec<MacAddr> = self
            .devices
            .values()
            .filter(|d| now.saturating_duration_since(d.last_updated) >= max_age)
            .map(|d| d.al_mac)
            .collect();

        if !to_remove.is_empty() {
            info!("Cleaning up {} old topology entries", to_remove.len());
            for al_mac in &to_remove {
                self.devices.remove(al_mac);
            }
        }
        to_remove
    }

    /// Get topology statistics
    pub fn get_stats(&self) -> TopologyStats {
        TopologyStats {
            total_devices: self.devices.len(),
            total_links: self.devices.values().map(|d| d.links.len()).sum(),
            updates: self.updates,
        }
    }
}

/// Topology database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyStats {
    /// Number of known remote devices
    pub total_devices: usize,
    /// Adjacencies reported by those devices
    pub total_links: usize,
    /// Responses applied so far
    pub updates: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ieee1905_wire::{
        ApBss, ApRadio, DeviceInformation, LocalInterface, MediaSpecific, MediaType,
        NeighborDevice, NeighborDeviceList, ServiceType, Ssid,
    };

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0x02, 0, 0, 0, 0, last)
    }

    fn response(al: MacAddr, mid: u16) -> Cmdu {
        Cmdu::topology_response(
            mid,
            vec![
                Tlv::SupportedService(vec![ServiceType::Agent]),
                Tlv::DeviceInformation(DeviceInformation {
                    al_mac: al,
                    interfaces: vec![LocalInterface {
                        mac: mac(0x20),
                        media_type: MediaType::GIGABIT_ETHERNET,
                        media_specific: MediaSpecific::None,
                    }],
                }),
                Tlv::NeighborDeviceList(NeighborDeviceList {
                    local_mac: mac(0x20),
                    neighbors: vec![NeighborDevice {
                        mac: mac(1),
                        bridge: false,
                    }],
                }),
                Tlv::ApOperationalBss(vec![ApRadio {
                    radio_id: mac(0x21),
                    bss: vec![ApBss {
                        bssid: mac(0x22),
                        ssid: Ssid::try_from("guest").unwrap(),
                    }],
                }]),
            ],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_response_builds_record() {
        let mut db = TopologyDatabase::new(mac(1), Duration::from_secs(140));
        assert!(db.process_response(mac(0x10), &response(mac(2), 7), Instant::now()));
        assert!(!db.process_response(mac(0x10), &response(mac(2), 8), Instant::now()));

        let record = db.get_device(&mac(2)).unwrap();
        assert_eq!(record.reached_via, mac(0x10));
        assert_eq!(record.last_message_id, 8);
        assert_eq!(record.interfaces.len(), 1);
        assert_eq!(record.links[0].neighbor_al, mac(1));
        assert_eq!(record.services, vec![ServiceType::Agent]);
        assert_eq!(record.bss[0].ssid.to_string(), "guest");
        assert_eq!(
            db.get_stats(),
            TopologyStats {
                total_devices: 1,
                total_links: 1,
                updates: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_response_is_ignored() {
        let mut db = TopologyDatabase::new(mac(1), Duration::from_secs(140));
        assert!(!db.process_response(mac(0x10), &response(mac(1), 1), Instant::now()));
        assert!(db.get_devices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_old_entries() {
        let mut db = TopologyDatabase::new(mac(1), Duration::from_secs(140));
        db.process_response(mac(0x10), &response(mac(2), 1), Instant::now());
        tokio::time::advance(Duration::from_secs(100)).await;
        db.process_response(mac(0x10), &response(mac(3), 1), Instant::now());
        tokio::time::advance(Duration::from_secs(40)).await;

        assert_eq!(db.cleanup_old_entries(Instant::now()), vec![mac(2)]);
        assert_eq!(db.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_serializes() {
        let mut db = TopologyDatabase::default();
        db.process_response(mac(0x10), &response(mac(2), 1), Instant::now());
        let json = serde_json::to_string(&db.snapshot()).unwrap();
        assert!(json.contains("\"al_mac\":\"02:00:00:00:00:02\""));
        assert!(json.contains("gigabit_ethernet"));
        assert!(!json.contains("last_updated"));
    }
}
