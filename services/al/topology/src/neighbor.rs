//! Per-interface table of 1905 neighbors.

use ieee1905_wire::{MacAddr, NeighborDevice};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// A 1905 device heard on a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    /// Neighbor AL address
    pub al_mac: MacAddr,
    /// Neighbor interface the messages came from, once known
    pub interface_mac: Option<MacAddr>,
    /// Message id of the last discovery or response seen
    pub last_message_id: u16,
    /// Last discovery or response seen
    pub last_seen: Instant,
}

/// Outcome of observing a neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Neighbor was not in the table
    NewPeer,
    /// The neighbor interface used to belong to another AL
    ChangedPeer {
        /// AL address previously recorded for that interface
        previous: MacAddr,
    },
    /// Already known, timestamp refreshed
    Refreshed,
}

impl Observation {
    /// Whether table membership changed
    pub fn is_membership_change(&self) -> bool {
        !matches!(self, Observation::Refreshed)
    }
}

/// Neighbors of one local interface, keyed by AL address
#[derive(Debug, Clone)]
pub struct NeighborTable {
    local_mac: MacAddr,
    entries: BTreeMap<MacAddr, NeighborEntry>,
}

impl NeighborTable {
    /// Empty table for the local interface `local_mac`
    pub fn new(local_mac: MacAddr) -> Self {
        Self {
            local_mac,
            entries: BTreeMap::new(),
        }
    }

    /// Local interface this table belongs to
    pub fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    /// Record a topology discovery from `al_mac` sent by `interface_mac`
    pub fn observe_discovery(
        &mut self,
        al_mac: MacAddr,
        interface_mac: MacAddr,
        message_id: u16,
        now: Instant,
    ) -> Observation {
        let replaced = self
            .entries
            .values()
            .find(|e| e.interface_mac == Some(interface_mac) && e.al_mac != al_mac)
            .map(|e| e.al_mac);

        if let Some(previous) = replaced {
            info!(
                iface = %self.local_mac,
                "Neighbor interface {} moved from AL {} to {}",
                interface_mac, previous, al_mac
            );
            self.entries.remove(&previous);
            self.insert(al_mac, Some(interface_mac), message_id, now);
            return Observation::ChangedPeer { previous };
        }

        match self.entries.get_mut(&al_mac) {
            Some(entry) => {
                entry.interface_mac = Some(interface_mac);
                entry.last_message_id = message_id;
                entry.last_seen = now;
                Observation::Refreshed
            }
            None => {
                info!(iface = %self.local_mac, "New neighbor {}", al_mac);
                self.insert(al_mac, Some(interface_mac), message_id, now);
                Observation::NewPeer
            }
        }
    }

    /// Record a topology response from `al_mac` received on this interface
    pub fn observe_response(
        &mut self,
        al_mac: MacAddr,
        message_id: u16,
        now: Instant,
    ) -> Observation {
        match self.entries.get_mut(&al_mac) {
            Some(entry) => {
                entry.last_message_id = message_id;
                entry.last_seen = now;
                Observation::Refreshed
            }
            None => {
                info!(
                    iface = %self.local_mac,
                    "New neighbor {} from topology response", al_mac
                );
                self.insert(al_mac, None, message_id, now);
                Observation::NewPeer
            }
        }
    }

    fn insert(
        &mut self,
        al_mac: MacAddr,
        interface_mac: Option<MacAddr>,
        message_id: u16,
        now: Instant,
    ) {
        self.entries.insert(
            al_mac,
            NeighborEntry {
                al_mac,
                interface_mac,
                last_message_id: message_id,
                last_seen: now,
            },
        );
    }

    /// Remove entries not refreshed within `window`
    pub fn expire(&mut self, now: Instant, window: Duration) -> Vec<NeighborEntry> {
        let stale: Vec<MacAddr> = self
            .entries
            .values()
            .filter(|e| now.saturating_duration_since(e.last_seen) >= window)
            .map(|e| e.al_mac)
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for al_mac in stale {
            if let Some(entry) = self.entries.remove(&al_mac) {
                debug!(iface = %self.local_mac, "Neighbor {} expired", al_mac);
                removed.push(entry);
            }
        }
        removed
    }

    /// Whether `al_mac` is a known neighbor
    pub fn contains(&self, al_mac: &MacAddr) -> bool {
        self.entries.contains_key(al_mac)
    }

    /// Look up a neighbor
    pub fn get(&self, al_mac: &MacAddr) -> Option<&NeighborEntry> {
        self.entries.get(al_mac)
    }

    /// Number of neighbors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Neighbors in address order
    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.values()
    }

    /// Neighbors as carried in a neighbor device list TLV.
    ///
    /// More than one 1905 device on the same link means they share a
    /// segment behind an 802.1 bridge.
    pub fn neighbor_devices(&self) -> Vec<NeighborDevice> {
        let bridge = self.entries.len() > 1;
        self.entries
            .keys()
            .map(|mac| NeighborDevice { mac: *mac, bridge })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0x02, 0, 0, 0, 0, last)
    }

    #[test]
    fn test_second_discovery_is_refresh() {
        let now = Instant::now();
        let mut table = NeighborTable::new(mac(0xf0));
        assert_eq!(
            table.observe_discovery(mac(1), mac(0x11), 10, now),
            Observation::NewPeer
        );
        assert_eq!(
            table.observe_discovery(mac(1), mac(0x11), 11, now),
            Observation::Refreshed
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&mac(1)).unwrap().last_message_id, 11);
    }

    #[test]
    fn test_interface_taken_over_by_other_al() {
        let now = Instant::now();
        let mut table = NeighborTable::new(mac(0xf0));
        table.observe_discovery(mac(1), mac(0x11), 1, now);
        let observed = table.observe_discovery(mac(2), mac(0x11), 1, now);
        assert_eq!(observed, Observation::ChangedPeer { previous: mac(1) });
        assert!(observed.is_membership_change());
        assert!(!table.contains(&mac(1)));
        assert!(table.contains(&mac(2)));
    }

    #[test]
    fn test_response_from_unknown_al_adds_neighbor() {
        let now = Instant::now();
        let mut table = NeighborTable::new(mac(0xf0));
        assert_eq!(table.observe_response(mac(3), 5, now), Observation::NewPeer);
        assert_eq!(table.get(&mac(3)).unwrap().interface_mac, None);
        assert_eq!(table.observe_response(mac(3), 6, now), Observation::Refreshed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_respects_refresh() {
        let window = Duration::from_secs(140);
        let mut table = NeighborTable::new(mac(0xf0));
        table.observe_discovery(mac(1), mac(0x11), 1, Instant::now());
        table.observe_discovery(mac(2), mac(0x12), 1, Instant::now());

        tokio::time::advance(Duration::from_secs(100)).await;
        table.observe_discovery(mac(2), mac(0x12), 2, Instant::now());

        tokio::time::advance(Duration::from_secs(40)).await;
        let removed = table.expire(Instant::now(), window);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].al_mac, mac(1));
        assert!(table.contains(&mac(2)));
        assert!(table.expire(Instant::now(), window).is_empty());
    }

    #[test]
    fn test_bridge_flag_with_shared_segment() {
        let now = Instant::now();
        let mut table = NeighborTable::new(mac(0xf0));
        table.observe_discovery(mac(1), mac(0x11), 1, now);
        assert_eq!(
            table.neighbor_devices(),
            vec![NeighborDevice {
                mac: mac(1),
                bridge: false
            }]
        );
        table.observe_discovery(mac(2), mac(0x12), 1, now);
        assert!(table.neighbor_devices().iter().all(|n| n.bridge));
    }
}
