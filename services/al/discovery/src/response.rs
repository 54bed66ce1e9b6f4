//! Topology response contents.

use ieee1905_radio::{LocalInterfaceRecord, RadioInventory};
use ieee1905_wire::{
    BridgingTuple, DeviceInformation, MacAddr, NeighborDevice, NeighborDeviceList, ServiceType,
    Tlv,
};

/// Everything a topology response describes
#[derive(Debug, Clone, Copy)]
pub struct ResponseContext<'a> {
    /// Our AL address
    pub al_mac: MacAddr,
    /// Local interfaces in collector order
    pub interfaces: &'a [LocalInterfaceRecord],
    /// Local radios
    pub radios: &'a RadioInventory,
    /// Neighbor devices per local interface
    pub neighbors: &'a [(MacAddr, Vec<NeighborDevice>)],
    /// Bridging tuples
    pub bridges: &'a [BridgingTuple],
    /// Advertise the controller service
    pub controller: bool,
    /// Advertise the agent service
    pub agent: bool,
    /// Add the operational BSS TLV
    pub multi_ap: bool,
}

impl ResponseContext<'_> {
    fn services(&self) -> Vec<ServiceType> {
        let mut services = Vec::new();
        if self.controller {
            services.push(ServiceType::Controller);
        }
        if self.agent {
            services.push(ServiceType::Agent);
        }
        services
    }
}

/// TLVs of a topology response, in transmission order.
///
/// Device information and bridging capability come first, followed by one
/// neighbor device list per interface that has neighbors, the power-off and
/// L2 neighbor TLVs, the supported services and finally, with Multi-AP
/// enabled, the operational BSS of every radio running one.
pub fn topology_response_tlvs(ctx: &ResponseContext<'_>) -> Vec<Tlv> {
    let mut tlvs = vec![
        Tlv::DeviceInformation(DeviceInformation {
            al_mac: ctx.al_mac,
            interfaces: ctx
                .interfaces
                .iter()
                .map(LocalInterfaceRecord::to_local_interface)
                .collect(),
        }),
        Tlv::DeviceBridgingCapability(ctx.bridges.to_vec()),
    ];

    for iface in ctx.interfaces {
        let Some((_, neighbors)) = ctx.neighbors.iter().find(|(mac, _)| *mac == iface.mac) else {
            continue;
        };
        if neighbors.is_empty() {
            continue;
        }
        tlvs.push(Tlv::NeighborDeviceList(NeighborDeviceList {
            local_mac: iface.mac,
            neighbors: neighbors.clone(),
        }));
    }

    // no power-off interfaces and no non-1905 neighbor tracking
    tlvs.push(Tlv::PowerOffInterface(Vec::new()));
    tlvs.push(Tlv::L2NeighborDevice(Vec::new()));
    tlvs.push(Tlv::SupportedService(ctx.services()));

    if ctx.multi_ap {
        tlvs.push(Tlv::ApOperationalBss(ctx.radios.ap_operational_bss()));
    }
    tlvs
}

#[cfg(test)]
mod tests {
    use super::*;
    use ieee1905_radio::{OperationalBss, Radio};
    use ieee1905_wire::{Ieee80211Info, Ieee80211Role, MediaSpecific, MediaType, Ssid, TlvType};

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0x00, 0xee, 0xff, 0x33, 0x44, last)
    }

    fn wireless(iface: MacAddr, membership_last: u8) -> LocalInterfaceRecord {
        LocalInterfaceRecord::wireless(
            iface,
            MediaType::IEEE80211G_2_4,
            Ieee80211Info {
                network_membership: MacAddr::new(0x00, 0x16, 0x03, 0x01, 0x85, membership_last),
                role: Ieee80211Role::Ap,
                ap_channel_band: 0x10,
                center_freq_index_1: 0x20,
                center_freq_index_2: 0x30,
            },
        )
    }

    fn radio(id: MacAddr, ssid: &str) -> Radio {
        Radio {
            id,
            name: String::new(),
            tx_antennas: 0,
            rx_antennas: 0,
            max_assoc_stations: 0,
            max_bss: 1,
            bands: Vec::new(),
            bss: vec![OperationalBss {
                bssid: id,
                ssid: Ssid::try_from(ssid).unwrap(),
            }],
        }
    }

    #[test]
    fn test_response_tlv_order_and_contents() {
        let interfaces = vec![
            wireless(mac(0x10), 0x1f),
            LocalInterfaceRecord::wired(mac(0x11), MediaType::FAST_ETHERNET),
            wireless(mac(0x12), 0x1e),
            LocalInterfaceRecord::wired(mac(0x13), MediaType::FAST_ETHERNET),
        ];
        let radios = RadioInventory {
            radios: vec![
                radio(mac(0x10), "My WIFI network"),
                radio(mac(0x12), "My 2nd WIFI network"),
            ],
        };
        let peer = MacAddr::new(0x02, 0, 0, 0, 0, 0x99);
        let neighbors = vec![
            (
                mac(0x11),
                vec![NeighborDevice {
                    mac: peer,
                    bridge: false,
                }],
            ),
            (mac(0x13), Vec::new()),
        ];
        let ctx = ResponseContext {
            al_mac: mac(0),
            interfaces: &interfaces,
            radios: &radios,
            neighbors: &neighbors,
            bridges: &[],
            controller: false,
            agent: true,
            multi_ap: true,
        };

        let tlvs = topology_response_tlvs(&ctx);
        let order: Vec<TlvType> = tlvs.iter().map(Tlv::tlv_type).collect();
        assert_eq!(
            order,
            vec![
                TlvType::DeviceInformation,
                TlvType::DeviceBridgingCapability,
                TlvType::NeighborDeviceList,
                TlvType::PowerOffInterface,
                TlvType::L2NeighborDevice,
                TlvType::SupportedService,
                TlvType::ApOperationalBss,
            ]
        );

        let Tlv::DeviceInformation(info) = &tlvs[0] else {
            panic!("expected device information first");
        };
        assert_eq!(info.al_mac, mac(0));
        assert_eq!(info.interfaces.len(), 4);
        assert!(matches!(
            info.interfaces[0].media_specific,
            MediaSpecific::Ieee80211(Ieee80211Info {
                ap_channel_band: 0x10,
                ..
            })
        ));
        assert_eq!(info.interfaces[1].media_specific, MediaSpecific::None);

        let Tlv::NeighborDeviceList(list) = &tlvs[2] else {
            panic!("expected a neighbor list");
        };
        assert_eq!(list.local_mac, mac(0x11));
        assert_eq!(list.neighbors[0].mac, peer);

        let Tlv::ApOperationalBss(bss) = &tlvs[6] else {
            panic!("expected operational bss last");
        };
        assert_eq!(bss.len(), 2);
        assert_eq!(bss[1].bss[0].ssid.to_string(), "My 2nd WIFI network");
        assert_eq!(tlvs[5], Tlv::SupportedService(vec![ServiceType::Agent]));
    }

    #[test]
    fn test_empty_inventory_response() {
        let radios = RadioInventory::default();
        let ctx = ResponseContext {
            al_mac: mac(0),
            interfaces: &[],
            radios: &radios,
            neighbors: &[],
            bridges: &[],
            controller: true,
            agent: true,
            multi_ap: false,
        };
        let tlvs = topology_response_tlvs(&ctx);
        assert_eq!(tlvs.len(), 5);
        assert_eq!(
            tlvs[4],
            Tlv::SupportedService(vec![ServiceType::Controller, ServiceType::Agent])
        );
        assert!(!tlvs.iter().any(|t| t.tlv_type() == TlvType::ApOperationalBss));
    }
}
