//! Accumulates a multi-part capability dump into an owned inventory.
//!
//! Drivers report a radio as a sequence of parts: radio attributes, interface
//! combination limits, then band after band with their channels. A split
//! dump may report the same band in several consecutive parts; those are
//! merged into one [`Band`]. All state lives in the builder and is handed
//! over by [`InventoryBuilder::finish`].

use crate::inventory::{Band, Channel, OperationalBss, Radio, RadioInventory};
use crate::RadioError;
use ieee1905_wire::{MacAddr, Ssid};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// HT capability bit for 20/40 MHz operation
const HT_CAP_SUP_WIDTH_20_40: u16 = 1 << 1;

/// Convert a center frequency in MHz to an IEEE channel number; 0 if unknown
pub fn frequency_to_channel(freq: u32) -> u8 {
    let channel = match freq {
        2484 => 14,
        2407..=2483 => (freq - 2407) / 5,
        4910..=4980 => (freq - 4000) / 5,
        5000..=45000 => (freq - 5000) / 5,
        58320..=70200 => (freq - 56160) / 2160,
        _ => 0,
    };
    u8::try_from(channel).unwrap_or(0)
}

/// Builder for a [`RadioInventory`]
#[derive(Debug, Default)]
pub struct InventoryBuilder {
    radios: Vec<Radio>,
}

impl InventoryBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn radio_mut(&mut self) -> Result<&mut Radio, RadioError> {
        self.radios.last_mut().ok_or(RadioError::NoRadio)
    }

    fn band_mut(&mut self) -> Result<&mut Band, RadioError> {
        let radio = self.radio_mut()?;
        let id = radio.id;
        radio.bands.last_mut().ok_or(RadioError::NoBand(id))
    }

    /// Start a new radio; following parts apply to it
    pub fn begin_radio(
        &mut self,
        id: MacAddr,
        name: impl Into<String>,
    ) -> Result<&mut Self, RadioError> {
        if self.radios.iter().any(|r| r.id == id) {
            return Err(RadioError::Duplicate(id));
        }
        self.radios.push(Radio {
            id,
            name: name.into(),
            tx_antennas: 0,
            rx_antennas: 0,
            max_assoc_stations: 0,
            max_bss: 0,
            bands: Vec::new(),
            bss: Vec::new(),
        });
        Ok(self)
    }

    /// Configured antenna masks
    pub fn antennas(&mut self, tx: u32, rx: u32) -> Result<&mut Self, RadioError> {
        let radio = self.radio_mut()?;
        radio.tx_antennas = tx;
        radio.rx_antennas = rx;
        Ok(self)
    }

    /// Maximum associated stations in AP mode
    pub fn max_assoc_stations(&mut self, stations: u32) -> Result<&mut Self, RadioError> {
        self.radio_mut()?.max_assoc_stations = stations;
        Ok(self)
    }

    /// AP limit of one interface combination; the largest one wins
    pub fn ap_interface_limit(&mut self, limit: u32) -> Result<&mut Self, RadioError> {
        let radio = self.radio_mut()?;
        radio.max_bss = radio.max_bss.max(limit);
        Ok(self)
    }

    /// Start a band part. Continues the current band if the id repeats.
    pub fn band(&mut self, id: u8) -> Result<&mut Self, RadioError> {
        let radio = self.radio_mut()?;
        let continues = radio.bands.last().map(|b| b.id == id).unwrap_or(false);
        if continues {
            debug!(radio = %radio.id, band = id, "Merging split band part");
        } else {
            radio.bands.push(Band {
                id,
                ht40: false,
                vht_channel_width: 0,
                vht_short_gi: 0,
                channels: Vec::new(),
            });
        }
        Ok(self)
    }

    /// HT capability word of the current band
    pub fn ht_capabilities(&mut self, capa: u16) -> Result<&mut Self, RadioError> {
        self.band_mut()?.ht40 = capa & HT_CAP_SUP_WIDTH_20_40 != 0;
        Ok(self)
    }

    /// VHT capability word of the current band
    pub fn vht_capabilities(&mut self, capa: u32) -> Result<&mut Self, RadioError> {
        let band = self.band_mut()?;
        band.vht_channel_width = ((capa >> 2) & 0x3) as u8;
        band.vht_short_gi = ((capa >> 5) & 0x3) as u8;
        Ok(self)
    }

    /// Add a channel to the current band
    pub fn channel(
        &mut self,
        freq: u32,
        disabled: bool,
        radar: bool,
        max_tx_power: Option<u32>,
    ) -> Result<&mut Self, RadioError> {
        self.band_mut()?.channels.push(Channel {
            id: frequency_to_channel(freq),
            freq,
            disabled,
            radar,
            max_tx_power: max_tx_power.unwrap_or(0),
        });
        Ok(self)
    }

    /// Add an operational BSS to the current radio
    pub fn bss(&mut self, bssid: MacAddr, ssid: Ssid) -> Result<&mut Self, RadioError> {
        self.radio_mut()?.bss.push(OperationalBss { bssid, ssid });
        Ok(self)
    }

    /// Feed a declarative radio dump
    pub fn add_dump(&mut self, dump: &RadioDump) -> Result<&mut Self, RadioError> {
        self.begin_radio(dump.id, dump.name.clone())?
            .antennas(dump.tx_antennas, dump.rx_antennas)?
            .max_assoc_stations(dump.max_assoc_stations)?;
        for limit in &dump.ap_interface_limits {
            self.ap_interface_limit(*limit)?;
        }
        for band in &dump.bands {
            self.band(band.id)?;
            if let Some(capa) = band.ht_capa {
                self.ht_capabilities(capa)?;
            }
            if let Some(capa) = band.vht_capa {
                self.vht_capabilities(capa)?;
            }
            for ch in &band.channels {
                self.channel(ch.freq, ch.disabled, ch.radar, ch.max_tx_power)?;
            }
        }
        for bss in &dump.bss {
            self.bss(bss.bssid, bss.ssid.clone())?;
        }
        Ok(self)
    }

    /// Hand over the accumulated inventory
    pub fn finish(self) -> RadioInventory {
        RadioInventory {
            radios: self.radios,
        }
    }
}

/// A radio described as the parts a driver would report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioDump {
    /// Radio unique identifier
    pub id: MacAddr,
    /// PHY name
    #[serde(default)]
    pub name: String,
    /// Configured transmit antenna mask
    #[serde(default)]
    pub tx_antennas: u32,
    /// Configured receive antenna mask
    #[serde(default)]
    pub rx_antennas: u32,
    /// Maximum associated stations in AP mode
    #[serde(default)]
    pub max_assoc_stations: u32,
    /// AP limit of each interface combination
    #[serde(default)]
    pub ap_interface_limits: Vec<u32>,
    /// Band parts, in report order
    #[serde(default)]
    pub bands: Vec<BandDump>,
    /// Operational BSSes
    #[serde(default)]
    pub bss: Vec<OperationalBss>,
}

/// One band part of a radio dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandDump {
    /// Band identifier
    pub id: u8,
    /// HT capability word
    #[serde(default)]
    pub ht_capa: Option<u16>,
    /// VHT capability word
    #[serde(default)]
    pub vht_capa: Option<u32>,
    /// Channels in this part
    #[serde(default)]
    pub channels: Vec<ChannelDump>,
}

/// One channel of a band part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDump {
    /// Center frequency in MHz
    pub freq: u32,
    /// Disabled by regulatory rules
    #[serde(default)]
    pub disabled: bool,
    /// Radar detection required
    #[serde(default)]
    pub radar: bool,
    /// Maximum transmit power
    #[serde(default)]
    pub max_tx_power: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radio_id(last: u8) -> MacAddr {
        MacAddr::new(0x02, 0, 0, 0, 1, last)
    }

    #[test]
    fn test_frequency_to_channel() {
        assert_eq!(frequency_to_channel(2412), 1);
        assert_eq!(frequency_to_channel(2472), 13);
        assert_eq!(frequency_to_channel(2484), 14);
        assert_eq!(frequency_to_channel(5180), 36);
        assert_eq!(frequency_to_channel(5825), 165);
        assert_eq!(frequency_to_channel(4920), 184);
        assert_eq!(frequency_to_channel(60480), 2);
        assert_eq!(frequency_to_channel(100), 0);
    }

    #[test]
    fn test_split_band_parts_merge() {
        let mut builder = InventoryBuilder::new();
        builder
            .begin_radio(radio_id(0), "phy0")
            .unwrap()
            .band(0)
            .unwrap()
            .ht_capabilities(0x0002)
            .unwrap()
            .channel(2412, false, false, Some(20))
            .unwrap()
            .band(0)
            .unwrap()
            .channel(2417, true, false, None)
            .unwrap()
            .band(1)
            .unwrap()
            .vht_capabilities(0b110_1000)
            .unwrap()
            .channel(5260, false, true, Some(23))
            .unwrap();
        let inventory = builder.finish();

        let radio = inventory.get(&radio_id(0)).unwrap();
        assert_eq!(radio.bands.len(), 2);
        let low = &radio.bands[0];
        assert!(low.ht40);
        assert_eq!(
            low.channels.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(low.channels[1].disabled);
        assert_eq!(low.channels[1].max_tx_power, 0);

        let high = &radio.bands[1];
        assert!(!high.ht40);
        assert_eq!(high.vht_channel_width, 2);
        assert_eq!(high.vht_short_gi, 3);
        assert_eq!(high.channels[0].id, 52);
        assert!(high.channels[0].radar);
    }

    #[test]
    fn test_max_bss_keeps_largest_limit() {
        let mut builder = InventoryBuilder::new();
        builder.begin_radio(radio_id(0), "phy0").unwrap();
        for limit in [2, 8, 4] {
            builder.ap_interface_limit(limit).unwrap();
        }
        assert_eq!(builder.finish().radios[0].max_bss, 8);
    }

    #[test]
    fn test_parts_out_of_sequence() {
        let mut builder = InventoryBuilder::new();
        assert_eq!(builder.band(0).unwrap_err(), RadioError::NoRadio);
        builder.begin_radio(radio_id(0), "phy0").unwrap();
        assert_eq!(
            builder.channel(2412, false, false, None).unwrap_err(),
            RadioError::NoBand(radio_id(0))
        );
        assert_eq!(
            builder.begin_radio(radio_id(0), "phy0").unwrap_err(),
            RadioError::Duplicate(radio_id(0))
        );
    }

    #[test]
    fn test_each_build_starts_empty() {
        let mut first = InventoryBuilder::new();
        first.begin_radio(radio_id(0), "phy0").unwrap();
        assert_eq!(first.finish().len(), 1);
        assert!(InventoryBuilder::new().finish().is_empty());
    }

    #[test]
    fn test_add_dump_from_yaml() {
        let yaml = r#"
id: "02:00:00:00:01:07"
name: phy1
max_assoc_stations: 64
ap_interface_limits: [1, 16]
bands:
  - id: 1
    ht_capa: 2
    channels:
      - { freq: 5180, max_tx_power: 23 }
  - id: 1
    channels:
      - { freq: 5200, radar: true }
bss:
  - bssid: "00:16:03:01:85:1e"
    ssid: "My 2nd WIFI network"
"#;
        let dump: RadioDump = serde_yaml::from_str(yaml).unwrap();
        let mut builder = InventoryBuilder::new();
        builder.add_dump(&dump).unwrap();
        let inventory = builder.finish();
        let radio = &inventory.radios[0];
        assert_eq!(radio.max_bss, 16);
        assert_eq!(radio.bands.len(), 1);
        assert_eq!(radio.bands[0].channels.len(), 2);
        assert_eq!(radio.bss[0].ssid.to_string(), "My 2nd WIFI network");
    }
}
