use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use rylr998::{LinkParams, RylrConfig};
use splitlink_core::RoutingTable;
use splitlink_radio::RadioConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub host_port: String,
    pub rx_port: String,
    pub tx_port: String,
    pub baud_rate: u32,
    /// How long a frame for the host may wait on a reader that has stalled.
    pub host_write_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            host_port: "/dev/ttyACM1".to_string(),
            rx_port: "/dev/ttyAMA0".to_string(),
            tx_port: "/dev/ttyAMA1".to_string(),
            baud_rate: 115_200,
            host_write_timeout: crate::bridge::DEFAULT_HOST_WRITE_TIMEOUT,
        }
    }
}

/// Modulation shared by both radios of an endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhyConfig {
    pub network_id: u8,
    pub power_dbm: u8,
    pub spreading_factor: u8,
    pub bandwidth: u16,
    pub coding_rate: u8,
    pub preamble: u8,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            network_id: 18,
            power_dbm: 10,
            spreading_factor: 10,
            bandwidth: 125,
            coding_rate: 4,
            preamble: 16,
        }
    }
}

/// One side of a split-frequency link. Both sides run the same code with a
/// different instance of this.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub rx_address: u16,
    pub tx_address: u16,
    pub rx_band_hz: u32,
    pub tx_band_hz: u32,
    pub routes: RoutingTable,
    #[serde(default)]
    pub phy: PhyConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub rylr: RylrConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    pub stats_interval: Duration,
    pub tick: Duration,
}

impl EndpointConfig {
    pub fn rx_link(&self) -> LinkParams {
        self.link(self.rx_address, self.rx_band_hz)
    }

    pub fn tx_link(&self) -> LinkParams {
        self.link(self.tx_address, self.tx_band_hz)
    }

    fn link(&self, address: u16, band_hz: u32) -> LinkParams {
        LinkParams {
            network_id: self.phy.network_id,
            band_hz,
            power_dbm: self.phy.power_dbm,
            address,
            spreading_factor: self.phy.spreading_factor,
            bandwidth: self.phy.bandwidth,
            coding_rate: self.phy.coding_rate,
            preamble: self.phy.preamble,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// `a`/`b` select a preset, anything else is read as a JSON file.
    pub fn load(selector: &str) -> Result<Self> {
        match selector.to_ascii_lowercase().as_str() {
            "a" => Ok(EndpointPresets::side_a()),
            "b" => Ok(EndpointPresets::side_b()),
            _ => Self::from_json_file(Path::new(selector)),
        }
    }
}

pub struct EndpointPresets;

impl EndpointPresets {
    /// Side A: listens on 915 MHz as 3, transmits on 916 MHz as 2 towards B-RX (1).
    pub fn side_a() -> EndpointConfig {
        EndpointConfig {
            name: "A".to_string(),
            rx_address: 3,
            tx_address: 2,
            rx_band_hz: 915_000_000,
            tx_band_hz: 916_000_000,
            routes: lab_routes(1, [1, 2, 3, 4]),
            phy: PhyConfig::default(),
            radio: RadioConfig::default(),
            rylr: RylrConfig::default(),
            serial: SerialConfig::default(),
            stats_interval: Duration::from_secs(5),
            tick: Duration::from_millis(1),
        }
    }

    /// Side B: listens on 916 MHz as 1, transmits on 915 MHz as 4 towards A-RX (3).
    pub fn side_b() -> EndpointConfig {
        EndpointConfig {
            name: "B".to_string(),
            rx_address: 1,
            tx_address: 4,
            rx_band_hz: 916_000_000,
            tx_band_hz: 915_000_000,
            routes: lab_routes(3, [1, 3, 3, 4]),
            ..EndpointPresets::side_a()
        }
    }
}

/// Routes for the 10.10.10.1-4 test subnet.
fn lab_routes(default_peer: u8, addrs: [u8; 4]) -> RoutingTable {
    addrs
        .iter()
        .enumerate()
        .fold(RoutingTable::new(default_peer), |table, (i, &addr)| {
            let ip = IpAddr::V4(Ipv4Addr::new(10, 10, 10, i as u8 + 1));
            table.with_route(ip, addr)
        })
}
