use anyhow::{Context, Result};
use log::info;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use rylr998::Rylr998;

mod bridge;
mod config;

use bridge::Bridge;
use config::EndpointConfig;

fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
    tokio_serial::new(path, baud_rate)
        .open_native_async()
        .with_context(|| format!("opening serial port {}", path))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let selector = std::env::args().nth(1).unwrap_or_else(|| "a".to_string());
    let endpoint = EndpointConfig::load(&selector)?;
    let serial = &endpoint.serial;
    info!(
        "side {}: host={} rx={} tx={} @ {} baud",
        endpoint.name, serial.host_port, serial.rx_port, serial.tx_port, serial.baud_rate
    );

    let host = open_port(&serial.host_port, serial.baud_rate)?;
    let rx_uart = open_port(&serial.rx_port, serial.baud_rate)?;
    let tx_uart = open_port(&serial.tx_port, serial.baud_rate)?;

    let mut bridge = Bridge::new(
        host,
        Rylr998::new(rx_uart, endpoint.rylr.clone()).with_name("rx"),
        Rylr998::new(tx_uart, endpoint.rylr.clone()).with_name("tx"),
        endpoint.radio.clone(),
        endpoint.routes.clone(),
        endpoint.stats_interval,
    )
    .with_host_write_timeout(serial.host_write_timeout);
    bridge.bring_up(&endpoint.rx_link(), &endpoint.tx_link()).await;

    info!(
        "FD up: side {} RX {} Hz addr {} / TX {} Hz addr {} -> peer {}; max_ascii={} raw_limit={}",
        endpoint.name,
        endpoint.rx_band_hz,
        endpoint.rx_address,
        endpoint.tx_band_hz,
        endpoint.tx_address,
        endpoint.routes.default_peer,
        endpoint.radio.max_ascii,
        endpoint.radio.raw_limit()
    );

    bridge.run(endpoint.tick).await
}
