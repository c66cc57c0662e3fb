//! The full-duplex bridge: host KISS stream in, paced `AT+SEND` out on the
//! TX radio, `+RCV` notifications from the RX radio back to the host.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use futures_util::{FutureExt, SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;

use rylr998::{ConfigReport, LinkParams, ReceivedEvent, Rylr998};
use splitlink_core::{packet, KissCodec, RoutingTable};
use splitlink_radio::{
    wire, BridgeStats, LogSink, RadioConfig, RadioScheduler, Telemetry, TelemetrySink,
};

pub const DEFAULT_HOST_WRITE_TIMEOUT: Duration = Duration::from_millis(250);
const HEX_HEAD: usize = 20;

pub struct Bridge<H, R, T> {
    host: Framed<H, KissCodec>,
    host_write_timeout: Duration,
    rx: Rylr998<R>,
    tx: Rylr998<T>,
    scheduler: RadioScheduler,
    stats: BridgeStats,
    last_send: Option<Instant>,
    started: Instant,
    last_report: Instant,
    report_interval: Duration,
    sink: Box<dyn TelemetrySink>,
}

impl<H, R, T> Bridge<H, R, T>
where
    H: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        host: H,
        rx: Rylr998<R>,
        tx: Rylr998<T>,
        radio: RadioConfig,
        routes: RoutingTable,
        report_interval: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            host: Framed::new(host, KissCodec::new()),
            host_write_timeout: DEFAULT_HOST_WRITE_TIMEOUT,
            rx,
            tx,
            scheduler: RadioScheduler::new(radio, routes),
            stats: BridgeStats::default(),
            last_send: None,
            started: now,
            last_report: now,
            report_interval,
            sink: Box::new(LogSink),
        }
    }

    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Longest a frame for the host may wait on a slow reader before it is
    /// dropped.
    pub fn with_host_write_timeout(mut self, limit: Duration) -> Self {
        self.host_write_timeout = limit;
        self
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn scheduler(&self) -> &RadioScheduler {
        &self.scheduler
    }

    /// Configure both radios. Rejected or unanswered commands are logged and
    /// the bridge comes up regardless.
    pub async fn bring_up(
        &mut self,
        rx_params: &LinkParams,
        tx_params: &LinkParams,
    ) -> (ConfigReport, ConfigReport) {
        let rx_report = self.rx.configure(rx_params).await;
        let tx_report = self.tx.configure(tx_params).await;
        for (name, report) in [("RX", &rx_report), ("TX", &tx_report)] {
            if report.is_clean() {
                info!("{} configured: {}", name, report);
            } else {
                warn!("{} configured with errors: {}", name, report);
            }
        }
        (rx_report, tx_report)
    }

    /// One pass of the bridge. Only a failed or closed host transport is an
    /// error; radio trouble is counted and logged.
    pub async fn tick(&mut self) -> Result<()> {
        self.pump_host()?;
        self.pump_tx().await;
        self.pump_rx().await?;
        self.maybe_report();
        Ok(())
    }

    pub async fn run(&mut self, tick: Duration) -> Result<()> {
        loop {
            self.tick().await?;
            tokio::time::sleep(tick).await;
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        let mut bridge = self.stats.clone();
        bridge.malformed_lines = self.rx.malformed_lines() + self.tx.malformed_lines();
        Telemetry {
            uptime: self.started.elapsed(),
            bridge,
            scheduler: self.scheduler.stats().clone(),
            depths: self.scheduler.depths(),
        }
    }

    /// Decode and enqueue everything the host has already sent.
    fn pump_host(&mut self) -> Result<()> {
        loop {
            let frame = match self.host.next().now_or_never() {
                None => break,
                Some(None) => bail!("host transport closed"),
                Some(Some(Ok(frame))) => frame,
                Some(Some(Err(e))) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Some(Some(Err(e))) => return Err(e.into()),
            };
            // drops are logged and counted by the scheduler
            let _ = self.scheduler.enqueue(&frame);
        }
        self.stats.host_bytes_in = self.host.codec().bytes_in();
        Ok(())
    }

    async fn pump_tx(&mut self) {
        let now = Instant::now();
        let min_interval = self.scheduler.config().min_tx_interval;
        let Some(entry) = self.scheduler.drain_one(now, min_interval, self.last_send) else {
            return;
        };

        match self.tx.send_ascii(u16::from(entry.dest), &entry.wire).await {
            Ok(()) => {
                self.last_send = Some(now);
                self.stats.tx_frames += 1;
                self.stats.tx_bytes += entry.original_len as u64;
                debug!(
                    "TX {} -> {} len={} ascii={}",
                    entry.class,
                    entry.dest,
                    entry.original_len,
                    entry.wire.len()
                );
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("TX send to {} failed: {}", entry.dest, e);
            }
        }
    }

    async fn pump_rx(&mut self) -> Result<()> {
        let events = match self.rx.poll() {
            Ok(events) => events,
            Err(e) => {
                warn!("RX poll failed: {}", e);
                return Ok(());
            }
        };

        for event in events {
            self.deliver(event).await?;
        }
        Ok(())
    }

    async fn deliver(&mut self, event: ReceivedEvent) -> Result<()> {
        let prefix = &self.scheduler.config().wire_prefix;
        let frame = match wire::decode(prefix, &event.data) {
            Ok(frame) => frame,
            Err(_) => {
                self.stats.rx_text_lines += 1;
                info!("RX TEXT from {}: {}", event.from, event.data);
                return Ok(());
            }
        };
        if frame.is_empty() {
            return Ok(());
        }

        let head = &frame[..frame.len().min(HEX_HEAD)];
        info!(
            "RX {} bytes from {} rssi={} snr={} {} head={}",
            frame.len(),
            event.from,
            event.rssi,
            event.snr,
            packet::peek_ip(&frame),
            hex::encode(head)
        );

        match timeout(self.host_write_timeout, self.host.send(frame.as_slice())).await {
            Ok(sent) => sent?,
            Err(_) => {
                self.stats.host_write_timeouts += 1;
                warn!("host not reading, dropped {} byte frame", frame.len());
                return Ok(());
            }
        }
        self.stats.rx_frames += 1;
        self.stats.rx_bytes += frame.len() as u64;
        self.stats.host_frames_out += 1;
        Ok(())
    }

    fn maybe_report(&mut self) {
        if self.last_report.elapsed() < self.report_interval {
            return;
        }
        self.last_report = Instant::now();
        let telemetry = self.telemetry();
        self.sink.emit(&telemetry);
    }
}
