//! Driver for the REYAX RYLR998 LoRa module over its UART AT interface.
//!
//! Commands are CR-LF terminated ASCII lines, framed with [`RylrLineCodec`].
//! Acknowledged commands block the caller until an `OK`/`+ERR=` line arrives
//! or the read timeout expires. `send_ascii` waits at most the write timeout
//! and `poll` never waits on the module.

use std::fmt;
use std::time::Duration;

use futures_util::{FutureExt, SinkExt, StreamExt};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_util::codec::Framed;

pub mod line;
pub mod rcv;

pub use line::RylrLineCodec;
pub use rcv::{parse_line, RcvLine, ReceivedEvent};

const IDLE_BACKOFF: Duration = Duration::from_millis(10);
const RESET_SETTLE: Duration = Duration::from_millis(600);

#[derive(Debug, Error)]
pub enum RylrError {
    #[error("uart io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("uart write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("AT failed: {command} (saw {} line(s): {})", .lines.len(), .lines.join(" | "))]
    CommandFailed { command: String, lines: Vec<String> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RylrConfig {
    pub read_timeout: Duration,
    /// Bound on every UART write, so a stalled module cannot hold the loop.
    pub write_timeout: Duration,
    pub line_limit: usize,
}

impl Default for RylrConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1200),
            write_timeout: Duration::from_millis(250),
            line_limit: line::DEFAULT_LINE_LIMIT,
        }
    }
}

/// Module settings applied once at bring-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkParams {
    pub network_id: u8,
    pub band_hz: u32,
    pub power_dbm: u8,
    pub address: u16,
    pub spreading_factor: u8,
    pub bandwidth: u16,
    pub coding_rate: u8,
    pub preamble: u8,
}

impl LinkParams {
    /// The bring-up sequence, in order.
    pub fn commands(&self) -> Vec<String> {
        vec![
            format!("AT+NETWORKID={}", self.network_id),
            format!("AT+BAND={}", self.band_hz),
            format!("AT+CRFOP={}", self.power_dbm),
            format!("AT+ADDRESS={}", self.address),
            format!(
                "AT+PARAMETER={},{},{},{}",
                self.spreading_factor, self.bandwidth, self.coding_rate, self.preamble
            ),
        ]
    }
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            network_id: 18,
            band_hz: 915_000_000,
            power_dbm: 10,
            address: 0,
            spreading_factor: 10,
            bandwidth: 125,
            coding_rate: 4,
            preamble: 16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Configuring,
    Ready,
}

#[derive(Debug)]
pub enum StepOutcome {
    Acked,
    /// The module answered `+ERR=<code>`.
    Rejected(String),
    Failed(RylrError),
}

#[derive(Debug)]
pub struct ConfigStep {
    pub command: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Default)]
pub struct ConfigReport {
    pub steps: Vec<ConfigStep>,
}

impl ConfigReport {
    pub fn acked(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Acked))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.acked() == self.steps.len()
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} commands acked", self.acked(), self.steps.len())
    }
}

fn is_ack(line: &str) -> bool {
    line.contains("OK") || line.starts_with("+ERR=")
}

pub struct Rylr998<U> {
    uart: Framed<U, RylrLineCodec>,
    config: RylrConfig,
    state: LinkState,
    /// Notifications that arrived while waiting on an acknowledgement.
    deferred: Vec<ReceivedEvent>,
    malformed: u64,
    name: String,
}

impl<U> Rylr998<U>
where
    U: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(uart: U, config: RylrConfig) -> Self {
        Self {
            uart: Framed::new(uart, RylrLineCodec::new(config.line_limit)),
            config,
            state: LinkState::Idle,
            deferred: Vec::new(),
            malformed: 0,
            name: "rylr998".to_string(),
        }
    }

    /// Label used in log lines, e.g. `rx` or `tx`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `+RCV=` lines that could not be parsed so far.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed
    }

    pub fn into_inner(self) -> U {
        self.uart.into_inner()
    }

    /// Write one command. With `expect_ack`, collect lines until an `OK` or
    /// `+ERR=` line or until `timeout` (default: the configured read timeout).
    pub async fn command(
        &mut self,
        cmd: &str,
        expect_ack: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, RylrError> {
        let cmd = cmd.trim_end_matches("\r\n");
        trace!("[{}] >> {}", self.name, cmd);
        self.write_line(cmd).await?;
        if !expect_ack {
            return Ok(Vec::new());
        }

        let deadline = Instant::now() + timeout.unwrap_or(self.config.read_timeout);
        let lines = self.read_until_ack(deadline).await?;
        if !lines.iter().any(|l| is_ack(l)) {
            return Err(RylrError::CommandFailed {
                command: cmd.to_string(),
                lines,
            });
        }
        Ok(lines)
    }

    /// Apply `params`. Individual failures are logged and recorded, never
    /// returned; the link is `Ready` afterwards either way.
    pub async fn configure(&mut self, params: &LinkParams) -> ConfigReport {
        self.state = LinkState::Configuring;
        let mut report = ConfigReport::default();

        for command in params.commands() {
            let outcome = match self.command(&command, true, None).await {
                Ok(lines) => match lines.iter().find(|l| l.starts_with("+ERR=")) {
                    Some(err) => {
                        warn!("[{}] {} rejected: {}", self.name, command, err);
                        StepOutcome::Rejected(err.trim_start_matches("+ERR=").to_string())
                    }
                    None => StepOutcome::Acked,
                },
                Err(e) => {
                    warn!("[{}] {}", self.name, e);
                    StepOutcome::Failed(e)
                }
            };
            report.steps.push(ConfigStep { command, outcome });
        }

        self.state = LinkState::Ready;
        debug!("[{}] configured: {}", self.name, report);
        report
    }

    pub async fn wake(&mut self) -> Result<(), RylrError> {
        self.command("AT", true, None).await.map(drop)
    }

    /// Software reset. The module answers `+RESET` and `+READY` without `OK`.
    pub async fn reset(&mut self) -> Result<(), RylrError> {
        self.command("AT+RESET", false, None).await?;
        sleep(RESET_SETTLE).await;
        self.state = LinkState::Idle;
        Ok(())
    }

    pub async fn set_address(&mut self, addr: u16) -> Result<(), RylrError> {
        self.command(&format!("AT+ADDRESS={}", addr), true, None).await.map(drop)
    }

    pub async fn set_network(&mut self, network_id: u8) -> Result<(), RylrError> {
        self.command(&format!("AT+NETWORKID={}", network_id), true, None).await.map(drop)
    }

    pub async fn set_band(&mut self, hz: u32) -> Result<(), RylrError> {
        self.command(&format!("AT+BAND={}", hz), true, None).await.map(drop)
    }

    pub async fn set_power(&mut self, dbm: u8) -> Result<(), RylrError> {
        self.command(&format!("AT+CRFOP={}", dbm), true, None).await.map(drop)
    }

    pub async fn set_key(&mut self, key_hex: &str) -> Result<(), RylrError> {
        self.command(&format!("AT+CPIN={}", key_hex), true, None).await.map(drop)
    }

    pub async fn set_params(
        &mut self,
        sf: u8,
        bw: u16,
        cr: u8,
        preamble: u8,
    ) -> Result<(), RylrError> {
        let cmd = format!("AT+PARAMETER={},{},{},{}", sf, bw, cr, preamble);
        self.command(&cmd, true, None).await.map(drop)
    }

    /// Hand `payload` to the module for transmission to `to`. Delivery is
    /// not confirmed.
    pub async fn send_ascii(&mut self, to: u16, payload: &str) -> Result<(), RylrError> {
        let cmd = format!("AT+SEND={},{},{}", to, payload.len(), payload);
        trace!("[{}] >> {}", self.name, cmd);
        self.write_line(&cmd).await
    }

    /// Non-blocking: parse whatever complete lines the UART already holds.
    pub fn poll(&mut self) -> Result<Vec<ReceivedEvent>, RylrError> {
        let mut events = std::mem::take(&mut self.deferred);
        loop {
            let line = match self.uart.next().now_or_never() {
                None | Some(None) => break,
                Some(Some(Ok(line))) => line,
                Some(Some(Err(e))) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Some(Some(Err(e))) => return Err(e.into()),
            };
            match parse_line(&line) {
                RcvLine::Received(event) => events.push(event),
                RcvLine::Malformed(line) => {
                    self.malformed += 1;
                    debug!("[{}] skipping malformed notification: {}", self.name, line);
                }
                RcvLine::Other(line) => trace!("[{}] << {}", self.name, line),
            }
        }
        Ok(events)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), RylrError> {
        match timeout(self.config.write_timeout, self.uart.send(line)).await {
            Ok(sent) => Ok(sent?),
            Err(_) => Err(RylrError::WriteTimeout(self.config.write_timeout)),
        }
    }

    async fn read_until_ack(&mut self, deadline: Instant) -> Result<Vec<String>, RylrError> {
        let mut seen = Vec::new();
        loop {
            let line = match timeout_at(deadline, self.uart.next()).await {
                Ok(Some(Ok(line))) => line,
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(None) => {
                    if Instant::now() + IDLE_BACKOFF >= deadline {
                        return Ok(seen);
                    }
                    sleep(IDLE_BACKOFF).await;
                    continue;
                }
                Err(_) => return Ok(seen),
            };

            trace!("[{}] << {}", self.name, line);
            if let RcvLine::Received(event) = parse_line(&line) {
                self.deferred.push(event);
                continue;
            }
            let done = is_ack(&line);
            seen.push(line);
            if done {
                return Ok(seen);
            }
        }
    }
}
