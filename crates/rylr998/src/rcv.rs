//! `+RCV=` notification parsing
//!
//! Firmware revisions disagree on where RSSI and SNR go, so both
//! `from,len,rssi,snr,data` and `from,len,data,rssi,snr` are accepted.

use serde::{Deserialize, Serialize};

pub const RCV_PREFIX: &str = "+RCV=";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedEvent {
    pub from: u16,
    pub len: usize,
    pub rssi: i32,
    pub snr: i32,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcvLine {
    Received(ReceivedEvent),
    /// Anything that is not a receive notification.
    Other(String),
    Malformed(String),
}

pub fn parse_line(line: &str) -> RcvLine {
    match line.strip_prefix(RCV_PREFIX) {
        None => RcvLine::Other(line.to_string()),
        Some(body) => match parse_body(body) {
            Some(event) => RcvLine::Received(event),
            None => RcvLine::Malformed(line.to_string()),
        },
    }
}

fn parse_body(body: &str) -> Option<ReceivedEvent> {
    let mut head = body.splitn(3, ',');
    let from = head.next()?.trim().parse().ok()?;
    let len = head.next()?.trim().parse().ok()?;
    let rest = head.next()?;

    let (rssi, snr, data) = if looks_signed(rest.split(',').next()?) {
        let mut fields = rest.splitn(3, ',');
        let rssi = fields.next()?.trim().parse().ok()?;
        let snr = fields.next()?.trim().parse().ok()?;
        (rssi, snr, fields.next()?)
    } else {
        let mut fields = rest.rsplitn(3, ',');
        let snr = fields.next()?.trim().parse().ok()?;
        let rssi = fields.next()?.trim().parse().ok()?;
        (rssi, snr, fields.next()?)
    };

    Some(ReceivedEvent {
        from,
        len,
        rssi,
        snr,
        data: data.to_string(),
    })
}

fn looks_signed(field: &str) -> bool {
    field.starts_with('-') || (!field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(from: u16, len: usize, rssi: i32, snr: i32, data: &str) -> RcvLine {
        RcvLine::Received(ReceivedEvent {
            from,
            len,
            rssi,
            snr,
            data: data.to_string(),
        })
    }

    #[test]
    fn test_payload_first() {
        assert_eq!(
            parse_line("+RCV=1,6,B:Zm9v,-42,11"),
            event(1, 6, -42, 11, "B:Zm9v")
        );
    }

    #[test]
    fn test_signal_first() {
        assert_eq!(
            parse_line("+RCV=2,6,-87,-3,B:Zm9v"),
            event(2, 6, -87, -3, "B:Zm9v")
        );
    }

    #[test]
    fn test_signal_fields_tolerate_spaces() {
        assert_eq!(
            parse_line("+RCV=2,6,-87 , -3,B:Zm9v"),
            event(2, 6, -87, -3, "B:Zm9v")
        );
    }

    #[test]
    fn test_payload_with_commas() {
        assert_eq!(
            parse_line("+RCV=5,7,a,b,c,d,-50,8"),
            event(5, 7, -50, 8, "a,b,c,d")
        );
    }

    #[test]
    fn test_other_lines() {
        assert_eq!(parse_line("+OK"), RcvLine::Other("+OK".to_string()));
        assert_eq!(parse_line("+READY"), RcvLine::Other("+READY".to_string()));
    }

    #[test]
    fn test_malformed_lines() {
        for line in ["+RCV=", "+RCV=x,6,B:AA,-1,2", "+RCV=1,6", "+RCV=1,6,B:AA", "+RCV=1,6,-40"] {
            assert_eq!(parse_line(line), RcvLine::Malformed(line.to_string()), "{line}");
        }
    }
}
