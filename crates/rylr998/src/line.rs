use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub const DEFAULT_LINE_LIMIT: usize = 4096;

/// CR-LF line codec for the module UART.
///
/// Like `LinesCodec`, but a bare `\n` is not a terminator and an overlong
/// unterminated run loses its oldest bytes instead of failing the stream, so
/// a noisy link cannot grow the buffer without bound.
#[derive(Debug, Clone)]
pub struct RylrLineCodec {
    limit: usize,
}

impl RylrLineCodec {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for RylrLineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_LIMIT)
    }
}

impl Decoder for RylrLineCodec {
    type Item = String;
    type Error = io::Error;

    /// Next non-empty line without its terminator. Invalid UTF-8 is dropped.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let Some(end) = src.windows(2).position(|w| w == b"\r\n") else {
                if src.len() > self.limit {
                    let excess = src.len() - self.limit;
                    src.advance(excess);
                }
                return Ok(None);
            };
            let raw = src.split_to(end + 2);
            if end == 0 {
                continue;
            }
            return Ok(Some(
                String::from_utf8_lossy(&raw[..end]).replace('\u{FFFD}', ""),
            ));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        // a partial line stays buffered in case the stream resumes
        self.decode(src)
    }
}

impl<T: AsRef<str>> Encoder<T> for RylrLineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<(), io::Error> {
        let line = line.as_ref();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(codec: &mut RylrLineCodec, src: &mut BytesMut) -> Vec<String> {
        std::iter::from_fn(|| codec.decode(src).unwrap()).collect()
    }

    #[test]
    fn test_lines_split_on_crlf() {
        let mut codec = RylrLineCodec::default();
        let mut src = BytesMut::from(&b"+OK\r\n+RCV=1,2,"[..]);
        assert_eq!(drain(&mut codec, &mut src), vec!["+OK".to_string()]);
        src.extend_from_slice(b"hi,-40,9\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap().as_deref(),
            Some("+RCV=1,2,hi,-40,9")
        );
        assert!(src.is_empty());
    }

    #[test]
    fn test_empty_lines_skipped() {
        let mut codec = RylrLineCodec::default();
        let mut src = BytesMut::from(&b"\r\n\r\n+READY\r\n"[..]);
        assert_eq!(drain(&mut codec, &mut src), vec!["+READY".to_string()]);
    }

    #[test]
    fn test_bare_lf_is_not_a_terminator() {
        let mut codec = RylrLineCodec::default();
        let mut src = BytesMut::from(&b"abc\ndef"[..]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(src.len(), 7);
    }

    #[test]
    fn test_overflow_trims_oldest() {
        let mut codec = RylrLineCodec::new(8);
        let mut src = BytesMut::from(&b"0123456789"[..]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(src.len(), 8);
        src.extend_from_slice(b"\r\n");
        assert_eq!(codec.decode(&mut src).unwrap().as_deref(), Some("23456789"));
    }

    #[test]
    fn test_invalid_utf8_dropped() {
        let mut codec = RylrLineCodec::default();
        let mut src = BytesMut::from(&b"B:Zm\xff9v\r\n"[..]);
        assert_eq!(codec.decode(&mut src).unwrap().as_deref(), Some("B:Zm9v"));
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = RylrLineCodec::default();
        let mut dst = BytesMut::new();
        codec.encode("AT+ADDRESS=3", &mut dst).unwrap();
        assert_eq!(&dst[..], b"AT+ADDRESS=3\r\n");
    }
}
