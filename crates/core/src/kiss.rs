//! KISS byte stuffing for the host transport
//!
//! A frame on the wire is `FEND, port, <escaped payload>, FEND`. Only the data
//! port is accepted; everything else is dropped silently.

use std::collections::VecDeque;
use std::io;

use bytes::{BufMut, BytesMut};
use log::{debug, trace};
use tokio_util::codec::{Decoder, Encoder};

use crate::Frame;

pub const FEND: u8 = 0xC0;
pub const FESC: u8 = 0xDB;
pub const TFEND: u8 = 0xDC;
pub const TFESC: u8 = 0xDD;
pub const DATA_PORT: u8 = 0x00;

/// Unescaped bytes a single frame may hold before it is abandoned.
pub const DEFAULT_FRAME_LIMIT: usize = 1024;

/// Wrap `payload` into a KISS data frame.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(payload.len() + 4);
    encode_into(payload, &mut out);
    out.to_vec()
}

fn encode_into(payload: &[u8], out: &mut BytesMut) {
    out.reserve(payload.len() + 4);
    out.put_u8(FEND);
    out.put_u8(DATA_PORT);
    for &b in payload {
        match b {
            FEND => out.put_slice(&[FESC, TFEND]),
            FESC => out.put_slice(&[FESC, TFESC]),
            _ => out.put_u8(b),
        }
    }
    out.put_u8(FEND);
}

/// Incremental decoder; keeps partial frames between calls to [`feed`].
///
/// A frame that grows past its limit without a closing FEND is dropped, and
/// everything up to the next FEND is skipped.
///
/// [`feed`]: KissDecoder::feed
#[derive(Debug)]
pub struct KissDecoder {
    in_frame: bool,
    escape_pending: bool,
    port_consumed: bool,
    overflowed: bool,
    buf: Vec<u8>,
    limit: usize,
}

impl Default for KissDecoder {
    fn default() -> Self {
        Self::with_limit(DEFAULT_FRAME_LIMIT)
    }
}

impl KissDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            in_frame: false,
            escape_pending: false,
            port_consumed: false,
            overflowed: false,
            buf: Vec::new(),
            limit,
        }
    }

    /// True while bytes of an unfinished frame are buffered.
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Push bytes, returning every data frame completed by them.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &b in data {
            if !self.in_frame {
                if b == FEND {
                    self.reset();
                    self.in_frame = true;
                }
                continue;
            }

            if b == FEND {
                if let Some(frame) = self.finish() {
                    frames.push(frame);
                }
                self.reset();
                continue;
            }

            if self.overflowed {
                continue;
            }

            // the port byte is taken raw, escapes only apply to the payload
            if !self.port_consumed {
                self.buf.push(b);
                self.port_consumed = true;
                continue;
            }

            if self.escape_pending {
                self.buf.push(match b {
                    TFEND => FEND,
                    TFESC => FESC,
                    other => other,
                });
                self.escape_pending = false;
            } else if b == FESC {
                self.escape_pending = true;
            } else {
                self.buf.push(b);
            }

            if self.buf.len() > self.limit {
                debug!("kiss frame exceeds {} bytes, discarding until FEND", self.limit);
                self.overflowed = true;
                self.buf.clear();
            }
        }
        frames
    }

    fn finish(&mut self) -> Option<Frame> {
        if self.overflowed {
            return None;
        }
        match self.buf.split_first() {
            Some((&DATA_PORT, rest)) if !rest.is_empty() => Some(rest.to_vec()),
            Some((&port, rest)) => {
                trace!("discarding kiss frame port=0x{:02x} len={}", port, rest.len());
                None
            }
            None => None,
        }
    }

    fn reset(&mut self) {
        self.in_frame = false;
        self.escape_pending = false;
        self.port_consumed = false;
        self.overflowed = false;
        self.buf.clear();
    }
}

/// `tokio_util` codec for a KISS host stream.
///
/// Every byte handed to the decoder is consumed; completed frames are queued
/// and returned one per `decode` call.
#[derive(Debug, Default)]
pub struct KissCodec {
    decoder: KissDecoder,
    pending: VecDeque<Frame>,
    bytes_in: u64,
}

impl KissCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            decoder: KissDecoder::with_limit(limit),
            ..Self::default()
        }
    }

    /// Raw bytes consumed from the stream so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }
}

impl Decoder for KissCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if !src.is_empty() {
            let chunk = src.split();
            self.bytes_in += chunk.len() as u64;
            self.pending.extend(self.decoder.feed(&chunk));
        }
        Ok(self.pending.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        // an unterminated frame at EOF is dropped
        self.decode(src)
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for KissCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: T, dst: &mut BytesMut) -> Result<(), io::Error> {
        encode_into(frame.as_ref(), dst);
        Ok(())
    }
}
