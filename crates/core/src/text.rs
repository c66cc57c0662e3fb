//! Base64 wire text for the radio command channel
//!
//! Decoding is deliberately forgiving: whitespace and control characters are
//! stripped, unknown symbols count as zero and a short trailing group is
//! padded. A noisy line yields garbage bytes, never an error.

use base64::{engine::general_purpose::STANDARD, Engine};

const PAD: u8 = b'=';

/// Largest raw payload whose encoding, plus `prefix_len`, fits in `max_ascii`.
pub const fn raw_limit(max_ascii: usize, prefix_len: usize) -> usize {
    max_ascii.saturating_sub(prefix_len) * 3 / 4
}

/// Length of the padded base64 text for `raw_len` input bytes.
pub fn encoded_len(raw_len: usize) -> usize {
    base64::encoded_len(raw_len, true).unwrap_or(usize::MAX)
}

pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode(text: &str) -> Vec<u8> {
    // one symbol per character; anything outside ASCII becomes an unknown symbol
    let cleaned: Vec<u8> = text
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .map(|c| if c.is_ascii() { c as u8 } else { b'*' })
        .collect();

    STANDARD
        .decode(&cleaned)
        .unwrap_or_else(|_| decode_lenient(&cleaned))
}

/// Fallback for text the strict engine rejects: unknown symbols count as
/// zero and a short trailing group is padded with `A`.
fn decode_lenient(cleaned: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(cleaned.len() / 4 * 3 + 3);
    for group in cleaned.chunks(4) {
        let mut c = [b'A'; 4];
        c[..group.len()].copy_from_slice(group);

        let pad = if c[2] == PAD {
            c[2] = b'A';
            c[3] = b'A';
            2
        } else if c[3] == PAD {
            c[3] = b'A';
            1
        } else {
            0
        };

        let n = (index(c[0]) << 18) | (index(c[1]) << 12) | (index(c[2]) << 6) | index(c[3]);
        out.push((n >> 16) as u8);
        if pad < 2 {
            out.push((n >> 8) as u8);
        }
        if pad < 1 {
            out.push(n as u8);
        }
    }
    out
}

fn index(c: u8) -> u32 {
    match c {
        b'A'..=b'Z' => (c - b'A') as u32,
        b'a'..=b'z' => (c - b'a') as u32 + 26,
        b'0'..=b'9' => (c - b'0') as u32 + 52,
        b'+' => 62,
        b'/' => 63,
        _ => 0,
    }
}
