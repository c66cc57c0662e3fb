//! Radio wire payload: a short ASCII prefix followed by base64 of the frame.

use splitlink_core::{text, Frame};

use crate::RadioError;

pub fn encode(prefix: &str, frame: &[u8]) -> String {
    let mut out = String::with_capacity(prefix.len() + text::encoded_len(frame.len()));
    out.push_str(prefix);
    out.push_str(&text::encode(frame));
    out
}

/// Recover the frame carried by `payload`. Text without `prefix` is not ours.
pub fn decode(prefix: &str, payload: &str) -> Result<Frame, RadioError> {
    let body = payload
        .strip_prefix(prefix)
        .ok_or_else(|| RadioError::MalformedWireText(payload.to_string()))?;
    Ok(text::decode(body))
}
