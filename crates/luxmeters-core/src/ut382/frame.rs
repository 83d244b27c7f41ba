//! UT382 raw frames
//!
//! A frame is 33 bytes. Bytes 0..30 each carry one data nibble in the low
//! half with `0x3` in the high half, low nibble first. Bytes 30 and 31 are
//! CR LF; byte 32 is not checked.

use std::fmt;

use super::lcd::PAYLOAD_LEN;

/// Bytes per raw frame
pub const FRAME_LEN: usize = 33;

const NIBBLE_BYTES: usize = PAYLOAD_LEN * 2;
const NIBBLE_PREFIX: u8 = 0x30;

/// Something wrong with a raw frame. Decoding continues regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// Frame is not 33 bytes long
    Length(usize),
    /// High nibble of a data byte is not `0x3`
    Prefix { index: usize, byte: u8 },
    /// Byte 30 or 31 is not the expected terminator
    Terminator { index: usize, byte: u8 },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::Length(len) => write!(f, "frame has {} bytes, expected {}", len, FRAME_LEN),
            Anomaly::Prefix { index, byte } => {
                write!(f, "byte {} is {:#04x}, high nibble should be 0x3", index, byte)
            }
            Anomaly::Terminator { index, byte } => {
                write!(f, "byte {} is {:#04x}, expected CR LF", index, byte)
            }
        }
    }
}

/// Extract the 15 payload bytes and every anomaly found along the way.
///
/// A frame is malformed iff the anomaly list is non-empty. Missing bytes of a
/// short frame decode as zero.
pub fn decode_raw(bs: &[u8]) -> ([u8; PAYLOAD_LEN], Vec<Anomaly>) {
    let mut anomalies = Vec::new();
    if bs.len() != FRAME_LEN {
        anomalies.push(Anomaly::Length(bs.len()));
    }

    for (index, byte) in bs.iter().take(NIBBLE_BYTES).enumerate() {
        if byte & 0xF0 != NIBBLE_PREFIX {
            anomalies.push(Anomaly::Prefix { index, byte: *byte });
        }
    }

    for (index, expected) in [(30, b'\r'), (31, b'\n')] {
        if let Some(byte) = bs.get(index) {
            if *byte != expected {
                anomalies.push(Anomaly::Terminator { index, byte: *byte });
            }
        }
    }

    let nibble = |i: usize| bs.get(i).map_or(0, |b| b & 0x0F);
    let mut payload = [0u8; PAYLOAD_LEN];
    for (k, out) in payload.iter_mut().enumerate() {
        *out = nibble(2 * k) | (nibble(2 * k + 1) << 4);
    }

    (payload, anomalies)
}

/// Inverse of [`decode_raw`]: a well-formed frame carrying `payload`
pub fn encode_frame(payload: &[u8; PAYLOAD_LEN]) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    for (k, byte) in payload.iter().enumerate() {
        frame[2 * k] = NIBBLE_PREFIX | (byte & 0x0F);
        frame[2 * k + 1] = NIBBLE_PREFIX | (byte >> 4);
    }
    frame[30] = b'\r';
    frame[31] = b'\n';
    // Trailing byte is sent by the meter but never checked
    frame[32] = 0x00;
    frame
}
