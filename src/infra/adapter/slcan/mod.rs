//! ASCII hex framing spoken by CANUSB / SLCAN adapters.
//!
//! Frames look like `T09F80123` + length digit + data hex pairs + `\r`. Tags
//! `t`/`T` carry data, `r`/`R` are remote requests without data. Everything
//! outside a tagged run (acknowledgements, bell bytes, noise) is discarded.
use chrono::Utc;

use super::WireProtocol;
use crate::core::MAX_FRAME_DATA;
use crate::error::FramingError;
use crate::protocol::transport::can_frame::RawFrame;
use crate::protocol::transport::can_id::CanId;

const TERMINATOR: u8 = b'\r';
/// Hex characters of the identifier.
const ID_CHARS: usize = 8;
/// Tag, identifier, length digit and eight data bytes.
const MAX_RUN: usize = 1 + ID_CHARS + 1 + MAX_FRAME_DATA * 2;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

#[derive(Debug)]
pub struct SlcanProtocol {
    bitrate: u8,
    run: Vec<u8>,
    in_frame: bool,
}

impl SlcanProtocol {
    /// `bitrate` is the adapter's `S<n>` code (5 = 250 kbit/s).
    pub fn new(bitrate: u8) -> Self {
        Self {
            bitrate,
            run: Vec::with_capacity(MAX_RUN),
            in_frame: false,
        }
    }
}

fn is_tag(byte: u8) -> bool {
    matches!(byte, b't' | b'T' | b'r' | b'R')
}

fn hex_value(byte: u8) -> Result<u8, FramingError> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(FramingError::InvalidHex { byte }),
    }
}

fn hex_pair(high: u8, low: u8) -> Result<u8, FramingError> {
    Ok(hex_value(high)? << 4 | hex_value(low)?)
}

fn push_hex(out: &mut Vec<u8>, byte: u8) {
    out.push(HEX_DIGITS[(byte >> 4) as usize]);
    out.push(HEX_DIGITS[(byte & 0x0F) as usize]);
}

/// Parse a complete run (tag included, terminator excluded).
fn parse_run(run: &[u8]) -> Result<RawFrame, FramingError> {
    let remote = matches!(run.first(), Some(b'r' | b'R'));
    let body = &run[1..];

    if body.len() < ID_CHARS + 1 {
        return Err(FramingError::Truncated {
            expected: ID_CHARS + 1,
            actual: body.len(),
        });
    }

    let mut id = [0u8; 4];
    for (i, pair) in body[..ID_CHARS].chunks_exact(2).enumerate() {
        id[i] = hex_pair(pair[0], pair[1])?;
    }

    let len = hex_value(body[ID_CHARS])? as usize;
    if len > MAX_FRAME_DATA {
        return Err(FramingError::InvalidLength { len });
    }

    let data_chars = if remote { 0 } else { len * 2 };
    let expected = ID_CHARS + 1 + data_chars;
    if body.len() != expected {
        return Err(FramingError::Truncated {
            expected,
            actual: body.len(),
        });
    }

    let data = body[ID_CHARS + 1..]
        .chunks_exact(2)
        .map(|pair| hex_pair(pair[0], pair[1]))
        .collect::<Result<Vec<u8>, _>>()?;

    Ok(RawFrame::from_can_id(
        CanId::from_be_bytes(id),
        data,
        Utc::now(),
    ))
}

impl WireProtocol for SlcanProtocol {
    const NAME: &'static str = "slcan";

    fn open_sequence(&self) -> Vec<u8> {
        format!("S{}\rO\r", self.bitrate).into_bytes()
    }

    fn close_sequence(&self) -> Vec<u8> {
        b"C\r".to_vec()
    }

    fn push_byte(&mut self, byte: u8) -> Option<Result<RawFrame, FramingError>> {
        if is_tag(byte) {
            // A new tag restarts the run, even mid-frame.
            self.run.clear();
            self.run.push(byte);
            self.in_frame = true;
            return None;
        }
        if !self.in_frame {
            return None;
        }

        if byte == TERMINATOR {
            self.in_frame = false;
            return Some(parse_run(&self.run));
        }

        if self.run.len() >= MAX_RUN {
            self.in_frame = false;
            return Some(Err(FramingError::Overflow {
                len: self.run.len() + 1,
            }));
        }
        self.run.push(byte);
        None
    }

    /// Source is always sent as 0: the adapter owns the bus address.
    fn encode(&self, frame: &RawFrame, out: &mut Vec<u8>) {
        let id = frame.can_id();
        let [id0, pf, ps, _] = id.0.to_be_bytes();

        out.push(b'T');
        push_hex(out, id0);
        push_hex(out, pf);
        push_hex(out, ps);
        push_hex(out, 0x00);
        out.push(HEX_DIGITS[frame.data.len() & 0x0F]);
        for &byte in &frame.data {
            push_hex(out, byte);
        }
        out.push(TERMINATOR);
    }
}
