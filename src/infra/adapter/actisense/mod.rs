//! Binary escaped framing spoken by Actisense NGT-1 style gateways.
//!
//! A record is `DLE STX <command> <len> <body> <checksum> DLE ETX`. Every DLE
//! between the start and end markers is doubled on the wire. The checksum
//! brings the byte sum of command, length, body and checksum to zero.
use chrono::Utc;

use super::WireProtocol;
use crate::core::MAX_FRAME_DATA;
use crate::error::FramingError;
use crate::protocol::transport::can_frame::RawFrame;

pub const DLE: u8 = 0x10;
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Frame received from the bus.
pub const CMD_N2K_RECEIVED: u8 = 0x93;
/// Frame to transmit on the bus.
pub const CMD_N2K_SEND: u8 = 0x94;
/// Gateway status and command acknowledgements.
pub const CMD_NGT_RESPONSE: u8 = 0xA0;
/// Gateway configuration command.
pub const CMD_NGT_COMMAND: u8 = 0xA1;

/// "Receive all PGNs" gateway command body.
const RECEIVE_ALL: [u8; 3] = [0x11, 0x02, 0x00];

/// Command, length byte, 255 body bytes, checksum.
const MAX_RECORD: usize = 258;
/// priority, pgn (3), destination, source, timestamp (4), length.
const RECEIVED_HEADER: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Outside any record.
    Idle,
    /// DLE seen outside a record.
    Start,
    InRecord,
    /// DLE seen inside a record.
    Escape,
}

#[derive(Debug)]
pub struct ActisenseProtocol {
    state: ScanState,
    record: Vec<u8>,
}

impl Default for ActisenseProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl ActisenseProtocol {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            record: Vec::with_capacity(32),
        }
    }

    fn begin_record(&mut self) {
        self.record.clear();
        self.state = ScanState::InRecord;
    }
}

/// Append a complete escaped record for `command` and `body` to `out`.
pub fn encode_record(command: u8, body: &[u8], out: &mut Vec<u8>) {
    let len = body.len() as u8;
    let sum = body
        .iter()
        .fold(command.wrapping_add(len), |acc, b| acc.wrapping_add(*b));
    let checksum = 0u8.wrapping_sub(sum);

    out.extend_from_slice(&[DLE, STX]);
    for &byte in [command, len].iter().chain(body).chain([checksum].iter()) {
        if byte == DLE {
            out.push(DLE);
        }
        out.push(byte);
    }
    out.extend_from_slice(&[DLE, ETX]);
}

/// Validate an unescaped record (`command`, `len`, body, checksum).
/// `Ok(None)` for gateway chatter that carries no frame.
fn parse_record(record: &[u8]) -> Result<Option<RawFrame>, FramingError> {
    if record.len() < 3 {
        return Err(FramingError::Truncated {
            expected: 3,
            actual: record.len(),
        });
    }
    let expected = record[1] as usize + 3;
    if record.len() != expected {
        return Err(FramingError::Truncated {
            expected,
            actual: record.len(),
        });
    }

    let sum = record.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != 0 {
        return Err(FramingError::BadChecksum { sum });
    }

    let body = &record[2..record.len() - 1];
    match record[0] {
        CMD_N2K_RECEIVED => parse_received(body).map(Some),
        CMD_NGT_RESPONSE => Ok(None),
        command => Err(FramingError::UnknownCommand { command }),
    }
}

fn parse_received(body: &[u8]) -> Result<RawFrame, FramingError> {
    if body.len() < RECEIVED_HEADER {
        return Err(FramingError::Truncated {
            expected: RECEIVED_HEADER,
            actual: body.len(),
        });
    }
    let len = body[10] as usize;
    if len > MAX_FRAME_DATA {
        return Err(FramingError::InvalidLength { len });
    }
    if body.len() != RECEIVED_HEADER + len {
        return Err(FramingError::Truncated {
            expected: RECEIVED_HEADER + len,
            actual: body.len(),
        });
    }

    // Bytes 6..10 hold the gateway's millisecond counter; host time is used instead.
    let pgn = u32::from_le_bytes([body[1], body[2], body[3], 0]) & 0x3_FFFF;
    Ok(RawFrame {
        timestamp: Utc::now(),
        priority: body[0] & 0x07,
        pgn,
        source: body[5],
        destination: body[4],
        data: body[RECEIVED_HEADER..].to_vec(),
    })
}

impl WireProtocol for ActisenseProtocol {
    const NAME: &'static str = "actisense";

    fn open_sequence(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_record(CMD_NGT_COMMAND, &RECEIVE_ALL, &mut out);
        out
    }

    fn close_sequence(&self) -> Vec<u8> {
        Vec::new()
    }

    fn push_byte(&mut self, byte: u8) -> Option<Result<RawFrame, FramingError>> {
        match (self.state, byte) {
            (ScanState::Idle, DLE) => self.state = ScanState::Start,
            (ScanState::Idle, _) => {}

            (ScanState::Start, STX) => self.begin_record(),
            (ScanState::Start, DLE) => {}
            (ScanState::Start, _) => self.state = ScanState::Idle,

            (ScanState::InRecord, DLE) => self.state = ScanState::Escape,
            (ScanState::InRecord, _) => {
                if self.record.len() >= MAX_RECORD {
                    self.state = ScanState::Idle;
                    return Some(Err(FramingError::Overflow {
                        len: self.record.len() + 1,
                    }));
                }
                self.record.push(byte);
            }

            (ScanState::Escape, DLE) => {
                self.record.push(DLE);
                self.state = ScanState::InRecord;
            }
            (ScanState::Escape, ETX) => {
                self.state = ScanState::Idle;
                return parse_record(&self.record).transpose();
            }
            (ScanState::Escape, STX) => {
                // Unterminated record: report it and start over.
                self.begin_record();
                return Some(Err(FramingError::InvalidEscape { byte }));
            }
            (ScanState::Escape, _) => {
                self.state = ScanState::Idle;
                return Some(Err(FramingError::InvalidEscape { byte }));
            }
        }
        None
    }

    fn encode(&self, frame: &RawFrame, out: &mut Vec<u8>) {
        let [pgn0, pgn1, pgn2, _] = frame.pgn.to_le_bytes();
        let mut body = Vec::with_capacity(6 + frame.data.len());
        body.extend_from_slice(&[
            frame.priority & 0x07,
            pgn0,
            pgn1,
            pgn2,
            frame.destination,
            frame.data.len() as u8,
        ]);
        body.extend_from_slice(&frame.data);
        encode_record(CMD_N2K_SEND, &body, out);
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
