//! CAN frame generator for outbound messages. Automatically builds the required
//! frame sequence (single frame or fast packet) from an application payload.
use chrono::{DateTime, Utc};

use crate::core::{BROADCAST_ADDRESS, MAX_FRAME_DATA};
use crate::error::EncodeError;
use crate::protocol::transport::can_frame::RawFrame;
use crate::protocol::transport::fast_packet::MAX_FAST_PACKET_PAYLOAD;

/// Rolling 3-bit fast packet group identifier.
///
/// Each transmitting component owns its counter, so consecutive messages get
/// distinct groups without any shared state.
#[derive(Debug, Default, Clone)]
pub struct GroupCounter {
    next: u8,
}

impl GroupCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current group, then advance (wraps after 7).
    pub fn next_group(&mut self) -> u8 {
        let group = self.next;
        self.next = (self.next + 1) & 0x07;
        group
    }

    /// Builder tagged with the next group.
    pub fn builder<'a>(&mut self, pgn: u32, source: u8, payload: &'a [u8]) -> FastPacketBuilder<'a> {
        FastPacketBuilder::new(pgn, source, payload).with_group(self.next_group())
    }
}

#[derive(Debug)]
/// Shared parameters for all frames composing one message.
pub struct FastPacketBuilder<'a> {
    pgn: u32,
    source: u8,
    destination: u8,
    priority: u8,
    payload: &'a [u8],
    group: u8,
}

impl<'a> FastPacketBuilder<'a> {
    /// Broadcast message at priority 6, group 0.
    pub fn new(pgn: u32, source: u8, payload: &'a [u8]) -> Self {
        Self {
            pgn,
            source,
            destination: BROADCAST_ADDRESS,
            priority: 6,
            payload,
            group: 0,
        }
    }

    pub fn with_destination(mut self, destination: u8) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    /// Override the 3-bit group identifier (replays, tests).
    pub fn with_group(mut self, group: u8) -> Self {
        self.group = group & 0x07;
        self
    }

    /// Start the iteration; each call to `next` yields the next frame.
    /// Payloads above 223 bytes are rejected.
    pub fn build(self) -> Result<FrameIterator<'a>, EncodeError> {
        if self.payload.len() > MAX_FAST_PACKET_PAYLOAD {
            return Err(EncodeError::PayloadTooLong {
                len: self.payload.len(),
                max: MAX_FAST_PACKET_PAYLOAD,
            });
        }
        Ok(FrameIterator {
            builder: self,
            timestamp: Utc::now(),
            frame_index: 0,
            bytes_sent: 0,
            done: false,
        })
    }
}

/// Lazy iterator returning frames one by one as they are encoded.
pub struct FrameIterator<'a> {
    builder: FastPacketBuilder<'a>,
    timestamp: DateTime<Utc>,
    frame_index: u8,
    bytes_sent: usize,
    done: bool,
}

impl FrameIterator<'_> {
    fn frame(&self, data: Vec<u8>) -> RawFrame {
        RawFrame::new(self.builder.pgn, self.builder.source, data)
            .with_priority(self.builder.priority)
            .with_destination(self.builder.destination)
            .with_timestamp(self.timestamp)
    }
}

impl Iterator for FrameIterator<'_> {
    type Item = RawFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let payload = self.builder.payload;

        // Payload ≤ 8 bytes: single-frame message (no fast packet).
        if payload.len() <= MAX_FRAME_DATA {
            self.done = true;
            return Some(self.frame(payload.to_vec()));
        }

        let header = (self.builder.group << 5) | (self.frame_index & 0x1F);
        let mut data = Vec::with_capacity(MAX_FRAME_DATA);
        data.push(header);

        let chunk_len = if self.bytes_sent == 0 {
            // First frame: header, total length, six payload bytes.
            data.push(payload.len() as u8);
            6
        } else {
            7
        };
        let end = (self.bytes_sent + chunk_len).min(payload.len());
        data.extend_from_slice(&payload[self.bytes_sent..end]);
        data.resize(MAX_FRAME_DATA, 0xFF);

        self.bytes_sent = end;
        self.frame_index = self.frame_index.wrapping_add(1);
        self.done = self.bytes_sent >= payload.len();

        Some(self.frame(data))
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
