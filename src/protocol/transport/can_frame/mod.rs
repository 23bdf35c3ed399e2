//! In-memory representation of an NMEA 2000 CAN frame as produced by an
//! adapter framer.
use chrono::{DateTime, Utc};

use crate::core::BROADCAST_ADDRESS;
use crate::protocol::transport::can_id::CanId;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Raw NMEA 2000 frame with its identifier already split into J1939 parts.
///
/// Framers never produce more than eight data bytes; the length is checked
/// again before any write.
pub struct RawFrame {
    /// Reception time (or creation time for outbound frames).
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    /// 18-bit parameter group number.
    pub pgn: u32,
    pub source: u8,
    /// Destination address, 255 for broadcast.
    pub destination: u8,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Broadcast frame stamped with the current time and default priority 6.
    pub fn new(pgn: u32, source: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp: Utc::now(),
            priority: 6,
            pgn,
            source,
            destination: BROADCAST_ADDRESS,
            data: data.into(),
        }
    }

    /// Split a received identifier into the frame fields.
    pub fn from_can_id(id: CanId, data: impl Into<Vec<u8>>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            priority: id.priority(),
            pgn: id.pgn(),
            source: id.source_address(),
            destination: id.destination(),
            data: data.into(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    pub fn with_destination(mut self, destination: u8) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 29-bit identifier for this frame.
    pub fn can_id(&self) -> CanId {
        CanId::from_parts(self.priority, self.pgn, self.destination, self.source)
    }

    /// Fast packet frame counter (`data[0] & 0x1F`).
    pub fn sequence(&self) -> Option<u8> {
        self.data.first().map(|b| b & 0x1F)
    }

    /// Fast packet group identifier (`(data[0] & 0x70) >> 5`).
    pub fn group(&self) -> Option<u8> {
        self.data.first().map(|b| (b & 0x70) >> 5)
    }
}
