//! NMEA 2000 Fast Packet assembler: rebuilds application messages by
//! aggregating the CAN frames of a multi-frame session.
//!
//! State is owned by one assembler per adapter connection. Sessions are keyed
//! by `uid = (group << 28) | (pgn << 8) | source`, so concurrent transmissions
//! of the same PGN by different senders, or by one sender in different groups,
//! never share a buffer.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use super::MAX_FAST_PACKET_PAYLOAD;
use crate::config::ReassemblerConfig;
use crate::protocol::catalog::Catalog;
use crate::protocol::transport::can_frame::RawFrame;

//==================================================================================Enums and Structs
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Frame discarded (malformed, orphaned, out of sequence or expired).
    Ignored,
    /// Frame successfully integrated but additional fragments are still missing.
    FragmentConsumed,
    /// The payload is complete: either a single-frame PGN or the last fragment
    /// of a fast packet.
    MessageComplete(CompletedMessage),
}

/// Complete payload with the metadata of the frame that opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMessage {
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub pgn: u32,
    pub source: u8,
    pub destination: u8,
    pub payload: Vec<u8>,
}

impl From<RawFrame> for CompletedMessage {
    fn from(frame: RawFrame) -> Self {
        Self {
            timestamp: frame.timestamp,
            priority: frame.priority,
            pgn: frame.pgn,
            source: frame.source,
            destination: frame.destination,
            payload: frame.data,
        }
    }
}

/// Drop and completion counters, one set per assembler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Fast packets delivered.
    pub completed: u64,
    /// Partials replaced by a new first frame for the same uid.
    pub abandoned: u64,
    /// Continuations received without a partial.
    pub orphaned: u64,
    /// Continuations whose sequence did not follow the previous one.
    pub out_of_sequence: u64,
    /// Partials evicted after the configured timeout.
    pub expired: u64,
    /// Frames too short or declaring an impossible length.
    pub malformed: u64,
}

/// Reassembly in progress for one uid.
#[derive(Debug)]
struct PartialMessage {
    opened_at: DateTime<Utc>,
    priority: u8,
    destination: u8,
    expected_length: usize,
    data: Vec<u8>,
    last_sequence: u8,
    updated_at: DateTime<Utc>,
}

/// Main assembler: routes fast-packet frames into per-uid partials and lets
/// every other frame through.
#[derive(Debug)]
pub struct FastPacketAssembler {
    catalog: Arc<Catalog>,
    partial_timeout: Option<TimeDelta>,
    partials: HashMap<u32, PartialMessage>,
    stats: ReassemblyStats,
}

/// Reassembly key.
pub fn session_uid(group: u8, pgn: u32, source: u8) -> u32 {
    ((group as u32 & 0x07) << 28) | (pgn << 8) | source as u32
}

fn is_expired(timeout: Option<TimeDelta>, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    timeout.is_some_and(|t| now - updated_at > t)
}

impl FastPacketAssembler {
    pub fn new(catalog: Arc<Catalog>, config: &ReassemblerConfig) -> Self {
        Self {
            catalog,
            partial_timeout: config.partial_timeout(),
            partials: HashMap::new(),
            stats: ReassemblyStats::default(),
        }
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Number of partials currently held.
    pub fn pending(&self) -> usize {
        self.partials.len()
    }

    //==================================================================================Process Functions
    /// Process one frame.
    ///
    /// PGNs the catalog does not declare as fast packets are returned as
    /// complete messages right away. Fast-packet frames are accumulated until
    /// the declared length is reached.
    pub fn process_frame(&mut self, frame: RawFrame) -> ProcessResult {
        if !self.catalog.is_fast_packet(frame.pgn) {
            return ProcessResult::MessageComplete(frame.into());
        }

        let (Some(sequence), Some(group)) = (frame.sequence(), frame.group()) else {
            self.stats.malformed += 1;
            debug!(pgn = frame.pgn, source = frame.source, "empty fast packet frame dropped");
            return ProcessResult::Ignored;
        };
        let uid = session_uid(group, frame.pgn, frame.source);

        if sequence == 0 {
            self.start_session(uid, frame)
        } else {
            self.continue_session(uid, sequence, frame)
        }
    }

    /// First frame: `[header, length, up to six bytes]`.
    fn start_session(&mut self, uid: u32, frame: RawFrame) -> ProcessResult {
        if let Some(previous) = self.partials.remove(&uid) {
            self.stats.abandoned += 1;
            debug!(
                pgn = frame.pgn,
                source = frame.source,
                received = previous.data.len(),
                expected = previous.expected_length,
                "partial fast packet abandoned for a new first frame"
            );
        }

        if frame.data.len() < 2 {
            self.stats.malformed += 1;
            debug!(pgn = frame.pgn, source = frame.source, "first frame without length byte dropped");
            return ProcessResult::Ignored;
        }
        let expected_length = frame.data[1] as usize;
        if expected_length > MAX_FAST_PACKET_PAYLOAD {
            self.stats.malformed += 1;
            debug!(
                pgn = frame.pgn,
                source = frame.source,
                expected = expected_length,
                "first frame declares more than a fast packet can carry"
            );
            return ProcessResult::Ignored;
        }

        let mut data = frame.data[2..].to_vec();
        data.truncate(expected_length);

        if data.len() >= expected_length {
            self.stats.completed += 1;
            return ProcessResult::MessageComplete(CompletedMessage {
                payload: data,
                ..CompletedMessage::from(frame)
            });
        }

        self.partials.insert(
            uid,
            PartialMessage {
                opened_at: frame.timestamp,
                priority: frame.priority,
                destination: frame.destination,
                expected_length,
                data,
                last_sequence: 0,
                updated_at: frame.timestamp,
            },
        );
        ProcessResult::FragmentConsumed
    }

    /// Continuation frame: `[header, up to seven bytes]`.
    fn continue_session(&mut self, uid: u32, sequence: u8, frame: RawFrame) -> ProcessResult {
        let timeout = self.partial_timeout;
        let Some(partial) = self.partials.get_mut(&uid) else {
            self.stats.orphaned += 1;
            debug!(pgn = frame.pgn, source = frame.source, sequence, "orphaned continuation dropped");
            return ProcessResult::Ignored;
        };

        if is_expired(timeout, partial.updated_at, frame.timestamp) {
            self.partials.remove(&uid);
            self.stats.expired += 1;
            debug!(pgn = frame.pgn, source = frame.source, sequence, "expired partial evicted");
            return ProcessResult::Ignored;
        }

        if partial.last_sequence.wrapping_add(1) != sequence {
            self.stats.out_of_sequence += 1;
            debug!(
                pgn = frame.pgn,
                source = frame.source,
                sequence,
                last = partial.last_sequence,
                "out-of-sequence continuation dropped"
            );
            return ProcessResult::Ignored;
        }

        // Bytes past the declared length are padding.
        let room = partial.expected_length - partial.data.len();
        let chunk = &frame.data[1..];
        partial.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
        partial.last_sequence = sequence;
        partial.updated_at = frame.timestamp;

        if partial.data.len() < partial.expected_length {
            return ProcessResult::FragmentConsumed;
        }

        let Some(done) = self.partials.remove(&uid) else {
            return ProcessResult::Ignored;
        };
        self.stats.completed += 1;
        ProcessResult::MessageComplete(CompletedMessage {
            timestamp: done.opened_at,
            priority: done.priority,
            pgn: frame.pgn,
            source: frame.source,
            destination: done.destination,
            payload: done.data,
        })
    }

    /// Evict every partial idle for longer than the timeout at `now`.
    /// Returns the number of evicted partials (always 0 without a timeout).
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.partial_timeout;
        let before = self.partials.len();
        self.partials
            .retain(|_, partial| !is_expired(timeout, partial.updated_at, now));
        let evicted = before - self.partials.len();

        if evicted > 0 {
            self.stats.expired += evicted as u64;
            debug!(evicted, "expired partials swept");
        }
        evicted
    }
}
