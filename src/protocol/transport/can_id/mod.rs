//! Creation and extraction of the 29-bit CAN identifiers used by
//! NMEA 2000 (derived from the SAE J1939 specification).
use crate::core::BROADCAST_ADDRESS;

/// PDU format values from this one upward are broadcast (PDU2).
const PDU2_THRESHOLD: u8 = 240;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Encapsulates an extended CAN identifier (29 bits) and exposes accessors
/// for priority, PGN, destination, and source.
pub struct CanId(pub u32);

impl CanId {
    /// Assemble an identifier from its J1939 parts.
    ///
    /// For PDU1 PGNs (PF < 240) the PS byte carries `destination`; for PDU2 PGNs
    /// it carries the PGN's own low byte and `destination` is ignored. R/DP bits
    /// are copied from the PGN; the priority is capped to 3 bits.
    pub fn from_parts(priority: u8, pgn: u32, destination: u8, source: u8) -> Self {
        let r = (pgn >> 17) & 0x01;
        let dp = (pgn >> 16) & 0x01;
        let pf = ((pgn >> 8) & 0xFF) as u8;
        let ps = if pf < PDU2_THRESHOLD {
            destination
        } else {
            (pgn & 0xFF) as u8
        };

        CanId(
            (((priority & 0x07) as u32) << 26)
                | (r << 25)
                | (dp << 24)
                | ((pf as u32) << 16)
                | ((ps as u32) << 8)
                | source as u32,
        )
    }

    /// Build from the four identifier bytes, most significant first (as they
    /// appear on ASCII adapters).
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        CanId(u32::from_be_bytes(bytes) & 0x1FFF_FFFF)
    }

    /// Returns the priority (3 bits, value 0-7) encoded in the CAN ID.
    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    /// PDU format byte.
    pub fn pdu_format(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// PDU specific byte: destination for PDU1, PGN low byte for PDU2.
    pub fn pdu_specific(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Addressed message (PF < 240).
    pub fn is_pdu1(&self) -> bool {
        self.pdu_format() < PDU2_THRESHOLD
    }

    /// Extracts the 18-bit PGN, handling the PDU1/PDU2 distinction.
    pub fn pgn(&self) -> u32 {
        let base = (self.0 >> 8) & 0x3_FF00;
        if self.is_pdu1() {
            // PS stores the explicit destination, not part of the PGN.
            base
        } else {
            base | self.pdu_specific() as u32
        }
    }

    /// Destination address; broadcast (255) for PDU2 PGNs.
    pub fn destination(&self) -> u8 {
        if self.is_pdu1() {
            self.pdu_specific()
        } else {
            BROADCAST_ADDRESS
        }
    }

    /// Eight-bit source address (logical node identifier on the N2K network).
    pub fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}
