//! NMEA 2000 transport layer: raw CAN frames, 29-bit identifier handling,
//! fast-packet reassembly and building, and the adapter framer contract.
pub mod can_frame;
pub mod can_id;
pub mod fast_packet;
pub mod traits;
