//! NMEA 2000 protocol side of the gateway: PGN catalog, CAN/fast-packet
//! transport and the per-adapter workers tying them together.
pub mod catalog;
pub mod gateway;
pub mod transport;
