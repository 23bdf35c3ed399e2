//! `n2k-gateway` library: turns the byte streams of NMEA 2000 USB/serial
//! adapters into decoded messages.
//!
//! Bytes are split into CAN frames by an adapter framer (SLCAN ASCII or
//! Actisense binary), fast-packet fragments are reassembled, and complete
//! payloads are decoded field by field from a runtime PGN catalog. Each adapter
//! runs in its own worker; all workers feed one output channel.
//==================================================================================
/// Runtime configuration (adapters, channel sizes, reassembly timeout).
pub mod config;
/// Field and PGN definitions plus decoded message types.
pub mod core;
/// Adapter, framing, catalog, codec and gateway errors.
pub mod error;
/// Adapter byte streams and the bit-level codec.
pub mod infra;
/// PGN catalog, CAN transport and gateway workers.
pub mod protocol;
//==================================================================================
pub use crate::config::{AdapterConfig, AdapterProtocol, AdapterSource, GatewayConfig, ReassemblerConfig};
pub use crate::core::{DecodedField, DecodedMessage, FieldValue};
pub use crate::protocol::catalog::Catalog;
pub use crate::protocol::gateway::{Gateway, Worker, WorkerReport};
pub use crate::protocol::transport::can_frame::RawFrame;
