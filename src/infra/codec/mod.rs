//! Catalog-driven payload codec.
//!
//! `bits` moves arbitrary-width values in and out of little-endian buffers;
//! `engine` applies field definitions on top of it.
pub mod bits;
pub mod engine;
