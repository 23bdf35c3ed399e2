//! Infrastructure layer: adapter byte streams and the bit-level codec.
pub mod adapter;
pub mod codec;
