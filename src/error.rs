//! Error definitions shared across library modules.
//! Each type models one failure scenario (adapter I/O, byte framing, catalog
//! validation, bit-level access, payload encoding, worker supervision).
use thiserror::Error;

//==================================================================================ADAPTER_ERRORS
#[derive(Error, Debug)]
/// Failures surfaced by an adapter connection. All of them end the worker that
/// owns the connection; other adapters are unaffected.
pub enum AdapterError {
    /// Underlying stream read or write failed.
    #[error("Adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The stream reached end-of-file.
    #[error("Adapter stream closed by peer")]
    Disconnected,
    /// Frame I/O attempted while the channel is not open.
    #[error("Adapter channel is not open")]
    ChannelClosed,
    /// Outbound frame carries more bytes than one CAN frame can hold.
    #[error("Unsupported long write: {len} data bytes (max 8)")]
    UnsupportedLongWrite { len: usize },
}

//==================================================================================FRAMING_ERRORS
#[derive(Error, Debug, PartialEq, Eq)]
/// Malformed byte runs detected while splitting an adapter stream into frames.
/// They are logged and skipped, never returned from `read`.
pub enum FramingError {
    /// Byte is not an ASCII hex digit.
    #[error("Invalid hex digit 0x{byte:02X}")]
    InvalidHex { byte: u8 },
    /// Run is shorter or longer than its header announces.
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// Declared data length is above eight bytes.
    #[error("Invalid data length {len}")]
    InvalidLength { len: usize },
    /// Run grew past the longest legal frame without a terminator.
    #[error("Frame overflow after {len} bytes")]
    Overflow { len: usize },
    /// Record checksum does not sum to zero.
    #[error("Bad checksum: record sums to 0x{sum:02X}")]
    BadChecksum { sum: u8 },
    /// Escape byte followed by an unexpected control byte.
    #[error("Invalid escape sequence 0x10 0x{byte:02X}")]
    InvalidEscape { byte: u8 },
    /// Record command is not one the framer understands.
    #[error("Unknown record command 0x{command:02X}")]
    UnknownCommand { command: u8 },
}

//==================================================================================CATALOG_ERRORS
#[derive(Error, Debug)]
/// Schema data that cannot be turned into a usable catalog.
pub enum CatalogError {
    /// Catalog document is not valid JSON or does not match the expected shape.
    #[error("Invalid catalog document: {0}")]
    ParseJson(#[from] serde_json::Error),
    /// Field width is outside what its kind supports.
    #[error("Invalid bit length {bits} for field {field} of PGN {pgn}")]
    InvalidBitLength { pgn: u32, field: String, bits: u16 },
    /// Byte-oriented field does not start on a byte boundary.
    #[error("Field {field} of PGN {pgn} must be byte aligned (offset {offset})")]
    NonAlignedField { pgn: u32, field: String, offset: u32 },
    /// Field extends past the largest payload any PGN can carry.
    #[error("Field {field} of PGN {pgn} lies outside the payload (offset {offset}, {bits} bits)")]
    FieldOutOfRange {
        pgn: u32,
        field: String,
        offset: u32,
        bits: u16,
    },
    /// Repeating group is larger than the field list.
    #[error("PGN {pgn} repeats {count} fields but only defines {available}")]
    InvalidRepeatingFields {
        pgn: u32,
        count: usize,
        available: usize,
    },
}

//==================================================================================BITREADER_ERRORS
#[derive(Debug, Error, PartialEq, Eq)]
/// Errors raised during bitwise buffer reads.
pub enum BitReaderError {
    /// Attempted to read past the end of the buffer.
    #[error("Read out of bounds: asked {asked} bits, {available} available")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested width is outside `1..=64`.
    #[error("Cannot read {asked} bits into a {max}-bit integer")]
    TooLongForType { max: u8, asked: u16 },
    /// Cursor is not on a byte boundary when the operation requires it.
    #[error("Cursor {cursor} is not byte aligned")]
    NonAlignedBit { cursor: usize },
}

//==================================================================================BITWRITER_ERRORS
#[derive(Debug, Error, PartialEq, Eq)]
/// Errors raised during bitwise writes into a buffer.
pub enum BitWriterError {
    /// Attempted to write beyond the provided capacity.
    #[error("Write out of bounds: asked {asked} bits, {available} available")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested width is outside `1..=64`.
    #[error("Cannot write {asked} bits from a {max}-bit integer")]
    TooLongForType { max: u8, asked: u16 },
    /// Cursor is not on a byte boundary when the operation requires it.
    #[error("Cursor {cursor} is not byte aligned")]
    NonAlignedBit { cursor: usize },
}

//==================================================================================ENCODE_ERRORS
#[derive(Debug, Error)]
/// Issues encountered while turning field values or payloads into bytes.
pub enum EncodeError {
    /// Value variant cannot be stored in the field's kind.
    #[error("Value does not fit field {field}")]
    ValueMismatch { field: String },
    /// Payload exceeds what the transport can carry.
    #[error("Payload of {len} bytes exceeds {max}")]
    PayloadTooLong { len: usize, max: usize },
    /// Failed while writing bits into the output buffer.
    #[error("BitWrite error: {0}")]
    BitWrite(#[from] BitWriterError),
}

//==================================================================================GATEWAY_ERRORS
#[derive(Debug, Error)]
/// Errors reported when starting or joining adapter workers.
pub enum GatewayError {
    /// Adapter could not be opened or its worker failed.
    #[error("Adapter {name}: {source}")]
    Adapter {
        name: String,
        #[source]
        source: AdapterError,
    },
    /// Worker task panicked or was aborted.
    #[error("Worker {name} did not finish: {source}")]
    Join {
        name: String,
        #[source]
        source: tokio::task::JoinError,
    },
}
