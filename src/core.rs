//! Defines the "data contract" between the PGN catalog (the schema) and the
//! decoding engine (the interpreter).
//!
//! The catalog produces `PgnDefinition`s; `infra::codec::engine` consumes them to
//! turn raw payloads into `DecodedMessage`s made of `FieldValue`s.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of data bytes carried by one classic CAN frame.
pub const MAX_FRAME_DATA: usize = 8;

/// Destination address meaning "every node on the segment".
pub const BROADCAST_ADDRESS: u8 = 255;

/// Widest integer a numeric field may span.
pub const MAX_NUMBER_BITS: u16 = 64;

/// Semantic type of a field within a PGN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FieldKind {
    /// Signed or unsigned integer, optionally scaled and/or enumerated.
    #[default]
    Number,
    /// Reserved or spare bits: skipped on decode, left at `1` on encode.
    Reserved,
    /// Opaque byte block (byte aligned, length multiple of eight bits).
    Binary,
    /// Fixed-length ASCII string padded with `0xFF`, `0x00` or `@`.
    StringFix,
}

/// Descriptor for a single PGN field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    /// Absolute offset of the first bit, counted from the start of the payload.
    pub bit_offset: u32,
    /// Width in bits; 1-64 for numbers.
    pub bit_length: u16,
    pub signed: bool,
    /// Scale factor applied to the raw integer.
    pub resolution: f64,
    /// Additive bias applied after scaling.
    pub offset: f64,
    /// Raw code to label table.
    pub enum_mapping: Option<BTreeMap<u64, String>>,
    /// Physical unit (e.g. "m/s", "rad", "K").
    pub unit: Option<String>,
}

impl FieldDefinition {
    /// Unsigned, unscaled number occupying `bit_length` bits at `bit_offset`.
    pub fn number(name: impl Into<String>, bit_offset: u32, bit_length: u16) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Number,
            bit_offset,
            bit_length,
            signed: false,
            resolution: 1.0,
            offset: 0.0,
            enum_mapping: None,
            unit: None,
        }
    }

    /// Reserved bits that never show up in decoded output.
    pub fn reserved(bit_offset: u32, bit_length: u16) -> Self {
        Self {
            kind: FieldKind::Reserved,
            ..Self::number("Reserved", bit_offset, bit_length)
        }
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attach an enumeration; codes missing from the table decode as numbers.
    pub fn with_lookup<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        self.enum_mapping = Some(
            entries
                .into_iter()
                .map(|(code, label)| (code, label.into()))
                .collect(),
        );
        self
    }

    /// First bit after the field (saturates for out-of-range layouts, which
    /// catalog validation rejects).
    pub fn end_bit(&self) -> u32 {
        self.bit_offset.saturating_add(self.bit_length as u32)
    }

    /// True when the raw integer is reported without scaling.
    pub fn is_unscaled(&self) -> bool {
        self.resolution == 1.0 && self.offset == 0.0
    }
}

/// Descriptor for an entire PGN layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PgnDefinition {
    pub pgn: u32,
    pub name: String,
    /// Declared payload length in bytes.
    pub length: usize,
    /// Number of trailing fields that repeat until the payload is exhausted (0 = none).
    pub repeating_fields: usize,
    /// Ordered field layout.
    pub fields: Vec<FieldDefinition>,
}

impl PgnDefinition {
    pub fn new(pgn: u32, name: impl Into<String>, length: usize) -> Self {
        Self {
            pgn,
            name: name.into(),
            length,
            repeating_fields: 0,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_repeating_fields(mut self, count: usize) -> Self {
        self.repeating_fields = count;
        self
    }

    /// Trailing fields forming the repeating group template.
    pub fn repeating_template(&self) -> &[FieldDefinition] {
        let start = self.fields.len().saturating_sub(self.repeating_fields);
        &self.fields[start..]
    }

    /// Bit span of one repetition of the trailing group, `None` without a group.
    pub fn repeating_span(&self) -> Option<(u32, u32)> {
        if self.repeating_fields == 0 {
            return None;
        }
        let template = self.repeating_template();
        let start = template.iter().map(|f| f.bit_offset).min()?;
        let end = template.iter().map(FieldDefinition::end_bit).max()?;
        (end > start).then_some((start, end))
    }
}

/// Decoded value of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Lookup { code: u64, label: String },
    Bytes(Vec<u8>),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value (lookups yield their raw code).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v as f64),
            FieldValue::Signed(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Lookup { code, .. } => Some(*code as f64),
            FieldValue::Bytes(_) | FieldValue::Text(_) => None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            FieldValue::Lookup { label, .. } => Some(label),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedField {
    pub name: String,
    pub value: FieldValue,
}

/// Fully decoded NMEA 2000 message, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub pgn: u32,
    /// Catalog name; `None` when the PGN is not in the catalog.
    pub name: Option<String>,
    pub source: u8,
    pub destination: u8,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<DecodedField>,
    /// Complete payload as received.
    pub payload: Vec<u8>,
}

impl DecodedMessage {
    /// First field carrying `name`.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Every value recorded under `name`, in payload order (repeating groups).
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldValue> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name == name)
            .map(|f| &f.value)
    }

    pub fn is_known(&self) -> bool {
        self.name.is_some()
    }
}
