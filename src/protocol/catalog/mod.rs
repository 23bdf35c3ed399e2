//! PGN catalog: the read-only schema the field decoder interprets.
//!
//! Definitions are built in code or loaded from a JSON document shaped like
//! the CANboat export. Every definition is validated before it is stored and
//! shared behind an `Arc`, so workers can hold the same catalog without locks.
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::core::{FieldDefinition, FieldKind, PgnDefinition, MAX_FRAME_DATA, MAX_NUMBER_BITS};
use crate::error::CatalogError;
use crate::protocol::transport::fast_packet::MAX_FAST_PACKET_PAYLOAD;

/// Largest payload carried by the ISO 11783 multi-packet transport.
pub const MAX_MULTI_PACKET_PAYLOAD: usize = 1785;

/// No field may end past this bit.
const MAX_PAYLOAD_BITS: usize = MAX_MULTI_PACKET_PAYLOAD * 8;

//==================================================================================PGN_CLASS
/// Transport class implied by a PGN's declared length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgnClass {
    /// Fits one CAN frame (≤ 8 bytes).
    SingleFrame,
    /// NMEA 2000 fast packet (≤ 223 bytes).
    FastPacket,
    /// ISO 11783 transport protocol (≤ 1785 bytes).
    MultiPacket,
    Invalid,
}

impl PgnClass {
    pub fn from_length(length: usize) -> Self {
        match length {
            0..=MAX_FRAME_DATA => PgnClass::SingleFrame,
            l if l <= MAX_FAST_PACKET_PAYLOAD => PgnClass::FastPacket,
            l if l <= MAX_MULTI_PACKET_PAYLOAD => PgnClass::MultiPacket,
            _ => PgnClass::Invalid,
        }
    }
}

//==================================================================================CATALOG
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    definitions: HashMap<u32, Arc<PgnDefinition>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store every definition; the first entry wins for a repeated PGN.
    pub fn from_definitions<I>(definitions: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = PgnDefinition>,
    {
        let mut catalog = Self::new();
        for definition in definitions {
            catalog.insert(definition)?;
        }
        Ok(catalog)
    }

    /// Parse a CANboat-style JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_reader(reader)?;
        Self::from_document(document)
    }

    fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        Self::from_definitions(document.pgns.into_iter().map(PgnEntry::into_definition))
    }

    /// Add a definition after validation. Returns `false` when the PGN was
    /// already present (the existing entry is kept).
    pub fn insert(&mut self, definition: PgnDefinition) -> Result<bool, CatalogError> {
        validate(&definition)?;
        if self.definitions.contains_key(&definition.pgn) {
            debug!(pgn = definition.pgn, name = %definition.name, "duplicate PGN definition ignored");
            return Ok(false);
        }
        self.definitions.insert(definition.pgn, Arc::new(definition));
        Ok(true)
    }

    pub fn get(&self, pgn: u32) -> Option<&Arc<PgnDefinition>> {
        self.definitions.get(&pgn)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn pgns(&self) -> impl Iterator<Item = u32> + '_ {
        self.definitions.keys().copied()
    }

    /// Transport class of a known PGN.
    pub fn classify(&self, pgn: u32) -> Option<PgnClass> {
        self.get(pgn).map(|def| PgnClass::from_length(def.length))
    }

    /// A PGN is reassembled when its declared length lies in `(8, 223]`.
    /// Unknown PGNs are never fast packets.
    pub fn is_fast_packet(&self, pgn: u32) -> bool {
        self.classify(pgn) == Some(PgnClass::FastPacket)
    }
}

/// Structural checks run on every definition before it enters the catalog.
fn validate(definition: &PgnDefinition) -> Result<(), CatalogError> {
    let pgn = definition.pgn;

    for field in &definition.fields {
        let in_range = field
            .bit_offset
            .checked_add(field.bit_length as u32)
            .is_some_and(|end| end as usize <= MAX_PAYLOAD_BITS);
        if !in_range {
            return Err(CatalogError::FieldOutOfRange {
                pgn,
                field: field.name.clone(),
                offset: field.bit_offset,
                bits: field.bit_length,
            });
        }

        let invalid_length = || CatalogError::InvalidBitLength {
            pgn,
            field: field.name.clone(),
            bits: field.bit_length,
        };

        match field.kind {
            FieldKind::Number => {
                if !(1..=MAX_NUMBER_BITS).contains(&field.bit_length) {
                    return Err(invalid_length());
                }
            }
            FieldKind::Reserved => {
                if field.bit_length == 0 {
                    return Err(invalid_length());
                }
            }
            FieldKind::Binary | FieldKind::StringFix => {
                if field.bit_length == 0 || field.bit_length % 8 != 0 {
                    return Err(invalid_length());
                }
                if field.bit_offset % 8 != 0 {
                    return Err(CatalogError::NonAlignedField {
                        pgn,
                        field: field.name.clone(),
                        offset: field.bit_offset,
                    });
                }
            }
        }
    }

    if definition.repeating_fields > definition.fields.len() {
        return Err(CatalogError::InvalidRepeatingFields {
            pgn,
            count: definition.repeating_fields,
            available: definition.fields.len(),
        });
    }

    // Byte fields of later repetitions must stay byte aligned.
    if let Some((start, end)) = definition.repeating_span() {
        let span = end - start;
        let misaligned = definition
            .repeating_template()
            .iter()
            .find(|f| matches!(f.kind, FieldKind::Binary | FieldKind::StringFix));
        if let Some(field) = misaligned.filter(|_| span % 8 != 0) {
            return Err(CatalogError::NonAlignedField {
                pgn,
                field: field.name.clone(),
                offset: field.bit_offset + span,
            });
        }
    }

    Ok(())
}

//==================================================================================CANBOAT_DOC
// Structures used to deserialize the catalog document.
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(rename = "PGNs")]
    pgns: Vec<PgnEntry>,
}

#[derive(Debug, Deserialize)]
/// PGN descriptor as written in the document.
struct PgnEntry {
    #[serde(rename = "PGN")]
    pgn: u32,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Length", default)]
    length: Option<usize>,
    #[serde(rename = "RepeatingFields", alias = "RepeatingFieldSet1Size", default)]
    repeating_fields: Option<usize>,
    #[serde(rename = "Fields", default)]
    fields: Vec<FieldEntry>,
}

#[derive(Debug, Deserialize)]
/// Field descriptor as written in the document.
struct FieldEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "BitOffset", default)]
    bit_offset: Option<u32>,
    #[serde(rename = "BitLength", default)]
    bit_length: Option<u16>,
    #[serde(rename = "Signed", default)]
    signed: Option<bool>,
    #[serde(rename = "Resolution", default)]
    resolution: Option<f64>,
    #[serde(rename = "Offset", default)]
    offset: Option<f64>,
    #[serde(rename = "FieldType", default)]
    field_type: Option<String>,
    #[serde(rename = "Unit", default)]
    unit: Option<String>,
    #[serde(rename = "EnumValues", default)]
    enum_values: Vec<EnumEntry>,
}

#[derive(Debug, Deserialize)]
struct EnumEntry {
    #[serde(rename = "Name", alias = "name")]
    name: String,
    #[serde(rename = "Value", alias = "value")]
    value: LookupCode,
}

/// Older exports quote enumeration codes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LookupCode {
    Number(u64),
    Text(String),
}

impl LookupCode {
    fn as_u64(&self) -> Option<u64> {
        match self {
            LookupCode::Number(v) => Some(*v),
            LookupCode::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl PgnEntry {
    fn into_definition(self) -> PgnDefinition {
        let pgn = self.pgn;
        let mut fields = Vec::with_capacity(self.fields.len());
        for entry in self.fields {
            match entry.into_definition() {
                Some(field) => fields.push(field),
                None => debug!(pgn, "variable-length field skipped"),
            }
        }

        // Sizes come from the layout when the document omits them.
        let layout_len = fields
            .iter()
            .map(|f| f.end_bit().div_ceil(8) as usize)
            .max()
            .unwrap_or(0);
        let repeating_fields = self.repeating_fields.unwrap_or(0).min(fields.len());

        PgnDefinition {
            pgn,
            name: self.description,
            length: self.length.unwrap_or(layout_len),
            repeating_fields,
            fields,
        }
    }
}

impl FieldEntry {
    /// `None` for fields without a fixed width.
    fn into_definition(self) -> Option<FieldDefinition> {
        let bit_length = self.bit_length?;
        let bit_offset = self.bit_offset?;
        let kind = field_kind(self.field_type.as_deref(), bit_offset, bit_length);

        let mut field = FieldDefinition::number(self.name, bit_offset, bit_length).with_kind(kind);
        field.signed = self.signed.unwrap_or(false);
        // Resolution 0 shows up for unscaled fields in some exports.
        field.resolution = self.resolution.filter(|r| *r != 0.0).unwrap_or(1.0);
        field.offset = self.offset.unwrap_or(0.0);
        field.unit = self.unit;

        let lookup: Vec<(u64, String)> = self
            .enum_values
            .into_iter()
            .filter_map(|e| e.value.as_u64().map(|code| (code, e.name)))
            .collect();
        if !lookup.is_empty() {
            field = field.with_lookup(lookup);
        }

        Some(field)
    }
}

/// Normalize a `FieldType` string into a `FieldKind`.
///
/// Byte blocks that are not byte aligned are small bit fields in practice and
/// decode as numbers; anything wider than a number that cannot be read as
/// bytes is skipped.
fn field_kind(field_type: Option<&str>, bit_offset: u32, bit_length: u16) -> FieldKind {
    let aligned = bit_offset % 8 == 0 && bit_length % 8 == 0;
    match field_type.map(str::to_ascii_uppercase).as_deref() {
        Some("RESERVED") | Some("SPARE") => FieldKind::Reserved,
        Some("BINARY") if aligned => FieldKind::Binary,
        Some("STRING_FIX") if aligned => FieldKind::StringFix,
        _ if bit_length > MAX_NUMBER_BITS => FieldKind::Reserved,
        _ => FieldKind::Number,
    }
}
