//! Generic decoding/encoding engine driven by catalog `PgnDefinition`s.
//! It positions the bit reader/writer on each field, applies signedness,
//! scaling and enumerations, and expands trailing repeating groups.
use tracing::trace;

use super::bits::{sign_extend, BitReader, BitWriter};
use crate::core::{DecodedField, DecodedMessage, FieldDefinition, FieldKind, FieldValue, PgnDefinition};
use crate::error::{BitReaderError, EncodeError};
use crate::protocol::transport::fast_packet::assembler::CompletedMessage;

/// Turn a complete payload into a `DecodedMessage`.
///
/// Without a catalog entry the message keeps its raw payload and carries no
/// named fields: unknown PGNs stay observable downstream.
pub fn decode(message: CompletedMessage, definition: Option<&PgnDefinition>) -> DecodedMessage {
    let (name, fields) = match definition {
        Some(def) => (Some(def.name.clone()), decode_fields(&message.payload, def)),
        None => (None, Vec::new()),
    };

    DecodedMessage {
        pgn: message.pgn,
        name,
        source: message.source,
        destination: message.destination,
        priority: message.priority,
        timestamp: message.timestamp,
        fields,
        payload: message.payload,
    }
}

/// Walk the definition's field list in order, then append repetitions of the
/// trailing group while whole repetitions remain in the payload.
///
/// Fields that do not fit in the payload are omitted; a partial trailing
/// repetition is dropped.
pub fn decode_fields(payload: &[u8], definition: &PgnDefinition) -> Vec<DecodedField> {
    let mut reader = BitReader::new(payload);
    let mut fields = Vec::with_capacity(definition.fields.len());

    for field in &definition.fields {
        push_field(&mut reader, field, 0, definition.pgn, &mut fields);
    }

    // ==================== Repeating group expansion ====================
    if let Some((start, end)) = definition.repeating_span() {
        let span = (end - start) as usize;
        let available = reader.len_bits();
        let mut shift = span;

        while end as usize + shift <= available {
            for field in definition.repeating_template() {
                push_field(&mut reader, field, shift, definition.pgn, &mut fields);
            }
            shift += span;
        }
    }

    fields
}

fn push_field(
    reader: &mut BitReader,
    field: &FieldDefinition,
    shift: usize,
    pgn: u32,
    out: &mut Vec<DecodedField>,
) {
    match read_field(reader, field, shift) {
        Ok(Some(value)) => out.push(DecodedField {
            name: field.name.clone(),
            value,
        }),
        Ok(None) => {}
        Err(err) => trace!(pgn, field = %field.name, %err, "field outside payload, skipped"),
    }
}

/// Read a single field located `shift` bits after its catalog offset.
fn read_field(
    reader: &mut BitReader,
    field: &FieldDefinition,
    shift: usize,
) -> Result<Option<FieldValue>, BitReaderError> {
    let start = field.bit_offset as usize + shift;

    match field.kind {
        FieldKind::Reserved => Ok(None),

        FieldKind::Number => {
            reader.seek(start)?;
            let raw = reader.read_u64(field.bit_length)?;
            Ok(Some(number_value(raw, field)))
        }

        FieldKind::Binary => {
            reader.seek(start)?;
            let bytes = reader.read_slice(field.bit_length as usize / 8)?;
            Ok(Some(FieldValue::Bytes(bytes.to_vec())))
        }

        FieldKind::StringFix => {
            reader.seek(start)?;
            let bytes = reader.read_slice(field.bit_length as usize / 8)?;
            Ok(Some(FieldValue::Text(trim_padding(bytes))))
        }
    }
}

/// Scale the raw integer, then let the enumeration override it when the code is known.
fn number_value(raw: u64, field: &FieldDefinition) -> FieldValue {
    if let Some(label) = field.enum_mapping.as_ref().and_then(|m| m.get(&raw)) {
        return FieldValue::Lookup {
            code: raw,
            label: label.clone(),
        };
    }

    if field.signed {
        let value = sign_extend(raw, field.bit_length);
        if field.is_unscaled() {
            FieldValue::Signed(value)
        } else {
            FieldValue::Float(value as f64 * field.resolution + field.offset)
        }
    } else if field.is_unscaled() {
        FieldValue::Unsigned(raw)
    } else {
        FieldValue::Float(raw as f64 * field.resolution + field.offset)
    }
}

/// Fixed strings are padded with 0xFF, NUL or '@' (and sometimes spaces).
fn trim_padding(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|b| !matches!(b, 0xFF | 0x00 | b'@' | b' '))
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

//==================================================================================ENCODE

/// Build a payload from named values (inverse of [`decode_fields`] for the fixed
/// layout).
///
/// The buffer is sized to the declared length and pre-filled with `0xFF`, so
/// reserved bits and fields without a value read back as "not available".
pub fn encode_fields(
    values: &[DecodedField],
    definition: &PgnDefinition,
) -> Result<Vec<u8>, EncodeError> {
    let layout_len = definition
        .fields
        .iter()
        .map(|f| f.end_bit().div_ceil(8) as usize)
        .max()
        .unwrap_or(0);
    let mut buffer = vec![0xFF; definition.length.max(layout_len)];

    {
        let mut writer = BitWriter::new(&mut buffer);
        for field in &definition.fields {
            if field.kind == FieldKind::Reserved {
                continue;
            }
            let Some(value) = values.iter().find(|v| v.name == field.name) else {
                continue;
            };
            writer.seek(field.bit_offset as usize)?;
            write_field(&mut writer, field, &value.value)?;
        }
    }

    Ok(buffer)
}

fn write_field(
    writer: &mut BitWriter,
    field: &FieldDefinition,
    value: &FieldValue,
) -> Result<(), EncodeError> {
    let mismatch = || EncodeError::ValueMismatch {
        field: field.name.clone(),
    };

    match field.kind {
        FieldKind::Reserved => Ok(()),

        FieldKind::Number => {
            let raw = match value {
                FieldValue::Lookup { code, .. } => *code,
                FieldValue::Unsigned(v) if field.is_unscaled() => *v,
                FieldValue::Signed(v) if field.is_unscaled() => *v as u64,
                FieldValue::Unsigned(v) => unscale(*v as f64, field),
                FieldValue::Signed(v) => unscale(*v as f64, field),
                FieldValue::Float(v) => unscale(*v, field),
                FieldValue::Bytes(_) | FieldValue::Text(_) => return Err(mismatch()),
            };
            writer.write_u64(raw, field.bit_length)?;
            Ok(())
        }

        FieldKind::Binary => match value {
            FieldValue::Bytes(bytes) if bytes.len() == field.bit_length as usize / 8 => {
                writer.write_slice(bytes)?;
                Ok(())
            }
            _ => Err(mismatch()),
        },

        FieldKind::StringFix => match value {
            FieldValue::Text(text) if text.len() <= field.bit_length as usize / 8 => {
                let mut bytes = vec![0xFF; field.bit_length as usize / 8];
                bytes[..text.len()].copy_from_slice(text.as_bytes());
                writer.write_slice(&bytes)?;
                Ok(())
            }
            _ => Err(mismatch()),
        },
    }
}

/// Inverse of `raw * resolution + offset`, in two's complement for negatives.
fn unscale(value: f64, field: &FieldDefinition) -> u64 {
    ((value - field.offset) / field.resolution).round() as i64 as u64
}
