//! Low-level components dedicated to bit manipulation for NMEA 2000 payloads.
//! Fields are packed LSB-first in little-endian order and seldom align with
//! byte boundaries; every field access in the codec engine goes through here.
use crate::error::{BitReaderError, BitWriterError};

/// Widest integer handled by a single read or write.
const MAX_BITS: u16 = 64;

/// Reinterpret the low `bits` bits of `raw` as a two's complement integer.
///
/// `bits` outside `1..=63` returns `raw` unchanged as `i64`.
pub fn sign_extend(raw: u64, bits: u16) -> i64 {
    if bits == 0 || bits >= MAX_BITS {
        return raw as i64;
    }
    let shift = MAX_BITS - bits;
    ((raw << shift) as i64) >> shift
}

/// Mask keeping the low `bits` bits.
pub fn low_mask(bits: u16) -> u64 {
    if bits >= MAX_BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Cursor-based reader extracting bit segments from a `&[u8]` without copies.
pub struct BitReader<'a> {
    buffer: &'a [u8],
    /// Bits consumed from the start of the buffer.
    bit_cursor: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.bit_cursor
    }

    pub fn len_bits(&self) -> usize {
        self.buffer.len() * 8
    }

    pub fn remaining_bits(&self) -> usize {
        self.len_bits().saturating_sub(self.bit_cursor)
    }

    /// Move the cursor to an absolute bit position (end of buffer allowed).
    pub fn seek(&mut self, bit: usize) -> Result<(), BitReaderError> {
        if bit > self.len_bits() {
            return Err(BitReaderError::OutOfBounds {
                asked: bit,
                available: self.len_bits(),
            });
        }
        self.bit_cursor = bit;
        Ok(())
    }

    /// Skip `bits` bits without reading them.
    pub fn advance(&mut self, bits: usize) -> Result<(), BitReaderError> {
        if bits > self.remaining_bits() {
            return Err(BitReaderError::OutOfBounds {
                asked: bits,
                available: self.remaining_bits(),
            });
        }
        self.bit_cursor += bits;
        Ok(())
    }

    /// Read `num_bits` (1-64) bits at the cursor as an unsigned integer.
    pub fn read_u64(&mut self, num_bits: u16) -> Result<u64, BitReaderError> {
        if !(1..=MAX_BITS).contains(&num_bits) {
            return Err(BitReaderError::TooLongForType {
                max: MAX_BITS as u8,
                asked: num_bits,
            });
        }
        let wanted = num_bits as usize;
        if wanted > self.remaining_bits() {
            return Err(BitReaderError::OutOfBounds {
                asked: wanted,
                available: self.remaining_bits(),
            });
        }

        let mut value = 0u64;
        let mut filled = 0usize;
        while filled < wanted {
            let at = self.bit_cursor + filled;
            let shift = at % 8;
            let take = (8 - shift).min(wanted - filled);
            let chunk = (self.buffer[at / 8] >> shift) as u64 & low_mask(take as u16);
            value |= chunk << filled;
            filled += take;
        }

        self.bit_cursor += wanted;
        Ok(value)
    }

    /// Read a signed integer: `read_u64` followed by sign extension.
    pub fn read_i64(&mut self, num_bits: u16) -> Result<i64, BitReaderError> {
        self.read_u64(num_bits).map(|raw| sign_extend(raw, num_bits))
    }

    /// Borrow `len` bytes at the cursor. The cursor must sit on a byte boundary.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], BitReaderError> {
        if self.bit_cursor % 8 != 0 {
            return Err(BitReaderError::NonAlignedBit {
                cursor: self.bit_cursor,
            });
        }
        let start = self.bit_cursor / 8;
        let end = start + len;
        if end > self.buffer.len() {
            return Err(BitReaderError::OutOfBounds {
                asked: len * 8,
                available: self.remaining_bits(),
            });
        }
        self.bit_cursor = end * 8;
        Ok(&self.buffer[start..end])
    }
}

//==================================================================================BITWRITER

/// Cursor-based writer laying bit segments into a `&mut [u8]`. Bits outside the
/// written range are left untouched.
pub struct BitWriter<'a> {
    buffer: &'a mut [u8],
    bit_cursor: usize,
}

impl<'a> BitWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.bit_cursor
    }

    fn remaining_bits(&self) -> usize {
        (self.buffer.len() * 8).saturating_sub(self.bit_cursor)
    }

    pub fn seek(&mut self, bit: usize) -> Result<(), BitWriterError> {
        let len_bits = self.buffer.len() * 8;
        if bit > len_bits {
            return Err(BitWriterError::OutOfBounds {
                asked: bit,
                available: len_bits,
            });
        }
        self.bit_cursor = bit;
        Ok(())
    }

    /// Write the low `num_bits` (1-64) bits of `value` at the cursor.
    pub fn write_u64(&mut self, value: u64, num_bits: u16) -> Result<(), BitWriterError> {
        if !(1..=MAX_BITS).contains(&num_bits) {
            return Err(BitWriterError::TooLongForType {
                max: MAX_BITS as u8,
                asked: num_bits,
            });
        }
        let wanted = num_bits as usize;
        if wanted > self.remaining_bits() {
            return Err(BitWriterError::OutOfBounds {
                asked: wanted,
                available: self.remaining_bits(),
            });
        }

        let mut rest = value;
        let mut written = 0usize;
        while written < wanted {
            let at = self.bit_cursor + written;
            let shift = at % 8;
            let take = (8 - shift).min(wanted - written);
            let mask = (low_mask(take as u16) as u8) << shift;
            let byte = &mut self.buffer[at / 8];
            *byte = (*byte & !mask) | (((rest as u8) << shift) & mask);
            rest >>= take;
            written += take;
        }

        self.bit_cursor += wanted;
        Ok(())
    }

    /// Copy an already byte-aligned slice at the cursor.
    pub fn write_slice(&mut self, slice: &[u8]) -> Result<(), BitWriterError> {
        if self.bit_cursor % 8 != 0 {
            return Err(BitWriterError::NonAlignedBit {
                cursor: self.bit_cursor,
            });
        }
        let start = self.bit_cursor / 8;
        let end = start + slice.len();
        if end > self.buffer.len() {
            return Err(BitWriterError::OutOfBounds {
                asked: slice.len() * 8,
                available: self.remaining_bits(),
            });
        }
        self.buffer[start..end].copy_from_slice(slice);
        self.bit_cursor = end * 8;
        Ok(())
    }
}
