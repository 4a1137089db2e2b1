//! Cursor-advancing, bounds-checked binary reader.

use super::{
    with_byte_order, BinaryDecode, BinaryInteger, CodecError, Endianness, PlainData, Signedness,
};

/// Reads fixed-size values in a chosen byte order.
///
/// The cursor lives outside the reader so that callers can interleave readers over the same
/// buffer or resume after a failed read. Reads never move the cursor on failure.
#[derive(Debug)]
pub struct BinaryReader<'a> {
    buffer: &'a [u8],
    offset: &'a mut usize,
    endianness: Endianness,
}

macro_rules! read_ordered {
    ($($(#[$meta:meta])* $name:ident -> $ty:ty;)*) => {
        $(
            $(#[$meta])*
            #[inline]
            pub fn $name(&mut self) -> Result<$ty, CodecError> {
                let src = self.take(std::mem::size_of::<$ty>())?;
                Ok(with_byte_order!(self.endianness, $name(src)))
            }
        )*
    };
}

impl<'a> BinaryReader<'a> {
    /// Creates a reader over `buffer` starting at `*offset`.
    pub fn new(buffer: &'a [u8], offset: &'a mut usize, endianness: Endianness) -> Self {
        Self {
            buffer,
            offset,
            endianness,
        }
    }

    /// Byte order used by this reader.
    #[must_use]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Current cursor position.
    #[must_use]
    pub fn offset(&self) -> usize {
        *self.offset
    }

    /// Bytes left between the cursor and the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(*self.offset)
    }

    /// Returns `true` once the cursor has reached the end of the buffer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let available = self.remaining();
        if len > available {
            return Err(CodecError::TruncatedData {
                required: len,
                available,
            });
        }
        let start = *self.offset;
        let buffer: &'a [u8] = self.buffer;
        *self.offset = start + len;
        Ok(&buffer[start..start + len])
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Reads one signed byte.
    #[inline]
    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.read_u8()? as i8)
    }

    read_ordered! {
        /// Reads a `u16`.
        read_u16 -> u16;
        /// Reads a `u32`.
        read_u32 -> u32;
        /// Reads a `u64`.
        read_u64 -> u64;
        /// Reads a `u128`.
        read_u128 -> u128;
        /// Reads an `i16`.
        read_i16 -> i16;
        /// Reads an `i32`.
        read_i32 -> i32;
        /// Reads an `i64`.
        read_i64 -> i64;
        /// Reads an `i128`.
        read_i128 -> i128;
        /// Reads an `f32`. NaN payloads are preserved bit for bit.
        read_f32 -> f32;
        /// Reads an `f64`. NaN payloads are preserved bit for bit.
        read_f64 -> f64;
    }

    /// Reads a `bool`. Any nonzero byte is `true`.
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a `char` from its 4-byte scalar value.
    pub fn read_char(&mut self) -> Result<char, CodecError> {
        let raw = self.read_u32()?;
        char::from_u32(raw).ok_or(CodecError::invalid("char", raw as i64))
    }

    /// Reads a half-precision float from its 16 bits.
    #[inline]
    pub fn read_f16(&mut self) -> Result<half::f16, CodecError> {
        Ok(half::f16::from_bits(self.read_u16()?))
    }

    /// Reads any fixed-width integer at its natural width.
    pub fn read_integer<T: BinaryInteger>(&mut self) -> Result<T, CodecError> {
        Ok(T::from_bits(self.read_uint(T::SIZE)?))
    }

    /// Reads an `nbytes`-wide integer and widens it to `T` using `signedness`.
    ///
    /// Use [`Signedness::Unsigned`] for unsigned wire values: sign-extending them corrupts every
    /// value with the top bit set.
    pub fn read_integer_as<T: BinaryInteger>(
        &mut self,
        nbytes: usize,
        signedness: Signedness,
    ) -> Result<T, CodecError> {
        if nbytes > T::SIZE {
            return Err(CodecError::invalid("integer width", nbytes as i64));
        }
        let bits = match signedness {
            Signedness::Unsigned => self.read_uint(nbytes)?,
            Signedness::Signed => self.read_int(nbytes)? as u128,
        };
        Ok(T::from_bits(bits))
    }

    /// Reads an `nbytes`-wide unsigned integer, zero-extended.
    pub fn read_uint(&mut self, nbytes: usize) -> Result<u128, CodecError> {
        if !(1..=16).contains(&nbytes) {
            return Err(CodecError::invalid("uint width", nbytes as i64));
        }
        let src = self.take(nbytes)?;
        Ok(with_byte_order!(self.endianness, read_uint128(src, nbytes)))
    }

    /// Reads an `nbytes`-wide signed integer, sign-extended.
    pub fn read_int(&mut self, nbytes: usize) -> Result<i128, CodecError> {
        if !(1..=16).contains(&nbytes) {
            return Err(CodecError::invalid("int width", nbytes as i64));
        }
        let src = self.take(nbytes)?;
        Ok(with_byte_order!(self.endianness, read_int128(src, nbytes)))
    }

    /// Reads a value through its [`BinaryDecode`] impl.
    #[inline]
    pub fn read<T: BinaryDecode>(&mut self) -> Result<T, CodecError> {
        T::decode(self)
    }

    /// Reads into an existing slot, leaving it untouched on failure.
    #[inline]
    pub fn read_into<T: BinaryDecode>(&mut self, slot: &mut T) -> Result<(), CodecError> {
        slot.decode_into(self)
    }

    /// Borrows the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }

    /// Moves the cursor forward by `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        self.take(len).map(|_| ())
    }

    /// Reads the raw byte image of a plain-data value, with no byte order conversion.
    pub fn read_struct<T: PlainData>(&mut self) -> Result<T, CodecError> {
        let src = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(src))
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn reads_in_both_orders() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        let mut offset = 0;
        assert_eq!(
            BinaryReader::new(&bytes, &mut offset, Endianness::Big)
                .read_u32()
                .unwrap(),
            0x0102_0304
        );
        offset = 0;
        assert_eq!(
            BinaryReader::new(&bytes, &mut offset, Endianness::Little)
                .read_u32()
                .unwrap(),
            0x0403_0201
        );
        assert_eq!(offset, 4);
    }

    #[test]
    fn truncated_read_keeps_cursor() {
        let bytes = [0u8; 3];
        let mut offset = 1;
        let mut reader = BinaryReader::new(&bytes, &mut offset, Endianness::Big);
        assert_eq!(
            reader.read_u32(),
            Err(CodecError::TruncatedData {
                required: 4,
                available: 2
            })
        );
        assert_eq!(reader.offset(), 1);
        assert_eq!(reader.read_u16().unwrap(), 0);
        assert!(reader.is_empty());
    }

    #[test]
    fn unsigned_values_are_not_sign_extended() {
        let bytes = [0xFF, 0xFE];
        let mut offset = 0;
        let mut reader = BinaryReader::new(&bytes, &mut offset, Endianness::Big);
        let unsigned: u32 = reader.read_integer_as(2, Signedness::Unsigned).unwrap();
        assert_eq!(unsigned, 0xFFFE);

        let mut offset = 0;
        let mut reader = BinaryReader::new(&bytes, &mut offset, Endianness::Big);
        let signed: i32 = reader.read_integer_as(2, Signedness::Signed).unwrap();
        assert_eq!(signed, -2);
    }

    #[test]
    fn read_integer_as_rejects_wider_source() {
        let bytes = [0u8; 8];
        let mut offset = 0;
        let mut reader = BinaryReader::new(&bytes, &mut offset, Endianness::Little);
        assert!(reader
            .read_integer_as::<u16>(4, Signedness::Unsigned)
            .is_err());
        assert_eq!(offset, 0);
    }

    #[test]
    fn invalid_char_is_rejected() {
        let bytes = 0xD800u32.to_be_bytes();
        let mut offset = 0;
        let mut reader = BinaryReader::new(&bytes, &mut offset, Endianness::Big);
        assert_eq!(
            reader.read_char(),
            Err(CodecError::InvalidValue {
                type_name: "char",
                value: 0xD800
            })
        );
    }

    #[test]
    fn bool_accepts_any_nonzero() {
        let bytes = [0, 1, 7];
        let mut offset = 0;
        let mut reader = BinaryReader::new(&bytes, &mut offset, Endianness::Big);
        assert!(!reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn skip_and_read_bytes() {
        let bytes = [1, 2, 3, 4, 5];
        let mut offset = 0;
        let mut reader = BinaryReader::new(&bytes, &mut offset, Endianness::Big);
        reader.skip(2).unwrap();
        assert_eq!(reader.read_bytes(2).unwrap(), &[3, 4]);
        assert_eq!(reader.remaining(), 1);
        assert!(reader.skip(2).is_err());
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn read_into_leaves_slot_on_failure() {
        let bytes = [0u8; 1];
        let mut offset = 0;
        let mut reader = BinaryReader::new(&bytes, &mut offset, Endianness::Big);
        let mut slot = 42u32;
        assert!(reader.read_into(&mut slot).is_err());
        assert_eq!(slot, 42);
    }
}
