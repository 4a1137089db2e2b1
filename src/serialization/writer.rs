//! Cursor-advancing binary writer.

use super::{
    with_byte_order, BinaryEncode, BinaryInteger, CodecError, Endianness, PlainData,
};

/// Destination for a [`BinaryWriter`].
///
/// `advance` reserves the next `len` bytes and moves the cursor past them. It must not move the
/// cursor when it fails.
pub trait ByteSink {
    /// Reserves the next `len` bytes.
    fn advance(&mut self, len: usize) -> Result<&mut [u8], CodecError>;

    /// Current cursor position.
    fn position(&self) -> usize;
}

/// A fixed-size destination with an externally owned cursor.
#[derive(Debug)]
pub struct SpanSink<'a> {
    buffer: &'a mut [u8],
    offset: &'a mut usize,
}

impl<'a> SpanSink<'a> {
    /// Wraps `buffer`, writing from `*offset` onwards.
    pub fn new(buffer: &'a mut [u8], offset: &'a mut usize) -> Self {
        Self { buffer, offset }
    }
}

impl ByteSink for SpanSink<'_> {
    fn advance(&mut self, len: usize) -> Result<&mut [u8], CodecError> {
        let provided = self.buffer.len();
        let start = *self.offset;
        let end = start.checked_add(len).ok_or(CodecError::BufferTooSmall {
            required: usize::MAX,
            provided,
        })?;
        let window = self
            .buffer
            .get_mut(start..end)
            .ok_or(CodecError::BufferTooSmall {
                required: end,
                provided,
            })?;
        *self.offset = end;
        Ok(window)
    }

    fn position(&self) -> usize {
        *self.offset
    }
}

/// A growable destination that appends to a `Vec<u8>`.
#[derive(Debug)]
pub struct VecSink<'a> {
    buffer: &'a mut Vec<u8>,
}

impl<'a> VecSink<'a> {
    /// Wraps `buffer`, appending after its current contents.
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        Self { buffer }
    }
}

impl ByteSink for VecSink<'_> {
    fn advance(&mut self, len: usize) -> Result<&mut [u8], CodecError> {
        let start = self.buffer.len();
        self.buffer.resize(start + len, 0);
        Ok(&mut self.buffer[start..])
    }

    fn position(&self) -> usize {
        self.buffer.len()
    }
}

/// Writes fixed-size values in a chosen byte order.
///
/// Every write either succeeds and advances the cursor by exactly the value's size, or fails
/// without touching the cursor. Composite values written with `?` therefore stop at the first
/// field that does not fit.
#[derive(Debug)]
pub struct BinaryWriter<S> {
    sink: S,
    endianness: Endianness,
    start: usize,
}

/// Writer over a fixed-size byte span.
pub type BinarySpanWriter<'a> = BinaryWriter<SpanSink<'a>>;

/// Writer appending to a growable buffer.
pub type BinaryBufferWriter<'a> = BinaryWriter<VecSink<'a>>;

impl<'a> BinaryWriter<SpanSink<'a>> {
    /// Creates a writer over `buffer` starting at `*offset`.
    pub fn new(buffer: &'a mut [u8], offset: &'a mut usize, endianness: Endianness) -> Self {
        Self::with_sink(SpanSink::new(buffer, offset), endianness)
    }
}

impl<'a> BinaryWriter<VecSink<'a>> {
    /// Creates a writer appending to `buffer`.
    pub fn new(buffer: &'a mut Vec<u8>, endianness: Endianness) -> Self {
        Self::with_sink(VecSink::new(buffer), endianness)
    }
}

macro_rules! write_ordered {
    ($($(#[$meta:meta])* $name:ident: $ty:ty;)*) => {
        $(
            $(#[$meta])*
            #[inline]
            pub fn $name(&mut self, value: $ty) -> Result<(), CodecError> {
                let endianness = self.endianness;
                let dst = self.sink.advance(std::mem::size_of::<$ty>())?;
                with_byte_order!(endianness, $name(dst, value));
                Ok(())
            }
        )*
    };
}

impl<S: ByteSink> BinaryWriter<S> {
    /// Creates a writer over any sink.
    pub fn with_sink(sink: S, endianness: Endianness) -> Self {
        let start = sink.position();
        Self {
            sink,
            endianness,
            start,
        }
    }

    /// Byte order used by this writer.
    #[must_use]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Current cursor position.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.sink.position()
    }

    /// Bytes written since the writer was created.
    #[must_use]
    pub fn written(&self) -> usize {
        self.sink.position() - self.start
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        let dst = self.sink.advance(1)?;
        dst[0] = value;
        Ok(())
    }

    /// Writes a single signed byte.
    #[inline]
    pub fn write_i8(&mut self, value: i8) -> Result<(), CodecError> {
        self.write_u8(value as u8)
    }

    write_ordered! {
        /// Writes a `u16`.
        write_u16: u16;
        /// Writes a `u32`.
        write_u32: u32;
        /// Writes a `u64`.
        write_u64: u64;
        /// Writes a `u128`.
        write_u128: u128;
        /// Writes an `i16`.
        write_i16: i16;
        /// Writes an `i32`.
        write_i32: i32;
        /// Writes an `i64`.
        write_i64: i64;
        /// Writes an `i128`.
        write_i128: i128;
        /// Writes an `f32` as its IEEE 754 bits.
        write_f32: f32;
        /// Writes an `f64` as its IEEE 754 bits.
        write_f64: f64;
    }

    /// Writes a `bool` as one byte (`0` or `1`).
    #[inline]
    pub fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.write_u8(u8::from(value))
    }

    /// Writes a `char` as its 4-byte scalar value.
    #[inline]
    pub fn write_char(&mut self, value: char) -> Result<(), CodecError> {
        self.write_u32(u32::from(value))
    }

    /// Writes a half-precision float as its 16 bits.
    #[inline]
    pub fn write_f16(&mut self, value: half::f16) -> Result<(), CodecError> {
        self.write_u16(value.to_bits())
    }

    /// Writes any fixed-width integer at its natural width.
    pub fn write_integer<T: BinaryInteger>(&mut self, value: T) -> Result<(), CodecError> {
        self.write_uint(value.to_bits(), T::SIZE)
    }

    /// Writes the low `nbytes` bytes of `value`.
    ///
    /// Fails with [`CodecError::InvalidValue`] if `nbytes` is not in `1..=16` or the value does
    /// not fit.
    pub fn write_uint(&mut self, value: u128, nbytes: usize) -> Result<(), CodecError> {
        if !(1..=16).contains(&nbytes) || (nbytes < 16 && value >> (nbytes * 8) != 0) {
            return Err(CodecError::invalid("uint width", nbytes as i64));
        }
        let endianness = self.endianness;
        let dst = self.sink.advance(nbytes)?;
        with_byte_order!(endianness, write_uint128(dst, value, nbytes));
        Ok(())
    }

    /// Writes a value through its [`BinaryEncode`] impl.
    #[inline]
    pub fn write<T: BinaryEncode + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        value.encode(self)
    }

    /// Copies raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.sink.advance(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Writes `len` zero bytes.
    pub fn write_zeros(&mut self, len: usize) -> Result<(), CodecError> {
        self.sink.advance(len)?.fill(0);
        Ok(())
    }

    /// Writes the raw byte image of a plain-data value, with no byte order conversion.
    pub fn write_struct<T: PlainData>(&mut self, value: &T) -> Result<(), CodecError> {
        self.write_bytes(bytemuck::bytes_of(value))
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
    fn span_writer_advances_cursor() {
        let mut buffer = [0u8; 8];
        let mut offset = 1;
        let mut writer = BinarySpanWriter::new(&mut buffer, &mut offset, Endianness::Little);
        writer.write_u16(0x0201).unwrap();
        writer.write_u8(3).unwrap();
        assert_eq!(writer.written(), 3);
        assert_eq!(writer.offset(), 4);
        assert_eq!(offset, 4);
        assert_eq!(buffer[..4], [0, 1, 2, 3]);
    }

    #[test]
    fn failed_write_leaves_cursor_in_place() {
        let mut buffer = [0u8; 5];
        let mut offset = 0;
        let mut writer = BinarySpanWriter::new(&mut buffer, &mut offset, Endianness::Big);
        writer.write_u32(7).unwrap();
        let err = writer.write_u16(1).unwrap_err();
        assert_eq!(
            err,
            CodecError::BufferTooSmall {
                required: 6,
                provided: 5
            }
        );
        assert_eq!(writer.offset(), 4);
        writer.write_u8(9).unwrap();
        assert_eq!(offset, 5);
        assert_eq!(buffer, [0, 0, 0, 7, 9]);
    }

    #[test]
    fn buffer_writer_appends() {
        let mut buffer = vec![0xAA];
        let mut writer = BinaryBufferWriter::new(&mut buffer, Endianness::Big);
        writer.write_i16(-2).unwrap();
        writer.write_bool(true).unwrap();
        assert_eq!(writer.written(), 3);
        assert_eq!(buffer, vec![0xAA, 0xFF, 0xFE, 1]);
    }

    #[test]
    fn write_zeros_overwrites_stale_bytes() {
        let mut buffer = [0xFFu8; 4];
        let mut offset = 1;
        BinarySpanWriter::new(&mut buffer, &mut offset, Endianness::Little)
            .write_zeros(2)
            .unwrap();
        assert_eq!(buffer, [0xFF, 0, 0, 0xFF]);
        assert_eq!(offset, 3);
    }

    #[test]
    fn write_uint_respects_width() {
        let mut buffer = Vec::new();
        let mut writer = BinaryBufferWriter::new(&mut buffer, Endianness::Big);
        writer.write_uint(0x01_0203, 3).unwrap();
        assert!(matches!(
            writer.write_uint(0x1_0000, 2),
            Err(CodecError::InvalidValue { .. })
        ));
        assert!(writer.write_uint(1, 0).is_err());
        assert_eq!(buffer, vec![1, 2, 3]);
    }

    #[test]
    fn write_integer_signed_uses_twos_complement() {
        let mut buffer = Vec::new();
        let mut writer = BinaryBufferWriter::new(&mut buffer, Endianness::Little);
        writer.write_integer(-1i16).unwrap();
        writer.write_integer(i128::MIN).unwrap();
        assert_eq!(buffer.len(), 18);
        assert_eq!(buffer[..2], [0xFF, 0xFF]);
        assert_eq!(buffer[17], 0x80);
    }

    #[test]
    fn char_and_f16() {
        let mut buffer = Vec::new();
        let mut writer = BinaryBufferWriter::new(&mut buffer, Endianness::Big);
        writer.write_char('A').unwrap();
        writer.write_f16(half::f16::ONE).unwrap();
        assert_eq!(buffer, vec![0, 0, 0, 0x41, 0x3C, 0x00]);
    }
}
