//! Fixed-layout binary codec.
//!
//! Every protocol message, confirmed-input record and saved state goes through this module.
//! Values are written at a fixed size chosen by their type, in the byte order selected for the
//! session ([`Endianness`]). Nothing is length-prefixed or tagged: both ends must agree on the
//! layout up front.
//!
//! The building blocks are:
//!
//! - [`BinaryWriter`] over a fixed span ([`BinarySpanWriter`]) or a growable buffer
//!   ([`BinaryBufferWriter`]), advancing a caller-owned cursor.
//! - [`BinaryReader`] over a byte slice, advancing a caller-owned cursor. Every read is bounds
//!   checked and fails with [`CodecError::TruncatedData`].
//! - [`FixedSize`], [`BinaryEncode`] and [`BinaryDecode`], implemented for integers, floats,
//!   `bool`, `char`, [`half::f16`], `glam` vectors and quaternions, [`uuid::Uuid`], `chrono`
//!   instants/dates/offsets, the frame types and fixed arrays of any of these.
//! - [`PlainData`] for raw byte images of `#[repr(C)]` structs that derive [`bytemuck::Pod`].
//! - [`BinarySerializer`] strategy objects binding a game's input type to one of the above.
//!
//! # Examples
//!
//! ```
//! use rampart::serialization::{BinaryReader, BinarySpanWriter, Endianness};
//!
//! let mut buffer = [0u8; 6];
//! let mut offset = 0;
//! let mut writer = BinarySpanWriter::new(&mut buffer, &mut offset, Endianness::Big);
//! writer.write_u16(0xBEEF).unwrap();
//! writer.write_i32(-2).unwrap();
//! assert_eq!(offset, 6);
//! assert_eq!(buffer[..2], [0xBE, 0xEF]);
//!
//! let mut cursor = 0;
//! let mut reader = BinaryReader::new(&buffer, &mut cursor, Endianness::Big);
//! assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
//! assert_eq!(reader.read_i32().unwrap(), -2);
//! ```

pub mod codec;
mod endianness;
mod plain;
mod primitives;
mod reader;
mod serializer;
mod temporal;
mod vectors;
mod writer;

pub use codec::{CodecError, CodecOperation, CodecResult};
pub use endianness::{BinaryInteger, Endianness, Signedness};
pub(crate) use endianness::with_byte_order;
pub use plain::PlainData;
pub use reader::BinaryReader;
pub use serializer::{
    BinarySerializer, EncodableSerializer, IntegerSerializer, PlainDataSerializer,
    SerdeSerializer,
};
pub use writer::{BinaryBufferWriter, BinarySpanWriter, BinaryWriter, ByteSink, SpanSink, VecSink};

/// A type whose wire representation always occupies the same number of bytes.
pub trait FixedSize {
    /// Encoded size in bytes.
    const SIZE: usize;
}

/// Writes a value field by field through a [`BinaryWriter`].
///
/// Implementations must write exactly [`FixedSize::SIZE`] bytes when the type is also
/// [`FixedSize`], and must propagate the first failing field with `?` so the cursor never moves
/// past a field that was not written.
pub trait BinaryEncode {
    /// Encodes `self` at the writer's current position.
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError>;
}

/// Reads a value field by field through a [`BinaryReader`], in the same order it was encoded.
pub trait BinaryDecode: Sized {
    /// Decodes a value at the reader's current position.
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError>;

    /// Decodes into an existing slot.
    ///
    /// On failure the slot is left unchanged.
    fn decode_into(&mut self, reader: &mut BinaryReader<'_>) -> Result<(), CodecError> {
        *self = Self::decode(reader)?;
        Ok(())
    }
}

/// Encodes `value` at `offset` in `buffer`, advancing `offset` by the bytes written.
pub fn encode_at<T: BinaryEncode>(
    value: &T,
    buffer: &mut [u8],
    offset: &mut usize,
    endianness: Endianness,
) -> Result<(), CodecError> {
    BinarySpanWriter::new(buffer, offset, endianness).write(value)
}

/// Decodes a `T` at `offset` in `buffer`, advancing `offset` by the bytes read.
pub fn decode_at<T: BinaryDecode>(
    buffer: &[u8],
    offset: &mut usize,
    endianness: Endianness,
) -> Result<T, CodecError> {
    BinaryReader::new(buffer, offset, endianness).read()
}
