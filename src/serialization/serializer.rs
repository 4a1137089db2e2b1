//! Serializer strategies that bind a game input type to a wire layout.

use std::fmt;
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use super::{
    codec, BinaryDecode, BinaryEncode, BinaryInteger, BinaryReader, BinarySpanWriter,
    CodecError, Endianness, FixedSize, PlainData,
};

/// Encodes and decodes a `T` at a fixed size.
///
/// Implementations must write exactly [`size`](Self::size) bytes for every value; the input
/// pipeline relies on it to lay records out at a fixed stride.
pub trait BinarySerializer<T>: Send + Sync {
    /// Encoded size of any `T`.
    fn size(&self) -> usize;

    /// Writes `value` at the start of `dst` and returns the bytes written.
    fn serialize(
        &self,
        value: &T,
        endianness: Endianness,
        dst: &mut [u8],
    ) -> Result<usize, CodecError>;

    /// Reads from the start of `src` into `value` and returns the bytes read.
    fn deserialize(
        &self,
        src: &[u8],
        endianness: Endianness,
        value: &mut T,
    ) -> Result<usize, CodecError>;
}

macro_rules! stateless_serializer {
    ($(#[$meta:meta])* $name:ident<$param:ident: $($bound:path),+>) => {
        $(#[$meta])*
        pub struct $name<$param>(PhantomData<fn() -> $param>);

        impl<$param> $name<$param> {
            /// Creates the serializer.
            #[must_use]
            pub const fn new() -> Self {
                Self(PhantomData)
            }
        }

        impl<$param> Default for $name<$param> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<$param> Clone for $name<$param> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<$param> Copy for $name<$param> {}

        impl<$param> fmt::Debug for $name<$param> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}<{}>", stringify!($name), std::any::type_name::<$param>())
            }
        }
    };
}

stateless_serializer! {
    /// Writes a primitive integer at its natural width in the session byte order.
    IntegerSerializer<T: BinaryInteger>
}

stateless_serializer! {
    /// Copies the raw byte image of a [`PlainData`] value. Byte order is ignored.
    PlainDataSerializer<T: PlainData>
}

stateless_serializer! {
    /// Delegates to the type's own [`BinaryEncode`] / [`BinaryDecode`] impls.
    EncodableSerializer<T: FixedSize>
}

stateless_serializer! {
    /// Encodes any serde type with bincode's fixed-size integer encoding.
    ///
    /// The size is taken from `T::default()`, so `T` must not contain variable-length data
    /// (strings, vectors, maps, enums with payloads of different sizes).
    SerdeSerializer<T: Serialize>
}

impl<T: BinaryInteger> BinarySerializer<T> for IntegerSerializer<T> {
    fn size(&self) -> usize {
        T::SIZE
    }

    fn serialize(
        &self,
        value: &T,
        endianness: Endianness,
        dst: &mut [u8],
    ) -> Result<usize, CodecError> {
        let mut offset = 0;
        BinarySpanWriter::new(dst, &mut offset, endianness).write_integer(*value)?;
        Ok(offset)
    }

    fn deserialize(
        &self,
        src: &[u8],
        endianness: Endianness,
        value: &mut T,
    ) -> Result<usize, CodecError> {
        let mut offset = 0;
        *value = BinaryReader::new(src, &mut offset, endianness).read_integer()?;
        Ok(offset)
    }
}

impl<T: PlainData> BinarySerializer<T> for PlainDataSerializer<T> {
    fn size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn serialize(
        &self,
        value: &T,
        endianness: Endianness,
        dst: &mut [u8],
    ) -> Result<usize, CodecError> {
        let mut offset = 0;
        BinarySpanWriter::new(dst, &mut offset, endianness).write_struct(value)?;
        Ok(offset)
    }

    fn deserialize(
        &self,
        src: &[u8],
        endianness: Endianness,
        value: &mut T,
    ) -> Result<usize, CodecError> {
        let mut offset = 0;
        *value = BinaryReader::new(src, &mut offset, endianness).read_struct()?;
        Ok(offset)
    }
}

impl<T> BinarySerializer<T> for EncodableSerializer<T>
where
    T: FixedSize + BinaryEncode + BinaryDecode,
{
    fn size(&self) -> usize {
        T::SIZE
    }

    fn serialize(
        &self,
        value: &T,
        endianness: Endianness,
        dst: &mut [u8],
    ) -> Result<usize, CodecError> {
        let mut offset = 0;
        BinarySpanWriter::new(dst, &mut offset, endianness).write(value)?;
        Ok(offset)
    }

    fn deserialize(
        &self,
        src: &[u8],
        endianness: Endianness,
        value: &mut T,
    ) -> Result<usize, CodecError> {
        let mut offset = 0;
        BinaryReader::new(src, &mut offset, endianness).read_into(value)?;
        Ok(offset)
    }
}

impl<T> BinarySerializer<T> for SerdeSerializer<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn size(&self) -> usize {
        codec::encode(&T::default()).map_or(0, |bytes| bytes.len())
    }

    fn serialize(
        &self,
        value: &T,
        endianness: Endianness,
        dst: &mut [u8],
    ) -> Result<usize, CodecError> {
        codec::encode_into_with(value, dst, endianness)
    }

    fn deserialize(
        &self,
        src: &[u8],
        endianness: Endianness,
        value: &mut T,
    ) -> Result<usize, CodecError> {
        let (decoded, read) = codec::decode_with(src, endianness)?;
        *value = decoded;
        Ok(read)
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
    use serde::Deserialize;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct RawPad {
        buttons: u8,
        trigger: u8,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct SerdePad {
        buttons: u16,
        x: i8,
    }

    fn roundtrip<T: Default + PartialEq + fmt::Debug>(
        serializer: &dyn BinarySerializer<T>,
        value: &T,
        endianness: Endianness,
    ) -> Vec<u8> {
        let mut bytes = vec![0u8; serializer.size()];
        let written = serializer.serialize(value, endianness, &mut bytes).unwrap();
        assert_eq!(written, serializer.size());
        let mut decoded = T::default();
        let read = serializer
            .deserialize(&bytes, endianness, &mut decoded)
            .unwrap();
        assert_eq!(read, written);
        assert_eq!(&decoded, value);
        bytes
    }

    #[test]
    fn integer_serializer_follows_byte_order() {
        let big = roundtrip(&IntegerSerializer::<u16>::new(), &0x0102, Endianness::Big);
        let little = roundtrip(&IntegerSerializer::<u16>::new(), &0x0102, Endianness::Little);
        assert_eq!(big, vec![1, 2]);
        assert_eq!(little, vec![2, 1]);
    }

    #[test]
    fn plain_data_serializer_ignores_byte_order() {
        let pad = RawPad {
            buttons: 0x0F,
            trigger: 200,
        };
        let serializer = PlainDataSerializer::<RawPad>::new();
        assert_eq!(serializer.size(), 2);
        let big = roundtrip(&serializer, &pad, Endianness::Big);
        let little = roundtrip(&serializer, &pad, Endianness::Little);
        assert_eq!(big, little);
    }

    #[test]
    fn encodable_serializer_uses_fixed_size() {
        let serializer = EncodableSerializer::<[i16; 2]>::new();
        assert_eq!(serializer.size(), 4);
        let bytes = roundtrip(&serializer, &[-1, 2], Endianness::Big);
        assert_eq!(bytes, vec![0xFF, 0xFF, 0, 2]);
    }

    #[test]
    fn serde_serializer_size_matches_encoding() {
        let serializer = SerdeSerializer::<SerdePad>::new();
        assert_eq!(serializer.size(), 3);
        let bytes = roundtrip(
            &serializer,
            &SerdePad {
                buttons: 0x0A0B,
                x: -3,
            },
            Endianness::Big,
        );
        assert_eq!(bytes[..2], [0x0A, 0x0B]);
    }

    #[test]
    fn serializers_reject_short_buffers() {
        let mut small = [0u8; 1];
        let err = IntegerSerializer::<u32>::new()
            .serialize(&5, Endianness::Big, &mut small)
            .unwrap_err();
        assert!(matches!(err, CodecError::BufferTooSmall { .. }));

        let mut value = 0u32;
        let err = IntegerSerializer::<u32>::new()
            .deserialize(&small, Endianness::Big, &mut value)
            .unwrap_err();
        assert!(matches!(err, CodecError::TruncatedData { .. }));
    }

    #[test]
    fn debug_names_the_type() {
        let text = format!("{:?}", IntegerSerializer::<i64>::new());
        assert_eq!(text, "IntegerSerializer<i64>");
    }
}
