//! Wire encodings for scalars, identifiers, frames and fixed arrays.

use uuid::Uuid;

use super::{BinaryDecode, BinaryEncode, BinaryReader, BinaryWriter, ByteSink, CodecError, Endianness, FixedSize};
use crate::Frame;

macro_rules! impl_scalar {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl FixedSize for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
            }

            impl BinaryEncode for $ty {
                #[inline]
                fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
                    writer.$write(*self)
                }
            }

            impl BinaryDecode for $ty {
                #[inline]
                fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
                    reader.$read()
                }
            }
        )*
    };
}

impl_scalar! {
    u8 => write_u8, read_u8;
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    u128 => write_u128, read_u128;
    i8 => write_i8, read_i8;
    i16 => write_i16, read_i16;
    i32 => write_i32, read_i32;
    i64 => write_i64, read_i64;
    i128 => write_i128, read_i128;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
    half::f16 => write_f16, read_f16;
}

impl FixedSize for bool {
    const SIZE: usize = 1;
}

impl BinaryEncode for bool {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_bool(*self)
    }
}

impl BinaryDecode for bool {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        reader.read_bool()
    }
}

impl FixedSize for char {
    const SIZE: usize = 4;
}

impl BinaryEncode for char {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_char(*self)
    }
}

impl BinaryDecode for char {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        reader.read_char()
    }
}

// UUIDs keep their RFC 4122 byte layout in big-endian sessions and use the mixed-endian
// "GUID" layout (first three fields swapped) in little-endian ones.
impl FixedSize for Uuid {
    const SIZE: usize = 16;
}

impl BinaryEncode for Uuid {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        match writer.endianness() {
            Endianness::Big => writer.write_bytes(self.as_bytes()),
            Endianness::Little => writer.write_bytes(&self.to_bytes_le()),
        }
    }
}

impl BinaryDecode for Uuid {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let endianness = reader.endianness();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(reader.read_bytes(16)?);
        Ok(match endianness {
            Endianness::Big => Uuid::from_bytes(bytes),
            Endianness::Little => Uuid::from_bytes_le(bytes),
        })
    }
}

impl FixedSize for Frame {
    const SIZE: usize = 4;
}

impl BinaryEncode for Frame {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_i32(self.as_i32())
    }
}

impl BinaryDecode for Frame {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        reader.read_i32().map(Frame::new)
    }
}

impl<T: FixedSize, const N: usize> FixedSize for [T; N] {
    const SIZE: usize = T::SIZE * N;
}

impl<T: BinaryEncode, const N: usize> BinaryEncode for [T; N] {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        for item in self {
            item.encode(writer)?;
        }
        Ok(())
    }
}

impl<T: BinaryDecode + Default + Copy, const N: usize> BinaryDecode for [T; N] {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let mut items = [T::default(); N];
        for item in &mut items {
            *item = T::decode(reader)?;
        }
        Ok(items)
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
    use crate::serialization::BinaryBufferWriter;
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    const ORDERS: [Endianness; 2] = [Endianness::Little, Endianness::Big];

    fn roundtrip<T: BinaryEncode + BinaryDecode + FixedSize>(
        value: &T,
        endianness: Endianness,
    ) -> T {
        let mut bytes = Vec::new();
        BinaryBufferWriter::new(&mut bytes, endianness)
            .write(value)
            .unwrap();
        assert_eq!(bytes.len(), T::SIZE);
        let mut offset = 0;
        let decoded = BinaryReader::new(&bytes, &mut offset, endianness)
            .read::<T>()
            .unwrap();
        assert_eq!(offset, bytes.len());
        decoded
    }

    // ==========================================
    // Integer bounds
    // ==========================================

    macro_rules! integer_bounds {
        ($($ty:ident),*) => {
            pastey::paste! {
                $(
                    #[test]
                    fn [<roundtrip_ $ty _bounds>]() {
                        for endianness in ORDERS {
                            for value in [$ty::MIN, $ty::MAX, 0, 1] {
                                assert_eq!(roundtrip(&value, endianness), value);
                            }
                        }
                    }
                )*
            }
        };
    }

    integer_bounds!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

    // ==========================================
    // Floats
    // ==========================================

    #[test]
    fn roundtrip_float_specials() {
        for endianness in ORDERS {
            for value in [
                f32::NAN,
                f32::INFINITY,
                f32::NEG_INFINITY,
                f32::MIN,
                f32::MAX,
                -0.0,
            ] {
                assert_eq!(roundtrip(&value, endianness).to_bits(), value.to_bits());
            }
            for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, f64::MIN_POSITIVE] {
                assert_eq!(roundtrip(&value, endianness).to_bits(), value.to_bits());
            }
            for value in [half::f16::NAN, half::f16::MAX, half::f16::NEG_INFINITY] {
                assert_eq!(roundtrip(&value, endianness).to_bits(), value.to_bits());
            }
        }
    }

    #[test]
    fn float_byte_order_differs() {
        let mut little = Vec::new();
        let mut big = Vec::new();
        BinaryBufferWriter::new(&mut little, Endianness::Little)
            .write(&1.5f64)
            .unwrap();
        BinaryBufferWriter::new(&mut big, Endianness::Big)
            .write(&1.5f64)
            .unwrap();
        little.reverse();
        assert_eq!(little, big);
    }

    // ==========================================
    // Identifiers and frames
    // ==========================================

    #[test]
    fn uuid_layout_per_order() {
        let id = Uuid::from_u128(0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF);
        let mut big = Vec::new();
        BinaryBufferWriter::new(&mut big, Endianness::Big)
            .write(&id)
            .unwrap();
        assert_eq!(big.as_slice(), id.as_bytes());

        let mut little = Vec::new();
        BinaryBufferWriter::new(&mut little, Endianness::Little)
            .write(&id)
            .unwrap();
        assert_eq!(little[..4], [0x33, 0x22, 0x11, 0x00]);

        for endianness in ORDERS {
            assert_eq!(roundtrip(&id, endianness), id);
        }
    }

    #[test]
    fn frame_is_an_i32() {
        for endianness in ORDERS {
            assert_eq!(roundtrip(&Frame::NULL, endianness), Frame::NULL);
            assert_eq!(roundtrip(&Frame::new(1000), endianness), Frame::new(1000));
        }
        assert_eq!(Frame::SIZE, i32::SIZE);
    }

    #[test]
    fn arrays_are_sequential() {
        let value = [1u16, 2, 3];
        assert_eq!(<[u16; 3]>::SIZE, 6);
        let mut bytes = Vec::new();
        BinaryBufferWriter::new(&mut bytes, Endianness::Big)
            .write(&value)
            .unwrap();
        assert_eq!(bytes, vec![0, 1, 0, 2, 0, 3]);
        assert_eq!(roundtrip(&value, Endianness::Little), value);
    }

    #[test]
    fn truncated_array_reports_shortfall() {
        let bytes = [0u8; 5];
        let mut offset = 0;
        let result = BinaryReader::new(&bytes, &mut offset, Endianness::Big).read::<[u16; 3]>();
        assert_eq!(
            result,
            Err(CodecError::TruncatedData {
                required: 2,
                available: 1
            })
        );
    }

    // ==========================================
    // Property Tests
    // ==========================================

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_integers_roundtrip(
            a in any::<i64>(),
            b in any::<u32>(),
            c in any::<i128>(),
            d in any::<u16>(),
            little in any::<bool>(),
        ) {
            let endianness = if little { Endianness::Little } else { Endianness::Big };
            prop_assert_eq!(roundtrip(&a, endianness), a);
            prop_assert_eq!(roundtrip(&b, endianness), b);
            prop_assert_eq!(roundtrip(&c, endianness), c);
            prop_assert_eq!(roundtrip(&d, endianness), d);
        }

        #[test]
        fn prop_floats_roundtrip_bitwise(x in any::<f32>(), y in any::<f64>(), bits in any::<u16>()) {
            let h = half::f16::from_bits(bits);
            for endianness in ORDERS {
                prop_assert_eq!(roundtrip(&x, endianness).to_bits(), x.to_bits());
                prop_assert_eq!(roundtrip(&y, endianness).to_bits(), y.to_bits());
                prop_assert_eq!(roundtrip(&h, endianness).to_bits(), bits);
            }
        }

        #[test]
        fn prop_chars_and_bools_roundtrip(c in any::<char>(), b in any::<bool>()) {
            for endianness in ORDERS {
                prop_assert_eq!(roundtrip(&c, endianness), c);
                prop_assert_eq!(roundtrip(&b, endianness), b);
            }
        }

        #[test]
        fn prop_uuid_roundtrip(raw in any::<u128>()) {
            let id = Uuid::from_u128(raw);
            for endianness in ORDERS {
                prop_assert_eq!(roundtrip(&id, endianness), id);
            }
        }
    }
}
