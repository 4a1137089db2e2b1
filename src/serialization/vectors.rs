//! Wire encodings for `glam` vectors and quaternions.
//!
//! Each component is an `f32` converted to the session byte order on its own, so a `Vec3` is
//! 12 bytes and a `Quat` is 16 bytes (x, y, z, w).

use glam::{Quat, Vec2, Vec3, Vec4};

use super::{BinaryDecode, BinaryEncode, BinaryReader, BinaryWriter, ByteSink, CodecError, FixedSize};

macro_rules! impl_float_vector {
    ($($ty:ty [$size:literal] { $($field:ident),+ } => $ctor:path;)*) => {
        $(
            impl FixedSize for $ty {
                const SIZE: usize = $size;
            }

            impl BinaryEncode for $ty {
                fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
                    $(writer.write_f32(self.$field)?;)+
                    Ok(())
                }
            }

            impl BinaryDecode for $ty {
                fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
                    $(let $field = reader.read_f32()?;)+
                    Ok($ctor($($field),+))
                }
            }
        )*
    };
}

impl_float_vector! {
    Vec2 [8] { x, y } => Vec2::new;
    Vec3 [12] { x, y, z } => Vec3::new;
    Vec4 [16] { x, y, z, w } => Vec4::new;
    Quat [16] { x, y, z, w } => Quat::from_xyzw;
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
    use crate::serialization::{BinaryBufferWriter, Endianness};
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    fn encode<T: BinaryEncode>(value: &T, endianness: Endianness) -> Vec<u8> {
        let mut bytes = Vec::new();
        BinaryBufferWriter::new(&mut bytes, endianness)
            .write(value)
            .unwrap();
        bytes
    }

    fn decode<T: BinaryDecode>(bytes: &[u8], endianness: Endianness) -> T {
        let mut offset = 0;
        let value = BinaryReader::new(bytes, &mut offset, endianness)
            .read()
            .unwrap();
        assert_eq!(offset, bytes.len());
        value
    }

    #[test]
    fn sizes() {
        assert_eq!(Vec2::SIZE, 8);
        assert_eq!(Vec3::SIZE, 12);
        assert_eq!(Vec4::SIZE, 16);
        assert_eq!(Quat::SIZE, 16);
    }

    #[test]
    fn components_are_converted_individually() {
        let bytes = encode(&Vec2::new(1.0, -2.0), Endianness::Big);
        assert_eq!(bytes[..4], 1.0f32.to_be_bytes());
        assert_eq!(bytes[4..], (-2.0f32).to_be_bytes());
    }

    #[test]
    fn quaternion_order_is_xyzw() {
        let q = Quat::from_xyzw(0.1, 0.2, 0.3, 0.9);
        let bytes = encode(&q, Endianness::Little);
        assert_eq!(bytes[12..], 0.9f32.to_le_bytes());
        let decoded: Quat = decode(&bytes, Endianness::Little);
        assert_eq!(decoded.to_array(), q.to_array());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_vectors_roundtrip(
            x in any::<f32>().prop_filter("finite", |f| f.is_finite()),
            y in any::<f32>().prop_filter("finite", |f| f.is_finite()),
            z in any::<f32>().prop_filter("finite", |f| f.is_finite()),
            w in any::<f32>().prop_filter("finite", |f| f.is_finite()),
        ) {
            for endianness in [Endianness::Little, Endianness::Big] {
                let v3 = Vec3::new(x, y, z);
                prop_assert_eq!(decode::<Vec3>(&encode(&v3, endianness), endianness), v3);
                let v4 = Vec4::new(x, y, z, w);
                prop_assert_eq!(decode::<Vec4>(&encode(&v4, endianness), endianness), v4);
                let v2 = Vec2::new(x, y);
                prop_assert_eq!(decode::<Vec2>(&encode(&v2, endianness), endianness), v2);
            }
        }
    }
}
