//! Byte order selection and integer width helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte order used for every multi-byte value of a session.
///
/// The order is chosen once when a session is configured and never changes afterwards; one wire
/// format never mixes both orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first (network order).
    #[default]
    Big,
}

impl Endianness {
    /// Byte order of the host.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Self::Little;
    /// Byte order of the host.
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = Self::Big;

    /// Network byte order.
    pub const NETWORK: Self = Self::Big;

    /// Returns `true` if values must be byte-swapped to convert between this order and the host's.
    #[must_use]
    pub const fn requires_reversal(self) -> bool {
        !matches!(
            (self, Self::NATIVE),
            (Self::Little, Self::Little) | (Self::Big, Self::Big)
        )
    }

    /// Returns `true` for [`Endianness::Little`].
    #[must_use]
    pub const fn is_little(self) -> bool {
        matches!(self, Self::Little)
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => write!(f, "little-endian"),
            Self::Big => write!(f, "big-endian"),
        }
    }
}

/// Dispatches a `byteorder::ByteOrder` call on a runtime [`Endianness`].
macro_rules! with_byte_order {
    ($endianness:expr, $method:ident ( $($arg:expr),* $(,)? )) => {
        match $endianness {
            $crate::serialization::Endianness::Little => {
                <::byteorder::LittleEndian as ::byteorder::ByteOrder>::$method($($arg),*)
            },
            $crate::serialization::Endianness::Big => {
                <::byteorder::BigEndian as ::byteorder::ByteOrder>::$method($($arg),*)
            },
        }
    };
}
pub(crate) use with_byte_order;

/// How the high bits of a narrow integer are filled when it is widened on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signedness {
    /// Copy the top bit (two's complement).
    Signed,
    /// Fill with zeros. Unsigned values must never be sign-extended.
    Unsigned,
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width primitive integers, `u8` through `i128`.
///
/// This trait is sealed.
pub trait BinaryInteger: Copy + sealed::Sealed + Send + Sync + 'static {
    /// Width in bytes.
    const SIZE: usize;
    /// Whether the type is signed.
    const SIGNEDNESS: Signedness;

    /// The two's complement bits of `self`, zero-extended to 128 bits.
    fn to_bits(self) -> u128;

    /// Truncates `bits` to this type's width.
    fn from_bits(bits: u128) -> Self;
}

macro_rules! impl_binary_integer {
    ($($ty:ty => $unsigned:ty, $signedness:ident;)*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl BinaryInteger for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                const SIGNEDNESS: Signedness = Signedness::$signedness;

                #[inline]
                fn to_bits(self) -> u128 {
                    self as $unsigned as u128
                }

                #[inline]
                fn from_bits(bits: u128) -> Self {
                    bits as $unsigned as $ty
                }
            }
        )*
    };
}

impl_binary_integer! {
    u8 => u8, Unsigned;
    u16 => u16, Unsigned;
    u32 => u32, Unsigned;
    u64 => u64, Unsigned;
    u128 => u128, Unsigned;
    i8 => u8, Signed;
    i16 => u16, Signed;
    i32 => u32, Signed;
    i64 => u64, Signed;
    i128 => u128, Signed;
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
    fn native_never_requires_reversal() {
        assert!(!Endianness::NATIVE.requires_reversal());
    }

    #[test]
    fn exactly_one_order_requires_reversal() {
        assert_ne!(
            Endianness::Little.requires_reversal(),
            Endianness::Big.requires_reversal()
        );
    }

    #[test]
    fn default_is_network_order() {
        assert_eq!(Endianness::default(), Endianness::NETWORK);
        assert!(!Endianness::default().is_little());
    }

    #[test]
    fn integer_bits_are_zero_extended() {
        assert_eq!((-1i8).to_bits(), 0xFF);
        assert_eq!((-2i32).to_bits(), 0xFFFF_FFFE);
        assert_eq!(i16::from_bits(0xFFFF), -1);
        assert_eq!(u16::from_bits(0x1_0002), 2);
    }

    #[test]
    fn widths_match_std() {
        assert_eq!(<u8 as BinaryInteger>::SIZE, 1);
        assert_eq!(<i64 as BinaryInteger>::SIZE, 8);
        assert_eq!(<u128 as BinaryInteger>::SIZE, 16);
        assert_eq!(<i32 as BinaryInteger>::SIGNEDNESS, Signedness::Signed);
        assert_eq!(<u32 as BinaryInteger>::SIGNEDNESS, Signedness::Unsigned);
    }

    #[test]
    fn byte_order_dispatch() {
        let mut buf = [0u8; 4];
        with_byte_order!(Endianness::Little, write_u32(&mut buf, 0x0102_0304));
        assert_eq!(buf, [4, 3, 2, 1]);
        with_byte_order!(Endianness::Big, write_u32(&mut buf, 0x0102_0304));
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(with_byte_order!(Endianness::Big, read_u32(&buf)), 0x0102_0304);
    }

    #[test]
    fn display() {
        assert_eq!(Endianness::Little.to_string(), "little-endian");
        assert_eq!(Endianness::Big.to_string(), "big-endian");
    }
}
