//! Codec errors and the serde-backed encoding path.
//!
//! Two encoding paths share the error types defined here:
//!
//! - The fixed-layout [`BinaryWriter`](super::BinaryWriter) / [`BinaryReader`](super::BinaryReader)
//!   pair used for every protocol message and confirmed-input record.
//! - A bincode path for arbitrary serde types (state checksums, [`SerdeSerializer`](super::SerdeSerializer)).
//!
//! The bincode configuration uses fixed-size integers so that the encoded size of a value
//! does not depend on its contents, and honours the session's [`Endianness`].
//!
//! # Examples
//!
//! ```
//! use rampart::serialization::codec::{decode, encode, encode_into};
//!
//! let bytes = encode(&42u32).expect("encoding should succeed");
//! let (decoded, read): (u32, _) = decode(&bytes).expect("decoding should succeed");
//! assert_eq!(decoded, 42);
//! assert_eq!(read, 4);
//!
//! let mut buffer = [0u8; 16];
//! let len = encode_into(&7u16, &mut buffer).expect("encoding should succeed");
//! assert_eq!(len, 2);
//! ```

use bincode::config::{self, Configuration, Fixint};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

use super::Endianness;

fn config() -> Configuration<config::LittleEndian, Fixint> {
    bincode::config::standard().with_fixed_int_encoding()
}

fn big_endian_config() -> Configuration<config::BigEndian, Fixint> {
    config().with_big_endian()
}

/// Represents what operation was being performed when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding into a buffer.
    EncodeIntoBuffer,
    /// A generic encoding operation.
    Encode,
    /// A generic decoding operation.
    Decode,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeIntoBuffer => write!(f, "encoding into buffer"),
            Self::Encode => write!(f, "encoding"),
            Self::Decode => write!(f, "decoding"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// The fixed-layout variants (`BufferTooSmall`, `TruncatedData`, `InvalidValue`) carry no heap
/// data, so they are cheap to construct on the hot path and let composite writers bail out with
/// `?` after the first failing field. The string-carrying variants only come from bincode, whose
/// errors are opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The provided buffer was too small for encoding.
    BufferTooSmall {
        /// The required buffer size (0 if unknown).
        required: usize,
        /// The actual buffer size provided.
        provided: usize,
    },
    /// The source ran out of bytes while decoding.
    TruncatedData {
        /// The number of bytes needed by the read.
        required: usize,
        /// The number of bytes left in the source.
        available: usize,
    },
    /// A decoded value is not valid for its type (bad enum tag, invalid `char`, out of range date).
    InvalidValue {
        /// The type that was being decoded.
        type_name: &'static str,
        /// The raw value that was rejected.
        value: i64,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates an [`InvalidValue`](Self::InvalidValue) error.
    #[must_use]
    pub const fn invalid(type_name: &'static str, value: i64) -> Self {
        Self::InvalidValue { type_name, value }
    }

    fn from_bincode_encode(
        err: bincode::error::EncodeError,
        provided: usize,
        operation: CodecOperation,
    ) -> Self {
        match err {
            bincode::error::EncodeError::UnexpectedEnd => Self::BufferTooSmall {
                required: 0, // bincode doesn't tell us the required size
                provided,
            },
            other => Self::encode(other.to_string(), operation),
        }
    }

    fn from_bincode_decode(
        err: bincode::error::DecodeError,
        available: usize,
        operation: CodecOperation,
    ) -> Self {
        match err {
            bincode::error::DecodeError::UnexpectedEnd { additional } => Self::TruncatedData {
                required: available + additional,
                available,
            },
            other => Self::decode(other.to_string(), operation),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::BufferTooSmall { required, provided } => {
                if *required > 0 {
                    write!(
                        f,
                        "buffer too small: needed {required} bytes, but only {provided} provided"
                    )
                } else {
                    write!(f, "buffer too small: only {provided} bytes provided")
                }
            },
            Self::TruncatedData {
                required,
                available,
            } => {
                write!(
                    f,
                    "truncated data: needed {required} bytes, but only {available} available"
                )
            },
            Self::InvalidValue { type_name, value } => {
                write!(f, "invalid value {value} for {type_name}")
            },
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>` (little-endian, fixed-size integers).
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::Encode))
}

/// Encodes a value into an existing byte slice and returns the number of bytes written.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if the buffer is not large enough.
pub fn encode_into<T: Serialize>(value: &T, buffer: &mut [u8]) -> CodecResult<usize> {
    encode_into_with(value, buffer, Endianness::Little)
}

/// Encodes a value into an existing byte slice using the given byte order.
///
/// ```
/// use rampart::serialization::{codec::encode_into_with, Endianness};
///
/// let mut buffer = [0u8; 4];
/// encode_into_with(&0x0102_0304u32, &mut buffer, Endianness::Big).unwrap();
/// assert_eq!(buffer, [1, 2, 3, 4]);
/// ```
pub fn encode_into_with<T: Serialize>(
    value: &T,
    buffer: &mut [u8],
    endianness: Endianness,
) -> CodecResult<usize> {
    let provided = buffer.len();
    let result = match endianness {
        Endianness::Little => bincode::serde::encode_into_slice(value, buffer, config()),
        Endianness::Big => bincode::serde::encode_into_slice(value, buffer, big_endian_config()),
    };
    result.map_err(|e| CodecError::from_bincode_encode(e, provided, CodecOperation::EncodeIntoBuffer))
}

/// Decodes a value from a byte slice, returning the value and the number of bytes consumed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    decode_with(bytes, Endianness::Little)
}

/// Decodes a value from a byte slice using the given byte order.
pub fn decode_with<T: DeserializeOwned>(
    bytes: &[u8],
    endianness: Endianness,
) -> CodecResult<(T, usize)> {
    let result = match endianness {
        Endianness::Little => bincode::serde::decode_from_slice(bytes, config()),
        Endianness::Big => bincode::serde::decode_from_slice(bytes, big_endian_config()),
    };
    result.map_err(|e| CodecError::from_bincode_decode(e, bytes.len(), CodecOperation::Decode))
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

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pad {
        buttons: u16,
        stick: (i8, i8),
    }

    #[test]
    fn test_encode_decode_roundtrip_primitive() {
        let original: u32 = 12345;
        let bytes = encode(&original).unwrap();
        let (decoded, len): (u32, _) = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn test_fixed_int_encoding_has_constant_size() {
        let small = encode(&Pad {
            buttons: 0,
            stick: (0, 0),
        })
        .unwrap();
        let large = encode(&Pad {
            buttons: u16::MAX,
            stick: (-128, 127),
        })
        .unwrap();
        assert_eq!(small.len(), 4);
        assert_eq!(small.len(), large.len());
    }

    #[test]
    fn test_encode_into_with_big_endian() {
        let mut buffer = [0u8; 8];
        let len = encode_into_with(&0x0A0B_u16, &mut buffer, Endianness::Big).unwrap();
        assert_eq!(len, 2);
        assert_eq!(&buffer[..2], &[0x0A, 0x0B]);
        let (value, _): (u16, _) = decode_with(&buffer[..2], Endianness::Big).unwrap();
        assert_eq!(value, 0x0A0B);
    }

    #[test]
    fn test_encode_into_buffer_too_small() {
        let value: u64 = 0x1234_5678_9ABC_DEF0;
        let mut buffer = [0u8; 1];
        let result = encode_into(&value, &mut buffer);
        assert!(matches!(
            result,
            Err(CodecError::BufferTooSmall { provided: 1, .. })
        ));
    }

    #[test]
    fn test_decode_truncated_reports_sizes() {
        let result: CodecResult<(u64, _)> = decode(&[0xFF, 0xFF, 0xFF]);
        match result {
            Err(CodecError::TruncatedData {
                required,
                available,
            }) => {
                assert_eq!(available, 3);
                assert_eq!(required, 8);
            },
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_little_endian_is_default() {
        let mut explicit = [0u8; 4];
        encode_into_with(&0x0102_0304u32, &mut explicit, Endianness::Little).unwrap();
        assert_eq!(encode(&0x0102_0304u32).unwrap(), explicit.to_vec());
        assert_eq!(explicit, [4, 3, 2, 1]);
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::BufferTooSmall {
            required: 100,
            provided: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("buffer too small"));
        assert!(msg.contains("100"));

        let err = CodecError::BufferTooSmall {
            required: 0,
            provided: 10,
        };
        assert_eq!(err.to_string(), "buffer too small: only 10 bytes provided");

        let err = CodecError::invalid("char", 0xD800);
        assert_eq!(err.to_string(), "invalid value 55296 for char");

        let err = CodecError::decode("boom", CodecOperation::Decode);
        assert!(err.to_string().contains("decoding"));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let pad = Pad {
            buttons: 0xBEEF,
            stick: (3, -3),
        };
        assert_eq!(encode(&pad).unwrap(), encode(&pad).unwrap());
    }
}
