use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::serialization::CodecError;
use crate::Frame;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), RampartError>`].
///
/// [`Result<(), RampartError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RampartError {
    /// A write destination was too small to hold the encoded value.
    ///
    /// This is recoverable: retry with a larger buffer or treat it as backpressure.
    InsufficientBuffer {
        /// The number of bytes the write needed.
        required: usize,
        /// The number of bytes that were available.
        provided: usize,
    },
    /// A read source was shorter than the value being decoded, indicating corrupt or truncated data.
    TruncatedData {
        /// The number of bytes the read needed.
        required: usize,
        /// The number of bytes that were left in the source.
        available: usize,
    },
    /// A decoded enum discriminant was not one of the legal values.
    InvalidEnumValue {
        /// The enum that was being decoded.
        type_name: &'static str,
        /// The raw value that was rejected.
        value: i64,
    },
    /// A replay source is missing or structurally invalid.
    InvalidReplaySource {
        /// Why the source was rejected.
        reason: String,
    },
    /// The checksums of two snapshots taken for the same frame do not match.
    ChecksumMismatch {
        /// The frame at which the mismatch was detected.
        frame: Frame,
        /// The checksum recorded the first time the frame was simulated.
        previous: u32,
        /// The checksum of the resimulated state.
        current: u32,
    },
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// An invalid frame number was provided.
    InvalidFrame {
        /// The frame that was invalid.
        frame: Frame,
        /// A description of why the frame was invalid.
        reason: String,
    },
    /// A connection status change that the lifecycle does not allow.
    InvalidStatusTransition {
        /// The status the connection was in.
        from: &'static str,
        /// The status that was requested.
        to: &'static str,
    },
    /// Serialization or deserialization of data failed.
    SerializationError {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
    /// A file system operation on a recording or replay failed.
    Io {
        /// A description of the failed operation.
        context: String,
    },
    /// An internal error occurred that should not happen under normal operation.
    /// If you encounter this error, please report it as a bug.
    InternalError {
        /// A description of the internal error.
        context: String,
    },
}

impl RampartError {
    /// Wraps an I/O error with a short description of what was being done.
    pub(crate) fn io(action: &str, err: &std::io::Error) -> Self {
        Self::Io {
            context: format!("{action}: {err}"),
        }
    }
}

impl Display for RampartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RampartError::InsufficientBuffer { required, provided } => {
                write!(
                    f,
                    "Insufficient buffer: needed {} bytes, but only {} provided",
                    required, provided
                )
            },
            RampartError::TruncatedData {
                required,
                available,
            } => {
                write!(
                    f,
                    "Truncated data: needed {} bytes, but only {} available",
                    required, available
                )
            },
            RampartError::InvalidEnumValue { type_name, value } => {
                write!(f, "Invalid value {} for enum {}", value, type_name)
            },
            RampartError::InvalidReplaySource { reason } => {
                write!(f, "Invalid replay source: {}", reason)
            },
            RampartError::ChecksumMismatch {
                frame,
                previous,
                current,
            } => {
                write!(
                    f,
                    "Detected checksum mismatch on frame {}: previous={:#010x}, current={:#010x}",
                    frame, previous, current
                )
            },
            RampartError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            },
            RampartError::InvalidFrame { frame, reason } => {
                write!(f, "Invalid frame {}: {}", frame, reason)
            },
            RampartError::InvalidStatusTransition { from, to } => {
                write!(f, "Invalid status transition from {} to {}", from, to)
            },
            RampartError::SerializationError { context } => {
                write!(f, "Serialization error: {}", context)
            },
            RampartError::Io { context } => {
                write!(f, "I/O error: {}", context)
            },
            RampartError::InternalError { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            },
        }
    }
}

impl Error for RampartError {}

/// A `Result` whose error defaults to [`RampartError`].
pub type RampartResult<T, E = RampartError> = Result<T, E>;

impl From<CodecError> for RampartError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::BufferTooSmall { required, provided } => {
                Self::InsufficientBuffer { required, provided }
            },
            CodecError::TruncatedData {
                required,
                available,
            } => Self::TruncatedData {
                required,
                available,
            },
            CodecError::InvalidValue { type_name, value } => {
                Self::InvalidEnumValue { type_name, value }
            },
            other => Self::SerializationError {
                context: other.to_string(),
            },
        }
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
    use crate::serialization::CodecOperation;

    #[test]
    fn buffer_too_small_maps_to_insufficient_buffer() {
        let err: RampartError = CodecError::BufferTooSmall {
            required: 8,
            provided: 3,
        }
        .into();
        assert_eq!(
            err,
            RampartError::InsufficientBuffer {
                required: 8,
                provided: 3
            }
        );
    }

    #[test]
    fn truncated_maps_to_truncated() {
        let err: RampartError = CodecError::TruncatedData {
            required: 4,
            available: 1,
        }
        .into();
        assert!(matches!(
            err,
            RampartError::TruncatedData {
                required: 4,
                available: 1
            }
        ));
    }

    #[test]
    fn invalid_value_maps_to_invalid_enum() {
        let err: RampartError = CodecError::InvalidValue {
            type_name: "ProtocolStatus",
            value: 9,
        }
        .into();
        assert_eq!(err.to_string(), "Invalid value 9 for enum ProtocolStatus");
    }

    #[test]
    fn serde_errors_become_serialization_errors() {
        let err: RampartError = CodecError::decode("bad", CodecOperation::Decode).into();
        match err {
            RampartError::SerializationError { context } => assert!(context.contains("bad")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn checksum_mismatch_display_is_hex() {
        let err = RampartError::ChecksumMismatch {
            frame: Frame::new(12),
            previous: 0xDEAD_BEEF,
            current: 1,
        };
        let text = err.to_string();
        assert!(text.contains("frame 12"));
        assert!(text.contains("0xdeadbeef"));
        assert!(text.contains("0x00000001"));
    }

    #[test]
    fn io_helper_keeps_action() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = RampartError::io("opening replay", &io);
        assert_eq!(err.to_string(), "I/O error: opening replay: gone");
    }
}
