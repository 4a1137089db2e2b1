//! Fixed-layout protocol messages.
//!
//! Every message is a flat sequence of its fields in declaration order, each at its native size
//! in the session byte order. There is no length prefix or type tag; telling messages apart is
//! up to the transport.

use serde::{Deserialize, Serialize};

use crate::error::RampartError;
use crate::serialization::{
    BinaryDecode, BinaryEncode, BinaryReader, BinarySpanWriter, BinaryWriter, ByteSink,
    CodecError, Endianness, FixedSize,
};
use crate::Frame;

/// Probe carrying the sender's frame advantage and a local timestamp.
///
/// The receiver answers with a [`QualityReply`] echoing `ping` unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct QualityReport {
    /// How many frames the sender is ahead of the receiver. Negative when it is behind.
    pub frame_advantage: i32,
    /// Sender timestamp in milliseconds.
    pub ping: i64,
}

/// Answer to a [`QualityReport`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct QualityReply {
    /// The `ping` of the report being answered.
    pub pong: i64,
}

/// Asks the peer for the checksum of its state at `frame`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsistencyCheckRequest {
    /// The frame to checksum.
    pub frame: Frame,
}

impl Default for ConsistencyCheckRequest {
    fn default() -> Self {
        Self { frame: Frame::NULL }
    }
}

/// The checksum a peer computed for the requested frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsistencyCheckReply {
    /// The frame from the request.
    pub frame: Frame,
    /// Checksum of the peer's state at `frame`.
    pub checksum: u32,
}

impl Default for ConsistencyCheckReply {
    fn default() -> Self {
        Self {
            frame: Frame::NULL,
            checksum: 0,
        }
    }
}

macro_rules! impl_message {
    ($($msg:ident { $($field:ident: $ty:ty),+ $(,)? })*) => {
        $(
            impl FixedSize for $msg {
                const SIZE: usize = 0 $(+ <$ty as FixedSize>::SIZE)+;
            }

            impl BinaryEncode for $msg {
                fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
                    $(writer.write(&self.$field)?;)+
                    Ok(())
                }
            }

            impl BinaryDecode for $msg {
                fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
                    Ok(Self {
                        $($field: reader.read::<$ty>()?,)+
                    })
                }
            }
        )*
    };
}

impl_message! {
    QualityReport { frame_advantage: i32, ping: i64 }
    QualityReply { pong: i64 }
    ConsistencyCheckRequest { frame: Frame }
    ConsistencyCheckReply { frame: Frame, checksum: u32 }
}

/// Writes `message` to the start of `buffer` and returns the number of bytes written.
///
/// # Errors
///
/// [`RampartError::InsufficientBuffer`] if `buffer` is shorter than the message.
///
/// ```
/// use rampart::network::messages::{deserialize_message, serialize_message};
/// use rampart::{Endianness, QualityReport};
///
/// let report = QualityReport { frame_advantage: -3, ping: 123_456_789 };
/// let mut buffer = [0u8; 32];
/// let written = serialize_message(&report, &mut buffer, Endianness::Big)?;
/// assert_eq!(written, 12);
///
/// let (decoded, read) = deserialize_message::<QualityReport>(&buffer[..written], Endianness::Big)?;
/// assert_eq!((decoded, read), (report, written));
/// # Ok::<(), rampart::RampartError>(())
/// ```
pub fn serialize_message<M: BinaryEncode>(
    message: &M,
    buffer: &mut [u8],
    endianness: Endianness,
) -> Result<usize, RampartError> {
    let mut offset = 0;
    BinarySpanWriter::new(buffer, &mut offset, endianness).write(message)?;
    Ok(offset)
}

/// Reads a message from the start of `bytes`, returning it and the number of bytes consumed.
///
/// # Errors
///
/// [`RampartError::TruncatedData`] if `bytes` is shorter than the message.
pub fn deserialize_message<M: BinaryDecode>(
    bytes: &[u8],
    endianness: Endianness,
) -> Result<(M, usize), RampartError> {
    let mut offset = 0;
    let message = BinaryReader::new(bytes, &mut offset, endianness).read::<M>()?;
    Ok((message, offset))
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
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    fn roundtrip<M>(message: M, endianness: Endianness) -> M
    where
        M: BinaryEncode + BinaryDecode + FixedSize,
    {
        let mut buffer = vec![0u8; M::SIZE];
        assert_eq!(serialize_message(&message, &mut buffer, endianness).unwrap(), M::SIZE);
        let (decoded, read) = deserialize_message::<M>(&buffer, endianness).unwrap();
        assert_eq!(read, M::SIZE);
        decoded
    }

    // ==========================================
    // Layout
    // ==========================================

    #[test]
    fn message_sizes() {
        assert_eq!(QualityReport::SIZE, 12);
        assert_eq!(QualityReply::SIZE, 8);
        assert_eq!(ConsistencyCheckRequest::SIZE, 4);
        assert_eq!(ConsistencyCheckReply::SIZE, 8);
    }

    #[test]
    fn quality_report_big_endian_layout() {
        let report = QualityReport {
            frame_advantage: -3,
            ping: 0x0102_0304_0506_0708,
        };
        let mut buffer = [0u8; 12];
        serialize_message(&report, &mut buffer, Endianness::Big).unwrap();
        assert_eq!(
            buffer,
            [0xff, 0xff, 0xff, 0xfd, 1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn consistency_reply_little_endian_layout() {
        let reply = ConsistencyCheckReply {
            frame: Frame::new(1000),
            checksum: 0xDEAD_BEEF,
        };
        let mut buffer = [0u8; 8];
        serialize_message(&reply, &mut buffer, Endianness::Little).unwrap();
        assert_eq!(buffer, [0xe8, 0x03, 0, 0, 0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn defaults_use_null_frame() {
        assert_eq!(ConsistencyCheckRequest::default().frame, Frame::NULL);
        assert_eq!(ConsistencyCheckReply::default().frame, Frame::NULL);
        assert_eq!(QualityReport::default().ping, 0);
    }

    // ==========================================
    // Round trips
    // ==========================================

    #[test]
    fn known_messages_roundtrip() {
        for endianness in [Endianness::Little, Endianness::Big] {
            let report = QualityReport {
                frame_advantage: -3,
                ping: 123_456_789,
            };
            assert_eq!(roundtrip(report, endianness), report);

            let request = ConsistencyCheckRequest {
                frame: Frame::new(1000),
            };
            assert_eq!(roundtrip(request, endianness), request);

            let reply = ConsistencyCheckReply {
                frame: Frame::new(1000),
                checksum: 0xDEAD_BEEF,
            };
            assert_eq!(roundtrip(reply, endianness), reply);

            let pong = QualityReply { pong: i64::MIN };
            assert_eq!(roundtrip(pong, endianness), pong);
        }
    }

    // ==========================================
    // Failures
    // ==========================================

    #[test]
    fn short_buffer_is_rejected() {
        let mut buffer = [0u8; 11];
        let err = serialize_message(&QualityReport::default(), &mut buffer, Endianness::Big)
            .unwrap_err();
        assert!(matches!(err, RampartError::InsufficientBuffer { .. }));
    }

    #[test]
    fn truncated_message_is_rejected() {
        let err = deserialize_message::<ConsistencyCheckReply>(&[0; 7], Endianness::Big)
            .unwrap_err();
        assert!(matches!(err, RampartError::TruncatedData { .. }));
    }

    #[test]
    fn trailing_bytes_are_left_alone() {
        let bytes = [0, 0, 0, 9, 0xaa, 0xbb];
        let (request, read) =
            deserialize_message::<ConsistencyCheckRequest>(&bytes, Endianness::Big).unwrap();
        assert_eq!(request.frame, Frame::new(9));
        assert_eq!(read, 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_quality_report_roundtrip(frame_advantage: i32, ping: i64, big: bool) {
            let endianness = if big { Endianness::Big } else { Endianness::Little };
            let report = QualityReport { frame_advantage, ping };
            prop_assert_eq!(roundtrip(report, endianness), report);
        }

        #[test]
        fn prop_consistency_reply_roundtrip(frame: i32, checksum: u32, big: bool) {
            let endianness = if big { Endianness::Big } else { Endianness::Little };
            let reply = ConsistencyCheckReply { frame: Frame::new(frame), checksum };
            prop_assert_eq!(roundtrip(reply, endianness), reply);
        }
    }
}
