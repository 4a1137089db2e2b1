//! Binary codec integration tests.
//!
//! A game-shaped composite type is encoded field by field through the public codec traits,
//! then checked for exact layout, round trips under both byte orders and bounds failures.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use chrono::{DateTime, Utc};
use glam::Vec3;
use half::f16;
use proptest::prelude::*;
use uuid::Uuid;

use rampart::serialization::{
    decode_at, encode_at, BinaryBufferWriter, BinaryDecode, BinaryEncode, BinaryReader,
    BinarySerializer, BinaryWriter, ByteSink, CodecError, EncodableSerializer, Endianness,
    FixedSize,
};
use rampart::test_config::miri_case_count;
use rampart::{Frame, FrameRange, RampartError};

#[derive(Debug, Clone, Copy, PartialEq)]
struct PlayerSnapshot {
    id: Uuid,
    frame: Frame,
    window: FrameRange,
    position: Vec3,
    health: f16,
    alive: bool,
    spawned_at: DateTime<Utc>,
}

impl FixedSize for PlayerSnapshot {
    const SIZE: usize = Uuid::SIZE
        + Frame::SIZE
        + FrameRange::SIZE
        + Vec3::SIZE
        + f16::SIZE
        + bool::SIZE
        + <DateTime<Utc>>::SIZE;
}

impl BinaryEncode for PlayerSnapshot {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write(&self.id)?;
        writer.write(&self.frame)?;
        writer.write(&self.window)?;
        writer.write(&self.position)?;
        writer.write(&self.health)?;
        writer.write(&self.alive)?;
        writer.write(&self.spawned_at)
    }
}

impl BinaryDecode for PlayerSnapshot {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: reader.read()?,
            frame: reader.read()?,
            window: reader.read()?,
            position: reader.read()?,
            health: reader.read()?,
            alive: reader.read()?,
            spawned_at: reader.read()?,
        })
    }
}

fn sample() -> PlayerSnapshot {
    PlayerSnapshot {
        id: Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff),
        frame: Frame::new(1000),
        window: FrameRange::new(Frame::new(990), Frame::new(1000)),
        position: Vec3::new(1.5, -2.0, 0.25),
        health: f16::from_f32(0.75),
        alive: true,
        spawned_at: DateTime::from_timestamp(1_700_000_000, 500).unwrap(),
    }
}

// ============================================================================
// Layout
// ============================================================================

#[test]
fn composite_size_is_sum_of_fields() {
    assert_eq!(PlayerSnapshot::SIZE, 16 + 4 + 8 + 12 + 2 + 1 + 13);
}

#[test]
fn big_endian_layout_is_exact() {
    let mut buffer = [0u8; PlayerSnapshot::SIZE];
    let mut offset = 0;
    encode_at(&sample(), &mut buffer, &mut offset, Endianness::Big).unwrap();
    assert_eq!(offset, PlayerSnapshot::SIZE);

    // RFC 4122 byte order for the id
    assert_eq!(buffer[..4], [0x00, 0x11, 0x22, 0x33]);
    // frame 1000
    assert_eq!(buffer[16..20], [0x00, 0x00, 0x03, 0xe8]);
    // window start 990
    assert_eq!(buffer[20..24], [0x00, 0x00, 0x03, 0xde]);
    // position.x = 1.5f32
    assert_eq!(buffer[28..32], 1.5f32.to_be_bytes());
    // alive
    assert_eq!(buffer[42], 1);
    // utc kind byte
    assert_eq!(buffer[PlayerSnapshot::SIZE - 1], 1);
}

#[test]
fn byte_orders_mirror_each_other_for_scalars() {
    let mut big = [0u8; PlayerSnapshot::SIZE];
    let mut little = [0u8; PlayerSnapshot::SIZE];
    encode_at(&sample(), &mut big, &mut 0, Endianness::Big).unwrap();
    encode_at(&sample(), &mut little, &mut 0, Endianness::Little).unwrap();

    let mut reversed = big[16..20].to_vec();
    reversed.reverse();
    assert_eq!(little[16..20], reversed[..]);
    assert_ne!(big, little);
}

// ============================================================================
// Round Trips
// ============================================================================

#[test]
fn composite_roundtrip_in_both_byte_orders() {
    for endianness in [Endianness::Big, Endianness::Little] {
        let mut buffer = Vec::new();
        BinaryBufferWriter::new(&mut buffer, endianness)
            .write(&sample())
            .unwrap();
        assert_eq!(buffer.len(), PlayerSnapshot::SIZE);

        let mut offset = 0;
        let decoded: PlayerSnapshot = decode_at(&buffer, &mut offset, endianness).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(offset, buffer.len());
    }
}

#[test]
fn encodable_serializer_uses_session_byte_order() {
    let serializer = EncodableSerializer::<PlayerSnapshot>::new();
    assert_eq!(serializer.size(), PlayerSnapshot::SIZE);

    let mut dst = vec![0u8; serializer.size()];
    let written = serializer
        .serialize(&sample(), Endianness::Little, &mut dst)
        .unwrap();
    assert_eq!(written, PlayerSnapshot::SIZE);

    let mut decoded = sample();
    decoded.alive = false;
    serializer
        .deserialize(&dst, Endianness::Little, &mut decoded)
        .unwrap();
    assert_eq!(decoded, sample());
}

#[test]
fn sequential_values_share_one_cursor() {
    let mut buffer = [0u8; 64];
    let mut offset = 0;
    for frame in 0..4 {
        encode_at(&Frame::new(frame), &mut buffer, &mut offset, Endianness::Big).unwrap();
    }
    assert_eq!(offset, 16);

    let mut cursor = 0;
    let mut reader = BinaryReader::new(&buffer[..offset], &mut cursor, Endianness::Big);
    let frames: Vec<Frame> = (0..4).map(|_| reader.read().unwrap()).collect();
    assert_eq!(frames, (0..4).map(Frame::new).collect::<Vec<_>>());
    assert!(reader.is_empty());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn short_buffer_fails_without_moving_past_written_fields() {
    let mut buffer = [0u8; 20];
    let mut offset = 0;
    let err = encode_at(&sample(), &mut buffer, &mut offset, Endianness::Big).unwrap_err();
    assert!(matches!(err, CodecError::BufferTooSmall { .. }));
    assert!(offset <= buffer.len());
}

#[test]
fn truncated_input_is_reported() {
    let mut buffer = vec![0u8; PlayerSnapshot::SIZE];
    encode_at(&sample(), &mut buffer, &mut 0, Endianness::Big).unwrap();
    buffer.truncate(PlayerSnapshot::SIZE - 1);

    let err = decode_at::<PlayerSnapshot>(&buffer, &mut 0, Endianness::Big).unwrap_err();
    assert!(matches!(err, CodecError::TruncatedData { .. }));
    assert!(matches!(
        RampartError::from(err),
        RampartError::TruncatedData { .. }
    ));
}

#[test]
fn wrong_instant_kind_is_rejected() {
    let mut buffer = vec![0u8; PlayerSnapshot::SIZE];
    encode_at(&sample(), &mut buffer, &mut 0, Endianness::Big).unwrap();
    buffer[PlayerSnapshot::SIZE - 1] = 2;

    let err = decode_at::<PlayerSnapshot>(&buffer, &mut 0, Endianness::Big).unwrap_err();
    assert!(matches!(err, CodecError::InvalidValue { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: miri_case_count(),
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_composite_roundtrip(
        id in any::<u128>(),
        frame in any::<i32>(),
        start in any::<i32>(),
        x in -1.0e6f32..1.0e6,
        alive in any::<bool>(),
        seconds in 0i64..4_000_000_000,
        nanos in 0u32..1_000_000_000,
        big in any::<bool>(),
    ) {
        let endianness = if big { Endianness::Big } else { Endianness::Little };
        let snapshot = PlayerSnapshot {
            id: Uuid::from_u128(id),
            frame: Frame::new(frame),
            window: FrameRange::new(Frame::new(start), Frame::new(frame)),
            position: Vec3::new(x, -x, x / 2.0),
            health: f16::from_f32(1.0),
            alive,
            spawned_at: DateTime::from_timestamp(seconds, nanos).unwrap(),
        };
        let mut buffer = [0u8; PlayerSnapshot::SIZE];
        encode_at(&snapshot, &mut buffer, &mut 0, endianness).unwrap();
        let decoded: PlayerSnapshot = decode_at(&buffer, &mut 0, endianness).unwrap();
        prop_assert_eq!(decoded, snapshot);
    }
}
