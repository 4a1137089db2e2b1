//! Inclusive ranges of frames.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RampartError;
use crate::serialization::{
    BinaryDecode, BinaryEncode, BinaryReader, BinaryWriter, ByteSink, CodecError, FixedSize,
};
use crate::{Frame, FrameSpan};

/// An inclusive range of frames, `start..=end`.
///
/// [`FrameRange::new`] accepts any pair of frames. An inverted range (`start > end`) has a
/// duration of zero or less and contains nothing. Use [`FrameRange::try_new`] on values from
/// untrusted sources to reject inverted ranges up front.
///
/// Ranges order by `(start, end)` and serialize as a two-element `[start, end]` array.
///
/// ```
/// use rampart::{Frame, FrameRange, FrameSpan};
///
/// let range = FrameRange::new(Frame::new(10), Frame::new(14));
/// assert_eq!(range.duration(), FrameSpan::new(5));
/// assert!(range.contains(Frame::new(14)));
/// assert!(!range.contains(Frame::new(15)));
/// assert_eq!(range.to_string(), "[10..14]");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRange {
    /// First frame in the range.
    pub start: Frame,
    /// Last frame in the range.
    pub end: Frame,
}

impl FrameRange {
    /// Creates a range without validating `start <= end`.
    #[must_use]
    pub const fn new(start: Frame, end: Frame) -> Self {
        Self { start, end }
    }

    /// Creates a range, rejecting `start > end`.
    pub fn try_new(start: Frame, end: Frame) -> Result<Self, RampartError> {
        if start > end {
            return Err(RampartError::InvalidFrame {
                frame: end,
                reason: format!("range end is before its start {start}"),
            });
        }
        Ok(Self { start, end })
    }

    /// The range of `duration` frames starting at `start`.
    #[must_use]
    pub fn from_duration(start: Frame, duration: FrameSpan) -> Self {
        Self::new(start, start + (duration.frames() - 1))
    }

    /// Same start, new length.
    #[must_use]
    pub fn with_duration(self, duration: FrameSpan) -> Self {
        Self::from_duration(self.start, duration)
    }

    /// Number of frames in the range, `end - start + 1`, saturated to the `i32` range.
    #[must_use]
    pub fn duration(self) -> FrameSpan {
        let frames = i64::from(self.end.as_i32()) - i64::from(self.start.as_i32()) + 1;
        let frames = frames.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
        FrameSpan::new(i32::try_from(frames).unwrap_or(i32::MAX))
    }

    /// Returns `true` if `start <= frame <= end`.
    #[must_use]
    pub fn contains(self, frame: Frame) -> bool {
        self.contains_number(frame.as_i32())
    }

    /// Returns `true` if `start <= number <= end`.
    #[must_use]
    pub fn contains_number(self, number: i32) -> bool {
        number >= self.start.as_i32() && number <= self.end.as_i32()
    }

    /// Iterates over every frame in the range, in order. Empty for an inverted range.
    pub fn iter(self) -> impl DoubleEndedIterator<Item = Frame> {
        (self.start.as_i32()..=self.end.as_i32()).map(Frame::new)
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start.as_i32(), self.end.as_i32())
    }
}

impl From<(Frame, Frame)> for FrameRange {
    fn from((start, end): (Frame, Frame)) -> Self {
        Self::new(start, end)
    }
}

impl From<(Frame, FrameSpan)> for FrameRange {
    fn from((start, duration): (Frame, FrameSpan)) -> Self {
        Self::from_duration(start, duration)
    }
}

/// Lengthens the range by `rhs` frames, keeping the start.
impl Add<FrameSpan> for FrameRange {
    type Output = Self;

    fn add(self, rhs: FrameSpan) -> Self {
        self.with_duration(self.duration() + rhs)
    }
}

/// Shortens the range by `rhs` frames, keeping the start.
impl Sub<FrameSpan> for FrameRange {
    type Output = Self;

    fn sub(self, rhs: FrameSpan) -> Self {
        self.with_duration(self.duration() - rhs)
    }
}

impl Serialize for FrameRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.start.as_i32(), self.end.as_i32()].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FrameRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [start, end] = <[i32; 2]>::deserialize(deserializer)?;
        Ok(Self::new(Frame::new(start), Frame::new(end)))
    }
}

impl FixedSize for FrameRange {
    const SIZE: usize = 8;
}

impl BinaryEncode for FrameRange {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write(&self.start)?;
        writer.write(&self.end)
    }
}

impl BinaryDecode for FrameRange {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let start = reader.read()?;
        let end = reader.read()?;
        Ok(Self::new(start, end))
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
    use crate::serialization::{BinaryBufferWriter, Endianness};
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    fn range(start: i32, end: i32) -> FrameRange {
        FrameRange::new(Frame::new(start), Frame::new(end))
    }

    #[test]
    fn single_frame_range() {
        let r = range(7, 7);
        assert_eq!(r.duration(), FrameSpan::ONE);
        assert!(r.contains(Frame::new(7)));
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![Frame::new(7)]);
    }

    #[test]
    fn extreme_range_duration_saturates() {
        assert_eq!(
            range(-2_000_000_000, 2_000_000_000).duration(),
            FrameSpan::new(i32::MAX)
        );
        assert_eq!(range(i32::MAX, i32::MIN).duration(), FrameSpan::new(i32::MIN));
        assert_eq!(range(0, 9).duration().frames(), 10);
    }

    #[test]
    fn iteration_runs_both_ways() {
        let r = range(3, 5);
        assert_eq!(
            r.iter().rev().collect::<Vec<_>>(),
            vec![Frame::new(5), Frame::new(4), Frame::new(3)]
        );
        assert_eq!(range(i32::MAX - 1, i32::MAX).iter().count(), 2);
    }

    #[test]
    fn inverted_range_is_permissive_but_empty() {
        let r = range(10, 5);
        assert!(r.duration().frames() <= 0);
        for f in 0..20 {
            assert!(!r.contains_number(f));
        }
        assert_eq!(r.iter().count(), 0);
        assert!(matches!(
            FrameRange::try_new(Frame::new(10), Frame::new(5)),
            Err(RampartError::InvalidFrame { .. })
        ));
        assert_eq!(FrameRange::try_new(Frame::new(5), Frame::new(10)).unwrap(), range(5, 10));
    }

    #[test]
    fn duration_builders() {
        let r = FrameRange::from_duration(Frame::new(100), FrameSpan::new(10));
        assert_eq!(r, range(100, 109));
        assert_eq!(r.with_duration(FrameSpan::new(2)), range(100, 101));
        assert_eq!(r + FrameSpan::new(5), range(100, 114));
        assert_eq!(r - FrameSpan::new(5), range(100, 104));
        assert_eq!(FrameRange::from((Frame::new(1), FrameSpan::new(3))), range(1, 3));
    }

    #[test]
    fn ordering_is_start_then_end() {
        assert!(range(1, 9) < range(2, 3));
        assert!(range(1, 3) < range(1, 4));
    }

    #[test]
    fn serde_as_pair() {
        let json = serde_json::to_string(&range(3, 8)).unwrap();
        assert_eq!(json, "[3,8]");
        let back: FrameRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range(3, 8));
    }

    #[test]
    fn wire_layout_is_two_i32() {
        let mut bytes = Vec::new();
        BinaryBufferWriter::new(&mut bytes, Endianness::Big)
            .write(&range(1, 2))
            .unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 2]);
        let mut offset = 0;
        let decoded: FrameRange = BinaryReader::new(&bytes, &mut offset, Endianness::Big)
            .read()
            .unwrap();
        assert_eq!(decoded, range(1, 2));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_contains_matches_bounds(start in -1000i32..1000, len in 1i32..500, f in -2000i32..2000) {
            let r = range(start, start + len - 1);
            prop_assert_eq!(r.contains_number(f), start <= f && f <= start + len - 1);
            prop_assert_eq!(r.duration().frames(), len);
            prop_assert_eq!(r.iter().count() as i32, len);
        }
    }
}
