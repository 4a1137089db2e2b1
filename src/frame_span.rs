//! Frame counts (durations) and their conversion to wall-clock time.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Rem, Sub, SubAssign};

use web_time::Duration;

use crate::error::RampartError;
use crate::serialization::{
    BinaryDecode, BinaryEncode, BinaryReader, BinaryWriter, ByteSink, CodecError, FixedSize,
};
use crate::Frame;

/// Simulation rate in frames per second.
///
/// Every time conversion takes the rate explicitly; there is no process-wide default to mutate.
/// Sessions own their rate and pass it along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct FrameRate(u16);

impl FrameRate {
    /// 60 frames per second.
    pub const DEFAULT: Self = Self(60);

    /// Creates a rate. Zero is rejected.
    pub fn new(fps: u16) -> Result<Self, RampartError> {
        if fps == 0 {
            return Err(RampartError::InvalidRequest {
                info: "frame rate must be at least 1 fps".to_owned(),
            });
        }
        Ok(Self(fps))
    }

    /// Frames per second.
    #[must_use]
    pub const fn fps(self) -> u16 {
        self.0
    }

    /// Wall-clock length of one frame.
    #[must_use]
    pub fn frame_duration(self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.0))
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fps", self.0)
    }
}

/// A signed number of frames.
///
/// `FrameSpan` is a length of time; [`Frame`] is a position. Adding a span to a frame moves the
/// frame; subtracting two frames is a plain `i32`.
///
/// ```
/// use rampart::{Frame, FrameRate, FrameSpan};
///
/// let span = FrameSpan::from_seconds(2.0, FrameRate::DEFAULT);
/// assert_eq!(span, FrameSpan::new(120));
/// assert_eq!(Frame::new(10) + span, Frame::new(130));
/// assert_eq!(span.to_string(), "120 frames");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct FrameSpan(i32);

impl FrameSpan {
    /// No frames.
    pub const ZERO: Self = Self(0);
    /// One frame.
    pub const ONE: Self = Self(1);
    /// The longest representable span.
    pub const MAX: Self = Self(i32::MAX);

    /// Creates a span of `frames` frames.
    #[inline]
    #[must_use]
    pub const fn new(frames: i32) -> Self {
        Self(frames)
    }

    /// Number of frames.
    #[inline]
    #[must_use]
    pub const fn frames(self) -> i32 {
        self.0
    }

    /// The frame whose number equals this count.
    #[inline]
    #[must_use]
    pub const fn to_frame(self) -> Frame {
        Frame::new(self.0)
    }

    /// Length in seconds at `rate`.
    #[must_use]
    pub fn seconds(self, rate: FrameRate) -> f64 {
        f64::from(self.0) / f64::from(rate.fps())
    }

    /// Length as a [`Duration`] at `rate`. Negative spans clamp to zero.
    #[must_use]
    pub fn duration(self, rate: FrameRate) -> Duration {
        Duration::from_secs_f64(self.seconds(rate).max(0.0))
    }

    /// The span closest to `seconds` at `rate`, saturating at the `i32` range.
    #[must_use]
    pub fn from_seconds(seconds: f64, rate: FrameRate) -> Self {
        Self((seconds * f64::from(rate.fps())).round() as i32)
    }

    /// The span closest to `millis` milliseconds at `rate`.
    #[must_use]
    pub fn from_millis(millis: f64, rate: FrameRate) -> Self {
        Self::from_seconds(millis / 1000.0, rate)
    }

    /// The span closest to `duration` at `rate`.
    #[must_use]
    pub fn from_duration(duration: Duration, rate: FrameRate) -> Self {
        Self::from_seconds(duration.as_secs_f64(), rate)
    }

    /// The frame reached `seconds` into this span.
    ///
    /// Fails with [`RampartError::InvalidFrame`] if that lies beyond the end of the span.
    pub fn frame_at_second(self, seconds: f64, rate: FrameRate) -> Result<Frame, RampartError> {
        let offset = Self::from_seconds(seconds, rate);
        if offset.0 > self.0 {
            return Err(RampartError::InvalidFrame {
                frame: offset.to_frame(),
                reason: format!("{seconds}s is beyond the end of a {self} span at {rate}"),
            });
        }
        Ok(offset.to_frame())
    }

    /// The frame reached `millis` milliseconds into this span.
    pub fn frame_at_millis(self, millis: f64, rate: FrameRate) -> Result<Frame, RampartError> {
        self.frame_at_second(millis / 1000.0, rate)
    }

    /// The frame reached after `duration` into this span.
    pub fn frame_at(self, duration: Duration, rate: FrameRate) -> Result<Frame, RampartError> {
        self.frame_at_second(duration.as_secs_f64(), rate)
    }

    /// Absolute value, saturating at [`FrameSpan::MAX`] for `i32::MIN`.
    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Restricts the span to `min..=max`.
    #[must_use]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

impl fmt::Display for FrameSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} frames", self.0)
    }
}

impl From<i32> for FrameSpan {
    fn from(frames: i32) -> Self {
        Self(frames)
    }
}

impl From<FrameSpan> for i32 {
    fn from(span: FrameSpan) -> Self {
        span.0
    }
}

macro_rules! span_ops {
    ($($trait:ident, $method:ident, $assign_trait:ident, $assign:ident, $op:tt;)*) => {
        $(
            impl $trait for FrameSpan {
                type Output = Self;

                #[inline]
                fn $method(self, rhs: Self) -> Self {
                    Self(self.0 $op rhs.0)
                }
            }

            impl $trait<i32> for FrameSpan {
                type Output = Self;

                #[inline]
                fn $method(self, rhs: i32) -> Self {
                    Self(self.0 $op rhs)
                }
            }

            impl $assign_trait for FrameSpan {
                #[inline]
                fn $assign(&mut self, rhs: Self) {
                    self.0 = self.0 $op rhs.0;
                }
            }
        )*
    };
}

span_ops! {
    Add, add, AddAssign, add_assign, +;
    Sub, sub, SubAssign, sub_assign, -;
}

impl Mul<i32> for FrameSpan {
    type Output = Self;

    fn mul(self, rhs: i32) -> Self {
        Self(self.0 * rhs)
    }
}

impl Rem<i32> for FrameSpan {
    type Output = Self;

    fn rem(self, rhs: i32) -> Self {
        Self(self.0 % rhs)
    }
}

impl Neg for FrameSpan {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Add<FrameSpan> for Frame {
    type Output = Frame;

    #[inline]
    fn add(self, rhs: FrameSpan) -> Frame {
        self + rhs.0
    }
}

impl Sub<FrameSpan> for Frame {
    type Output = Frame;

    #[inline]
    fn sub(self, rhs: FrameSpan) -> Frame {
        self - rhs.0
    }
}

impl FixedSize for FrameSpan {
    const SIZE: usize = 4;
}

impl BinaryEncode for FrameSpan {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_i32(self.0)
    }
}

impl BinaryDecode for FrameSpan {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        reader.read_i32().map(Self)
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
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    fn rate(fps: u16) -> FrameRate {
        FrameRate::new(fps).unwrap()
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            FrameRate::new(0),
            Err(RampartError::InvalidRequest { .. })
        ));
        assert_eq!(FrameRate::default().fps(), 60);
    }

    #[test]
    fn time_conversions() {
        let span = FrameSpan::new(90);
        assert!((span.seconds(FrameRate::DEFAULT) - 1.5).abs() < f64::EPSILON);
        assert_eq!(span.duration(rate(30)), Duration::from_secs(3));
        assert_eq!(FrameSpan::from_millis(500.0, rate(60)), FrameSpan::new(30));
        assert_eq!(
            FrameSpan::from_duration(Duration::from_millis(250), rate(120)),
            FrameSpan::new(30)
        );
        assert_eq!(FrameSpan::new(-5).duration(rate(60)), Duration::ZERO);
    }

    #[test]
    fn frame_at_time_inside_span() {
        let span = FrameSpan::new(60);
        assert_eq!(
            span.frame_at_second(0.5, FrameRate::DEFAULT).unwrap(),
            Frame::new(30)
        );
        assert_eq!(
            span.frame_at_millis(1000.0, FrameRate::DEFAULT).unwrap(),
            Frame::new(60)
        );
        assert!(matches!(
            span.frame_at_second(1.5, FrameRate::DEFAULT),
            Err(RampartError::InvalidFrame { .. })
        ));
        assert_eq!(
            span.frame_at(Duration::from_millis(100), rate(10)).unwrap(),
            Frame::new(1)
        );
    }

    #[test]
    fn arithmetic_and_helpers() {
        let a = FrameSpan::new(10);
        let b = FrameSpan::new(4);
        assert_eq!(a + b, FrameSpan::new(14));
        assert_eq!(a - b, FrameSpan::new(6));
        assert_eq!(a + 1, FrameSpan::new(11));
        assert_eq!(a - 11, FrameSpan::new(-1));
        assert_eq!(a * 3, FrameSpan::new(30));
        assert_eq!(a % 4, FrameSpan::new(2));
        assert_eq!(-a, FrameSpan::new(-10));
        assert_eq!(FrameSpan::new(-3).abs(), FrameSpan::new(3));
        assert_eq!(FrameSpan::new(i32::MIN).abs(), FrameSpan::MAX);
        assert_eq!(a.min(b), b);
        assert_eq!(a.max(b), a);
        assert_eq!(
            FrameSpan::new(50).clamp(FrameSpan::ZERO, FrameSpan::new(20)),
            FrameSpan::new(20)
        );

        let mut c = FrameSpan::ONE;
        c += a;
        c -= b;
        assert_eq!(c, FrameSpan::new(7));
    }

    #[test]
    fn frame_plus_span() {
        assert_eq!(Frame::new(5) + FrameSpan::new(3), Frame::new(8));
        assert_eq!(Frame::new(5) - FrameSpan::new(3), Frame::new(2));
        assert_eq!(FrameSpan::new(7).to_frame(), Frame::new(7));
    }

    #[test]
    fn display() {
        assert_eq!(FrameSpan::new(1).to_string(), "1 frames");
        assert_eq!(FrameSpan::new(-2).to_string(), "-2 frames");
        assert_eq!(FrameRate::DEFAULT.to_string(), "60 fps");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_seconds_roundtrip_within_one_frame(seconds in -10_000.0f64..10_000.0, fps in 1u16..=240) {
            let rate = rate(fps);
            let span = FrameSpan::from_seconds(seconds, rate);
            let resolution = 1.0 / f64::from(fps);
            prop_assert!((span.seconds(rate) - seconds).abs() <= resolution);
        }

        #[test]
        fn prop_from_seconds_inverts_seconds(frames in -1_000_000i32..1_000_000, fps in 1u16..=240) {
            let rate = rate(fps);
            let span = FrameSpan::new(frames);
            prop_assert_eq!(FrameSpan::from_seconds(span.seconds(rate), rate), span);
        }
    }
}
