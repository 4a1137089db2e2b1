//! Wire encodings for `chrono` instants, offsets and dates.
//!
//! | Type                        | Layout                                             | Size |
//! |-----------------------------|----------------------------------------------------|------|
//! | `TimeDelta`                 | `i64` seconds, `i32` sub-second nanoseconds        | 12   |
//! | `NaiveDateTime`             | `i64` Unix seconds, `u32` nanoseconds, kind `0`    | 13   |
//! | `DateTime<Utc>`             | `i64` Unix seconds, `u32` nanoseconds, kind `1`    | 13   |
//! | `DateTime<Local>`           | `i64` Unix seconds, `u32` nanoseconds, kind `2`    | 13   |
//! | `DateTime<FixedOffset>`     | `i64` Unix seconds, `u32` nanoseconds, `i32` offset| 16   |
//! | `NaiveDate`                 | `i32` days since 0001-01-01 (CE day 1)             | 4    |
//! | `NaiveTime`                 | `u32` seconds since midnight, `u32` nanoseconds    | 8    |
//!
//! The kind byte records which clock an instant was taken on. Decoding an instant whose kind
//! byte does not match the requested type fails with [`CodecError::InvalidValue`].

use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    Timelike, Utc,
};

use super::{BinaryDecode, BinaryEncode, BinaryReader, BinaryWriter, ByteSink, CodecError, FixedSize};

const KIND_UNSPECIFIED: u8 = 0;
const KIND_UTC: u8 = 1;
const KIND_LOCAL: u8 = 2;

impl FixedSize for TimeDelta {
    const SIZE: usize = 12;
}

impl BinaryEncode for TimeDelta {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_i64(self.num_seconds())?;
        writer.write_i32(self.subsec_nanos())
    }
}

impl BinaryDecode for TimeDelta {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let seconds = reader.read_i64()?;
        let nanos = reader.read_i32()?;
        TimeDelta::try_seconds(seconds)
            .and_then(|delta| delta.checked_add(&TimeDelta::nanoseconds(i64::from(nanos))))
            .ok_or(CodecError::invalid("TimeDelta", seconds))
    }
}

fn write_instant<S: ByteSink>(
    writer: &mut BinaryWriter<S>,
    utc: &DateTime<Utc>,
) -> Result<(), CodecError> {
    writer.write_i64(utc.timestamp())?;
    writer.write_u32(utc.timestamp_subsec_nanos())
}

fn read_instant(reader: &mut BinaryReader<'_>) -> Result<DateTime<Utc>, CodecError> {
    let seconds = reader.read_i64()?;
    let nanos = reader.read_u32()?;
    DateTime::from_timestamp(seconds, nanos).ok_or(CodecError::invalid("DateTime", seconds))
}

fn expect_kind(reader: &mut BinaryReader<'_>, expected: u8) -> Result<(), CodecError> {
    let kind = reader.read_u8()?;
    if kind == expected {
        Ok(())
    } else {
        Err(CodecError::invalid("DateTime kind", i64::from(kind)))
    }
}

macro_rules! impl_kinded_instant {
    ($($ty:ty, $kind:expr, |$utc:ident| $from_utc:expr;)*) => {
        $(
            impl FixedSize for $ty {
                const SIZE: usize = 13;
            }

            impl BinaryEncode for $ty {
                fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
                    write_instant(writer, &self.utc_instant())?;
                    writer.write_u8($kind)
                }
            }

            impl BinaryDecode for $ty {
                fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
                    let $utc = read_instant(reader)?;
                    expect_kind(reader, $kind)?;
                    Ok($from_utc)
                }
            }
        )*
    };
}

trait UtcInstant {
    fn utc_instant(&self) -> DateTime<Utc>;
}

impl UtcInstant for NaiveDateTime {
    fn utc_instant(&self) -> DateTime<Utc> {
        self.and_utc()
    }
}

impl<Tz: chrono::TimeZone> UtcInstant for DateTime<Tz> {
    fn utc_instant(&self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

impl_kinded_instant! {
    NaiveDateTime, KIND_UNSPECIFIED, |utc| utc.naive_utc();
    DateTime<Utc>, KIND_UTC, |utc| utc;
    DateTime<Local>, KIND_LOCAL, |utc| utc.with_timezone(&Local);
}

impl FixedSize for DateTime<FixedOffset> {
    const SIZE: usize = 16;
}

impl BinaryEncode for DateTime<FixedOffset> {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        write_instant(writer, &self.utc_instant())?;
        writer.write_i32(self.offset().local_minus_utc())
    }
}

impl BinaryDecode for DateTime<FixedOffset> {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let utc = read_instant(reader)?;
        let seconds = reader.read_i32()?;
        let offset = FixedOffset::east_opt(seconds)
            .ok_or(CodecError::invalid("FixedOffset", i64::from(seconds)))?;
        Ok(utc.with_timezone(&offset))
    }
}

impl FixedSize for NaiveDate {
    const SIZE: usize = 4;
}

impl BinaryEncode for NaiveDate {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_i32(self.num_days_from_ce())
    }
}

impl BinaryDecode for NaiveDate {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let days = reader.read_i32()?;
        NaiveDate::from_num_days_from_ce_opt(days)
            .ok_or(CodecError::invalid("NaiveDate", i64::from(days)))
    }
}

impl FixedSize for NaiveTime {
    const SIZE: usize = 8;
}

impl BinaryEncode for NaiveTime {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_u32(self.num_seconds_from_midnight())?;
        writer.write_u32(self.nanosecond())
    }
}

impl BinaryDecode for NaiveTime {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let seconds = reader.read_u32()?;
        let nanos = reader.read_u32()?;
        NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos)
            .ok_or(CodecError::invalid("NaiveTime", i64::from(seconds)))
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

    fn roundtrip<T: BinaryEncode + BinaryDecode + FixedSize>(
        value: &T,
        endianness: Endianness,
    ) -> Result<T, CodecError> {
        let mut bytes = Vec::new();
        BinaryBufferWriter::new(&mut bytes, endianness).write(value)?;
        assert_eq!(bytes.len(), T::SIZE);
        let mut offset = 0;
        let value = BinaryReader::new(&bytes, &mut offset, endianness).read()?;
        assert_eq!(offset, T::SIZE);
        Ok(value)
    }

    #[test]
    fn time_delta_negative_with_nanos() {
        let delta = TimeDelta::milliseconds(-1_500);
        for endianness in [Endianness::Little, Endianness::Big] {
            assert_eq!(roundtrip(&delta, endianness).unwrap(), delta);
        }
        assert_eq!(roundtrip(&TimeDelta::MAX, Endianness::Big).unwrap(), TimeDelta::MAX);
        assert_eq!(roundtrip(&TimeDelta::MIN, Endianness::Big).unwrap(), TimeDelta::MIN);
    }

    #[test]
    fn instants_keep_their_kind() {
        let utc = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(roundtrip(&utc, Endianness::Big).unwrap(), utc);
        let naive = utc.naive_utc();
        assert_eq!(roundtrip(&naive, Endianness::Little).unwrap(), naive);
        let local = utc.with_timezone(&Local);
        assert_eq!(roundtrip(&local, Endianness::Big).unwrap(), local);
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let utc = DateTime::from_timestamp(0, 0).unwrap();
        let mut bytes = Vec::new();
        BinaryBufferWriter::new(&mut bytes, Endianness::Big)
            .write(&utc)
            .unwrap();
        assert_eq!(bytes[12], KIND_UTC);
        let mut offset = 0;
        let result = BinaryReader::new(&bytes, &mut offset, Endianness::Big).read::<NaiveDateTime>();
        assert_eq!(
            result,
            Err(CodecError::InvalidValue {
                type_name: "DateTime kind",
                value: 1
            })
        );
    }

    #[test]
    fn fixed_offset_is_preserved() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let value = DateTime::from_timestamp(86_400, 7).unwrap().with_timezone(&offset);
        let decoded = roundtrip(&value, Endianness::Little).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn date_and_time() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(roundtrip(&date, Endianness::Big).unwrap(), date);
        let time = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap();
        assert_eq!(roundtrip(&time, Endianness::Little).unwrap(), time);
    }

    #[test]
    fn out_of_range_date_is_rejected() {
        let bytes = i32::MAX.to_be_bytes();
        let mut offset = 0;
        let result = BinaryReader::new(&bytes, &mut offset, Endianness::Big).read::<NaiveDate>();
        assert!(matches!(result, Err(CodecError::InvalidValue { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_utc_roundtrip(seconds in -8_000_000_000i64..8_000_000_000, nanos in 0u32..1_000_000_000) {
            let value = DateTime::from_timestamp(seconds, nanos).unwrap();
            for endianness in [Endianness::Little, Endianness::Big] {
                prop_assert_eq!(roundtrip(&value, endianness).unwrap(), value);
            }
        }

        #[test]
        fn prop_time_delta_roundtrip(millis in any::<i64>().prop_map(|m| m / 4)) {
            let delta = TimeDelta::milliseconds(millis);
            prop_assert_eq!(roundtrip(&delta, Endianness::Big).unwrap(), delta);
        }
    }
}
