//! Deflate compression for input recordings.
//!
//! Recordings are raw deflate streams (RFC 1951, no zlib or gzip header) over back-to-back
//! fixed-stride records. The stride is not stored; readers take it from the session's
//! [`InputContext`](super::InputContext).

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::RampartError;

/// Compresses `bytes` into a raw deflate stream.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, RampartError> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|err| RampartError::io("compressing inputs", &err))?;
    encoder
        .finish()
        .map_err(|err| RampartError::io("finishing compressed inputs", &err))
}

/// Inflates a raw deflate stream.
///
/// Corrupt input is an [`RampartError::InvalidReplaySource`].
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, RampartError> {
    let mut decoded = Vec::with_capacity(bytes.len() * 4);
    DeflateDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .map_err(|err| RampartError::InvalidReplaySource {
            reason: format!("compressed inputs are corrupt: {err}"),
        })?;
    Ok(decoded)
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

    #[test]
    fn repetitive_records_shrink() {
        let records: Vec<u8> = std::iter::repeat([0u8, 0, 1, 0]).take(1024).flatten().collect();
        let compressed = compress(&records).unwrap();
        assert!(compressed.len() < records.len() / 10);
        assert_eq!(decompress(&compressed).unwrap(), records);
    }

    #[test]
    fn empty_input_roundtrips() {
        let compressed = compress(&[]).unwrap();
        assert!(decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_invalid_source() {
        let result = decompress(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(RampartError::InvalidReplaySource { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_compression_is_lossless(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
            prop_assert_eq!(decompress(&compress(&bytes).unwrap()).unwrap(), bytes);
        }
    }
}
