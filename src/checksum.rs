//! State checksum utilities for desync detection.
//!
//! Peers and the sync-test harness compare `u32` checksums of serialized game state. For the
//! comparison to mean anything the checksum must be **deterministic across all peers**:
//!
//! - Same state → same serialized bytes → same checksum
//! - Serialization must be platform-independent (fixed-size integers, fixed byte order)
//! - Hash algorithm must not be seeded
//!
//! # Usage
//!
//! Hash bytes you already have with [`fletcher32`] (the default used by sessions) or
//! [`fnv1a32`]. For serde types, [`compute_checksum`] serializes with bincode's fixed-int
//! encoding first:
//!
//! ```
//! use rampart::checksum::compute_checksum;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct GameState {
//!     frame: u32,
//!     player_x: f32,
//!     player_y: f32,
//! }
//!
//! let state = GameState { frame: 100, player_x: 1.0, player_y: 2.0 };
//! let checksum = compute_checksum(&state).expect("serialization should succeed");
//!
//! // Same state produces same checksum
//! assert_eq!(checksum, compute_checksum(&state).expect("serialization should succeed"));
//! ```
//!
//! # Performance Considerations
//!
//! Checksumming requires serializing the entire state. Sessions only do it when they save a
//! state they will compare later, so the cost scales with the sync-test check distance rather
//! than the frame rate.

use serde::Serialize;

use crate::error::RampartError;
use crate::serialization::codec::encode;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Computes a deterministic `u32` checksum of a serializable game state.
///
/// Serializes with bincode (fixed-int encoding) and hashes the bytes with [`fletcher32`].
///
/// # Errors
///
/// [`RampartError::SerializationError`] if the state cannot be serialized.
///
/// # Example
///
/// ```
/// use rampart::checksum::compute_checksum;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct State {
///     frame: u32,
///     position: (f32, f32),
/// }
///
/// let state = State { frame: 42, position: (1.0, 2.0) };
/// let checksum = compute_checksum(&state).expect("should succeed");
/// assert_eq!(checksum, compute_checksum(&state).unwrap());
/// ```
pub fn compute_checksum<T: Serialize>(state: &T) -> Result<u32, RampartError> {
    let bytes = encode(state).map_err(|err| RampartError::SerializationError {
        context: format!("checksum: {err}"),
    })?;
    Ok(fletcher32(&bytes))
}

/// Computes the Fletcher-32 checksum of a byte slice.
///
/// Bytes are consumed as little-endian 16-bit words; an odd trailing byte is padded with zero.
/// The result is `(sum2 << 16) | sum1` with both sums taken mod 65535.
///
/// ```
/// use rampart::checksum::fletcher32;
///
/// assert_eq!(fletcher32(b"abcde"), 0xF04F_C729);
/// assert_eq!(fletcher32(&[]), 0);
/// ```
///
/// # References
///
/// - [Wikipedia: Fletcher's checksum](https://en.wikipedia.org/wiki/Fletcher%27s_checksum)
#[must_use]
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;

    for word in data.chunks(2) {
        let (lo, hi) = match *word {
            [lo, hi] => (lo, hi),
            [lo] => (lo, 0),
            _ => (0, 0),
        };
        sum1 = (sum1 + u32::from(u16::from_le_bytes([lo, hi]))) % 65535;
        sum2 = (sum2 + sum1) % 65535;
    }

    (sum2 << 16) | sum1
}

/// Computes the 32-bit FNV-1a hash of a byte slice.
///
/// Cheaper than [`fletcher32`] to combine incrementally and with better spread on short input.
///
/// ```
/// use rampart::checksum::fnv1a32;
///
/// assert_eq!(fnv1a32(&[]), 0x811C_9DC5);
/// assert_eq!(fnv1a32(b"a"), fnv1a32(b"a"));
/// ```
#[inline]
#[must_use]
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

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
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
    struct TestState {
        frame: u32,
        position: (f32, f32),
        health: i16,
        name: String,
    }

    fn sample_state() -> TestState {
        TestState {
            frame: 100,
            position: (1.5, 2.5),
            health: 100,
            name: "Player1".to_string(),
        }
    }

    #[test]
    fn compute_checksum_deterministic() {
        let state = sample_state();
        assert_eq!(
            compute_checksum(&state).unwrap(),
            compute_checksum(&state).unwrap()
        );
    }

    #[test]
    fn compute_checksum_different_states() {
        let state1 = sample_state();
        let mut state2 = sample_state();
        state2.frame = 101;
        assert_ne!(
            compute_checksum(&state1).unwrap(),
            compute_checksum(&state2).unwrap()
        );
    }

    #[test]
    fn compute_checksum_struct_field_order_matters() {
        #[derive(Serialize)]
        struct State1 {
            a: u32,
            b: u32,
        }

        #[derive(Serialize)]
        struct State2 {
            b: u32,
            a: u32,
        }

        let checksum1 = compute_checksum(&State1 { a: 1, b: 2 }).unwrap();
        let checksum2 = compute_checksum(&State2 { a: 1, b: 2 }).unwrap();
        assert_ne!(checksum1, checksum2);
    }

    #[test]
    fn fletcher32_known_values() {
        assert_eq!(fletcher32(b"abcde"), 0xF04F_C729);
        assert_eq!(fletcher32(b"abcdef"), 0x5650_2D2A);
        assert_eq!(fletcher32(b"abcdefgh"), 0xEBE1_9591);
    }

    #[test]
    fn fletcher32_empty_is_zero() {
        assert_eq!(fletcher32(&[]), 0);
    }

    #[test]
    fn fletcher32_handles_long_input() {
        let data: Vec<u8> = (0..100_000).map(|i| (i % 256) as u8).collect();
        assert_eq!(fletcher32(&data), fletcher32(&data));
    }

    #[test]
    fn fnv1a32_known_values() {
        assert_eq!(fnv1a32(&[]), 0x811C_9DC5);
        assert_eq!(fnv1a32(b"a"), 0xE40C_292C);
        assert_eq!(fnv1a32(b"foobar"), 0xBF9C_F968);
    }

    // ==========================================
    // Property Tests
    // ==========================================

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_different_frames_different_checksums(frame1 in any::<u32>(), frame2 in any::<u32>()) {
            prop_assume!(frame1 != frame2);

            #[derive(Serialize)]
            struct State { frame: u32 }

            let checksum1 = compute_checksum(&State { frame: frame1 }).unwrap();
            let checksum2 = compute_checksum(&State { frame: frame2 }).unwrap();
            prop_assert_ne!(checksum1, checksum2);
        }

        #[test]
        fn prop_fletcher32_sums_are_reduced(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let checksum = fletcher32(&data);
            prop_assert!(checksum & 0xFFFF < 65535);
            prop_assert!(checksum >> 16 < 65535);
        }
    }
}
