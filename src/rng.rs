//! A small PCG32 generator.
//!
//! Sync tests fill missing local inputs with random data. The data only has to be
//! reproducible from a seed, so a 64-bit-state PCG-XSH-RR generator is enough and keeps the
//! dependency list short.
//!
//! Reference: <https://www.pcg-random.org/>
//!
//! ```rust
//! use rampart::rng::{Pcg32, Rng, SeedableRng};
//!
//! let mut a = Pcg32::seed_from_u64(12345);
//! let mut b = Pcg32::seed_from_u64(12345);
//! assert_eq!(a.next_u32(), b.next_u32());
//!
//! let mut pad = [0u8; 6];
//! a.fill_bytes(&mut pad);
//! let mut same = [0u8; 6];
//! b.fill_bytes(&mut same);
//! assert_eq!(pad, same);
//! ```

use crate::checksum::fnv1a32;

const PCG_DEFAULT_STREAM: u64 = 1_442_695_040_888_963_407;
const PCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;

/// PCG32 random number generator. Not cryptographically secure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    /// Creates a generator from an initial state and a stream selector.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        let inc = (stream << 1) | 1;
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Generates the next 32-bit value.
    #[inline]
    #[must_use]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        // XSH-RR output permutation
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generates the next 64-bit value from two 32-bit draws.
    #[inline]
    #[must_use]
    pub fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }
}

/// Construction of generators from seeds.
pub trait SeedableRng: Sized {
    /// Creates a generator whose sequence depends only on `seed`.
    #[must_use]
    fn seed_from_u64(seed: u64) -> Self;

    /// Creates a generator seeded from the clock and thread identity.
    #[must_use]
    fn from_entropy() -> Self;
}

impl SeedableRng for Pcg32 {
    fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_STREAM)
    }

    fn from_entropy() -> Self {
        Self::seed_from_u64(timing_entropy_seed())
    }
}

/// A source of random words and bytes.
pub trait Rng {
    /// Returns the next 32-bit random value.
    fn next_u32(&mut self) -> u32;

    /// Returns the next 64-bit random value.
    fn next_u64(&mut self) -> u64;

    /// Fills `dest` with random bytes.
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(4);
        for chunk in chunks.by_ref() {
            chunk.copy_from_slice(&self.next_u32().to_le_bytes());
        }
        let remainder = chunks.into_remainder();
        if !remainder.is_empty() {
            let val = self.next_u32().to_le_bytes();
            if let Some(val_slice) = val.get(..remainder.len()) {
                remainder.copy_from_slice(val_slice);
            }
        }
    }
}

impl Rng for Pcg32 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        Self::next_u32(self)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        Self::next_u64(self)
    }
}

/// Non-deterministic seed from wall-clock time and thread identity.
fn timing_entropy_seed() -> u64 {
    let nanos = web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let thread = format!("{:?}", std::thread::current().id());
    let thread_hash = u64::from(fnv1a32(thread.as_bytes()));
    (nanos as u64) ^ (thread_hash << 32) ^ thread_hash
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
    fn same_seed_same_sequence() {
        let mut a = Pcg32::seed_from_u64(42);
        let mut b = Pcg32::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Pcg32::seed_from_u64(1);
        let mut b = Pcg32::seed_from_u64(2);
        let same = (0..32).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 4);
    }

    #[test]
    fn known_first_output() {
        // reference PCG32 with state 42, stream 54
        let mut rng = Pcg32::new(42, 54);
        assert_eq!(rng.next_u32(), 0xa15c_02b7);
        assert_eq!(rng.next_u32(), 0x7b47_f409);
    }

    #[test]
    fn fill_bytes_covers_remainder() {
        let mut rng = Pcg32::seed_from_u64(99);
        let mut buf = [0u8; 7];
        rng.fill_bytes(&mut buf);
        let mut again = Pcg32::seed_from_u64(99);
        let mut expected = [0u8; 7];
        again.fill_bytes(&mut expected);
        assert_eq!(buf, expected);
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn entropy_seeds_construct() {
        let mut rng = Pcg32::from_entropy();
        let _ = rng.next_u32();
    }
}
