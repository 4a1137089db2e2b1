use std::fmt;

use crate::rng::{Pcg32, Rng, SeedableRng};
use crate::serialization::PlainData;
use crate::MaybeSendSync;

/// Produces inputs for local players that the host did not provide.
///
/// Sync-test sessions ask the generator once per missing local input. Any
/// `FnMut() -> I` closure is a generator.
pub trait InputGenerator<I>: MaybeSendSync {
    /// The next input.
    fn next_input(&mut self) -> I;
}

impl<I, F> InputGenerator<I> for F
where
    F: FnMut() -> I + MaybeSendSync,
{
    fn next_input(&mut self) -> I {
        self()
    }
}

/// Fills inputs with random bytes from a seeded [`Pcg32`].
///
/// Only [`PlainData`] inputs qualify, since every bit pattern of those is a valid value.
///
/// ```
/// use rampart::input::{InputGenerator, RandomInputGenerator};
///
/// let mut a = RandomInputGenerator::<u32>::new(7);
/// let mut b = RandomInputGenerator::<u32>::new(7);
/// assert_eq!(a.next_input(), b.next_input());
/// ```
pub struct RandomInputGenerator<I> {
    rng: Pcg32,
    _input: std::marker::PhantomData<fn() -> I>,
}

impl<I: PlainData> RandomInputGenerator<I> {
    /// A generator whose sequence depends only on `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
            _input: std::marker::PhantomData,
        }
    }

    /// A generator seeded from the clock.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Pcg32::from_entropy(),
            _input: std::marker::PhantomData,
        }
    }
}

impl<I: PlainData> InputGenerator<I> for RandomInputGenerator<I> {
    fn next_input(&mut self) -> I {
        let mut value = I::zeroed();
        self.rng.fill_bytes(bytemuck::bytes_of_mut(&mut value));
        value
    }
}

impl<I> fmt::Debug for RandomInputGenerator<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomInputGenerator")
            .field("input", &std::any::type_name::<I>())
            .finish_non_exhaustive()
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

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Pad {
        buttons: u16,
        stick: [i8; 2],
    }

    #[test]
    fn seeded_generators_agree() {
        let mut a = RandomInputGenerator::<Pad>::new(11);
        let mut b = RandomInputGenerator::<Pad>::new(11);
        for _ in 0..16 {
            assert_eq!(a.next_input(), b.next_input());
        }
    }

    #[test]
    fn random_inputs_vary() {
        let mut generator = RandomInputGenerator::<u64>::new(5);
        let first = generator.next_input();
        assert!((0..8).any(|_| generator.next_input() != first));
    }

    #[test]
    fn closures_are_generators() {
        let mut counter = 0u8;
        let mut generator = move || {
            counter += 1;
            counter
        };
        assert_eq!(InputGenerator::next_input(&mut generator), 1);
        assert_eq!(InputGenerator::next_input(&mut generator), 2);
    }
}
