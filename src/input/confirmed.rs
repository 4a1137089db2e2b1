use std::ops::{Index, IndexMut};

use smallvec::SmallVec;

use crate::{PlayerHandle, MAX_PLAYERS};

/// The agreed inputs of every player for one frame.
///
/// Holds one `T` per player slot, inline for up to [`MAX_PLAYERS`] players. Slots nobody has
/// written hold `T::default()`.
///
/// ```
/// use rampart::{ConfirmedInputs, PlayerHandle};
///
/// let mut inputs = ConfirmedInputs::<u8>::new(2);
/// inputs[PlayerHandle::new(1)] = 0b0101;
/// assert_eq!(inputs.as_slice(), &[0, 0b0101]);
/// assert_eq!(inputs.get(PlayerHandle::new(2)), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmedInputs<T: Copy + Default> {
    inputs: SmallVec<[T; MAX_PLAYERS]>,
}

impl<T: Copy + Default> ConfirmedInputs<T> {
    /// `num_players` default inputs.
    #[must_use]
    pub fn new(num_players: usize) -> Self {
        Self {
            inputs: smallvec::smallvec![T::default(); num_players],
        }
    }

    /// Copies one input per player from `inputs`.
    #[must_use]
    pub fn from_slice(inputs: &[T]) -> Self {
        Self {
            inputs: SmallVec::from_slice(inputs),
        }
    }

    /// Number of player slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Returns `true` if there are no player slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// The input of `player`, if that slot exists.
    #[must_use]
    pub fn get(&self, player: PlayerHandle) -> Option<&T> {
        self.inputs.get(player.as_usize())
    }

    /// Mutable access to the input of `player`, if that slot exists.
    pub fn get_mut(&mut self, player: PlayerHandle) -> Option<&mut T> {
        self.inputs.get_mut(player.as_usize())
    }

    /// All inputs in player order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.inputs
    }

    /// Iterates over the inputs in player order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.inputs.iter()
    }
}

impl<T: Copy + Default> Default for ConfirmedInputs<T> {
    fn default() -> Self {
        Self {
            inputs: SmallVec::new(),
        }
    }
}

impl<T: Copy + Default> Index<PlayerHandle> for ConfirmedInputs<T> {
    type Output = T;

    fn index(&self, player: PlayerHandle) -> &T {
        &self.inputs[player.as_usize()]
    }
}

impl<T: Copy + Default> IndexMut<PlayerHandle> for ConfirmedInputs<T> {
    fn index_mut(&mut self, player: PlayerHandle) -> &mut T {
        &mut self.inputs[player.as_usize()]
    }
}

impl<'a, T: Copy + Default> IntoIterator for &'a ConfirmedInputs<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Copy + Default> FromIterator<T> for ConfirmedInputs<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inputs: iter.into_iter().collect(),
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

    #[test]
    fn new_fills_defaults() {
        let inputs = ConfirmedInputs::<u16>::new(3);
        assert_eq!(inputs.len(), 3);
        assert!(inputs.iter().all(|&i| i == 0));
        assert!(ConfirmedInputs::<u16>::default().is_empty());
    }

    #[test]
    fn index_by_player() {
        let mut inputs = ConfirmedInputs::from_slice(&[1u8, 2, 3, 4]);
        inputs[PlayerHandle::new(2)] = 9;
        *inputs.get_mut(PlayerHandle::new(0)).unwrap() = 7;
        assert_eq!(inputs.as_slice(), &[7, 2, 9, 4]);
        assert!(inputs.get_mut(PlayerHandle::new(4)).is_none());
    }

    #[test]
    fn collects_from_iterator() {
        let inputs: ConfirmedInputs<i32> = (0..2).collect();
        assert_eq!(inputs, ConfirmedInputs::from_slice(&[0, 1]));
        let summed: i32 = (&inputs).into_iter().sum();
        assert_eq!(summed, 1);
    }
}
