use std::fmt;

use crate::Frame;

/// A captured, serialized game state for a single frame.
///
/// Snapshots are owned by whoever captured them (a [`StateCell`](crate::StateCell) or the desync
/// detector) and are replaced wholesale when the same slot is captured again.
///
/// # Note
///
/// This type is re-exported at the crate root but lives in a hidden module; it is part of the
/// session plumbing rather than something most hosts construct directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    /// The frame the state belongs to. [`Frame::NULL`] for an empty snapshot.
    pub frame: Frame,
    /// The serialized state.
    pub state: Vec<u8>,
}

impl StateSnapshot {
    /// Creates a snapshot of `state` at `frame`.
    #[must_use]
    pub fn new(frame: Frame, state: Vec<u8>) -> Self {
        Self { frame, state }
    }

    /// A snapshot with no frame and no bytes.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            frame: Frame::NULL,
            state: Vec::new(),
        }
    }

    /// Size of the serialized state in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.len()
    }

    /// Returns `true` if no state has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.is_null() && self.state.is_empty()
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// A single player's input for a single frame, not yet confirmed.
///
/// A `frame` of [`Frame::NULL`] marks a slot nobody has written yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GameInput<I>
where
    I: Copy + Clone + PartialEq,
{
    /// The frame this input belongs to.
    pub frame: Frame,
    /// The input value given by the player.
    pub data: I,
}

impl<I: Copy + Clone + PartialEq + Default> GameInput<I> {
    /// Creates an input for `frame`.
    pub fn new(frame: Frame, data: I) -> Self {
        Self { frame, data }
    }

    /// A default ("no buttons") input for `frame`.
    #[must_use]
    pub fn blank(frame: Frame) -> Self {
        Self {
            frame,
            data: I::default(),
        }
    }

    /// Resets the data to its default value, keeping the frame. Used to fill gaps.
    pub fn erase(&mut self) {
        self.data = I::default();
    }

    /// Moves the input to the next frame.
    pub fn increment_frame(&mut self) {
        self.frame = self.frame.next();
    }

    /// Marks the slot as unfilled.
    pub fn reset_frame(&mut self) {
        self.frame = Frame::NULL;
    }

    /// Returns `true` if the frames match (unless `input_only`) and the data match.
    #[must_use]
    pub fn equal(&self, other: &Self, input_only: bool) -> bool {
        (input_only || self.frame == other.frame) && self.data == other.data
    }
}

impl<I: Copy + Clone + PartialEq + Default> Default for GameInput<I> {
    fn default() -> Self {
        Self::blank(Frame::NULL)
    }
}

impl<I: Copy + Clone + PartialEq> fmt::Display for GameInput<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Input{{Frame: {}}}", self.frame.as_i32())
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    // ==========================================
    // StateSnapshot Tests
    // ==========================================

    #[test]
    fn empty_snapshot_has_null_frame() {
        let snapshot = StateSnapshot::default();
        assert_eq!(snapshot.frame, Frame::NULL);
        assert_eq!(snapshot.size(), 0);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn snapshot_reports_size() {
        let snapshot = StateSnapshot::new(Frame::new(3), vec![1, 2, 3, 4]);
        assert_eq!(snapshot.size(), 4);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn snapshot_replaced_wholesale() {
        let mut snapshot = StateSnapshot::new(Frame::new(3), vec![1, 2, 3, 4]);
        snapshot = StateSnapshot::new(Frame::new(3), vec![9]);
        assert_eq!(snapshot.state, vec![9]);
    }

    // ==========================================
    // GameInput Tests
    // ==========================================

    #[test]
    fn blank_input_uses_default() {
        let input = GameInput::<u8>::blank(Frame::new(5));
        assert_eq!(input.frame, Frame::new(5));
        assert_eq!(input.data, 0);
    }

    #[test]
    fn erase_keeps_frame() {
        let mut input = GameInput::new(Frame::new(7), 0xABu8);
        input.erase();
        assert_eq!(input.data, 0);
        assert_eq!(input.frame, Frame::new(7));
    }

    #[test]
    fn frame_helpers() {
        let mut input = GameInput::new(Frame::new(7), 1u16);
        input.increment_frame();
        assert_eq!(input.frame, Frame::new(8));
        input.reset_frame();
        assert!(input.frame.is_null());
        assert_eq!(GameInput::<u16>::default().frame, Frame::NULL);
    }

    #[test]
    fn equality_can_ignore_frame() {
        let a = GameInput::new(Frame::new(1), 3u8);
        let b = GameInput::new(Frame::new(2), 3u8);
        assert!(!a.equal(&b, false));
        assert!(a.equal(&b, true));
    }

    #[test]
    fn display_shows_frame() {
        assert_eq!(GameInput::new(Frame::new(12), 0u8).to_string(), "Input{Frame: 12}");
    }
}
