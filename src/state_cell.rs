//! Shared save slot handed to the host in save and load requests.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::error::RampartError;
use crate::frame_info::StateSnapshot;
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::Frame;

struct SavedState<S> {
    snapshot: StateSnapshot,
    data: Option<S>,
}

/// A thread-safe cell for saving and loading game states during rollback.
///
/// `StateCell` holds two things for one frame: the **serialized** state, which sessions
/// checksum and render for desync reports, and optionally the live state object, which is what
/// [`load`](Self::load) hands back on rollback. You receive cells through
/// [`SessionRequest::SaveGameState`] and [`SessionRequest::LoadGameState`].
///
/// Cloning a cell creates a new handle to the **same** slot.
///
/// ```
/// use rampart::{Frame, StateCell};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Game {
///     x: i32,
/// }
///
/// let cell = StateCell::<Game>::default();
/// assert!(cell.frame().is_null());
///
/// assert!(cell.save(Frame::new(4), 7i32.to_be_bytes().to_vec(), Some(Game { x: 7 })));
/// assert_eq!(cell.frame(), Frame::new(4));
/// assert_eq!(cell.bytes(), vec![0, 0, 0, 7]);
/// assert_eq!(cell.load(), Some(Game { x: 7 }));
/// ```
///
/// [`SessionRequest::SaveGameState`]: crate::SessionRequest::SaveGameState
/// [`SessionRequest::LoadGameState`]: crate::SessionRequest::LoadGameState
pub struct StateCell<S>(Arc<Mutex<SavedState<S>>>);

impl<S> StateCell<S> {
    /// Saves a state into the cell, replacing whatever was there.
    ///
    /// `bytes` is the serialized state used for checksums and desync reports; `data` is the
    /// object returned by [`load`](Self::load), or `None` if you restore from `bytes` yourself.
    ///
    /// Returns `false` and leaves the cell untouched if `frame` is [`Frame::NULL`].
    pub fn save(&self, frame: Frame, bytes: Vec<u8>, data: Option<S>) -> bool {
        if frame.is_null() {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::FrameTime,
                "Attempted to save state with null frame"
            );
            return false;
        }
        let mut saved = self.0.lock();
        saved.snapshot = StateSnapshot::new(frame, bytes);
        saved.data = data;
        true
    }

    /// The frame of the saved state, or [`Frame::NULL`] if nothing was saved.
    #[must_use]
    pub fn frame(&self) -> Frame {
        self.0.lock().snapshot.frame
    }

    /// A copy of the serialized state.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().snapshot.state.clone()
    }

    /// A copy of the whole snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.0.lock().snapshot.clone()
    }

    /// Runs `f` over the serialized state without copying it.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.0.lock().snapshot.state)
    }

    /// Borrows the saved state object without cloning it.
    ///
    /// The cell stays locked while the accessor lives.
    #[must_use]
    pub fn data(&self) -> Option<StateAccessor<'_, S>> {
        MutexGuard::try_map(self.0.lock(), |saved| saved.data.as_mut())
            .ok()
            .map(|guard| StateAccessor { guard })
    }

    /// Empties the cell.
    pub fn clear(&self) {
        let mut saved = self.0.lock();
        saved.snapshot = StateSnapshot::empty();
        saved.data = None;
    }
}

impl<S: Clone> StateCell<S> {
    /// Clones the saved state object out of the cell.
    #[must_use]
    pub fn load(&self) -> Option<S> {
        self.data().map(|data| data.clone())
    }

    /// Like [`load`](Self::load), but a missing state is an error naming `frame`.
    pub fn load_or_err(&self, frame: Frame) -> Result<S, RampartError> {
        self.load().ok_or_else(|| RampartError::InvalidFrame {
            frame,
            reason: "no state object was saved for this frame".to_owned(),
        })
    }
}

impl<S> Default for StateCell<S> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(SavedState {
            snapshot: StateSnapshot::empty(),
            data: None,
        })))
    }
}

impl<S> Clone for StateCell<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S> std::fmt::Debug for StateCell<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let saved = self.0.lock();
        f.debug_struct("StateCell")
            .field("frame", &saved.snapshot.frame)
            .field("size", &saved.snapshot.size())
            .field("has_data", &saved.data.is_some())
            .finish()
    }
}

/// Read access to the state object inside a [`StateCell`].
pub struct StateAccessor<'c, S> {
    guard: MappedMutexGuard<'c, S>,
}

impl<S> Deref for StateAccessor<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard
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
    fn null_frame_is_rejected() {
        let cell = StateCell::<u32>::default();
        assert!(!cell.save(Frame::NULL, vec![1], Some(1)));
        assert!(cell.frame().is_null());
        assert!(cell.load().is_none());
    }

    #[test]
    fn clones_share_the_slot() {
        let cell = StateCell::<u32>::default();
        let other = cell.clone();
        cell.save(Frame::new(2), vec![9, 9], Some(5));
        assert_eq!(other.frame(), Frame::new(2));
        assert_eq!(other.load(), Some(5));
        assert_eq!(other.snapshot(), StateSnapshot::new(Frame::new(2), vec![9, 9]));
    }

    #[test]
    fn bytes_without_object() {
        let cell = StateCell::<String>::default();
        cell.save(Frame::new(1), vec![1, 2, 3], None);
        assert!(cell.data().is_none());
        assert_eq!(cell.with_bytes(<[u8]>::len), 3);
        assert!(matches!(
            cell.load_or_err(Frame::new(1)),
            Err(RampartError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn data_borrows_without_clone() {
        struct NotClone(u8);
        let cell = StateCell::<NotClone>::default();
        cell.save(Frame::new(0), Vec::new(), Some(NotClone(3)));
        assert_eq!(cell.data().map(|d| d.0), Some(3));
    }

    #[test]
    fn clear_empties_the_cell() {
        let cell = StateCell::<u8>::default();
        cell.save(Frame::new(8), vec![1], Some(1));
        cell.clear();
        assert!(cell.snapshot().is_empty());
        assert!(cell.load().is_none());
    }

    #[test]
    fn debug_hides_state() {
        let cell = StateCell::<u8>::default();
        cell.save(Frame::new(8), vec![1, 2], Some(1));
        let text = format!("{cell:?}");
        assert!(text.contains("StateCell"));
        assert!(text.contains("size: 2"));
    }
}
