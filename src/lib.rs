//! # Rampart
//!
//! Rampart is the wire-protocol and input-synchronization core for rollback netcode, written in
//! 100% safe Rust. It does not own a socket or a game loop. It gives both of them a shared,
//! bit-exact vocabulary:
//!
//! - [`serialization`]: a fixed-layout binary codec with a per-session byte order.
//! - [`Frame`], [`FrameSpan`] and [`FrameRange`]: the frame-indexed time domain.
//! - [`network`]: quality and consistency-check messages and the peer connection lifecycle.
//! - [`input`]: the confirmed-input context, recording listeners, replay providers and
//!   compression.
//! - [`desync`] and [`SyncTestSession`]: forced-rollback self tests that catch
//!   non-deterministic simulations.
//!
//! Like the rest of the request-driven API, sessions return a list of [`SessionRequest`]s for
//! the host to fulfil in order instead of calling back into game code.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
use std::fmt::Debug;

pub use error::{RampartError, RampartResult};
pub use frame_info::{GameInput, StateSnapshot};
pub use frame_range::FrameRange;
pub use frame_span::{FrameRate, FrameSpan};
pub use input::{ConfirmedInputs, InputContext};
pub use network::messages::{
    ConsistencyCheckReply, ConsistencyCheckRequest, QualityReply, QualityReport,
};
pub use network::protocol::{PeerProtocol, PlayerConnectionStatus, ProtocolStatus};
pub use serialization::Endianness;
pub use sessions::builder::SessionBuilder;
pub use sessions::config::{ProtocolConfig, ReplayConfig, SyncTestConfig};
pub use sessions::replay_session::ReplaySession;
pub use sessions::sync_test_session::SyncTestSession;
pub use state_cell::StateCell;

pub mod checksum;
pub mod desync;
#[doc(hidden)]
pub mod error;
#[doc(hidden)]
pub mod frame_info;
mod frame_range;
mod frame_span;
pub mod input;
pub mod prelude;
/// Internal random number generator based on PCG32.
///
/// Drives [`RandomInputGenerator`](crate::input::RandomInputGenerator) so that sync tests are
/// reproducible from a seed.
pub mod rng;
pub mod serialization;
mod state_cell;
pub mod telemetry;
#[doc(hidden)]
pub mod test_config;
pub mod sessions {
    //! Request-driven sessions and their configuration.
    pub mod builder;
    pub mod config;
    pub mod replay_session;
    pub mod sync_test_session;
}
pub mod network {
    //! Protocol messages and the peer connection state machine.
    //!
    //! Sending and receiving packets is left to the transport; this module only turns messages
    //! into bytes and back, and tracks what a peer is allowed to do next.
    pub mod messages;
    pub mod protocol;
}

// #############
// # CONSTANTS #
// #############

/// Raw value of [`Frame::NULL`].
pub const NULL_FRAME: i32 = -1;

/// Maximum number of player slots in one session.
///
/// [`ConfirmedInputs`] keeps up to this many inputs on the stack.
pub const MAX_PLAYERS: usize = 4;

/// Index of one simulation step.
///
/// Frames start at 0 and increase by one per simulation step. The special value [`Frame::NULL`]
/// ([`NULL_FRAME`], -1) means "no frame yet"; it orders before every real frame and is never
/// the result of [`next`](Frame::next) on a real frame.
///
/// On the wire a frame is an `i32` in the session byte order.
///
/// # Examples
///
/// ```
/// use rampart::Frame;
///
/// let frame = Frame::new(0);
/// assert!(frame.is_valid());
/// assert!(Frame::NULL.is_null());
/// assert!(Frame::NULL < frame);
///
/// assert_eq!(frame.next(), Frame::new(1));
/// assert_eq!((frame + 5).as_i32(), 5);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Frame(i32);

impl Frame {
    /// No frame yet.
    pub const NULL: Frame = Frame(NULL_FRAME);

    /// The first frame of a session.
    pub const ZERO: Frame = Frame(0);

    /// Wraps a raw frame number. Negative numbers are accepted; see [`is_valid`](Self::is_valid).
    #[inline]
    #[must_use]
    pub const fn new(frame: i32) -> Self {
        Frame(frame)
    }

    /// The raw frame number.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// The frame after this one.
    ///
    /// ```
    /// use rampart::Frame;
    ///
    /// assert_eq!(Frame::new(41).next(), Frame::new(42));
    /// assert_eq!(Frame::NULL.next(), Frame::ZERO);
    /// ```
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Frame(self.0 + 1)
    }

    /// `true` for [`Frame::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == NULL_FRAME
    }

    /// `true` for frame 0 and later.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// `None` for negative frames.
    #[inline]
    #[must_use]
    pub const fn to_option(self) -> Option<Frame> {
        if self.is_valid() {
            Some(self)
        } else {
            None
        }
    }

    /// Inverse of [`to_option`](Self::to_option): `None` maps to [`Frame::NULL`].
    #[inline]
    #[must_use]
    pub const fn from_option(opt: Option<Frame>) -> Frame {
        match opt {
            Some(f) => f,
            None => Frame::NULL,
        }
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "NULL_FRAME")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::ops::Add<i32> for Frame {
    type Output = Frame;

    #[inline]
    fn add(self, rhs: i32) -> Self::Output {
        Frame(self.0 + rhs)
    }
}

impl std::ops::AddAssign<i32> for Frame {
    #[inline]
    fn add_assign(&mut self, rhs: i32) {
        self.0 += rhs;
    }
}

impl std::ops::Sub<i32> for Frame {
    type Output = Frame;

    #[inline]
    fn sub(self, rhs: i32) -> Self::Output {
        Frame(self.0 - rhs)
    }
}

impl std::ops::Sub<Frame> for Frame {
    type Output = i32;

    #[inline]
    fn sub(self, rhs: Frame) -> Self::Output {
        self.0 - rhs.0
    }
}

impl std::ops::SubAssign<i32> for Frame {
    #[inline]
    fn sub_assign(&mut self, rhs: i32) {
        self.0 -= rhs;
    }
}

impl std::ops::Rem<i32> for Frame {
    type Output = i32;

    #[inline]
    fn rem(self, rhs: i32) -> Self::Output {
        self.0 % rhs
    }
}

impl From<i32> for Frame {
    #[inline]
    fn from(value: i32) -> Self {
        Frame(value)
    }
}

impl From<Frame> for i32 {
    #[inline]
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

impl PartialEq<i32> for Frame {
    #[inline]
    fn eq(&self, other: &i32) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<i32> for Frame {
    #[inline]
    fn partial_cmp(&self, other: &i32) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

/// Index of a player slot, `0..num_players`.
///
/// # Examples
///
/// ```
/// use rampart::PlayerHandle;
///
/// let handle = PlayerHandle::new(1);
/// assert!(handle.is_valid_player_for(2));
/// assert!(!handle.is_valid_player_for(1));
/// assert_eq!(handle.as_usize(), 1);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PlayerHandle(usize);

impl PlayerHandle {
    /// Handle for slot `handle`.
    #[inline]
    #[must_use]
    pub const fn new(handle: usize) -> Self {
        PlayerHandle(handle)
    }

    /// The slot index.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns `true` if this handle names a slot in a session with `num_players` players.
    #[inline]
    #[must_use]
    pub const fn is_valid_player_for(self, num_players: usize) -> bool {
        self.0 < num_players
    }
}

impl std::fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for PlayerHandle {
    #[inline]
    fn from(value: usize) -> Self {
        PlayerHandle(value)
    }
}

impl From<PlayerHandle> for usize {
    #[inline]
    fn from(handle: PlayerHandle) -> Self {
        handle.0
    }
}

/// Requests that you can receive from a session. Handling them is mandatory.
///
/// # ⚠️ CRITICAL: Request Ordering
///
/// **Requests MUST be fulfilled in the exact order they are returned.** A sync test returns
/// `LoadGameState` followed by a run of `SaveGameState` / `AdvanceFrame` pairs when it rolls
/// back; handling them out of order resimulates from the wrong state and reports a desync that
/// is not there.
///
/// # Example
///
/// ```ignore
/// for request in session.advance_frame()? {
///     match request {
///         SessionRequest::SaveGameState { cell, frame } => {
///             cell.save(frame, game.to_bytes(), Some(game.clone()));
///         }
///         SessionRequest::LoadGameState { cell, .. } => {
///             if let Some(state) = cell.load() {
///                 game = state;
///             }
///         }
///         SessionRequest::AdvanceFrame { inputs } => game.step(&inputs),
///         _ => unreachable!(),
///     }
/// }
/// ```
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`. Always include a wildcard arm when matching.
#[non_exhaustive]
pub enum SessionRequest<T>
where
    T: Config,
{
    /// Serialize the current state into `cell`. The state must be the one *before* `frame` is
    /// advanced.
    SaveGameState {
        /// Use `cell.save(...)` to store the serialized state.
        cell: StateCell<T::State>,
        /// Sanity check: the frame the saved state belongs to.
        frame: Frame,
    },
    /// Replace the current state with the one stored in `cell`.
    LoadGameState {
        /// Use `cell.load()` to get the state back.
        cell: StateCell<T::State>,
        /// Sanity check: the frame the loaded state belongs to.
        frame: Frame,
    },
    /// Advance the simulation by one frame with these confirmed inputs.
    AdvanceFrame {
        /// One input per player slot.
        inputs: ConfirmedInputs<T::Input>,
    },
}

impl<T: Config> std::fmt::Debug for SessionRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SaveGameState { frame, .. } => f
                .debug_struct("SaveGameState")
                .field("frame", frame)
                .finish_non_exhaustive(),
            Self::LoadGameState { frame, .. } => f
                .debug_struct("LoadGameState")
                .field("frame", frame)
                .finish_non_exhaustive(),
            Self::AdvanceFrame { inputs } => f
                .debug_struct("AdvanceFrame")
                .field("inputs", inputs)
                .finish(),
        }
    }
}

// #############
// #  TRAITS   #
// #############

/// Thread-safety bound for host-supplied collaborators (listeners, providers, handlers).
///
/// With the `sync-send` feature this is `Send + Sync`; without it, every type satisfies it.
/// It is implemented automatically.
#[cfg(feature = "sync-send")]
pub trait MaybeSendSync: Send + Sync {}

#[cfg(feature = "sync-send")]
impl<T: ?Sized + Send + Sync> MaybeSendSync for T {}

/// Thread-safety bound for host-supplied collaborators (listeners, providers, handlers).
///
/// With the `sync-send` feature this is `Send + Sync`; without it, every type satisfies it.
/// It is implemented automatically.
#[cfg(not(feature = "sync-send"))]
pub trait MaybeSendSync {}

#[cfg(not(feature = "sync-send"))]
impl<T: ?Sized> MaybeSendSync for T {}

/// Binds a game's types to a session.
///
/// Implement this on a marker struct to bind your game's input and state types.
///
/// # Example
///
/// ```
/// use rampart::serialization::PlainDataSerializer;
/// use rampart::Config;
///
/// #[repr(C)]
/// #[derive(Copy, Clone, Debug, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
/// struct PadInput {
///     buttons: u8,
///     stick_x: i8,
/// }
///
/// #[derive(Clone)]
/// struct GameState {
///     frame: i32,
/// }
///
/// struct GameConfig;
///
/// impl Config for GameConfig {
///     type Input = PadInput;
///     type InputSerializer = PlainDataSerializer<PadInput>;
///     type State = GameState;
/// }
/// ```
#[cfg(feature = "sync-send")]
pub trait Config: 'static + Send + Sync {
    /// The per-player input type.
    ///
    /// The [`Default`] value stands for "no input" and fills slots nobody has written yet.
    type Input: Copy + Default + PartialEq + Debug + Send + Sync + 'static;

    /// Fixed-size wire layout for [`Input`](Self::Input).
    type InputSerializer: serialization::BinarySerializer<Self::Input> + Default + 'static;

    /// The save state type handed back through [`StateCell`].
    type State: Clone + Send + Sync + 'static;
}

/// Binds a game's types to a session.
#[cfg(not(feature = "sync-send"))]
pub trait Config: 'static {
    /// The per-player input type.
    ///
    /// The [`Default`] value stands for "no input" and fills slots nobody has written yet.
    type Input: Copy + Default + PartialEq + Debug + 'static;

    /// Fixed-size wire layout for [`Input`](Self::Input).
    type InputSerializer: serialization::BinarySerializer<Self::Input> + Default + 'static;

    /// The save state type handed back through [`StateCell`].
    type State: Clone + 'static;
}

// ###################
// # UNIT TESTS      #
// ###################

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

    // ==========================================
    // PlayerHandle Tests
    // ==========================================

    #[test]
    fn player_handle_is_valid_player_for() {
        let handle = PlayerHandle::new(0);
        assert!(handle.is_valid_player_for(1));
        assert!(!handle.is_valid_player_for(0));

        let handle = PlayerHandle::new(3);
        assert!(handle.is_valid_player_for(MAX_PLAYERS));
        assert!(!handle.is_valid_player_for(3));
    }

    #[test]
    fn player_handle_conversions() {
        let handle: PlayerHandle = 2usize.into();
        assert_eq!(usize::from(handle), 2);
        assert_eq!(handle.to_string(), "2");
    }

    // ==========================================
    // Frame Tests
    // ==========================================

    #[test]
    fn frame_null_constant() {
        assert_eq!(Frame::NULL.as_i32(), -1);
        assert!(Frame::NULL.is_null());
        assert!(!Frame::NULL.is_valid());
        assert_eq!(Frame::NULL.to_string(), "NULL_FRAME");
    }

    #[test]
    fn frame_null_orders_before_real_frames() {
        assert!(Frame::NULL < Frame::ZERO);
        assert!(Frame::NULL < Frame::new(i32::MAX));
        let mut frames = vec![Frame::new(3), Frame::NULL, Frame::ZERO];
        frames.sort();
        assert_eq!(frames, vec![Frame::NULL, Frame::ZERO, Frame::new(3)]);
    }

    #[test]
    fn frame_arithmetic() {
        let frame = Frame::new(10);
        assert_eq!((frame + 5).as_i32(), 15);
        assert_eq!((frame - 3).as_i32(), 7);
        assert_eq!(Frame::new(10) - Frame::new(5), 5);
        assert_eq!(Frame::new(135) % 128, 7);

        let mut frame = Frame::new(10);
        frame += 5;
        frame -= 3;
        assert_eq!(frame, 12);
    }

    #[test]
    fn frame_option_roundtrip() {
        assert!(Frame::NULL.to_option().is_none());
        assert_eq!(Frame::new(5).to_option(), Some(Frame::new(5)));
        assert_eq!(Frame::from_option(None), Frame::NULL);
        assert_eq!(Frame::from_option(Some(Frame::new(5))), Frame::new(5));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_frame_order_matches_integers(a in -1i32..i32::MAX - 1, b in -1i32..i32::MAX - 1) {
            prop_assume!(a < b);
            prop_assert!(Frame::new(a) < Frame::new(b));
        }

        #[test]
        fn prop_next_adds_one(a in -1i32..i32::MAX - 1) {
            prop_assert_eq!(Frame::new(a).next(), Frame::new(a + 1));
        }
    }
}
