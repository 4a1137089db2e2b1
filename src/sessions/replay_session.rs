//! Playback of recorded confirmed inputs.
//!
//! A [`ReplaySession`] pulls every frame from an [`InputProvider`](crate::input::InputProvider)
//! and hands it to the host as requests, the same way a live session would.

use std::sync::Arc;

use tracing::debug;
use web_time::Duration;

use crate::error::RampartError;
use crate::frame_span::{FrameRate, FrameSpan};
use crate::input::{ConfirmedInputs, InputContext, InputProvider};
use crate::telemetry::ViolationObserver;
use crate::{Config, Frame, SessionRequest};

/// A [`ReplaySession`] plays back a recorded session, one frame per
/// [`advance_frame`](Self::advance_frame).
///
/// The whole recording is decoded when the session is built, so a missing or malformed source
/// fails [`SessionBuilder::start_replay_session`](crate::SessionBuilder::start_replay_session)
/// instead of surfacing halfway through playback. Replays never roll back, so the only request
/// they issue is [`SessionRequest::AdvanceFrame`].
///
/// ```
/// use rampart::input::MemoryInputProvider;
/// use rampart::{Config, ConfirmedInputs, SessionBuilder, SessionRequest};
/// use rampart::serialization::IntegerSerializer;
///
/// struct Replay;
/// impl Config for Replay {
///     type Input = u8;
///     type InputSerializer = IntegerSerializer<u8>;
///     type State = u32;
/// }
///
/// let recording = (0..3u8).map(|i| ConfirmedInputs::from_slice(&[i, i + 10]));
/// let mut session = SessionBuilder::<Replay>::new()
///     .start_replay_session(MemoryInputProvider::new(recording))?;
///
/// let mut total = 0u32;
/// while !session.is_finished() {
///     for request in session.advance_frame() {
///         if let SessionRequest::AdvanceFrame { inputs } = request {
///             total += inputs.iter().map(|&i| u32::from(i)).sum::<u32>();
///         }
///     }
/// }
/// assert_eq!(total, 33);
/// # Ok::<(), rampart::RampartError>(())
/// ```
pub struct ReplaySession<T>
where
    T: Config,
{
    context: InputContext<T::Input>,
    inputs: Arc<[ConfirmedInputs<T::Input>]>,
    current_frame: Frame,
    frame_rate: FrameRate,
    paused: bool,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<T: Config> ReplaySession<T> {
    pub(crate) fn new(
        context: InputContext<T::Input>,
        provider: &mut dyn InputProvider<T::Input>,
        frame_rate: FrameRate,
        violation_observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Result<Self, RampartError> {
        let inputs = provider.inputs(&context)?;
        if let Some(mismatched) = inputs.iter().position(|i| i.len() != context.num_players()) {
            return Err(RampartError::InvalidReplaySource {
                reason: format!(
                    "record {} holds {} inputs, the session has {} players",
                    mismatched,
                    inputs.get(mismatched).map_or(0, ConfirmedInputs::len),
                    context.num_players()
                ),
            });
        }
        debug!(frames = inputs.len(), players = context.num_players(), "replay session started");
        Ok(Self {
            context,
            inputs,
            current_frame: Frame::ZERO,
            frame_rate,
            paused: false,
            violation_observer,
        })
    }

    /// Returns the requests for the next recorded frame.
    ///
    /// The result is empty while the session is paused or once the recording is exhausted.
    #[must_use = "SessionRequests must be processed to advance the game state"]
    pub fn advance_frame(&mut self) -> Vec<SessionRequest<T>> {
        if self.paused {
            return Vec::new();
        }
        let Some(inputs) = self.inputs_at(self.current_frame).cloned() else {
            return Vec::new();
        };
        self.current_frame = self.current_frame.next();
        if self.is_finished() {
            debug!(frames = self.inputs.len(), "replay finished");
        }
        vec![SessionRequest::AdvanceFrame { inputs }]
    }

    /// Returns `true` once every recorded frame was handed out.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.frame_index() >= self.inputs.len()
    }

    /// Stops handing out frames until [`resume`](Self::resume) is called.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Continues playback after [`pause`](Self::pause).
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Returns `true` between [`pause`](Self::pause) and [`resume`](Self::resume).
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The frame the next [`advance_frame`](Self::advance_frame) will play.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.current_frame
    }

    /// Number of recorded frames.
    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.inputs.len()
    }

    /// The recorded inputs of `frame`, if the recording reaches it.
    #[must_use]
    pub fn inputs_at(&self, frame: Frame) -> Option<&ConfirmedInputs<T::Input>> {
        usize::try_from(frame.as_i32())
            .ok()
            .and_then(|index| self.inputs.get(index))
    }

    /// Playback time covered so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        FrameSpan::new(self.current_frame.as_i32()).duration(self.frame_rate)
    }

    /// Length of the whole recording.
    #[must_use]
    pub fn duration(&self) -> Duration {
        FrameSpan::new(i32::try_from(self.inputs.len()).unwrap_or(i32::MAX)).duration(self.frame_rate)
    }

    /// Returns the number of players this session was constructed with.
    #[must_use]
    pub fn num_players(&self) -> usize {
        self.context.num_players()
    }

    /// Returns the frame rate used for time conversions.
    #[must_use]
    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    /// Returns the input context the recording was decoded with.
    #[must_use]
    pub fn input_context(&self) -> &InputContext<T::Input> {
        &self.context
    }

    /// Returns a reference to the violation observer, if one was configured.
    #[must_use]
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.violation_observer.as_ref()
    }

    fn frame_index(&self) -> usize {
        usize::try_from(self.current_frame.as_i32()).unwrap_or(0)
    }
}

impl<T: Config> std::fmt::Debug for ReplaySession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySession")
            .field("num_players", &self.num_players())
            .field("current_frame", &self.current_frame)
            .field("total_frames", &self.inputs.len())
            .field("paused", &self.paused)
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
    use crate::input::{BinaryInputProvider, MemoryInputProvider};
    use crate::serialization::{Endianness, IntegerSerializer};
    use crate::PlayerHandle;

    struct TestConfig;

    impl Config for TestConfig {
        type Input = u16;
        type InputSerializer = IntegerSerializer<u16>;
        type State = ();
    }

    fn context(num_players: usize) -> InputContext<u16> {
        InputContext::new(IntegerSerializer::<u16>::new(), num_players, Endianness::Little).unwrap()
    }

    fn recording(frames: u16) -> MemoryInputProvider<u16> {
        MemoryInputProvider::new((0..frames).map(|f| ConfirmedInputs::from_slice(&[f, f * 2])))
    }

    fn session(frames: u16) -> ReplaySession<TestConfig> {
        ReplaySession::new(context(2), &mut recording(frames), FrameRate::DEFAULT, None).unwrap()
    }

    // ==========================================
    // Playback
    // ==========================================

    #[test]
    fn plays_every_frame_in_order() {
        let mut session = session(4);
        let mut seen = Vec::new();
        while !session.is_finished() {
            let requests = session.advance_frame();
            assert_eq!(requests.len(), 1);
            let SessionRequest::AdvanceFrame { inputs } = &requests[0] else {
                panic!("replays only advance");
            };
            seen.push(inputs[PlayerHandle::new(1)]);
        }
        assert_eq!(seen, vec![0, 2, 4, 6]);
        assert_eq!(session.current_frame(), Frame::new(4));
        assert!(session.advance_frame().is_empty());
    }

    #[test]
    fn empty_recording_is_finished_immediately() {
        let mut session = session(0);
        assert!(session.is_finished());
        assert!(session.advance_frame().is_empty());
        assert_eq!(session.duration(), Duration::ZERO);
    }

    #[test]
    fn pause_holds_the_frame() {
        let mut session = session(3);
        let _ = session.advance_frame();
        session.pause();
        assert!(session.is_paused());
        assert!(session.advance_frame().is_empty());
        assert_eq!(session.current_frame(), Frame::new(1));
        session.resume();
        assert_eq!(session.advance_frame().len(), 1);
        assert_eq!(session.current_frame(), Frame::new(2));
    }

    #[test]
    fn timing_follows_frame_rate() {
        let mut session = session(120);
        assert_eq!(session.total_frames(), 120);
        assert_eq!(session.duration(), Duration::from_secs(2));
        for _ in 0..60 {
            let _ = session.advance_frame();
        }
        assert_eq!(session.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn inputs_at_bounds() {
        let session = session(2);
        assert!(session.inputs_at(Frame::new(1)).is_some());
        assert!(session.inputs_at(Frame::new(2)).is_none());
        assert!(session.inputs_at(Frame::NULL).is_none());
    }

    // ==========================================
    // Invalid sources
    // ==========================================

    #[test]
    fn misaligned_bytes_prevent_construction() {
        let mut provider = BinaryInputProvider::<u16>::new(vec![0u8; 5]);
        let result =
            ReplaySession::<TestConfig>::new(context(2), &mut provider, FrameRate::DEFAULT, None);
        assert!(matches!(result, Err(RampartError::InvalidReplaySource { .. })));
    }

    #[test]
    fn player_count_mismatch_prevents_construction() {
        let result = ReplaySession::<TestConfig>::new(
            context(3),
            &mut recording(2),
            FrameRate::DEFAULT,
            None,
        );
        assert!(matches!(result, Err(RampartError::InvalidReplaySource { .. })));
    }
}
