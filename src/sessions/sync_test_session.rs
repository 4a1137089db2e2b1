//! Forced-rollback determinism harness.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::desync::{ChecksummedState, DesyncDetector};
use crate::error::RampartError;
use crate::frame_span::FrameRate;
use crate::input::{ConfirmedInputs, InputContext, InputGenerator, InputListener, ListenerChain};
use crate::report_violation_to;
use crate::state_cell::StateCell;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{Config, Frame, PlayerHandle, SessionRequest};

/// During a [`SyncTestSession`], Rampart simulates a rollback every frame and resimulates the last
/// n frames, where n is the configured check distance.
///
/// Every state the host saves is checksummed. The first checksum recorded for a frame is kept;
/// every later save of the same frame is compared against it by a [`DesyncDetector`]. A
/// deterministic simulation never trips it.
///
/// Comparisons happen at the start of the next [`advance_frame`](Self::advance_frame), once the
/// host has fulfilled the save requests of the previous one.
///
/// Inputs are confirmed the moment they are added, so every frame's inputs are forwarded to the
/// session's input listeners exactly once, the first time the frame is simulated.
pub struct SyncTestSession<T>
where
    T: Config,
{
    check_distance: usize,
    current_frame: Frame,
    frame_rate: FrameRate,
    context: InputContext<T::Input>,
    local_inputs: BTreeMap<PlayerHandle, T::Input>,
    input_history: BTreeMap<Frame, ConfirmedInputs<T::Input>>,
    /// First cell saved for each frame still inside the check window.
    saved_cells: BTreeMap<Frame, StateCell<T::State>>,
    /// Cells handed out by the last `advance_frame`, in request order.
    pending_saves: Vec<(Frame, StateCell<T::State>)>,
    checksum_history: BTreeMap<Frame, ChecksummedState<T::State>>,
    detector: DesyncDetector<T::State>,
    input_generator: Option<Box<dyn InputGenerator<T::Input>>>,
    listeners: ListenerChain<T::Input>,
    closed: bool,
    /// Optional observer for specification violations.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<T: Config> SyncTestSession<T> {
    /// Starts the session and notifies the listeners.
    pub(crate) fn new(
        context: InputContext<T::Input>,
        check_distance: usize,
        frame_rate: FrameRate,
        detector: DesyncDetector<T::State>,
        input_generator: Option<Box<dyn InputGenerator<T::Input>>>,
        mut listeners: ListenerChain<T::Input>,
        violation_observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Result<Self, RampartError> {
        listeners.on_session_start(&context)?;
        debug!(
            players = context.num_players(),
            check_distance,
            endianness = %context.endianness(),
            "sync test session started"
        );
        Ok(Self {
            check_distance,
            current_frame: Frame::ZERO,
            frame_rate,
            context,
            local_inputs: BTreeMap::new(),
            input_history: BTreeMap::new(),
            saved_cells: BTreeMap::new(),
            pending_saves: Vec::new(),
            checksum_history: BTreeMap::new(),
            detector,
            input_generator,
            listeners,
            closed: false,
            violation_observer,
        })
    }

    /// Registers local input for a player for the current frame. Call this for every player
    /// before calling [`advance_frame()`](Self::advance_frame), unless an input generator fills
    /// the gaps.
    /// If this is called multiple times for the same player before advancing the frame, older
    /// given inputs will be overwritten.
    ///
    /// # Errors
    /// - Returns [`RampartError::InvalidRequest`] when the handle is not between 0 and
    ///   `num_players`, or the session is closed.
    pub fn add_local_input(
        &mut self,
        player_handle: PlayerHandle,
        input: T::Input,
    ) -> Result<(), RampartError> {
        self.ensure_open()?;
        if !player_handle.is_valid_player_for(self.num_players()) {
            return Err(RampartError::InvalidRequest {
                info: format!(
                    "invalid player handle {}: the session has {} players",
                    player_handle,
                    self.num_players()
                ),
            });
        }
        self.local_inputs.insert(player_handle, input);
        Ok(())
    }

    /// Advances the state by a single frame, then rolls back `check_distance` frames and
    /// resimulates them. Returns an order-sensitive [`Vec<SessionRequest>`]; fulfil the requests
    /// in the exact order they are provided.
    ///
    /// # Errors
    /// - Returns [`RampartError::ChecksumMismatch`] if a resimulated state does not match the
    ///   first one saved for its frame and the session throws on desync.
    /// - Returns [`RampartError::InvalidRequest`] if a player has no input and there is no
    ///   input generator, or the session is closed.
    /// - Returns the first listener error, after every listener has seen the frame.
    ///
    /// [`Vec<SessionRequest>`]: SessionRequest
    #[must_use = "SessionRequests must be processed to advance the game state"]
    pub fn advance_frame(&mut self) -> Result<Vec<SessionRequest<T>>, RampartError> {
        self.ensure_open()?;
        self.verify_pending_saves()?;

        let inputs = self.take_inputs()?;
        let frame = self.current_frame;
        self.listeners.on_confirmed(frame, &inputs)?;
        self.input_history.insert(frame, inputs.clone());

        let mut requests = Vec::with_capacity(3 + 2 * self.check_distance);
        if frame == Frame::ZERO && self.check_distance > 0 {
            requests.push(self.save_request(frame));
        }
        requests.push(SessionRequest::AdvanceFrame { inputs });
        self.current_frame = frame.next();

        if self.check_distance > 0 {
            requests.push(self.save_request(self.current_frame));
            let rollback_to = self.current_frame - self.check_distance as i32;
            if rollback_to.is_valid() {
                self.resimulate(rollback_to, &mut requests)?;
            }
        }

        self.prune();
        Ok(requests)
    }

    /// Compares the saves from the last [`advance_frame`](Self::advance_frame) right away and
    /// notifies the listeners that the session is over.
    ///
    /// Closing twice is a no-op. A session that is dropped without being closed is closed then,
    /// with errors only logged.
    ///
    /// # Errors
    /// - Returns [`RampartError::ChecksumMismatch`] as for `advance_frame`.
    /// - Returns the first listener error.
    pub fn close(&mut self) -> Result<(), RampartError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let verified = self.verify_pending_saves();
        let flushed = self.listeners.on_session_close();
        debug!(frames = self.current_frame.as_i32(), "sync test session closed");
        verified.and(flushed)
    }

    /// Returns the current frame of a session.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.current_frame
    }

    /// Returns the number of players this session was constructed with.
    #[must_use]
    pub fn num_players(&self) -> usize {
        self.context.num_players()
    }

    /// Returns the check distance set on creation, i.e. the length of the simulated rollbacks.
    #[must_use]
    pub fn check_distance(&self) -> usize {
        self.check_distance
    }

    /// Returns the frame rate used for time conversions.
    #[must_use]
    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    /// Returns the input context shared with the listeners.
    #[must_use]
    pub fn input_context(&self) -> &InputContext<T::Input> {
        &self.context
    }

    /// Returns the first checksum recorded for `frame`, if it is still inside the check window.
    #[must_use]
    pub fn recorded_checksum(&self, frame: Frame) -> Option<u32> {
        self.checksum_history.get(&frame).map(ChecksummedState::checksum)
    }

    /// Returns a reference to the violation observer, if one was configured.
    ///
    /// This allows checking for violations that occurred during session operations
    /// when using a [`CollectingObserver`] or similar.
    ///
    /// [`CollectingObserver`]: crate::telemetry::CollectingObserver
    #[must_use]
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.violation_observer.as_ref()
    }

    fn ensure_open(&self) -> Result<(), RampartError> {
        if self.closed {
            return Err(RampartError::InvalidRequest {
                info: "the session is closed".to_owned(),
            });
        }
        Ok(())
    }

    fn take_inputs(&mut self) -> Result<ConfirmedInputs<T::Input>, RampartError> {
        let mut inputs = ConfirmedInputs::new(self.num_players());
        for index in 0..self.num_players() {
            let handle = PlayerHandle::new(index);
            inputs[handle] = match (self.local_inputs.get(&handle), self.input_generator.as_mut()) {
                (Some(&input), _) => input,
                (None, Some(generator)) => generator.next_input(),
                (None, None) => {
                    return Err(RampartError::InvalidRequest {
                        info: format!(
                            "missing local input for player {} at frame {}",
                            handle, self.current_frame
                        ),
                    });
                },
            };
        }
        self.local_inputs.clear();
        Ok(inputs)
    }

    fn save_request(&mut self, frame: Frame) -> SessionRequest<T> {
        let cell = StateCell::default();
        self.saved_cells
            .entry(frame)
            .or_insert_with(|| cell.clone());
        self.pending_saves.push((frame, cell.clone()));
        SessionRequest::SaveGameState { cell, frame }
    }

    /// Loads `frame_to` and steps forward to the current frame, saving after every step.
    fn resimulate(
        &mut self,
        frame_to: Frame,
        requests: &mut Vec<SessionRequest<T>>,
    ) -> Result<(), RampartError> {
        let Some(cell) = self.saved_cells.get(&frame_to).cloned() else {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Critical,
                ViolationKind::InternalError,
                "no saved state to roll back to at frame {}",
                frame_to
            );
            return Err(RampartError::InternalError {
                context: format!("no saved state to roll back to at frame {frame_to}"),
            });
        };
        requests.push(SessionRequest::LoadGameState {
            cell,
            frame: frame_to,
        });
        trace!(from = %self.current_frame, to = %frame_to, "simulating rollback");

        let mut frame = frame_to;
        while frame < self.current_frame {
            let Some(inputs) = self.input_history.get(&frame).cloned() else {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Critical,
                    ViolationKind::InternalError,
                    "missing input history for resimulated frame {}",
                    frame
                );
                return Err(RampartError::InternalError {
                    context: format!("missing input history for frame {frame}"),
                });
            };
            requests.push(SessionRequest::AdvanceFrame { inputs });
            frame = frame.next();
            requests.push(self.save_request(frame));
        }
        Ok(())
    }

    /// Checksums every state saved since the last call, recording first sightings and comparing
    /// the rest.
    fn verify_pending_saves(&mut self) -> Result<(), RampartError> {
        let pending = std::mem::take(&mut self.pending_saves);
        for (frame, cell) in pending {
            if cell.frame() != frame {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::FrameTime,
                    "save request for frame {} was not fulfilled (cell holds frame {})",
                    frame,
                    cell.frame()
                );
                continue;
            }
            let current = self.detector.record(cell.snapshot(), cell.load());
            match self.checksum_history.get(&frame) {
                Some(previous) => {
                    self.detector.check(previous, &current)?;
                },
                None => {
                    self.checksum_history.insert(frame, current);
                },
            }
        }
        Ok(())
    }

    /// Forgets everything older than the oldest frame the next rollback can reach.
    fn prune(&mut self) {
        let oldest = self.current_frame - self.check_distance as i32;
        self.input_history.retain(|&frame, _| frame >= oldest);
        self.saved_cells.retain(|&frame, _| frame >= oldest);
        self.checksum_history.retain(|&frame, _| frame >= oldest);
    }
}

impl<T: Config> Drop for SyncTestSession<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::InputRecording,
                "sync test session closed with an error: {}",
                err
            );
        }
    }
}

impl<T: Config> std::fmt::Debug for SyncTestSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTestSession")
            .field("num_players", &self.num_players())
            .field("check_distance", &self.check_distance)
            .field("current_frame", &self.current_frame)
            .field("listeners", &self.listeners)
            .field("closed", &self.closed)
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
    use crate::input::MemoryInputListener;
    use crate::serialization::{Endianness, IntegerSerializer};
    use crate::sessions::config::SyncTestConfig;
    use crate::telemetry::CollectingObserver;

    /// A minimal test configuration for unit testing.
    struct TestConfig;

    impl Config for TestConfig {
        type Input = u32;
        type InputSerializer = IntegerSerializer<u32>;
        type State = u64;
    }

    fn session(num_players: usize, check_distance: usize) -> SyncTestSession<TestConfig> {
        let context =
            InputContext::new(IntegerSerializer::<u32>::new(), num_players, Endianness::Big)
                .unwrap();
        let config = SyncTestConfig::default().with_check_distance(check_distance);
        SyncTestSession::new(
            context,
            check_distance,
            FrameRate::DEFAULT,
            DesyncDetector::new(&config),
            None,
            ListenerChain::new(),
            None,
        )
        .unwrap()
    }

    /// Sums inputs into the state; fully deterministic.
    fn fulfil(state: &mut u64, requests: Vec<SessionRequest<TestConfig>>) {
        for request in requests {
            match request {
                SessionRequest::SaveGameState { cell, frame } => {
                    assert!(cell.save(frame, state.to_be_bytes().to_vec(), Some(*state)));
                },
                SessionRequest::LoadGameState { cell, .. } => {
                    *state = cell.load().unwrap();
                },
                SessionRequest::AdvanceFrame { inputs } => {
                    *state = state
                        .wrapping_mul(31)
                        .wrapping_add(inputs.iter().map(|&i| u64::from(i)).sum::<u64>());
                },
            }
        }
    }

    // ==========================================
    // Constructor Tests
    // ==========================================

    #[test]
    fn sync_test_session_new_creates_valid_session() {
        let session = session(2, 2);
        assert_eq!(session.num_players(), 2);
        assert_eq!(session.check_distance(), 2);
        assert_eq!(session.current_frame(), Frame::new(0));
        assert_eq!(session.frame_rate(), FrameRate::DEFAULT);
        assert!(session.violation_observer().is_none());
    }

    // ==========================================
    // add_local_input Tests
    // ==========================================

    #[test]
    fn add_local_input_valid_handle_succeeds() {
        let mut session = session(2, 0);
        session.add_local_input(PlayerHandle::new(0), 42).unwrap();
        session.add_local_input(PlayerHandle::new(1), 100).unwrap();
    }

    #[test]
    fn add_local_input_invalid_handle_fails() {
        let mut session = session(2, 0);
        let result = session.add_local_input(PlayerHandle::new(2), 42);
        assert!(matches!(result, Err(RampartError::InvalidRequest { .. })));
    }

    #[test]
    fn advance_frame_without_all_inputs_fails() {
        let mut session = session(2, 1);
        session.add_local_input(PlayerHandle::new(0), 1).unwrap();
        assert!(matches!(
            session.advance_frame(),
            Err(RampartError::InvalidRequest { .. })
        ));
        assert_eq!(session.current_frame(), Frame::ZERO);
    }

    // ==========================================
    // Request Sequence Tests
    // ==========================================

    #[test]
    fn zero_check_distance_only_advances() {
        let mut session = session(1, 0);
        session.add_local_input(PlayerHandle::new(0), 5).unwrap();
        let requests = session.advance_frame().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(matches!(requests[0], SessionRequest::AdvanceFrame { .. }));
        assert_eq!(session.current_frame(), Frame::new(1));
    }

    #[test]
    fn first_frame_saves_initial_state_and_rolls_back() {
        let mut session = session(1, 1);
        session.add_local_input(PlayerHandle::new(0), 5).unwrap();
        let requests = session.advance_frame().unwrap();
        let kinds: Vec<_> = requests
            .iter()
            .map(|r| match r {
                SessionRequest::SaveGameState { frame, .. } => format!("save {frame}"),
                SessionRequest::LoadGameState { frame, .. } => format!("load {frame}"),
                SessionRequest::AdvanceFrame { .. } => "advance".to_owned(),
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["save 0", "advance", "save 1", "load 0", "advance", "save 1"]
        );
    }

    #[test]
    fn rollback_length_matches_check_distance() {
        let mut session = session(1, 3);
        let mut state = 0u64;
        for frame in 0..6 {
            session.add_local_input(PlayerHandle::new(0), frame).unwrap();
            let requests = session.advance_frame().unwrap();
            let advances = requests
                .iter()
                .filter(|r| matches!(r, SessionRequest::AdvanceFrame { .. }))
                .count();
            let expected = if frame >= 2 { 4 } else { 1 };
            assert_eq!(advances, expected, "frame {frame}");
            fulfil(&mut state, requests);
        }
        assert_eq!(session.current_frame(), Frame::new(6));
    }

    // ==========================================
    // Desync Tests
    // ==========================================

    #[test]
    fn deterministic_game_never_desyncs() {
        let mut session = session(2, 2);
        let mut state = 0u64;
        for frame in 0..20u32 {
            session.add_local_input(PlayerHandle::new(0), frame).unwrap();
            session.add_local_input(PlayerHandle::new(1), frame * 2).unwrap();
            let requests = session.advance_frame().unwrap();
            fulfil(&mut state, requests);
        }
        session.close().unwrap();
    }

    #[test]
    fn non_deterministic_game_is_detected() {
        let mut session = session(1, 1);
        let mut state = 0u64;
        let mut noise = 0u64;
        let mut detected = None;
        for frame in 0..10u32 {
            session.add_local_input(PlayerHandle::new(0), frame).unwrap();
            match session.advance_frame() {
                Ok(requests) => {
                    for request in requests {
                        match request {
                            SessionRequest::SaveGameState { cell, frame } => {
                                cell.save(frame, state.to_be_bytes().to_vec(), Some(state));
                            },
                            SessionRequest::LoadGameState { cell, .. } => {
                                state = cell.load().unwrap();
                            },
                            SessionRequest::AdvanceFrame { inputs } => {
                                noise += 1;
                                state += u64::from(inputs[PlayerHandle::new(0)]) + noise;
                            },
                        }
                    }
                },
                Err(err) => {
                    detected = Some(err);
                    break;
                },
            }
        }
        assert!(matches!(
            detected,
            Some(RampartError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unfulfilled_saves_are_reported() {
        let observer = Arc::new(CollectingObserver::new());
        let context =
            InputContext::new(IntegerSerializer::<u32>::new(), 1, Endianness::Big).unwrap();
        let mut session = SyncTestSession::<TestConfig>::new(
            context,
            1,
            FrameRate::DEFAULT,
            DesyncDetector::new(&SyncTestConfig::default()),
            None,
            ListenerChain::new(),
            Some(observer.clone()),
        )
        .unwrap();
        session.add_local_input(PlayerHandle::new(0), 1).unwrap();
        let _ignored = session.advance_frame().unwrap();
        session.add_local_input(PlayerHandle::new(0), 1).unwrap();
        let _ignored = session.advance_frame().unwrap();
        assert!(observer.has_violation(ViolationKind::FrameTime));
    }

    // ==========================================
    // Listener Tests
    // ==========================================

    #[test]
    fn listeners_see_each_frame_once() {
        let recording = MemoryInputListener::new();
        let mut listeners = ListenerChain::new();
        listeners.push(recording.clone());
        let context =
            InputContext::new(IntegerSerializer::<u32>::new(), 1, Endianness::Big).unwrap();
        let mut session = SyncTestSession::<TestConfig>::new(
            context,
            2,
            FrameRate::DEFAULT,
            DesyncDetector::new(&SyncTestConfig::default()),
            None,
            listeners,
            None,
        )
        .unwrap();

        let mut state = 0u64;
        for frame in 0..5 {
            session.add_local_input(PlayerHandle::new(0), frame).unwrap();
            let requests = session.advance_frame().unwrap();
            fulfil(&mut state, requests);
        }
        session.close().unwrap();

        let recorded: Vec<u32> = recording.iter().map(|inputs| inputs[PlayerHandle::new(0)]).collect();
        assert_eq!(recorded, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn generator_fills_missing_inputs() {
        let context =
            InputContext::new(IntegerSerializer::<u32>::new(), 2, Endianness::Big).unwrap();
        let mut session = SyncTestSession::<TestConfig>::new(
            context,
            0,
            FrameRate::DEFAULT,
            DesyncDetector::new(&SyncTestConfig::default()),
            Some(Box::new(|| 9u32)),
            ListenerChain::new(),
            None,
        )
        .unwrap();
        session.add_local_input(PlayerHandle::new(1), 4).unwrap();
        let requests = session.advance_frame().unwrap();
        let SessionRequest::AdvanceFrame { inputs } = &requests[0] else {
            panic!("expected an advance request");
        };
        assert_eq!(inputs.as_slice(), &[9, 4]);
    }

    #[test]
    fn closed_session_rejects_work() {
        let mut session = session(1, 1);
        session.close().unwrap();
        session.close().unwrap();
        assert!(session.add_local_input(PlayerHandle::new(0), 1).is_err());
        assert!(session.advance_frame().is_err());
    }
}
