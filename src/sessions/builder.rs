//! [`SessionBuilder`] collects session settings and starts sync-test and replay sessions.

use std::sync::Arc;

use tracing::debug;

use crate::checksum::fletcher32;
use crate::desync::{ChecksumFn, DesyncDetector, DesyncHandler, StateStringParser};
use crate::error::RampartError;
use crate::frame_span::FrameRate;
use crate::input::{InputContext, InputGenerator, InputListener, InputProvider, ListenerChain};
use crate::network::protocol::PeerProtocol;
use crate::serialization::Endianness;
use crate::sessions::config::{ProtocolConfig, SyncTestConfig};
use crate::telemetry::ViolationObserver;
use crate::{Config, ReplaySession, SyncTestSession, MAX_PLAYERS};

const DEFAULT_PLAYERS: usize = 2;

/// The [`SessionBuilder`] builds all Rampart sessions.
///
/// After setting all appropriate values, use `SessionBuilder::start_*_session(...)`
/// to consume the builder and create a session of the desired type.
///
/// The byte order of every record and message is taken from the
/// [`ProtocolConfig`], so all sessions built from the same configuration read each other's
/// recordings.
///
/// ```
/// use rampart::input::MemoryInputListener;
/// use rampart::{Config, Endianness, SessionBuilder, SyncTestConfig};
/// use rampart::serialization::IntegerSerializer;
///
/// struct Game;
/// impl Config for Game {
///     type Input = u16;
///     type InputSerializer = IntegerSerializer<u16>;
///     type State = u64;
/// }
///
/// let recording = MemoryInputListener::new();
/// let session = SessionBuilder::<Game>::new()
///     .with_num_players(3)?
///     .with_endianness(Endianness::Little)
///     .with_sync_test_config(SyncTestConfig::default().with_check_distance(2))
///     .add_input_listener(recording.clone())
///     .start_sync_test_session()?;
/// assert_eq!(session.num_players(), 3);
/// assert_eq!(session.check_distance(), 2);
/// # Ok::<(), rampart::RampartError>(())
/// ```
#[must_use = "SessionBuilder must be consumed by calling a start_*_session method"]
pub struct SessionBuilder<T>
where
    T: Config,
{
    num_players: usize,
    frame_rate: FrameRate,
    protocol_config: ProtocolConfig,
    sync_test_config: SyncTestConfig,
    checksum_fn: ChecksumFn,
    desync_handler: Option<Box<dyn DesyncHandler<T::State>>>,
    state_parser: Option<Box<dyn StateStringParser<T::State>>>,
    input_generator: Option<Box<dyn InputGenerator<T::Input>>>,
    listeners: ListenerChain<T::Input>,
    /// Optional observer for specification violations.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<T: Config> std::fmt::Debug for SessionBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            num_players,
            frame_rate,
            protocol_config,
            sync_test_config,
            checksum_fn: _,
            desync_handler,
            state_parser,
            input_generator,
            listeners,
            violation_observer,
        } = self;

        f.debug_struct("SessionBuilder")
            .field("num_players", num_players)
            .field("frame_rate", frame_rate)
            .field("protocol_config", protocol_config)
            .field("sync_test_config", sync_test_config)
            .field("has_desync_handler", &desync_handler.is_some())
            .field("has_state_parser", &state_parser.is_some())
            .field("has_input_generator", &input_generator.is_some())
            .field("listeners", listeners)
            .field("has_violation_observer", &violation_observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Config> Default for SessionBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Config> SessionBuilder<T> {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            num_players: DEFAULT_PLAYERS,
            frame_rate: FrameRate::DEFAULT,
            protocol_config: ProtocolConfig::default(),
            sync_test_config: SyncTestConfig::default(),
            checksum_fn: fletcher32,
            desync_handler: None,
            state_parser: None,
            input_generator: None,
            listeners: ListenerChain::new(),
            violation_observer: None,
        }
    }

    /// Change the number of players. Default is 2.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the number is zero or exceeds [`MAX_PLAYERS`].
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn with_num_players(mut self, num_players: usize) -> Result<Self, RampartError> {
        if num_players == 0 || num_players > MAX_PLAYERS {
            return Err(RampartError::InvalidRequest {
                info: format!(
                    "num_players must be between 1 and {MAX_PLAYERS}, got {num_players}"
                ),
            });
        }
        self.num_players = num_players;
        Ok(self)
    }

    /// Sets the byte order of inputs, records and messages. Shorthand for changing
    /// [`ProtocolConfig::endianness`].
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.protocol_config.endianness = endianness;
        self
    }

    /// Sets the frame rate used to convert frames to time. Default is 60.
    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Sets the protocol configuration, including the session byte order.
    ///
    /// The configuration is validated when a session or protocol is started.
    pub fn with_protocol_config(mut self, protocol_config: ProtocolConfig) -> Self {
        self.protocol_config = protocol_config;
        self
    }

    /// Sets the sync test configuration.
    ///
    /// The configuration is validated in [`start_sync_test_session`](Self::start_sync_test_session).
    pub fn with_sync_test_config(mut self, sync_test_config: SyncTestConfig) -> Self {
        self.sync_test_config = sync_test_config;
        self
    }

    /// Change the check distance. Default is 1.
    pub fn with_check_distance(mut self, check_distance: usize) -> Self {
        self.sync_test_config.check_distance = check_distance;
        self
    }

    /// Called with both states whenever a sync test finds a mismatch.
    pub fn with_desync_handler(mut self, handler: impl DesyncHandler<T::State> + 'static) -> Self {
        self.desync_handler = Some(Box::new(handler));
        self
    }

    /// Renders desynced states as text. Default is a hex dump.
    pub fn with_state_parser(mut self, parser: impl StateStringParser<T::State> + 'static) -> Self {
        self.state_parser = Some(Box::new(parser));
        self
    }

    /// Fills local inputs the host did not add before advancing a sync test.
    pub fn with_input_generator(
        mut self,
        generator: impl InputGenerator<T::Input> + 'static,
    ) -> Self {
        self.input_generator = Some(Box::new(generator));
        self
    }

    /// Replaces the state checksum. Default is [`fletcher32`].
    pub fn with_checksum_fn(mut self, checksum_fn: ChecksumFn) -> Self {
        self.checksum_fn = checksum_fn;
        self
    }

    /// Appends a listener that receives every confirmed frame. Listeners are called in the order
    /// they were added.
    pub fn add_input_listener(mut self, listener: impl InputListener<T::Input> + 'static) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets a custom observer for specification violations.
    ///
    /// When a violation occurs during session operation (e.g. unfulfilled save requests,
    /// malformed replay sources, checksum mismatches), it will be reported to this observer.
    /// This enables programmatic monitoring, custom logging, or test assertions.
    ///
    /// If no observer is set, violations are logged via the `tracing` crate by default.
    ///
    /// # Example
    ///
    /// ```
    /// use rampart::{SessionBuilder, Config, telemetry::CollectingObserver};
    /// use rampart::serialization::IntegerSerializer;
    /// use std::sync::Arc;
    ///
    /// # struct MyConfig;
    /// # impl Config for MyConfig {
    /// #     type Input = u8;
    /// #     type InputSerializer = IntegerSerializer<u8>;
    /// #     type State = ();
    /// # }
    /// let observer = Arc::new(CollectingObserver::new());
    /// let builder = SessionBuilder::<MyConfig>::new()
    ///     .with_violation_observer(observer.clone());
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// The input context sessions built from this builder use.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the player count is not supported by the context.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn input_context(&self) -> Result<InputContext<T::Input>, RampartError> {
        InputContext::new(
            T::InputSerializer::default(),
            self.num_players,
            self.protocol_config.endianness,
        )
    }

    /// Builds a [`PeerProtocol`] with this builder's protocol configuration and observer.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the protocol configuration is out of range.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn build_peer_protocol(&self) -> Result<PeerProtocol, RampartError> {
        self.protocol_config.validate()?;
        Ok(PeerProtocol::new(self.protocol_config)
            .with_violation_observer(self.violation_observer.clone()))
    }

    /// Consumes the builder to construct a new [`SyncTestSession`]. During a [`SyncTestSession`],
    /// Rampart will simulate a rollback every frame and resimulate the last n states, where n is
    /// the configured check distance. The resimulated checksums will be compared with the
    /// original checksums and a mismatch is handled as the [`SyncTestConfig`] says.
    /// This is a great way to test if your system runs deterministically.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the sync test or protocol configuration is out of range.
    /// - Returns the first error of a listener's `on_session_start`.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn start_sync_test_session(self) -> Result<SyncTestSession<T>, RampartError> {
        self.sync_test_config.validate()?;
        self.protocol_config.validate()?;
        let context = self.input_context()?;

        let mut detector = DesyncDetector::new(&self.sync_test_config)
            .with_checksum_fn(self.checksum_fn)
            .with_violation_observer(self.violation_observer.clone());
        if let Some(parser) = self.state_parser {
            detector.set_parser(parser);
        }
        detector.set_handler(self.desync_handler);

        debug!(
            check_distance = self.sync_test_config.check_distance,
            throw_on_desync = self.sync_test_config.throw_on_desync,
            "starting sync test session"
        );
        SyncTestSession::new(
            context,
            self.sync_test_config.check_distance,
            self.frame_rate,
            detector,
            self.input_generator,
            self.listeners,
            self.violation_observer,
        )
    }

    /// Consumes the builder to construct a [`ReplaySession`] that plays back `provider`.
    ///
    /// The provider is decoded here, once.
    ///
    /// # Errors
    /// - Returns [`InvalidReplaySource`] if the source is missing, malformed or recorded with a
    ///   different number of players.
    /// - Returns [`InvalidRequest`] if the protocol configuration is out of range.
    ///
    /// [`InvalidReplaySource`]: RampartError::InvalidReplaySource
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn start_replay_session(
        self,
        mut provider: impl InputProvider<T::Input>,
    ) -> Result<ReplaySession<T>, RampartError> {
        self.protocol_config.validate()?;
        let context = self.input_context()?;
        ReplaySession::new(context, &mut provider, self.frame_rate, self.violation_observer)
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
    use crate::desync::DesyncState;
    use crate::input::{BinaryInputProvider, MemoryInputListener, MemoryInputProvider};
    use crate::serialization::IntegerSerializer;
    use crate::telemetry::{CollectingObserver, ViolationKind};
    use crate::{ConfirmedInputs, Frame, PlayerHandle, ProtocolStatus, SessionRequest};
    use parking_lot::Mutex;
    use web_time::Duration;

    struct TestConfig;

    impl Config for TestConfig {
        type Input = u8;
        type InputSerializer = IntegerSerializer<u8>;
        type State = u32;
    }

    // ========================================================================
    // Validation Tests
    // ========================================================================

    #[test]
    fn num_players_bounds() {
        assert!(SessionBuilder::<TestConfig>::new().with_num_players(0).is_err());
        assert!(SessionBuilder::<TestConfig>::new()
            .with_num_players(MAX_PLAYERS + 1)
            .is_err());
        for players in 1..=MAX_PLAYERS {
            let session = SessionBuilder::<TestConfig>::new()
                .with_num_players(players)
                .unwrap()
                .start_sync_test_session()
                .unwrap();
            assert_eq!(session.num_players(), players);
        }
    }

    #[test]
    fn oversized_check_distance_is_rejected() {
        let result = SessionBuilder::<TestConfig>::new()
            .with_check_distance(crate::sessions::config::MAX_CHECK_DISTANCE + 1)
            .start_sync_test_session();
        assert!(matches!(result, Err(RampartError::InvalidRequest { .. })));
    }

    #[test]
    fn invalid_protocol_config_is_rejected() {
        let builder = SessionBuilder::<TestConfig>::new().with_protocol_config(ProtocolConfig {
            quality_report_interval: Duration::ZERO,
            ..ProtocolConfig::default()
        });
        assert!(builder.build_peer_protocol().is_err());
        assert!(builder.start_sync_test_session().is_err());
    }

    // ========================================================================
    // Context Tests
    // ========================================================================

    #[test]
    fn input_context_follows_settings() {
        let builder = SessionBuilder::<TestConfig>::new()
            .with_num_players(3)
            .unwrap()
            .with_endianness(Endianness::Little);
        let context = builder.input_context().unwrap();
        assert_eq!(context.num_players(), 3);
        assert_eq!(context.endianness(), Endianness::Little);
        assert_eq!(context.confirmed_input_size(), 3);
    }

    #[test]
    fn peer_protocol_starts_syncing() {
        let observer = Arc::new(CollectingObserver::new());
        let protocol = SessionBuilder::<TestConfig>::new()
            .with_protocol_config(ProtocolConfig::lan())
            .with_violation_observer(observer)
            .build_peer_protocol()
            .unwrap();
        assert_eq!(protocol.status(), ProtocolStatus::Syncing);
        assert_eq!(protocol.config(), &ProtocolConfig::lan());
    }

    // ========================================================================
    // Session Wiring Tests
    // ========================================================================

    #[test]
    fn sync_test_wires_handler_and_checksum() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&frames);
        let observer = Arc::new(CollectingObserver::new());
        let mut session = SessionBuilder::<TestConfig>::new()
            .with_num_players(1)
            .unwrap()
            .with_sync_test_config(SyncTestConfig::default().with_throw_on_desync(false))
            .with_checksum_fn(|bytes| bytes.len() as u32 + u32::from(bytes[0]))
            .with_desync_handler(
                move |frame: Frame, _: &DesyncState<'_, u32>, _: &DesyncState<'_, u32>| {
                    seen.lock().push(frame);
                },
            )
            .with_violation_observer(observer.clone())
            .start_sync_test_session()
            .unwrap();

        let mut resimulated = false;
        for _ in 0..3 {
            session.add_local_input(PlayerHandle::new(0), 1).unwrap();
            for request in session.advance_frame().unwrap() {
                match request {
                    SessionRequest::SaveGameState { cell, frame } => {
                        let marker = u8::from(resimulated);
                        cell.save(frame, vec![marker], Some(0));
                    },
                    SessionRequest::LoadGameState { .. } => resimulated = true,
                    SessionRequest::AdvanceFrame { .. } => {},
                }
            }
            resimulated = false;
        }

        assert!(!frames.lock().is_empty());
        assert!(observer.has_violation(ViolationKind::ChecksumMismatch));
    }

    #[test]
    fn listeners_and_generator_are_wired() {
        let recording = MemoryInputListener::new();
        let mut session = SessionBuilder::<TestConfig>::new()
            .with_check_distance(0)
            .with_input_generator(|| 7u8)
            .add_input_listener(recording.clone())
            .start_sync_test_session()
            .unwrap();
        let _ = session.advance_frame().unwrap();
        session.close().unwrap();
        assert_eq!(recording.inputs(), vec![ConfirmedInputs::from_slice(&[7, 7])]);
    }

    #[test]
    fn replay_session_uses_player_count() {
        let provider = MemoryInputProvider::new([ConfirmedInputs::from_slice(&[1, 2])]);
        let session = SessionBuilder::<TestConfig>::new()
            .start_replay_session(provider)
            .unwrap();
        assert_eq!(session.total_frames(), 1);

        let provider = BinaryInputProvider::<u8>::new(vec![1, 2, 3]);
        let result = SessionBuilder::<TestConfig>::new().start_replay_session(provider);
        assert!(matches!(result, Err(RampartError::InvalidReplaySource { .. })));
    }

    #[test]
    fn debug_lists_settings() {
        let text = format!("{:?}", SessionBuilder::<TestConfig>::new());
        assert!(text.contains("SessionBuilder"));
        assert!(text.contains("num_players: 2"));
        assert!(text.contains("has_violation_observer: false"));
    }
}
