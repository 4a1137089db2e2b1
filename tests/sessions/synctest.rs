//! SyncTest session integration tests.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use parking_lot::Mutex;
use serial_test::serial;

use crate::common::stubs::{
    DriftingGameStub, ForgetfulGameStub, GameStub, StateStub, StubConfig, StubInput,
};
use rampart::desync::{DesyncState, HexStateStringParser};
use rampart::input::{ClosureInputListener, MemoryInputListener};
use rampart::telemetry::{CollectingObserver, ViolationKind, ViolationSeverity};
use rampart::{
    ConfirmedInputs, Endianness, Frame, PlayerHandle, RampartError, SessionBuilder,
    SessionRequest, SyncTestConfig,
};

fn kinds(requests: &[SessionRequest<StubConfig>]) -> (usize, usize, usize) {
    let mut counts = (0, 0, 0);
    for request in requests {
        match request {
            SessionRequest::SaveGameState { .. } => counts.0 += 1,
            SessionRequest::LoadGameState { .. } => counts.1 += 1,
            SessionRequest::AdvanceFrame { .. } => counts.2 += 1,
            _ => panic!("unexpected request"),
        }
    }
    counts
}

#[test]
fn test_create_session() {
    assert!(SessionBuilder::<StubConfig>::new()
        .start_sync_test_session()
        .is_ok());
}

#[test]
fn test_advance_frame_no_rollbacks() -> Result<(), RampartError> {
    let mut stub = GameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_check_distance(0)
        .start_sync_test_session()?;

    for i in 0..200 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })?;
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i })?;
        let requests = sess.advance_frame()?;
        assert_eq!(requests.len(), 1); // only advance
        stub.handle_requests(requests);
        assert_eq!(stub.gs.frame, i as i32 + 1); // frame should have advanced
    }

    Ok(())
}

#[test]
fn test_advance_frame_with_rollbacks() -> Result<(), RampartError> {
    let check_distance = 2;
    let mut stub = GameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_check_distance(check_distance)
        .start_sync_test_session()?;

    for i in 0..200u32 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })?;
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i })?;
        let requests = sess.advance_frame()?;
        match i {
            0 => assert_eq!(kinds(&requests), (2, 0, 1)), // save 0, advance, save 1
            _ => {
                // advance, save, then load and resimulate two frames
                assert_eq!(kinds(&requests), (3, 1, 3));
                assert!(matches!(requests[0], SessionRequest::AdvanceFrame { .. }));
                assert!(matches!(requests[1], SessionRequest::SaveGameState { .. }));
                assert!(matches!(requests[2], SessionRequest::LoadGameState { .. }));
            },
        }
        stub.handle_requests(requests);
        assert_eq!(stub.gs.frame, i as i32 + 1);
    }

    Ok(())
}

/// Test deep rollback scenario with the longest rollbacks a game usually predicts.
#[test]
fn test_deep_rollback_scenario() -> Result<(), RampartError> {
    let check_distance = 7;
    let mut stub = GameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_check_distance(check_distance)
        .start_sync_test_session()?;

    for i in 0..500u32 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })?;
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i * 3 })?;
        let requests = sess.advance_frame()?;

        if i as usize + 1 >= check_distance {
            let (saves, loads, advances) = kinds(&requests);
            assert_eq!(loads, 1, "Should load once per frame after warmup");
            assert_eq!(advances, check_distance + 1);
            assert_eq!(saves, check_distance + 1 + usize::from(i == 0));
        }

        stub.handle_requests(requests);
        assert_eq!(stub.gs.frame, i as i32 + 1);
    }

    Ok(())
}

#[test]
fn test_little_endian_session() -> Result<(), RampartError> {
    let mut stub = GameStub::new();
    stub.endianness = Endianness::Little;
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_endianness(Endianness::Little)
        .with_check_distance(3)
        .start_sync_test_session()?;
    assert_eq!(sess.input_context().endianness(), Endianness::Little);

    for i in 0..50 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })?;
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: 1 })?;
        stub.handle_requests(sess.advance_frame()?);
    }
    sess.close()
}

#[test]
fn test_missing_input_is_rejected() -> Result<(), RampartError> {
    let mut sess = SessionBuilder::<StubConfig>::new().start_sync_test_session()?;
    sess.add_local_input(PlayerHandle::new(1), StubInput { inp: 1 })?;
    assert!(matches!(
        sess.advance_frame(),
        Err(RampartError::InvalidRequest { .. })
    ));
    assert!(matches!(
        sess.add_local_input(PlayerHandle::new(2), StubInput { inp: 1 }),
        Err(RampartError::InvalidRequest { .. })
    ));
    Ok(())
}

#[test]
fn test_generated_inputs_fill_gaps() -> Result<(), RampartError> {
    let mut next = 0u32;
    let recording = MemoryInputListener::new();
    let mut stub = GameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_input_generator(move || {
            next += 10;
            StubInput { inp: next }
        })
        .add_input_listener(recording.clone())
        .start_sync_test_session()?;

    for i in 0..3 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })?;
        stub.handle_requests(sess.advance_frame()?);
    }
    sess.close()?;

    let second_player: Vec<u32> = recording
        .iter()
        .map(|inputs| inputs[PlayerHandle::new(1)].inp)
        .collect();
    assert_eq!(second_player, vec![10, 20, 30]);
    Ok(())
}

// ============================================================================
// Desync Detection
// ============================================================================

#[test]
fn test_drifting_game_fails_with_checksum_mismatch() {
    let mut stub = DriftingGameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_sync_test_config(SyncTestConfig::default().with_log_state_on_desync(false))
        .start_sync_test_session()
        .unwrap();

    let mut failure = None;
    for i in 0..10 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })
            .unwrap();
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i })
            .unwrap();
        match sess.advance_frame() {
            Ok(requests) => stub.handle_requests(requests),
            Err(err) => {
                failure = Some(err);
                break;
            },
        }
    }

    match failure {
        Some(RampartError::ChecksumMismatch {
            frame,
            previous,
            current,
        }) => {
            assert_eq!(frame, Frame::new(1));
            assert_ne!(previous, current);
        },
        other => panic!("expected a checksum mismatch, got {other:?}"),
    }
}

#[test]
fn test_drift_is_found_at_the_first_drifting_frame() {
    let observer = Arc::new(CollectingObserver::new());
    let mut stub = DriftingGameStub::with_drift_from(20);
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_sync_test_config(
            SyncTestConfig::default()
                .with_check_distance(4)
                .with_throw_on_desync(false)
                .with_log_state_on_desync(false),
        )
        .with_violation_observer(observer.clone())
        .start_sync_test_session()
        .unwrap();

    for i in 0..40 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })
            .unwrap();
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: 0 })
            .unwrap();
        stub.handle_requests(sess.advance_frame().unwrap());
    }
    sess.close().unwrap();

    let mismatches = observer.violations_of_kind(ViolationKind::ChecksumMismatch);
    assert!(!mismatches.is_empty());
    assert!(mismatches
        .iter()
        .all(|violation| violation.severity == ViolationSeverity::Error));
    let first = mismatches
        .iter()
        .filter_map(|violation| violation.frame)
        .min()
        .unwrap();
    assert_eq!(first, Frame::new(21));
}

#[test]
fn test_desync_handler_sees_both_states_once_per_mismatch() {
    let seen: Arc<Mutex<Vec<(Frame, String, String, u32, u32)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let mut stub = DriftingGameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_sync_test_config(
            SyncTestConfig::default()
                .with_throw_on_desync(false)
                .with_log_state_on_desync(false),
        )
        .with_state_parser(HexStateStringParser)
        .with_desync_handler(
            move |frame: Frame,
                  previous: &DesyncState<'_, StateStub>,
                  current: &DesyncState<'_, StateStub>| {
                sink.lock().push((
                    frame,
                    previous.text().to_owned(),
                    current.text().to_owned(),
                    previous.checksum(),
                    current.checksum(),
                ));
            },
        )
        .start_sync_test_session()
        .unwrap();

    for i in 0..3 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })
            .unwrap();
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i })
            .unwrap();
        stub.handle_requests(sess.advance_frame().unwrap());
    }
    sess.close().unwrap();

    let seen = seen.lock();
    // frames 1, 2 and 3 each resimulated once
    assert_eq!(seen.len(), 3);
    for (index, (frame, previous, current, previous_sum, current_sum)) in seen.iter().enumerate() {
        assert_eq!(*frame, Frame::new(index as i32 + 1));
        assert_ne!(previous, current);
        assert_ne!(previous_sum, current_sum);
        assert!(previous.starts_with("0000:"));
    }
}

#[test]
fn test_custom_checksum_can_hide_drift() -> Result<(), RampartError> {
    let mut stub = DriftingGameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_checksum_fn(|bytes| bytes.len() as u32)
        .start_sync_test_session()?;

    for i in 0..20 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })?;
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i })?;
        stub.handle_requests(sess.advance_frame()?);
    }
    sess.close()
}

#[test]
fn test_unfulfilled_saves_are_reported() {
    let observer = Arc::new(CollectingObserver::new());
    let mut stub = ForgetfulGameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_check_distance(0)
        .with_violation_observer(observer.clone())
        .start_sync_test_session()
        .unwrap();
    for i in 0..3 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })
            .unwrap();
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i })
            .unwrap();
        stub.handle_requests(sess.advance_frame().unwrap());
    }
    // no rollbacks means no save requests
    assert!(!observer.has_violation(ViolationKind::FrameTime));

    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_violation_observer(observer.clone())
        .start_sync_test_session()
        .unwrap();
    sess.add_local_input(PlayerHandle::new(0), StubInput { inp: 0 })
        .unwrap();
    sess.add_local_input(PlayerHandle::new(1), StubInput { inp: 0 })
        .unwrap();
    let mut stub = ForgetfulGameStub::new();
    stub.handle_requests(sess.advance_frame().unwrap());
    sess.close().unwrap();
    assert!(observer.has_violation(ViolationKind::FrameTime));
}

// ============================================================================
// Listeners
// ============================================================================

#[test]
fn test_listeners_receive_each_frame_once_in_order() -> Result<(), RampartError> {
    let frames: Arc<Mutex<Vec<Frame>>> = Arc::default();
    let sink = Arc::clone(&frames);
    let recording = MemoryInputListener::new();
    let mut stub = GameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_check_distance(5)
        .add_input_listener(ClosureInputListener::new(
            move |frame: Frame, _: &ConfirmedInputs<StubInput>| {
                sink.lock().push(frame);
            },
        ))
        .add_input_listener(recording.clone())
        .start_sync_test_session()?;

    for i in 0..30 {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })?;
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: 2 * i })?;
        stub.handle_requests(sess.advance_frame()?);
    }
    drop(sess);

    let frames = frames.lock();
    assert_eq!(frames.len(), 30);
    assert!(frames.windows(2).all(|pair| pair[0].next() == pair[1]));
    assert_eq!(recording.len(), 30);
    assert_eq!(
        recording.inputs()[29].as_slice(),
        &[StubInput { inp: 29 }, StubInput { inp: 58 }]
    );
    Ok(())
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
#[serial]
fn test_desync_logs_both_states_when_enabled() {
    let captured = CapturedLog::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut stub = DriftingGameStub::new();
        let mut sess = SessionBuilder::<StubConfig>::new()
            .with_sync_test_config(
                SyncTestConfig::default()
                    .with_throw_on_desync(false)
                    .with_log_state_on_desync(true),
            )
            .start_sync_test_session()
            .unwrap();
        for i in 0..10 {
            sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })
                .unwrap();
            sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i })
                .unwrap();
            stub.handle_requests(sess.advance_frame().unwrap());
        }
    });

    let log = String::from_utf8(captured.0.lock().clone()).unwrap();
    assert!(log.contains("state desync"));
    assert!(log.contains("continuing after desync"));
    assert!(log.contains("ERROR"));
}
