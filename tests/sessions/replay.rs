//! Replay session integration tests.
//!
//! Every test records a sync test session, replays the recording and checks that the replayed
//! game ends in the same state.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use serial_test::serial;
use web_time::Duration;

use crate::common::stubs::{GameStub, StateStub, StubConfig, StubInput};
use rampart::input::{
    BinaryInputProvider, FileInputListener, FileInputProvider, InputProvider,
    MemoryInputListener, MemoryInputProvider,
};
use rampart::{
    Endianness, Frame, FrameRate, PlayerHandle, RampartError, ReplayConfig, SessionBuilder,
};

const FRAMES: u32 = 90;

/// Plays a three player sync test session and returns the final state.
fn play(builder: SessionBuilder<StubConfig>, endianness: Endianness) -> StateStub {
    let mut stub = GameStub::new();
    stub.endianness = endianness;
    let mut sess = builder
        .with_num_players(3)
        .unwrap()
        .with_endianness(endianness)
        .with_check_distance(2)
        .start_sync_test_session()
        .unwrap();
    for i in 0..FRAMES {
        sess.add_local_input(PlayerHandle::new(0), StubInput { inp: i })
            .unwrap();
        sess.add_local_input(PlayerHandle::new(1), StubInput { inp: i / 3 })
            .unwrap();
        sess.add_local_input(PlayerHandle::new(2), StubInput { inp: 7 })
            .unwrap();
        stub.handle_requests(sess.advance_frame().unwrap());
    }
    sess.close().unwrap();
    stub.gs
}

/// Replays `provider` to the end and returns the final state.
fn replay(
    provider: impl InputProvider<StubInput>,
    endianness: Endianness,
) -> Result<StateStub, RampartError> {
    let mut stub = GameStub::new();
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_num_players(3)?
        .with_endianness(endianness)
        .start_replay_session(provider)?;
    assert_eq!(sess.total_frames(), FRAMES as usize);
    while !sess.is_finished() {
        stub.handle_requests(sess.advance_frame());
    }
    assert_eq!(sess.current_frame(), Frame::new(FRAMES as i32));
    Ok(stub.gs)
}

#[test]
fn test_memory_recording_replays_identically() {
    for endianness in [Endianness::Big, Endianness::Little] {
        let recording = MemoryInputListener::new();
        let played = play(
            SessionBuilder::new().add_input_listener(recording.clone()),
            endianness,
        );

        let replayed = replay(MemoryInputProvider::new(recording.inputs()), endianness).unwrap();
        assert_eq!(replayed, played);

        let compressed = recording.compressed_inputs().unwrap();
        let replayed = replay(BinaryInputProvider::compressed(compressed), endianness).unwrap();
        assert_eq!(replayed, played);
    }
}

#[test]
#[serial]
fn test_file_recording_replays_identically() {
    let dir = tempfile::tempdir().unwrap();
    for config in [ReplayConfig::new(), ReplayConfig::compressed()] {
        let path = dir.path().join(format!("replay-{}.bin", config.compressed));
        let listener = if config.compressed {
            FileInputListener::compressed(&path)
        } else {
            FileInputListener::new(&path)
        };
        let played = play(SessionBuilder::new().add_input_listener(listener), Endianness::Big);

        if !config.compressed {
            let len = std::fs::metadata(&path).unwrap().len();
            assert_eq!(len, u64::from(FRAMES) * 3 * 4);
        }

        let replayed = replay(FileInputProvider::with_config(&path, &config), Endianness::Big)
            .unwrap();
        assert_eq!(replayed, played);
    }
}

#[test]
fn test_byte_order_mismatch_changes_the_replay() {
    let recording = MemoryInputListener::new();
    let mut context_bytes = Vec::new();
    let played = play(
        SessionBuilder::new().add_input_listener(recording.clone()),
        Endianness::Big,
    );
    let context = SessionBuilder::<StubConfig>::new()
        .with_num_players(3)
        .unwrap()
        .input_context()
        .unwrap();
    for inputs in recording.iter() {
        context.write_confirmed(&mut context_bytes, &inputs).unwrap();
    }

    let same = replay(BinaryInputProvider::new(context_bytes.clone()), Endianness::Big).unwrap();
    assert_eq!(same, played);
    let swapped = replay(BinaryInputProvider::new(context_bytes), Endianness::Little).unwrap();
    assert_ne!(swapped, played);
}

#[test]
fn test_missing_file_prevents_replay() {
    let dir = tempfile::tempdir().unwrap();
    let result = replay(
        FileInputProvider::new(dir.path().join("missing.bin")),
        Endianness::Big,
    );
    assert!(matches!(result, Err(RampartError::InvalidReplaySource { .. })));
}

#[test]
fn test_truncated_recording_prevents_replay() {
    let mut bytes = vec![0u8; 3 * 4 * 5];
    bytes.pop();
    let result = SessionBuilder::<StubConfig>::new()
        .with_num_players(3)
        .unwrap()
        .start_replay_session(BinaryInputProvider::new(bytes));
    assert!(matches!(result, Err(RampartError::InvalidReplaySource { .. })));
}

#[test]
fn test_replay_timing() {
    let recording = MemoryInputListener::new();
    play(
        SessionBuilder::new().add_input_listener(recording.clone()),
        Endianness::Big,
    );
    let mut sess = SessionBuilder::<StubConfig>::new()
        .with_num_players(3)
        .unwrap()
        .with_frame_rate(FrameRate::new(30).unwrap())
        .start_replay_session(MemoryInputProvider::new(recording.inputs()))
        .unwrap();
    assert_eq!(sess.duration(), Duration::from_secs(3));

    for _ in 0..30 {
        assert_eq!(sess.advance_frame().len(), 1);
    }
    sess.pause();
    assert!(sess.advance_frame().is_empty());
    assert_eq!(sess.elapsed(), Duration::from_secs(1));
    sess.resume();
    assert_eq!(sess.advance_frame().len(), 1);
}
