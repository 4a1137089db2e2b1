//! Input pipeline integration tests: record confirmed inputs, persist them and read them back.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serial_test::serial;

use rampart::input::{
    compress, BinaryInputProvider, ClosureInputListener, FileInputListener, FileInputProvider,
    InputListener, InputProvider, ListenerChain, MemoryInputListener, MemoryInputProvider,
};
use rampart::serialization::{
    EncodableSerializer, IntegerSerializer, PlainDataSerializer, SerdeSerializer,
};
use rampart::test_config::miri_case_count;
use rampart::{ConfirmedInputs, Endianness, Frame, InputContext, PlayerHandle, RampartError};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
struct Pad {
    buttons: u8,
    stick_x: i8,
    stick_y: i8,
    trigger: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Command {
    target: u16,
    queued: bool,
}

fn pad(i: u8) -> Pad {
    Pad {
        buttons: i,
        stick_x: -(i as i8 % 64),
        stick_y: i as i8 % 32,
        trigger: 255 - i,
    }
}

/// Drives `listener` through a session of `frames` two-player frames.
fn record<L: InputListener<Pad>>(
    listener: &mut L,
    context: &InputContext<Pad>,
    frames: u8,
) -> Vec<ConfirmedInputs<Pad>> {
    let mut played = Vec::new();
    listener.on_session_start(context).unwrap();
    for i in 0..frames {
        let inputs = ConfirmedInputs::from_slice(&[pad(i), pad(i.wrapping_mul(7))]);
        listener.on_confirmed(Frame::new(i32::from(i)), &inputs).unwrap();
        played.push(inputs);
    }
    listener.on_session_close().unwrap();
    played
}

fn pad_context() -> InputContext<Pad> {
    InputContext::new(PlainDataSerializer::<Pad>::new(), 2, Endianness::Big).unwrap()
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn records_have_player_stride() {
    let context = pad_context();
    assert_eq!(context.player_input_size(), 4);
    assert_eq!(context.confirmed_input_size(), 8);

    let mut bytes = Vec::new();
    context
        .write_record(&mut bytes, &ConfirmedInputs::from_slice(&[pad(1), pad(2)]))
        .unwrap();
    assert_eq!(bytes, vec![1, 0xff, 1, 254, 2, 0xfe, 2, 253]);
}

#[test]
fn short_record_is_zero_padded() {
    let context = InputContext::new(IntegerSerializer::<u16>::new(), 3, Endianness::Little).unwrap();
    let mut bytes = Vec::new();
    context
        .write_record(&mut bytes, &ConfirmedInputs::from_slice(&[0x0102]))
        .unwrap();
    assert_eq!(bytes, vec![2, 1, 0, 0, 0, 0]);

    let decoded = context.read_records(&bytes).unwrap();
    assert_eq!(decoded, vec![ConfirmedInputs::from_slice(&[0x0102, 0, 0])]);
}

#[test]
fn serde_inputs_record_at_fixed_size() {
    let context = InputContext::new(SerdeSerializer::<Command>::new(), 2, Endianness::Big).unwrap();
    assert_eq!(context.player_input_size(), 3);

    let frames = vec![
        ConfirmedInputs::from_slice(&[
            Command {
                target: 513,
                queued: true,
            },
            Command::default(),
        ]),
        ConfirmedInputs::from_slice(&[
            Command::default(),
            Command {
                target: 9,
                queued: false,
            },
        ]),
    ];
    let mut bytes = Vec::new();
    for inputs in &frames {
        context.write_record(&mut bytes, inputs).unwrap();
    }
    assert_eq!(&bytes[..3], &[2, 1, 1]);
    assert_eq!(context.read_records(&bytes).unwrap(), frames);
}

#[test]
fn too_many_players_is_rejected() {
    let context = pad_context();
    let mut bytes = Vec::new();
    let err = context
        .write_confirmed(&mut bytes, &ConfirmedInputs::from_slice(&[pad(0); 3]))
        .unwrap_err();
    assert!(matches!(err, RampartError::InvalidRequest { .. }));
    assert!(bytes.is_empty());
}

// ============================================================================
// Listeners
// ============================================================================

#[test]
fn chain_delivers_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = ListenerChain::new();
    for name in ["first", "second"] {
        let log = Arc::clone(&log);
        chain.push(ClosureInputListener::new(
            move |frame: Frame, _: &ConfirmedInputs<Pad>| log.lock().push((frame.as_i32(), name)),
        ));
    }
    let memory = MemoryInputListener::new();
    chain.push(memory.clone());
    assert_eq!(chain.len(), 3);

    let played = record(&mut chain, &pad_context(), 2);
    assert_eq!(
        *log.lock(),
        vec![(0, "first"), (0, "second"), (1, "first"), (1, "second")]
    );
    assert_eq!(memory.inputs(), played);
}

#[test]
fn memory_recording_compresses_losslessly() {
    let context = pad_context();
    let memory = MemoryInputListener::new();
    let played = record(&mut memory.clone(), &context, 200);
    assert_eq!(memory.len(), 200);

    let compressed = memory.compressed_inputs().unwrap();
    assert!(!compressed.is_empty());
    let replayed = BinaryInputProvider::compressed(compressed)
        .inputs(&context)
        .unwrap();
    assert_eq!(&*replayed, played.as_slice());
}

#[test]
fn restarted_session_replaces_memory_recording() {
    let context = pad_context();
    let memory = MemoryInputListener::new();
    record(&mut memory.clone(), &context, 10);
    let second = record(&mut memory.clone(), &context, 3);
    assert_eq!(memory.inputs(), second);
}

#[test]
#[serial]
fn file_recordings_replay_in_both_modes() {
    let context = pad_context();
    let dir = tempfile::tempdir().unwrap();
    for compressed in [false, true] {
        let path = dir.path().join(format!("pipeline-{compressed}.bin"));
        let mut listener = if compressed {
            FileInputListener::compressed(&path)
        } else {
            FileInputListener::new(&path)
        };
        let played = record(&mut listener, &context, 64);

        let on_disk = std::fs::read(&path).unwrap();
        if !compressed {
            assert_eq!(on_disk.len(), 64 * 8);
            assert_eq!(&on_disk[..8], &[0, 0, 0, 255, 0, 0, 0, 255]);
        }

        let mut provider = if compressed {
            FileInputProvider::compressed(&path)
        } else {
            FileInputProvider::new(&path)
        };
        assert_eq!(&*provider.inputs(&context).unwrap(), played.as_slice());
        std::fs::remove_file(&path).unwrap();

        // decoded once, served from memory afterwards
        assert_eq!(&*provider.inputs(&context).unwrap(), played.as_slice());
    }
}

#[test]
#[serial]
fn file_listener_before_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = FileInputListener::<Pad>::new(dir.path().join("unstarted.bin"));
    let err = listener
        .on_confirmed(Frame::ZERO, &ConfirmedInputs::new(2))
        .unwrap_err();
    assert!(matches!(err, RampartError::InvalidRequest { .. }));
}

// ============================================================================
// Providers
// ============================================================================

#[test]
fn memory_provider_hands_out_shared_inputs() {
    let inputs = vec![ConfirmedInputs::from_slice(&[pad(1), pad(2)])];
    let mut provider = MemoryInputProvider::new(inputs.clone());
    let first = provider.inputs(&pad_context()).unwrap();
    let second = provider.inputs(&pad_context()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(&*first, inputs.as_slice());
    assert_eq!(first[0][PlayerHandle::new(1)], pad(2));
}

#[test]
fn invalid_sources_are_rejected() {
    let context = pad_context();

    let partial = BinaryInputProvider::new(vec![0u8; 12]).inputs(&context);
    assert!(matches!(partial, Err(RampartError::InvalidReplaySource { .. })));

    let corrupt = BinaryInputProvider::compressed(vec![0xff; 16]).inputs(&context);
    assert!(matches!(corrupt, Err(RampartError::InvalidReplaySource { .. })));

    let dir = tempfile::tempdir().unwrap();
    let missing = FileInputProvider::new(dir.path().join("nothing-here.bin")).inputs(&context);
    assert!(matches!(missing, Err(RampartError::InvalidReplaySource { .. })));

    // whole records whose bytes are not a valid input
    let chars = InputContext::new(EncodableSerializer::<char>::new(), 1, Endianness::Big).unwrap();
    let surrogate = BinaryInputProvider::new(0xD800u32.to_be_bytes().to_vec()).inputs(&chars);
    assert!(matches!(surrogate, Err(RampartError::InvalidReplaySource { .. })));
}

#[test]
fn compressed_partial_record_is_rejected() {
    let context = pad_context();
    let memory = MemoryInputListener::new();
    record(&mut memory.clone(), &context, 5);

    // a valid deflate stream of the wrong length
    let mut raw = Vec::new();
    for inputs in memory.iter() {
        context.write_record(&mut raw, &inputs).unwrap();
    }
    raw.push(0);
    let result = BinaryInputProvider::compressed(compress(&raw).unwrap()).inputs(&context);
    assert!(matches!(result, Err(RampartError::InvalidReplaySource { .. })));
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: miri_case_count(),
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_recording_replays_exactly(
        frames in proptest::collection::vec(proptest::collection::vec(any::<u32>(), 3), 0..64),
        little in any::<bool>(),
        compressed in any::<bool>(),
    ) {
        let endianness = if little { Endianness::Little } else { Endianness::Big };
        let context = InputContext::new(IntegerSerializer::<u32>::new(), 3, endianness).unwrap();
        let memory = MemoryInputListener::new();
        let mut listener = memory.clone();
        listener.on_session_start(&context).unwrap();
        for (frame, inputs) in frames.iter().enumerate() {
            listener
                .on_confirmed(Frame::new(frame as i32), &ConfirmedInputs::from_slice(inputs))
                .unwrap();
        }

        let mut raw = Vec::new();
        for inputs in memory.iter() {
            context.write_record(&mut raw, &inputs).unwrap();
        }
        let mut provider = if compressed {
            BinaryInputProvider::compressed(memory.compressed_inputs().unwrap())
        } else {
            BinaryInputProvider::new(raw)
        };
        let replayed = provider.inputs(&context).unwrap();
        prop_assert_eq!(replayed.len(), frames.len());
        for (replayed, expected) in replayed.iter().zip(&frames) {
            prop_assert_eq!(replayed.as_slice(), expected.as_slice());
        }
    }
}
