//! Benchmarks for confirmed-input recording and replay
//!
//! Run with: cargo bench --bench input_recording
//!
//! Uses realistic input patterns: idle players, periodic button presses and analog sticks.
//! Compressed recordings are measured against the raw record stride.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rampart::input::{
    compress, decompress, BinaryInputProvider, InputListener, InputProvider, MemoryInputListener,
};
use rampart::serialization::IntegerSerializer;
use rampart::{ConfirmedInputs, Endianness, Frame, InputContext};
use std::hint::black_box;

const PLAYERS: usize = 4;

/// Same input every frame
fn idle_inputs(frames: usize) -> Vec<ConfirmedInputs<u32>> {
    vec![ConfirmedInputs::new(PLAYERS); frames]
}

/// Button press every 5 frames
fn active_inputs(frames: usize) -> Vec<ConfirmedInputs<u32>> {
    (0..frames)
        .map(|i| {
            (0..PLAYERS)
                .map(|p| if (i + p) % 5 == 0 { 1 << (i % 8) } else { 0 })
                .collect()
        })
        .collect()
}

/// Smooth stick movement packed into the low bytes
fn analog_inputs(frames: usize) -> Vec<ConfirmedInputs<u32>> {
    (0..frames)
        .map(|i| {
            (0..PLAYERS)
                .map(|p| {
                    let angle = (i as f32 * 0.1 + p as f32).sin();
                    let x = ((angle * 127.0) as i8) as u8;
                    let y = ((angle.cos() * 127.0) as i8) as u8;
                    u32::from(x) | (u32::from(y) << 8)
                })
                .collect()
        })
        .collect()
}

fn context() -> InputContext<u32> {
    match InputContext::new(IntegerSerializer::<u32>::new(), PLAYERS, Endianness::Big) {
        Ok(context) => context,
        Err(err) => panic!("bench context: {err}"),
    }
}

fn records(context: &InputContext<u32>, inputs: &[ConfirmedInputs<u32>]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(inputs.len() * context.confirmed_input_size());
    for frame in inputs {
        context.write_record(&mut bytes, frame).unwrap_or_default();
    }
    bytes
}

fn scenarios(frames: usize) -> [(&'static str, Vec<ConfirmedInputs<u32>>); 3] {
    [
        ("idle", idle_inputs(frames)),
        ("active", active_inputs(frames)),
        ("analog", analog_inputs(frames)),
    ]
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("Record");
    let context = context();

    for frames in [60, 600, 3600] {
        let inputs = active_inputs(frames);
        group.throughput(Throughput::Bytes(
            (frames * context.confirmed_input_size()) as u64,
        ));
        group.bench_with_input(BenchmarkId::new("memory", frames), &inputs, |b, inputs| {
            b.iter(|| {
                let mut listener = MemoryInputListener::new();
                listener.on_session_start(&context).unwrap_or_default();
                for (frame, confirmed) in inputs.iter().enumerate() {
                    listener
                        .on_confirmed(Frame::new(frame as i32), black_box(confirmed))
                        .unwrap_or_default();
                }
                listener.len()
            });
        });
        group.bench_with_input(BenchmarkId::new("records", frames), &inputs, |b, inputs| {
            b.iter(|| records(&context, black_box(inputs)).len());
        });
    }

    group.finish();
}

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("Deflate");
    let context = context();

    for (name, inputs) in scenarios(3600) {
        let raw = records(&context, &inputs);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("compress", name), &raw, |b, raw| {
            b.iter(|| compress(black_box(raw)).map(|bytes| bytes.len()));
        });

        let compressed = compress(&raw).unwrap_or_default();
        group.bench_with_input(
            BenchmarkId::new("decompress", name),
            &compressed,
            |b, compressed| {
                b.iter(|| decompress(black_box(compressed)).map(|bytes| bytes.len()));
            },
        );
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("Replay decode");
    let context = context();

    for (name, inputs) in scenarios(3600) {
        let raw = records(&context, &inputs);
        let compressed = compress(&raw).unwrap_or_default();
        group.throughput(Throughput::Elements(inputs.len() as u64));

        group.bench_with_input(BenchmarkId::new("raw", name), &raw, |b, raw| {
            b.iter(|| {
                BinaryInputProvider::new(black_box(raw.clone()))
                    .inputs(&context)
                    .map(|frames| frames.len())
            });
        });
        group.bench_with_input(
            BenchmarkId::new("compressed", name),
            &compressed,
            |b, compressed| {
                b.iter(|| {
                    BinaryInputProvider::compressed(black_box(compressed.clone()))
                        .inputs(&context)
                        .map(|frames| frames.len())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_record, bench_compression, bench_replay);
criterion_main!(benches);
