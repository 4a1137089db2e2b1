//! Benchmarks for the binary codec
//!
//! Run with: cargo bench --bench codec
//!
//! Measures scalar and composite encoding in both byte orders, and the protocol
//! messages a transport sends every few frames.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::{Quat, Vec3};
use rampart::network::messages::{deserialize_message, serialize_message};
use rampart::serialization::{
    decode_at, encode_at, BinaryBufferWriter, BinaryReader, Endianness, FixedSize,
};
use rampart::{ConsistencyCheckReply, Frame, QualityReport};
use std::hint::black_box;

const ORDERS: [(&str, Endianness); 2] = [("big", Endianness::Big), ("little", Endianness::Little)];

fn bench_scalars(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scalar encode");
    let values: Vec<u64> = (0..1024).map(|i| i * 0x0101_0101).collect();
    group.throughput(Throughput::Bytes((values.len() * u64::SIZE) as u64));

    for (name, endianness) in ORDERS {
        group.bench_with_input(BenchmarkId::new("u64", name), &values, |b, values| {
            let mut buffer = Vec::with_capacity(values.len() * u64::SIZE);
            b.iter(|| {
                buffer.clear();
                let mut writer = BinaryBufferWriter::new(&mut buffer, endianness);
                for value in values {
                    writer.write_u64(*value).unwrap_or_default();
                }
                black_box(buffer.len())
            });
        });
    }

    group.finish();

    let mut group = c.benchmark_group("Scalar decode");
    for (name, endianness) in ORDERS {
        let mut buffer = Vec::new();
        let mut writer = BinaryBufferWriter::new(&mut buffer, endianness);
        for value in &values {
            writer.write_u64(*value).unwrap_or_default();
        }
        group.throughput(Throughput::Bytes(buffer.len() as u64));
        group.bench_with_input(BenchmarkId::new("u64", name), &buffer, |b, buffer| {
            b.iter(|| {
                let mut offset = 0;
                let mut reader = BinaryReader::new(black_box(buffer), &mut offset, endianness);
                let mut sum = 0u64;
                while let Ok(value) = reader.read_u64() {
                    sum = sum.wrapping_add(value);
                }
                sum
            });
        });
    }

    group.finish();
}

fn bench_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("Transform roundtrip");
    let transform = (
        Vec3::new(12.5, -3.0, 0.125),
        Quat::from_rotation_y(0.7),
    );
    group.throughput(Throughput::Bytes((Vec3::SIZE + Quat::SIZE) as u64));

    for (name, endianness) in ORDERS {
        group.bench_function(name, |b| {
            let mut buffer = [0u8; 28];
            b.iter(|| {
                let mut offset = 0;
                encode_at(black_box(&transform.0), &mut buffer, &mut offset, endianness)
                    .unwrap_or_default();
                encode_at(black_box(&transform.1), &mut buffer, &mut offset, endianness)
                    .unwrap_or_default();

                let mut cursor = 0;
                let position = decode_at::<Vec3>(&buffer, &mut cursor, endianness);
                let rotation = decode_at::<Quat>(&buffer, &mut cursor, endianness);
                black_box((position.is_ok(), rotation.is_ok()))
            });
        });
    }

    group.finish();
}

fn bench_messages(c: &mut Criterion) {
    let mut group = c.benchmark_group("Protocol messages");
    let report = QualityReport {
        frame_advantage: -2,
        ping: 1_234_567,
    };
    let reply = ConsistencyCheckReply {
        frame: Frame::new(3600),
        checksum: 0xDEAD_BEEF,
    };

    for (name, endianness) in ORDERS {
        group.bench_function(BenchmarkId::new("quality_report", name), |b| {
            let mut packet = [0u8; 64];
            b.iter(|| {
                let written =
                    serialize_message(black_box(&report), &mut packet, endianness).unwrap_or(0);
                deserialize_message::<QualityReport>(&packet[..written], endianness).is_ok()
            });
        });

        group.bench_function(BenchmarkId::new("consistency_reply", name), |b| {
            let mut packet = [0u8; 64];
            b.iter(|| {
                let written =
                    serialize_message(black_box(&reply), &mut packet, endianness).unwrap_or(0);
                deserialize_message::<ConsistencyCheckReply>(&packet[..written], endianness)
                    .is_ok()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scalars, bench_transforms, bench_messages);
criterion_main!(benches);
