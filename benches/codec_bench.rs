use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Instant;

use pressure_bus::codec;

fn codec_round_trip_bench(c: &mut Criterion) {
    c.bench_function("encode_decode_round_trip", |b| {
        b.iter(|| {
            let payload = codec::encode(black_box(200), black_box(0x0001_0000));
            black_box(codec::decode(&payload))
        })
    });

    c.bench_function("encode_latency", |b| {
        b.iter(|| {
            let start = Instant::now();
            let payload = codec::encode(black_box(200), black_box(0x0001_0000));
            black_box(payload);
            assert!(start.elapsed().as_micros() < 5000); // well under the 1 ms tick budget
        })
    });
}

criterion_group!(benches, codec_round_trip_bench);
criterion_main!(benches);
