//! Criterion benchmarks for the queue and relay hot paths.
//!
//! Run with: cargo bench -p daq-fifo

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn fill_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_fill_drain");

    for capacity in [64usize, 512, 4096] {
        group.throughput(Throughput::Elements(capacity as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let (mut producer, mut consumer) = daq_fifo::channel(capacity).unwrap();
                b.iter(|| {
                    producer.settle();
                    for word in 0..capacity as u32 {
                        producer.write(black_box(word));
                    }
                    consumer.settle();
                    while let Some(word) = consumer.read() {
                        black_box(word);
                    }
                });
            },
        );
    }

    group.finish();
}

fn pulse_relay(c: &mut Criterion) {
    c.bench_function("pulse_relay_round_trip", |b| {
        let (mut sender, mut receiver) = daq_fifo::pulse_relay();
        b.iter(|| {
            sender.fire();
            for _ in 0..=daq_fifo::SETTLE_STEPS {
                black_box(receiver.step());
            }
        });
    });
}

criterion_group!(benches, fill_and_drain, pulse_relay);
criterion_main!(benches);
