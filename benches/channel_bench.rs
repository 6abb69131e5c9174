/*
Measures the bounded channel hand-off: uncontended push/pop, and a producer thread
flooding a capacity-5 channel while the consumer drains it (the capture → perception shape).
*/

use criterion::{criterion_group, criterion_main, Criterion};
use std::{hint::black_box, thread};

use rts_vehicle::component_a::{channel::BoundedChannel, shutdown::ShutdownSignal};

fn channel_push_pop_bench(c: &mut Criterion) {
    let shutdown = ShutdownSignal::new();
    let channel = BoundedChannel::new("bench", 5, &shutdown);

    c.bench_function("channel_push_pop", |b| {
        b.iter(|| {
            channel.push(black_box(7u64));
            black_box(channel.pop_wait(&shutdown))
        })
    });
}

fn channel_contended_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_contended");
    group.sample_size(20);

    group.bench_function("flood_1000", |b| {
        b.iter(|| {
            let shutdown = ShutdownSignal::new();
            let channel = BoundedChannel::new("bench", 5, &shutdown);

            let producer = {
                let channel = channel.clone();
                let shutdown = shutdown.clone();
                thread::spawn(move || {
                    for i in 0..1_000u64 {
                        channel.push(i);
                    }
                    shutdown.trigger();
                })
            };

            let mut received = 0u64;
            while channel.pop_wait(&shutdown).is_some() {
                received += 1;
            }
            producer.join().ok();
            black_box(received)
        })
    });
    group.finish();
}

criterion_group!(benches, channel_push_pop_bench, channel_contended_bench);
criterion_main!(benches);
