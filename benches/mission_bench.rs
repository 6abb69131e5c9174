//! Cost of one mission step, fed from the synthetic scenario so every stage is visited.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::{hint::black_box, time::Instant};

use rts_vehicle::component_a::{
    capture::Frame,
    perception::{Perceiver, PerceptionRecord},
    scenario::SyntheticScenario,
};
use rts_vehicle::component_b::mission::MissionController;
use rts_vehicle::config::VehicleConfig;

fn scenario_records(n: usize) -> Vec<PerceptionRecord> {
    let mut scenario = SyntheticScenario::new(11);
    let frame = Frame::new(0, Instant::now(), vec![0]);
    (0..n).map(|_| scenario.perceive(&frame)).collect()
}

fn mission_step_bench(c: &mut Criterion) {
    let config = VehicleConfig::default();
    let records = scenario_records(400);

    c.bench_function("mission_step_single", |b| {
        let mut mission = MissionController::from_config(&config);
        let record = PerceptionRecord::default();
        b.iter(|| black_box(mission.step(black_box(&record))))
    });

    c.bench_function("mission_full_scenario", |b| {
        b.iter_batched(
            || MissionController::from_config(&config),
            |mut mission| {
                for record in &records {
                    black_box(mission.step(record));
                }
                mission
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, mission_step_bench);
criterion_main!(benches);
