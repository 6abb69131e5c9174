//! Full three-thread pipeline against the simulated PWM backend.

use std::{
    thread,
    time::{Duration, Instant},
};

use rts_vehicle::component_a::{
    capture::{Capture, SyntheticCamera},
    channel::BoundedChannel,
    perception::{Perception, PerceptionRecord},
    replay::ReplayPerceiver,
    scenario::SyntheticScenario,
    shutdown::ShutdownSignal,
};
use rts_vehicle::component_b::{
    actuator::ActuatorDriver,
    control_loop::ControlLoop,
    daemon::{SharedSimulatedLog, SimulatedBackend},
    mission::{MissionController, MissionStage},
};
use rts_vehicle::config::VehicleConfig;
use rts_vehicle::utils::{
    metrics::{SharedMetrics, shared_metrics},
    worker::{spawn_capture, spawn_control, spawn_perception},
};

fn test_config() -> VehicleConfig {
    let mut config = VehicleConfig::default();
    // Capture slower than control so no record is dropped at the result channel.
    config.pipeline.capture_period_ms = 3;
    config.pipeline.control_period_ms = 1;
    config.actuator.ramp_delay_ms = 0;
    config.actuator.settle_ms = 0;
    config.backend.stop_deadline_ms = 10;
    config
}

struct RunResult {
    stage: Option<MissionStage>,
    log: SharedSimulatedLog,
    metrics: SharedMetrics,
}

fn run_pipeline<P>(perceiver: P, cycles: u64, timeout: Duration) -> RunResult
where
    P: rts_vehicle::component_a::perception::Perceiver + 'static,
{
    let config = test_config();
    let backend = SimulatedBackend::new();
    let log = backend.log();

    let mut actuator = ActuatorDriver::new(config.actuator.clone(), &config.backend, Box::new(backend));
    actuator.initialize().unwrap();

    let shutdown = ShutdownSignal::new();
    let metrics = shared_metrics();
    let frames = BoundedChannel::new("frames", 5, &shutdown);
    let results = BoundedChannel::<PerceptionRecord>::new("results", 5, &shutdown);

    let control = spawn_control(
        ControlLoop::new(
            MissionController::from_config(&config),
            actuator,
            results.clone(),
            shutdown.clone(),
            metrics.clone(),
            config.pipeline.control_period(),
        ),
        None,
    )
    .unwrap();
    let perception = spawn_perception(Perception::new(
        perceiver,
        frames.clone(),
        results,
        shutdown.clone(),
        metrics.clone(),
    ))
    .unwrap();
    let capture = spawn_capture(Capture::new(
        SyntheticCamera::new(64),
        config.pipeline.capture_period(),
        frames,
        shutdown.clone(),
        metrics.clone(),
    ))
    .unwrap();

    let started = Instant::now();
    while metrics.lock().control_cycles < cycles && started.elapsed() < timeout {
        thread::sleep(Duration::from_millis(5));
    }

    shutdown.trigger();
    capture.join();
    perception.join();
    let stage = control.join();

    RunResult { stage, log, metrics }
}

#[test]
fn scenario_runs_to_a_stop_and_leaves_hardware_neutral() {
    let result = run_pipeline(SyntheticScenario::new(42), 340, Duration::from_secs(20));

    assert_eq!(result.stage, Some(MissionStage::Stopped));

    let log = result.log.lock();
    let motor = log.duties(13);
    assert!(motor.contains(&11_000), "never reached drive speed");
    assert!(motor.contains(&10_400), "never braked");
    assert_eq!(motor.last(), Some(&10_000));
    assert_eq!(log.duties(12).last(), Some(&3_000));
    assert_eq!(log.disconnects, 1);
    assert_eq!(log.graceful_stops, 1);

    let m = result.metrics.lock();
    assert!(m.control_cycles >= 340);
    assert!(m.records_produced >= m.control_cycles);
}

#[test]
fn replayed_records_hold_the_last_one() {
    let records = vec![
        PerceptionRecord {
            lateral_offset: 20.0,
            ..PerceptionRecord::default()
        };
        3
    ];
    let result = run_pipeline(
        ReplayPerceiver::from_records(records),
        10,
        Duration::from_secs(10),
    );

    assert_eq!(result.stage, Some(MissionStage::Drive));
    let log = result.log.lock();
    // Lane to the right of center steers below neutral on every cycle.
    let servo = log.duties(12);
    let steering: Vec<u32> = servo[1..servo.len() - 1].to_vec();
    assert!(!steering.is_empty());
    assert!(steering.iter().all(|&d| d < 3_000));
}

#[test]
fn shutdown_with_no_frames_still_neutrals() {
    let config = test_config();
    let backend = SimulatedBackend::already_running();
    let log = backend.log();
    let mut actuator = ActuatorDriver::new(config.actuator.clone(), &config.backend, Box::new(backend));
    actuator.initialize().unwrap();

    let shutdown = ShutdownSignal::new();
    let results = BoundedChannel::<PerceptionRecord>::new("results", 5, &shutdown);
    let control = spawn_control(
        ControlLoop::new(
            MissionController::from_config(&config),
            actuator,
            results,
            shutdown.clone(),
            shared_metrics(),
            config.pipeline.control_period(),
        ),
        None,
    )
    .unwrap();

    thread::sleep(Duration::from_millis(20));
    assert!(!control.is_finished());
    shutdown.trigger();
    assert_eq!(control.join(), Some(MissionStage::Drive));

    let log = log.lock();
    assert_eq!(log.duties(13), vec![10_000, 10_000]);
    assert_eq!(log.graceful_stops, 0);
}
