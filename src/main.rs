//! # Vehicle Control Entry Point
//!
//! Wires capture → perception → control and supervises the run.
//!
//! ## Threads
//! - **Capture:** synthetic camera at the capture period → Frame Channel (drop-when-full).
//! - **Perception:** replayed CSV records or a seeded scenario → Result Channel.
//! - **Control:** mission state machine + PD steering → motor/servo via the PWM daemon,
//!   max OS priority, optional core pin.
//! - **Supervisor (this thread):** polls for SIGINT/SIGTERM, the run duration and the control
//!   thread, then triggers shutdown and joins the workers in pipeline order.
//!
//! ## Exit status
//! 0 on a clean shutdown. 1 when configuration or actuator startup fails, a worker exits
//! before shutdown is requested, or a worker panics.

use std::{
    process::ExitCode,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use log::{error, info, warn};

use rts_vehicle::{
    component_a::{
        capture::{Capture, SyntheticCamera},
        channel::BoundedChannel,
        perception::{Perceiver, Perception},
        replay::ReplayPerceiver,
        scenario::SyntheticScenario,
        shutdown::ShutdownSignal,
    },
    component_b::{
        actuator::ActuatorDriver,
        control_loop::ControlLoop,
        daemon::{BackendService, Pigpiod, SimulatedBackend},
        mission::MissionController,
    },
    config::VehicleConfig,
    utils::{
        metrics::shared_metrics,
        telemetry::TelemetryWriter,
        worker::{join_in_order, spawn_capture, spawn_control, spawn_perception},
    },
};

const SUPERVISOR_POLL: Duration = Duration::from_millis(100);
const SYNTHETIC_FRAME_BYTES: usize = 320 * 240;
const SCENARIO_SEED: u64 = 42;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "rts_vehicle")]
#[command(about = "Autonomous ground vehicle control core")]
#[command(version)]
struct Args {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(long)]
    config: Option<String>,

    /// Replay perception records from a CSV file instead of the synthetic scenario
    #[arg(long)]
    replay: Option<String>,

    /// Use the simulated PWM backend instead of the pigpio daemon
    #[arg(long)]
    simulate: bool,

    /// Stop after this many seconds (runs until interrupted when omitted)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Write a per-cycle control trace to this CSV file
    #[arg(long)]
    telemetry: Option<String>,
}

extern "C" fn on_signal(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("=== VEHICLE CONTROL START ===");

    let mut config = match &args.config {
        Some(path) => match VehicleConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("[Main] {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => VehicleConfig::default(),
    };
    if let Some(path) = &args.telemetry {
        config.telemetry.csv_path = Some(path.clone());
    }

    install_signal_handlers();

    let status = match &args.replay {
        Some(path) => match ReplayPerceiver::from_path(path) {
            Ok(replay) => {
                info!("[Main] replaying {} perception records from {}", replay.remaining(), path);
                run(&config, &args, replay)
            }
            Err(e) => {
                error!("[Main] cannot read replay file {}: {}", path, e);
                ExitCode::FAILURE
            }
        },
        None => {
            info!("[Main] using synthetic scenario (seed {})", SCENARIO_SEED);
            run(&config, &args, SyntheticScenario::new(SCENARIO_SEED))
        }
    };

    info!("=== VEHICLE CONTROL FINISHED ===");
    status
}

fn run<P: Perceiver + 'static>(config: &VehicleConfig, args: &Args, perceiver: P) -> ExitCode {
    let backend: Box<dyn BackendService> = if args.simulate {
        info!("[Main] simulated PWM backend, no hardware will be touched");
        Box::new(SimulatedBackend::new())
    } else {
        Box::new(Pigpiod::new(config.backend.clone()))
    };

    let mut actuator = ActuatorDriver::new(config.actuator.clone(), &config.backend, backend);
    if let Err(e) = actuator.initialize() {
        error!("[Main] actuator startup failed: {}", e);
        return ExitCode::FAILURE;
    }

    let shutdown = ShutdownSignal::new();
    let metrics = shared_metrics();
    let frames = BoundedChannel::new("frames", config.pipeline.frame_channel_capacity, &shutdown);
    let results = BoundedChannel::new("results", config.pipeline.result_channel_capacity, &shutdown);

    let mut control = ControlLoop::new(
        MissionController::from_config(config),
        actuator,
        results.clone(),
        shutdown.clone(),
        metrics.clone(),
        config.pipeline.control_period(),
    );
    if let Some(path) = &config.telemetry.csv_path {
        match TelemetryWriter::create(path) {
            Ok(writer) => control = control.with_telemetry(writer),
            Err(e) => warn!("[Main] telemetry disabled, cannot create {}: {}", path, e),
        }
    }

    // Control first so records never queue up without a consumer.
    let control = match spawn_control(control, config.pipeline.control_core) {
        Ok(handle) => handle,
        Err(e) => {
            error!("[Main] failed to spawn control thread: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let perception = spawn_perception(Perception::new(
        perceiver,
        frames.clone(),
        results,
        shutdown.clone(),
        metrics.clone(),
    ));
    let capture = spawn_capture(Capture::new(
        SyntheticCamera::new(SYNTHETIC_FRAME_BYTES),
        config.pipeline.capture_period(),
        frames,
        shutdown.clone(),
        metrics.clone(),
    ));

    let (capture, perception) = match (capture, perception) {
        (Ok(c), Ok(p)) => (c, p),
        (c, p) => {
            error!("[Main] failed to spawn pipeline workers");
            shutdown.trigger();
            if let Ok(c) = c {
                c.join();
            }
            if let Ok(p) = p {
                p.join();
            }
            control.join();
            return ExitCode::FAILURE;
        }
    };

    info!("[Main] pipeline running");
    let deadline = args.duration_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut clean = true;
    loop {
        if INTERRUPTED.load(Ordering::SeqCst) {
            info!("[Main] interrupt received");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("[Main] run duration elapsed");
            break;
        }
        if control.is_finished() || capture.is_finished() || perception.is_finished() {
            error!("[Main] a worker exited before shutdown was requested");
            clean = false;
            break;
        }
        thread::sleep(SUPERVISOR_POLL);
    }

    shutdown.trigger();
    match join_in_order(capture, perception, control) {
        Some(stage) => info!("[Main] final mission stage {}", stage),
        None => clean = false,
    }

    metrics.lock().log_summary();
    if clean {
        ExitCode::SUCCESS
    } else {
        error!("[Main] run did not shut down cleanly");
        ExitCode::FAILURE
    }
}
