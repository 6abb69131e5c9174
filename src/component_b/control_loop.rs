//! control_loop.rs
//! Control stage: Result Channel → mission step → actuators.
//! - One mission step per perception record, paced to the control period on absolute ticks
//! - Actuator faults are logged and the loop carries on with the next record
//! - On shutdown the actuators are driven to neutral before the thread exits

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::component_a::{
    channel::BoundedChannel,
    perception::PerceptionRecord,
    shutdown::ShutdownSignal,
};
use crate::component_b::{
    actuator::ActuatorDriver,
    mission::{MissionController, MissionStage},
};
use crate::utils::{
    metrics::{DeadlineComponent, SharedMetrics, push_capped_u64},
    telemetry::{CycleRow, TelemetryWriter},
};

pub struct ControlLoop {
    mission: MissionController,
    actuator: ActuatorDriver,
    results: Arc<BoundedChannel<PerceptionRecord>>,
    shutdown: Arc<ShutdownSignal>,
    metrics: SharedMetrics,
    period: Duration,
    telemetry: Option<TelemetryWriter>,
}

impl ControlLoop {
    pub fn new(
        mission: MissionController,
        actuator: ActuatorDriver,
        results: Arc<BoundedChannel<PerceptionRecord>>,
        shutdown: Arc<ShutdownSignal>,
        metrics: SharedMetrics,
        period: Duration,
    ) -> Self {
        Self {
            mission,
            actuator,
            results,
            shutdown,
            metrics,
            period,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, writer: TelemetryWriter) -> Self {
        self.telemetry = Some(writer);
        self
    }

    pub fn mission(&self) -> &MissionController {
        &self.mission
    }

    /// Run until shutdown, then neutral the actuators. Returns the final mission stage.
    pub fn run(&mut self) -> MissionStage {
        info!("[Control] started period={:?}", self.period);

        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_tick = Instant::now() + self.period;
        let mut reported_stop = false;

        while let Some(record) = self.results.pop_wait(&self.shutdown) {
            let started = Instant::now();
            let command = self.mission.step(&record);

            if let Err(e) = self.actuator.set_motor(command.motor) {
                warn!("[Control] motor command {} failed: {}", command.motor, e);
            }
            if let Err(e) = self.actuator.set_servo(command.servo_angle) {
                warn!("[Control] servo command {:.1} failed: {}", command.servo_angle, e);
            }

            let work_us = started.elapsed().as_micros() as u64;
            {
                let mut m = self.metrics.lock();
                m.control_cycles += 1;
                push_capped_u64(&mut m.cycle_us, work_us);
            }
            if let Some(telemetry) = self.telemetry.as_mut() {
                telemetry.record(&CycleRow::new(
                    self.mission.state().cycle,
                    record.lateral_offset,
                    &command,
                    work_us,
                ));
            }

            if command.stage == MissionStage::Stopped && !reported_stop {
                reported_stop = true;
                info!("[Control] mission complete, holding at stop");
            }

            let now = Instant::now();
            if now < next_tick {
                sleeper.sleep(next_tick - now);
                next_tick += self.period;
            } else {
                // Overran the tick (e.g. a motor ramp); start a fresh schedule.
                self.metrics.lock().record_deadline_miss(DeadlineComponent::Control);
                next_tick = now + self.period;
            }
        }

        if let Some(telemetry) = self.telemetry.as_mut() {
            telemetry.flush();
        }
        self.actuator.shutdown();

        let stage = self.mission.stage();
        info!("[Control] stopped at stage {}", stage);
        stage
    }
}
