//! mission.rs
//! Mission-progress state machine.
//!
//! One `step` per perception record. Branches are evaluated in a fixed priority order and
//! the first one that applies chooses the motor command (braking overrides once stop is
//! signaled). Lateral error and the steering step always run, whichever branch fired.
//!
//! Script: DRIVE → AWAIT_CROSSING → AVOID_OBSTACLES → RESOLVE_DECISION → AWAIT_STOP
//! → BRAKING → STOPPED. Stages only move forward.
//!
//! All counters live in `MissionState` so a snapshot fully describes the controller.

use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use crate::component_a::perception::{Decision, PerceptionRecord};
use crate::component_b::steering::SteeringController;
use crate::config::{ActuatorConfig, MissionConfig, VehicleConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum MissionStage {
    #[default]
    Drive,
    AwaitCrossing,
    AvoidObstacles,
    ResolveDecision,
    AwaitStop,
    Braking,
    Stopped,
}

impl MissionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStage::Drive => "DRIVE",
            MissionStage::AwaitCrossing => "AWAIT_CROSSING",
            MissionStage::AvoidObstacles => "AVOID_OBSTACLES",
            MissionStage::ResolveDecision => "RESOLVE_DECISION",
            MissionStage::AwaitStop => "AWAIT_STOP",
            MissionStage::Braking => "BRAKING",
            MissionStage::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for MissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionState {
    pub stage: MissionStage,
    pub start_cleared: bool,
    pub crossing_seen: bool,

    pub obstacle_count: u32,
    pub obstacle_hold_frames: u32,
    pub obstacles_finished: bool,

    pub decision_retries: u32,
    pub decision: Option<Decision>,
    /// Cycles left holding the motor at stop after accepting a decision.
    pub settle_remaining: u32,

    pub stop_signaled: bool,
    /// Never reset once braking starts.
    pub brake_step: u32,

    pub cycle: u64,
}

impl MissionState {
    pub fn decision_resolved(&self) -> bool {
        self.decision.is_some()
    }
}

/// What the control loop should send to the actuators for this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleCommand {
    pub motor: i32,
    pub servo_angle: f64,
    pub error: f64,
    pub stage: MissionStage,
}

pub struct MissionController {
    config: MissionConfig,
    steering: SteeringController,
    servo_neutral: f64,
    servo_min: f64,
    servo_max: f64,
    state: MissionState,
}

impl MissionController {
    pub fn new(config: MissionConfig, steering: SteeringController, actuator: &ActuatorConfig) -> Self {
        Self {
            config,
            steering,
            servo_neutral: actuator.servo_neutral,
            servo_min: actuator.servo_min,
            servo_max: actuator.servo_max,
            state: MissionState::default(),
        }
    }

    pub fn from_config(config: &VehicleConfig) -> Self {
        Self::new(
            config.mission.clone(),
            SteeringController::from_config(&config.steering),
            &config.actuator,
        )
    }

    pub fn state(&self) -> &MissionState {
        &self.state
    }

    pub fn stage(&self) -> MissionStage {
        self.state.stage
    }

    /// Advance the mission by one perception record.
    pub fn step(&mut self, record: &PerceptionRecord) -> CycleCommand {
        self.state.cycle += 1;

        // 1. Start clearance (latches)
        if !self.state.start_cleared && record.start_marker_cleared {
            self.state.start_cleared = true;
            info!("[Mission] start marker cleared");
            self.advance(MissionStage::AwaitCrossing);
        }

        // 2. Crossing detection, gated on start clearance (latches)
        if self.state.start_cleared && !self.state.crossing_seen && record.ground_marking_crossed {
            self.state.crossing_seen = true;
            info!("[Mission] ground marking crossed");
            self.advance(MissionStage::AvoidObstacles);
        }

        // 3. Base lateral error, shifted into the parking lane once the decision is made
        let shift = if self.state.decision_resolved() {
            self.config.parking_shift
        } else {
            0.0
        };
        let mut error = (self.config.target_center - shift) - record.lateral_offset;

        // 4..6: first matching branch picks the motor command
        let mut motor = if let Some(cone) = self.active_cone(record) {
            Some(self.avoid_obstacle(cone, &mut error))
        } else if self.state.obstacles_finished && !self.state.decision_resolved() {
            Some(self.resolve_decision(record))
        } else if self.state.decision_resolved() && !self.state.stop_signaled {
            Some(self.await_stop(record))
        } else {
            None
        };

        // 7. Braking runs every cycle from the one that signaled stop onward
        if self.state.stop_signaled {
            motor = Some(self.brake());
        }

        // 8. Nothing else applied: drive speed
        let motor = motor.unwrap_or(self.config.drive_speed);

        let servo_angle = (self.servo_neutral + self.steering.compute(error))
            .clamp(self.servo_min, self.servo_max);

        debug!(
            "[Mission] cycle={} stage={} offset={:.1} error={:.1} angle={:.1} motor={}",
            self.state.cycle, self.state.stage, record.lateral_offset, error, servo_angle, motor
        );

        CycleCommand {
            motor,
            servo_angle,
            error,
            stage: self.state.stage,
        }
    }

    /// Marker position if the avoidance branch applies this cycle.
    fn active_cone(&self, record: &PerceptionRecord) -> Option<i32> {
        if self.state.crossing_seen && !self.state.obstacles_finished {
            record.marker_cone_position
        } else {
            None
        }
    }

    fn avoid_obstacle(&mut self, cone: i32, error: &mut f64) -> i32 {
        let cfg = &self.config;
        let cone_offset = f64::from(cone) - cfg.image_center_x;

        // Pass alternate cones on alternate sides.
        let aim = if self.state.obstacle_count % 2 == 1 {
            cone_offset - cfg.obstacle_bias_px
        } else {
            cone_offset + cfg.obstacle_bias_px
        };
        *error = cfg.target_center - aim;

        self.state.obstacle_count += 1;
        debug!("[Mission] obstacle sighting {} at x={}", self.state.obstacle_count, cone);

        // The hold counter only moves on cycles where a marker is visible.
        if self.state.obstacle_count >= cfg.obstacle_target_count {
            self.state.obstacle_hold_frames += 1;
            if self.state.obstacle_hold_frames >= cfg.obstacle_hold_frames {
                self.state.obstacles_finished = true;
                self.state.decision_retries = 0;
                info!(
                    "[Mission] obstacle avoidance finished after {} sightings",
                    self.state.obstacle_count
                );
                self.advance(MissionStage::ResolveDecision);
            }
        }

        self.config.obstacle_speed
    }

    fn resolve_decision(&mut self, record: &PerceptionRecord) -> i32 {
        self.state.decision_retries += 1;

        if let Some(decision) = record.decision_result {
            self.state.decision = Some(decision);
            self.state.settle_remaining = self.config.decision_settle_cycles;
            info!(
                "[Mission] decision {:?} accepted after {} cycles",
                decision, self.state.decision_retries
            );
            self.advance(MissionStage::AwaitStop);
            return self.config.stop_speed;
        }

        if self.state.decision_retries > self.config.decision_max_retries {
            let fallback = self.config.decision_default;
            self.state.decision = Some(fallback);
            warn!(
                "[Mission] decision unresolved after {} cycles, defaulting to {:?}",
                self.state.decision_retries, fallback
            );
            self.advance(MissionStage::AwaitStop);
        }

        self.config.cruise_speed
    }

    fn await_stop(&mut self, record: &PerceptionRecord) -> i32 {
        if self.state.settle_remaining > 0 {
            self.state.settle_remaining -= 1;
            return self.config.stop_speed;
        }

        if record.stop_marking_count >= self.config.stop_marking_threshold {
            self.state.stop_signaled = true;
            info!(
                "[Mission] stop marking confirmed (count={}), braking",
                record.stop_marking_count
            );
            self.advance(MissionStage::Braking);
        }

        self.config.cruise_speed
    }

    fn brake(&mut self) -> i32 {
        self.state.brake_step = self.state.brake_step.saturating_add(1);
        if self.state.brake_step < self.config.brake_steps {
            self.config.brake_speed
        } else {
            self.advance(MissionStage::Stopped);
            self.config.stop_speed
        }
    }

    fn advance(&mut self, next: MissionStage) {
        if next > self.state.stage {
            info!("[Mission] stage {} -> {}", self.state.stage, next);
            self.state.stage = next;
        }
    }
}
