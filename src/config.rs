//! config.rs
//! Vehicle configuration: every tunable constant of the pipeline, steering, actuation,
//! backend lifecycle and mission script.
//!
//! All sections are defaulted so an empty (or absent) TOML file yields the stock vehicle.
//! Gains are tuned for the 33 ms control period and are not rescaled when it changes.

use std::{fs::read_to_string, path::Path, time::Duration};

use serde::Deserialize;

use crate::component_a::perception::Decision;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub pipeline: PipelineConfig,
    pub steering: SteeringConfig,
    pub actuator: ActuatorConfig,
    pub backend: BackendConfig,
    pub mission: MissionConfig,
    pub telemetry: TelemetryConfig,
}

/// Channel sizes and thread cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_channel_capacity: usize,
    pub result_channel_capacity: usize,
    pub capture_period_ms: u64,
    pub control_period_ms: u64,
    /// Core to pin the control thread to. `None` leaves placement to the OS.
    pub control_core: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_channel_capacity: 5,
            result_channel_capacity: 5,
            capture_period_ms: 33,
            control_period_ms: 33,
            control_core: None,
        }
    }
}

impl PipelineConfig {
    pub fn capture_period(&self) -> Duration {
        Duration::from_millis(self.capture_period_ms)
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub kp: f64,
    pub kd: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self { kp: 0.25, kd: 0.125 }
    }
}

/// Physical limits and PWM channel setup for the drive motor and steering servo.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub motor_pin: u32,
    pub motor_pwm_frequency: u32,
    pub motor_pwm_range: u32,
    pub motor_min: i32,
    pub motor_max: i32,
    pub motor_neutral: i32,
    pub ramp_step: i32,
    pub ramp_delay_ms: u64,

    pub servo_pin: u32,
    pub servo_pwm_frequency: u32,
    pub servo_pwm_range: u32,
    pub servo_min: f64,
    pub servo_max: f64,
    pub servo_neutral: f64,
    /// Pulse width commanded at `servo_min`.
    pub servo_pulse_min_us: f64,
    /// Pulse width commanded at `servo_max`.
    pub servo_pulse_max_us: f64,

    /// Pause after driving to neutral on teardown.
    pub settle_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            motor_pin: 13,
            motor_pwm_frequency: 200,
            motor_pwm_range: 40_000,
            motor_min: 8_000,
            motor_max: 12_000,
            motor_neutral: 10_000,
            ramp_step: 50,
            ramp_delay_ms: 25,

            servo_pin: 12,
            servo_pwm_frequency: 50,
            servo_pwm_range: 40_000,
            servo_min: 0.0,
            servo_max: 200.0,
            servo_neutral: 100.0,
            servo_pulse_min_us: 500.0,
            servo_pulse_max_us: 2_500.0,

            settle_ms: 200,
        }
    }
}

impl ActuatorConfig {
    pub fn ramp_delay(&self) -> Duration {
        Duration::from_millis(self.ramp_delay_ms)
    }
}

/// Where the PWM daemon lives and how to start and stop it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub connect_attempts: u32,
    pub connect_retry_ms: u64,
    pub io_timeout_ms: u64,
    pub stop_deadline_ms: u64,
    pub process_name: String,
    pub start_command: Vec<String>,
    pub stop_command: Vec<String>,
    pub kill_command: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8888,
            connect_attempts: 20,
            connect_retry_ms: 100,
            io_timeout_ms: 500,
            stop_deadline_ms: 1_000,
            process_name: "pigpiod".into(),
            start_command: vec!["sudo".into(), "-n".into(), "pigpiod".into()],
            stop_command: vec!["sudo".into(), "-n".into(), "killall".into(), "pigpiod".into()],
            kill_command: vec![
                "sudo".into(),
                "-n".into(),
                "killall".into(),
                "-9".into(),
                "pigpiod".into(),
            ],
        }
    }
}

/// Mission script constants. Pixel quantities are in perception-frame units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Desired lateral offset of the lane midpoint.
    pub target_center: f64,
    /// Horizontal pixel of the image center; maps marker positions into offsets.
    pub image_center_x: f64,
    /// Lateral shift applied to the target once the decision is resolved.
    pub parking_shift: f64,

    pub obstacle_bias_px: f64,
    pub obstacle_target_count: u32,
    pub obstacle_hold_frames: u32,

    pub decision_max_retries: u32,
    pub decision_default: Decision,
    pub decision_settle_cycles: u32,

    pub stop_marking_threshold: u32,
    pub brake_steps: u32,

    pub drive_speed: i32,
    pub obstacle_speed: i32,
    pub cruise_speed: i32,
    pub brake_speed: i32,
    pub stop_speed: i32,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            target_center: 0.0,
            image_center_x: 160.0,
            parking_shift: 40.0,

            obstacle_bias_px: 55.0,
            obstacle_target_count: 3,
            obstacle_hold_frames: 80,

            decision_max_retries: 30,
            decision_default: Decision::B,
            decision_settle_cycles: 15,

            stop_marking_threshold: 2,
            brake_steps: 10,

            drive_speed: 11_000,
            obstacle_speed: 11_000,
            cruise_speed: 10_800,
            brake_speed: 10_400,
            stop_speed: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Per-cycle CSV trace. Disabled when absent.
    pub csv_path: Option<String>,
}

impl VehicleConfig {
    /// Load and validate a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = read_to_string(path)?;
        let config: VehicleConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.frame_channel_capacity == 0 || p.result_channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel capacities must be non-zero".into()));
        }
        if p.control_period_ms == 0 || p.capture_period_ms == 0 {
            return Err(ConfigError::Invalid("periods must be non-zero".into()));
        }

        let a = &self.actuator;
        if a.motor_min > a.motor_max {
            return Err(ConfigError::Invalid(format!(
                "motor_min {} exceeds motor_max {}",
                a.motor_min, a.motor_max
            )));
        }
        if !(a.motor_min..=a.motor_max).contains(&a.motor_neutral) {
            return Err(ConfigError::Invalid(format!(
                "motor_neutral {} outside [{}, {}]",
                a.motor_neutral, a.motor_min, a.motor_max
            )));
        }
        if a.ramp_step <= 0 {
            return Err(ConfigError::Invalid("ramp_step must be positive".into()));
        }
        if a.servo_min >= a.servo_max {
            return Err(ConfigError::Invalid(format!(
                "servo_min {} must be below servo_max {}",
                a.servo_min, a.servo_max
            )));
        }
        if !(a.servo_min..=a.servo_max).contains(&a.servo_neutral) {
            return Err(ConfigError::Invalid(format!(
                "servo_neutral {} outside [{}, {}]",
                a.servo_neutral, a.servo_min, a.servo_max
            )));
        }
        if a.servo_pwm_frequency == 0 || a.motor_pwm_frequency == 0 {
            return Err(ConfigError::Invalid("PWM frequencies must be non-zero".into()));
        }

        if self.mission.brake_steps == 0 {
            return Err(ConfigError::Invalid("brake_steps must be at least 1".into()));
        }
        if self.backend.connect_attempts == 0 {
            return Err(ConfigError::Invalid("connect_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
