//! actuator.rs
//! Drive motor and steering servo on top of a PWM backend.
//!
//! - Startup: reuse a live backend or start one (and remember we own it), then poll for a
//!   connection and configure both channels before commanding neutral.
//! - Motor: forward acceleration is ramped in fixed steps, every other change is immediate.
//! - Servo: angle is mapped linearly onto a pulse width, then onto a duty value.
//! - Teardown never fails and runs at most once; Drop falls back to it.

use std::{
    thread,
    time::{Duration, Instant},
};

use log::{error, info, warn};

use crate::component_b::{daemon::BackendService, pwm::PwmChannel};
use crate::config::{ActuatorConfig, BackendConfig};
use crate::error::{ActuatorError, PwmError};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ActuatorDriver {
    config: ActuatorConfig,
    connect_attempts: u32,
    connect_retry: Duration,
    stop_deadline: Duration,
    backend: Box<dyn BackendService>,
    channel: Option<Box<dyn PwmChannel>>,
    last_motor_command: i32,
    daemon_owned_by_us: bool,
}

impl ActuatorDriver {
    pub fn new(config: ActuatorConfig, backend_config: &BackendConfig, backend: Box<dyn BackendService>) -> Self {
        Self {
            last_motor_command: config.motor_neutral,
            config,
            connect_attempts: backend_config.connect_attempts.max(1),
            connect_retry: Duration::from_millis(backend_config.connect_retry_ms),
            stop_deadline: Duration::from_millis(backend_config.stop_deadline_ms),
            backend,
            channel: None,
            daemon_owned_by_us: false,
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.channel.is_some()
    }

    pub fn last_motor_command(&self) -> i32 {
        self.last_motor_command
    }

    pub fn daemon_owned_by_us(&self) -> bool {
        self.daemon_owned_by_us
    }

    /// Bring the backend up and leave both actuators at neutral. Safe to call again.
    pub fn initialize(&mut self) -> Result<(), ActuatorError> {
        if self.channel.is_some() {
            return Ok(());
        }

        if self.backend.is_running() {
            info!("[Actuator] PWM backend already running, reusing it");
        } else {
            self.backend.start()?;
            self.daemon_owned_by_us = true;
        }

        let mut channel = match self.connect_with_retry() {
            Ok(channel) => channel,
            Err(last) => {
                error!(
                    "[Actuator] PWM backend unreachable after {} attempts: {}",
                    self.connect_attempts, last
                );
                if self.daemon_owned_by_us {
                    self.stop_daemon();
                }
                return Err(ActuatorError::BackendUnreachable {
                    attempts: self.connect_attempts,
                    last,
                });
            }
        };
        // Only a fully configured connection counts as initialised.
        if let Err(e) = self.configure_channels(channel.as_mut()) {
            error!("[Actuator] PWM channel setup failed: {}", e);
            channel.disconnect();
            if self.daemon_owned_by_us {
                self.stop_daemon();
            }
            return Err(e.into());
        }
        self.channel = Some(channel);
        info!(
            "[Actuator] ready (motor pin {}, servo pin {})",
            self.config.motor_pin, self.config.servo_pin
        );
        Ok(())
    }

    fn connect_with_retry(&mut self) -> Result<Box<dyn PwmChannel>, PwmError> {
        let mut attempt = 1;
        loop {
            match self.backend.connect() {
                Ok(channel) => return Ok(channel),
                Err(e) if attempt >= self.connect_attempts => return Err(e),
                Err(e) => {
                    warn!("[Actuator] connect attempt {} failed: {}", attempt, e);
                    attempt += 1;
                    thread::sleep(self.connect_retry);
                }
            }
        }
    }

    fn configure_channels(&mut self, channel: &mut dyn PwmChannel) -> Result<(), PwmError> {
        let cfg = &self.config;

        for (pin, hz, range) in [
            (cfg.motor_pin, cfg.motor_pwm_frequency, cfg.motor_pwm_range),
            (cfg.servo_pin, cfg.servo_pwm_frequency, cfg.servo_pwm_range),
        ] {
            channel.set_mode_output(pin)?;
            channel.set_frequency(pin, hz)?;
            channel.set_range(pin, range)?;
        }

        channel.set_duty(cfg.motor_pin, motor_duty(cfg.motor_neutral))?;
        channel.set_duty(cfg.servo_pin, servo_duty(cfg, cfg.servo_neutral))?;
        self.last_motor_command = cfg.motor_neutral;
        Ok(())
    }

    /// Command the drive motor. Out-of-range values are clamped.
    ///
    /// Accelerating forward from below the target ramps in `ramp_step` increments with
    /// `ramp_delay` after each write, so this can block for a few hundred milliseconds.
    pub fn set_motor(&mut self, value: i32) -> Result<(), ActuatorError> {
        let target = value.clamp(self.config.motor_min, self.config.motor_max);
        let neutral = self.config.motor_neutral;

        if target > neutral && target > self.last_motor_command {
            let step = self.config.ramp_step.max(1);
            let delay = self.config.ramp_delay();
            let mut current = self.last_motor_command.max(neutral);
            while current < target {
                current = (current + step).min(target);
                self.write_motor(current)?;
                thread::sleep(delay);
            }
        } else {
            self.write_motor(target)?;
        }
        Ok(())
    }

    fn write_motor(&mut self, value: i32) -> Result<(), ActuatorError> {
        let pin = self.config.motor_pin;
        let channel = self.channel.as_mut().ok_or(ActuatorError::NotInitialised)?;
        channel.set_duty(pin, motor_duty(value))?;
        self.last_motor_command = value;
        Ok(())
    }

    /// Command the steering servo angle. Out-of-range angles are clamped.
    pub fn set_servo(&mut self, angle: f64) -> Result<(), ActuatorError> {
        let duty = servo_duty(&self.config, angle);
        let pin = self.config.servo_pin;
        let channel = self.channel.as_mut().ok_or(ActuatorError::NotInitialised)?;
        channel.set_duty(pin, duty)?;
        Ok(())
    }

    /// Neutral both actuators, release the connection and stop the backend if we started it.
    pub fn shutdown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            let cfg = &self.config;
            if let Err(e) = channel.set_duty(cfg.motor_pin, motor_duty(cfg.motor_neutral)) {
                warn!("[Actuator] failed to neutral motor on shutdown: {}", e);
            } else {
                self.last_motor_command = cfg.motor_neutral;
            }
            if let Err(e) = channel.set_duty(cfg.servo_pin, servo_duty(cfg, cfg.servo_neutral)) {
                warn!("[Actuator] failed to center servo on shutdown: {}", e);
            }
            thread::sleep(Duration::from_millis(cfg.settle_ms));
            channel.disconnect();
            info!("[Actuator] actuators at neutral, connection closed");
        }

        if self.daemon_owned_by_us {
            self.stop_daemon();
            self.daemon_owned_by_us = false;
        }
    }

    fn stop_daemon(&mut self) {
        if let Err(e) = self.backend.stop_graceful() {
            warn!("[Actuator] graceful backend stop failed: {}", e);
        }

        let deadline = Instant::now() + self.stop_deadline;
        while self.backend.is_running() && Instant::now() < deadline {
            thread::sleep(STOP_POLL_INTERVAL);
        }

        if self.backend.is_running() {
            warn!("[Actuator] backend still running after {:?}, killing it", self.stop_deadline);
            if let Err(e) = self.backend.stop_forceful() {
                error!("[Actuator] forceful backend stop failed: {}", e);
            }
        }
        self.daemon_owned_by_us = false;
    }
}

impl Drop for ActuatorDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Motor commands are written as raw duty values.
fn motor_duty(value: i32) -> u32 {
    value.max(0) as u32
}

/// Duty value that produces the pulse width for `angle`.
pub fn servo_duty(cfg: &ActuatorConfig, angle: f64) -> u32 {
    let angle = angle.clamp(cfg.servo_min, cfg.servo_max);
    let span = cfg.servo_max - cfg.servo_min;
    let fraction = if span > 0.0 { (angle - cfg.servo_min) / span } else { 0.5 };
    let pulse_us = cfg.servo_pulse_min_us + fraction * (cfg.servo_pulse_max_us - cfg.servo_pulse_min_us);
    let duty = pulse_us * f64::from(cfg.servo_pwm_frequency) * f64::from(cfg.servo_pwm_range) / 1e6;
    duty.round().max(0.0) as u32
}
