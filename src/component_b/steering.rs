//! steering.rs
//! Lateral steering controller: proportional plus derivative on the pixel error.
//!
//! No integral term, so a long saturation (e.g. lane target held while a decision is
//! pending) cannot wind up. The derivative is a plain per-call difference and assumes a
//! fixed call cadence (the 33 ms control period).

use crate::config::SteeringConfig;

#[derive(Debug, Clone)]
pub struct SteeringController {
    kp: f64,
    kd: f64,
    last_error: f64,
}

impl SteeringController {
    pub fn new(kp: f64, kd: f64) -> Self {
        Self {
            kp,
            kd,
            last_error: 0.0,
        }
    }

    pub fn from_config(config: &SteeringConfig) -> Self {
        Self::new(config.kp, config.kd)
    }

    /// Steering correction for `error`. Overwrites the stored error.
    #[inline]
    pub fn compute(&mut self, error: f64) -> f64 {
        let derivative = error - self.last_error;
        self.last_error = error;
        self.kp * error + self.kd * derivative
    }

    #[inline]
    pub fn last_error(&self) -> f64 {
        self.last_error
    }
}

impl Default for SteeringController {
    fn default() -> Self {
        Self::from_config(&SteeringConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_includes_full_derivative() {
        let mut pid = SteeringController::default();
        // 0.25 * 8 + 0.125 * (8 - 0)
        assert_eq!(pid.compute(8.0), 3.0);
        assert_eq!(pid.last_error(), 8.0);
    }

    #[test]
    fn sustained_zero_error_settles_to_zero() {
        let mut pid = SteeringController::default();
        pid.compute(12.0);
        pid.compute(0.0);
        assert_eq!(pid.compute(0.0), 0.0);
    }

    #[test]
    fn output_depends_only_on_error_and_last_error() {
        let mut a = SteeringController::default();
        let mut b = SteeringController::default();
        a.compute(-40.0);
        a.compute(5.0);
        b.compute(5.0);
        // Both now hold last_error = 5.0
        assert_eq!(a.compute(-3.0), b.compute(-3.0));
    }

    #[test]
    fn derivative_opposes_a_shrinking_error() {
        let mut pid = SteeringController::new(0.25, 0.125);
        pid.compute(20.0);
        let out = pid.compute(10.0);
        // 2.5 - 1.25
        assert_eq!(out, 1.25);
    }
}
