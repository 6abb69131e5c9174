//! Control core of an autonomous ground vehicle.
//!
//! Three worker threads joined by bounded drop-when-full channels:
//! capture → perception → control. The control thread runs the mission state machine
//! and a PD steering controller, and drives the motor and steering servo through a
//! PWM daemon.

pub mod component_a;
pub mod component_b;
pub mod config;
pub mod error;
pub mod utils;
