//! error.rs
//! Error types shared by the actuation layer and configuration loading.
//!
//! Nothing here crosses a thread boundary: workers log their own faults and the only
//! cross-thread failure path is the shutdown signal.

use thiserror::Error;

/// Faults raised while talking to the PWM backend over its socket.
#[derive(Debug, Error)]
pub enum PwmError {
    #[error("PWM backend I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backend answered but reported a negative status code.
    #[error("PWM backend rejected command {cmd} (p1={p1}, p2={p2}) with status {status}")]
    Rejected { cmd: u32, p1: u32, p2: u32, status: i32 },

    #[error("PWM backend connection is closed")]
    Disconnected,
}

/// Faults raised while starting or stopping the backend daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {status}")]
    CommandFailed { command: String, status: i32 },

    #[error("Daemon command is empty")]
    EmptyCommand,
}

/// Faults surfaced by the actuator driver.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// Unrecoverable at startup: the process exits nonzero.
    #[error("PWM backend unreachable after {attempts} attempts: {last}")]
    BackendUnreachable { attempts: u32, last: PwmError },

    #[error("Actuator driver is not initialised")]
    NotInitialised,

    #[error(transparent)]
    Pwm(#[from] PwmError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Faults raised while loading the vehicle configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read the configuration file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Cannot parse the configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
