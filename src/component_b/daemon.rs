//! daemon.rs
//! Lifecycle of the process that owns the PWM hardware.
//!
//! `Pigpiod` drives the real daemon through shell commands taken from the configuration.
//! `SimulatedBackend` stands in for it on machines without GPIO and records every write so
//! dry runs and tests can inspect what would have reached the pins.

use std::{
    process::{Child, Command, Stdio},
    sync::Arc,
    time::Duration,
};

use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use crate::component_b::pwm::{PigpioSocket, PwmChannel, PwmWrite};
use crate::config::BackendConfig;
use crate::error::{DaemonError, PwmError};

/// A PWM provider that may need to be started before it accepts connections.
pub trait BackendService: Send {
    fn is_running(&mut self) -> bool;
    fn start(&mut self) -> Result<(), DaemonError>;
    fn connect(&mut self) -> Result<Box<dyn PwmChannel>, PwmError>;
    fn stop_graceful(&mut self) -> Result<(), DaemonError>;
    fn stop_forceful(&mut self) -> Result<(), DaemonError>;
}

pub struct Pigpiod {
    config: BackendConfig,
    launcher: Option<Child>,
}

impl Pigpiod {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            launcher: None,
        }
    }

    /// Collect the start command's exit status if it has finished.
    fn reap_launcher(&mut self) {
        if let Some(child) = self.launcher.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) if !status.success() => {
                    warn!("[Daemon] start command exited with {}", status);
                    self.launcher = None;
                }
                Ok(Some(_)) => self.launcher = None,
                Ok(None) => {}
                Err(e) => {
                    warn!("[Daemon] cannot poll start command: {}", e);
                    self.launcher = None;
                }
            }
        }
    }
}

/// Build `argv` with no terminal attached, so it can never block on a prompt.
fn quiet_command(argv: &[String]) -> Result<(Command, String), DaemonError> {
    let (program, args) = argv.split_first().ok_or(DaemonError::EmptyCommand)?;
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    Ok((command, argv.join(" ")))
}

/// Launch `argv` without waiting for it. Readiness is checked by the caller's connect polling.
fn spawn_command(argv: &[String]) -> Result<Child, DaemonError> {
    let (mut command, line) = quiet_command(argv)?;
    debug!("[Daemon] launching `{}`", line);
    command.spawn().map_err(|source| DaemonError::Spawn {
        command: line,
        source,
    })
}

/// Run `argv` to completion and map a nonzero exit into an error.
fn run_command(argv: &[String]) -> Result<(), DaemonError> {
    let (mut command_builder, command) = quiet_command(argv)?;

    debug!("[Daemon] running `{}`", command);
    let status = command_builder
        .status()
        .map_err(|source| DaemonError::Spawn {
            command: command.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(DaemonError::CommandFailed {
            command,
            status: status.code().unwrap_or(-1),
        })
    }
}

impl BackendService for Pigpiod {
    fn is_running(&mut self) -> bool {
        Command::new("pgrep")
            .arg("-x")
            .arg(&self.config.process_name)
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn start(&mut self) -> Result<(), DaemonError> {
        info!("[Daemon] starting {}", self.config.process_name);
        self.launcher = Some(spawn_command(&self.config.start_command)?);
        Ok(())
    }

    fn connect(&mut self) -> Result<Box<dyn PwmChannel>, PwmError> {
        let socket = PigpioSocket::connect(
            &self.config.host,
            self.config.port,
            Duration::from_millis(self.config.io_timeout_ms),
        )?;
        Ok(Box::new(socket))
    }

    fn stop_graceful(&mut self) -> Result<(), DaemonError> {
        self.reap_launcher();
        info!("[Daemon] stopping {}", self.config.process_name);
        run_command(&self.config.stop_command)
    }

    fn stop_forceful(&mut self) -> Result<(), DaemonError> {
        info!("[Daemon] killing {}", self.config.process_name);
        let result = run_command(&self.config.kill_command);
        self.reap_launcher();
        result
    }
}

/// Everything a simulated backend has been asked to do.
#[derive(Debug, Default)]
pub struct SimulatedLog {
    pub writes: Vec<PwmWrite>,
    pub starts: u32,
    pub graceful_stops: u32,
    pub forceful_stops: u32,
    pub connects: u32,
    pub disconnects: u32,
}

impl SimulatedLog {
    /// Duty values written to `pin`, in order.
    pub fn duties(&self, pin: u32) -> Vec<u32> {
        self.writes
            .iter()
            .filter_map(|w| match *w {
                PwmWrite::Duty { pin: p, duty } if p == pin => Some(duty),
                _ => None,
            })
            .collect()
    }
}

pub type SharedSimulatedLog = Arc<Mutex<SimulatedLog>>;

pub struct SimulatedBackend {
    running: bool,
    reachable: bool,
    ignores_graceful_stop: bool,
    log: SharedSimulatedLog,
}

impl SimulatedBackend {
    /// Backend that is not running yet and starts on request.
    pub fn new() -> Self {
        Self {
            running: false,
            reachable: true,
            ignores_graceful_stop: false,
            log: Arc::new(Mutex::new(SimulatedLog::default())),
        }
    }

    /// Backend that some other process already started.
    pub fn already_running() -> Self {
        Self {
            running: true,
            ..Self::new()
        }
    }

    /// Backend that starts but never accepts a connection.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    /// Backend that only exits on a forceful stop.
    pub fn stubborn() -> Self {
        Self {
            ignores_graceful_stop: true,
            ..Self::new()
        }
    }

    pub fn log(&self) -> SharedSimulatedLog {
        self.log.clone()
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendService for SimulatedBackend {
    fn is_running(&mut self) -> bool {
        self.running
    }

    fn start(&mut self) -> Result<(), DaemonError> {
        self.log.lock().starts += 1;
        self.running = true;
        Ok(())
    }

    fn connect(&mut self) -> Result<Box<dyn PwmChannel>, PwmError> {
        if !self.running || !self.reachable {
            return Err(PwmError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "simulated backend refused the connection",
            )));
        }
        self.log.lock().connects += 1;
        Ok(Box::new(SimulatedPwm {
            log: self.log.clone(),
            connected: true,
        }))
    }

    fn stop_graceful(&mut self) -> Result<(), DaemonError> {
        self.log.lock().graceful_stops += 1;
        if !self.ignores_graceful_stop {
            self.running = false;
        }
        Ok(())
    }

    fn stop_forceful(&mut self) -> Result<(), DaemonError> {
        self.log.lock().forceful_stops += 1;
        self.running = false;
        Ok(())
    }
}

struct SimulatedPwm {
    log: SharedSimulatedLog,
    connected: bool,
}

impl SimulatedPwm {
    fn record(&mut self, write: PwmWrite) -> Result<(), PwmError> {
        if !self.connected {
            return Err(PwmError::Disconnected);
        }
        trace!("[SimPwm] {:?}", write);
        self.log.lock().writes.push(write);
        Ok(())
    }
}

impl PwmChannel for SimulatedPwm {
    fn set_mode_output(&mut self, pin: u32) -> Result<(), PwmError> {
        self.record(PwmWrite::Mode { pin })
    }

    fn set_frequency(&mut self, pin: u32, hz: u32) -> Result<(), PwmError> {
        self.record(PwmWrite::Frequency { pin, hz })
    }

    fn set_range(&mut self, pin: u32, range: u32) -> Result<(), PwmError> {
        self.record(PwmWrite::Range { pin, range })
    }

    fn set_duty(&mut self, pin: u32, duty: u32) -> Result<(), PwmError> {
        self.record(PwmWrite::Duty { pin, duty })
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.log.lock().disconnects += 1;
        }
    }
}
