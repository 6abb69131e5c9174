//! Per-cycle control trace written as CSV.
//!
//! One row per control cycle, flushed every `FLUSH_EVERY` rows and on drop, so a crash
//! loses at most a few cycles of history.

use std::{
    fs::{File, create_dir_all},
    io::BufWriter,
    path::Path,
};

use csv::Writer;
use log::{info, warn};
use serde::Serialize;

use crate::component_b::mission::CycleCommand;

const FLUSH_EVERY: usize = 30;

#[derive(Debug, Serialize)]
pub struct CycleRow {
    pub cycle: u64,
    pub stage: &'static str,
    pub lateral_offset: f64,
    pub error: f64,
    pub servo_angle: f64,
    pub motor: i32,
    pub work_us: u64,
}

impl CycleRow {
    pub fn new(cycle: u64, lateral_offset: f64, command: &CycleCommand, work_us: u64) -> Self {
        Self {
            cycle,
            stage: command.stage.as_str(),
            lateral_offset,
            error: command.error,
            servo_angle: command.servo_angle,
            motor: command.motor,
            work_us,
        }
    }
}

pub struct TelemetryWriter {
    wtr: Writer<BufWriter<File>>,
    pending: usize,
}

impl TelemetryWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir_all(dir)?;
        }
        let file = File::create(path)?;
        info!("[Telemetry] writing control trace to {}", path.display());
        Ok(Self {
            wtr: Writer::from_writer(BufWriter::new(file)),
            pending: 0,
        })
    }

    /// Append a row. Failures are logged and the row is lost; the control loop never stalls on disk.
    pub fn record(&mut self, row: &CycleRow) {
        if let Err(e) = self.wtr.serialize(row) {
            warn!("[Telemetry] failed to write cycle {}: {}", row.cycle, e);
            return;
        }
        self.pending += 1;
        if self.pending >= FLUSH_EVERY {
            self.flush();
        }
    }

    pub fn flush(&mut self) {
        if let Err(e) = self.wtr.flush() {
            warn!("[Telemetry] flush failed: {}", e);
        }
        self.pending = 0;
    }
}

impl Drop for TelemetryWriter {
    fn drop(&mut self) {
        self.flush();
    }
}
