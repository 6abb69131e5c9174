//! Runtime counters shared by the pipeline workers.
//!
//! Each worker updates its own fields; the supervisor logs a summary on shutdown.
//! Histories are bounded to the most recent `MAX_POINTS` samples.

use std::{collections::VecDeque, sync::Arc};

use log::info;
use parking_lot::Mutex;

#[derive(Debug, Default, Clone)]
pub struct Metrics {
    /// Capture stage
    pub frames_captured: u64,
    pub frames_skipped: u64,
    pub frames_dropped: u64,
    pub capture_misses: u64,

    /// Perception stage
    pub records_produced: u64,
    pub records_dropped: u64,

    /// Control stage
    pub control_cycles: u64,
    pub control_overruns: u64,
    pub cycle_us: VecDeque<u64>,
}

/// Component identifier for deadline miss attribution.
pub enum DeadlineComponent {
    Capture,
    Control,
}

impl Metrics {
    pub fn record_deadline_miss(&mut self, component: DeadlineComponent) {
        match component {
            DeadlineComponent::Capture => self.capture_misses += 1,
            DeadlineComponent::Control => self.control_overruns += 1,
        }
    }

    pub fn log_summary(&self) {
        info!(
            "[Metrics] frames captured={} skipped={} dropped={} late_ticks={}",
            self.frames_captured, self.frames_skipped, self.frames_dropped, self.capture_misses
        );
        info!(
            "[Metrics] records produced={} dropped={}",
            self.records_produced, self.records_dropped
        );
        info!(
            "[Metrics] control cycles={} overruns={}",
            self.control_cycles, self.control_overruns
        );
        if let Some(stats) = calculate_stats_u64(&self.cycle_us) {
            info!(
                "[Metrics] control cycle work us: min={:.0} max={:.0} mean={:.1} (n={})",
                stats.min, stats.max, stats.mean, stats.count
            );
        }
    }
}

pub type SharedMetrics = Arc<Mutex<Metrics>>;

pub fn shared_metrics() -> SharedMetrics {
    Arc::new(Mutex::new(Metrics::default()))
}

pub const MAX_POINTS: usize = 1_000;

/// Appends value to a history buffer; removes oldest if at capacity.
#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[derive(Debug, Clone)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().map(|&x| x as f64).fold(f64::INFINITY, f64::min);
    let max = data.iter().map(|&x| x as f64).fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().map(|&x| x as f64).sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}
