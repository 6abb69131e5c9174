//! perception.rs
//! Perception stage: turns each frame into one `PerceptionRecord`.
//!
//! The feature extraction itself lives behind the `Perceiver` trait; this module only
//! owns the worker loop (Frame Channel → perceiver → Result Channel).
//! A field whose condition is not met means "not detected", never an error.

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::component_a::{
    capture::Frame,
    channel::BoundedChannel,
    shutdown::ShutdownSignal,
};
use crate::utils::metrics::SharedMetrics;

/// Outcome of the binary visual decision task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    A,
    B,
}

/// Features extracted from one frame. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerceptionRecord {
    /// Signed pixel offset of the lane midpoint from image center.
    pub lateral_offset: f64,
    /// Horizontal pixel position of a visible obstacle marker.
    pub marker_cone_position: Option<i32>,
    pub start_marker_cleared: bool,
    /// True while the crossing marking is in view.
    pub ground_marking_crossed: bool,
    pub decision_result: Option<Decision>,
    /// Debounced cumulative count of stop-marking detections.
    pub stop_marking_count: u32,
}

/// Feature extractor invoked once per frame.
pub trait Perceiver: Send {
    fn perceive(&mut self, frame: &Frame) -> PerceptionRecord;
}

pub struct Perception<P: Perceiver> {
    perceiver: P,
    frames: Arc<BoundedChannel<Frame>>,
    results: Arc<BoundedChannel<PerceptionRecord>>,
    shutdown: Arc<ShutdownSignal>,
    metrics: SharedMetrics,
}

impl<P: Perceiver> Perception<P> {
    pub fn new(
        perceiver: P,
        frames: Arc<BoundedChannel<Frame>>,
        results: Arc<BoundedChannel<PerceptionRecord>>,
        shutdown: Arc<ShutdownSignal>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            perceiver,
            frames,
            results,
            shutdown,
            metrics,
        }
    }

    /// Consume frames until shutdown. Exactly one record is pushed per processed frame.
    pub fn run(&mut self) {
        info!("[Perception] started");

        while let Some(frame) = self.frames.pop_wait(&self.shutdown) {
            let record = self.perceiver.perceive(&frame);
            let accepted = self.results.push(record);

            let mut m = self.metrics.lock();
            m.records_produced += 1;
            if !accepted {
                m.records_dropped += 1;
                debug!("[Perception] result channel full, dropped record for frame {}", frame.seq);
            }
        }

        info!("[Perception] stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component_a::shutdown::ShutdownSignal;
    use crate::utils::metrics::shared_metrics;
    use std::{thread, time::Instant};

    /// Reports the frame sequence number as the lateral offset.
    struct EchoPerceiver;

    impl Perceiver for EchoPerceiver {
        fn perceive(&mut self, frame: &Frame) -> PerceptionRecord {
            PerceptionRecord {
                lateral_offset: frame.seq as f64,
                ..Default::default()
            }
        }
    }

    #[test]
    fn one_record_per_frame_in_order() {
        let shutdown = ShutdownSignal::new();
        let frames = BoundedChannel::new("frames", 5, &shutdown);
        let results = BoundedChannel::new("results", 5, &shutdown);
        let metrics = shared_metrics();

        for seq in 1..=3 {
            frames.push(Frame::new(seq, Instant::now(), vec![1, 2, 3]));
        }

        let worker = {
            let mut stage = Perception::new(
                EchoPerceiver,
                frames.clone(),
                results.clone(),
                shutdown.clone(),
                metrics.clone(),
            );
            thread::spawn(move || stage.run())
        };

        let offsets: Vec<f64> = (0..3)
            .filter_map(|_| results.pop_wait(&shutdown))
            .map(|r| r.lateral_offset)
            .collect();
        assert_eq!(offsets, vec![1.0, 2.0, 3.0]);

        shutdown.trigger();
        worker.join().unwrap();
        assert_eq!(metrics.lock().records_produced, 3);
    }

    #[test]
    fn records_deserialize_from_csv_with_absent_fields() {
        let data = "lateral_offset,marker_cone_position,start_marker_cleared,ground_marking_crossed,decision_result,stop_marking_count\n\
                    -4.5,,true,false,,0\n\
                    1.0,210,true,true,A,2\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let records: Vec<PerceptionRecord> =
            reader.deserialize().collect::<Result<_, _>>().unwrap();

        assert_eq!(records[0].marker_cone_position, None);
        assert_eq!(records[0].decision_result, None);
        assert!(records[0].start_marker_cleared);
        assert_eq!(records[1].marker_cone_position, Some(210));
        assert_eq!(records[1].decision_result, Some(Decision::A));
        assert_eq!(records[1].stop_marking_count, 2);
    }
}
