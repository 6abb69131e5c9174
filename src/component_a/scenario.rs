//! scenario.rs
//! Seeded synthetic perceiver that walks through the whole mission script.
//!
//! Used for dry runs and soak tests: the lane estimate wanders with noise while the scene
//! events (start cleared, crossing, cones, decision, stop marking) arrive on a fixed
//! frame timeline. Same seed, same stream.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::component_a::{
    capture::Frame,
    perception::{Decision, PerceptionRecord, Perceiver},
};

/// Frame indices (perceive calls) at which scene events happen.
#[derive(Debug, Clone)]
pub struct ScenarioTimeline {
    pub start_cleared_at: u64,
    pub crossing: (u64, u64),
    pub cones: (u64, u64),
    /// Frames each cone stays on one side before the next one appears.
    pub cone_period: u64,
    pub decision_at: u64,
    pub stop_markings: [u64; 2],
}

impl Default for ScenarioTimeline {
    fn default() -> Self {
        Self {
            start_cleared_at: 30,
            crossing: (60, 75),
            cones: (90, 200),
            cone_period: 35,
            decision_at: 185,
            stop_markings: [260, 275],
        }
    }
}

pub struct SyntheticScenario {
    rng: StdRng,
    timeline: ScenarioTimeline,
    frame_index: u64,
    decision: Decision,
    noise_px: f64,
}

impl SyntheticScenario {
    pub fn new(seed: u64) -> Self {
        Self::with_timeline(seed, ScenarioTimeline::default())
    }

    pub fn with_timeline(seed: u64, timeline: ScenarioTimeline) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let decision = if rng.random_bool(0.5) { Decision::A } else { Decision::B };
        Self {
            rng,
            timeline,
            frame_index: 0,
            decision,
            noise_px: 3.0,
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    fn within(&self, (from, to): (u64, u64)) -> bool {
        (from..to).contains(&self.frame_index)
    }
}

impl Perceiver for SyntheticScenario {
    fn perceive(&mut self, _frame: &Frame) -> PerceptionRecord {
        let n = self.frame_index;
        let t = &self.timeline;

        let drift = (n as f64 / 40.0).sin() * 8.0;
        let noise = self.rng.random_range(-self.noise_px..self.noise_px);

        let marker_cone_position = if self.within(t.cones) {
            let cone = (n - t.cones.0) / t.cone_period.max(1);
            Some(if cone % 2 == 0 { 110 } else { 210 })
        } else {
            None
        };

        let record = PerceptionRecord {
            lateral_offset: drift + noise,
            marker_cone_position,
            start_marker_cleared: n >= t.start_cleared_at,
            ground_marking_crossed: self.within(t.crossing),
            decision_result: (n >= t.decision_at).then_some(self.decision),
            stop_marking_count: t.stop_markings.iter().filter(|&&at| n >= at).count() as u32,
        };

        self.frame_index += 1;
        record
    }
}
