//! capture.rs
//! Camera acquisition stage with periodic releases.
//! - Real-time scheduling: SpinSleeper keeps the capture rate (~30 Hz) on absolute deadlines
//! - Empty or unreadable frames are skipped, never forwarded
//! - Frames go into the Frame Channel with drop-when-full backpressure

use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::component_a::{channel::BoundedChannel, shutdown::ShutdownSignal};
use crate::utils::metrics::{DeadlineComponent, SharedMetrics};

/// Opaque image handle. The control core never looks at the pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub captured_at: Instant,
    pub data: Arc<[u8]>,
}

impl Frame {
    pub fn new(seq: u64, captured_at: Instant, data: Vec<u8>) -> Self {
        Self {
            seq,
            captured_at,
            data: data.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Anything that yields raw frames: a camera device, a video file, a test double.
pub trait FrameSource: Send {
    /// `Ok(None)` means no frame was ready this tick.
    fn grab(&mut self) -> io::Result<Option<Frame>>;
}

pub struct Capture<S: FrameSource> {
    source: S,
    period: Duration,
    frames: Arc<BoundedChannel<Frame>>,
    shutdown: Arc<ShutdownSignal>,
    metrics: SharedMetrics,
}

impl<S: FrameSource> Capture<S> {
    pub fn new(
        source: S,
        period: Duration,
        frames: Arc<BoundedChannel<Frame>>,
        shutdown: Arc<ShutdownSignal>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            source,
            period,
            frames,
            shutdown,
            metrics,
        }
    }

    /// Main capture loop: grab, forward, then wait for the next scheduled release.
    pub fn run(&mut self) {
        info!("[Capture] started period={:?}", self.period);

        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_deadline = Instant::now() + self.period;

        while !self.shutdown.is_triggered() {
            self.capture_once();

            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
                next_deadline += self.period;
            } else {
                // Woke up late; restart the schedule instead of bursting to catch up.
                self.metrics.lock().record_deadline_miss(DeadlineComponent::Capture);
                next_deadline = now + self.period;
            }
        }

        info!("[Capture] stopped");
    }

    fn capture_once(&mut self) {
        let frame = match self.source.grab() {
            Ok(Some(frame)) if !frame.is_empty() => frame,
            Ok(_) => {
                self.metrics.lock().frames_skipped += 1;
                return;
            }
            Err(e) => {
                warn!("[Capture] frame grab failed: {}", e);
                self.metrics.lock().frames_skipped += 1;
                return;
            }
        };

        let seq = frame.seq;
        let sent = self.frames.push(frame);

        let mut m = self.metrics.lock();
        m.frames_captured += 1;
        if !sent {
            m.frames_dropped += 1;
            debug!("[Capture] frame channel full, dropped frame {}", seq);
        }
    }
}

/// Stand-in camera producing small placeholder frames, for dry runs without a device.
pub struct SyntheticCamera {
    seq: u64,
    frame_bytes: usize,
}

impl SyntheticCamera {
    pub fn new(frame_bytes: usize) -> Self {
        Self { seq: 0, frame_bytes }
    }
}

impl FrameSource for SyntheticCamera {
    fn grab(&mut self) -> io::Result<Option<Frame>> {
        self.seq += 1;
        Ok(Some(Frame::new(
            self.seq,
            Instant::now(),
            vec![0u8; self.frame_bytes],
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::metrics::shared_metrics;
    use std::{collections::VecDeque, thread};

    /// Replays a fixed list of grab outcomes, then keeps returning nothing.
    struct ScriptedSource(VecDeque<io::Result<Option<Frame>>>);

    impl FrameSource for ScriptedSource {
        fn grab(&mut self) -> io::Result<Option<Frame>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    #[test]
    fn empty_and_failed_frames_are_skipped() {
        let shutdown = ShutdownSignal::new();
        let frames = BoundedChannel::new("frames", 5, &shutdown);
        let metrics = shared_metrics();

        let script = VecDeque::from(vec![
            Ok(Some(Frame::new(1, Instant::now(), vec![7]))),
            Ok(Some(Frame::new(2, Instant::now(), Vec::new()))),
            Err(io::Error::other("device busy")),
            Ok(Some(Frame::new(4, Instant::now(), vec![9]))),
        ]);

        let worker = {
            let mut capture = Capture::new(
                ScriptedSource(script),
                Duration::from_millis(1),
                frames.clone(),
                shutdown.clone(),
                metrics.clone(),
            );
            thread::spawn(move || capture.run())
        };

        let first = frames.pop_wait(&shutdown).unwrap();
        let second = frames.pop_wait(&shutdown).unwrap();
        shutdown.trigger();
        worker.join().unwrap();

        assert_eq!((first.seq, second.seq), (1, 4));
        let m = metrics.lock();
        assert_eq!(m.frames_captured, 2);
        assert!(m.frames_skipped >= 2);
    }

    #[test]
    fn synthetic_camera_numbers_frames() {
        let mut camera = SyntheticCamera::new(16);
        let a = camera.grab().unwrap().unwrap();
        let b = camera.grab().unwrap().unwrap();
        assert_eq!((a.seq, b.seq), (1, 2));
        assert_eq!(a.data.len(), 16);
    }
}
