//! Worker thread spawning for the three pipeline stages.
//!
//! Capture and perception run at normal priority. Control runs at the maximum OS priority
//! and may be pinned to one core, since it is the only stage with hard timing on the
//! actuators. Failing to raise priority or pin is logged and tolerated (no privileges on a
//! dev machine is the common case).

use std::{
    io,
    thread::{self, JoinHandle},
};

use core_affinity::{get_core_ids, set_for_current};
use log::{error, info, warn};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::component_a::{
    capture::{Capture, FrameSource},
    perception::{Perceiver, Perception},
};
use crate::component_b::{control_loop::ControlLoop, mission::MissionStage};

pub struct WorkerHandle<T> {
    name: &'static str,
    handle: JoinHandle<T>,
}

impl<T> WorkerHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread. A panic is logged and reported as `None`.
    pub fn join(self) -> Option<T> {
        match self.handle.join() {
            Ok(value) => {
                info!("[Main] {} thread joined", self.name);
                Some(value)
            }
            Err(_) => {
                error!("[Main] {} thread panicked", self.name);
                None
            }
        }
    }
}

pub fn spawn_capture<S: FrameSource + 'static>(mut capture: Capture<S>) -> io::Result<WorkerHandle<()>> {
    let handle = thread::Builder::new()
        .name("capture".into())
        .spawn(move || capture.run())?;
    Ok(WorkerHandle { name: "capture", handle })
}

pub fn spawn_perception<P: Perceiver + 'static>(
    mut perception: Perception<P>,
) -> io::Result<WorkerHandle<()>> {
    let handle = thread::Builder::new()
        .name("perception".into())
        .spawn(move || perception.run())?;
    Ok(WorkerHandle {
        name: "perception",
        handle,
    })
}

/// Spawn the control stage at max priority, optionally pinned to `core`.
pub fn spawn_control(
    mut control: ControlLoop,
    core: Option<usize>,
) -> io::Result<WorkerHandle<MissionStage>> {
    let handle = thread::Builder::new()
        .name("control".into())
        .spawn_with_priority(ThreadPriority::Max, move |priority| {
            if let Err(e) = priority {
                warn!("[Control] running without elevated priority: {:?}", e);
            }
            if let Some(index) = core {
                pin_current_thread(index);
            }
            control.run()
        })?;
    Ok(WorkerHandle { name: "control", handle })
}

/// Join the workers in pipeline order. `None` if any of them panicked; all are joined regardless.
pub fn join_in_order(
    capture: WorkerHandle<()>,
    perception: WorkerHandle<()>,
    control: WorkerHandle<MissionStage>,
) -> Option<MissionStage> {
    let capture_ok = capture.join().is_some();
    let perception_ok = perception.join().is_some();
    let stage = control.join();
    if capture_ok && perception_ok { stage } else { None }
}

fn pin_current_thread(index: usize) {
    let cores = get_core_ids().unwrap_or_default();
    match cores.get(index) {
        Some(&core) if set_for_current(core) => info!("[Control] pinned to core {}", index),
        Some(_) => warn!("[Control] failed to pin to core {}", index),
        None => warn!("[Control] core {} not available ({} cores)", index, cores.len()),
    }
}
