//! shutdown.rs
//! Process-wide shutdown signal shared by every worker.
//!
//! Write-once: `trigger()` flips the flag and wakes every registered blocking wait.
//! Readers poll `is_triggered()` without taking any lock.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use log::info;

/// Something that parks threads and must release them on shutdown.
pub trait Wake: Send + Sync {
    fn wake_all(&self);
}

pub struct ShutdownSignal {
    flag: AtomicBool,
    waiters: Mutex<Vec<Weak<dyn Wake>>>,
}

pub type SharedShutdown = Arc<ShutdownSignal>;

impl ShutdownSignal {
    pub fn new() -> SharedShutdown {
        Arc::new(Self {
            flag: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Set the flag and release all registered waits. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if self.flag.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("[Shutdown] shutdown requested, waking blocked workers");

        let waiters = self.waiters.lock();
        for waiter in waiters.iter().filter_map(Weak::upgrade) {
            waiter.wake_all();
        }
    }

    /// Register a blocking wait. If shutdown already happened it is woken immediately.
    pub fn register(&self, waiter: Arc<dyn Wake>) {
        let mut waiters = self.waiters.lock();
        waiters.retain(|w| w.strong_count() > 0);
        waiters.push(Arc::downgrade(&waiter));
        drop(waiters);

        if self.is_triggered() {
            waiter.wake_all();
        }
    }
}
