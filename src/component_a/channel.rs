//! channel.rs
//! Fixed-capacity FIFO between two pipeline stages.
//!
//! - `push` never blocks: a full channel drops the new item and counts it (freshness over completeness)
//! - `pop_wait` parks the single consumer until an item arrives or shutdown is requested
//! - storage is a lock-free `ArrayQueue`; the mutex/condvar pair only exists for wake-ups

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crossbeam_queue::ArrayQueue;
use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::component_a::shutdown::{ShutdownSignal, Wake};

pub struct BoundedChannel<T> {
    name: &'static str,
    queue: ArrayQueue<T>,
    lock: Mutex<()>,
    ready: Condvar,
    dropped: AtomicU64,
}

impl<T: Send> BoundedChannel<T> {
    /// Create a channel and register it with `shutdown` so blocked consumers are released.
    ///
    /// `capacity` must be non-zero (enforced by config validation).
    pub fn new(name: &'static str, capacity: usize, shutdown: &ShutdownSignal) -> Arc<Self>
    where
        T: 'static,
    {
        let channel = Arc::new(Self {
            name,
            queue: ArrayQueue::new(capacity),
            lock: Mutex::new(()),
            ready: Condvar::new(),
            dropped: AtomicU64::new(0),
        });
        shutdown.register(channel.clone());
        channel
    }

    /// Enqueue `item` if there is room and wake the consumer. Returns `false` when dropped.
    pub fn push(&self, item: T) -> bool {
        match self.queue.push(item) {
            Ok(()) => {
                // Notify under the lock so a consumer between its empty check and its wait
                // cannot miss the signal.
                let _guard = self.lock.lock();
                self.ready.notify_one();
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("[{}] full, dropped newest item", self.name);
                false
            }
        }
    }

    /// Block until the oldest item is available. `None` means shutting down.
    pub fn pop_wait(&self, shutdown: &ShutdownSignal) -> Option<T> {
        let mut guard = self.lock.lock();
        loop {
            if shutdown.is_triggered() {
                return None;
            }
            if let Some(item) = self.queue.pop() {
                return Some(item);
            }
            self.ready.wait(&mut guard);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Items rejected because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Send> Wake for BoundedChannel<T> {
    fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn overflow_drops_newest_and_keeps_order() {
        let shutdown = ShutdownSignal::new();
        let channel = BoundedChannel::new("test", 5, &shutdown);

        for i in 0..8 {
            let accepted = channel.push(i);
            assert_eq!(accepted, i < 5);
            assert!(channel.len() <= channel.capacity());
        }
        assert_eq!(channel.dropped(), 3);

        let drained: Vec<i32> = (0..5).filter_map(|_| channel.pop_wait(&shutdown)).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(channel.is_empty());
    }

    #[test]
    fn space_frees_up_after_pop() {
        let shutdown = ShutdownSignal::new();
        let channel = BoundedChannel::new("test", 2, &shutdown);
        assert!(channel.push(1));
        assert!(channel.push(2));
        assert!(!channel.push(3));
        assert_eq!(channel.pop_wait(&shutdown), Some(1));
        assert!(channel.push(4));
        assert_eq!(channel.pop_wait(&shutdown), Some(2));
        assert_eq!(channel.pop_wait(&shutdown), Some(4));
    }

    #[test]
    fn blocked_consumer_receives_later_push() {
        let shutdown = ShutdownSignal::new();
        let channel = BoundedChannel::new("test", 5, &shutdown);

        let consumer = {
            let channel = channel.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || channel.pop_wait(&shutdown))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(channel.push(42u32));
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn shutdown_releases_blocked_consumer() {
        let shutdown = ShutdownSignal::new();
        let channel: Arc<BoundedChannel<u8>> = BoundedChannel::new("test", 5, &shutdown);

        let consumer = {
            let channel = channel.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || channel.pop_wait(&shutdown))
        };

        thread::sleep(Duration::from_millis(50));
        shutdown.trigger();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn fast_producer_never_exceeds_capacity() {
        let shutdown = ShutdownSignal::new();
        let channel = BoundedChannel::new("test", 5, &shutdown);

        let producer = {
            let channel = channel.clone();
            thread::spawn(move || {
                for i in 0..10_000u32 {
                    channel.push(i);
                    assert!(channel.len() <= 5);
                }
            })
        };

        let mut last = None;
        let mut received = 0u64;
        while !producer.is_finished() || !channel.is_empty() {
            if channel.is_empty() {
                thread::yield_now();
                continue;
            }
            if let Some(item) = channel.pop_wait(&shutdown) {
                if let Some(prev) = last {
                    assert!(item > prev, "retained items must stay in order");
                }
                last = Some(item);
                received += 1;
            }
        }
        producer.join().unwrap();
        assert_eq!(received + channel.dropped(), 10_000);
    }
}
