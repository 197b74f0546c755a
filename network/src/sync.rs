// Bounded synchronization primitives for interrupt/task handoff
//
// Every wait here takes a timeout in ticks and a Clock; nothing waits forever.

use core::sync::atomic::{AtomicUsize, Ordering};
use shared::timer::{Clock, Deadline};
use spin::{Mutex, MutexGuard};

/// Result of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A post was consumed
    Signaled,
    /// The timeout elapsed with nothing posted
    TimedOut,
}

/// Capacity-bounded counting semaphore
///
/// `post` is safe from interrupt context: it never blocks and never
/// allocates. Posts beyond `capacity` are refused.
pub struct WakeupSignal {
    count: AtomicUsize,
    capacity: usize,
}

impl WakeupSignal {
    pub const fn new(capacity: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Outstanding posts
    pub fn pending(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Add one post; returns `false` if the signal is saturated
    pub fn post(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.capacity).then_some(current + 1)
            })
            .is_ok()
    }

    /// Consume one post without waiting
    pub fn try_take(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .is_ok()
    }

    /// Consume one post, waiting at most `timeout` ticks
    pub fn wait<C: Clock + ?Sized>(&self, timeout: u64, clock: &C) -> WaitOutcome {
        let deadline = Deadline::after(clock, timeout);
        loop {
            if self.try_take() {
                return WaitOutcome::Signaled;
            }
            if deadline.expired(clock) {
                return WaitOutcome::TimedOut;
            }
            clock.relax();
        }
    }
}

impl core::fmt::Debug for WakeupSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WakeupSignal")
            .field("pending", &self.pending())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Mutex whose acquire gives up after a bounded wait
pub struct TimedMutex<T> {
    inner: Mutex<T>,
}

impl<T> TimedMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Acquire the lock, or `None` once `timeout` ticks have passed
    pub fn lock_timeout<C: Clock + ?Sized>(
        &self,
        timeout: u64,
        clock: &C,
    ) -> Option<MutexGuard<'_, T>> {
        let deadline = Deadline::after(clock, timeout);
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return Some(guard);
            }
            if deadline.expired(clock) {
                return None;
            }
            clock.relax();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{StdClock, StepClock};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_post_saturates_at_capacity() {
        let signal = WakeupSignal::new(2);
        assert!(signal.post());
        assert!(signal.post());
        assert!(!signal.post());
        assert_eq!(signal.pending(), 2);
    }

    #[test]
    fn test_take_drains_count() {
        let signal = WakeupSignal::new(3);
        signal.post();
        signal.post();
        assert!(signal.try_take());
        assert!(signal.try_take());
        assert!(!signal.try_take());
    }

    #[test]
    fn test_wait_times_out() {
        let clock = StepClock::new();
        let signal = WakeupSignal::new(1);
        assert_eq!(signal.wait(5, &clock), WaitOutcome::TimedOut);
        assert!(clock.now() >= 5);
    }

    #[test]
    fn test_wait_returns_pending_post_immediately() {
        let clock = StepClock::new();
        let signal = WakeupSignal::new(1);
        signal.post();
        assert_eq!(signal.wait(0, &clock), WaitOutcome::Signaled);
        assert_eq!(clock.now(), 0);
    }

    #[test]
    fn test_post_from_another_thread_wakes_waiter() {
        let signal = Arc::new(WakeupSignal::new(4));
        let poster = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(5));
            poster.post();
        });
        assert_eq!(signal.wait(5_000, &StdClock::new()), WaitOutcome::Signaled);
        handle.join().unwrap();
    }

    #[test]
    fn test_lock_timeout_while_held() {
        let clock = StepClock::new();
        let mutex = TimedMutex::new(0u32);
        let guard = mutex.try_lock().unwrap();
        assert!(mutex.lock_timeout(10, &clock).is_none());
        drop(guard);
        assert!(mutex.lock_timeout(10, &clock).is_some());
    }
}
