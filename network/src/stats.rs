// Link statistics
//
// Counters are relaxed atomics: they are bumped from the receive worker,
// transmit callers and interrupt context and only read for diagnostics.

use core::sync::atomic::{AtomicU64, Ordering};

/// Link-level counters for one interface
#[derive(Debug, Default)]
pub struct LinkStats {
    pub rx_frames: AtomicU64,
    pub rx_bytes: AtomicU64,
    pub rx_errors: AtomicU64,
    pub rx_multicast: AtomicU64,
    /// Frames dropped because no scratch buffer was free
    pub rx_no_buffer: AtomicU64,
    pub rx_unknown_type: AtomicU64,
    pub rx_rejected: AtomicU64,
    pub rx_resumes: AtomicU64,
    pub tx_frames: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub tx_lock_timeouts: AtomicU64,
    pub tx_ring_full: AtomicU64,
    pub tx_too_large: AtomicU64,
    pub wakeup_overflows: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    pub rx_frames: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub rx_multicast: u64,
    pub rx_no_buffer: u64,
    pub rx_unknown_type: u64,
    pub rx_rejected: u64,
    pub rx_resumes: u64,
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub tx_lock_timeouts: u64,
    pub tx_ring_full: u64,
    pub tx_too_large: u64,
    pub wakeup_overflows: u64,
}

impl LinkStats {
    pub const fn new() -> Self {
        Self {
            rx_frames: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
            rx_errors: AtomicU64::new(0),
            rx_multicast: AtomicU64::new(0),
            rx_no_buffer: AtomicU64::new(0),
            rx_unknown_type: AtomicU64::new(0),
            rx_rejected: AtomicU64::new(0),
            rx_resumes: AtomicU64::new(0),
            tx_frames: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
            tx_lock_timeouts: AtomicU64::new(0),
            tx_ring_full: AtomicU64::new(0),
            tx_too_large: AtomicU64::new(0),
            wakeup_overflows: AtomicU64::new(0),
        }
    }

    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        LinkStatsSnapshot {
            rx_frames: read(&self.rx_frames),
            rx_bytes: read(&self.rx_bytes),
            rx_errors: read(&self.rx_errors),
            rx_multicast: read(&self.rx_multicast),
            rx_no_buffer: read(&self.rx_no_buffer),
            rx_unknown_type: read(&self.rx_unknown_type),
            rx_rejected: read(&self.rx_rejected),
            rx_resumes: read(&self.rx_resumes),
            tx_frames: read(&self.tx_frames),
            tx_bytes: read(&self.tx_bytes),
            tx_lock_timeouts: read(&self.tx_lock_timeouts),
            tx_ring_full: read(&self.tx_ring_full),
            tx_too_large: read(&self.tx_too_large),
            wakeup_overflows: read(&self.wakeup_overflows),
        }
    }
}
