// Interrupt handling for the Ethernet DMA engine
//
// Runs in interrupt context: reads and acknowledges status, posts the
// receive wakeup and latches buffer-unavailable. No descriptor or buffer
// access happens here.

use crate::drivers::{DmaEngine, DmaInterrupt};
use crate::stats::LinkStats;
use crate::sync::WakeupSignal;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

/// Hand-off point between the DMA interrupt and the receive worker
pub struct InterruptBridge {
    wakeup: WakeupSignal,
    buffer_unavailable: AtomicBool,
    stats: Arc<LinkStats>,
}

impl InterruptBridge {
    pub fn new(wakeup_capacity: usize, stats: Arc<LinkStats>) -> Self {
        Self {
            wakeup: WakeupSignal::new(wakeup_capacity),
            buffer_unavailable: AtomicBool::new(false),
            stats,
        }
    }

    /// DMA interrupt handler body
    ///
    /// Call this from the controller's interrupt vector. Returns the status
    /// that was observed.
    pub fn handle_interrupt<E: DmaEngine + ?Sized>(&self, engine: &E) -> DmaInterrupt {
        let status = engine.interrupt_status();

        if status.contains(DmaInterrupt::RECEIVE) {
            engine.acknowledge(DmaInterrupt::RECEIVE | DmaInterrupt::NORMAL_SUMMARY);
            self.on_receive_complete();
        }

        // The status bit stays set; the worker clears it on resume.
        if status.contains(DmaInterrupt::RECEIVE_BUFFER_UNAVAILABLE) {
            self.on_buffer_unavailable();
        }

        if status.contains(DmaInterrupt::TRANSMIT) {
            engine.acknowledge(DmaInterrupt::TRANSMIT | DmaInterrupt::NORMAL_SUMMARY);
        }

        status
    }

    /// A receive frame completed
    pub fn on_receive_complete(&self) {
        if !self.wakeup.post() {
            // The worker drains the whole ring per wakeup; no frame is lost.
            LinkStats::inc(&self.stats.wakeup_overflows);
        }
    }

    /// The receive engine ran out of descriptors
    pub fn on_buffer_unavailable(&self) {
        self.buffer_unavailable.store(true, Ordering::Release);
    }

    pub fn wakeup(&self) -> &WakeupSignal {
        &self.wakeup
    }

    pub fn is_buffer_unavailable(&self) -> bool {
        self.buffer_unavailable.load(Ordering::Acquire)
    }

    /// Clear the buffer-unavailable latch, returning whether it was set
    pub(crate) fn take_buffer_unavailable(&self) -> bool {
        self.buffer_unavailable.swap(false, Ordering::AcqRel)
    }
}

impl core::fmt::Debug for InterruptBridge {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterruptBridge")
            .field("wakeup", &self.wakeup)
            .field("buffer_unavailable", &self.is_buffer_unavailable())
            .finish()
    }
}
