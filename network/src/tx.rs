//! Transmit path.
//!
//! Callers from any thread copy their (possibly chained) frame into the
//! transmit ring under a lock with a bounded acquire. A frame larger than one
//! slot occupies consecutive slots; ownership goes to the engine last slot
//! first, so the engine never sees a chain whose head is ready before its tail.

use crate::dma::{DescriptorRing, DescriptorStatus};
use crate::drivers::DmaEngine;
use crate::error::{NetError, TxError};
use crate::stats::LinkStats;
use crate::sync::TimedMutex;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use log::{debug, trace, warn};
use shared::timer::Clock;

/// Serialized access to the transmit ring
pub struct TransmitPath<E: DmaEngine, C: Clock> {
    ring: TimedMutex<Arc<DescriptorRing>>,
    engine: Arc<E>,
    clock: C,
    lock_timeout: u64,
    max_frame_len: AtomicUsize,
    started: AtomicBool,
    stats: Arc<LinkStats>,
}

impl<E: DmaEngine, C: Clock> TransmitPath<E, C> {
    pub(crate) fn new(
        ring: Arc<DescriptorRing>,
        engine: Arc<E>,
        clock: C,
        lock_timeout: u64,
        max_frame_len: usize,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            ring: TimedMutex::new(ring),
            engine,
            clock,
            lock_timeout,
            max_frame_len: AtomicUsize::new(max_frame_len),
            started: AtomicBool::new(false),
            stats,
        }
    }

    pub(crate) fn set_max_frame_len(&self, len: usize) {
        self.max_frame_len.store(len, Ordering::Relaxed);
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Largest frame accepted, header included
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len.load(Ordering::Relaxed)
    }

    /// Send one frame given as a chain of segments
    ///
    /// The segments are concatenated in order into the ring. On any error
    /// nothing was handed to the engine.
    pub fn transmit(&self, segments: &[&[u8]]) -> Result<(), TxError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(TxError::NotStarted);
        }

        let len: usize = segments.iter().map(|s| s.len()).sum();
        if len == 0 {
            return Err(TxError::EmptyFrame);
        }
        let max = self.max_frame_len();
        if len > max {
            LinkStats::inc(&self.stats.tx_too_large);
            return Err(TxError::FrameTooLarge { len, max });
        }

        let Some(ring) = self.ring.lock_timeout(self.lock_timeout, &self.clock) else {
            warn!("tx: lock not acquired within {} ticks, {} byte frame not sent", self.lock_timeout, len);
            LinkStats::inc(&self.stats.tx_lock_timeouts);
            return Err(TxError::LockTimeout);
        };

        let slots = len.div_ceil(ring.buffer_size());
        if slots > ring.len() {
            LinkStats::inc(&self.stats.tx_too_large);
            return Err(TxError::FrameTooLarge {
                len,
                max: ring.len() * ring.buffer_size(),
            });
        }

        let first = ring.current();
        let free = (0..slots)
            .map(|offset| ring.descriptor(first + offset))
            .take_while(|desc| desc.is_driver_owned())
            .count();
        if free < slots {
            debug!("tx: {} of {} slots free, engine still busy", free, slots);
            LinkStats::inc(&self.stats.tx_ring_full);
            return Err(TxError::RingFull);
        }

        if let Err(err) = Self::fill(&ring, first, slots, segments) {
            // Slots were checked under the lock and only the engine can take
            // them away by being handed them, so this is a driver bug.
            warn!("tx: {}", err);
            return Err(TxError::RingFull);
        }

        for offset in (0..slots).rev() {
            let index = (first + offset) % ring.len();
            if ring.hand_to_engine(index).is_err() {
                warn!("tx: slot {} changed owner while filling", index);
                return Err(TxError::RingFull);
            }
        }
        ring.advance_by(slots);
        self.engine.transmit_poll_demand();
        drop(ring);

        trace!("tx: {} bytes in {} slot(s) from slot {}", len, slots, first);
        LinkStats::inc(&self.stats.tx_frames);
        LinkStats::add(&self.stats.tx_bytes, len as u64);
        Ok(())
    }

    /// Send one contiguous frame
    pub fn transmit_frame(&self, frame: &[u8]) -> Result<(), TxError> {
        self.transmit(&[frame])
    }

    /// Copy the segment chain into `slots` consecutive slots from `first`
    fn fill(
        ring: &DescriptorRing,
        first: usize,
        slots: usize,
        segments: &[&[u8]],
    ) -> Result<(), NetError> {
        let mut pending = segments.iter().copied().filter(|s| !s.is_empty());
        let mut current: &[u8] = pending.next().unwrap_or(&[]);

        for offset in 0..slots {
            let index = (first + offset) % ring.len();
            let desc = ring.descriptor(index);

            // SAFETY: caller holds the transmit lock, so this is the only
            // driver-side user, and the slice dies before hand-off.
            let buffer = unsafe { desc.driver_buffer_mut(index)? };
            let mut written = 0;
            while written < buffer.len() {
                if current.is_empty() {
                    match pending.next() {
                        Some(next) => current = next,
                        None => break,
                    }
                }
                let n = current.len().min(buffer.len() - written);
                buffer[written..written + n].copy_from_slice(&current[..n]);
                written += n;
                current = &current[n..];
            }

            let mut status = DescriptorStatus::empty();
            if offset == 0 {
                status |= DescriptorStatus::FIRST_SEGMENT;
            }
            if offset == slots - 1 {
                status |= DescriptorStatus::LAST_SEGMENT;
            }
            desc.driver_set(index, status, written)?;
        }
        Ok(())
    }
}
