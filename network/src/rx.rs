//! Receive worker.
//!
//! The only consumer of the receive ring. Each wakeup drains every completed
//! segment chain in ring order: copy into a scratch buffer, re-arm every slot
//! of the chain, resume reception if the engine had stalled, then dispatch.

use crate::adapter::{StackInput, UpperLayer};
use crate::dma::{DescriptorRing, DescriptorStatus, FrameInfo, PacketBuf, PacketPool};
use crate::drivers::interrupts::InterruptBridge;
use crate::drivers::DmaEngine;
use crate::stats::LinkStats;
use crate::sync::WaitOutcome;
use alloc::sync::Arc;
use log::{debug, trace, warn};
use shared::timer::Clock;

/// Single consumer of the receive ring
pub struct ReceiveWorker<E: DmaEngine, C: Clock, S: StackInput> {
    ring: Arc<DescriptorRing>,
    engine: Arc<E>,
    bridge: Arc<InterruptBridge>,
    pool: PacketPool,
    upper: UpperLayer<S>,
    clock: C,
    wait_timeout: u64,
    stats: Arc<LinkStats>,
}

impl<E: DmaEngine, C: Clock, S: StackInput> ReceiveWorker<E, C, S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ring: Arc<DescriptorRing>,
        engine: Arc<E>,
        bridge: Arc<InterruptBridge>,
        pool: PacketPool,
        upper: UpperLayer<S>,
        clock: C,
        wait_timeout: u64,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            ring,
            engine,
            bridge,
            pool,
            upper,
            clock,
            wait_timeout,
            stats,
        }
    }

    /// Task body; never returns
    pub fn run(mut self) -> ! {
        loop {
            self.poll();
        }
    }

    /// Wait once for a wakeup and drain the ring if one arrived
    ///
    /// Returns the number of segment chains consumed. A timeout is not an
    /// error; it returns 0 unless reception is stalled, in which case the
    /// ring is drained and reception resumed.
    pub fn poll(&mut self) -> usize {
        match self.bridge.wakeup().wait(self.wait_timeout, &self.clock) {
            WaitOutcome::Signaled => self.drain(),
            // A stall latched with no frame interrupt behind it still needs a resume.
            WaitOutcome::TimedOut if self.bridge.is_buffer_unavailable() => self.drain(),
            WaitOutcome::TimedOut => {
                trace!("rx: idle");
                0
            }
        }
    }

    /// Consume every completed chain at the cursor
    pub fn drain(&mut self) -> usize {
        let mut frames = 0;
        while let Some(info) = self.ring.frame_ready() {
            frames += 1;
            if let Some(packet) = self.receive(info) {
                self.upper.dispatch(packet);
            }
        }
        // Covers a stall latched after the last chain was reclaimed.
        self.resume_if_unavailable();
        frames
    }

    /// Copy out, reclaim and resume for one chain; returns the frame if it
    /// should go upstream
    fn receive(&mut self, info: FrameInfo) -> Option<PacketBuf> {
        let packet = if info.error {
            debug!(
                "rx: error frame in slots {}..={} ({} segments), dropped",
                info.first_segment, info.last_segment, info.segment_count
            );
            LinkStats::inc(&self.stats.rx_errors);
            None
        } else {
            self.copy_out(&info)
        };

        self.reclaim(&info);
        self.resume_if_unavailable();

        if packet.is_some() {
            trace!(
                "rx: {} bytes from {} segment(s) at slot {}",
                info.total_length,
                info.segment_count,
                info.first_segment
            );
            LinkStats::inc(&self.stats.rx_frames);
            LinkStats::add(&self.stats.rx_bytes, info.total_length as u64);
            if info.multicast {
                LinkStats::inc(&self.stats.rx_multicast);
            }
        }
        packet
    }

    /// Reassemble the chain into one contiguous scratch buffer
    fn copy_out(&self, info: &FrameInfo) -> Option<PacketBuf> {
        let Some(mut packet) = self.pool.alloc(info.total_length) else {
            debug!("rx: no scratch buffer for {} byte frame, dropped", info.total_length);
            LinkStats::inc(&self.stats.rx_no_buffer);
            return None;
        };

        let mut offset = 0;
        for index in info.indices(self.ring.len()) {
            // SAFETY: the worker is the only driver-side user of the receive
            // ring and the slice is gone before the slot is re-armed.
            let segment = match unsafe { self.ring.descriptor(index).driver_data(index) } {
                Ok(segment) => segment,
                Err(err) => {
                    warn!("rx: {}", err);
                    LinkStats::inc(&self.stats.rx_errors);
                    return None;
                }
            };
            let end = offset + segment.len();
            if end > packet.len() {
                warn!("rx: segment lengths exceed frame length at slot {}", index);
                LinkStats::inc(&self.stats.rx_errors);
                return None;
            }
            packet[offset..end].copy_from_slice(segment);
            offset = end;
        }
        packet.truncate(offset);
        Some(packet)
    }

    /// Return every slot of the chain to the engine and move the cursor past it
    fn reclaim(&self, info: &FrameInfo) {
        for index in info.indices(self.ring.len()) {
            let desc = self.ring.descriptor(index);
            let rearmed = desc
                .driver_set(index, DescriptorStatus::empty(), 0)
                .and_then(|()| self.ring.hand_to_engine(index));
            if let Err(err) = rearmed {
                warn!("rx: reclaim failed: {}", err);
            }
            self.ring.advance();
        }
    }

    fn resume_if_unavailable(&self) {
        if self.bridge.take_buffer_unavailable() {
            debug!("rx: resuming reception, {} slots armed", self.ring.engine_owned_count());
            LinkStats::inc(&self.stats.rx_resumes);
            self.engine.resume_reception();
        }
    }

    pub fn ring(&self) -> &DescriptorRing {
        &self.ring
    }

    pub fn pool(&self) -> &PacketPool {
        &self.pool
    }

    pub fn stack(&self) -> &S {
        self.upper.stack()
    }

    pub fn stack_mut(&mut self) -> &mut S {
        self.upper.stack_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Rejected;
    use crate::config::NetifId;
    use crate::dma::{Direction, Owner};
    use crate::drivers::sim::{EngineEvent, SimulatedMac, StepClock};
    use crate::drivers::DmaInterrupt;
    use std::vec::Vec;

    #[derive(Default)]
    struct Capture {
        frames: Vec<Vec<u8>>,
    }

    impl StackInput for Capture {
        fn deliver(&mut self, frame: PacketBuf, _netif: NetifId) -> Result<(), Rejected> {
            self.frames.push(frame.to_vec());
            Ok(())
        }
    }

    struct Rig {
        worker: ReceiveWorker<SimulatedMac, StepClock, Capture>,
        mac: Arc<SimulatedMac>,
        bridge: Arc<InterruptBridge>,
        ring: Arc<DescriptorRing>,
    }

    fn rig(slots: usize, buffer_size: usize, scratch: usize) -> Rig {
        let stats = Arc::new(LinkStats::new());
        let ring = Arc::new(DescriptorRing::new(Direction::Receive, slots, buffer_size).unwrap());
        let tx = Arc::new(DescriptorRing::new(Direction::Transmit, 1, buffer_size).unwrap());
        let mac = Arc::new(SimulatedMac::new());
        mac.ring_init(&ring, &tx).unwrap();
        let bridge = Arc::new(InterruptBridge::new(slots, stats.clone()));
        let upper = UpperLayer::new(Capture::default(), NetifId(0), false, stats.clone());
        let worker = ReceiveWorker::new(
            ring.clone(),
            mac.clone(),
            bridge.clone(),
            PacketPool::new(scratch, 1524),
            upper,
            StepClock::new(),
            5,
            stats,
        );
        Rig {
            worker,
            mac,
            bridge,
            ring,
        }
    }

    /// IPv4 frame of `len` bytes with a recognizable body
    fn ipv4_frame(len: usize, fill: u8) -> Vec<u8> {
        let mut frame = vec![fill; len];
        frame[..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 1]);
        frame[12] = 0x08;
        frame[13] = 0x00;
        frame
    }

    #[test]
    fn test_three_segment_reassembly() {
        let mut rig = rig(4, 64, 2);
        let first = vec![0xAA; 64];
        let second = vec![0xBB; 64];
        let third = vec![0xCC; 20];
        rig.mac
            .inject_segments(&[&first, &second, &third], false, false)
            .unwrap();

        let info = rig.ring.frame_ready().unwrap();
        assert_eq!(info.segment_count, 3);
        let packet = rig.worker.receive(info).unwrap();

        let mut expected = first.clone();
        expected.extend_from_slice(&second);
        expected.extend_from_slice(&third);
        assert_eq!(packet.len(), 148);
        assert_eq!(&packet[..], &expected[..]);
        assert_eq!(rig.ring.owners(), vec![Owner::Engine; 4]);
        assert_eq!(rig.ring.current(), 3);
    }

    #[test]
    fn test_multi_segment_frame_delivered_once() {
        let mut rig = rig(4, 64, 2);
        let frame = ipv4_frame(148, 0x5A);
        let segments: Vec<&[u8]> = frame.chunks(64).collect();
        rig.mac.inject_segments(&segments, false, false).unwrap();
        rig.bridge.handle_interrupt(&*rig.mac);

        assert_eq!(rig.worker.poll(), 1);
        assert_eq!(rig.worker.stack().frames, vec![frame]);
        assert_eq!(rig.ring.engine_owned_count(), 4);
    }

    #[test]
    fn test_no_descriptor_leak_over_many_frames() {
        let mut rig = rig(4, 64, 4);
        for round in 0..25u8 {
            let len = 20 + (round as usize * 13) % 180;
            let frame = ipv4_frame(len, round);
            if round % 3 == 0 {
                rig.mac.inject_error_frame(&frame).unwrap();
            } else {
                rig.mac.inject_frame(&frame).unwrap();
            }
            rig.bridge.handle_interrupt(&*rig.mac);
            assert_eq!(rig.worker.poll(), 1);
            assert_eq!(rig.ring.engine_owned_count(), 4, "round {}", round);
        }
        assert_eq!(rig.worker.stack().frames.len(), 16);
        assert_eq!(rig.worker.pool().available(), 4);
    }

    #[test]
    fn test_error_frame_never_delivered() {
        let mut rig = rig(4, 64, 2);
        rig.mac.inject_error_frame(&ipv4_frame(100, 0x11)).unwrap();
        rig.mac.inject_frame(&ipv4_frame(60, 0x22)).unwrap();
        rig.bridge.handle_interrupt(&*rig.mac);

        assert_eq!(rig.worker.poll(), 2);
        assert_eq!(rig.worker.stack().frames, vec![ipv4_frame(60, 0x22)]);
        assert_eq!(rig.ring.engine_owned_count(), 4);
        assert_eq!(rig.worker.stats.snapshot().rx_errors, 1);
    }

    #[test]
    fn test_slot_lost_mid_chain_counted_and_reclaimed() {
        let mut rig = rig(4, 64, 2);
        let frame = ipv4_frame(100, 0x77);
        rig.mac.inject_frame(&frame).unwrap();

        let info = rig.ring.frame_ready().unwrap();
        assert_eq!(info.segment_count, 2);
        // second slot goes back to the engine before the copy
        rig.ring.hand_to_engine(1).unwrap();

        assert!(rig.worker.receive(info).is_none());
        assert_eq!(rig.worker.stats.snapshot().rx_errors, 1);
        assert_eq!(rig.worker.stats.snapshot().rx_frames, 0);
        assert_eq!(rig.ring.engine_owned_count(), 4);
        assert_eq!(rig.ring.current(), 2);
        assert_eq!(rig.worker.pool().available(), 2);
    }

    #[test]
    fn test_frames_delivered_in_ring_order() {
        let mut rig = rig(8, 64, 8);
        for fill in 1..=5u8 {
            rig.mac.inject_frame(&ipv4_frame(40, fill)).unwrap();
            rig.bridge.handle_interrupt(&*rig.mac);
        }
        assert_eq!(rig.worker.poll(), 5);
        let fills: Vec<u8> = rig.worker.stack().frames.iter().map(|f| f[20]).collect();
        assert_eq!(fills, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_timeout_is_not_an_error() {
        let mut rig = rig(4, 64, 2);
        assert_eq!(rig.worker.poll(), 0);
        assert_eq!(rig.ring.engine_owned_count(), 4);
    }

    #[test]
    fn test_resume_after_reclaim() {
        let mut rig = rig(4, 64, 4);
        rig.mac.inject_frame(&ipv4_frame(200, 0x33)).unwrap();
        // every slot now holds the first frame; the next one stalls the engine
        assert!(rig.mac.inject_frame(&ipv4_frame(40, 0x44)).is_err());
        rig.bridge.handle_interrupt(&*rig.mac);
        assert!(rig.bridge.is_buffer_unavailable());

        assert_eq!(rig.worker.poll(), 1);

        let resumes: Vec<EngineEvent> = rig
            .mac
            .events()
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::Resume { .. }))
            .collect();
        assert_eq!(resumes, vec![EngineEvent::Resume { engine_owned_rx: 4 }]);
        assert!(!rig.bridge.is_buffer_unavailable());
        assert!(!rig
            .mac
            .interrupt_status()
            .contains(DmaInterrupt::RECEIVE_BUFFER_UNAVAILABLE));

        // reception works again
        rig.mac.inject_frame(&ipv4_frame(40, 0x44)).unwrap();
        rig.bridge.handle_interrupt(&*rig.mac);
        assert_eq!(rig.worker.poll(), 1);
        assert_eq!(rig.worker.stack().frames.len(), 2);
    }

    #[test]
    fn test_stall_without_frame_interrupt_resumed_on_timeout() {
        let mut rig = rig(4, 64, 4);
        rig.mac.raise(DmaInterrupt::RECEIVE_BUFFER_UNAVAILABLE);
        rig.bridge.handle_interrupt(&*rig.mac);

        assert_eq!(rig.worker.poll(), 0);
        assert_eq!(
            rig.mac.events().last(),
            Some(&EngineEvent::Resume { engine_owned_rx: 4 })
        );
        assert!(!rig.bridge.is_buffer_unavailable());
    }

    #[test]
    fn test_scratch_exhaustion_drops_but_reclaims() {
        let mut rig = rig(4, 64, 1);
        let held = rig.worker.pool().alloc(10).unwrap();
        rig.mac.inject_frame(&ipv4_frame(100, 0x66)).unwrap();
        rig.bridge.handle_interrupt(&*rig.mac);

        assert_eq!(rig.worker.poll(), 1);
        assert!(rig.worker.stack().frames.is_empty());
        assert_eq!(rig.ring.engine_owned_count(), 4);
        assert_eq!(rig.worker.stats.snapshot().rx_no_buffer, 1);
        drop(held);
    }
}
