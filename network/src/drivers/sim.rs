// Simulated MAC/DMA engine for host-side testing
//
// Plays the hardware side of both rings: fills engine-owned receive
// descriptors from injected frames, drains engine-owned transmit descriptors
// on poll demand, and keeps an interrupt status register.

use crate::dma::{DescriptorRing, DescriptorStatus};
use crate::drivers::{DmaEngine, DmaInterrupt};
use crate::error::NetError;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use log::warn;
use shared::timer::Clock;
use spin::Mutex;

/// Register-level operation observed by the simulated engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    RingInit,
    SetMacAddress([u8; 6]),
    Start,
    /// Reception resumed; records how many receive slots were armed at that moment
    Resume { engine_owned_rx: usize },
    TransmitPollDemand,
}

struct SimState {
    rx: Option<Arc<DescriptorRing>>,
    tx: Option<Arc<DescriptorRing>>,
    rx_next: usize,
    tx_next: usize,
    status: DmaInterrupt,
    mac: [u8; 6],
    started: bool,
    hold_tx: bool,
    partial_tx: Vec<u8>,
    sent: Vec<Vec<u8>>,
    events: Vec<EngineEvent>,
}

/// Software stand-in for a DMA Ethernet controller
pub struct SimulatedMac {
    state: Mutex<SimState>,
}

impl SimulatedMac {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                rx: None,
                tx: None,
                rx_next: 0,
                tx_next: 0,
                status: DmaInterrupt::empty(),
                mac: [0; 6],
                started: false,
                hold_tx: false,
                partial_tx: Vec::new(),
                sent: Vec::new(),
                events: Vec::new(),
            }),
        }
    }

    /// Receive a frame split into the given segments, one per descriptor
    ///
    /// If the ring lacks enough armed descriptors the frame is dropped and
    /// buffer-unavailable is raised, as the hardware does.
    pub fn inject_segments(
        &self,
        segments: &[&[u8]],
        error: bool,
        multicast: bool,
    ) -> Result<(), NetError> {
        let mut state = self.state.lock();
        let ring = state
            .rx
            .clone()
            .ok_or(NetError::Engine("receive ring not initialized"))?;
        if segments.is_empty() {
            return Err(NetError::Engine("frame has no segments"));
        }

        let available = (0..segments.len())
            .map(|offset| (state.rx_next + offset) % ring.len())
            .take_while(|&index| !ring.descriptor(index).is_driver_owned())
            .count();
        if available < segments.len() || segments.len() > ring.len() {
            state.status |= DmaInterrupt::RECEIVE_BUFFER_UNAVAILABLE | DmaInterrupt::ABNORMAL_SUMMARY;
            return Err(NetError::Engine("receive buffer unavailable"));
        }

        let last = segments.len() - 1;
        for (offset, segment) in segments.iter().enumerate() {
            let index = state.rx_next;
            let desc = ring.descriptor(index);

            let mut status = DescriptorStatus::empty();
            if offset == 0 {
                status |= DescriptorStatus::FIRST_SEGMENT;
            }
            if offset == last {
                status |= DescriptorStatus::LAST_SEGMENT;
                if error {
                    status |= DescriptorStatus::ERROR;
                }
            }
            if multicast {
                status |= DescriptorStatus::MULTICAST;
            }

            // SAFETY: this engine is the only one bound to the ring and the
            // slice is dropped before completion.
            let written = unsafe {
                let buffer = desc.engine_buffer_mut(index)?;
                let len = segment.len().min(buffer.len());
                buffer[..len].copy_from_slice(&segment[..len]);
                len
            };
            desc.engine_complete(index, status, written)?;
            state.rx_next = ring.next_index(index);
        }

        state.status |= DmaInterrupt::RECEIVE | DmaInterrupt::NORMAL_SUMMARY;
        Ok(())
    }

    /// Receive a frame, split at the ring's buffer size
    pub fn inject_frame(&self, frame: &[u8]) -> Result<(), NetError> {
        self.inject_chunked(frame, false)
    }

    /// Receive a frame whose last segment carries the error bit
    pub fn inject_error_frame(&self, frame: &[u8]) -> Result<(), NetError> {
        self.inject_chunked(frame, true)
    }

    fn inject_chunked(&self, frame: &[u8], error: bool) -> Result<(), NetError> {
        let buffer_size = self
            .state
            .lock()
            .rx
            .as_ref()
            .map(|ring| ring.buffer_size())
            .ok_or(NetError::Engine("receive ring not initialized"))?;
        let segments: Vec<&[u8]> = frame.chunks(buffer_size).collect();
        self.inject_segments(&segments, error, frame.first().is_some_and(|b| b & 1 == 1))
    }

    /// Set interrupt status bits
    pub fn raise(&self, status: DmaInterrupt) {
        self.state.lock().status |= status;
    }

    /// Keep transmit descriptors engine owned until [`release_tx`](Self::release_tx)
    pub fn hold_tx(&self) {
        self.state.lock().hold_tx = true;
    }

    /// Finish every queued transmit descriptor
    pub fn release_tx(&self) {
        let mut state = self.state.lock();
        state.hold_tx = false;
        Self::drain_tx(&mut state);
    }

    /// Frames the engine has put on the wire, oldest first
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.state.lock().events.clone()
    }

    pub fn mac_address(&self) -> [u8; 6] {
        self.state.lock().mac
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    fn drain_tx(state: &mut SimState) {
        let Some(ring) = state.tx.clone() else {
            return;
        };
        loop {
            let index = state.tx_next;
            let desc = ring.descriptor(index);
            if desc.is_driver_owned() {
                break;
            }

            let status = desc.status();
            if status.contains(DescriptorStatus::FIRST_SEGMENT) {
                state.partial_tx.clear();
            }
            // SAFETY: engine-owned slot, this engine is the only reader.
            if let Ok(data) = unsafe { desc.engine_data(index) } {
                state.partial_tx.extend_from_slice(data);
            }
            if status.contains(DescriptorStatus::LAST_SEGMENT) {
                let frame = core::mem::take(&mut state.partial_tx);
                state.sent.push(frame);
            }

            if let Err(err) = desc.engine_release(index) {
                warn!("sim: tx release failed: {}", err);
            }
            state.tx_next = ring.next_index(index);
        }
    }
}

impl Default for SimulatedMac {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaEngine for SimulatedMac {
    fn ring_init(
        &self,
        rx: &Arc<DescriptorRing>,
        tx: &Arc<DescriptorRing>,
    ) -> Result<(), NetError> {
        let mut state = self.state.lock();
        state.rx = Some(rx.clone());
        state.tx = Some(tx.clone());
        state.rx_next = rx.current();
        state.tx_next = tx.current();
        state.events.push(EngineEvent::RingInit);
        Ok(())
    }

    fn set_mac_address(&self, mac: [u8; 6]) {
        let mut state = self.state.lock();
        state.mac = mac;
        state.events.push(EngineEvent::SetMacAddress(mac));
    }

    fn start(&self) {
        let mut state = self.state.lock();
        state.started = true;
        state.events.push(EngineEvent::Start);
    }

    fn resume_reception(&self) {
        let mut state = self.state.lock();
        state.status.remove(DmaInterrupt::RECEIVE_BUFFER_UNAVAILABLE);
        let engine_owned_rx = state.rx.as_ref().map_or(0, |ring| ring.engine_owned_count());
        state.events.push(EngineEvent::Resume { engine_owned_rx });
    }

    fn transmit_poll_demand(&self) {
        let mut state = self.state.lock();
        state.events.push(EngineEvent::TransmitPollDemand);
        if !state.hold_tx {
            Self::drain_tx(&mut state);
        }
    }

    fn interrupt_status(&self) -> DmaInterrupt {
        self.state.lock().status
    }

    fn acknowledge(&self, status: DmaInterrupt) {
        self.state.lock().status.remove(status);
    }
}

/// Clock that advances one tick per `relax`, for deterministic timeouts
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct StepClock {
    now: Arc<AtomicU64>,
}

impl StepClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ticks: u64) {
        self.now.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl Clock for StepClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    fn relax(&self) {
        self.now.fetch_add(1, Ordering::Relaxed);
    }
}

/// Wall-clock milliseconds, yielding the thread between polls
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(test)]
impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(test)]
impl Clock for StdClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn relax(&self) {
        std::thread::yield_now();
    }
}
