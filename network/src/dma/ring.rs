//! Descriptor rings.
//!
//! A ring is an arena of descriptors addressed by index; the successor of
//! slot `i` is slot `(i + 1) % len`. Each ring has one cursor naming the slot
//! the driver inspects (receive) or fills (transmit) next.

use super::descriptor::{Descriptor, DescriptorStatus, Owner};
use crate::error::NetError;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Data direction of a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Transmit,
}

/// A completed segment chain on the receive ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub first_segment: usize,
    pub last_segment: usize,
    pub segment_count: usize,
    pub total_length: usize,
    pub error: bool,
    pub multicast: bool,
}

impl FrameInfo {
    /// Descriptor indices of the chain, in ring order
    pub fn indices(&self, ring_len: usize) -> impl Iterator<Item = usize> {
        let first = self.first_segment;
        (0..self.segment_count).map(move |offset| (first + offset) % ring_len)
    }
}

/// Fixed-capacity circular list of descriptors
pub struct DescriptorRing {
    direction: Direction,
    descriptors: Box<[Descriptor]>,
    buffer_size: usize,
    cursor: AtomicUsize,
}

impl DescriptorRing {
    /// Allocate `slot_count` descriptors with `buffer_size` byte buffers
    ///
    /// Receive slots start engine owned (armed for reception), transmit
    /// slots start driver owned (ready to fill).
    pub fn new(direction: Direction, slot_count: usize, buffer_size: usize) -> Result<Self, NetError> {
        if slot_count == 0 {
            return Err(NetError::InvalidConfig("ring needs at least one slot"));
        }
        if buffer_size == 0 {
            return Err(NetError::InvalidConfig("ring buffers must not be empty"));
        }

        let owner = match direction {
            Direction::Receive => Owner::Engine,
            Direction::Transmit => Owner::Driver,
        };
        let descriptors: Vec<Descriptor> = (0..slot_count)
            .map(|_| Descriptor::new(buffer_size, owner))
            .collect();

        Ok(Self {
            direction,
            descriptors: descriptors.into_boxed_slice(),
            buffer_size,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Descriptor at `index` (modulo the ring length)
    pub fn descriptor(&self, index: usize) -> &Descriptor {
        &self.descriptors[index % self.len()]
    }

    /// Successor of `index` in ring order
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.len()
    }

    /// Slot the driver handles next
    pub fn current(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Return the slot under the cursor and move the cursor past it
    ///
    /// Only the single driver-side user of the ring may advance it, and only
    /// over slots it owns for its role.
    pub(crate) fn advance(&self) -> usize {
        let index = self.current();
        self.cursor.store(self.next_index(index), Ordering::Relaxed);
        index
    }

    /// Move the cursor forward by `count` slots
    pub(crate) fn advance_by(&self, count: usize) {
        let index = (self.current() + count) % self.len();
        self.cursor.store(index, Ordering::Relaxed);
    }

    /// Transfer one slot to the engine
    pub fn hand_to_engine(&self, index: usize) -> Result<(), NetError> {
        self.descriptor(index).hand_to_engine(index % self.len())
    }

    /// Ownership of every slot, in index order
    pub fn owners(&self) -> Vec<Owner> {
        self.descriptors.iter().map(Descriptor::owner).collect()
    }

    pub fn engine_owned_count(&self) -> usize {
        self.descriptors.iter().filter(|d| !d.is_driver_owned()).count()
    }

    pub fn driver_owned_count(&self) -> usize {
        self.len() - self.engine_owned_count()
    }

    /// Next completed segment chain starting at the cursor
    ///
    /// Walks driver-owned slots from the cursor until one carries
    /// `LAST_SEGMENT`. Returns `None` while the chain is still being filled.
    /// Chains that can never complete are reported with `error` set so
    /// their slots get reclaimed: a chain that does not start with
    /// `FIRST_SEGMENT`, one cut short by a new `FIRST_SEGMENT`, and one that
    /// covers the whole ring without ending.
    pub fn frame_ready(&self) -> Option<FrameInfo> {
        let len = self.len();
        let first = self.current();
        let mut info = FrameInfo {
            first_segment: first,
            last_segment: first,
            segment_count: 0,
            total_length: 0,
            error: false,
            multicast: false,
        };

        for offset in 0..len {
            let index = (first + offset) % len;
            let desc = &self.descriptors[index];
            if !desc.is_driver_owned() {
                return None;
            }

            let status = desc.status();
            if status.contains(DescriptorStatus::FIRST_SEGMENT) {
                if offset > 0 {
                    // truncated chain: report what came before this slot
                    info.error = true;
                    return Some(info);
                }
            } else if offset == 0 {
                info.error = true;
            }

            info.last_segment = index;
            info.segment_count += 1;
            info.total_length += desc.segment_length();
            info.error |= status.contains(DescriptorStatus::ERROR);
            info.multicast |= status.contains(DescriptorStatus::MULTICAST);

            if status.contains(DescriptorStatus::LAST_SEGMENT) {
                return Some(info);
            }
        }

        info.error = true;
        Some(info)
    }
}

impl core::fmt::Debug for DescriptorRing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DescriptorRing")
            .field("direction", &self.direction)
            .field("len", &self.len())
            .field("buffer_size", &self.buffer_size)
            .field("cursor", &self.current())
            .field("engine_owned", &self.engine_owned_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(ring: &DescriptorRing, index: usize, status: DescriptorStatus, len: usize) {
        ring.descriptor(index).engine_complete(index, status, len).unwrap();
    }

    #[test]
    fn test_initial_ownership() {
        let rx = DescriptorRing::new(Direction::Receive, 4, 64).unwrap();
        assert_eq!(rx.engine_owned_count(), 4);
        let tx = DescriptorRing::new(Direction::Transmit, 4, 64).unwrap();
        assert_eq!(tx.driver_owned_count(), 4);
        assert_eq!(tx.owners(), vec![Owner::Driver; 4]);
    }

    #[test]
    fn test_rejects_empty_ring() {
        assert!(DescriptorRing::new(Direction::Receive, 0, 64).is_err());
        assert!(DescriptorRing::new(Direction::Transmit, 2, 0).is_err());
    }

    #[test]
    fn test_cursor_wraps() {
        let ring = DescriptorRing::new(Direction::Transmit, 3, 8).unwrap();
        assert_eq!(ring.advance(), 0);
        assert_eq!(ring.advance(), 1);
        assert_eq!(ring.advance(), 2);
        assert_eq!(ring.current(), 0);
        ring.advance_by(5);
        assert_eq!(ring.current(), 2);
    }

    #[test]
    fn test_frame_ready_waits_for_engine() {
        let ring = DescriptorRing::new(Direction::Receive, 4, 64).unwrap();
        assert_eq!(ring.frame_ready(), None);

        // first segment done, rest still with the engine
        complete(&ring, 0, DescriptorStatus::FIRST_SEGMENT, 64);
        assert_eq!(ring.frame_ready(), None);
    }

    #[test]
    fn test_frame_ready_multi_segment() {
        let ring = DescriptorRing::new(Direction::Receive, 4, 64).unwrap();
        complete(&ring, 0, DescriptorStatus::FIRST_SEGMENT, 64);
        complete(&ring, 1, DescriptorStatus::empty(), 64);
        complete(&ring, 2, DescriptorStatus::LAST_SEGMENT | DescriptorStatus::MULTICAST, 20);

        let info = ring.frame_ready().unwrap();
        assert_eq!(info.first_segment, 0);
        assert_eq!(info.last_segment, 2);
        assert_eq!(info.segment_count, 3);
        assert_eq!(info.total_length, 148);
        assert!(!info.error);
        assert!(info.multicast);
        assert_eq!(info.indices(ring.len()).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_frame_ready_wraps_around() {
        let ring = DescriptorRing::new(Direction::Receive, 4, 64).unwrap();
        ring.advance_by(3);
        complete(&ring, 3, DescriptorStatus::FIRST_SEGMENT, 64);
        complete(&ring, 0, DescriptorStatus::LAST_SEGMENT, 10);

        let info = ring.frame_ready().unwrap();
        assert_eq!(info.indices(ring.len()).collect::<Vec<_>>(), vec![3, 0]);
        assert_eq!(info.total_length, 74);
    }

    #[test]
    fn test_error_bit_on_any_segment() {
        let ring = DescriptorRing::new(Direction::Receive, 4, 64).unwrap();
        complete(&ring, 0, DescriptorStatus::FIRST_SEGMENT | DescriptorStatus::ERROR, 64);
        complete(&ring, 1, DescriptorStatus::LAST_SEGMENT, 5);
        assert!(ring.frame_ready().unwrap().error);
    }

    #[test]
    fn test_orphan_segment_is_an_error_frame() {
        let ring = DescriptorRing::new(Direction::Receive, 4, 64).unwrap();
        complete(&ring, 0, DescriptorStatus::LAST_SEGMENT, 30);
        let info = ring.frame_ready().unwrap();
        assert!(info.error);
        assert_eq!(info.segment_count, 1);
    }

    #[test]
    fn test_truncated_chain_is_an_error_frame() {
        let ring = DescriptorRing::new(Direction::Receive, 4, 64).unwrap();
        complete(&ring, 0, DescriptorStatus::FIRST_SEGMENT, 64);
        complete(&ring, 1, DescriptorStatus::FIRST_SEGMENT | DescriptorStatus::LAST_SEGMENT, 40);

        let info = ring.frame_ready().unwrap();
        assert!(info.error);
        assert_eq!(info.segment_count, 1);
        assert_eq!(info.last_segment, 0);
    }

    #[test]
    fn test_unterminated_full_ring_is_an_error_frame() {
        let ring = DescriptorRing::new(Direction::Receive, 3, 16).unwrap();
        complete(&ring, 0, DescriptorStatus::FIRST_SEGMENT, 16);
        complete(&ring, 1, DescriptorStatus::empty(), 16);
        complete(&ring, 2, DescriptorStatus::empty(), 16);

        let info = ring.frame_ready().unwrap();
        assert!(info.error);
        assert_eq!(info.segment_count, 3);
    }
}
