//! DMA descriptor and its ownership flag.
//!
//! # State Machine
//! ```text
//!     DRIVER_OWNED ──hand_to_engine()──> ENGINE_OWNED
//!          ▲                                  │
//!          └──────── engine_complete() ───────┘
//! ```
//!
//! INVARIANT: only the side named by the owner flag reads or writes the
//! buffer, status and length. Only the current owner flips the flag, so an
//! owner check followed by an access cannot race with the other side.

use crate::error::NetError;
use alloc::boxed::Box;
use alloc::vec;
use bitflags::bitflags;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Which side may touch a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Driver,
    Engine,
}

impl Owner {
    const fn bits(self) -> u8 {
        match self {
            Owner::Driver => 0,
            Owner::Engine => 1,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        if bits == 0 {
            Owner::Driver
        } else {
            Owner::Engine
        }
    }
}

bitflags! {
    /// Per-descriptor status written by whoever completes the descriptor
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DescriptorStatus: u32 {
        const FIRST_SEGMENT = 1 << 0;
        const LAST_SEGMENT = 1 << 1;
        const ERROR = 1 << 2;
        const MULTICAST = 1 << 3;
    }
}

/// One ring slot bound to a fixed buffer
pub struct Descriptor {
    owner: AtomicU8,
    status: AtomicU32,
    length: AtomicU32,
    capacity: usize,
    buffer: UnsafeCell<Box<[u8]>>,
}

// SAFETY: the buffer is only accessed by the owner named in `owner`, and
// ownership is transferred with release/acquire ordering.
unsafe impl Sync for Descriptor {}

impl Descriptor {
    pub(crate) fn new(buffer_size: usize, owner: Owner) -> Self {
        Self {
            owner: AtomicU8::new(owner.bits()),
            status: AtomicU32::new(0),
            length: AtomicU32::new(0),
            capacity: buffer_size,
            buffer: UnsafeCell::new(vec![0u8; buffer_size].into_boxed_slice()),
        }
    }

    pub fn owner(&self) -> Owner {
        Owner::from_bits(self.owner.load(Ordering::Acquire))
    }

    pub fn is_driver_owned(&self) -> bool {
        self.owner() == Owner::Driver
    }

    pub fn status(&self) -> DescriptorStatus {
        DescriptorStatus::from_bits_truncate(self.status.load(Ordering::Relaxed))
    }

    /// Bytes of valid data in this slot
    pub fn segment_length(&self) -> usize {
        self.length.load(Ordering::Relaxed) as usize
    }

    /// Fixed size of the bound buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn check_owner(&self, index: usize, expected: Owner) -> Result<(), NetError> {
        if self.owner() == expected {
            Ok(())
        } else {
            Err(NetError::NotOwned { index })
        }
    }

    /// Driver view of the valid bytes
    ///
    /// # Safety
    /// The caller must be the single driver-side user of this ring (the
    /// receive worker, or the holder of the transmit lock), and must not call
    /// [`hand_to_engine`](Self::hand_to_engine) while the slice is alive.
    pub(crate) unsafe fn driver_data(&self, index: usize) -> Result<&[u8], NetError> {
        self.check_owner(index, Owner::Driver)?;
        let buffer = &*self.buffer.get();
        Ok(&buffer[..self.segment_length().min(self.capacity)])
    }

    /// Driver view of the whole buffer for filling
    ///
    /// # Safety
    /// Same contract as [`driver_data`](Self::driver_data).
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn driver_buffer_mut(&self, index: usize) -> Result<&mut [u8], NetError> {
        self.check_owner(index, Owner::Driver)?;
        Ok(&mut **self.buffer.get())
    }

    /// Set status and length while driver owned
    pub(crate) fn driver_set(
        &self,
        index: usize,
        status: DescriptorStatus,
        length: usize,
    ) -> Result<(), NetError> {
        self.check_owner(index, Owner::Driver)?;
        self.status.store(status.bits(), Ordering::Relaxed);
        self.length.store(length as u32, Ordering::Relaxed);
        Ok(())
    }

    /// Give the slot to the engine
    ///
    /// The contents must be final: nothing writes to the slot again until the
    /// engine returns it.
    pub(crate) fn hand_to_engine(&self, index: usize) -> Result<(), NetError> {
        self.check_owner(index, Owner::Driver)?;
        self.owner.store(Owner::Engine.bits(), Ordering::Release);
        Ok(())
    }

    /// Engine view of the whole buffer
    ///
    /// # Safety
    /// The caller must be the engine bound to this ring, and must call
    /// [`engine_complete`](Self::engine_complete) only after the slice is gone.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn engine_buffer_mut(&self, index: usize) -> Result<&mut [u8], NetError> {
        self.check_owner(index, Owner::Engine)?;
        Ok(&mut **self.buffer.get())
    }

    /// Engine view of the bytes the driver queued for transmission
    ///
    /// # Safety
    /// Same contract as [`engine_buffer_mut`](Self::engine_buffer_mut).
    pub unsafe fn engine_data(&self, index: usize) -> Result<&[u8], NetError> {
        self.check_owner(index, Owner::Engine)?;
        let buffer = &*self.buffer.get();
        Ok(&buffer[..self.segment_length().min(self.capacity)])
    }

    /// Publish status and length, then return the slot to the driver
    pub fn engine_complete(
        &self,
        index: usize,
        status: DescriptorStatus,
        length: usize,
    ) -> Result<(), NetError> {
        self.check_owner(index, Owner::Engine)?;
        self.status.store(status.bits(), Ordering::Relaxed);
        self.length.store(length.min(self.capacity) as u32, Ordering::Relaxed);
        self.owner.store(Owner::Driver.bits(), Ordering::Release);
        Ok(())
    }

    /// Return the slot to the driver without touching status (transmit done)
    pub fn engine_release(&self, index: usize) -> Result<(), NetError> {
        self.check_owner(index, Owner::Engine)?;
        self.owner.store(Owner::Driver.bits(), Ordering::Release);
        Ok(())
    }
}

impl core::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Descriptor")
            .field("owner", &self.owner())
            .field("status", &self.status())
            .field("length", &self.segment_length())
            .field("capacity", &self.capacity())
            .finish()
    }
}
