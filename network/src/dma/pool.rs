//! Scratch buffer pool for reassembled frames.
//!
//! The receive worker allocates from the pool; the stack (or the dispatch
//! code, on drop or rejection) frees into it. Buffers are created once and
//! recycled; a [`PacketBuf`] returns its storage to the free list when dropped.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use spin::Mutex;

struct PoolShared {
    free: Mutex<Vec<Box<[u8]>>>,
    buffer_size: usize,
    total: usize,
}

/// Fixed set of equally sized reassembly buffers
#[derive(Clone)]
pub struct PacketPool {
    shared: Arc<PoolShared>,
}

impl PacketPool {
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let free = (0..count)
            .map(|_| vec![0u8; buffer_size].into_boxed_slice())
            .collect();
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(free),
                buffer_size,
                total: count,
            }),
        }
    }

    /// Take a buffer holding `len` bytes
    ///
    /// Returns `None` if `len` exceeds the buffer size or the pool is exhausted.
    pub fn alloc(&self, len: usize) -> Option<PacketBuf> {
        if len > self.shared.buffer_size {
            return None;
        }
        let storage = self.shared.free.lock().pop()?;
        Some(PacketBuf {
            storage: Some(storage),
            len,
            pool: self.shared.clone(),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    pub fn capacity(&self) -> usize {
        self.shared.total
    }

    pub fn available(&self) -> usize {
        self.shared.free.lock().len()
    }
}

impl core::fmt::Debug for PacketPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketPool")
            .field("buffer_size", &self.shared.buffer_size)
            .field("capacity", &self.shared.total)
            .field("available", &self.available())
            .finish()
    }
}

/// A frame-sized view of one pool buffer
pub struct PacketBuf {
    storage: Option<Box<[u8]>>,
    len: usize,
    pool: Arc<PoolShared>,
}

impl PacketBuf {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shrink the valid region
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }
}

impl Deref for PacketBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.storage {
            Some(storage) => &storage[..self.len],
            None => &[],
        }
    }
}

impl DerefMut for PacketBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Some(storage) => &mut storage[..self.len],
            None => &mut [],
        }
    }
}

impl Drop for PacketBuf {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.free.lock().push(storage);
        }
    }
}

impl core::fmt::Debug for PacketBuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketBuf").field("len", &self.len).finish()
    }
}
