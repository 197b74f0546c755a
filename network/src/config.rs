//! Driver and interface configuration
//!
//! [`DriverConfig`] sizes the rings and pools and bounds every wait;
//! [`InterfaceConfig`] is what the stack sees at bring-up (MAC, MTU, flags).
//!
//! # Example
//!
//! ```ignore
//! let config = DriverConfig::new()
//!     .with_rx_slots(8)
//!     .with_tx_lock_timeout(100);
//! ```

use crate::error::NetError;
use bitflags::bitflags;

/// Largest frame the MAC accepts, header and FCS included
pub const ETH_MAX_PACKET_SIZE: usize = 1524;
/// Ethernet II header length
pub const ETH_HEADER_LEN: usize = 14;
/// Default IP MTU
pub const DEFAULT_MTU: u16 = 1500;

bitflags! {
    /// Interface capability flags reported to the stack
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterfaceFlags: u8 {
        const BROADCAST = 1 << 0;
        const ETHARP = 1 << 1;
        const LINK_UP = 1 << 2;
        /// The MAC inserts IP/TCP/UDP/ICMP checksums on transmit
        const CHECKSUM_OFFLOAD = 1 << 3;
    }
}

/// Identifies one interface instance to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NetifId(pub u8);

/// Ring, pool and timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub rx_slots: usize,
    pub tx_slots: usize,
    pub rx_buffer_size: usize,
    pub tx_buffer_size: usize,
    /// Reassembly buffers shared by the receive worker and the stack
    pub scratch_buffers: usize,
    pub scratch_buffer_size: usize,
    /// Outstanding wakeups the interrupt bridge can queue; `None` means one per receive slot
    pub wakeup_capacity: Option<usize>,
    /// Receive worker wait bound in ticks
    pub rx_wait_timeout: u64,
    /// Transmit lock acquire bound in ticks
    pub tx_lock_timeout: u64,
    /// Forward PPPoE discovery and session frames
    pub accept_pppoe: bool,
}

impl DriverConfig {
    pub const fn new() -> Self {
        Self {
            rx_slots: 4,
            tx_slots: 4,
            rx_buffer_size: ETH_MAX_PACKET_SIZE,
            tx_buffer_size: ETH_MAX_PACKET_SIZE,
            scratch_buffers: 8,
            scratch_buffer_size: ETH_MAX_PACKET_SIZE,
            wakeup_capacity: None,
            rx_wait_timeout: 100,
            tx_lock_timeout: 250,
            accept_pppoe: false,
        }
    }

    pub const fn with_rx_slots(mut self, slots: usize) -> Self {
        self.rx_slots = slots;
        self
    }

    pub const fn with_tx_slots(mut self, slots: usize) -> Self {
        self.tx_slots = slots;
        self
    }

    pub const fn with_rx_buffer_size(mut self, size: usize) -> Self {
        self.rx_buffer_size = size;
        self
    }

    pub const fn with_tx_buffer_size(mut self, size: usize) -> Self {
        self.tx_buffer_size = size;
        self
    }

    pub const fn with_scratch_buffers(mut self, count: usize, size: usize) -> Self {
        self.scratch_buffers = count;
        self.scratch_buffer_size = size;
        self
    }

    pub const fn with_wakeup_capacity(mut self, capacity: usize) -> Self {
        self.wakeup_capacity = Some(capacity);
        self
    }

    pub const fn with_rx_wait_timeout(mut self, ticks: u64) -> Self {
        self.rx_wait_timeout = ticks;
        self
    }

    pub const fn with_tx_lock_timeout(mut self, ticks: u64) -> Self {
        self.tx_lock_timeout = ticks;
        self
    }

    pub const fn with_pppoe(mut self, accept: bool) -> Self {
        self.accept_pppoe = accept;
        self
    }

    /// Effective wakeup capacity
    pub fn wakeup_capacity(&self) -> usize {
        self.wakeup_capacity.unwrap_or(self.rx_slots)
    }

    /// Bytes the transmit ring can carry in one frame
    pub fn tx_capacity(&self) -> usize {
        self.tx_slots * self.tx_buffer_size
    }

    /// Check the configuration for values the driver cannot run with
    pub fn validate(&self) -> Result<(), NetError> {
        if self.rx_slots < 2 {
            return Err(NetError::InvalidConfig("receive ring needs at least 2 slots"));
        }
        if self.tx_slots == 0 {
            return Err(NetError::InvalidConfig("transmit ring needs at least 1 slot"));
        }
        if self.rx_buffer_size == 0 || self.tx_buffer_size == 0 {
            return Err(NetError::InvalidConfig("descriptor buffers must not be empty"));
        }
        if self.scratch_buffers == 0 {
            return Err(NetError::InvalidConfig("scratch pool must not be empty"));
        }
        if self.scratch_buffer_size < ETH_HEADER_LEN {
            return Err(NetError::InvalidConfig("scratch buffers cannot hold a header"));
        }
        if self.wakeup_capacity() == 0 {
            return Err(NetError::InvalidConfig("wakeup capacity must be non-zero"));
        }
        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters the stack configures once at interface bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub id: NetifId,
    pub name: [u8; 2],
    pub mac: [u8; 6],
    pub mtu: u16,
    pub flags: InterfaceFlags,
}

impl InterfaceConfig {
    /// Largest Ethernet frame this interface sends (MTU plus header)
    pub fn max_frame_len(&self) -> usize {
        self.mtu as usize + ETH_HEADER_LEN
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            id: NetifId(0),
            name: *b"st",
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            mtu: DEFAULT_MTU,
            flags: InterfaceFlags::BROADCAST | InterfaceFlags::ETHARP | InterfaceFlags::LINK_UP,
        }
    }
}
