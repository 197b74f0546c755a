// Hardware boundary of the Ethernet DMA driver

pub mod interrupts;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

use crate::dma::DescriptorRing;
use crate::error::NetError;
use alloc::sync::Arc;
use bitflags::bitflags;

bitflags! {
    /// DMA interrupt status bits the driver cares about
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DmaInterrupt: u32 {
        /// A receive frame completed
        const RECEIVE = 1 << 0;
        /// The receive engine found no engine-owned descriptor and suspended
        const RECEIVE_BUFFER_UNAVAILABLE = 1 << 1;
        /// A transmit frame completed
        const TRANSMIT = 1 << 2;
        const NORMAL_SUMMARY = 1 << 16;
        const ABNORMAL_SUMMARY = 1 << 15;
    }
}

/// Trait for DMA-backed MAC controllers
///
/// The controller reads and writes engine-owned descriptors directly; this
/// trait only covers the register-level operations the driver issues. All
/// methods take `&self` because registers are shared with interrupt context.
pub trait DmaEngine: Send + Sync {
    /// Point the engine at the receive and transmit rings
    ///
    /// Called once from driver construction, before `start`.
    fn ring_init(
        &self,
        rx: &Arc<DescriptorRing>,
        tx: &Arc<DescriptorRing>,
    ) -> Result<(), NetError>;

    /// Program the station address filter
    fn set_mac_address(&self, mac: [u8; 6]);

    /// Enable MAC and DMA transmission and reception
    fn start(&self);

    /// Clear the buffer-unavailable condition and resume reception
    fn resume_reception(&self);

    /// Tell the engine new transmit descriptors are ready
    fn transmit_poll_demand(&self);

    /// Read the pending interrupt status
    fn interrupt_status(&self) -> DmaInterrupt;

    /// Clear the given interrupt status bits
    fn acknowledge(&self, status: DmaInterrupt);
}
