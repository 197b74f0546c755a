#![cfg_attr(not(test), no_std)]

// Ethernet DMA driver for the field node
// Descriptor rings, interrupt bridging, frame reassembly, transmit path and
// the smoltcp glue on top.

#[macro_use]
extern crate alloc;

pub mod adapter;
pub mod config;
pub mod dma;
pub mod drivers;
pub mod error;
pub mod netif;
pub mod rx;
pub mod stack;
pub mod stats;
pub mod sync;
pub mod tx;

// Re-export commonly used types
pub use adapter::{Dispatch, Rejected, StackInput, UpperLayer};
pub use config::{DriverConfig, InterfaceConfig, InterfaceFlags, NetifId};
pub use dma::{DescriptorRing, FrameInfo, PacketBuf, PacketPool};
pub use drivers::interrupts::InterruptBridge;
pub use drivers::{DmaEngine, DmaInterrupt};
pub use error::{NetError, TxError};
pub use netif::EthernetIf;
pub use rx::ReceiveWorker;
pub use stack::{EthernetDevice, NetworkStack, StackQueue};
pub use stats::{LinkStats, LinkStatsSnapshot};
pub use sync::{TimedMutex, WaitOutcome, WakeupSignal};
pub use tx::TransmitPath;
