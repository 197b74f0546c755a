//! DMA descriptor rings and buffer management.

pub mod descriptor;
pub mod pool;
pub mod ring;

pub use descriptor::{Descriptor, DescriptorStatus, Owner};
pub use pool::{PacketBuf, PacketPool};
pub use ring::{DescriptorRing, Direction, FrameInfo};
