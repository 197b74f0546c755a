// Error types for the Ethernet interface driver

use thiserror::Error;

/// Driver-level errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("Descriptor {index} is not owned by the caller")]
    NotOwned { index: usize },

    #[error("Receive worker already taken")]
    WorkerTaken,

    #[error("Engine error: {0}")]
    Engine(&'static str),

    #[error("smoltcp error: {0}")]
    Smoltcp(&'static str),
}

/// Reasons a frame could not be handed to the transmit engine
///
/// Every variant means the frame was not sent; nothing is dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("Interface not started")]
    NotStarted,

    #[error("Frame is empty")]
    EmptyFrame,

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Timed out waiting for the transmit lock")]
    LockTimeout,

    #[error("No free transmit descriptors")]
    RingFull,
}
