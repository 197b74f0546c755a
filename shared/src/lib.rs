#![no_std]

// Shared crate for the field node firmware
// Time base and utilities shared by the driver and the application crates

pub mod crc;
pub mod timer;

pub use crc::{crc32, Crc32};
pub use timer::{Clock, Deadline, SysTickClock};
