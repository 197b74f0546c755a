// SysTick time base for the field node
// Provides the global tick counter and the bounded-wait clock used by the drivers

use core::sync::atomic::{AtomicU64, Ordering};

/// Global tick counter
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Tick frequency in Hz
static TICK_RATE_HZ: AtomicU64 = AtomicU64::new(DEFAULT_TICK_RATE_HZ);

/// Default SysTick rate (1 tick = 1 ms)
pub const DEFAULT_TICK_RATE_HZ: u64 = 1000;

/// Set the tick frequency
///
/// Must be called before the scheduler starts; changing the rate while
/// deadlines are outstanding stretches or shrinks them.
pub fn set_tick_rate(frequency_hz: u64) {
    TICK_RATE_HZ.store(frequency_hz.max(1), Ordering::Relaxed);
}

/// Get the tick frequency in Hz
pub fn get_tick_rate() -> u64 {
    TICK_RATE_HZ.load(Ordering::Relaxed)
}

/// Get the current tick count
///
/// The tick count increments on each SysTick interrupt.
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Increment the tick counter
///
/// This is called by the SysTick handler.
pub fn increment_ticks() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Convert ticks to milliseconds at the current tick rate
pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks.saturating_mul(1000) / get_tick_rate()
}

/// Convert milliseconds to ticks at the current tick rate, rounding up
pub fn ms_to_ticks(ms: u64) -> u64 {
    let rate = get_tick_rate();
    (ms.saturating_mul(rate) + 999) / 1000
}

/// Monotonic time source for bounded waits
///
/// Every wait in the drivers is expressed as "poll, then `relax`, until
/// `now()` passes the deadline". On bare metal `relax` is a spin hint; an
/// RTOS port yields to the scheduler there instead.
pub trait Clock: Send + Sync {
    /// Current time in ticks
    fn now(&self) -> u64;

    /// Called between polls of a bounded wait
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn relax(&self) {
        (**self).relax()
    }
}

/// Clock backed by the global SysTick counter
#[derive(Debug, Clone, Copy, Default)]
pub struct SysTickClock;

impl Clock for SysTickClock {
    fn now(&self) -> u64 {
        get_ticks()
    }
}

/// Point in time after which a bounded wait gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: u64,
}

impl Deadline {
    /// Deadline `timeout` ticks from now
    pub fn after<C: Clock + ?Sized>(clock: &C, timeout: u64) -> Self {
        Self {
            at: clock.now().saturating_add(timeout),
        }
    }

    /// Whether the deadline has passed
    pub fn expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        clock.now() >= self.at
    }

    /// Ticks left before expiry
    pub fn remaining<C: Clock + ?Sized>(&self, clock: &C) -> u64 {
        self.at.saturating_sub(clock.now())
    }
}
