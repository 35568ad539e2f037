//! Host time service interface
//!
//! The host counter is a free-running, monotonic counter with a known tick
//! rate. The PAL only needs to read it, convert to and from microseconds,
//! and arm one-shot timers.

use embassy_time::Duration;

/// Opaque handle of an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct TimerHandle(pub u32);

/// Timer flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum TimerKind {
    /// Fires once, then is gone
    OneShot,
    /// Fires every `delay` until cancelled
    Periodic,
}

/// A trait representing the host's monotonic counter service
pub trait TimeService {
    /// The current value of the host counter, in native ticks
    fn now_ticks(&self) -> u64;

    /// Convert native ticks to microseconds.
    ///
    /// The result wraps at 32 bits; the PAL's local time base is a
    /// wrapping `u32` microsecond counter.
    fn ticks_to_us(&self, ticks: u64) -> u32;

    /// Convert microseconds to native ticks.
    ///
    /// Must round consistently with [`TimeService::ticks_to_us`], so that
    /// a round trip is off by at most one tick.
    fn us_to_ticks(&self, us: u32) -> u64;

    /// Arm a timer.
    ///
    /// Returns `None` if no timer could be registered. When the timer
    /// fires, the integrator must report it with
    /// [`PalNotifier::timer_expired`][crate::event::PalNotifier::timer_expired].
    fn register_timer(&mut self, delay: Duration, kind: TimerKind) -> Option<TimerHandle>;

    /// Disarm a timer. Unknown or already expired handles are ignored.
    fn cancel_timer(&mut self, handle: TimerHandle);

    /// The current host time in wrapping microseconds
    #[inline]
    fn now_us(&self) -> u32 {
        self.ticks_to_us(self.now_ticks())
    }
}
