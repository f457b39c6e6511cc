//! The clock sink driven by the tracking controller

mod debug;
mod dither;

pub use debug::TrackingClockDebug;
pub use dither::TrackingDither;

use crate::time::TimeValue;

/// A clock that can be nudged in phase and trimmed in rate.
///
/// Implementations sit on top of hardware: an NCO, a PTP hardware clock, or a
/// counter with a programmable increment. They never fail. A request the
/// hardware cannot satisfy is applied as far as possible.
pub trait TrackingClock {
    /// Shift the clock by `amount`, forwards when positive.
    ///
    /// Returns the part of `amount` that was not applied, for example because
    /// it is finer than the hardware granularity.
    fn clock_adjust(&mut self, amount: TimeValue) -> TimeValue;

    /// Run the clock `rate` LSB faster than nominal. The size of an LSB is
    /// hardware specific. Out of range requests are clamped silently.
    fn clock_rate(&mut self, rate: i64);

    /// Current time of the clock
    fn clock_now(&self) -> TimeValue;

    /// The rate actually in effect after the last [`clock_rate`](`Self::clock_rate`).
    ///
    /// `None` means the request was applied as given.
    fn applied_rate(&self) -> Option<i64> {
        None
    }
}

impl<C: TrackingClock + ?Sized> TrackingClock for &mut C {
    fn clock_adjust(&mut self, amount: TimeValue) -> TimeValue {
        (**self).clock_adjust(amount)
    }

    fn clock_rate(&mut self, rate: i64) {
        (**self).clock_rate(rate)
    }

    fn clock_now(&self) -> TimeValue {
        (**self).clock_now()
    }

    fn applied_rate(&self) -> Option<i64> {
        (**self).applied_rate()
    }
}
