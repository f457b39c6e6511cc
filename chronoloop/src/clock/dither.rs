use super::TrackingClock;
use crate::time::TimeValue;

const FRACTION_BITS: u32 = 16;
const FRACTION_MASK: i64 = (1 << FRACTION_BITS) - 1;

/// Delta-sigma modulator in front of a clock with a coarse rate register.
///
/// Rates handed to this clock are in units of 1/65536 of the wrapped clock's
/// LSB. Every [`dither_step`](`Self::dither_step`) programs the wrapped clock
/// with either the rate rounded down or one LSB more, so that over time the
/// average rate equals the fine request. Controllers driving a dithered clock
/// take a `ref_scale` 65536 times smaller than the hardware's.
#[derive(Debug)]
pub struct TrackingDither<C> {
    clock: C,
    fine: i64,
    accum: i64,
    current: Option<i64>,
}

impl<C: TrackingClock> TrackingDither<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            fine: 0,
            accum: 0,
            current: None,
        }
    }

    /// Requested rate in fine units
    pub fn fine_rate(&self) -> i64 {
        self.fine
    }

    pub fn inner(&self) -> &C {
        &self.clock
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Advance the modulator by one period. Call at a steady cadence from the
    /// poll loop; the period sets the dither frequency.
    pub fn dither_step(&mut self) {
        let accum = self.accum + (self.fine & FRACTION_MASK);
        self.accum = accum & FRACTION_MASK;
        let coarse = (self.fine >> FRACTION_BITS) + (accum >> FRACTION_BITS);

        if self.current != Some(coarse) {
            self.clock.clock_rate(coarse);
            self.current = Some(coarse);
        }
    }
}

impl<C: TrackingClock> TrackingClock for TrackingDither<C> {
    fn clock_adjust(&mut self, amount: TimeValue) -> TimeValue {
        self.clock.clock_adjust(amount)
    }

    fn clock_rate(&mut self, rate: i64) {
        if rate != self.fine {
            self.fine = rate;
            self.accum = 0;
        }
        self.dither_step();
    }

    fn clock_now(&self) -> TimeValue {
        self.clock.clock_now()
    }

    fn applied_rate(&self) -> Option<i64> {
        let applied = self.clock.applied_rate()?;
        if Some(applied) == self.current {
            None
        } else {
            Some(applied.saturating_mul(1 << FRACTION_BITS))
        }
    }
}
