use getset::CopyGetters;

use super::TrackingClock;
use crate::time::TimeValue;

/// Pass-through clock that remembers what was asked of it.
///
/// Useful in free-running diagnostics and when bringing up new hardware: the
/// controller's requests are visible without reading back the hardware.
#[derive(Debug, CopyGetters)]
pub struct TrackingClockDebug<C> {
    clock: C,
    /// Last rate handed to the clock
    #[getset(get_copy = "pub")]
    last_rate: i64,
    /// Sum of all applied phase adjustments
    #[getset(get_copy = "pub")]
    total_adjust: TimeValue,
    #[getset(get_copy = "pub")]
    adjust_count: u32,
    #[getset(get_copy = "pub")]
    rate_count: u32,
}

impl<C: TrackingClock> TrackingClockDebug<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last_rate: 0,
            total_adjust: TimeValue::ZERO,
            adjust_count: 0,
            rate_count: 0,
        }
    }

    pub fn inner(&self) -> &C {
        &self.clock
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn into_inner(self) -> C {
        self.clock
    }
}

impl<C: TrackingClock> TrackingClock for TrackingClockDebug<C> {
    fn clock_adjust(&mut self, amount: TimeValue) -> TimeValue {
        let residual = self.clock.clock_adjust(amount);
        self.total_adjust += amount - residual;
        self.adjust_count = self.adjust_count.wrapping_add(1);
        log::trace!("clock_adjust {} (residual {})", amount, residual);
        residual
    }

    fn clock_rate(&mut self, rate: i64) {
        self.clock.clock_rate(rate);
        self.last_rate = rate;
        self.rate_count = self.rate_count.wrapping_add(1);
        log::trace!("clock_rate {}", rate);
    }

    fn clock_now(&self) -> TimeValue {
        self.clock.clock_now()
    }

    fn applied_rate(&self) -> Option<i64> {
        self.clock.applied_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::FakeClock;

    #[test]
    fn records_requests() {
        let mut clock = TrackingClockDebug::new(FakeClock {
            granularity: Some(65_536),
            ..Default::default()
        });

        let residual = clock.clock_adjust(TimeValue::from_subns(3 * 65_536 + 100));
        assert_eq!(residual, TimeValue::from_subns(100));
        let _ = clock.clock_adjust(TimeValue::from_nanos(-1));
        assert_eq!(clock.total_adjust(), TimeValue::from_nanos(2));
        assert_eq!(clock.adjust_count(), 2);

        clock.clock_rate(-42);
        assert_eq!(clock.last_rate(), -42);
        assert_eq!(clock.inner().rate, -42);
        assert_eq!(clock.clock_now(), TimeValue::from_nanos(2));
    }
}
