//! Simulated oscillator and timestamp counter

use chronoloop::{
    clock::{TrackingClock, TrackingDither},
    time::{TimeValue, SUBNS_PER_NSEC, SUBNS_PER_SEC},
};

use crate::config::ClockConfig;

/// A free running oscillator with a frequency error, a rate trim register
/// and a phase adjustment of limited granularity.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: TimeValue,
    /// Sub-subns phase not yet applied to `now`
    carry: f64,
    drift: f64,
    ref_scale: f64,
    rate_limit: i64,
    granularity: i64,
    requested_rate: i64,
    rate: i64,
}

impl SimClock {
    pub fn new(config: &ClockConfig, now: TimeValue) -> Self {
        let ref_scale = config.ref_scale();
        Self {
            now,
            carry: 0.0,
            drift: config.drift_ppb * 1e-9,
            ref_scale,
            rate_limit: (config.rate_limit_ppm * 1e-6 / ref_scale).round() as i64,
            granularity: (config.granularity_ns * SUBNS_PER_NSEC) as i64,
            requested_rate: 0,
            rate: 0,
        }
    }

    /// Let `elapsed` of true time pass
    pub fn advance(&mut self, elapsed: TimeValue) {
        let extra = elapsed.delta_subns() as f64 * self.frequency_error() + self.carry;
        let whole = extra.floor();
        self.carry = extra - whole;
        self.now += elapsed + TimeValue::from_subns(whole as i64);
    }

    /// Current frequency error against true time, drift plus trim
    pub fn frequency_error(&self) -> f64 {
        self.drift + self.rate as f64 * self.ref_scale
    }

    /// Trim currently programmed, after clamping
    pub fn rate(&self) -> i64 {
        self.rate
    }
}

impl TrackingClock for SimClock {
    fn clock_adjust(&mut self, amount: TimeValue) -> TimeValue {
        let subns = amount.delta_subns();
        let applied = match self.granularity {
            0 => subns,
            granularity => subns / granularity * granularity,
        };
        self.now += TimeValue::from_subns(applied);
        TimeValue::from_subns(subns - applied)
    }

    fn clock_rate(&mut self, rate: i64) {
        self.requested_rate = rate;
        self.rate = rate.clamp(-self.rate_limit, self.rate_limit);
    }

    fn clock_now(&self) -> TimeValue {
        self.now
    }

    fn applied_rate(&self) -> Option<i64> {
        (self.rate != self.requested_rate).then_some(self.rate)
    }
}

/// Clock sinks the simulation knows how to drive
pub trait SimulatedClock: TrackingClock {
    fn oscillator(&self) -> &SimClock;

    fn oscillator_mut(&mut self) -> &mut SimClock;

    /// Called on every poll of the slave
    fn on_poll(&mut self) {}
}

impl SimulatedClock for SimClock {
    fn oscillator(&self) -> &SimClock {
        self
    }

    fn oscillator_mut(&mut self) -> &mut SimClock {
        self
    }
}

impl SimulatedClock for TrackingDither<SimClock> {
    fn oscillator(&self) -> &SimClock {
        self.inner()
    }

    fn oscillator_mut(&mut self) -> &mut SimClock {
        self.inner_mut()
    }

    fn on_poll(&mut self) {
        self.dither_step();
    }
}

/// A free running counter latched by the timestamp hardware
#[derive(Debug, Clone, Copy)]
pub struct Counter {
    hz: u32,
    bits: u32,
}

impl Counter {
    pub fn new(hz: u32, bits: u32) -> Self {
        Self { hz, bits }
    }

    /// Raw counter value at `time`. The counter read zero at time zero.
    pub fn capture(&self, time: TimeValue) -> u64 {
        let subns = time.delta_subns().max(0) as u128;
        let ticks = subns * self.hz as u128 / SUBNS_PER_SEC as u128;
        ticks as u64 & (u64::MAX >> (64 - self.bits))
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClockConfig {
        ClockConfig {
            drift_ppb: 100.0,
            ..Default::default()
        }
    }

    #[test]
    fn drift_accumulates() {
        let mut clock = SimClock::new(&config(), TimeValue::ZERO);
        for _ in 0..1000 {
            clock.advance(TimeValue::from_millis(1));
        }
        let error = clock.clock_now() - TimeValue::ONE_SECOND;
        assert!((error.delta_nsec() - 100).abs() <= 1, "{error:?}");
    }

    #[test]
    fn trim_cancels_drift() {
        let mut clock = SimClock::new(&config(), TimeValue::ZERO);
        let trim = (-100e-9 / config().ref_scale()).round() as i64;
        clock.clock_rate(trim);
        assert_eq!(clock.applied_rate(), None);

        clock.advance(TimeValue::from_secs(10));
        let error = clock.clock_now() - TimeValue::from_secs(10);
        assert!(error.abs() < TimeValue::from_nanos(1), "{error:?}");
    }

    #[test]
    fn trim_is_clamped() {
        let mut clock = SimClock::new(&config(), TimeValue::ZERO);
        clock.clock_rate(i64::MAX);
        let limit = clock.rate();
        assert!(limit > 0);
        assert_eq!(clock.applied_rate(), Some(limit));
        assert!((clock.frequency_error() - 1e-3).abs() < 1e-6);
    }

    #[test]
    fn coarse_adjust_reports_residual() {
        let mut clock = SimClock::new(
            &ClockConfig {
                granularity_ns: 8,
                ..Default::default()
            },
            TimeValue::ZERO,
        );
        let residual = clock.clock_adjust(TimeValue::from_nanos(-21));
        assert_eq!(clock.clock_now(), TimeValue::from_nanos(-16));
        assert_eq!(residual, TimeValue::from_nanos(-5));
    }

    #[test]
    fn counter_wraps() {
        let counter = Counter::new(1_000_000_000, 32);
        assert_eq!(counter.capture(TimeValue::from_nanos(5)), 5);
        assert_eq!(counter.capture(TimeValue::from_nanos((1 << 32) + 7)), 7);
        assert_eq!(counter.capture(TimeValue::from_nanos(-3)), 0);
    }
}
