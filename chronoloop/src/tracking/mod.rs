//! Orchestration of the filter chain and the clock sink

use arrayvec::ArrayVec;
use getset::CopyGetters;

use crate::{
    clock::TrackingClock,
    config::SwitchPolicy,
    filters::Filter,
    time::{TimeValue, USEC_PER_SEC},
};

/// Number of stages a filter chain can hold
pub const MAX_FILTERS: usize = 8;

/// The filter chain already holds [`MAX_FILTERS`] stages
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[cfg_attr(feature = "std", error("filter chain is full"))]
pub struct ChainFullError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackingMode {
    /// No clock to correct. Samples are only recorded.
    FreeRun,
    /// Remove the offset with phase jumps
    Slewing,
    /// Remove the offset with rate trims computed by the filter chain
    Tracking,
}

/// What an update did to the clock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Correction {
    /// Nothing was applied
    None,
    /// A phase jump of `requested`, of which `residual` was not applied
    Step {
        requested: TimeValue,
        residual: TimeValue,
    },
    /// The clock rate was set, in clock LSB
    Rate(i64),
}

/// Counters kept by the tracking controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct TrackingStats {
    /// Samples handed to [`TrackingController::update`]
    samples: u32,
    /// Phase jumps requested from the clock
    steps: u32,
    /// Rate trims requested from the clock
    rate_updates: u32,
    /// Rate trims the clock could not apply in full
    saturations: u32,
    /// Changes of [`TrackingMode`]
    mode_switches: u32,
}

/// Drives a [`TrackingClock`] from offset measurements.
///
/// Offsets are local time minus reference time. While slewing every offset is
/// removed with a phase jump. Once the offset has stayed below the configured
/// threshold for the configured number of samples the controller switches to
/// tracking, where each offset runs through the filter chain and the chain's
/// output becomes the clock rate.
///
/// Filters are borrowed for the lifetime of the controller and run in the
/// order they were added. Every mode change resets them, so a stage never
/// mixes history from two modes.
pub struct TrackingController<'a, C> {
    clock: Option<C>,
    filters: ArrayVec<&'a mut dyn Filter, MAX_FILTERS>,
    policy: SwitchPolicy,
    mode: TrackingMode,
    last_rxtime: Option<TimeValue>,
    last_offset: Option<TimeValue>,
    /// Consecutive slewing samples within the tracking threshold
    dwell: u32,
    /// Part of the last phase jump the clock did not apply, in subns
    jump_residual: Option<i64>,
    stats: TrackingStats,
}

impl<C> core::fmt::Debug for TrackingController<'_, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrackingController")
            .field("mode", &self.mode)
            .field("filters", &self.filters.len())
            .field("policy", &self.policy)
            .field("last_offset", &self.last_offset)
            .field("dwell", &self.dwell)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<'a, C: TrackingClock> TrackingController<'a, C> {
    /// Create a controller. Without a clock it starts in
    /// [`TrackingMode::FreeRun`], otherwise in [`TrackingMode::Slewing`].
    pub fn new(clock: Option<C>, policy: SwitchPolicy) -> Self {
        let mode = if clock.is_some() {
            TrackingMode::Slewing
        } else {
            TrackingMode::FreeRun
        };

        Self {
            clock,
            filters: ArrayVec::new(),
            policy,
            mode,
            last_rxtime: None,
            last_offset: None,
            dwell: 0,
            jump_residual: None,
            stats: TrackingStats::default(),
        }
    }

    /// Append a stage to the end of the filter chain
    pub fn add_filter(&mut self, filter: &'a mut dyn Filter) -> Result<(), ChainFullError> {
        self.filters.try_push(filter).map_err(|_| ChainFullError)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn policy(&self) -> &SwitchPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: SwitchPolicy) {
        self.policy = policy;
        self.dwell = 0;
    }

    pub fn stats(&self) -> TrackingStats {
        self.stats
    }

    /// The most recent offset handed to [`update`](`Self::update`)
    pub fn last_offset(&self) -> Option<TimeValue> {
        self.last_offset
    }

    pub fn clock(&self) -> Option<&C> {
        self.clock.as_ref()
    }

    pub fn clock_mut(&mut self) -> Option<&mut C> {
        self.clock.as_mut()
    }

    /// Start driving `clock`. Leaves free run for slewing.
    pub fn attach_clock(&mut self, clock: C) {
        self.clock = Some(clock);
        self.set_mode(TrackingMode::Slewing);
    }

    /// Stop driving the clock and hand it back. The controller free runs
    /// until a clock is attached again.
    pub fn detach_clock(&mut self) -> Option<C> {
        self.set_mode(TrackingMode::FreeRun);
        self.clock.take()
    }

    /// Force a mode. Without a clock every mode is [`TrackingMode::FreeRun`].
    pub fn set_mode(&mut self, mode: TrackingMode) {
        let mode = if self.clock.is_some() {
            mode
        } else {
            TrackingMode::FreeRun
        };

        if mode != self.mode {
            log::info!("Tracking mode {:?} -> {:?}", self.mode, mode);
            self.stats.mode_switches = self.stats.mode_switches.wrapping_add(1);
        }
        self.mode = mode;
        self.reset_filters();
        self.dwell = 0;
        self.jump_residual = None;

        if mode == TrackingMode::Slewing {
            // jumps measure the raw drift, which seeds the controllers later
            self.clock_rate(0);
        }
    }

    /// Forget all history and start over from slewing
    pub fn reset(&mut self) {
        self.last_rxtime = None;
        self.last_offset = None;
        self.set_mode(TrackingMode::Slewing);
    }

    /// Request a phase jump of `amount`. Returns the part that was not
    /// applied, which is all of it without a clock.
    pub fn clock_adjust(&mut self, amount: TimeValue) -> TimeValue {
        let Some(clock) = self.clock.as_mut() else {
            return amount;
        };

        let residual = clock.clock_adjust(amount);
        self.stats.steps = self.stats.steps.wrapping_add(1);

        // keep the next elapsed time free of the jump
        if let Some(last) = self.last_rxtime.as_mut() {
            *last += amount - residual;
        }
        residual
    }

    /// Request a rate trim. Returns the rate actually in effect.
    pub fn clock_rate(&mut self, rate: i64) -> i64 {
        let Some(clock) = self.clock.as_mut() else {
            return 0;
        };

        clock.clock_rate(rate);
        self.stats.rate_updates = self.stats.rate_updates.wrapping_add(1);
        clock.applied_rate().unwrap_or(rate)
    }

    /// Process the offset of the exchange whose Sync was received at local
    /// time `rxtime`.
    pub fn update(&mut self, rxtime: TimeValue, offset: TimeValue) -> Correction {
        self.stats.samples = self.stats.samples.wrapping_add(1);
        self.last_offset = Some(offset);
        let elapsed_usec = self.elapsed_usec(rxtime);

        if self.mode == TrackingMode::Tracking && self.policy.wants_slew(offset) {
            log::warn!("Offset of {} too large for tracking", offset);
            self.set_mode(TrackingMode::Slewing);
        }

        match self.mode {
            TrackingMode::FreeRun => {
                log::debug!("Free running, offset {}", offset);
                Correction::None
            }
            TrackingMode::Slewing => self.slew(offset, elapsed_usec),
            TrackingMode::Tracking => self.track(offset, elapsed_usec),
        }
    }

    fn elapsed_usec(&mut self, rxtime: TimeValue) -> u32 {
        let elapsed = match self.last_rxtime {
            Some(last) => (rxtime - last)
                .delta_usec()
                .clamp(0, USEC_PER_SEC as i64) as u32,
            None => 0,
        };
        self.last_rxtime = Some(rxtime);
        elapsed
    }

    fn reset_filters(&mut self) {
        for filter in self.filters.iter_mut() {
            filter.reset();
        }
    }

    fn slew(&mut self, offset: TimeValue, elapsed_usec: u32) -> Correction {
        let sample = (-offset).delta_subns();

        // whatever built up since the last jump is drift of the free running clock
        let drift = match self.jump_residual {
            Some(residual) if elapsed_usec > 0 => Some(sample.saturating_sub(residual)),
            _ => None,
        };

        let requested = -offset;
        let residual = self.clock_adjust(requested);
        self.jump_residual = Some(residual.delta_subns());

        if self.policy.within_track(offset) {
            self.dwell += 1;
        } else {
            self.dwell = 0;
        }

        if self.dwell >= self.policy.track_dwell {
            self.set_mode(TrackingMode::Tracking);
            if let Some(drift) = drift {
                log::debug!("Seeding rate with a drift of {}subns over {}us", drift, elapsed_usec);
                for filter in self.filters.iter_mut() {
                    filter.rate(drift, elapsed_usec);
                }
            }
        }

        Correction::Step {
            requested,
            residual,
        }
    }

    fn track(&mut self, offset: TimeValue, elapsed_usec: u32) -> Correction {
        if self.filters.is_empty() {
            return Correction::None;
        }

        let mut value = Some((-offset).delta_subns());
        for filter in self.filters.iter_mut() {
            value = filter.update(value, elapsed_usec);
        }

        let Some(rate) = value else {
            return Correction::None;
        };

        let applied = self.clock_rate(rate);
        if applied != rate {
            log::debug!("Clock applied rate {} instead of {}", applied, rate);
            self.stats.saturations = self.stats.saturations.wrapping_add(1);
            for filter in self.filters.iter_mut() {
                filter.saturated(applied);
            }
        }

        Correction::Rate(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::test_clock::FakeClock,
        filters::{test_plant::REF_SCALE, AmplitudeReject, CoeffPI, ControllerPI},
        time::SUBNS_PER_SEC,
    };
    use std::vec::Vec;

    fn policy() -> SwitchPolicy {
        SwitchPolicy {
            slew_threshold: Some(TimeValue::from_millis(1)),
            track_threshold: TimeValue::from_micros(1),
            track_dwell: 3,
        }
    }

    /// Let one second of reference time pass. Returns the local minus
    /// reference offset afterwards.
    fn advance(clock: &mut FakeClock, reference: &mut TimeValue, drift_ppb: f64) -> TimeValue {
        let error = drift_ppb * 1e-9 + clock.rate as f64 * REF_SCALE;
        let subns = (SUBNS_PER_SEC as f64 * (1.0 + error)).round() as i64;
        clock.now += TimeValue::from_subns(subns);
        *reference += TimeValue::ONE_SECOND;
        clock.now - *reference
    }

    fn run(drift_ppb: f64, steps: usize) -> (Vec<TrackingMode>, TimeValue, TrackingStats) {
        let mut pi = ControllerPI::new(CoeffPI::new(REF_SCALE, 5.0));
        let mut reject = AmplitudeReject::new(2000);

        let clock = FakeClock {
            now: TimeValue::from_millis(5),
            ..Default::default()
        };
        let mut tracking = TrackingController::new(Some(clock), policy());
        tracking.add_filter(&mut reject).unwrap();
        tracking.add_filter(&mut pi).unwrap();

        let mut reference = TimeValue::ZERO;
        let mut offset = TimeValue::from_millis(5);
        let mut modes = Vec::new();
        let mut worst = TimeValue::ZERO;

        for step in 0..steps {
            let rxtime = tracking.clock().unwrap().now;
            let _ = tracking.update(rxtime, offset);
            modes.push(tracking.mode());
            offset = advance(tracking.clock_mut().unwrap(), &mut reference, drift_ppb);
            if step + 20 >= steps {
                worst = worst.max(offset.abs());
            }
        }

        (modes, worst, tracking.stats())
    }

    #[test]
    fn slews_then_tracks() {
        let (modes, worst, stats) = run(0.0, 50);
        assert_eq!(
            &modes[..5],
            &[
                TrackingMode::Slewing,
                TrackingMode::Slewing,
                TrackingMode::Slewing,
                TrackingMode::Tracking,
                TrackingMode::Tracking,
            ]
        );
        assert_eq!(worst, TimeValue::ZERO);
        assert_eq!(stats.steps(), 4);
        assert_eq!(stats.mode_switches(), 1);
    }

    #[test]
    fn drift_is_tracked_out() {
        for drift in [100.0, -250.0] {
            let (modes, worst, _) = run(drift, 120);
            assert_eq!(modes[119], TrackingMode::Tracking);
            assert!(worst < TimeValue::from_nanos(1), "{drift}: {worst}");
        }
    }

    #[test]
    fn without_clock_nothing_happens() {
        let mut pi = ControllerPI::new(CoeffPI::new(REF_SCALE, 5.0));
        let mut tracking = TrackingController::<FakeClock>::new(None, policy());
        tracking.add_filter(&mut pi).unwrap();

        assert_eq!(tracking.mode(), TrackingMode::FreeRun);
        assert_eq!(
            tracking.update(TimeValue::ZERO, TimeValue::from_millis(3)),
            Correction::None
        );
        tracking.set_mode(TrackingMode::Tracking);
        assert_eq!(tracking.mode(), TrackingMode::FreeRun);
        assert_eq!(tracking.clock_adjust(TimeValue::ONE_SECOND), TimeValue::ONE_SECOND);
        assert_eq!(tracking.last_offset(), Some(TimeValue::from_millis(3)));
    }

    #[test]
    fn attach_and_detach() {
        let mut tracking = TrackingController::new(None, policy());
        tracking.attach_clock(FakeClock::default());
        assert_eq!(tracking.mode(), TrackingMode::Slewing);

        match tracking.update(TimeValue::ZERO, TimeValue::from_micros(-7)) {
            Correction::Step {
                requested,
                residual,
            } => {
                assert_eq!(requested, TimeValue::from_micros(7));
                assert_eq!(residual, TimeValue::ZERO);
            }
            correction => panic!("Unexpected correction {correction:?}"),
        }

        let clock = tracking.detach_clock().unwrap();
        assert_eq!(clock.now, TimeValue::from_micros(7));
        assert_eq!(tracking.mode(), TrackingMode::FreeRun);
    }

    #[test]
    fn large_offset_while_tracking_returns_to_slewing() {
        let mut pi = ControllerPI::new(CoeffPI::new(REF_SCALE, 5.0));
        let mut tracking = TrackingController::new(Some(FakeClock::default()), policy());
        tracking.add_filter(&mut pi).unwrap();
        tracking.set_mode(TrackingMode::Tracking);

        match tracking.update(TimeValue::ZERO, TimeValue::from_nanos(100)) {
            Correction::Rate(rate) => assert!(rate < 0),
            correction => panic!("Unexpected correction {correction:?}"),
        }

        let correction = tracking.update(TimeValue::ONE_SECOND, TimeValue::from_millis(2));
        assert_eq!(tracking.mode(), TrackingMode::Slewing);
        assert!(matches!(correction, Correction::Step { .. }));
        assert_eq!(tracking.clock().unwrap().rate, 0);
    }

    #[test]
    fn residual_of_a_coarse_clock_is_reported() {
        let clock = FakeClock {
            granularity: Some(1000 * 65_536),
            ..Default::default()
        };
        let mut tracking = TrackingController::new(Some(clock), policy());

        match tracking.update(TimeValue::ZERO, TimeValue::from_nanos(-2500)) {
            Correction::Step { residual, .. } => assert_eq!(residual, TimeValue::from_nanos(500)),
            correction => panic!("Unexpected correction {correction:?}"),
        }
        assert_eq!(tracking.clock().unwrap().now, TimeValue::from_nanos(2000));
    }

    #[test]
    fn saturation_limits_integrator() {
        let mut pi = ControllerPI::new(CoeffPI::new(REF_SCALE, 5.0));
        {
            let clock = FakeClock {
                rate_limit: Some(1000),
                ..Default::default()
            };
            let mut tracking = TrackingController::new(Some(clock), policy());
            tracking.add_filter(&mut pi).unwrap();
            tracking.set_mode(TrackingMode::Tracking);

            for i in 0..20 {
                let _ = tracking.update(TimeValue::from_secs(i), TimeValue::from_micros(-500));
            }
            assert_eq!(tracking.clock().unwrap().rate, 1000);
            assert!(tracking.stats().saturations() > 0);
        }
        assert!(pi.integral() <= 1000);
    }

    #[test]
    fn chain_capacity() {
        let mut filters: [AmplitudeReject; MAX_FILTERS + 1] = Default::default();
        let mut tracking = TrackingController::<FakeClock>::new(None, policy());
        let (last, rest) = filters.split_last_mut().unwrap();
        for filter in rest.iter_mut() {
            tracking.add_filter(filter).unwrap();
        }
        assert_eq!(tracking.add_filter(last), Err(ChainFullError));
        assert_eq!(tracking.filter_count(), MAX_FILTERS);
    }
}
