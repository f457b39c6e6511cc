//! Filters and controllers for the offset samples of an exchange
//!
//! Each stage implements [`Filter`]. Stages are chained by the
//! [`TrackingController`](`crate::tracking::TrackingController`) in the order
//! they were added: the output of one stage is the input of the next, and the
//! output of the last stage is the rate correction for the clock.
//!
//! Samples travel through the chain as signed integers in units of 1/65536
//! nanosecond (subns), the difference between the reference and the local
//! clock. Controllers output a rate in units of the clock's rate LSB.

mod amplitude;
mod boxcar;
mod median;
mod pi;
mod pii;
mod regression;
mod wide;
mod window;

pub use amplitude::AmplitudeReject;
pub use boxcar::BoxcarFilter;
pub use median::MedianFilter;
pub use pi::{CoeffPI, ControllerPI};
pub use pii::{CoeffPII, ControllerPII};
pub use regression::{CoeffLR, ControllerLR, LinearRegression};
pub use window::SlidingWindow;

use crate::time::SUBNS_PER_MSEC;

/// Inputs to the controllers are clamped to this magnitude (10 ms)
pub(crate) const SLEW_MAX_IN: i64 = 10 * SUBNS_PER_MSEC as i64;

/// Controller outputs never exceed 1% of the nominal rate
pub(crate) fn slew_limit(ref_scale: f64) -> u64 {
    wide::round_u64(0.01 / ref_scale)
}

/// Computed controller gains are too small to be represented accurately
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[cfg_attr(
    feature = "std",
    error("controller gains lose precision for this rate scale and time constant")
)]
pub struct CoeffError;

/// Fixed-point gains must have a few significant bits to be meaningful
pub(crate) fn gain_ok(gain: u64) -> bool {
    gain > 7
}

/// A single stage of the filter chain.
///
/// Stages only ever see their own state. A stage that has nothing to say yet,
/// or that discards its input, returns `None`; later stages then get `None` as
/// their input but are still called so their notion of elapsed time stays
/// correct.
pub trait Filter {
    /// Forget all history, as if freshly constructed
    fn reset(&mut self);

    /// Coarse frequency hint: the offset drifted by `delta_subns` over
    /// `elapsed_usec` while the clock ran uncorrected. Controllers use this to
    /// start close to the right rate. Other stages ignore it.
    fn rate(&mut self, _delta_subns: i64, _elapsed_usec: u32) {}

    /// Process one sample taken `elapsed_usec` after the previous one
    fn update(&mut self, sample: Option<i64>, elapsed_usec: u32) -> Option<i64>;

    /// The clock could only apply `applied` instead of the last output.
    /// Integrating stages limit their state to it to prevent windup.
    fn saturated(&mut self, _applied: i64) {}
}

impl<F: Filter + ?Sized> Filter for &mut F {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn rate(&mut self, delta_subns: i64, elapsed_usec: u32) {
        (**self).rate(delta_subns, elapsed_usec)
    }

    fn update(&mut self, sample: Option<i64>, elapsed_usec: u32) -> Option<i64> {
        (**self).update(sample, elapsed_usec)
    }

    fn saturated(&mut self, applied: i64) {
        (**self).saturated(applied)
    }
}

#[cfg(test)]
pub(crate) mod test_plant {
    use super::Filter;
    use crate::time::SUBNS_PER_SEC;

    /// Rate LSB used by the controller tests: 2^-40 s/s
    pub(crate) const REF_SCALE: f64 = 1.0 / (1u64 << 40) as f64;

    /// Close the loop around `filter` with an ideal clock whose frequency is
    /// off by `drift_ppb`. Returns the largest offset in seconds seen during
    /// the last 20 updates.
    pub(crate) fn closed_loop(
        filter: &mut dyn Filter,
        offset_ns: f64,
        drift_ppb: f64,
        steps: usize,
        interval_usec: u32,
    ) -> f64 {
        let dt = interval_usec as f64 * 1e-6;
        let mut error = offset_ns * 1e-9;
        let mut rate = 0i64;
        let mut worst = 0.0f64;

        for step in 0..steps {
            let delta = (-error * SUBNS_PER_SEC as f64).round() as i64;
            if let Some(output) = filter.update(Some(delta), interval_usec) {
                rate = output;
            }
            error += (rate as f64 * REF_SCALE + drift_ppb * 1e-9) * dt;
            if step + 20 >= steps {
                worst = worst.max(error.abs());
            }
        }

        worst
    }
}
