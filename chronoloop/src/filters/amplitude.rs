use getset::CopyGetters;

use super::Filter;
use crate::time::SUBNS_PER_NSEC;

/// 2^32 * sqrt(pi / 2): converts a mean absolute deviation into a standard
/// deviation for normally distributed noise
const SQRTPI2: u128 = 5_382_943_231;
const SIGMA_INIT: u64 = u64::MAX / 2;
const REJECT_SIGMAS: i128 = 6;

/// Default time constant of the mean and deviation estimates
pub const DEFAULT_TAU_MSEC: u32 = 10_000;

/// Outlier rejection based on a running estimate of the noise.
///
/// Tracks an exponentially weighted mean and standard deviation of its
/// input. A sample six or more deviations away from the mean is an outlier:
/// it is replaced by the last accepted sample so later stages keep their
/// cadence without ever seeing the outlier.
///
/// After a reset the deviation estimate starts out very large, so a genuine
/// step in the input right after a mode change is accepted and learned.
#[derive(Debug, Clone, CopyGetters)]
pub struct AmplitudeReject {
    tau_msec: u32,
    min_sigma: u64,
    mean: i64,
    /// Current deviation estimate in subns
    #[getset(get_copy = "pub")]
    sigma: u64,
    primed: bool,
    last_accepted: Option<i64>,
    /// Samples passed through unchanged
    #[getset(get_copy = "pub")]
    accepted: u32,
    /// Samples replaced by the previous accepted one
    #[getset(get_copy = "pub")]
    rejected: u32,
}

impl Default for AmplitudeReject {
    fn default() -> Self {
        Self::new(DEFAULT_TAU_MSEC)
    }
}

impl AmplitudeReject {
    /// Create a filter whose estimates follow the input with the given time
    /// constant. The deviation estimate never drops below 1 ns.
    pub fn new(tau_msec: u32) -> Self {
        Self {
            tau_msec: tau_msec.max(1),
            min_sigma: SUBNS_PER_NSEC,
            mean: 0,
            sigma: SIGMA_INIT,
            primed: false,
            last_accepted: None,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Never let the deviation estimate fall below `min_sigma` subns
    pub fn with_min_sigma(mut self, min_sigma: u64) -> Self {
        self.min_sigma = min_sigma.clamp(1, SIGMA_INIT);
        self
    }

    pub fn set_tau(&mut self, tau_msec: u32) {
        self.tau_msec = tau_msec.max(1);
    }

    /// Whether a sample would be rejected with the current estimates
    pub fn is_outlier(&self, sample: i64) -> bool {
        let diff = sample as i128 - self.mean as i128;
        self.primed && diff.abs() >= REJECT_SIGMAS * self.sigma as i128
    }

    // Weight of a new sample as a 0.32 fixed point fraction
    fn weight(&self, elapsed_usec: u32) -> i128 {
        let tau_usec = self.tau_msec as u64 * 1000;
        let elapsed = (elapsed_usec as u64).min(tau_usec / 2);
        ((elapsed << 32) / tau_usec) as i128
    }

    fn learn(&mut self, sample: i64, elapsed_usec: u32) {
        const HALF: i128 = 1 << 31;

        let k = self.weight(elapsed_usec);
        let diff = sample as i128 - self.mean as i128;

        let mean = self.mean as i128 + ((diff * k + HALF) >> 32);
        self.mean = mean.clamp(i64::MIN as i128, i64::MAX as i128) as i64;

        let deviation = ((SQRTPI2 * diff.unsigned_abs() + HALF as u128) >> 32) as i128;
        let sigma = self.sigma as i128 + (((deviation - self.sigma as i128) * k + HALF) >> 32);
        self.sigma = sigma.clamp(self.min_sigma as i128, SIGMA_INIT as i128) as u64;
    }
}

impl Filter for AmplitudeReject {
    fn reset(&mut self) {
        self.mean = 0;
        self.sigma = SIGMA_INIT;
        self.primed = false;
        self.last_accepted = None;
    }

    fn update(&mut self, sample: Option<i64>, elapsed_usec: u32) -> Option<i64> {
        let sample = sample?;

        if !self.primed {
            self.primed = true;
            self.mean = sample;
            self.accepted = self.accepted.wrapping_add(1);
            self.last_accepted = Some(sample);
            return Some(sample);
        }

        let outlier = self.is_outlier(sample);
        self.learn(sample, elapsed_usec);

        if outlier {
            log::debug!(
                "Rejected outlier of {}ns (sigma {}ns)",
                sample / SUBNS_PER_NSEC as i64,
                self.sigma / SUBNS_PER_NSEC
            );
            self.rejected = self.rejected.wrapping_add(1);
            self.last_accepted
        } else {
            self.accepted = self.accepted.wrapping_add(1);
            self.last_accepted = Some(sample);
            Some(sample)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::BoxcarFilter;

    const NS: i64 = SUBNS_PER_NSEC as i64;

    fn noise(i: usize) -> i64 {
        if i % 2 == 0 {
            1000 * NS
        } else {
            -1000 * NS
        }
    }

    #[test]
    fn accepts_everything_after_reset() {
        let mut filter = AmplitudeReject::new(2000);
        assert_eq!(filter.update(Some(5_000_000 * NS), 1_000_000), Some(5_000_000 * NS));
        assert_eq!(filter.update(Some(-5_000_000 * NS), 1_000_000), Some(-5_000_000 * NS));
        assert_eq!(filter.rejected(), 0);
    }

    #[test]
    fn outlier_is_replaced_by_previous_sample() {
        let mut filter = AmplitudeReject::new(2000);
        for i in 0..200 {
            assert_eq!(filter.update(Some(noise(i)), 1_000_000), Some(noise(i)));
        }
        // the deviation has settled close to the noise amplitude
        assert!(filter.sigma() < 3000 * NS as u64);

        let previous = noise(199);
        assert_eq!(filter.update(Some(1_000_000 * NS), 1_000_000), Some(previous));
        assert_eq!(filter.rejected(), 1);
        assert_eq!(filter.accepted(), 200);
    }

    #[test]
    fn downstream_never_sees_outlier() {
        let mut reject = AmplitudeReject::new(2000);
        let mut boxcar = BoxcarFilter::<4>::new();
        let mut clean = BoxcarFilter::<4>::new();

        for i in 0..200 {
            let out = reject.update(Some(noise(i)), 1_000_000);
            let _ = boxcar.update(out, 1_000_000);
            let _ = clean.update(Some(noise(i)), 1_000_000);
        }

        let substituted = reject.update(Some(1_000_000 * NS), 1_000_000);
        let filtered = boxcar.update(substituted, 1_000_000);
        let reference = clean.update(Some(noise(199)), 1_000_000);
        assert_eq!(filtered, reference);
        assert!(filtered.unwrap().abs() <= 1000 * NS);
    }

    #[test]
    fn discarded_samples_pass_through() {
        let mut filter = AmplitudeReject::default();
        assert_eq!(filter.update(None, 1_000_000), None);
        assert_eq!(filter.accepted(), 0);
    }
}
