use super::{gain_ok, slew_limit, wide, CoeffError, Filter, SlidingWindow, SLEW_MAX_IN};
use crate::time::{SUBNS_PER_USEC, USEC_PER_SEC};

/// Fits shorter than this many microseconds say nothing useful about slope
const MIN_SPAN_USEC: u64 = 2_000;

/// Result of a least-squares fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearFit {
    /// Fitted value at the newest sample, subns
    pub intercept: i64,
    /// Subns per microsecond, scaled by 2^[`CoeffLR::SCALE`]
    pub slope: i128,
}

/// Least-squares line through the most recent samples
#[derive(Debug, Clone)]
pub struct LinearRegression<const N: usize> {
    /// (time in usec since reset, sample)
    window: SlidingWindow<(u64, i64), N>,
    now: u64,
}

impl<const N: usize> Default for LinearRegression<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LinearRegression<N> {
    const CAPACITY: () = assert!(N >= 2 && N <= 32, "regression window must hold 2 to 32 samples");

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::CAPACITY;
        Self {
            window: SlidingWindow::new(),
            now: 0,
        }
    }

    /// Fit over only the last `len` samples, up to `N`
    pub fn set_window(&mut self, len: usize) {
        self.window.set_len(len.max(2));
    }

    pub fn reset(&mut self) {
        self.window.reset();
        self.now = 0;
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Add a sample taken `elapsed_usec` after the previous one
    pub fn push(&mut self, sample: i64, elapsed_usec: u64) {
        self.now = self.now.saturating_add(elapsed_usec);
        let _ = self
            .window
            .push((self.now, sample.clamp(-SLEW_MAX_IN, SLEW_MAX_IN)));
    }

    /// Fit a line through the window, with time measured relative to the
    /// newest sample
    pub fn fit(&self) -> Option<LinearFit> {
        let n = self.window.len() as i128;
        if n < 2 {
            return None;
        }

        let (oldest, _) = self.window.iter().next()?;
        if self.now - oldest < MIN_SPAN_USEC {
            return None;
        }

        let (mut sum_x, mut sum_y, mut sum_xx, mut sum_xy) = (0i128, 0i128, 0i128, 0i128);
        for (time, y) in self.window.iter() {
            let x = -((self.now - time) as i128);
            let y = y as i128;
            sum_x += x;
            sum_y += y;
            sum_xx += x * x;
            sum_xy += x * y;
        }

        let cov_xx = n * sum_xx - sum_x * sum_x;
        let cov_xy = n * sum_xy - sum_x * sum_y;
        if cov_xx <= 0 {
            return None;
        }

        let slope = cov_xy.checked_mul(1 << CoeffLR::SCALE)? / cov_xx;
        let intercept = (sum_y - (slope.saturating_mul(sum_x) >> CoeffLR::SCALE)) / n;

        Some(LinearFit {
            intercept: intercept.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
            slope,
        })
    }
}

/// Gains of a [`ControllerLR`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoeffLR {
    /// LSB per subns/usec
    pub kf: u64,
    /// `kf / tau`, scaled by 2^[`Self::KI_SCALE`]
    pub ki: u64,
    /// Weight of the intercept against the slope, per usec and scaled by
    /// 2^[`Self::SCALE`]
    pub kw: u64,
    pub ymax: u64,
}

impl CoeffLR {
    /// Fixed-point scale of the fitted slope and the accumulator
    pub const SCALE: u32 = 40;
    pub const KI_SCALE: u32 = 16;

    /// Loop with time constant `tau` seconds. The loop stays stable as long
    /// as `tau` is at least the length of the fit window in seconds.
    pub fn new(ref_scale: f64, tau: f64) -> Self {
        let kf = 1.0 / (SUBNS_PER_USEC as f64 * ref_scale);

        Self {
            kf: wide::round_u64(kf),
            ki: wide::round_u64(kf * (1u64 << Self::KI_SCALE) as f64 / tau),
            kw: wide::round_u64(
                (1u64 << Self::SCALE) as f64 * 2.0 / (tau * USEC_PER_SEC as f64),
            ),
            ymax: slew_limit(ref_scale),
        }
    }

    pub fn is_ok(&self) -> bool {
        [self.kf, self.ki, self.kw, self.ymax].into_iter().all(gain_ok)
    }

    pub fn validate(self) -> Result<Self, CoeffError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(CoeffError)
        }
    }
}

/// Rate controller driven by a linear fit over the last `N` samples.
///
/// Each update integrates the fitted slope plus the intercept spread over
/// half the time constant. Discarded samples only extend the time to the next
/// accepted one.
#[derive(Debug, Clone)]
pub struct ControllerLR<const N: usize> {
    regression: LinearRegression<N>,
    coeff: CoeffLR,
    accum: i128,
    pending_usec: u64,
}

impl<const N: usize> ControllerLR<N> {
    pub fn new(coeff: CoeffLR) -> Self {
        let mut this = Self {
            regression: LinearRegression::new(),
            coeff,
            accum: 0,
            pending_usec: 0,
        };
        this.set_coeff(coeff);
        this
    }

    /// Switch to new gains. Clears the accumulated rate.
    pub fn set_coeff(&mut self, coeff: CoeffLR) {
        if !coeff.is_ok() {
            log::error!("ControllerLR: bad config {:?}", coeff);
        }
        self.coeff = coeff;
        self.accum = 0;
    }

    pub fn coeff(&self) -> CoeffLR {
        self.coeff
    }

    pub fn set_window(&mut self, len: usize) {
        self.regression.set_window(len);
    }

    pub fn regression(&self) -> &LinearRegression<N> {
        &self.regression
    }

    fn clamp(&self, value: i128) -> i128 {
        wide::clamp_scaled(value, self.coeff.ymax, CoeffLR::SCALE)
    }
}

impl<const N: usize> Filter for ControllerLR<N> {
    fn reset(&mut self) {
        self.regression.reset();
        self.accum = 0;
        self.pending_usec = 0;
    }

    fn rate(&mut self, delta_subns: i64, elapsed_usec: u32) {
        let delta = delta_subns.clamp(-SLEW_MAX_IN, SLEW_MAX_IN) as i128;
        let slope = (delta << CoeffLR::SCALE) / elapsed_usec.max(1) as i128;
        self.accum = self.clamp(self.accum + slope.saturating_mul(self.coeff.kf as i128));
    }

    fn update(&mut self, sample: Option<i64>, elapsed_usec: u32) -> Option<i64> {
        self.pending_usec = self.pending_usec.saturating_add(elapsed_usec as u64);
        let sample = sample?;

        let step = core::mem::take(&mut self.pending_usec);
        self.regression.push(sample, step);
        let fit = self.regression.fit()?;

        let drive = fit
            .slope
            .saturating_add((fit.intercept as i128).saturating_mul(self.coeff.kw as i128));
        let delta = drive
            .saturating_mul(self.coeff.ki as i128)
            .saturating_mul(step as i128)
            / ((USEC_PER_SEC as i128) << CoeffLR::KI_SCALE);
        self.accum = self.clamp(self.accum.saturating_add(delta));

        Some(wide::wide_output(self.accum, CoeffLR::SCALE))
    }

    fn saturated(&mut self, applied: i64) {
        self.accum = wide::clamp_scaled(self.accum, applied.unsigned_abs(), CoeffLR::SCALE);
    }
}
