use super::{gain_ok, slew_limit, wide, CoeffError, Filter, SLEW_MAX_IN};
use crate::time::{SUBNS_PER_SEC, SUBNS_PER_USEC, USEC_PER_SEC};

/// Gains of a [`ControllerPI`].
///
/// `ref_scale` is the size of one rate LSB of the clock in seconds per
/// second, `tau` the loop time constant in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoeffPI {
    /// Proportional gain
    pub kp: u64,
    /// Integral gain
    pub ki: u64,
    /// Coarse frequency gain, LSB per subns/usec
    pub kf: u64,
    /// Largest output, LSB
    pub ymax: u64,
}

impl CoeffPI {
    /// Fixed-point scale of `kp` and `ki`
    pub const SCALE: u32 = 60;

    /// Critically damped loop
    pub fn new(ref_scale: f64, tau: f64) -> Self {
        Self::with_damping(ref_scale, tau, 1.0)
    }

    /// Loop with damping factor `zeta`; below 1 responds faster at the cost
    /// of overshoot.
    pub fn with_damping(ref_scale: f64, tau: f64, zeta: f64) -> Self {
        let alpha = 0.25 / (zeta * zeta);
        let k1 = 1.273239545 / (tau * (1.0 + alpha));
        let k2 = alpha * k1 * k1;
        let fw_gain = SUBNS_PER_SEC as f64 * USEC_PER_SEC as f64 * ref_scale
            / (1u128 << Self::SCALE) as f64;

        Self {
            kp: wide::round_u64(k1 / fw_gain),
            ki: wide::round_u64(k2 / fw_gain),
            kf: wide::round_u64(1.0 / (SUBNS_PER_USEC as f64 * ref_scale)),
            ymax: slew_limit(ref_scale),
        }
    }

    pub fn is_ok(&self) -> bool {
        gain_ok(self.kp) && gain_ok(self.ki) && gain_ok(self.kf) && gain_ok(self.ymax)
    }

    pub fn validate(self) -> Result<Self, CoeffError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(CoeffError)
        }
    }
}

/// Proportional-integral controller.
///
/// The integrator only includes samples up to the previous update, so the
/// first output after a reset or [`set_coeff`](`Self::set_coeff`) is purely
/// proportional.
#[derive(Debug, Clone)]
pub struct ControllerPI {
    coeff: CoeffPI,
    accum: i128,
}

impl ControllerPI {
    pub fn new(coeff: CoeffPI) -> Self {
        let mut this = Self { coeff, accum: 0 };
        this.set_coeff(coeff);
        this
    }

    /// Switch to new gains. Clears the integrator.
    pub fn set_coeff(&mut self, coeff: CoeffPI) {
        if !coeff.is_ok() {
            log::error!("ControllerPI: bad config {:?}", coeff);
        }
        self.coeff = coeff;
        self.accum = 0;
    }

    pub fn coeff(&self) -> CoeffPI {
        self.coeff
    }

    /// Current integrator contribution to the output, in LSB
    pub fn integral(&self) -> i64 {
        wide::wide_output(self.accum, CoeffPI::SCALE)
    }
}

impl Filter for ControllerPI {
    fn reset(&mut self) {
        self.accum = 0;
    }

    fn rate(&mut self, delta_subns: i64, elapsed_usec: u32) {
        let delta = delta_subns.clamp(-SLEW_MAX_IN, SLEW_MAX_IN) as i128;
        let rate = delta * self.coeff.kf as i128 / elapsed_usec.max(1) as i128;
        let rate = wide::clamp_scaled(rate, self.coeff.ymax, 0);
        self.accum = wide::clamp_scaled(
            self.accum + (rate << CoeffPI::SCALE),
            self.coeff.ymax,
            CoeffPI::SCALE,
        );
    }

    fn update(&mut self, sample: Option<i64>, elapsed_usec: u32) -> Option<i64> {
        let delta = sample?.clamp(-SLEW_MAX_IN, SLEW_MAX_IN) as i128;

        let delta_p = delta * self.coeff.kp as i128 * USEC_PER_SEC as i128;
        let delta_i = delta * self.coeff.ki as i128 * elapsed_usec as i128;

        let ysum = wide::clamp_scaled(self.accum + delta_p, self.coeff.ymax, CoeffPI::SCALE);
        self.accum = wide::clamp_scaled(self.accum + delta_i, self.coeff.ymax, CoeffPI::SCALE);

        Some(wide::wide_output(ysum, CoeffPI::SCALE))
    }

    fn saturated(&mut self, applied: i64) {
        self.accum = wide::clamp_scaled(self.accum, applied.unsigned_abs(), CoeffPI::SCALE);
    }
}
