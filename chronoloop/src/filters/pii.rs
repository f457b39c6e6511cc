use super::{gain_ok, slew_limit, wide, CoeffError, Filter, SLEW_MAX_IN};
use crate::time::{SUBNS_PER_SEC, SUBNS_PER_USEC, USEC_PER_SEC};

/// Gains of a [`ControllerPII`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoeffPII {
    pub kp: u64,
    pub ki: u64,
    /// Gain of the second integrator relative to the first, 0.64 fixed point
    /// per microsecond
    pub kr: u64,
    pub kf: u64,
    pub ymax: u64,
}

impl CoeffPII {
    /// Fixed-point scale of `kp`, `ki` and both accumulators
    pub const SCALE: u32 = 70;
    /// Fixed-point scale of `kr`
    pub const RSCALE: u32 = 64;

    /// Critically damped third order loop with time constant `tau` seconds
    pub fn new(ref_scale: f64, tau: f64) -> Self {
        let k1 = 0.830373616 / tau;
        let k2 = 4.0 / 9.0 * k1 * k1;
        let k3 = 2.0 / 27.0 * k1 * k1 * k1;
        let fw_gain = SUBNS_PER_SEC as f64 * USEC_PER_SEC as f64 * ref_scale
            / (1u128 << Self::SCALE) as f64;

        Self {
            kp: wide::round_u64(k1 / fw_gain),
            ki: wide::round_u64(k2 / fw_gain),
            kr: wide::round_u64(k3 / k2 * (1u128 << Self::RSCALE) as f64 / USEC_PER_SEC as f64),
            kf: wide::round_u64(1.0 / (SUBNS_PER_USEC as f64 * ref_scale)),
            ymax: slew_limit(ref_scale),
        }
    }

    pub fn is_ok(&self) -> bool {
        [self.kp, self.ki, self.kr, self.kf, self.ymax]
            .into_iter()
            .all(gain_ok)
    }

    pub fn validate(self) -> Result<Self, CoeffError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(CoeffError)
        }
    }
}

/// Proportional controller with two cascaded integrators.
///
/// The second integrator removes the steady-state error of a clock whose
/// frequency drifts linearly, at the cost of a slower settling than
/// [`ControllerPI`](`super::ControllerPI`).
#[derive(Debug, Clone)]
pub struct ControllerPII {
    coeff: CoeffPII,
    accum1: i128,
    accum2: i128,
}

impl ControllerPII {
    pub fn new(coeff: CoeffPII) -> Self {
        let mut this = Self {
            coeff,
            accum1: 0,
            accum2: 0,
        };
        this.set_coeff(coeff);
        this
    }

    /// Switch to new gains. Clears both integrators.
    pub fn set_coeff(&mut self, coeff: CoeffPII) {
        if !coeff.is_ok() {
            log::error!("ControllerPII: bad config {:?}", coeff);
        }
        self.coeff = coeff;
        self.accum1 = 0;
        self.accum2 = 0;
    }

    pub fn coeff(&self) -> CoeffPII {
        self.coeff
    }

    /// Combined integrator contribution to the output, in LSB
    pub fn integral(&self) -> i64 {
        wide::wide_output(self.accum1 + self.accum2, CoeffPII::SCALE)
    }

    fn clamp(&self, value: i128) -> i128 {
        wide::clamp_scaled(value, self.coeff.ymax, CoeffPII::SCALE)
    }
}

impl Filter for ControllerPII {
    fn reset(&mut self) {
        self.accum1 = 0;
        self.accum2 = 0;
    }

    fn rate(&mut self, delta_subns: i64, elapsed_usec: u32) {
        let delta = delta_subns.clamp(-SLEW_MAX_IN, SLEW_MAX_IN) as i128;
        let rate = delta * self.coeff.kf as i128 / elapsed_usec.max(1) as i128;
        let rate = wide::clamp_scaled(rate, self.coeff.ymax, 0);
        self.accum2 = self.clamp(self.accum2 + (rate << CoeffPII::SCALE));
    }

    fn update(&mut self, sample: Option<i64>, elapsed_usec: u32) -> Option<i64> {
        let delta = sample?.clamp(-SLEW_MAX_IN, SLEW_MAX_IN) as i128;

        let delta_p = delta * self.coeff.kp as i128 * USEC_PER_SEC as i128;
        let delta_i = delta * self.coeff.ki as i128 * elapsed_usec as i128;

        self.accum1 = self.clamp(self.accum1 + delta_i);
        let delta_r = wide::mul_shr(self.accum1, self.coeff.kr, CoeffPII::RSCALE)
            .saturating_mul(elapsed_usec as i128);
        self.accum2 = self.clamp(self.accum2.saturating_add(delta_r));

        let ysum = self.clamp(self.accum2 + self.accum1 + delta_p);
        Some(wide::wide_output(ysum, CoeffPII::SCALE))
    }

    fn saturated(&mut self, applied: i64) {
        let limit = applied.unsigned_abs();
        self.accum1 = wide::clamp_scaled(self.accum1, limit, CoeffPII::SCALE);
        self.accum2 = wide::clamp_scaled(self.accum2, limit, CoeffPII::SCALE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_plant::{closed_loop, REF_SCALE};

    #[test]
    fn coefficients() {
        let coeff = CoeffPII::new(REF_SCALE, 5.0);
        assert!(coeff.is_ok());
        assert!(coeff.kp > coeff.ki);
        assert!(CoeffPII::new(1e-3, 5.0).validate().is_err());
    }

    #[test]
    fn constant_offset_is_removed() {
        let mut controller = ControllerPII::new(CoeffPII::new(REF_SCALE, 5.0));
        let worst = closed_loop(&mut controller, 1000.0, 0.0, 300, 1_000_000);
        assert!(worst < 1e-9, "{worst}");
    }

    #[test]
    fn frequency_offset_is_removed() {
        let mut controller = ControllerPII::new(CoeffPII::new(REF_SCALE, 5.0));
        let worst = closed_loop(&mut controller, 0.0, 100.0, 200, 1_000_000);
        assert!(worst < 1e-9, "{worst}");
    }

    #[test]
    fn drifting_frequency_is_followed() {
        let mut controller = ControllerPII::new(CoeffPII::new(REF_SCALE, 5.0));

        let mut error = 0.0f64;
        let mut worst = 0.0f64;
        for step in 0..200 {
            let delta = (-error * SUBNS_PER_SEC as f64).round() as i64;
            let rate = controller.update(Some(delta), 1_000_000).unwrap();
            // frequency error grows by half a ppb every second
            let drift = 0.5e-9 * step as f64;
            error += rate as f64 * REF_SCALE + drift;
            if step >= 180 {
                worst = worst.max(error.abs());
            }
        }
        assert!(worst < 1e-9, "{worst}");
    }

    #[test]
    fn discarded_sample_keeps_state() {
        let mut controller = ControllerPII::new(CoeffPII::new(REF_SCALE, 5.0));
        let _ = controller.update(Some(65_536_000), 1_000_000);
        let integral = controller.integral();
        assert_eq!(controller.update(None, 1_000_000), None);
        assert_eq!(controller.integral(), integral);
    }

    #[test]
    fn saturation_feedback_limits_both_integrators() {
        let mut controller = ControllerPII::new(CoeffPII::new(REF_SCALE, 5.0));
        for _ in 0..50 {
            let _ = controller.update(Some(-1_000_000_000), 1_000_000);
            controller.saturated(-500);
        }
        assert!(controller.integral().abs() <= 1000);
    }
}
