use core::{
    fmt::{Debug, Display},
    ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign},
};

/// Sub-nanosecond fraction: one nanosecond is split into 2^16 parts
pub const SUBNS_PER_NSEC: u64 = 65_536;
/// Nanoseconds in one second
pub const NSEC_PER_SEC: u64 = 1_000_000_000;
/// Microseconds in one second
pub const USEC_PER_SEC: u64 = 1_000_000;
/// Sub-nanosecond units in one microsecond
pub const SUBNS_PER_USEC: u64 = SUBNS_PER_NSEC * 1_000;
/// Sub-nanosecond units in one millisecond
pub const SUBNS_PER_MSEC: u64 = SUBNS_PER_NSEC * 1_000_000;
/// Sub-nanosecond units in one second
pub const SUBNS_PER_SEC: u64 = SUBNS_PER_NSEC * NSEC_PER_SEC;

/// A signed point in time or difference between two points in time.
///
/// The value is stored as whole seconds plus a sub-second part in units of
/// 1/65536 nanosecond. The sub-second part is always in `[0, 1s)`, so the sign
/// lives entirely in the seconds field: -100ns is `-1s + 999_999_900ns`.
///
/// All arithmetic normalizes its result and saturates at the ends of the
/// seconds range instead of overflowing.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeValue {
    secs: i64,
    subns: u64,
}

fn saturate_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

// Rounds half away from zero
fn div_round(value: i128, divisor: i128) -> i128 {
    let half = divisor / 2;
    if value >= 0 {
        (value + half) / divisor
    } else {
        (value - half) / divisor
    }
}

impl TimeValue {
    /// Zero seconds
    pub const ZERO: Self = Self { secs: 0, subns: 0 };

    /// Exactly one second
    pub const ONE_SECOND: Self = Self { secs: 1, subns: 0 };

    /// The largest representable value
    pub const MAX: Self = Self {
        secs: i64::MAX,
        subns: SUBNS_PER_SEC - 1,
    };

    /// The most negative representable value
    pub const MIN: Self = Self {
        secs: i64::MIN,
        subns: 0,
    };

    /// Create a value from whole seconds and nanoseconds.
    ///
    /// Nanoseconds beyond one second carry into the seconds field.
    /// ```
    /// # use chronoloop::time::TimeValue;
    /// let t = TimeValue::new(1, 1_500_000_000);
    /// assert_eq!(t.secs(), 2);
    /// assert_eq!(t.nanos(), 500_000_000);
    /// ```
    pub const fn new(secs: i64, nanos: u32) -> Self {
        Self::from_parts(secs, nanos as u64 * SUBNS_PER_NSEC)
    }

    /// Create a value from whole seconds and a sub-second part in units of
    /// 1/65536 ns. Out of range sub-second parts carry into the seconds.
    pub const fn from_parts(secs: i64, subns: u64) -> Self {
        Self {
            secs: secs.saturating_add((subns / SUBNS_PER_SEC) as i64),
            subns: subns % SUBNS_PER_SEC,
        }
    }

    /// Create a value from a signed number of sub-nanosecond units
    pub const fn from_subns(subns: i64) -> Self {
        Self {
            secs: subns.div_euclid(SUBNS_PER_SEC as i64),
            subns: subns.rem_euclid(SUBNS_PER_SEC as i64) as u64,
        }
    }

    fn from_total(total: i128) -> Self {
        let secs = total.div_euclid(SUBNS_PER_SEC as i128);
        if secs > i64::MAX as i128 {
            Self::MAX
        } else if secs < i64::MIN as i128 {
            Self::MIN
        } else {
            Self {
                secs: secs as i64,
                subns: total.rem_euclid(SUBNS_PER_SEC as i128) as u64,
            }
        }
    }

    /// Create a value from a signed number of nanoseconds
    pub fn from_nanos(nanos: i64) -> Self {
        Self::from_total(nanos as i128 * SUBNS_PER_NSEC as i128)
    }

    /// Create a value from a signed number of microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self::from_total(micros as i128 * SUBNS_PER_USEC as i128)
    }

    /// Create a value from a signed number of milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self::from_total(millis as i128 * SUBNS_PER_MSEC as i128)
    }

    /// Create a value from a signed number of whole seconds
    pub const fn from_secs(secs: i64) -> Self {
        Self { secs, subns: 0 }
    }

    /// Whole seconds, rounded towards negative infinity
    pub const fn secs(&self) -> i64 {
        self.secs
    }

    /// Nanoseconds within the second, always below one billion
    pub const fn nanos(&self) -> u32 {
        (self.subns / SUBNS_PER_NSEC) as u32
    }

    /// Sub-second part in units of 1/65536 ns
    pub const fn subns(&self) -> u64 {
        self.subns
    }

    /// The part below one nanosecond, in units of 1/65536 ns
    pub const fn subns_fraction(&self) -> u16 {
        (self.subns % SUBNS_PER_NSEC) as u16
    }

    fn total_subns(&self) -> i128 {
        self.secs as i128 * SUBNS_PER_SEC as i128 + self.subns as i128
    }

    /// Total value in sub-nanosecond units, saturating at the i64 range
    /// (about 1.6 days either way).
    pub fn delta_subns(&self) -> i64 {
        saturate_i64(self.total_subns())
    }

    /// Total value in nanoseconds, rounded to nearest with halves away from zero
    pub fn delta_nsec(&self) -> i64 {
        saturate_i64(div_round(self.total_subns(), SUBNS_PER_NSEC as i128))
    }

    /// Total value in microseconds, rounded to nearest with halves away from zero
    pub fn delta_usec(&self) -> i64 {
        saturate_i64(div_round(self.total_subns(), SUBNS_PER_USEC as i128))
    }

    /// Total value in milliseconds, rounded to nearest with halves away from zero
    pub fn delta_msec(&self) -> i64 {
        saturate_i64(div_round(self.total_subns(), SUBNS_PER_MSEC as i128))
    }

    /// Approximate value in seconds as a float, for diagnostics only
    pub fn as_f64(&self) -> f64 {
        self.secs as f64 + self.subns as f64 / SUBNS_PER_SEC as f64
    }

    /// Whether this value lies before zero
    pub const fn is_negative(&self) -> bool {
        self.secs < 0
    }

    /// Magnitude of this value.
    ///
    /// [`TimeValue::MIN`] has no positive counterpart and saturates to
    /// [`TimeValue::MAX`].
    pub fn abs(self) -> Self {
        if self.is_negative() {
            -self
        } else {
            self
        }
    }
}

impl Neg for TimeValue {
    type Output = TimeValue;

    fn neg(self) -> Self::Output {
        if self.subns == 0 {
            match self.secs.checked_neg() {
                Some(secs) => Self { secs, subns: 0 },
                None => Self::MAX,
            }
        } else {
            // -(s + f) = (-s - 1) + (1 - f)
            Self {
                secs: !self.secs,
                subns: SUBNS_PER_SEC - self.subns,
            }
        }
    }
}

impl Add for TimeValue {
    type Output = TimeValue;

    fn add(self, rhs: Self) -> Self::Output {
        let subns = self.subns + rhs.subns;
        let carry = (subns >= SUBNS_PER_SEC) as i64;
        Self {
            secs: self.secs.saturating_add(rhs.secs).saturating_add(carry),
            subns: subns % SUBNS_PER_SEC,
        }
    }
}

impl AddAssign for TimeValue {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for TimeValue {
    type Output = TimeValue;

    fn sub(self, rhs: Self) -> Self::Output {
        let (subns, borrow) = if self.subns >= rhs.subns {
            (self.subns - rhs.subns, 0)
        } else {
            (self.subns + SUBNS_PER_SEC - rhs.subns, 1)
        };
        Self {
            secs: self.secs.saturating_sub(rhs.secs).saturating_sub(borrow),
            subns,
        }
    }
}

impl SubAssign for TimeValue {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<u32> for TimeValue {
    type Output = TimeValue;

    fn mul(self, rhs: u32) -> Self::Output {
        let wide = self.subns as u128 * rhs as u128;
        let carry = (wide / SUBNS_PER_SEC as u128) as i64;
        Self {
            secs: self.secs.saturating_mul(rhs as i64).saturating_add(carry),
            subns: (wide % SUBNS_PER_SEC as u128) as u64,
        }
    }
}

impl Div<u32> for TimeValue {
    type Output = TimeValue;

    /// Division rounding towards negative infinity at sub-nanosecond
    /// resolution.
    ///
    /// # Panics
    /// Panics when dividing by zero, like integer division.
    fn div(self, rhs: u32) -> Self::Output {
        let divisor = rhs as i64;
        let secs = self.secs.div_euclid(divisor);
        let rem = self.secs.rem_euclid(divisor) as u128;
        let subns = (rem * SUBNS_PER_SEC as u128 + self.subns as u128) / rhs as u128;
        Self {
            secs,
            subns: subns as u64,
        }
    }
}

impl Debug for TimeValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimeValue")
            .field("secs", &self.secs)
            .field("nanos", &self.nanos())
            .field("subns_fraction", &self.subns_fraction())
            .finish()
    }
}

impl Display for TimeValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_negative() {
            let magnitude = self.abs();
            write!(f, "-{}.{:09}", magnitude.secs, magnitude.nanos())
        } else {
            write!(f, "{}.{:09}", self.secs, self.nanos())
        }
    }
}
