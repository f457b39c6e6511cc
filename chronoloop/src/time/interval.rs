#[allow(unused_imports)]
use crate::float_polyfill::FloatPolyfill;
use crate::time::{TimeValue, SUBNS_PER_SEC};

/// Message pacing expressed as log2 seconds, the way the header's
/// log message interval field carries it.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Interval(i8);

impl core::fmt::Debug for Interval {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interval")
            .field("seconds", &self.seconds())
            .field("log_base_2", &self.0)
            .finish()
    }
}

impl Interval {
    /// An Interval of one second
    pub const ONE_SECOND: Self = Self(0);

    /// Construct an [`Interval`] from log2 seconds.
    ///
    /// # Example
    /// ```
    /// # use chronoloop::time::{Interval, TimeValue};
    /// assert_eq!(Interval::from_log_2(2).as_time_value(), TimeValue::from_secs(4));
    /// assert_eq!(Interval::from_log_2(-2).as_time_value(), TimeValue::from_millis(250));
    /// ```
    pub const fn from_log_2(log_2: i8) -> Self {
        Self(log_2)
    }

    /// Turn `self` into a number of seconds as [`f64`]
    pub fn seconds(self) -> f64 {
        2.0f64.powi(self.0 as i32)
    }

    /// Exact length of this interval. Intervals beyond 2^62 seconds saturate.
    pub fn as_time_value(self) -> TimeValue {
        match self.0 {
            n if n >= 62 => TimeValue::from_secs(1 << 62),
            n if n >= 0 => TimeValue::from_secs(1 << n),
            n => TimeValue::from_subns(SUBNS_PER_SEC as i64 >> n.unsigned_abs().min(46)),
        }
    }

    /// Get the log2 of the numbers of seconds of this [`Interval`]
    pub fn as_log_2(self) -> i8 {
        self.0
    }
}

impl From<i8> for Interval {
    fn from(value: i8) -> Self {
        Self::from_log_2(value)
    }
}
