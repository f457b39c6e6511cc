use core::ops::{Deref, DerefMut};

use az::Cast;
use fixed::types::I48F16;

use crate::{
    datastructures::{read_array, write_slice, WireFormat, WireFormatError},
    time::TimeValue,
};

/// The header correction field: signed nanoseconds with a 16-bit fraction.
///
/// The fraction has the same resolution as the sub-nanosecond part of
/// [`TimeValue`], so conversions between the two are exact within range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeInterval(pub I48F16);

impl Deref for TimeInterval {
    type Target = I48F16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for TimeInterval {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl WireFormat for TimeInterval {
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        write_slice(buffer, 0, 8)?.copy_from_slice(&self.0.to_bits().to_be_bytes());
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        Ok(Self(I48F16::from_bits(i64::from_be_bytes(read_array(
            buffer, 0,
        )?))))
    }
}

impl From<TimeValue> for TimeInterval {
    /// Saturates outside of roughly ±1.6 days.
    fn from(value: TimeValue) -> Self {
        TimeInterval(I48F16::from_bits(value.delta_subns()))
    }
}

impl From<TimeInterval> for TimeValue {
    fn from(interval: TimeInterval) -> Self {
        TimeValue::from_subns(interval.0.to_bits())
    }
}

impl TimeInterval {
    pub const ZERO: Self = TimeInterval(I48F16::ZERO);

    pub fn to_nanos(self) -> f64 {
        self.0.cast()
    }
}
