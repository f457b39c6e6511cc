//! Time representation used throughout `chronoloop`
//!
//! [`TimeValue`] is both an instant and a signed difference between two
//! instants. It carries 16 bits of sub-nanosecond precision so that servo
//! arithmetic does not lose resolution. [`Interval`] describes message pacing
//! in the log2-seconds form used on the wire.

mod interval;
mod value;

pub use interval::Interval;
pub use value::{
    TimeValue, NSEC_PER_SEC, SUBNS_PER_MSEC, SUBNS_PER_NSEC, SUBNS_PER_SEC, SUBNS_PER_USEC,
    USEC_PER_SEC,
};
