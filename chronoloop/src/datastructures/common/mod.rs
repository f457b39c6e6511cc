//! Common data structures that are used throughout the protocol

mod port_identity;
mod time_interval;
mod timestamp;

pub use port_identity::{ClockIdentity, PortIdentity};
pub use time_interval::TimeInterval;
pub use timestamp::WireTimestamp;
