//! Chronoloop turns raw timestamps of a PTP-style delay request-response
//! exchange into corrections for a local clock. It is meant for small
//! targets: it never allocates, never blocks, and runs without the standard
//! library.
//!
//! # Pipeline
//! Hardware timestamps are latched in interrupt context and handed to the
//! poll loop through a [`TimestampHandoff`](`handoff::TimestampHandoff`). A
//! [`SlaveExchange`](`exchange::SlaveExchange`) combines them with the
//! timestamps carried in Sync, Follow_Up and Delay_Resp messages into a
//! [`Measurement`](`exchange::Measurement`) of the offset to the master.
//! The [`TrackingController`](`tracking::TrackingController`) removes large
//! offsets with phase jumps and small ones with rate trims computed by a
//! chain of [`filters`].
//!
//! # Device interfaces
//! The clock being disciplined is reached through the [`TrackingClock`]
//! trait. Moving bytes between the network and a
//! [`SlaveClient`](`client::SlaveClient`) or
//! [`MasterClient`](`client::MasterClient`) is up to the integrating
//! application, as is latching the counter on receive and transmit.
//!
//! # Features
//! * `std` (default): implements `std::error::Error` for the error types
//! * `fuzz`: exposes the message codec to the fuzzer
#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod client;
pub mod clock;
pub mod config;
pub(crate) mod datastructures;
pub mod exchange;
pub mod filters;
mod float_polyfill;
pub mod handoff;
pub mod time;
pub mod tracking;

pub use clock::TrackingClock;
pub use datastructures::{
    common::{TimeInterval, WireTimestamp},
    messages::{Header, Message, MessageBody, MessageType, MAX_DATA_LEN},
    WireFormatError,
};
pub use time::TimeValue;

#[cfg(feature = "fuzz")]
pub mod fuzz {
    pub use crate::datastructures::messages::FuzzMessage;
}
