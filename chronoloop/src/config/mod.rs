//! Configuration structures for the exchange and tracking layers
//!
//! These are plain data. Integrators fill them in once at startup, typically
//! from their own configuration file format.

mod exchange;
mod tracking;

pub use exchange::{ExchangeConfig, MasterConfig};
pub use tracking::SwitchPolicy;

pub use crate::datastructures::common::{ClockIdentity, PortIdentity};
