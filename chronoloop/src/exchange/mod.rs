//! Delay request-response exchange state machines
//!
//! A [`SlaveExchange`] turns the four timestamps of one Sync, Follow_Up,
//! Delay_Req and Delay_Resp cycle into a [`Measurement`]. A
//! [`MasterExchange`] is the originating side and only produces messages.
//!
//! Neither side performs I/O. Every handler returns an
//! [`ExchangeActionIterator`] describing what the caller should send, and the
//! caller hands transmit timestamps back once the hardware reports them.

use arrayvec::ArrayVec;
use getset::CopyGetters;

use crate::{
    datastructures::common::{PortIdentity, TimeInterval},
    time::TimeValue,
};

macro_rules! actions {
    [] => {
        {
            crate::exchange::ExchangeActionIterator::from(::arrayvec::ArrayVec::new())
        }
    };
    [$action:expr] => {
        {
            let mut list = ::arrayvec::ArrayVec::new();
            list.push($action);
            crate::exchange::ExchangeActionIterator::from(list)
        }
    };
}

mod master;
mod slave;

pub use master::MasterExchange;
pub use slave::{ExchangeState, SlaveExchange};

/// An action the exchange needs the caller to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ExchangeAction {
    /// Send a Sync. Its transmit timestamp must be handed back with
    /// [`MasterExchange::handle_send_timestamp`] when `two_step` is set.
    SendSync {
        sequence_id: u16,
        origin: TimeValue,
        two_step: bool,
    },
    /// Send the Follow_Up carrying the precise transmit time of a Sync
    SendFollowUp {
        sequence_id: u16,
        precise_origin: TimeValue,
    },
    /// Send a Delay_Req. Its transmit timestamp must be handed back with
    /// [`SlaveExchange::handle_send_timestamp`].
    SendDelayReq { sequence_id: u16 },
    /// Answer a Delay_Req
    SendDelayResp {
        sequence_id: u16,
        receive: TimeValue,
        correction: TimeInterval,
        requester: PortIdentity,
    },
    /// A complete exchange produced a sample
    Measurement(Measurement),
}

/// Iterator over the actions returned by an exchange handler
#[derive(Debug)]
#[must_use]
pub struct ExchangeActionIterator {
    internal: arrayvec::IntoIter<ExchangeAction, 2>,
}

impl ExchangeActionIterator {
    /// Get an empty Iterator
    pub fn empty() -> Self {
        Self {
            internal: ArrayVec::new().into_iter(),
        }
    }
}

impl From<ArrayVec<ExchangeAction, 2>> for ExchangeActionIterator {
    fn from(value: ArrayVec<ExchangeAction, 2>) -> Self {
        Self {
            internal: value.into_iter(),
        }
    }
}

impl Iterator for ExchangeActionIterator {
    type Item = ExchangeAction;

    fn next(&mut self) -> Option<Self::Item> {
        self.internal.next()
    }
}

/// The result of one complete exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Measurement {
    /// Sequence id shared by all four messages
    sequence_id: u16,
    /// Master transmit time of the Sync
    t1: TimeValue,
    /// Local receive time of the Sync
    t2: TimeValue,
    /// Local transmit time of the Delay_Req
    t3: TimeValue,
    /// Master receive time of the Delay_Req
    t4: TimeValue,
    /// Local clock minus master clock, after asymmetry correction
    offset: TimeValue,
    /// Mean path delay, never negative
    path_delay: TimeValue,
    /// Mean path delay before clamping
    raw_path_delay: TimeValue,
}

impl Measurement {
    pub(crate) fn new(
        sequence_id: u16,
        [t1, t2, t3, t4]: [TimeValue; 4],
        delay_asymmetry: TimeValue,
    ) -> Self {
        let master_to_slave = t2 - t1;
        let slave_to_master = t4 - t3;

        let offset = (master_to_slave - slave_to_master) / 2 - delay_asymmetry;
        let raw_path_delay = (master_to_slave + slave_to_master) / 2;

        Self {
            sequence_id,
            t1,
            t2,
            t3,
            t4,
            offset,
            path_delay: raw_path_delay.max(TimeValue::ZERO),
            raw_path_delay,
        }
    }
}

/// Counters kept by an exchange for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct ExchangeStats {
    /// Exchanges that produced a measurement
    completed: u32,
    /// Exchanges abandoned because they took too long
    timed_out: u32,
    /// Exchanges abandoned because of a sequence mismatch or duplicate
    reset: u32,
    /// Messages handled by the master side
    sent: u32,
}

impl ExchangeStats {
    pub(crate) fn record_completed(&mut self) {
        self.completed = self.completed.wrapping_add(1);
    }

    pub(crate) fn record_timeout(&mut self) {
        self.timed_out = self.timed_out.wrapping_add(1);
    }

    pub(crate) fn record_reset(&mut self) {
        self.reset = self.reset.wrapping_add(1);
    }

    pub(crate) fn record_sent(&mut self) {
        self.sent = self.sent.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_delay_from_timestamps() {
        let timestamps = [1000, 1500, 2000, 2300].map(TimeValue::from_nanos);
        let measurement = Measurement::new(1, timestamps, TimeValue::ZERO);

        assert_eq!(measurement.offset(), TimeValue::from_nanos(100));
        assert_eq!(measurement.path_delay(), TimeValue::from_nanos(400));
        assert_eq!(measurement.raw_path_delay(), TimeValue::from_nanos(400));
    }

    #[test]
    fn negative_delay_is_clamped_but_offset_is_not() {
        // receive before send in both directions, as seen with skewed clocks
        let timestamps = [1000, 900, 2000, 1800].map(TimeValue::from_nanos);
        let measurement = Measurement::new(1, timestamps, TimeValue::ZERO);

        assert_eq!(measurement.raw_path_delay(), TimeValue::from_nanos(-150));
        assert_eq!(measurement.path_delay(), TimeValue::ZERO);
        assert_eq!(measurement.offset(), TimeValue::from_nanos(50));
    }

    #[test]
    fn asymmetry_shifts_offset() {
        let timestamps = [1000, 1500, 2000, 2300].map(TimeValue::from_nanos);
        let measurement = Measurement::new(1, timestamps, TimeValue::from_nanos(30));

        assert_eq!(measurement.offset(), TimeValue::from_nanos(70));
        assert_eq!(measurement.path_delay(), TimeValue::from_nanos(400));
    }
}
