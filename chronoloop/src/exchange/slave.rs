use super::{ExchangeAction, ExchangeActionIterator, ExchangeStats, Measurement};
use crate::{
    config::{ExchangeConfig, PortIdentity},
    datastructures::messages::Header,
    time::TimeValue,
};

/// Progress of the exchange currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Waiting for a Sync
    Idle,
    /// Two-step Sync received, waiting for its Follow_Up
    AwaitFollowUp {
        id: u16,
        t2: TimeValue,
        started: Option<TimeValue>,
    },
    /// Delay_Req sent, waiting for its transmit timestamp and the Delay_Resp
    AwaitDelayResp {
        id: u16,
        t1: TimeValue,
        t2: TimeValue,
        t3: Option<TimeValue>,
        t4: Option<TimeValue>,
        started: Option<TimeValue>,
    },
}

/// The slave side of the delay request-response exchange.
///
/// Protocol problems (duplicates, sequence mismatches, timeouts) never
/// surface as errors. They abandon the exchange in flight, which only lowers
/// the rate at which measurements come out.
#[derive(Debug)]
pub struct SlaveExchange {
    config: ExchangeConfig,
    state: ExchangeState,
    stats: ExchangeStats,
}

impl SlaveExchange {
    pub fn new(config: ExchangeConfig) -> Self {
        Self {
            config,
            state: ExchangeState::Idle,
            stats: ExchangeStats::default(),
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    pub fn port_identity(&self) -> PortIdentity {
        self.config.port_identity
    }

    /// Abandon the exchange in flight
    pub fn reset(&mut self) {
        if self.state != ExchangeState::Idle {
            self.stats.record_reset();
        }
        self.state = ExchangeState::Idle;
    }

    /// Advance the timeout of the exchange in flight.
    ///
    /// The timeout counts from the first poll that sees an exchange in
    /// flight, so `now` only needs to be monotonic, not related to the clock
    /// being disciplined. Returns true when an exchange was abandoned.
    pub fn poll(&mut self, now: TimeValue) -> bool {
        let started = match &mut self.state {
            ExchangeState::Idle => return false,
            ExchangeState::AwaitFollowUp { started, .. }
            | ExchangeState::AwaitDelayResp { started, .. } => started,
        };

        match *started {
            None => {
                *started = Some(now);
                false
            }
            Some(start) if now - start > self.config.timeout => {
                log::debug!("Exchange timed out in state {:?}", self.state);
                self.stats.record_timeout();
                self.state = ExchangeState::Idle;
                true
            }
            Some(_) => false,
        }
    }

    /// Handle a received Sync.
    ///
    /// `origin` is the timestamp from the message body, `recv_time` the local
    /// hardware receive timestamp.
    pub fn handle_sync(
        &mut self,
        header: &Header,
        origin: TimeValue,
        recv_time: TimeValue,
    ) -> ExchangeActionIterator {
        log::debug!("Received sync {:?}", header.sequence_id);

        let in_flight = match self.state {
            ExchangeState::Idle => None,
            ExchangeState::AwaitFollowUp { id, .. } | ExchangeState::AwaitDelayResp { id, .. } => {
                Some(id)
            }
        };

        match in_flight {
            Some(id) if id == header.sequence_id => {
                log::warn!("Duplicate sync message");
                self.reset();
                return actions![];
            }
            Some(id) => {
                log::debug!("Sync {} replaces unfinished exchange {}", header.sequence_id, id);
                self.reset();
            }
            None => {}
        }

        // substracting correction from recv time is equivalent to adding it to send
        // time
        let t2 = recv_time - TimeValue::from(header.correction_field);

        if header.two_step_flag {
            self.state = ExchangeState::AwaitFollowUp {
                id: header.sequence_id,
                t2,
                started: None,
            };
            actions![]
        } else {
            self.start_delay_request(header.sequence_id, origin, t2)
        }
    }

    /// Handle a received Follow_Up carrying the precise origin timestamp
    pub fn handle_follow_up(
        &mut self,
        header: &Header,
        precise_origin: TimeValue,
    ) -> ExchangeActionIterator {
        log::debug!("Received FollowUp {:?}", header.sequence_id);

        match self.state {
            ExchangeState::AwaitFollowUp { id, t2, .. } if id == header.sequence_id => {
                let t1 = precise_origin + TimeValue::from(header.correction_field);
                self.start_delay_request(id, t1, t2)
            }
            ExchangeState::AwaitFollowUp { id, .. } => {
                log::warn!(
                    "FollowUp {} does not match sync {}, abandoning exchange",
                    header.sequence_id,
                    id
                );
                self.reset();
                actions![]
            }
            ExchangeState::AwaitDelayResp { id, .. } if id == header.sequence_id => {
                log::warn!("Duplicate FollowUp message");
                self.reset();
                actions![]
            }
            _ => {
                log::debug!("Ignoring unexpected FollowUp");
                actions![]
            }
        }
    }

    /// Hand back the transmit timestamp of a Delay_Req we were asked to send
    pub fn handle_send_timestamp(&mut self, id: u16, send_time: TimeValue) -> ExchangeActionIterator {
        match self.state {
            ExchangeState::AwaitDelayResp {
                id: current,
                t3: Some(_),
                ..
            } if current == id => {
                log::error!("Double send timestamp for delay request");
                actions![]
            }
            ExchangeState::AwaitDelayResp {
                id: current,
                ref mut t3,
                ..
            } if current == id => {
                *t3 = Some(send_time);
                self.try_complete()
            }
            _ => {
                log::warn!("Late timestamp for delay request ignored");
                actions![]
            }
        }
    }

    /// Handle a received Delay_Resp
    pub fn handle_delay_resp(
        &mut self,
        header: &Header,
        receive: TimeValue,
        requester: PortIdentity,
    ) -> ExchangeActionIterator {
        if requester != self.config.port_identity {
            return actions![];
        }

        log::debug!("Received DelayResp {:?}", header.sequence_id);

        match self.state {
            ExchangeState::AwaitDelayResp {
                id, t4: Some(_), ..
            } if id == header.sequence_id => {
                log::warn!("Duplicate DelayResp message");
                self.reset();
                actions![]
            }
            ExchangeState::AwaitDelayResp { id, ref mut t4, .. } if id == header.sequence_id => {
                *t4 = Some(receive - TimeValue::from(header.correction_field));
                self.try_complete()
            }
            ExchangeState::AwaitDelayResp { id, .. } => {
                log::warn!(
                    "DelayResp {} does not match request {}, abandoning exchange",
                    header.sequence_id,
                    id
                );
                self.reset();
                actions![]
            }
            _ => {
                log::debug!("Ignoring unexpected DelayResp");
                actions![]
            }
        }
    }

    fn start_delay_request(&mut self, id: u16, t1: TimeValue, t2: TimeValue) -> ExchangeActionIterator {
        self.state = ExchangeState::AwaitDelayResp {
            id,
            t1,
            t2,
            t3: None,
            t4: None,
            started: None,
        };
        actions![ExchangeAction::SendDelayReq { sequence_id: id }]
    }

    fn try_complete(&mut self) -> ExchangeActionIterator {
        match self.state {
            ExchangeState::AwaitDelayResp {
                id,
                t1,
                t2,
                t3: Some(t3),
                t4: Some(t4),
                ..
            } => {
                let measurement = Measurement::new(id, [t1, t2, t3, t4], self.config.delay_asymmetry);
                log::debug!(
                    "Exchange {} complete: offset {}, delay {}",
                    id,
                    measurement.offset(),
                    measurement.path_delay()
                );
                self.stats.record_completed();
                self.state = ExchangeState::Idle;
                actions![ExchangeAction::Measurement(measurement)]
            }
            _ => actions![],
        }
    }
}
