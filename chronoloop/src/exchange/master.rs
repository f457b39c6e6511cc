use super::{ExchangeAction, ExchangeActionIterator, ExchangeStats};
use crate::{
    config::{MasterConfig, PortIdentity},
    datastructures::messages::Header,
    time::TimeValue,
};

/// The master side of the delay request-response exchange.
///
/// It originates Sync (and in two-step mode Follow_Up) messages and answers
/// Delay_Req messages. It keeps no per-slave state.
#[derive(Debug)]
pub struct MasterExchange {
    config: MasterConfig,
    sync_sequence_id: u16,
    pending_follow_up: Option<u16>,
    stats: ExchangeStats,
}

impl MasterExchange {
    pub fn new(config: MasterConfig) -> Self {
        Self {
            config,
            sync_sequence_id: 0,
            pending_follow_up: None,
            stats: ExchangeStats::default(),
        }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn port_identity(&self) -> PortIdentity {
        self.config.port_identity
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    /// Start a new cycle by sending a Sync.
    ///
    /// `now` is the current time of the master clock. In one-step mode it has
    /// to be the time the message leaves the wire, so one-step only suits
    /// hardware that patches the timestamp in flight.
    pub fn send_sync(&mut self, now: TimeValue) -> ExchangeActionIterator {
        let sequence_id = self.sync_sequence_id;
        self.sync_sequence_id = self.sync_sequence_id.wrapping_add(1);

        if self.config.two_step {
            if let Some(id) = self.pending_follow_up {
                log::warn!("No transmit timestamp for sync {}, skipping its follow up", id);
            }
            self.pending_follow_up = Some(sequence_id);
        }

        self.stats.record_sent();
        actions![ExchangeAction::SendSync {
            sequence_id,
            origin: now,
            two_step: self.config.two_step,
        }]
    }

    /// Hand back the transmit timestamp of a Sync
    pub fn handle_send_timestamp(&mut self, id: u16, send_time: TimeValue) -> ExchangeActionIterator {
        match self.pending_follow_up {
            Some(pending) if pending == id => {
                self.pending_follow_up = None;
                self.stats.record_sent();
                actions![ExchangeAction::SendFollowUp {
                    sequence_id: id,
                    precise_origin: send_time,
                }]
            }
            _ => {
                log::debug!("Ignoring send timestamp for sync {}", id);
                actions![]
            }
        }
    }

    /// Answer a Delay_Req received at `recv_time`
    pub fn handle_delay_req(&mut self, header: &Header, recv_time: TimeValue) -> ExchangeActionIterator {
        log::debug!("Received DelayReq {:?}", header.sequence_id);

        self.stats.record_sent();
        actions![ExchangeAction::SendDelayResp {
            sequence_id: header.sequence_id,
            receive: recv_time,
            correction: header.correction_field,
            requester: header.source_port_identity,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ClockIdentity, time::Interval};

    fn master(two_step: bool) -> MasterExchange {
        MasterExchange::new(MasterConfig {
            port_identity: PortIdentity {
                clock_identity: ClockIdentity([2; 8]),
                port_number: 1,
            },
            sync_interval: Interval::ONE_SECOND,
            two_step,
        })
    }

    #[test]
    fn two_step_sync_is_followed_up() {
        let mut master = master(true);

        let actions: arrayvec::ArrayVec<_, 2> = master.send_sync(TimeValue::from_secs(1)).collect();
        assert_eq!(
            actions.as_slice(),
            &[ExchangeAction::SendSync {
                sequence_id: 0,
                origin: TimeValue::from_secs(1),
                two_step: true,
            }]
        );

        let precise = TimeValue::new(1, 20);
        let mut actions = master.handle_send_timestamp(0, precise);
        assert_eq!(
            actions.next(),
            Some(ExchangeAction::SendFollowUp {
                sequence_id: 0,
                precise_origin: precise,
            })
        );
        assert!(actions.next().is_none());

        // only one follow up per sync
        assert!(master.handle_send_timestamp(0, precise).next().is_none());
    }

    #[test]
    fn one_step_sync_needs_no_timestamp() {
        let mut master = master(false);

        let _ = master.send_sync(TimeValue::ZERO);
        assert!(master.handle_send_timestamp(0, TimeValue::ZERO).next().is_none());

        match master.send_sync(TimeValue::ZERO).next() {
            Some(ExchangeAction::SendSync {
                sequence_id: 1,
                two_step: false,
                ..
            }) => {}
            action => panic!("Unexpected action {action:?}"),
        }
    }

    #[test]
    fn delay_req_is_answered() {
        let mut master = master(true);

        let requester = PortIdentity {
            clock_identity: ClockIdentity([7; 8]),
            port_number: 3,
        };
        let mut header = Header::new(requester);
        header.sequence_id = 42;

        let mut actions = master.handle_delay_req(&header, TimeValue::new(5, 5));
        assert_eq!(
            actions.next(),
            Some(ExchangeAction::SendDelayResp {
                sequence_id: 42,
                receive: TimeValue::new(5, 5),
                correction: header.correction_field,
                requester,
            })
        );
    }
}
