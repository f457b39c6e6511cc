//! Poll-driven engines tying the pieces together
//!
//! A client owns the exchange state machine, reads timestamp captures from a
//! [`TimestampHandoff`] and serializes outgoing messages into an internal
//! buffer. The integrating application moves bytes between the network and
//! the client and calls [`poll`](`SlaveClient::poll`) regularly. Nothing in
//! here blocks.

use crate::{
    clock::TrackingClock,
    config::{ExchangeConfig, MasterConfig},
    datastructures::messages::{Header, Message, MessageBody, MAX_DATA_LEN},
    exchange::{ExchangeAction, ExchangeActionIterator, MasterExchange, Measurement, SlaveExchange},
    handoff::{CounterTimebase, TimestampHandoff},
    time::TimeValue,
    tracking::{Correction, TrackingController},
};

/// Log interval put in messages that are not sent periodically
const LOG_INTERVAL_UNSPECIFIED: i8 = 0x7f;

/// Slave side: measures the offset to a master and disciplines a clock
#[derive(Debug)]
pub struct SlaveClient<'a, C> {
    exchange: SlaveExchange,
    tracking: TrackingController<'a, C>,
    handoff: &'a TimestampHandoff,
    timebase: CounterTimebase,
    buffer: [u8; MAX_DATA_LEN],
    pending_tx: Option<u16>,
    last_measurement: Option<Measurement>,
    last_correction: Correction,
}

impl<'a, C: TrackingClock> SlaveClient<'a, C> {
    pub fn new(
        config: ExchangeConfig,
        tracking: TrackingController<'a, C>,
        handoff: &'a TimestampHandoff,
        timebase: CounterTimebase,
    ) -> Self {
        Self {
            exchange: SlaveExchange::new(config),
            tracking,
            handoff,
            timebase,
            buffer: [0; MAX_DATA_LEN],
            pending_tx: None,
            last_measurement: None,
            last_correction: Correction::None,
        }
    }

    pub fn exchange(&self) -> &SlaveExchange {
        &self.exchange
    }

    pub fn tracking(&self) -> &TrackingController<'a, C> {
        &self.tracking
    }

    pub fn tracking_mut(&mut self) -> &mut TrackingController<'a, C> {
        &mut self.tracking
    }

    pub fn timebase(&self) -> &CounterTimebase {
        &self.timebase
    }

    pub fn last_measurement(&self) -> Option<Measurement> {
        self.last_measurement
    }

    pub fn last_correction(&self) -> Correction {
        self.last_correction
    }

    /// Handle a received message. The receive capture in the handoff has to
    /// belong to this message.
    ///
    /// Returns a message to send, if any. Its transmit capture is expected
    /// in the handoff before a later [`poll`](`Self::poll`).
    pub fn handle_message(&mut self, data: &[u8]) -> Option<&[u8]> {
        let rx_capture = self.handoff.take_rx();

        let message = match Message::deserialize(data) {
            Ok(message) => message,
            Err(error) => {
                log::debug!("Could not parse message: {:?}", error);
                return None;
            }
        };

        let actions = match message.body {
            MessageBody::Sync(origin) => {
                let Some(ticks) = rx_capture else {
                    log::warn!("Sync {} without receive timestamp", message.header.sequence_id);
                    return None;
                };
                let recv_time = self.timebase.convert(ticks);
                self.exchange
                    .handle_sync(&message.header, origin.into(), recv_time)
            }
            MessageBody::FollowUp(precise_origin) => self
                .exchange
                .handle_follow_up(&message.header, precise_origin.into()),
            MessageBody::DelayResp {
                receive_timestamp,
                requesting_port_identity,
            } => self.exchange.handle_delay_resp(
                &message.header,
                receive_timestamp.into(),
                requesting_port_identity,
            ),
            MessageBody::DelayReq(_) => return None,
        };

        self.handle_actions(actions)
    }

    /// Drain the transmit capture and expire a stale exchange. `now` is any
    /// monotonic time.
    pub fn poll(&mut self, now: TimeValue) {
        if let Some(ticks) = self.handoff.take_tx() {
            match self.pending_tx.take() {
                Some(id) => {
                    let send_time = self.timebase.convert(ticks);
                    let actions = self.exchange.handle_send_timestamp(id, send_time);
                    let _ = self.handle_actions(actions);
                }
                None => log::debug!("Transmit capture without pending message"),
            }
        }

        if self.exchange.poll(now) {
            self.pending_tx = None;
        }
    }

    fn handle_actions(&mut self, actions: ExchangeActionIterator) -> Option<&[u8]> {
        let mut length = None;

        for action in actions {
            match action {
                ExchangeAction::SendDelayReq { sequence_id } => {
                    let mut header = Header::new(self.exchange.port_identity());
                    header.sequence_id = sequence_id;
                    header.log_message_interval = LOG_INTERVAL_UNSPECIFIED;

                    match Message::delay_req(header, TimeValue::ZERO).serialize(&mut self.buffer) {
                        Ok(len) => {
                            // a capture still in the mailbox belongs to an older message
                            let _ = self.handoff.take_tx();
                            self.pending_tx = Some(sequence_id);
                            length = Some(len);
                        }
                        Err(error) => log::error!("Could not serialize delay request: {:?}", error),
                    }
                }
                ExchangeAction::Measurement(measurement) => {
                    self.last_measurement = Some(measurement);
                    self.last_correction = self.tracking.update(measurement.t2(), measurement.offset());
                }
                action => log::warn!("Unexpected action for slave: {:?}", action),
            }
        }

        length.map(|len| &self.buffer[..len])
    }
}

/// Master side: sends Syncs on schedule and answers delay requests
#[derive(Debug)]
pub struct MasterClient<'a> {
    exchange: MasterExchange,
    handoff: &'a TimestampHandoff,
    timebase: CounterTimebase,
    buffer: [u8; MAX_DATA_LEN],
    next_sync: Option<TimeValue>,
    pending_tx: Option<u16>,
}

impl<'a> MasterClient<'a> {
    pub fn new(config: MasterConfig, handoff: &'a TimestampHandoff, timebase: CounterTimebase) -> Self {
        Self {
            exchange: MasterExchange::new(config),
            handoff,
            timebase,
            buffer: [0; MAX_DATA_LEN],
            next_sync: None,
            pending_tx: None,
        }
    }

    pub fn exchange(&self) -> &MasterExchange {
        &self.exchange
    }

    /// Send what is due at master time `now`: a Follow_Up once the transmit
    /// capture of a two-step Sync is available, or the next Sync. Call until
    /// it returns `None`.
    pub fn poll(&mut self, now: TimeValue) -> Option<&[u8]> {
        if let Some(id) = self.pending_tx {
            if let Some(ticks) = self.handoff.take_tx() {
                self.pending_tx = None;
                let send_time = self.timebase.convert(ticks);
                let actions = self.exchange.handle_send_timestamp(id, send_time);
                return self.handle_actions(actions);
            }
        }

        let interval = self.exchange.config().sync_interval.as_time_value();
        let due = self.next_sync.map_or(true, |next| now >= next);
        if !due {
            return None;
        }
        self.next_sync = Some(match self.next_sync {
            // keep the cadence unless we fell behind by a whole interval
            Some(next) if now - next < interval => next + interval,
            _ => now + interval,
        });

        let actions = self.exchange.send_sync(now);
        self.handle_actions(actions)
    }

    /// Handle a received message, returning the answer to send, if any
    pub fn handle_message(&mut self, data: &[u8]) -> Option<&[u8]> {
        let rx_capture = self.handoff.take_rx();

        let message = match Message::deserialize(data) {
            Ok(message) => message,
            Err(error) => {
                log::debug!("Could not parse message: {:?}", error);
                return None;
            }
        };

        match message.body {
            MessageBody::DelayReq(_) => {
                let Some(ticks) = rx_capture else {
                    log::warn!("DelayReq {} without receive timestamp", message.header.sequence_id);
                    return None;
                };
                let recv_time = self.timebase.convert(ticks);
                let actions = self.exchange.handle_delay_req(&message.header, recv_time);
                self.handle_actions(actions)
            }
            _ => None,
        }
    }

    fn handle_actions(&mut self, actions: ExchangeActionIterator) -> Option<&[u8]> {
        let config = *self.exchange.config();
        let mut header = Header::new(config.port_identity);

        let mut message = None;
        for action in actions {
            match action {
                ExchangeAction::SendSync {
                    sequence_id,
                    origin,
                    two_step,
                } => {
                    header.sequence_id = sequence_id;
                    header.two_step_flag = two_step;
                    header.log_message_interval = config.sync_interval.as_log_2();
                    if two_step {
                        let _ = self.handoff.take_tx();
                        self.pending_tx = Some(sequence_id);
                    }
                    message = Some(Message::sync(header, origin));
                }
                ExchangeAction::SendFollowUp {
                    sequence_id,
                    precise_origin,
                } => {
                    header.sequence_id = sequence_id;
                    header.log_message_interval = config.sync_interval.as_log_2();
                    message = Some(Message::follow_up(header, precise_origin));
                }
                ExchangeAction::SendDelayResp {
                    sequence_id,
                    receive,
                    correction,
                    requester,
                } => {
                    header.sequence_id = sequence_id;
                    header.correction_field = correction;
                    header.log_message_interval = LOG_INTERVAL_UNSPECIFIED;
                    message = Some(Message::delay_resp(header, receive, requester));
                }
                action => log::warn!("Unexpected action for master: {:?}", action),
            }
        }

        match message?.serialize(&mut self.buffer) {
            Ok(len) => Some(&self.buffer[..len]),
            Err(error) => {
                log::error!("Could not serialize message: {:?}", error);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::test_clock::FakeClock,
        config::{ClockIdentity, PortIdentity, SwitchPolicy},
        datastructures::messages::MessageType,
        time::Interval,
        tracking::TrackingMode,
    };

    fn identity(id: u8) -> PortIdentity {
        PortIdentity {
            clock_identity: ClockIdentity([id; 8]),
            port_number: 1,
        }
    }

    fn timebase() -> CounterTimebase {
        // one tick per nanosecond
        CounterTimebase::from_frequency(48, 1_000_000_000, TimeValue::ZERO)
    }

    fn message_type(data: &[u8]) -> MessageType {
        Message::deserialize(data).unwrap().message_type()
    }

    #[test]
    fn two_step_cycle_disciplines_slave() {
        let master_handoff = TimestampHandoff::new();
        let slave_handoff = TimestampHandoff::new();

        let mut master = MasterClient::new(
            MasterConfig {
                port_identity: identity(1),
                sync_interval: Interval::ONE_SECOND,
                two_step: true,
            },
            &master_handoff,
            timebase(),
        );

        let tracking = TrackingController::new(
            Some(FakeClock::default()),
            SwitchPolicy {
                slew_threshold: None,
                track_threshold: TimeValue::from_micros(1),
                track_dwell: 4,
            },
        );
        let mut slave = SlaveClient::new(
            ExchangeConfig {
                port_identity: identity(2),
                timeout: TimeValue::ONE_SECOND,
                delay_asymmetry: TimeValue::ZERO,
            },
            tracking,
            &slave_handoff,
            timebase(),
        );

        // slave runs 2us ahead, the link takes 500ns each way
        let t1 = 10_000_000_000u64;
        let sync = master.poll(TimeValue::from_secs(10)).unwrap().to_vec();
        assert_eq!(message_type(&sync), MessageType::Sync);
        assert!(master.poll(TimeValue::from_secs(10)).is_none());

        master_handoff.post_tx(t1);
        slave_handoff.post_rx(t1 + 2500);
        assert!(slave.handle_message(&sync).is_none());

        let follow_up = master.poll(TimeValue::from_secs(10)).unwrap().to_vec();
        assert_eq!(message_type(&follow_up), MessageType::FollowUp);

        let delay_req = slave.handle_message(&follow_up).unwrap().to_vec();
        assert_eq!(message_type(&delay_req), MessageType::DelayReq);

        let t3 = t1 + 100_000;
        slave_handoff.post_tx(t3);
        slave.poll(TimeValue::from_secs(10));

        master_handoff.post_rx(t3 - 2000 + 500);
        let delay_resp = master.handle_message(&delay_req).unwrap().to_vec();
        assert_eq!(message_type(&delay_resp), MessageType::DelayResp);

        assert!(slave.handle_message(&delay_resp).is_none());

        let measurement = slave.last_measurement().unwrap();
        assert_eq!(measurement.offset(), TimeValue::from_micros(2));
        assert_eq!(measurement.path_delay(), TimeValue::from_nanos(500));
        assert_eq!(slave.exchange().stats().completed(), 1);

        assert_eq!(slave.tracking().mode(), TrackingMode::Slewing);
        assert_eq!(
            slave.last_correction(),
            Correction::Step {
                requested: TimeValue::from_micros(-2),
                residual: TimeValue::ZERO,
            }
        );
        assert_eq!(slave.tracking().clock().unwrap().now, TimeValue::from_micros(-2));
    }

    #[test]
    fn one_step_sync_triggers_delay_request() {
        let master_handoff = TimestampHandoff::new();
        let slave_handoff = TimestampHandoff::new();

        let mut master = MasterClient::new(
            MasterConfig {
                port_identity: identity(1),
                sync_interval: Interval::from_log_2(-1),
                two_step: false,
            },
            &master_handoff,
            timebase(),
        );
        let mut slave = SlaveClient::new(
            ExchangeConfig {
                port_identity: identity(2),
                timeout: TimeValue::from_millis(100),
                delay_asymmetry: TimeValue::ZERO,
            },
            TrackingController::<FakeClock>::new(
                None,
                SwitchPolicy {
                    slew_threshold: None,
                    track_threshold: TimeValue::from_micros(1),
                    track_dwell: 1,
                },
            ),
            &slave_handoff,
            timebase(),
        );

        let sync = master.poll(TimeValue::from_secs(1)).unwrap().to_vec();
        slave_handoff.post_rx(1_000_000_000);
        let delay_req = slave.handle_message(&sync).unwrap().to_vec();
        assert_eq!(message_type(&delay_req), MessageType::DelayReq);

        // half a second later the next sync is due
        assert!(master.poll(TimeValue::new(1, 400_000_000)).is_none());
        assert!(master.poll(TimeValue::new(1, 500_000_000)).is_some());

        // no transmit timestamp and no response: the exchange expires
        slave.poll(TimeValue::from_secs(1));
        slave.poll(TimeValue::new(1, 200_000_000));
        assert_eq!(slave.exchange().stats().timed_out(), 1);
    }

    #[test]
    fn garbage_and_missing_timestamps_are_ignored() {
        let handoff = TimestampHandoff::new();
        let mut slave = SlaveClient::new(
            ExchangeConfig {
                port_identity: identity(2),
                timeout: TimeValue::ONE_SECOND,
                delay_asymmetry: TimeValue::ZERO,
            },
            TrackingController::<FakeClock>::new(
                None,
                SwitchPolicy {
                    slew_threshold: None,
                    track_threshold: TimeValue::from_micros(1),
                    track_dwell: 1,
                },
            ),
            &handoff,
            timebase(),
        );

        assert!(slave.handle_message(&[0xff; 3]).is_none());

        let mut header = Header::new(identity(1));
        header.sequence_id = 3;
        let mut buffer = [0; MAX_DATA_LEN];
        let len = Message::sync(header, TimeValue::ZERO)
            .serialize(&mut buffer)
            .unwrap();
        assert!(slave.handle_message(&buffer[..len]).is_none());
        assert_eq!(slave.exchange().stats().completed(), 0);
    }
}
