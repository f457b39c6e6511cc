//! Event driven closed-loop run of a master and a slave

use std::{cmp::Reverse, collections::BinaryHeap, fmt::Display};

use chronoloop::{
    client::{MasterClient, SlaveClient},
    clock::TrackingDither,
    filters::{
        AmplitudeReject, BoxcarFilter, CoeffLR, CoeffPI, CoeffPII, ControllerLR, ControllerPI,
        ControllerPII, Filter, MedianFilter,
    },
    handoff::{CounterTimebase, TimestampHandoff},
    time::TimeValue,
    tracking::TrackingController,
    Message,
};
use serde::Serialize;

use crate::{
    clock::{Counter, SimClock, SimulatedClock},
    config::{Config, ConfigError, FilterConfig, MAX_WINDOW},
    link::{Direction, Link},
};

/// Master time at the start of a run
const START: TimeValue = TimeValue::from_secs(1000);

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Summary {
    pub duration: u64,
    pub mode: String,
    /// Slave minus master time at the end
    pub final_offset_ns: f64,
    /// Over the second half of the run
    pub rms_offset_ns: f64,
    /// Largest absolute offset over the second half of the run
    pub max_offset_ns: f64,
    pub path_delay_ns: Option<f64>,
    /// Rate trim in effect at the end, in oscillator LSB
    pub rate: i64,
    pub exchanges_completed: u32,
    pub exchanges_timed_out: u32,
    pub exchanges_reset: u32,
    pub steps: u32,
    pub rate_updates: u32,
    pub saturations: u32,
    pub mode_switches: u32,
    pub packets_sent: u32,
    pub packets_lost: u32,
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "simulated {} s, final mode {}", self.duration, self.mode)?;
        writeln!(
            f,
            "offset: final {:.1} ns, rms {:.1} ns, max {:.1} ns (second half)",
            self.final_offset_ns, self.rms_offset_ns, self.max_offset_ns
        )?;
        if let Some(delay) = self.path_delay_ns {
            writeln!(f, "path delay: {delay:.1} ns")?;
        }
        writeln!(f, "rate trim: {}", self.rate)?;
        writeln!(
            f,
            "exchanges: {} completed, {} timed out, {} reset",
            self.exchanges_completed, self.exchanges_timed_out, self.exchanges_reset
        )?;
        writeln!(
            f,
            "controller: {} steps, {} rate updates, {} saturations, {} mode switches",
            self.steps, self.rate_updates, self.saturations, self.mode_switches
        )?;
        write!(f, "packets: {} sent, {} lost", self.packets_sent, self.packets_lost)
    }
}

/// Run the simulation described by `config`
pub fn run(config: &Config) -> Result<Summary, ConfigError> {
    let start = START + TimeValue::from_nanos(config.clock.initial_offset_ns);
    let oscillator = SimClock::new(&config.clock, start);
    if config.clock.dither {
        run_with(config, TrackingDither::new(oscillator))
    } else {
        run_with(config, oscillator)
    }
}

fn build_filter(filter: FilterConfig, ref_scale: f64) -> Result<Box<dyn Filter>, ConfigError> {
    let filter: Box<dyn Filter> = match filter {
        FilterConfig::Amplitude { tau } => Box::new(AmplitudeReject::new((tau * 1000.0).round() as u32)),
        FilterConfig::Median { window } => {
            let mut median = MedianFilter::<MAX_WINDOW>::new();
            median.set_window(window);
            Box::new(median)
        }
        FilterConfig::Boxcar { window } => {
            let mut boxcar = BoxcarFilter::<MAX_WINDOW>::new();
            boxcar.set_window(window);
            Box::new(boxcar)
        }
        FilterConfig::Lr { window, tau } => {
            let mut lr = ControllerLR::<MAX_WINDOW>::new(CoeffLR::new(ref_scale, tau).validate()?);
            lr.set_window(window);
            Box::new(lr)
        }
        FilterConfig::Pi { tau, damping } => Box::new(ControllerPI::new(
            CoeffPI::with_damping(ref_scale, tau, damping).validate()?,
        )),
        FilterConfig::Pii { tau } => Box::new(ControllerPII::new(CoeffPII::new(ref_scale, tau).validate()?)),
    };
    Ok(filter)
}

#[derive(Debug)]
struct Packet {
    at: TimeValue,
    order: u64,
    to: Direction,
    data: Vec<u8>,
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.order) == (other.at, other.order)
    }
}

impl Eq for Packet {}

impl PartialOrd for Packet {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Packet {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.order).cmp(&(other.at, other.order))
    }
}

/// Packets in flight. Each direction delivers in order.
struct Network {
    link: Link,
    queue: BinaryHeap<Reverse<Packet>>,
    order: u64,
    last_to_slave: TimeValue,
    last_to_master: TimeValue,
}

impl Network {
    fn new(link: Link) -> Self {
        Self {
            link,
            queue: BinaryHeap::new(),
            order: 0,
            last_to_slave: TimeValue::MIN,
            last_to_master: TimeValue::MIN,
        }
    }

    fn send(&mut self, now: TimeValue, to: Direction, data: Vec<u8>) {
        let Some(delay) = self.link.transit(to) else {
            tracing::trace!(?to, "packet lost");
            return;
        };

        let last = match to {
            Direction::ToSlave => &mut self.last_to_slave,
            Direction::ToMaster => &mut self.last_to_master,
        };
        let at = (now + delay).max(*last);
        *last = at;

        self.order += 1;
        self.queue.push(Reverse(Packet {
            at,
            order: self.order,
            to,
            data,
        }));
    }

    fn next_arrival(&self) -> Option<TimeValue> {
        self.queue.peek().map(|Reverse(packet)| packet.at)
    }

    fn pop(&mut self) -> Option<Packet> {
        self.queue.pop().map(|Reverse(packet)| packet)
    }
}

fn is_event(data: &[u8]) -> bool {
    Message::deserialize(data).map_or(false, |message| message.is_event())
}

fn slave_time<C: SimulatedClock>(slave: &SlaveClient<'_, C>, fallback: TimeValue) -> TimeValue {
    slave
        .tracking()
        .clock()
        .map_or(fallback, |clock| clock.clock_now())
}

fn run_with<C: SimulatedClock>(config: &Config, clock: C) -> Result<Summary, ConfigError> {
    let counter = Counter::new(config.clock.counter_hz, config.clock.counter_bits);
    let timebase = CounterTimebase::from_frequency(counter.bits(), counter.hz(), TimeValue::ZERO);

    let ref_scale = config.clock.controller_ref_scale();
    let mut filters = config
        .filters
        .iter()
        .map(|filter| build_filter(*filter, ref_scale))
        .collect::<Result<Vec<_>, _>>()?;
    let master_handoff = TimestampHandoff::new();
    let slave_handoff = TimestampHandoff::new();

    let mut tracking = TrackingController::new(Some(clock), config.switch_policy());
    for filter in filters.iter_mut() {
        tracking.add_filter(filter.as_mut())?;
    }

    let mut master = MasterClient::new(config.master_config(), &master_handoff, timebase.clone());
    let mut slave = SlaveClient::new(config.exchange_config(), tracking, &slave_handoff, timebase);
    let mut network = Network::new(Link::new(config.link.clone(), config.simulation.seed));

    let poll_interval = TimeValue::from_micros(config.simulation.poll_interval_us as i64);
    let end = START + TimeValue::from_secs(config.simulation.duration as i64);

    let mut now = START;
    let mut next_poll = START;
    let mut next_report = START + TimeValue::ONE_SECOND;
    let mut offsets = Vec::new();

    tracing::info!(
        duration = config.simulation.duration,
        filters = config.filters.len(),
        dither = config.clock.dither,
        "starting simulation"
    );

    while now < end {
        let arrival = network.next_arrival().filter(|at| *at <= next_poll);
        let target = arrival.unwrap_or(next_poll);

        if let Some(clock) = slave.tracking_mut().clock_mut() {
            clock.oscillator_mut().advance(target - now);
        }
        now = target;

        if arrival.is_some() {
            let Some(packet) = network.pop() else { break };
            match packet.to {
                Direction::ToSlave => {
                    slave_handoff.post_rx(counter.capture(slave_time(&slave, now)));
                    if let Some(reply) = slave.handle_message(&packet.data) {
                        let reply = reply.to_vec();
                        slave_handoff.post_tx(counter.capture(slave_time(&slave, now)));
                        network.send(now, Direction::ToMaster, reply);
                    }
                }
                Direction::ToMaster => {
                    master_handoff.post_rx(counter.capture(now));
                    if let Some(reply) = master.handle_message(&packet.data) {
                        let reply = reply.to_vec();
                        network.send(now, Direction::ToSlave, reply);
                    }
                }
            }
            continue;
        }

        next_poll += poll_interval;

        while let Some(message) = master.poll(now) {
            let message = message.to_vec();
            if is_event(&message) {
                master_handoff.post_tx(counter.capture(now));
            }
            network.send(now, Direction::ToSlave, message);
        }

        slave.poll(now);
        if let Some(clock) = slave.tracking_mut().clock_mut() {
            clock.on_poll();
        }

        if now >= next_report {
            next_report += TimeValue::ONE_SECOND;
            let offset = slave_time(&slave, now) - now;
            offsets.push(offset.as_f64() * 1e9);
            tracing::debug!(
                second = (now - START).secs(),
                offset_ns = offset.delta_nsec(),
                mode = ?slave.tracking().mode(),
                "report"
            );
        }
    }

    let exchange = slave.exchange().stats();
    let tracking = slave.tracking().stats();
    let tail = &offsets[offsets.len() / 2..];
    let rms = match tail.len() {
        0 => 0.0,
        len => (tail.iter().map(|x| x * x).sum::<f64>() / len as f64).sqrt(),
    };

    let summary = Summary {
        duration: config.simulation.duration,
        mode: format!("{:?}", slave.tracking().mode()),
        final_offset_ns: (slave_time(&slave, now) - now).as_f64() * 1e9,
        rms_offset_ns: rms,
        max_offset_ns: tail.iter().fold(0.0, |max: f64, x| max.max(x.abs())),
        path_delay_ns: slave
            .last_measurement()
            .map(|measurement| measurement.path_delay().as_f64() * 1e9),
        rate: slave
            .tracking()
            .clock()
            .map_or(0, |clock| clock.oscillator().rate()),
        exchanges_completed: exchange.completed(),
        exchanges_timed_out: exchange.timed_out(),
        exchanges_reset: exchange.reset(),
        steps: tracking.steps(),
        rate_updates: tracking.rate_updates(),
        saturations: tracking.saturations(),
        mode_switches: tracking.mode_switches(),
        packets_sent: network.link.sent(),
        packets_lost: network.link.lost(),
    };

    tracing::info!(
        rms_offset_ns = summary.rms_offset_ns,
        max_offset_ns = summary.max_offset_ns,
        "simulation finished"
    );

    Ok(summary)
}
