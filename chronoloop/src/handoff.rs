//! Timestamp handoff between interrupt and poll context
//!
//! The interrupt handler that sees a frame cross the wire only copies the
//! raw counter capture into a [`TimestampMailbox`]. Everything else, from
//! extending the counter to feeding the exchange, happens when the poll loop
//! drains the mailbox.

use core::cell::Cell;

use az::SaturatingAs;
use critical_section::Mutex;
use fixed::types::U32F32;

use crate::time::{TimeValue, SUBNS_PER_SEC};

/// A single-slot mailbox.
///
/// Posting never blocks and overwrites a value that was not taken yet, so the
/// poll loop always sees the most recent capture. The critical section only
/// covers copying the value in or out.
pub struct TimestampMailbox<T> {
    slot: Mutex<Cell<Option<T>>>,
}

impl<T> core::fmt::Debug for TimestampMailbox<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimestampMailbox").finish_non_exhaustive()
    }
}

impl<T: Copy> Default for TimestampMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> TimestampMailbox<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
        }
    }

    /// Store a value. Returns true when an untaken value was overwritten.
    pub fn post(&self, value: T) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).replace(Some(value)).is_some())
    }

    /// Remove and return the stored value
    pub fn take(&self) -> Option<T> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).get().is_none())
    }
}

/// Receive and transmit captures of one network port
#[derive(Debug, Default)]
pub struct TimestampHandoff {
    rx: TimestampMailbox<u64>,
    tx: TimestampMailbox<u64>,
}

impl TimestampHandoff {
    pub const fn new() -> Self {
        Self {
            rx: TimestampMailbox::new(),
            tx: TimestampMailbox::new(),
        }
    }

    /// Called from interrupt context with the counter value latched when a
    /// frame was received
    pub fn post_rx(&self, ticks: u64) {
        if self.rx.post(ticks) {
            log::trace!("Receive capture overwritten before it was used");
        }
    }

    /// Called from interrupt context with the counter value latched when a
    /// frame was transmitted
    pub fn post_tx(&self, ticks: u64) {
        if self.tx.post(ticks) {
            log::trace!("Transmit capture overwritten before it was used");
        }
    }

    pub fn take_rx(&self) -> Option<u64> {
        self.rx.take()
    }

    pub fn take_tx(&self) -> Option<u64> {
        self.tx.take()
    }
}

/// Turns captures of a free running hardware counter into time.
///
/// The counter may be narrower than 64 bits. Wraps are detected by comparing
/// with the latest capture, so captures have to be converted at least once
/// per half wrap period. A capture up to half a wrap older than the latest
/// one is recognized as such instead of being taken for a wrap.
#[derive(Debug, Clone)]
pub struct CounterTimebase {
    mask: u64,
    subns_per_tick: U32F32,
    epoch: TimeValue,
    extended: Option<u64>,
}

impl CounterTimebase {
    /// A counter of `bits` width where each tick lasts `subns_per_tick`, and
    /// that read zero at time `epoch`.
    pub fn new(bits: u32, subns_per_tick: U32F32, epoch: TimeValue) -> Self {
        let bits = bits.clamp(2, 64);
        Self {
            mask: u64::MAX >> (64 - bits),
            subns_per_tick,
            epoch,
            extended: None,
        }
    }

    /// A counter of `bits` width running at `hz`. Counters slower than about
    /// 15.3 kHz cannot be represented.
    pub fn from_frequency(bits: u32, hz: u32, epoch: TimeValue) -> Self {
        let scale = ((SUBNS_PER_SEC as u128) << 32) / hz.max(1) as u128;
        Self::new(bits, U32F32::from_bits(scale.saturating_as::<u64>()), epoch)
    }

    pub fn subns_per_tick(&self) -> U32F32 {
        self.subns_per_tick
    }

    pub fn epoch(&self) -> TimeValue {
        self.epoch
    }

    /// Move the time at which the counter read zero
    pub fn set_epoch(&mut self, epoch: TimeValue) {
        self.epoch = epoch;
    }

    /// Extend a raw capture to the full 64-bit tick count
    pub fn extend(&mut self, raw: u64) -> u64 {
        let raw = raw & self.mask;
        let Some(extended) = self.extended else {
            self.extended = Some(raw);
            return raw;
        };

        let last = extended & self.mask;
        let forward = raw.wrapping_sub(last) & self.mask;
        if forward <= self.mask / 2 {
            let extended = extended.wrapping_add(forward);
            self.extended = Some(extended);
            extended
        } else {
            let back = last.wrapping_sub(raw) & self.mask;
            extended.saturating_sub(back)
        }
    }

    /// Time of an extended tick count
    pub fn to_time(&self, ticks: u64) -> TimeValue {
        let subns = (ticks as u128 * self.subns_per_tick.to_bits() as u128) >> 32;
        self.epoch + TimeValue::from_subns(subns.saturating_as::<i64>())
    }

    /// Extend and convert a raw capture
    pub fn convert(&mut self, raw: u64) -> TimeValue {
        let ticks = self.extend(raw);
        self.to_time(ticks)
    }
}
