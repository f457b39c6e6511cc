//! Simulated network path between master and slave

use chronoloop::time::TimeValue;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::LinkConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToSlave,
    ToMaster,
}

/// Point to point link with a fixed delay, uniform jitter and random loss
#[derive(Debug)]
pub struct Link {
    config: LinkConfig,
    rng: StdRng,
    sent: u32,
    lost: u32,
}

impl Link {
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            sent: 0,
            lost: 0,
        }
    }

    /// One-way delay of the next packet in `direction`, `None` when it is lost
    pub fn transit(&mut self, direction: Direction) -> Option<TimeValue> {
        self.sent += 1;

        if self.config.loss > 0.0 && self.rng.gen_bool(self.config.loss) {
            self.lost += 1;
            return None;
        }

        let base = match direction {
            Direction::ToSlave => self.config.delay_ns as i64 + self.config.asymmetry_ns,
            Direction::ToMaster => self.config.delay_ns as i64 - self.config.asymmetry_ns,
        };
        let jitter = match self.config.jitter_ns {
            0 => 0,
            max => self.rng.gen_range(0..=max) as i64,
        };

        Some(TimeValue::from_nanos(base + jitter))
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn lost(&self) -> u32 {
        self.lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asymmetry_splits_the_delay() {
        let mut link = Link::new(
            LinkConfig {
                delay_ns: 1000,
                asymmetry_ns: 200,
                ..Default::default()
            },
            0,
        );
        assert_eq!(link.transit(Direction::ToSlave), Some(TimeValue::from_nanos(1200)));
        assert_eq!(link.transit(Direction::ToMaster), Some(TimeValue::from_nanos(800)));
    }

    #[test]
    fn jitter_stays_in_range() {
        let mut link = Link::new(
            LinkConfig {
                delay_ns: 1000,
                jitter_ns: 100,
                ..Default::default()
            },
            7,
        );
        for _ in 0..1000 {
            let delay = link.transit(Direction::ToSlave).unwrap();
            assert!(delay >= TimeValue::from_nanos(1000) && delay <= TimeValue::from_nanos(1100));
        }
    }

    #[test]
    fn loss_is_counted() {
        let mut link = Link::new(
            LinkConfig {
                loss: 0.5,
                ..Default::default()
            },
            1,
        );
        let delivered = (0..1000)
            .filter_map(|_| link.transit(Direction::ToMaster))
            .count() as u32;
        assert_eq!(link.sent(), 1000);
        assert_eq!(link.lost() + delivered, 1000);
        assert!((300..700).contains(&link.lost()));
    }

    #[test]
    fn same_seed_same_delays() {
        let config = LinkConfig {
            jitter_ns: 10_000,
            loss: 0.1,
            ..Default::default()
        };
        let mut a = Link::new(config.clone(), 42);
        let mut b = Link::new(config, 42);
        for _ in 0..100 {
            assert_eq!(a.transit(Direction::ToSlave), b.transit(Direction::ToSlave));
        }
    }
}
