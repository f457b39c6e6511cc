use std::path::Path;

use chronoloop::{
    config::{ClockIdentity, ExchangeConfig, MasterConfig, PortIdentity, SwitchPolicy},
    filters::CoeffError,
    time::{Interval, TimeValue},
    tracking::ChainFullError,
};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

/// Longest window of the windowed filters
pub const MAX_WINDOW: usize = 32;

/// Longest simulation, bounded by the range of the simulated counters
const MAX_DURATION: u64 = 86_400;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub exchange: ExchangeSection,
    pub tracking: TrackingSection,
    #[serde(default, rename = "filter")]
    pub filters: Vec<FilterConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct SimulationConfig {
    /// Simulated seconds
    pub duration: u64,
    pub seed: u64,
    #[serde(deserialize_with = "deserialize_level")]
    pub log_level: LevelFilter,
    /// Time between two polls of the clients
    pub poll_interval_us: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration: 300,
            seed: 0,
            log_level: LevelFilter::INFO,
            poll_interval_us: 1000,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct LinkConfig {
    /// Mean one-way delay
    pub delay_ns: u64,
    /// Extra delay drawn uniformly from zero up to this value, per packet
    pub jitter_ns: u64,
    /// Probability that a packet is dropped
    pub loss: f64,
    /// How much longer master to slave takes than the mean delay
    pub asymmetry_ns: i64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            delay_ns: 50_000,
            jitter_ns: 0,
            loss: 0.0,
            asymmetry_ns: 0,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct ClockConfig {
    /// Frequency error of the slave oscillator
    pub drift_ppb: f64,
    /// Slave time minus master time at the start
    pub initial_offset_ns: i64,
    /// A rate LSB is 2^ref-scale-log2 seconds per second
    pub ref_scale_log2: i32,
    /// Largest rate trim the oscillator accepts
    pub rate_limit_ppm: f64,
    /// Phase adjustments are truncated to this granularity, 0 for none
    pub granularity_ns: u64,
    /// Drive the oscillator through a delta-sigma dither with 16 extra bits
    pub dither: bool,
    pub counter_hz: u32,
    pub counter_bits: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            drift_ppb: 0.0,
            initial_offset_ns: 0,
            ref_scale_log2: -40,
            rate_limit_ppm: 1000.0,
            granularity_ns: 0,
            dither: false,
            counter_hz: 1_000_000_000,
            counter_bits: 48,
        }
    }
}

impl ClockConfig {
    /// Seconds per second of one rate LSB of the oscillator
    pub fn ref_scale(&self) -> f64 {
        2f64.powi(self.ref_scale_log2)
    }

    /// Rate LSB as seen by the controllers, finer when dithering
    pub fn controller_ref_scale(&self) -> f64 {
        if self.dither {
            self.ref_scale() / 65_536.0
        } else {
            self.ref_scale()
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct ExchangeSection {
    pub sync_interval_log2: i8,
    pub two_step: bool,
    pub timeout_ms: u64,
    /// Asymmetry assumed by the slave
    pub delay_asymmetry_ns: i64,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            sync_interval_log2: 0,
            two_step: true,
            timeout_ms: 500,
            delay_asymmetry_ns: 0,
        }
    }
}

/// Mode switch thresholds. There are no defaults, these have to be stated.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TrackingSection {
    pub slew_threshold_ns: Option<u64>,
    pub track_threshold_ns: u64,
    pub track_dwell: u32,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FilterConfig {
    Amplitude {
        /// Time constant in seconds
        #[serde(default = "default_amplitude_tau")]
        tau: f64,
    },
    Median {
        window: usize,
    },
    Boxcar {
        window: usize,
    },
    Lr {
        window: usize,
        tau: f64,
    },
    Pi {
        tau: f64,
        #[serde(default = "default_damping")]
        damping: f64,
    },
    Pii {
        tau: f64,
    },
}

fn default_amplitude_tau() -> f64 {
    10.0
}

fn default_damping() -> f64 {
    1.0
}

fn deserialize_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelFilter, D::Error> {
    let level = String::deserialize(deserializer)?;
    level.parse().map_err(serde::de::Error::custom)
}

impl Config {
    /// Parse config from file
    pub fn from_file(file: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.check()?;
        Ok(config)
    }

    /// Check that the config is reasonable
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.simulation.duration == 0 || self.simulation.duration > MAX_DURATION {
            return Err(ConfigError::Invalid(format!(
                "duration must be between 1 and {MAX_DURATION} seconds"
            )));
        }
        if self.simulation.poll_interval_us == 0 {
            return Err(ConfigError::Invalid("poll-interval-us must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.link.loss) {
            return Err(ConfigError::Invalid("loss must be in [0, 1)".into()));
        }
        if self.link.asymmetry_ns.unsigned_abs() > self.link.delay_ns {
            return Err(ConfigError::Invalid(
                "asymmetry cannot exceed the mean delay".into(),
            ));
        }
        if self.clock.counter_hz < 1_000_000 || !(32..=64).contains(&self.clock.counter_bits) {
            return Err(ConfigError::Invalid(
                "counter needs at least 1 MHz and 32 to 64 bits".into(),
            ));
        }

        for filter in &self.filters {
            match *filter {
                FilterConfig::Median { window }
                | FilterConfig::Boxcar { window }
                | FilterConfig::Lr { window, .. }
                    if window == 0 || window > MAX_WINDOW =>
                {
                    return Err(ConfigError::Invalid(format!(
                        "filter window {window} outside 1..={MAX_WINDOW}"
                    )));
                }
                FilterConfig::Lr { window, .. } if window < 2 => {
                    return Err(ConfigError::Invalid("lr window needs 2 samples".into()));
                }
                _ => {}
            }
        }

        if self.filters.is_empty() {
            tracing::warn!("No filters configured, the slave will only slew");
        }

        Ok(())
    }

    pub fn exchange_config(&self) -> ExchangeConfig {
        ExchangeConfig {
            port_identity: slave_identity(),
            timeout: TimeValue::from_millis(self.exchange.timeout_ms as i64),
            delay_asymmetry: TimeValue::from_nanos(self.exchange.delay_asymmetry_ns),
        }
    }

    pub fn master_config(&self) -> MasterConfig {
        MasterConfig {
            port_identity: master_identity(),
            sync_interval: Interval::from_log_2(self.exchange.sync_interval_log2),
            two_step: self.exchange.two_step,
        }
    }

    pub fn switch_policy(&self) -> SwitchPolicy {
        SwitchPolicy {
            slew_threshold: self
                .tracking
                .slew_threshold_ns
                .map(|ns| TimeValue::from_nanos(ns as i64)),
            track_threshold: TimeValue::from_nanos(self.tracking.track_threshold_ns as i64),
            track_dwell: self.tracking.track_dwell,
        }
    }
}

pub fn master_identity() -> PortIdentity {
    PortIdentity {
        clock_identity: ClockIdentity::from_mac_address([0x02, 0, 0, 0, 0, 0x01]),
        port_number: 1,
    }
}

pub fn slave_identity() -> PortIdentity {
    PortIdentity {
        clock_identity: ClockIdentity::from_mac_address([0x02, 0, 0, 0, 0, 0x02]),
        port_number: 1,
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error while reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("filter coefficients: {0}")]
    Coeff(#[from] CoeffError),
    #[error(transparent)]
    Chain(#[from] ChainFullError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[tracking]
track-threshold-ns = 1000
track-dwell = 4
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.simulation.duration, 300);
        assert_eq!(config.link.delay_ns, 50_000);
        assert!(config.exchange.two_step);
        assert!(config.filters.is_empty());
        assert_eq!(config.switch_policy().slew_threshold, None);
        assert_eq!(config.switch_policy().track_dwell, 4);
    }

    #[test]
    fn tracking_section_is_required() {
        match Config::from_toml("[simulation]\nduration = 10\n") {
            Err(ConfigError::Toml(_)) => {}
            other => panic!("Unexpected result {other:?}"),
        }
    }

    #[test]
    fn filter_chain_in_order() {
        let config = Config::from_toml(&format!(
            "{MINIMAL}
[[filter]]
kind = \"amplitude\"

[[filter]]
kind = \"median\"
window = 5

[[filter]]
kind = \"pi\"
tau = 5.0
"
        ))
        .unwrap();

        assert_eq!(
            config.filters,
            vec![
                FilterConfig::Amplitude { tau: 10.0 },
                FilterConfig::Median { window: 5 },
                FilterConfig::Pi {
                    tau: 5.0,
                    damping: 1.0
                },
            ]
        );
    }

    #[test]
    fn unknown_fields_and_bad_windows_are_rejected() {
        let unknown = format!("{MINIMAL}\n[link]\ndelay = 5\n");
        assert!(matches!(Config::from_toml(&unknown), Err(ConfigError::Toml(_))));

        let window = format!("{MINIMAL}\n[[filter]]\nkind = \"boxcar\"\nwindow = 64\n");
        assert!(matches!(Config::from_toml(&window), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn log_level_parses() {
        let config = Config::from_toml(&format!("[simulation]\nlog-level = \"debug\"\n{MINIMAL}")).unwrap();
        assert_eq!(config.simulation.log_level, LevelFilter::DEBUG);
    }
}
