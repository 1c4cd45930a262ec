//! Chat node configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use rvz_protocol::DEFAULT_MAX_LINE_LENGTH;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Longest duration any timing field may hold
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Largest backoff growth factor accepted
pub const MAX_BACKOFF_MULTIPLIER: f64 = 16.0;

/// Configuration for a chat node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Shared rendezvous string. Peers using the same string find each other.
    pub rendezvous: String,

    /// Address to accept chat streams on
    pub listen_address: String,

    /// UDP port the LAN provider directory listens on
    pub announce_port: u16,

    /// Destination of directory datagrams (usually a broadcast address)
    pub announce_target: String,

    /// How often the directory republishes our provider record
    #[serde(with = "duration_secs")]
    pub announce_interval: Duration,

    /// How long a provider record stays valid without a refresh
    #[serde(with = "duration_secs")]
    pub provider_ttl: Duration,

    /// Bound on each announce attempt
    #[serde(with = "duration_secs")]
    pub announce_timeout: Duration,

    /// Total time allowed for the startup announce before giving up
    #[serde(with = "duration_secs")]
    pub announce_deadline: Duration,

    /// Bound on each directory lookup
    #[serde(with = "duration_secs")]
    pub lookup_timeout: Duration,

    /// Pause between discovery iterations
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Bound on opening an outbound stream, handshake included
    #[serde(with = "duration_secs")]
    pub dial_timeout: Duration,

    /// Longest accepted chat line in bytes
    pub max_line_length: usize,

    /// Print remote lines in colour
    pub color: bool,

    /// Retry policy for directory failures
    pub backoff: BackoffConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            rendezvous: String::new(),
            listen_address: "0.0.0.0:0".to_string(),
            announce_port: 4747,
            announce_target: "255.255.255.255:4747".to_string(),
            announce_interval: Duration::from_secs(5),
            provider_ttl: Duration::from_secs(30),
            announce_timeout: Duration::from_secs(10),
            announce_deadline: Duration::from_secs(60),
            lookup_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            dial_timeout: Duration::from_secs(10),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            color: true,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ChatConfig {
    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rendezvous.is_empty() {
            return Err(ConfigError::MissingField("rendezvous".to_string()));
        }

        let bounds = [
            ("announce_interval", self.announce_interval),
            ("provider_ttl", self.provider_ttl),
            ("announce_timeout", self.announce_timeout),
            ("announce_deadline", self.announce_deadline),
            ("lookup_timeout", self.lookup_timeout),
            ("poll_interval", self.poll_interval),
            ("dial_timeout", self.dial_timeout),
            ("backoff.initial", self.backoff.initial),
            ("backoff.max", self.backoff.max),
        ];
        for (name, value) in bounds {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
            if value > MAX_DURATION {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {}s",
                    name,
                    MAX_DURATION.as_secs()
                )));
            }
        }

        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "max_line_length must be greater than zero".to_string(),
            ));
        }

        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.backoff.multiplier) {
            return Err(ConfigError::Invalid(format!(
                "backoff multiplier must be within 1..={}",
                MAX_BACKOFF_MULTIPLIER
            )));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::Invalid(
                "backoff jitter must be within 0..=1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
