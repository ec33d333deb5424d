//! Typed consumer configuration
//!
//! Every recognized option, its default and its effect lives here. Values can be
//! deserialized from a config file (`#[serde(default)]` fills the gaps) or read
//! from `SHARD_CONSUMER_*` environment variables, then checked with `validate()`
//! before any task starts.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{ConsumerError, Result};
use crate::model::SequencePosition;

/// Hard per-call record limit of the stream service
pub const SERVICE_MAX_RECORDS_PER_CALL: u32 = 10_000;

/// Per-shard read throughput limit of the stream service (2 MiB/s)
pub const DEFAULT_TARGET_BYTES_PER_SECOND: u64 = 2 * 1024 * 1024;

const ENV_PREFIX: &str = "SHARD_CONSUMER";

/// Backoff parameters for one retry call site
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay in milliseconds
    pub base_millis: u64,
    /// Upper bound of any single delay in milliseconds
    pub max_millis: u64,
    /// Growth constant applied per attempt
    pub exponent: f64,
    /// Give up after this many consecutive throttled attempts (None = retry forever)
    pub max_retries: Option<u32>,
}

impl BackoffConfig {
    pub const fn new(base_millis: u64, max_millis: u64, exponent: f64) -> Self {
        Self {
            base_millis,
            max_millis,
            exponent,
            max_retries: None,
        }
    }

    /// Defaults for shard listing (describe / list shards)
    pub const fn discovery() -> Self {
        Self::new(1000, 5000, 1.5)
    }

    /// Defaults for record fetches
    pub const fn fetch() -> Self {
        Self::new(300, 1000, 1.5)
    }

    /// Defaults for shard iterator acquisition
    pub const fn cursor() -> Self {
        Self::new(300, 1000, 1.5)
    }

    fn validate(&self, site: &str) -> Result<()> {
        if self.base_millis == 0 {
            return Err(ConsumerError::InvalidConfiguration(format!(
                "{site} backoff base must be greater than 0"
            )));
        }
        if self.base_millis > self.max_millis {
            return Err(ConsumerError::InvalidConfiguration(format!(
                "{site} backoff base ({}ms) exceeds max ({}ms)",
                self.base_millis, self.max_millis
            )));
        }
        if !self.exponent.is_finite() || self.exponent < 1.0 {
            return Err(ConsumerError::InvalidConfiguration(format!(
                "{site} backoff exponent must be a finite value >= 1.0, got {}",
                self.exponent
            )));
        }
        Ok(())
    }

    fn from_env(site: &str, defaults: Self) -> Result<Self> {
        let key = |field: &str| format!("{ENV_PREFIX}_{site}_BACKOFF_{field}");
        Ok(Self {
            base_millis: parse_env(&key("BASE_MILLIS"))?.unwrap_or(defaults.base_millis),
            max_millis: parse_env(&key("MAX_MILLIS"))?.unwrap_or(defaults.max_millis),
            exponent: parse_env(&key("EXPONENT"))?.unwrap_or(defaults.exponent),
            max_retries: parse_env(&key("MAX_RETRIES"))?.or(defaults.max_retries),
        })
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::fetch()
    }
}

/// Start position for shards that have no checkpoint yet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "timestamp", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitialPosition {
    TrimHorizon,
    Latest,
    AtTimestamp(DateTime<Utc>),
}

impl InitialPosition {
    pub fn to_sequence_position(&self) -> SequencePosition {
        match self {
            InitialPosition::TrimHorizon => SequencePosition::TrimHorizon,
            InitialPosition::Latest => SequencePosition::Latest,
            InitialPosition::AtTimestamp(ts) => SequencePosition::AtTimestamp(*ts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Records requested per fetch; the cold-start request size when adaptive
    pub max_records_per_call: u32,

    /// Size requests from observed record sizes instead of the fixed ceiling
    pub adaptive_reads: bool,

    /// Throughput target per shard used by adaptive reads
    pub target_bytes_per_second: u64,

    /// Minimum spacing between fetches on one shard
    pub poll_interval_millis: u64,

    pub fetch_backoff: BackoffConfig,

    pub cursor_backoff: BackoffConfig,

    pub discovery_backoff: BackoffConfig,

    /// Where newly discovered shards start reading
    pub initial_position: InitialPosition,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_records_per_call: SERVICE_MAX_RECORDS_PER_CALL,
            adaptive_reads: false,
            target_bytes_per_second: DEFAULT_TARGET_BYTES_PER_SECOND,
            poll_interval_millis: 200,
            fetch_backoff: BackoffConfig::fetch(),
            cursor_backoff: BackoffConfig::cursor(),
            discovery_backoff: BackoffConfig::discovery(),
            initial_position: InitialPosition::TrimHorizon,
        }
    }
}

impl ConsumerConfig {
    /// Load configuration from `SHARD_CONSUMER_*` environment variables.
    ///
    /// Unset variables fall back to defaults; a variable that is set but does not
    /// parse is an `InvalidConfiguration` error rather than a silent default.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let position_key = format!("{ENV_PREFIX}_INITIAL_POSITION");
        let initial_position = match parse_env::<String>(&position_key)? {
            None => defaults.initial_position,
            Some(raw) => match raw.to_ascii_uppercase().as_str() {
                "TRIM_HORIZON" => InitialPosition::TrimHorizon,
                "LATEST" => InitialPosition::Latest,
                "AT_TIMESTAMP" => {
                    let key = format!("{ENV_PREFIX}_INITIAL_TIMESTAMP");
                    let raw_ts: String = parse_env(&key)?.ok_or_else(|| {
                        ConsumerError::InvalidConfiguration(format!(
                            "{key} is required when the initial position is AT_TIMESTAMP"
                        ))
                    })?;
                    let ts = DateTime::parse_from_rfc3339(&raw_ts).map_err(|e| {
                        ConsumerError::InvalidConfiguration(format!(
                            "{key} is not an RFC 3339 timestamp: {e}"
                        ))
                    })?;
                    InitialPosition::AtTimestamp(ts.with_timezone(&Utc))
                }
                other => {
                    return Err(ConsumerError::InvalidConfiguration(format!(
                        "unknown initial position: {other}"
                    )))
                }
            },
        };

        let config = Self {
            max_records_per_call: parse_env(&format!("{ENV_PREFIX}_MAX_RECORDS_PER_CALL"))?
                .unwrap_or(defaults.max_records_per_call),
            adaptive_reads: parse_env(&format!("{ENV_PREFIX}_ADAPTIVE_READS"))?
                .unwrap_or(defaults.adaptive_reads),
            target_bytes_per_second: parse_env(&format!("{ENV_PREFIX}_TARGET_BYTES_PER_SECOND"))?
                .unwrap_or(defaults.target_bytes_per_second),
            poll_interval_millis: parse_env(&format!("{ENV_PREFIX}_POLL_INTERVAL_MILLIS"))?
                .unwrap_or(defaults.poll_interval_millis),
            fetch_backoff: BackoffConfig::from_env("FETCH", defaults.fetch_backoff)?,
            cursor_backoff: BackoffConfig::from_env("CURSOR", defaults.cursor_backoff)?,
            discovery_backoff: BackoffConfig::from_env("DISCOVERY", defaults.discovery_backoff)?,
            initial_position,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the consumer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=SERVICE_MAX_RECORDS_PER_CALL).contains(&self.max_records_per_call) {
            return Err(ConsumerError::InvalidConfiguration(format!(
                "max_records_per_call must be within 1..={SERVICE_MAX_RECORDS_PER_CALL}, got {}",
                self.max_records_per_call
            )));
        }
        if self.target_bytes_per_second == 0 {
            return Err(ConsumerError::InvalidConfiguration(
                "target_bytes_per_second must be greater than 0".to_string(),
            ));
        }
        if self.adaptive_reads && self.poll_interval_millis == 0 {
            return Err(ConsumerError::InvalidConfiguration(
                "adaptive reads require a poll interval greater than 0".to_string(),
            ));
        }
        self.fetch_backoff.validate("fetch")?;
        self.cursor_backoff.validate("cursor")?;
        self.discovery_backoff.validate("discovery")?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    /// Log configuration details
    pub fn log_config(&self) {
        info!(
            max_records_per_call = self.max_records_per_call,
            adaptive_reads = self.adaptive_reads,
            target_bytes_per_second = self.target_bytes_per_second,
            poll_interval_ms = self.poll_interval_millis,
            fetch_backoff = ?self.fetch_backoff,
            cursor_backoff = ?self.cursor_backoff,
            discovery_backoff = ?self.discovery_backoff,
            initial_position = ?self.initial_position,
            "Shard consumer configuration"
        );
    }
}

/// Parse an environment variable, `Ok(None)` when unset
fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            ConsumerError::InvalidConfiguration(format!(
                "Failed to parse environment variable {key}={raw}"
            ))
        }),
        Err(_) => Ok(None),
    }
}
