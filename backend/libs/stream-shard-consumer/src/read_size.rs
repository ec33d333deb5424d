//! Records-per-call sizing for one shard.
//!
//! Fixed mode always requests the configured ceiling. Adaptive mode keeps the
//! average record size of the most recent batch and requests as many records as
//! fit into one poll interval at the target throughput:
//!
//! ```text
//! next = floor(target_bytes_per_second * poll_interval_secs / average_record_bytes)
//! ```
//!
//! clamped to `[1, SERVICE_MAX_RECORDS_PER_CALL]`. Until the first batch arrives
//! the controller is cold and requests the configured ceiling. State is per task
//! and never persisted, so a restarted task starts cold again.
use std::time::Duration;

use crate::config::{ConsumerConfig, SERVICE_MAX_RECORDS_PER_CALL};

#[derive(Debug, Clone)]
enum Strategy {
    Fixed,
    Adaptive {
        target_bytes_per_second: u64,
        poll_interval: Duration,
        average_record_bytes: Option<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct ReadSizeController {
    ceiling: u32,
    strategy: Strategy,
}

impl ReadSizeController {
    pub fn fixed(max_records_per_call: u32) -> Self {
        Self {
            ceiling: max_records_per_call,
            strategy: Strategy::Fixed,
        }
    }

    pub fn adaptive(
        max_records_per_call: u32,
        target_bytes_per_second: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ceiling: max_records_per_call,
            strategy: Strategy::Adaptive {
                target_bytes_per_second,
                poll_interval,
                average_record_bytes: None,
            },
        }
    }

    pub fn from_config(config: &ConsumerConfig) -> Self {
        if config.adaptive_reads {
            Self::adaptive(
                config.max_records_per_call,
                config.target_bytes_per_second,
                config.poll_interval(),
            )
        } else {
            Self::fixed(config.max_records_per_call)
        }
    }

    /// Number of records to request on the next fetch
    pub fn next_request_size(&self) -> u32 {
        match &self.strategy {
            Strategy::Fixed => self.ceiling,
            Strategy::Adaptive {
                average_record_bytes: None,
                ..
            } => self.ceiling,
            Strategy::Adaptive {
                target_bytes_per_second,
                poll_interval,
                average_record_bytes: Some(average),
            } => {
                let bytes_per_poll = *target_bytes_per_second as f64 * poll_interval.as_secs_f64();
                let records = (bytes_per_poll / average).floor();
                records.clamp(1.0, SERVICE_MAX_RECORDS_PER_CALL as f64) as u32
            }
        }
    }

    /// Feed the outcome of a completed fetch. Empty batches carry no size signal.
    pub fn record_batch(&mut self, total_bytes: u64, record_count: usize) {
        if let Strategy::Adaptive {
            average_record_bytes,
            ..
        } = &mut self.strategy
        {
            if record_count > 0 {
                *average_record_bytes = Some(total_bytes as f64 / record_count as f64);
            }
        }
    }

    /// Current average record size estimate, if adaptive and warmed up
    pub fn average_record_bytes(&self) -> Option<f64> {
        match &self.strategy {
            Strategy::Fixed => None,
            Strategy::Adaptive {
                average_record_bytes,
                ..
            } => *average_record_bytes,
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self.strategy, Strategy::Adaptive { .. })
    }
}
