//! Per-shard consumption task.
//!
//! A [`ShardConsumer`] owns one shard: it acquires a cursor after the last
//! processed position, fetches batches, hands every decoded record to the sink in
//! service order and publishes progress to the shared [`ShardState`]. Throttling
//! is retried with full-jitter backoff and an expired cursor is re-acquired from
//! the last processed position, so no record is skipped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::{FullJitterBackoff, RetryAttempts};
use crate::client::StreamClient;
use crate::config::ConsumerConfig;
use crate::error::{ClientError, ConsumerError, Result};
use crate::metrics::{ShardMetric, ShardMetricsSink};
use crate::model::{FetchedRecord, SequencePosition, ShardHandle, ShardIterator};
use crate::read_size::ReadSizeController;
use crate::sink::{RecordDeserializer, RecordSink};
use crate::state::ShardState;

/// How a consumption task ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerOutcome {
    /// The shard is closed and fully consumed
    ShardEnd,
    /// Shutdown was signalled before the shard ended
    Cancelled,
}

enum Acquired {
    Iterator(ShardIterator),
    Closed,
    Cancelled,
}

pub struct ShardConsumer<C, D, S, M>
where
    C: StreamClient + ?Sized,
    D: RecordDeserializer,
    S: RecordSink<D::Item>,
    M: ShardMetricsSink + ?Sized,
{
    state: ShardState,
    config: ConsumerConfig,
    client: Arc<C>,
    deserializer: D,
    sink: S,
    metrics: Arc<M>,
    shutdown: watch::Receiver<bool>,
    read_size: ReadSizeController,
    fetch_attempts: RetryAttempts,
    cursor_attempts: RetryAttempts,
}

impl<C, D, S, M> ShardConsumer<C, D, S, M>
where
    C: StreamClient + ?Sized,
    D: RecordDeserializer,
    S: RecordSink<D::Item>,
    M: ShardMetricsSink + ?Sized,
{
    /// Create a consumer for one shard.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `config` does not validate.
    pub fn new(
        state: ShardState,
        config: ConsumerConfig,
        client: Arc<C>,
        deserializer: D,
        sink: S,
        metrics: Arc<M>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        config.validate()?;

        let read_size = ReadSizeController::from_config(&config);
        let fetch_attempts = RetryAttempts::new(
            FullJitterBackoff::from(&config.fetch_backoff),
            config.fetch_backoff.max_retries,
        );
        let cursor_attempts = RetryAttempts::new(
            FullJitterBackoff::from(&config.cursor_backoff),
            config.cursor_backoff.max_retries,
        );

        Ok(Self {
            state,
            config,
            client,
            deserializer,
            sink,
            metrics,
            shutdown,
            read_size,
            fetch_attempts,
            cursor_attempts,
        })
    }

    pub fn state(&self) -> &ShardState {
        &self.state
    }

    /// Consume the shard until it ends or shutdown is signalled.
    pub async fn run(&mut self) -> Result<ConsumerOutcome> {
        let shard = Arc::clone(self.state.shard());
        info!(
            stream = %shard.stream,
            shard_id = %shard.shard_id,
            start = %self.state.position(),
            adaptive_reads = self.read_size.is_adaptive(),
            "Starting shard consumer"
        );

        match self.consume(&shard).await {
            Ok(ConsumerOutcome::ShardEnd) => {
                info!(stream = %shard.stream, shard_id = %shard.shard_id, "Shard fully consumed");
                self.metrics.shard_finished(&shard);
                Ok(ConsumerOutcome::ShardEnd)
            }
            Ok(ConsumerOutcome::Cancelled) => {
                info!(
                    stream = %shard.stream,
                    shard_id = %shard.shard_id,
                    position = %self.state.position(),
                    "Shutdown signal received, stopping shard consumer"
                );
                Ok(ConsumerOutcome::Cancelled)
            }
            Err(e) => {
                error!(
                    stream = %shard.stream,
                    shard_id = %shard.shard_id,
                    position = %self.state.position(),
                    error = %e,
                    "Shard consumer failed"
                );
                Err(e)
            }
        }
    }

    async fn consume(&mut self, shard: &Arc<ShardHandle>) -> Result<ConsumerOutcome> {
        let start = self.state.position();
        if start.is_shard_end() {
            return Ok(ConsumerOutcome::ShardEnd);
        }

        let mut iterator = match self.acquire_iterator(&start).await? {
            Acquired::Iterator(iterator) => iterator,
            Acquired::Closed => return Ok(self.reach_shard_end()),
            Acquired::Cancelled => return Ok(ConsumerOutcome::Cancelled),
        };

        loop {
            if self.is_cancelled() {
                return Ok(ConsumerOutcome::Cancelled);
            }

            let iteration_start = Instant::now();
            let requested = self.read_size.next_request_size();

            let response = match self.client.get_records(&iterator, requested).await {
                Ok(response) => {
                    self.fetch_attempts.reset();
                    response
                }
                Err(ClientError::Throttled(msg)) => {
                    let Some(delay) = self.fetch_attempts.next_delay() else {
                        return Err(ConsumerError::RetriesExhausted {
                            operation: "get_records",
                            attempts: self.fetch_attempts.attempts() + 1,
                        });
                    };
                    warn!(
                        stream = %shard.stream,
                        shard_id = %shard.shard_id,
                        attempt = self.fetch_attempts.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Fetch throttled, backing off"
                    );
                    if self.sleep_or_cancel(delay).await {
                        return Ok(ConsumerOutcome::Cancelled);
                    }
                    continue;
                }
                Err(ClientError::CursorExpired(msg)) => {
                    let position = self.state.position();
                    warn!(
                        stream = %shard.stream,
                        shard_id = %shard.shard_id,
                        position = %position,
                        error = %msg,
                        "Shard iterator expired, re-acquiring after last processed record"
                    );
                    match self.acquire_iterator(&position).await? {
                        Acquired::Iterator(next) => {
                            iterator = next;
                            continue;
                        }
                        Acquired::Closed => return Ok(self.reach_shard_end()),
                        Acquired::Cancelled => return Ok(ConsumerOutcome::Cancelled),
                    }
                }
                Err(e) => return Err(ConsumerError::from_client(e)),
            };

            let record_count = response.records.len();
            let mut batch_bytes: u64 = 0;
            for record in response.records {
                let value = self.deserializer.decode(&record, shard)?;
                let size_bytes = record.size_bytes();
                batch_bytes += size_bytes as u64;
                let position = SequencePosition::Concrete(record.sequence_number);

                self.sink
                    .emit(FetchedRecord {
                        value,
                        shard: Arc::clone(shard),
                        sequence_position: position.clone(),
                        partition_key: record.partition_key,
                        approximate_arrival_timestamp: record.approximate_arrival_timestamp,
                        size_bytes,
                    })
                    .await?;
                self.state.advance(position);
            }

            self.read_size.record_batch(batch_bytes, record_count);
            self.report_batch(
                shard,
                record_count,
                batch_bytes,
                requested,
                response.millis_behind_latest,
                iteration_start.elapsed(),
            );
            debug!(
                stream = %shard.stream,
                shard_id = %shard.shard_id,
                records = record_count,
                bytes = batch_bytes,
                requested = requested,
                millis_behind_latest = ?response.millis_behind_latest,
                "Fetched batch"
            );

            match response.next_iterator {
                Some(next) => iterator = next,
                None => return Ok(self.reach_shard_end()),
            }

            let remaining = self
                .config
                .poll_interval()
                .saturating_sub(iteration_start.elapsed());
            self.metrics.observe(
                shard,
                ShardMetric::SleepTimeMillis,
                remaining.as_millis() as f64,
            );
            if !remaining.is_zero() && self.sleep_or_cancel(remaining).await {
                return Ok(ConsumerOutcome::Cancelled);
            }
        }
    }

    /// Acquire a cursor right after `position`, retrying throttled attempts.
    async fn acquire_iterator(&mut self, position: &SequencePosition) -> Result<Acquired> {
        loop {
            match self
                .client
                .get_shard_iterator(self.state.shard(), position)
                .await
            {
                Ok(Some(iterator)) => {
                    self.cursor_attempts.reset();
                    return Ok(Acquired::Iterator(iterator));
                }
                Ok(None) => return Ok(Acquired::Closed),
                Err(ClientError::Throttled(msg)) => {
                    let Some(delay) = self.cursor_attempts.next_delay() else {
                        return Err(ConsumerError::RetriesExhausted {
                            operation: "get_shard_iterator",
                            attempts: self.cursor_attempts.attempts() + 1,
                        });
                    };
                    warn!(
                        shard = %self.state.shard(),
                        position = %position,
                        attempt = self.cursor_attempts.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Shard iterator request throttled, backing off"
                    );
                    if self.sleep_or_cancel(delay).await {
                        return Ok(Acquired::Cancelled);
                    }
                }
                Err(e) => return Err(ConsumerError::from_client(e)),
            }
        }
    }

    fn report_batch(
        &self,
        shard: &ShardHandle,
        record_count: usize,
        batch_bytes: u64,
        requested: u32,
        millis_behind_latest: Option<u64>,
        latency: Duration,
    ) {
        let metrics = &self.metrics;
        metrics.observe(shard, ShardMetric::RecordsPerCall, record_count as f64);
        metrics.observe(shard, ShardMetric::BytesPerCall, batch_bytes as f64);
        metrics.observe(shard, ShardMetric::RequestedRecordsPerCall, requested as f64);
        metrics.observe(shard, ShardMetric::LoopLatencyMillis, latency.as_millis() as f64);
        if let Some(lag) = millis_behind_latest {
            metrics.observe(shard, ShardMetric::MillisBehindLatest, lag as f64);
        }
        if let Some(average) = self.read_size.average_record_bytes() {
            metrics.observe(shard, ShardMetric::AverageRecordSizeBytes, average);
        }
    }

    fn reach_shard_end(&self) -> ConsumerOutcome {
        self.state.mark_shard_end();
        ConsumerOutcome::ShardEnd
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for `duration`, waking early on shutdown. Returns true if cancelled.
    ///
    /// A dropped shutdown sender can no longer cancel, so the sleep just completes.
    async fn sleep_or_cancel(&mut self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        (&mut sleep).await;
                        return false;
                    }
                    if *self.shutdown.borrow() {
                        return true;
                    }
                }
            }
        }
    }
}
