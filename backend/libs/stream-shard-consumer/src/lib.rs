//! # Stream Shard Consumer
//!
//! Polling consumer core for sharded, append-only record streams (managed stream
//! services and their change-capture adapters).
//!
//! The library covers the per-shard part of a stream source:
//! 1. Shard discovery: paging the shard listing of one or more streams
//! 2. Shard consumption: one task per shard fetching batches, emitting decoded
//!    records in service order and publishing progress to a shared [`ShardState`]
//! 3. Read sizing: a fixed or adaptive records-per-call size derived from the
//!    observed record size and a per-shard throughput target
//! 4. Recovery: full-jitter backoff on throttling and cursor re-acquisition after
//!    expiry, resuming strictly after the last processed record
//!
//! Shard assignment, checkpoint persistence and the service wire client stay with
//! the caller. The service sits behind the [`StreamClient`] trait and records leave
//! through a [`RecordSink`].
//!
//! ## Delivery guarantees
//!
//! - **At-least-once**: a record is emitted before the shard state advances past it
//! - **Ordered per shard**: records of one shard are emitted in the order the service
//!   returns them; nothing is ordered across shards
//! - **Backpressure**: a slow sink slows the poll loop, nothing is buffered
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stream_shard_consumer::{
//!     ChannelSink, ConsumerConfig, NoopShardMetrics, RawBytesDeserializer, ShardConsumer,
//!     ShardDiscovery, ShardRegistry, StreamClient,
//! };
//!
//! async fn consume_stream<C: StreamClient + 'static>(
//!     client: Arc<C>,
//! ) -> stream_shard_consumer::Result<()> {
//!     let config = ConsumerConfig::from_env()?;
//!     config.log_config();
//!
//!     let registry = ShardRegistry::new();
//!     let discovery = ShardDiscovery::from_config(Arc::clone(&client), &config);
//!     let shards = discovery.list_shards("orders", None).await?;
//!
//!     let start = config.initial_position.to_sequence_position();
//!     let (sink, mut records) = ChannelSink::<Vec<u8>>::bounded(1024);
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     for state in registry.register_discovered(shards, &start) {
//!         let mut consumer = ShardConsumer::new(
//!             state,
//!             config.clone(),
//!             Arc::clone(&client),
//!             RawBytesDeserializer,
//!             sink.clone(),
//!             Arc::new(NoopShardMetrics),
//!             shutdown_rx.clone(),
//!         )?;
//!         tokio::spawn(async move { consumer.run().await });
//!     }
//!     drop(sink);
//!
//!     while let Some(record) = records.recv().await {
//!         println!("{} @ {}", record.shard, record.sequence_position);
//!     }
//!
//!     // checkpoint view for the orchestrator
//!     for snapshot in registry.snapshots() {
//!         println!("{} -> {}", snapshot.shard, snapshot.position);
//!     }
//!
//!     let _ = shutdown_tx.send(true);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod consumer;
pub mod discovery;
mod error;
pub mod metrics;
pub mod model;
pub mod read_size;
pub mod sink;
pub mod state;

pub use backoff::{FullJitterBackoff, RetryAttempts};
pub use client::StreamClient;
pub use config::{
    BackoffConfig, ConsumerConfig, InitialPosition, DEFAULT_TARGET_BYTES_PER_SECOND,
    SERVICE_MAX_RECORDS_PER_CALL,
};
pub use consumer::{ConsumerOutcome, ShardConsumer};
pub use discovery::{DiscoveredShards, ShardDiscovery};
pub use error::{ClientError, ConsumerError, DecodeError, Result};
pub use metrics::{NoopShardMetrics, PrometheusShardMetrics, ShardMetric, ShardMetricsSink};
pub use model::{
    FetchedRecord, GetRecordsResponse, HashKeyRange, RawRecord, SequenceNumber,
    SequencePosition, ShardHandle, ShardIterator, ShardPage, StreamStatus,
};
pub use read_size::ReadSizeController;
pub use sink::{ChannelSink, RawBytesDeserializer, RecordDeserializer, RecordSink};
pub use state::{ShardRegistry, ShardSnapshot, ShardState};
