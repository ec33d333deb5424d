//! Service seam for the stream backend.
//!
//! Implementations wrap the wire-level client of a managed stream service (or
//! its change-capture adapter) and translate its failures into [`ClientError`].
//! The consumer only relies on the error classification: throttling and cursor
//! expiry are retried locally, everything else ends the shard's task.

use async_trait::async_trait;

use crate::error::ClientError;
use crate::model::{GetRecordsResponse, SequencePosition, ShardHandle, ShardIterator, ShardPage};

#[async_trait]
pub trait StreamClient: Send + Sync {
    /// List one page of shards for a stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - Stream to describe
    /// * `exclusive_start_shard_id` - Return shards listed after this id
    ///
    /// # Errors
    ///
    /// `Throttled` when the listing rate limit is hit, `ResourceNotFound` when the
    /// stream does not exist.
    async fn list_shards(
        &self,
        stream: &str,
        exclusive_start_shard_id: Option<&str>,
    ) -> Result<ShardPage, ClientError>;

    /// Acquire a read cursor for a shard.
    ///
    /// A `Concrete` position yields a cursor right after that record; sentinel
    /// positions map to the service's TRIM_HORIZON, LATEST and AT_TIMESTAMP
    /// iterator types. Returns `Ok(None)` when the shard is closed and has no
    /// readable position left.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound`, `InvalidPosition`, or `Throttled`.
    async fn get_shard_iterator(
        &self,
        shard: &ShardHandle,
        position: &SequencePosition,
    ) -> Result<Option<ShardIterator>, ClientError>;

    /// Fetch up to `max_records` records at `iterator`.
    ///
    /// # Errors
    ///
    /// `Throttled`, `CursorExpired`, or `ResourceNotFound`.
    async fn get_records(
        &self,
        iterator: &ShardIterator,
        max_records: u32,
    ) -> Result<GetRecordsResponse, ClientError>;
}
