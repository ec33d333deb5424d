//! Record deserialization and emission seams.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ConsumerError, DecodeError};
use crate::model::{FetchedRecord, RawRecord, ShardHandle};

/// Turns raw record payloads into the item type handed to the sink.
pub trait RecordDeserializer: Send + Sync {
    type Item: Send + 'static;

    fn deserialize(&self, record: &RawRecord, shard: &ShardHandle) -> anyhow::Result<Self::Item>;

    /// Deserialize and attach shard / sequence context to the failure
    fn decode(&self, record: &RawRecord, shard: &ShardHandle) -> Result<Self::Item, DecodeError> {
        self.deserialize(record, shard).map_err(|source| DecodeError {
            shard_id: shard.shard_id.clone(),
            sequence_number: record.sequence_number.to_string(),
            source,
        })
    }
}

/// Pass-through deserializer yielding the payload bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytesDeserializer;

impl RecordDeserializer for RawBytesDeserializer {
    type Item = Vec<u8>;

    fn deserialize(&self, record: &RawRecord, _shard: &ShardHandle) -> anyhow::Result<Vec<u8>> {
        Ok(record.data.clone())
    }
}

/// Output target for decoded records.
///
/// `emit` may wait to apply backpressure; the consumer awaits it before
/// advancing the shard state, so a slow sink slows the poll loop instead of
/// growing a buffer.
#[async_trait]
pub trait RecordSink<T: Send + 'static>: Send + Sync {
    async fn emit(&self, record: FetchedRecord<T>) -> Result<(), ConsumerError>;
}

/// Sink backed by a bounded channel
#[derive(Debug)]
pub struct ChannelSink<T> {
    tx: mpsc::Sender<FetchedRecord<T>>,
}

impl<T> Clone for ChannelSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> ChannelSink<T> {
    /// Create a sink and the receiver the orchestrator drains
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<FetchedRecord<T>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl<T: Send + 'static> RecordSink<T> for ChannelSink<T> {
    async fn emit(&self, record: FetchedRecord<T>) -> Result<(), ConsumerError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| ConsumerError::SinkClosed)
    }
}
