//! Shard, position and record types shared by discovery and consumption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Inclusive hash-key bounds owned by a shard, as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashKeyRange {
    pub starting: String,
    pub ending: String,
}

/// Immutable identity of a stream partition.
///
/// Created at discovery time and shared as `Arc<ShardHandle>` between the
/// registry, the consumption task and every record the task emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardHandle {
    /// Stream (or change-capture adapter stream) this shard belongs to
    pub stream: String,

    /// Service-assigned shard id, unique within the stream
    pub shard_id: String,

    /// Hash-key range served by this shard
    pub hash_key_range: HashKeyRange,

    /// Shard this one was split or merged from
    pub parent_shard_id: Option<String>,

    /// Second parent when the shard is the result of a merge
    pub adjacent_parent_shard_id: Option<String>,
}

impl ShardHandle {
    pub fn new(
        stream: impl Into<String>,
        shard_id: impl Into<String>,
        hash_key_range: HashKeyRange,
    ) -> Self {
        Self {
            stream: stream.into(),
            shard_id: shard_id.into(),
            hash_key_range,
            parent_shard_id: None,
            adjacent_parent_shard_id: None,
        }
    }

    pub fn with_parents(
        mut self,
        parent_shard_id: Option<String>,
        adjacent_parent_shard_id: Option<String>,
    ) -> Self {
        self.parent_shard_id = parent_shard_id;
        self.adjacent_parent_shard_id = adjacent_parent_shard_id;
        self
    }
}

impl fmt::Display for ShardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stream, self.shard_id)
    }
}

/// Opaque, service-assigned record position within a shard.
///
/// Decimal digit strings (the common case) compare numerically regardless of
/// length; anything else compares lexically and sorts after all numeric values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(String);

impl SequenceNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric_digits(&self) -> Option<&str> {
        if !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit()) {
            Some(self.0.trim_start_matches('0'))
        } else {
            None
        }
    }
}

impl Ord for SequenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_digits(), other.numeric_digits()) {
            (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SequenceNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SequenceNumber {}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SequenceNumber {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Last processed position of a shard.
///
/// `Concrete` values are ordered within a shard. The sentinel start positions
/// precede every concrete value, and `ShardEnd` is terminal: once a shard
/// reaches it, no further position is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequencePosition {
    Concrete(SequenceNumber),
    TrimHorizon,
    Latest,
    AtTimestamp(DateTime<Utc>),
    ShardEnd,
}

impl SequencePosition {
    pub fn concrete(value: impl Into<String>) -> Self {
        SequencePosition::Concrete(SequenceNumber::new(value))
    }

    pub fn is_shard_end(&self) -> bool {
        matches!(self, SequencePosition::ShardEnd)
    }

    /// True for the start markers that carry no record position
    pub fn is_sentinel(&self) -> bool {
        matches!(
            self,
            SequencePosition::TrimHorizon
                | SequencePosition::Latest
                | SequencePosition::AtTimestamp(_)
        )
    }

    /// Whether moving from `self` to `next` keeps the position non-decreasing.
    pub fn can_advance_to(&self, next: &SequencePosition) -> bool {
        match (self, next) {
            (SequencePosition::ShardEnd, _) => false,
            (_, SequencePosition::ShardEnd) => true,
            (SequencePosition::Concrete(current), SequencePosition::Concrete(next)) => {
                next >= current
            }
            (_, SequencePosition::Concrete(_)) => true,
            // never move back to a sentinel once a position exists
            (_, _) => false,
        }
    }
}

impl fmt::Display for SequencePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencePosition::Concrete(seq) => write!(f, "{}", seq),
            SequencePosition::TrimHorizon => f.write_str("TRIM_HORIZON"),
            SequencePosition::Latest => f.write_str("LATEST"),
            SequencePosition::AtTimestamp(ts) => write!(f, "AT_TIMESTAMP({})", ts.to_rfc3339()),
            SequencePosition::ShardEnd => f.write_str("SHARD_END"),
        }
    }
}

/// Opaque, time-limited read handle issued by the stream service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardIterator(String);

impl ShardIterator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Record as returned by the fetch operation, before deserialization
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub sequence_number: SequenceNumber,
    pub partition_key: String,
    pub data: Vec<u8>,
    pub approximate_arrival_timestamp: Option<DateTime<Utc>>,
}

impl RawRecord {
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Result of one fetch call
#[derive(Debug, Clone, Default)]
pub struct GetRecordsResponse {
    pub records: Vec<RawRecord>,
    /// `None` marks the end of a closed shard
    pub next_iterator: Option<ShardIterator>,
    pub millis_behind_latest: Option<u64>,
}

/// Stream lifecycle status reported with each listing page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    Creating,
    Active,
    Updating,
    Deleting,
}

impl StreamStatus {
    /// Creating and deleting streams may report an incomplete shard list
    pub fn is_transitional(self) -> bool {
        matches!(self, StreamStatus::Creating | StreamStatus::Deleting)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamStatus::Creating => "CREATING",
            StreamStatus::Active => "ACTIVE",
            StreamStatus::Updating => "UPDATING",
            StreamStatus::Deleting => "DELETING",
        };
        f.write_str(s)
    }
}

/// One page of the shard listing operation
#[derive(Debug, Clone)]
pub struct ShardPage {
    pub shards: Vec<ShardHandle>,
    pub has_more_shards: bool,
    pub stream_status: StreamStatus,
}

/// Decoded record handed to the output sink.
#[derive(Debug, Clone)]
pub struct FetchedRecord<T> {
    pub value: T,
    pub shard: Arc<ShardHandle>,
    /// Position of this record; becomes the shard state once emitted
    pub sequence_position: SequencePosition,
    pub partition_key: String,
    pub approximate_arrival_timestamp: Option<DateTime<Utc>>,
    pub size_bytes: usize,
}
