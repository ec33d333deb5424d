//! Fake stream clients shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use stream_shard_consumer::{
    ClientError, GetRecordsResponse, HashKeyRange, RawRecord, SequenceNumber, SequencePosition,
    ShardHandle, ShardIterator, ShardMetric, ShardMetricsSink, ShardPage, StreamClient,
    StreamStatus,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn shard_handle(stream: &str, shard_id: &str) -> ShardHandle {
    ShardHandle::new(
        stream,
        shard_id,
        HashKeyRange {
            starting: "0".into(),
            ending: "340282366920938463463374607431768211455".into(),
        },
    )
}

fn listing_only() -> ClientError {
    ClientError::Other(anyhow::anyhow!("fake client does not support this call"))
}

/// Single shard holding `total` records numbered from 0.
///
/// Iterators encode the offset of the next record to read. Records are handed
/// out in batches so that the shard ends after a fixed number of fetch calls.
/// Faults (throttling, an expired iterator) are injected by call index.
pub struct FakeShardClient {
    total: usize,
    per_call: usize,
    record_bytes: usize,
    throttled_fetches: usize,
    throttled_iterator_requests: usize,
    expire_at_call: Option<usize>,
    fetch_calls: Mutex<usize>,
    requested_sizes: Mutex<Vec<u32>>,
    iterator_requests: Mutex<Vec<SequencePosition>>,
}

impl FakeShardClient {
    /// `total` records, the last batch arriving on fetch call `calls`
    pub fn total_records_after_calls(total: usize, calls: usize) -> Self {
        Self {
            total,
            per_call: total.div_ceil(calls.max(1)).max(1),
            record_bytes: 16,
            throttled_fetches: 0,
            throttled_iterator_requests: 0,
            expire_at_call: None,
            fetch_calls: Mutex::new(0),
            requested_sizes: Mutex::new(Vec::new()),
            iterator_requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `count` fetch calls with a throttling error
    pub fn with_throttled_fetches(mut self, count: usize) -> Self {
        self.throttled_fetches = count;
        self
    }

    /// Fail the first `count` cursor acquisitions with a throttling error
    pub fn with_throttled_iterator_requests(mut self, count: usize) -> Self {
        self.throttled_iterator_requests = count;
        self
    }

    /// Fail fetch call number `call` (1-based) with an expired iterator
    pub fn with_expired_iterator_at(mut self, call: usize) -> Self {
        self.expire_at_call = Some(call);
        self
    }

    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock()
    }

    pub fn requested_sizes(&self) -> Vec<u32> {
        self.requested_sizes.lock().clone()
    }

    pub fn iterator_requests(&self) -> Vec<SequencePosition> {
        self.iterator_requests.lock().clone()
    }

    fn record(&self, index: usize) -> RawRecord {
        RawRecord {
            sequence_number: SequenceNumber::new(index.to_string()),
            partition_key: format!("pk-{}", index % 4),
            data: vec![b'x'; self.record_bytes],
            approximate_arrival_timestamp: None,
        }
    }
}

#[async_trait]
impl StreamClient for FakeShardClient {
    async fn list_shards(
        &self,
        _stream: &str,
        _exclusive_start_shard_id: Option<&str>,
    ) -> Result<ShardPage, ClientError> {
        Err(listing_only())
    }

    async fn get_shard_iterator(
        &self,
        _shard: &ShardHandle,
        position: &SequencePosition,
    ) -> Result<Option<ShardIterator>, ClientError> {
        let request = {
            let mut requests = self.iterator_requests.lock();
            requests.push(position.clone());
            requests.len()
        };
        if request <= self.throttled_iterator_requests {
            return Err(ClientError::Throttled("iterator rate exceeded".into()));
        }

        let offset = match position {
            SequencePosition::TrimHorizon | SequencePosition::AtTimestamp(_) => 0,
            SequencePosition::Latest => self.total,
            SequencePosition::Concrete(seq) => {
                let last: usize = seq
                    .as_str()
                    .parse()
                    .map_err(|_| ClientError::InvalidPosition(seq.to_string()))?;
                last + 1
            }
            SequencePosition::ShardEnd => {
                return Err(ClientError::InvalidPosition("SHARD_END".into()))
            }
        };

        if offset >= self.total {
            return Ok(None);
        }
        Ok(Some(ShardIterator::new(offset.to_string())))
    }

    async fn get_records(
        &self,
        iterator: &ShardIterator,
        max_records: u32,
    ) -> Result<GetRecordsResponse, ClientError> {
        let call = {
            let mut calls = self.fetch_calls.lock();
            *calls += 1;
            *calls
        };
        self.requested_sizes.lock().push(max_records);

        if call <= self.throttled_fetches {
            return Err(ClientError::Throttled("rate exceeded".into()));
        }
        if self.expire_at_call == Some(call) {
            return Err(ClientError::CursorExpired(format!(
                "iterator {} expired",
                iterator.as_str()
            )));
        }

        let offset: usize = iterator
            .as_str()
            .parse()
            .map_err(|_| ClientError::Other(anyhow::anyhow!("bad iterator")))?;
        let end = (offset + self.per_call.min(max_records as usize)).min(self.total);
        let records = (offset..end).map(|i| self.record(i)).collect();

        Ok(GetRecordsResponse {
            records,
            next_iterator: (end < self.total).then(|| ShardIterator::new(end.to_string())),
            millis_behind_latest: Some(((self.total - end) * 10) as u64),
        })
    }
}

/// First fetch returns `first_batch` records of `record_bytes` each; the second
/// returns as many records as requested and closes the shard.
pub struct AdaptiveShardClient {
    first_batch: usize,
    record_bytes: usize,
    requested_sizes: Mutex<Vec<u32>>,
}

impl AdaptiveShardClient {
    pub fn new(first_batch: usize, record_bytes: usize) -> Self {
        Self {
            first_batch,
            record_bytes,
            requested_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_sizes(&self) -> Vec<u32> {
        self.requested_sizes.lock().clone()
    }
}

#[async_trait]
impl StreamClient for AdaptiveShardClient {
    async fn list_shards(
        &self,
        _stream: &str,
        _exclusive_start_shard_id: Option<&str>,
    ) -> Result<ShardPage, ClientError> {
        Err(listing_only())
    }

    async fn get_shard_iterator(
        &self,
        _shard: &ShardHandle,
        _position: &SequencePosition,
    ) -> Result<Option<ShardIterator>, ClientError> {
        Ok(Some(ShardIterator::new("0")))
    }

    async fn get_records(
        &self,
        iterator: &ShardIterator,
        max_records: u32,
    ) -> Result<GetRecordsResponse, ClientError> {
        self.requested_sizes.lock().push(max_records);

        let offset: usize = iterator.as_str().parse().unwrap_or(0);
        let (count, next_iterator) = if offset == 0 {
            (
                self.first_batch,
                Some(ShardIterator::new(self.first_batch.to_string())),
            )
        } else {
            (max_records as usize, None)
        };

        let records = (offset..offset + count)
            .map(|i| RawRecord {
                sequence_number: SequenceNumber::new(i.to_string()),
                partition_key: "pk".into(),
                data: vec![0u8; self.record_bytes],
                approximate_arrival_timestamp: None,
            })
            .collect();

        Ok(GetRecordsResponse {
            records,
            next_iterator,
            millis_behind_latest: Some(0),
        })
    }
}

/// Fetches alternate between throttled and successful, one record per success,
/// until call `missing_at` reports the shard as gone.
pub struct FlakyShardClient {
    missing_at: usize,
    fetch_calls: Mutex<usize>,
}

impl FlakyShardClient {
    pub fn new(missing_at: usize) -> Self {
        Self {
            missing_at,
            fetch_calls: Mutex::new(0),
        }
    }

    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock()
    }
}

#[async_trait]
impl StreamClient for FlakyShardClient {
    async fn list_shards(
        &self,
        _stream: &str,
        _exclusive_start_shard_id: Option<&str>,
    ) -> Result<ShardPage, ClientError> {
        Err(listing_only())
    }

    async fn get_shard_iterator(
        &self,
        _shard: &ShardHandle,
        _position: &SequencePosition,
    ) -> Result<Option<ShardIterator>, ClientError> {
        Ok(Some(ShardIterator::new("flaky")))
    }

    async fn get_records(
        &self,
        _iterator: &ShardIterator,
        _max_records: u32,
    ) -> Result<GetRecordsResponse, ClientError> {
        let call = {
            let mut calls = self.fetch_calls.lock();
            *calls += 1;
            *calls
        };

        if call == self.missing_at {
            return Err(ClientError::ResourceNotFound("gone".into()));
        }
        if call % 2 == 1 {
            return Err(ClientError::Throttled("rate exceeded".into()));
        }

        Ok(GetRecordsResponse {
            records: vec![RawRecord {
                sequence_number: SequenceNumber::new((call / 2).to_string()),
                partition_key: "pk".into(),
                data: b"payload".to_vec(),
                approximate_arrival_timestamp: None,
            }],
            next_iterator: Some(ShardIterator::new("flaky")),
            millis_behind_latest: Some(0),
        })
    }
}

/// Open shard that never receives records
#[derive(Default)]
pub struct EmptyShardClient {
    fetch_calls: Mutex<usize>,
}

impl EmptyShardClient {
    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock()
    }
}

#[async_trait]
impl StreamClient for EmptyShardClient {
    async fn list_shards(
        &self,
        _stream: &str,
        _exclusive_start_shard_id: Option<&str>,
    ) -> Result<ShardPage, ClientError> {
        Err(listing_only())
    }

    async fn get_shard_iterator(
        &self,
        _shard: &ShardHandle,
        _position: &SequencePosition,
    ) -> Result<Option<ShardIterator>, ClientError> {
        Ok(Some(ShardIterator::new("tip")))
    }

    async fn get_records(
        &self,
        _iterator: &ShardIterator,
        _max_records: u32,
    ) -> Result<GetRecordsResponse, ClientError> {
        *self.fetch_calls.lock() += 1;
        Ok(GetRecordsResponse {
            records: Vec::new(),
            next_iterator: Some(ShardIterator::new("tip")),
            millis_behind_latest: Some(0),
        })
    }
}

/// Paged shard listing for one stream.
///
/// Each page is identified by the shard id it starts after, like the service's
/// exclusive start id. An optional page index is throttled exactly once.
pub struct FakeListingClient {
    pages: Vec<Vec<ShardHandle>>,
    status: StreamStatus,
    throttle_page: Option<usize>,
    throttled: Mutex<bool>,
    missing: bool,
    calls: Mutex<Vec<Option<String>>>,
}

impl FakeListingClient {
    pub fn new(stream: &str, pages: &[&[&str]]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|ids| ids.iter().map(|id| shard_handle(stream, id)).collect())
                .collect(),
            status: StreamStatus::Active,
            throttle_page: None,
            throttled: Mutex::new(false),
            missing: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_status(mut self, status: StreamStatus) -> Self {
        self.status = status;
        self
    }

    /// Throttle the first request for page `index` (0-based)
    pub fn with_throttled_page(mut self, index: usize) -> Self {
        self.throttle_page = Some(index);
        self
    }

    pub fn missing_stream(mut self) -> Self {
        self.missing = true;
        self
    }

    /// Exclusive start ids of every listing call, in order
    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().clone()
    }

    fn page_index(&self, exclusive_start_shard_id: Option<&str>) -> usize {
        match exclusive_start_shard_id {
            None => 0,
            Some(id) => self
                .pages
                .iter()
                .position(|page| page.last().map(|s| s.shard_id.as_str()) == Some(id))
                .map(|i| i + 1)
                .unwrap_or(self.pages.len()),
        }
    }
}

#[async_trait]
impl StreamClient for FakeListingClient {
    async fn list_shards(
        &self,
        stream: &str,
        exclusive_start_shard_id: Option<&str>,
    ) -> Result<ShardPage, ClientError> {
        self.calls
            .lock()
            .push(exclusive_start_shard_id.map(str::to_string));

        if self.missing {
            return Err(ClientError::ResourceNotFound(format!(
                "stream {stream} not found"
            )));
        }

        let index = self.page_index(exclusive_start_shard_id);
        if self.throttle_page == Some(index) {
            let mut throttled = self.throttled.lock();
            if !*throttled {
                *throttled = true;
                return Err(ClientError::Throttled("describe limit exceeded".into()));
            }
        }

        Ok(ShardPage {
            shards: self.pages.get(index).cloned().unwrap_or_default(),
            has_more_shards: index + 1 < self.pages.len(),
            stream_status: self.status,
        })
    }

    async fn get_shard_iterator(
        &self,
        _shard: &ShardHandle,
        _position: &SequencePosition,
    ) -> Result<Option<ShardIterator>, ClientError> {
        Err(listing_only())
    }

    async fn get_records(
        &self,
        _iterator: &ShardIterator,
        _max_records: u32,
    ) -> Result<GetRecordsResponse, ClientError> {
        Err(listing_only())
    }
}

/// Metrics sink that keeps every observation
#[derive(Default)]
pub struct RecordingMetrics {
    observations: Mutex<Vec<(ShardMetric, f64)>>,
    finished: Mutex<Vec<String>>,
}

impl RecordingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn values(&self, metric: ShardMetric) -> Vec<f64> {
        self.observations
            .lock()
            .iter()
            .filter(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Shard ids reported as finished, in order
    pub fn finished_shards(&self) -> Vec<String> {
        self.finished.lock().clone()
    }
}

impl ShardMetricsSink for RecordingMetrics {
    fn observe(&self, _shard: &ShardHandle, metric: ShardMetric, value: f64) {
        self.observations.lock().push((metric, value));
    }

    fn shard_finished(&self, shard: &ShardHandle) {
        self.finished.lock().push(shard.shard_id.clone());
    }
}
