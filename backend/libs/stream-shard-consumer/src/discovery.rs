//! Shard discovery.
//!
//! Pages the listing operation of one or more streams, retrying throttled pages
//! with full-jitter backoff. Discovery never touches shard state; callers feed the
//! result into [`crate::ShardRegistry::register_discovered`].

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backoff::{FullJitterBackoff, RetryAttempts};
use crate::client::StreamClient;
use crate::config::{BackoffConfig, ConsumerConfig};
use crate::error::{ClientError, ConsumerError, Result};
use crate::model::ShardHandle;

/// Result of one discovery round over several streams
#[derive(Debug, Clone, Default)]
pub struct DiscoveredShards {
    /// Newly listed shards per stream, in listing order
    pub shards: HashMap<String, Vec<ShardHandle>>,
    /// Last listed shard id per stream; the exclusive start of the next round
    pub last_seen_shard_ids: HashMap<String, String>,
}

impl DiscoveredShards {
    pub fn is_empty(&self) -> bool {
        self.shards.values().all(Vec::is_empty)
    }

    /// Total number of shards across all streams
    pub fn len(&self) -> usize {
        self.shards.values().map(Vec::len).sum()
    }

    pub fn into_shards(self) -> impl Iterator<Item = ShardHandle> {
        self.shards.into_values().flatten()
    }
}

pub struct ShardDiscovery<C: StreamClient + ?Sized> {
    client: Arc<C>,
    backoff: FullJitterBackoff,
    max_retries: Option<u32>,
}

impl<C: StreamClient + ?Sized> ShardDiscovery<C> {
    pub fn new(client: Arc<C>, backoff: &BackoffConfig) -> Self {
        Self {
            client,
            backoff: FullJitterBackoff::from(backoff),
            max_retries: backoff.max_retries,
        }
    }

    pub fn from_config(client: Arc<C>, config: &ConsumerConfig) -> Self {
        Self::new(client, &config.discovery_backoff)
    }

    /// List every shard of `stream` after `last_seen_shard_id` (exclusive).
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` when the stream does not exist (never retried), or
    /// `RetriesExhausted` when a retry bound is configured and a page stays
    /// throttled past it.
    pub async fn list_shards(
        &self,
        stream: &str,
        last_seen_shard_id: Option<&str>,
    ) -> Result<Vec<ShardHandle>> {
        let mut shards = Vec::new();
        let mut cursor = last_seen_shard_id.map(str::to_string);
        let mut attempts = RetryAttempts::new(self.backoff.clone(), self.max_retries);

        loop {
            let page = match self.client.list_shards(stream, cursor.as_deref()).await {
                Ok(page) => {
                    attempts.reset();
                    page
                }
                Err(ClientError::Throttled(msg)) => {
                    let Some(delay) = attempts.next_delay() else {
                        return Err(ConsumerError::RetriesExhausted {
                            operation: "list_shards",
                            attempts: attempts.attempts() + 1,
                        });
                    };
                    warn!(
                        stream = %stream,
                        attempt = attempts.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Shard listing throttled, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(ConsumerError::from_client(e)),
            };

            debug!(
                stream = %stream,
                page_size = page.shards.len(),
                has_more = page.has_more_shards,
                status = %page.stream_status,
                "Listed shard page"
            );

            if page.stream_status.is_transitional() {
                warn!(
                    stream = %stream,
                    status = %page.stream_status,
                    "Stream is not active, shard list may be incomplete"
                );
            }

            let has_more = page.has_more_shards;
            let empty = page.shards.is_empty();
            if let Some(last) = page.shards.last() {
                cursor = Some(last.shard_id.clone());
            }
            shards.extend(page.shards);

            if !has_more {
                break;
            }
            if empty {
                warn!(
                    stream = %stream,
                    cursor = ?cursor,
                    "Listing reported more shards but returned an empty page, stopping"
                );
                break;
            }
        }

        Ok(shards)
    }

    /// Run [`Self::list_shards`] for each stream, starting after its last seen shard id.
    ///
    /// Streams are listed one after another; the first fatal error aborts the round.
    pub async fn discover(
        &self,
        streams: &HashMap<String, Option<String>>,
    ) -> Result<DiscoveredShards> {
        let mut discovered = DiscoveredShards::default();

        for (stream, last_seen) in streams {
            let shards = self.list_shards(stream, last_seen.as_deref()).await?;

            let last = shards
                .last()
                .map(|s| s.shard_id.clone())
                .or_else(|| last_seen.clone());
            if let Some(last) = last {
                discovered.last_seen_shard_ids.insert(stream.clone(), last);
            }
            if !shards.is_empty() {
                info!(stream = %stream, new_shards = shards.len(), "Discovered new shards");
            }
            discovered.shards.insert(stream.clone(), shards);
        }

        Ok(discovered)
    }
}
