//! Per-shard consumer metrics.

use prometheus::core::Collector;
use prometheus::{CounterVec, GaugeVec, Opts, Registry};
use tracing::{debug, warn};

use crate::model::ShardHandle;

/// Named per-shard observations reported by the consumer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardMetric {
    /// Records returned by the last fetch
    RecordsPerCall,
    /// Payload bytes returned by the last fetch
    BytesPerCall,
    /// Service-reported lag behind the tip of the shard
    MillisBehindLatest,
    /// Wall time of the last fetch/emit iteration
    LoopLatencyMillis,
    /// Adaptive read estimate of the average record size
    AverageRecordSizeBytes,
    /// Records requested on the last fetch
    RequestedRecordsPerCall,
    /// Time slept to pace the loop to the poll interval
    SleepTimeMillis,
}

impl ShardMetric {
    pub fn name(self) -> &'static str {
        match self {
            ShardMetric::RecordsPerCall => "records_per_call",
            ShardMetric::BytesPerCall => "bytes_per_call",
            ShardMetric::MillisBehindLatest => "millis_behind_latest",
            ShardMetric::LoopLatencyMillis => "loop_latency_millis",
            ShardMetric::AverageRecordSizeBytes => "average_record_size_bytes",
            ShardMetric::RequestedRecordsPerCall => "requested_records_per_call",
            ShardMetric::SleepTimeMillis => "sleep_time_millis",
        }
    }

    const ALL: [ShardMetric; 7] = [
        ShardMetric::RecordsPerCall,
        ShardMetric::BytesPerCall,
        ShardMetric::MillisBehindLatest,
        ShardMetric::LoopLatencyMillis,
        ShardMetric::AverageRecordSizeBytes,
        ShardMetric::RequestedRecordsPerCall,
        ShardMetric::SleepTimeMillis,
    ];
}

/// Fire-and-forget metrics target. Implementations must not block.
pub trait ShardMetricsSink: Send + Sync {
    fn observe(&self, shard: &ShardHandle, metric: ShardMetric, value: f64);

    /// Called once a shard is fully consumed; no further observations follow
    fn shard_finished(&self, _shard: &ShardHandle) {}
}

/// Discards every observation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopShardMetrics;

impl ShardMetricsSink for NoopShardMetrics {
    fn observe(&self, _shard: &ShardHandle, _metric: ShardMetric, _value: f64) {}
}

/// Prometheus-backed shard metrics.
///
/// Each observation sets a per-shard gauge; records and bytes are also
/// accumulated into counters.
#[derive(Clone)]
pub struct PrometheusShardMetrics {
    gauges: Vec<(ShardMetric, GaugeVec)>,
    records_total: CounterVec,
    bytes_total: CounterVec,
}

impl PrometheusShardMetrics {
    /// Register metrics in the process-wide default registry
    pub fn new(service: &str) -> Self {
        Self::with_registry(service, prometheus::default_registry())
    }

    pub fn with_registry(service: &str, registry: &Registry) -> Self {
        let labels = &["stream", "shard_id"];
        let opts = |name: &str, help: &str| {
            Opts::new(format!("shard_consumer_{name}"), help.to_string())
                .const_label("service", service)
        };

        let gauges: Vec<(ShardMetric, GaugeVec)> = ShardMetric::ALL
            .iter()
            .map(|&metric| {
                let gauge = GaugeVec::new(
                    opts(metric.name(), &format!("Last observed {} per shard", metric.name())),
                    labels,
                )
                .expect("valid metric opts for shard consumer gauge");
                (metric, gauge)
            })
            .collect();

        let records_total = CounterVec::new(
            opts("records_total", "Total records fetched per shard"),
            labels,
        )
        .expect("valid metric opts for shard_consumer_records_total");

        let bytes_total = CounterVec::new(
            opts("bytes_total", "Total payload bytes fetched per shard"),
            labels,
        )
        .expect("valid metric opts for shard_consumer_bytes_total");

        let collectors = gauges
            .iter()
            .map(|(_, g)| Box::new(g.clone()) as Box<dyn Collector>)
            .chain([
                Box::new(records_total.clone()) as Box<dyn Collector>,
                Box::new(bytes_total.clone()) as Box<dyn Collector>,
            ]);
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                warn!("Failed to register shard consumer metric: {}", e);
            }
        }

        Self {
            gauges,
            records_total,
            bytes_total,
        }
    }
}

impl ShardMetricsSink for PrometheusShardMetrics {
    fn observe(&self, shard: &ShardHandle, metric: ShardMetric, value: f64) {
        let labels = [shard.stream.as_str(), shard.shard_id.as_str()];
        if let Some((_, gauge)) = self.gauges.iter().find(|(m, _)| *m == metric) {
            gauge.with_label_values(&labels).set(value);
        }
        match metric {
            ShardMetric::RecordsPerCall => {
                self.records_total.with_label_values(&labels).inc_by(value)
            }
            ShardMetric::BytesPerCall => {
                self.bytes_total.with_label_values(&labels).inc_by(value)
            }
            _ => {}
        }
    }

    fn shard_finished(&self, shard: &ShardHandle) {
        let labels = [shard.stream.as_str(), shard.shard_id.as_str()];
        let results = self
            .gauges
            .iter()
            .map(|(_, gauge)| gauge.remove_label_values(&labels))
            .chain([
                self.records_total.remove_label_values(&labels),
                self.bytes_total.remove_label_values(&labels),
            ]);
        for result in results {
            if let Err(e) = result {
                debug!(shard = %shard, error = %e, "No metric series to remove");
            }
        }
    }
}
