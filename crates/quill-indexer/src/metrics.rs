use std::time::Duration;

use metrics::{
    counter,
    describe_counter,
    describe_gauge,
    describe_histogram,
    gauge,
    histogram,
    Counter,
    Gauge,
    Histogram,
    Unit,
};
use quill_telemetry::metric_names;

pub struct Metrics {
    _private: (),
}

impl Metrics {
    /// Describes the indexer metrics against the globally installed recorder
    /// and leaks the handle for the watcher tasks.
    #[must_use]
    pub fn register() -> &'static Self {
        describe_gauge!(
            SAFE_BLOCK_HEIGHT,
            Unit::Count,
            "The highest block a watcher considers safe to index, per watcher"
        );
        describe_counter!(
            FETCHED_LOG_COUNT,
            Unit::Count,
            "The number of logs fetched from the chain, per watcher"
        );
        describe_histogram!(
            FETCH_LATENCY,
            Unit::Seconds,
            "The latency of a single log page fetch, per watcher"
        );
        describe_counter!(
            FETCH_ERROR_COUNT,
            Unit::Count,
            "The number of retried page fetch failures, per watcher"
        );
        Box::leak(Box::new(Self {
            _private: (),
        }))
    }

    /// Creates the labelled handles for one watcher.
    pub(crate) fn watcher(&self, id: &str) -> WatcherMetrics {
        WatcherMetrics {
            safe_block_height: gauge!(SAFE_BLOCK_HEIGHT, "watcher" => id.to_string()),
            fetched_log_count: counter!(FETCHED_LOG_COUNT, "watcher" => id.to_string()),
            fetch_latency: histogram!(FETCH_LATENCY, "watcher" => id.to_string()),
            fetch_error_count: counter!(FETCH_ERROR_COUNT, "watcher" => id.to_string()),
        }
    }
}

pub(crate) struct WatcherMetrics {
    safe_block_height: Gauge,
    fetched_log_count: Counter,
    fetch_latency: Histogram,
    fetch_error_count: Counter,
}

impl WatcherMetrics {
    pub(crate) fn set_safe_block_height(&self, height: u64) {
        #[allow(clippy::cast_precision_loss)]
        self.safe_block_height.set(height as f64);
    }

    pub(crate) fn increment_fetched_log_count(&self, count: u64) {
        self.fetched_log_count.increment(count);
    }

    pub(crate) fn record_fetch_latency(&self, latency: Duration) {
        self.fetch_latency.record(latency);
    }

    pub(crate) fn increment_fetch_error_count(&self) {
        self.fetch_error_count.increment(1);
    }
}

metric_names!(pub const METRICS_NAMES:
    SAFE_BLOCK_HEIGHT,
    FETCHED_LOG_COUNT,
    FETCH_LATENCY,
    FETCH_ERROR_COUNT
);
