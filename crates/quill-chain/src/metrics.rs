use std::time::Duration;

use metrics::{
    counter,
    describe_counter,
    describe_histogram,
    histogram,
    Counter,
    Histogram,
    Unit,
};
use quill_telemetry::metric_names;

pub struct Metrics {
    transaction_submission_count: Counter,
    transaction_submission_failure_count: Counter,
    transaction_submission_latency: Histogram,
    nonce_consumed_retry_count: Counter,
    nonce_backoff_count: Counter,
    confirmation_latency: Histogram,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        describe_counter!(
            TRANSACTION_SUBMISSION_COUNT,
            Unit::Count,
            "The number of raw transactions submitted to the execution node"
        );
        let transaction_submission_count = counter!(TRANSACTION_SUBMISSION_COUNT);

        describe_counter!(
            TRANSACTION_SUBMISSION_FAILURE_COUNT,
            Unit::Count,
            "The number of raw transaction submissions rejected by the execution node"
        );
        let transaction_submission_failure_count = counter!(TRANSACTION_SUBMISSION_FAILURE_COUNT);

        describe_histogram!(
            TRANSACTION_SUBMISSION_LATENCY,
            Unit::Seconds,
            "The latency of submitting a raw transaction to the execution node"
        );
        let transaction_submission_latency = histogram!(TRANSACTION_SUBMISSION_LATENCY);

        describe_counter!(
            NONCE_CONSUMED_RETRY_COUNT,
            Unit::Count,
            "The number of submissions retried because their nonce was already used on chain"
        );
        let nonce_consumed_retry_count = counter!(NONCE_CONSUMED_RETRY_COUNT);

        describe_counter!(
            NONCE_BACKOFF_COUNT,
            Unit::Count,
            "The number of submissions backed off because the node reported the nonce too high"
        );
        let nonce_backoff_count = counter!(NONCE_BACKOFF_COUNT);

        describe_histogram!(
            CONFIRMATION_LATENCY,
            Unit::Seconds,
            "The latency between submitting a transaction and reading its receipt"
        );
        let confirmation_latency = histogram!(CONFIRMATION_LATENCY);

        Self {
            transaction_submission_count,
            transaction_submission_failure_count,
            transaction_submission_latency,
            nonce_consumed_retry_count,
            nonce_backoff_count,
            confirmation_latency,
        }
    }

    /// Registers the metrics against the globally installed recorder and
    /// leaks them, giving the handles the `'static` lifetime the publisher
    /// tasks require.
    #[must_use]
    pub fn register() -> &'static Self {
        Box::leak(Box::new(Self::new()))
    }

    pub(crate) fn increment_transaction_submission_count(&self) {
        self.transaction_submission_count.increment(1);
    }

    pub(crate) fn increment_transaction_submission_failure_count(&self) {
        self.transaction_submission_failure_count.increment(1);
    }

    pub(crate) fn record_transaction_submission_latency(&self, latency: Duration) {
        self.transaction_submission_latency.record(latency);
    }

    pub(crate) fn increment_nonce_consumed_retry_count(&self) {
        self.nonce_consumed_retry_count.increment(1);
    }

    pub(crate) fn increment_nonce_backoff_count(&self) {
        self.nonce_backoff_count.increment(1);
    }

    pub(crate) fn record_confirmation_latency(&self, latency: Duration) {
        self.confirmation_latency.record(latency);
    }
}

metric_names!(pub const METRICS_NAMES:
    TRANSACTION_SUBMISSION_COUNT,
    TRANSACTION_SUBMISSION_FAILURE_COUNT,
    TRANSACTION_SUBMISSION_LATENCY,
    NONCE_CONSUMED_RETRY_COUNT,
    NONCE_BACKOFF_COUNT,
    CONFIRMATION_LATENCY
);
