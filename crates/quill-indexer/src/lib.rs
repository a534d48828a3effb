//! Polling log indexer: pages historical contract logs out of an execution
//! node and streams them, in order, to per-contract channels. Consumers can
//! rewind a watcher after detecting a reorg.

pub(crate) mod metrics;
mod streamer;

pub use metrics::Metrics;
pub use streamer::{
    Builder,
    LogStreamer,
    WatcherConfig,
    DEFAULT_PAGE_SIZE,
};
