use std::{
    collections::HashSet,
    sync::Arc,
    time::Duration,
};

use ethers::types::{
    Address,
    Filter,
    Log,
    ValueOrArray,
    H256,
};
use quill_chain::ChainClient;
use quill_eyre::eyre::{
    self,
    bail,
    ensure,
    WrapErr as _,
};
use tokio::{
    sync::mpsc,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    error,
    info,
    instrument,
    warn,
};

use crate::metrics::{
    Metrics,
    WatcherMetrics,
};

/// Blocks per `eth_getLogs` page; the page itself spans `page_size + 1`
/// blocks because the range is inclusive at both ends.
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

const SLEEP_ON_ERROR: Duration = Duration::from_millis(100);
const SLEEP_NO_LOGS: Duration = Duration::from_secs(1);
const SLEEP_CAUGHT_UP: Duration = Duration::from_secs(1);

/// Everything needed to filter one contract's logs.
pub struct WatcherConfig {
    pub id: String,
    pub address: Address,
    pub topics: Vec<H256>,
    pub start_block: u64,
    /// How long the watcher may go without a successful page fetch before it
    /// fails.
    pub max_silence: Duration,
    pub channel_capacity: usize,
}

pub struct Builder<C> {
    pub client: Arc<C>,
    /// Blocks withheld from the chain tip; only blocks at or below
    /// `tip - lag` are indexed.
    pub lag: u64,
    pub page_size: u64,
    pub shutdown_token: CancellationToken,
    pub metrics: &'static Metrics,
}

impl<C: ChainClient> Builder<C> {
    /// # Errors
    /// Returns an error if `page_size` is zero.
    pub fn build(self) -> eyre::Result<LogStreamer<C>> {
        let Self {
            client,
            lag,
            page_size,
            shutdown_token,
            metrics,
        } = self;
        ensure!(page_size > 0, "page_size must be greater than zero");
        Ok(LogStreamer {
            client,
            lag,
            page_size,
            shutdown_token,
            metrics,
            watcher_ids: HashSet::new(),
            watchers: Vec::new(),
        })
    }
}

/// Runs one polling task per registered contract watcher.
pub struct LogStreamer<C> {
    client: Arc<C>,
    lag: u64,
    page_size: u64,
    shutdown_token: CancellationToken,
    metrics: &'static Metrics,
    watcher_ids: HashSet<String>,
    watchers: Vec<Watcher<C>>,
}

impl<C: ChainClient> LogStreamer<C> {
    /// Registers a contract watcher, returning its log channel and the
    /// channel used to rewind it after a reorg.
    ///
    /// # Errors
    /// Returns an error if a watcher with the same id is already registered.
    pub fn watch_contract(
        &mut self,
        config: WatcherConfig,
    ) -> eyre::Result<(mpsc::Receiver<Log>, mpsc::Sender<u64>)> {
        ensure!(
            self.watcher_ids.insert(config.id.clone()),
            "a watcher with id `{}` is already registered",
            config.id,
        );
        let (log_tx, log_rx) = mpsc::channel(config.channel_capacity);
        let (rewind_tx, rewind_rx) = mpsc::channel(1);
        let watcher_metrics = self.metrics.watcher(&config.id);
        self.watchers.push(Watcher {
            config,
            client: self.client.clone(),
            lag: self.lag,
            page_size: self.page_size,
            shutdown_token: self.shutdown_token.clone(),
            log_tx,
            rewind_rx,
            metrics: watcher_metrics,
        });
        Ok((log_rx, rewind_tx))
    }

    /// Runs all watchers to completion. A watcher failure cancels the
    /// shutdown token so its peers wind down; the first failure is returned
    /// once every task has exited.
    pub async fn run(self) -> eyre::Result<()> {
        let Self {
            shutdown_token,
            watchers,
            ..
        } = self;
        let mut tasks = tokio::task::JoinSet::new();
        for watcher in watchers {
            tasks.spawn(watcher.run());
        }
        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(report)) => report,
                Err(join_error) => {
                    eyre::Report::new(join_error).wrap_err("watcher task panicked")
                }
            };
            error!(
                error = AsRef::<dyn std::error::Error>::as_ref(&failure),
                "watcher failed; shutting down peers",
            );
            shutdown_token.cancel();
            if result.is_ok() {
                result = Err(failure);
            }
        }
        result
    }
}

struct Watcher<C> {
    config: WatcherConfig,
    client: Arc<C>,
    lag: u64,
    page_size: u64,
    shutdown_token: CancellationToken,
    log_tx: mpsc::Sender<Log>,
    rewind_rx: mpsc::Receiver<u64>,
    metrics: WatcherMetrics,
}

impl<C: ChainClient> Watcher<C> {
    #[instrument(skip_all, fields(id = %self.config.id, address = %self.config.address), err)]
    async fn run(self) -> eyre::Result<()> {
        let Self {
            config,
            client,
            lag,
            page_size,
            shutdown_token,
            log_tx,
            mut rewind_rx,
            metrics,
        } = self;
        let mut cursor = config.start_block;
        let mut stall_deadline = Instant::now() + config.max_silence;
        let mut rewind_open = true;
        loop {
            tokio::select! {
                biased;

                () = shutdown_token.cancelled() => {
                    info!("watcher shutting down");
                    return Ok(());
                }

                () = tokio::time::sleep_until(stall_deadline) => {
                    bail!(
                        "no successful page fetch within {}",
                        humantime::format_duration(config.max_silence),
                    );
                }

                rewind = rewind_rx.recv(), if rewind_open => {
                    match rewind {
                        Some(block) => {
                            warn!(cursor, rewind_to = block, "rewinding after reorg");
                            cursor = block;
                            stall_deadline = Instant::now() + config.max_silence;
                        }
                        None => rewind_open = false,
                    }
                }

                page = get_next_page(&*client, &config, &metrics, lag, page_size, cursor) => match page {
                    Err(report) => {
                        metrics.increment_fetch_error_count();
                        warn!(
                            cursor,
                            error = AsRef::<dyn std::error::Error>::as_ref(&report),
                            "failed fetching page; retrying",
                        );
                        tokio::time::sleep(SLEEP_ON_ERROR).await;
                    }
                    Ok(page) => {
                        stall_deadline = Instant::now() + config.max_silence;
                        let got_logs = !page.logs.is_empty();
                        for log in page.logs {
                            if log_tx.send(log).await.is_err() {
                                info!("log receiver dropped, closing watcher");
                                return Ok(());
                            }
                        }
                        match page.next {
                            Some(next) => {
                                debug!(from = cursor, next, "page processed");
                                cursor = next;
                                if !got_logs {
                                    tokio::time::sleep(SLEEP_NO_LOGS).await;
                                }
                            }
                            None => tokio::time::sleep(SLEEP_CAUGHT_UP).await,
                        }
                    }
                },
            }
        }
    }
}

async fn get_next_page<C: ChainClient>(
    client: &C,
    config: &WatcherConfig,
    metrics: &WatcherMetrics,
    lag: u64,
    page_size: u64,
    from: u64,
) -> eyre::Result<Page> {
    let highest = client
        .block_number()
        .await
        .wrap_err("failed reading chain height")?;
    let safe = highest.saturating_sub(lag);
    metrics.set_safe_block_height(safe);
    let Some((from, to)) = page_bounds(from, page_size, safe) else {
        return Ok(Page {
            logs: Vec::new(),
            next: None,
        });
    };
    let mut filter = Filter::new()
        .address(config.address)
        .from_block(from)
        .to_block(to);
    filter.topics[0] = Some(ValueOrArray::Array(
        config.topics.iter().copied().map(Some).collect(),
    ));
    let started = Instant::now();
    let logs = client
        .get_logs(&filter)
        .await
        .wrap_err("failed fetching logs")?;
    metrics.record_fetch_latency(started.elapsed());
    metrics.increment_fetched_log_count(logs.len() as u64);
    Ok(Page {
        logs,
        next: Some(to.saturating_add(1)),
    })
}

struct Page {
    logs: Vec<Log>,
    /// The cursor for the following page; `None` when caught up with the
    /// safe head.
    next: Option<u64>,
}

/// The inclusive block range of the next page, or `None` when the cursor is
/// past the safe head.
fn page_bounds(from: u64, page_size: u64, safe: u64) -> Option<(u64, u64)> {
    if from > safe {
        return None;
    }
    Some((from, from.saturating_add(page_size).min(safe)))
}
