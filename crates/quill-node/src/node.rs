use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};

use ethers::{
    contract::EthEvent as _,
    providers::{
        Http,
        Provider,
    },
    signers::{
        LocalWallet,
        Signer as _,
    },
    types::{
        Address,
        Log,
        U256,
    },
};
use quill_chain::{
    gas_oracle::DEFAULT_FALLBACK_PRICE_WEI,
    publisher,
    ChainClient as _,
    NoncePool,
    NonceSequencer,
    Publisher,
};
use quill_contracts::{
    ChainEvent,
    IdentityUpdateCreatedFilter,
    MessageSentFilter,
};
use quill_eyre::eyre::{
    self,
    WrapErr as _,
};
use quill_indexer::{
    LogStreamer,
    WatcherConfig,
    DEFAULT_PAGE_SIZE,
};
use quill_telemetry::display;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    instrument,
    warn,
};

use crate::Config;

/// How long a contract watcher may go without a successful page fetch.
const MAX_WATCHER_SILENCE: Duration = Duration::from_secs(300);
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// A handle for instructing the [`Node`] to shut down.
///
/// It is returned along with its related `Node` from [`Node::new`]. The
/// node is shut down by calling [`ShutdownHandle::shutdown`] or by dropping
/// the handle.
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    #[must_use]
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
        }
    }

    /// Returns a clone of the wrapped cancellation token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Consumes `self` and cancels the wrapped cancellation token.
    pub fn shutdown(self) {
        self.token.cancel();
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if !self.token.is_cancelled() {
            info!("shutdown handle dropped, issuing shutdown to all services");
        }
        self.token.cancel();
    }
}

/// Wires the nonce pool, transaction publisher, log indexer and event
/// consumers together.
pub struct Node {
    shutdown_token: CancellationToken,
    publisher: Publisher<Provider<Http>>,
    streamer: LogStreamer<Provider<Http>>,
    consumers: Vec<JoinHandle<()>>,
    // kept alive so the watchers stay rewindable
    _rewind_handles: Vec<mpsc::Sender<u64>>,
}

impl Node {
    /// Builds the node from config.
    ///
    /// # Errors
    /// Returns an error if the rpc endpoint, key or contract addresses are
    /// malformed, the nonce database cannot be opened, or the publisher
    /// cannot align the nonce pool with the chain.
    pub async fn new(
        cfg: Config,
        chain_metrics: &'static quill_chain::Metrics,
        indexer_metrics: &'static quill_indexer::Metrics,
    ) -> eyre::Result<(Self, ShutdownHandle)> {
        let shutdown_token = CancellationToken::new();

        let provider = Provider::<Http>::try_from(cfg.rpc_endpoint.as_str())
            .wrap_err("failed constructing provider from the rpc endpoint")?;
        let client = Arc::new(provider);

        let chain_id = client
            .chain_id()
            .await
            .wrap_err("failed reading the chain id")?;
        let wallet = cfg
            .private_key
            .parse::<LocalWallet>()
            .wrap_err("failed parsing the configured private key")?
            .with_chain_id(chain_id);
        info!(chain_id, address = %wallet.address(), "signer initialized");

        let message_broadcaster = parse_address(
            &cfg.message_broadcaster_address,
            "message broadcaster address",
        )?;
        let identity_update_broadcaster = parse_address(
            &cfg.identity_update_broadcaster_address,
            "identity update broadcaster address",
        )?;
        let parameter_registry =
            parse_address(&cfg.parameter_registry_address, "parameter registry address")?;

        let pool = NoncePool::open(Path::new(&cfg.database_path))
            .wrap_err("failed opening the nonce database")?;
        let sequencer = NonceSequencer::new(Arc::new(pool));

        let publisher = publisher::Builder {
            client: client.clone(),
            signer: Arc::new(wallet),
            sequencer,
            message_broadcaster,
            identity_update_broadcaster,
            parameter_registry,
            fallback_gas_price: U256::from(DEFAULT_FALLBACK_PRICE_WEI),
            shutdown_token: shutdown_token.clone(),
            metrics: chain_metrics,
        }
        .build()
        .await
        .wrap_err("failed starting the transaction publisher")?;

        let mut streamer = quill_indexer::Builder {
            client,
            lag: cfg.block_lag,
            page_size: DEFAULT_PAGE_SIZE,
            shutdown_token: shutdown_token.clone(),
            metrics: indexer_metrics,
        }
        .build()
        .wrap_err("failed building the log streamer")?;

        let mut consumers = Vec::new();
        let mut rewind_handles = Vec::new();
        for (id, address, topic) in [
            (
                "message-broadcaster",
                message_broadcaster,
                MessageSentFilter::signature(),
            ),
            (
                "identity-update-broadcaster",
                identity_update_broadcaster,
                IdentityUpdateCreatedFilter::signature(),
            ),
        ] {
            let (log_rx, rewind_tx) = streamer
                .watch_contract(WatcherConfig {
                    id: id.to_string(),
                    address,
                    topics: vec![topic],
                    start_block: cfg.start_block,
                    max_silence: MAX_WATCHER_SILENCE,
                    channel_capacity: EVENT_CHANNEL_CAPACITY,
                })
                .wrap_err_with(|| format!("failed registering the {id} watcher"))?;
            consumers.push(tokio::spawn(consume_events(id, log_rx)));
            rewind_handles.push(rewind_tx);
        }

        Ok((
            Self {
                shutdown_token: shutdown_token.clone(),
                publisher,
                streamer,
                consumers,
                _rewind_handles: rewind_handles,
            },
            ShutdownHandle::new(shutdown_token),
        ))
    }

    /// The transaction publisher, for submitting payloads through this node.
    #[must_use]
    pub fn publisher(&self) -> &Publisher<Provider<Http>> {
        &self.publisher
    }

    /// Runs until the indexer exits or shutdown is requested, then winds
    /// down the publisher and the event consumers.
    pub async fn run(self) -> eyre::Result<()> {
        let Self {
            shutdown_token,
            publisher,
            streamer,
            consumers,
            _rewind_handles,
        } = self;

        // resolves once all watchers have exited, which the shutdown token
        // triggers on cancellation
        let result = streamer.run().await.wrap_err("log streamer exited");

        shutdown_token.cancel();
        publisher.shutdown().await;
        drop(_rewind_handles);
        for consumer in consumers {
            if let Err(error) = consumer.await {
                warn!(
                    error = &error as &dyn std::error::Error,
                    "event consumer task failed during shutdown"
                );
            }
        }
        result
    }
}

/// Logs every event a watcher delivers; exits when the channel closes.
#[instrument(skip_all, fields(watcher = id))]
async fn consume_events(id: &'static str, mut log_rx: mpsc::Receiver<Log>) {
    while let Some(log) = log_rx.recv().await {
        match ChainEvent::decode(&log) {
            Ok(ChainEvent::MessageSent(event)) => info!(
                group_id = %display::hex(&event.group_id),
                sequence_id = event.sequence_id,
                "indexed MessageSent event",
            ),
            Ok(ChainEvent::IdentityUpdateCreated(event)) => info!(
                inbox_id = %display::hex(&event.inbox_id),
                sequence_id = event.sequence_id,
                "indexed IdentityUpdateCreated event",
            ),
            Ok(ChainEvent::ParameterSet(event)) => info!(
                key = %event.key,
                value = %display::hex(&event.value),
                "indexed ParameterSet event",
            ),
            Err(error) => warn!(
                error = &error as &dyn std::error::Error,
                block_number = log.block_number.map(|number| number.as_u64()),
                "failed decoding indexed log",
            ),
        }
    }
    info!("event channel closed, consumer exiting");
}

fn parse_address(input: &str, name: &'static str) -> eyre::Result<Address> {
    input
        .parse::<Address>()
        .wrap_err_with(|| format!("failed parsing the {name}"))
}
