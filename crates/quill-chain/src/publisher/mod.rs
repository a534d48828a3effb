//! Broadcasts ledger payloads and confirms them against receipt logs.

use std::{
    sync::Arc,
    time::Duration,
};

use ethers::{
    abi::AbiEncode as _,
    types::{
        transaction::eip2718::TypedTransaction,
        Address,
        Bytes,
        TransactionReceipt,
        TransactionRequest,
        H256,
        U256,
    },
};
use quill_contracts::{
    extract_events,
    identity_update_broadcaster::{
        AddIdentityUpdateCall,
        BootstrapIdentityUpdatesCall,
        IdentityUpdateCreatedFilter,
    },
    message_broadcaster::{
        AddMessageCall,
        BootstrapMessagesCall,
        MessageSentFilter,
    },
    parameter_registry::{
        GetCall,
        ParameterSetFilter,
        SetCall,
        SetManyCall,
    },
    EventError,
};
use quill_eyre::eyre::{
    self,
    bail,
    ensure,
    WrapErr as _,
};
use rand::Rng as _;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use crate::{
    client::ChainClient,
    errors::BlockchainError,
    gas_oracle::GasOracle,
    metrics::Metrics,
    nonce::{
        NonceContext,
        NonceSequencer,
    },
    params::{
        ParamKind,
        ParamValue,
    },
    signer::TransactionSigner,
};

pub(crate) mod retry;

use retry::Classification;

/// Fixed gas limit for broadcast transactions.
const GAS_LIMIT: u64 = 6_000_000;
/// How long a submitted transaction may stay unconfirmed before giving up.
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(2);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Upper bound of the random backoff after a nonce-too-high rejection.
const MAX_NONCE_BACKOFF_MILLIS: u64 = 500;
/// Cadence of the background task topping up the nonce pool.
const REPLENISH_INTERVAL: Duration = Duration::from_secs(10);

pub struct Builder<C> {
    pub client: Arc<C>,
    pub signer: Arc<dyn TransactionSigner>,
    pub sequencer: NonceSequencer,
    pub message_broadcaster: Address,
    pub identity_update_broadcaster: Address,
    pub parameter_registry: Address,
    pub fallback_gas_price: U256,
    pub shutdown_token: CancellationToken,
    pub metrics: &'static Metrics,
}

impl<C: ChainClient> Builder<C> {
    /// Reads the chain id and pending nonce (retrying until the node
    /// responds), aligns the nonce pool with the chain, and starts the
    /// background replenish task.
    ///
    /// # Errors
    /// Returns an error if the chain cannot be reached after exhausting
    /// retries or the nonce pool cannot be aligned.
    pub async fn build(self) -> eyre::Result<Publisher<C>> {
        let Self {
            client,
            signer,
            sequencer,
            message_broadcaster,
            identity_update_broadcaster,
            parameter_registry,
            fallback_gas_price,
            shutdown_token,
            metrics,
        } = self;

        let chain_id = retry_startup_rpc("eth_chainId", || {
            let client = client.clone();
            async move { client.chain_id().await }
        })
        .await
        .wrap_err("failed reading chain id after 1024 attempts")?;

        let address = signer.address();
        let pending_nonce = retry_startup_rpc("eth_getTransactionCount", || {
            let client = client.clone();
            async move { client.pending_nonce(address).await }
        })
        .await
        .wrap_err("failed reading pending account nonce after 1024 attempts")?;

        sequencer
            .fast_forward(pending_nonce)
            .await
            .wrap_err("failed aligning nonce pool with the chain's pending nonce")?;
        sequencer
            .replenish(pending_nonce)
            .await
            .wrap_err("failed replenishing nonce pool")?;
        info!(chain_id, pending_nonce, "nonce pool aligned with chain");

        let replenish_task = tokio::spawn(replenish_loop(
            client.clone(),
            sequencer.clone(),
            address,
            shutdown_token.clone(),
        ));

        let oracle = GasOracle::new(client.clone(), fallback_gas_price);

        Ok(Publisher {
            client,
            signer,
            sequencer,
            oracle,
            message_broadcaster,
            identity_update_broadcaster,
            parameter_registry,
            chain_id,
            metrics,
            shutdown_token,
            replenish_task,
        })
    }
}

/// Submits signed legacy transactions against the three ledger contracts and
/// returns the events they emitted.
pub struct Publisher<C> {
    client: Arc<C>,
    signer: Arc<dyn TransactionSigner>,
    sequencer: NonceSequencer,
    oracle: GasOracle<C>,
    message_broadcaster: Address,
    identity_update_broadcaster: Address,
    parameter_registry: Address,
    chain_id: u64,
    metrics: &'static Metrics,
    shutdown_token: CancellationToken,
    replenish_task: tokio::task::JoinHandle<()>,
}

impl<C: ChainClient> Publisher<C> {
    /// Appends a message to a group's log, returning the emitted
    /// `MessageSent` event.
    #[instrument(skip_all, err)]
    pub async fn publish_message(
        &self,
        group_id: [u8; 16],
        message: Vec<u8>,
    ) -> Result<MessageSentFilter, BlockchainError> {
        let calldata = AddMessageCall {
            group_id,
            message: message.into(),
        }
        .encode();
        self.submit(self.message_broadcaster, calldata.into(), |receipt| {
            single_event::<MessageSentFilter>(receipt)
        })
        .await
    }

    /// Replays a batch of messages with explicit sequence ids, one
    /// `MessageSent` event per entry.
    #[instrument(skip_all, fields(batch_len = group_ids.len()), err)]
    pub async fn bootstrap_messages(
        &self,
        group_ids: Vec<[u8; 16]>,
        messages: Vec<Vec<u8>>,
        sequence_ids: Vec<u64>,
    ) -> Result<Vec<MessageSentFilter>, BlockchainError> {
        validate_batch(&[group_ids.len(), messages.len(), sequence_ids.len()])?;
        let expected = group_ids.len();
        let calldata = BootstrapMessagesCall {
            group_ids,
            messages: messages.into_iter().map(Into::into).collect(),
            sequence_ids,
        }
        .encode();
        self.submit(self.message_broadcaster, calldata.into(), move |receipt| {
            extract_events::<MessageSentFilter>(receipt, expected)
        })
        .await
    }

    /// Appends an identity update to an inbox's log.
    #[instrument(skip_all, err)]
    pub async fn publish_identity_update(
        &self,
        inbox_id: [u8; 32],
        update: Vec<u8>,
    ) -> Result<IdentityUpdateCreatedFilter, BlockchainError> {
        let calldata = AddIdentityUpdateCall {
            inbox_id,
            update: update.into(),
        }
        .encode();
        self.submit(
            self.identity_update_broadcaster,
            calldata.into(),
            |receipt| single_event::<IdentityUpdateCreatedFilter>(receipt),
        )
        .await
    }

    /// Replays a batch of identity updates with explicit sequence ids.
    #[instrument(skip_all, fields(batch_len = inbox_ids.len()), err)]
    pub async fn bootstrap_identity_updates(
        &self,
        inbox_ids: Vec<[u8; 32]>,
        updates: Vec<Vec<u8>>,
        sequence_ids: Vec<u64>,
    ) -> Result<Vec<IdentityUpdateCreatedFilter>, BlockchainError> {
        validate_batch(&[inbox_ids.len(), updates.len(), sequence_ids.len()])?;
        let expected = inbox_ids.len();
        let calldata = BootstrapIdentityUpdatesCall {
            inbox_ids,
            updates: updates.into_iter().map(Into::into).collect(),
            sequence_ids,
        }
        .encode();
        self.submit(
            self.identity_update_broadcaster,
            calldata.into(),
            move |receipt| extract_events::<IdentityUpdateCreatedFilter>(receipt, expected),
        )
        .await
    }

    /// Reads a registry parameter via `eth_call` and unpacks it as `kind`.
    #[instrument(skip_all, fields(key = key), err)]
    pub async fn get_parameter(
        &self,
        key: &str,
        kind: ParamKind,
    ) -> Result<ParamValue, BlockchainError> {
        let calldata = GetCall {
            key: key.to_string(),
        }
        .encode();
        let tx = TypedTransaction::Legacy(
            TransactionRequest::new()
                .to(self.parameter_registry)
                .data(calldata),
        );
        let output = self
            .client
            .call(&tx)
            .await
            .map_err(|report| BlockchainError::new(&report))?;
        let word: [u8; 32] = output.as_ref().try_into().map_err(|_| {
            BlockchainError::from_message(format!(
                "parameter registry returned {} bytes, expected a 32 byte word",
                output.len(),
            ))
        })?;
        ParamValue::unpack(kind, word).map_err(into_blockchain_error)
    }

    /// Sets a registry parameter. Returns `Ok(None)` without broadcasting if
    /// the registry reports the value is already current.
    #[instrument(skip_all, fields(key = key), err)]
    pub async fn set_parameter(
        &self,
        key: &str,
        value: ParamValue,
    ) -> Result<Option<ParameterSetFilter>, BlockchainError> {
        let word = value.pack().map_err(into_blockchain_error)?;
        let calldata = SetCall {
            key: key.to_string(),
            value: word,
        }
        .encode();
        if self.preflight(calldata.clone().into()).await?.is_none() {
            debug!(key, "parameter already up to date, nothing to broadcast");
            return Ok(None);
        }
        self.submit(self.parameter_registry, calldata.into(), |receipt| {
            single_event::<ParameterSetFilter>(receipt)
        })
        .await
        .map(Some)
    }

    /// Sets a batch of `uint64` registry parameters in one transaction.
    /// Returns `Ok(empty)` without broadcasting if nothing would change.
    #[instrument(skip_all, fields(batch_len = entries.len()), err)]
    pub async fn set_many_u64_parameters(
        &self,
        entries: &[(String, u64)],
    ) -> Result<Vec<ParameterSetFilter>, BlockchainError> {
        validate_batch(&[entries.len()])?;
        let mut keys = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            keys.push(key.clone());
            values.push(
                ParamValue::Uint64(*value)
                    .pack()
                    .map_err(into_blockchain_error)?,
            );
        }
        let expected = entries.len();
        let calldata = SetManyCall { keys, values }.encode();
        if self.preflight(calldata.clone().into()).await?.is_none() {
            debug!("parameters already up to date, nothing to broadcast");
            return Ok(Vec::new());
        }
        self.submit(self.parameter_registry, calldata.into(), move |receipt| {
            extract_events::<ParameterSetFilter>(receipt, expected)
        })
        .await
    }

    /// Stops the background replenish task and waits for it to exit.
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        if let Err(error) = self.replenish_task.await {
            warn!(
                error = &error as &dyn std::error::Error,
                "replenish task failed during shutdown"
            );
        }
    }

    /// Balance precheck plus gas estimation against the pending state.
    ///
    /// `Ok(Some(gas))` means the transaction should be broadcast, `Ok(None)`
    /// that the registry reported no change is needed.
    async fn preflight(&self, calldata: Bytes) -> Result<Option<U256>, BlockchainError> {
        let from = self.signer.address();
        let balance = self
            .client
            .balance(from)
            .await
            .map_err(|report| BlockchainError::new(&report))?;
        if balance.is_zero() {
            return Err(BlockchainError::from_message(format!(
                "account {from:#x} has zero balance"
            )));
        }
        let tx = TypedTransaction::Legacy(
            TransactionRequest::new()
                .from(from)
                .to(self.parameter_registry)
                .data(calldata),
        );
        match self.client.estimate_gas(&tx).await {
            Ok(gas) => Ok(Some(gas)),
            Err(report) => {
                let error = BlockchainError::new(&report);
                if error.is_no_change() {
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Reserve a nonce, broadcast, classify rejections, confirm, decode.
    ///
    /// Each iteration settles its reservation exactly once: consumed when the
    /// chain used the nonce, cancelled when it is still free.
    async fn submit<T>(
        &self,
        to: Address,
        calldata: Bytes,
        decode: impl Fn(&TransactionReceipt) -> Result<T, EventError>,
    ) -> Result<T, BlockchainError> {
        loop {
            let nonce_ctx = self
                .sequencer
                .get_nonce()
                .await
                .map_err(into_blockchain_error)?;
            let nonce = nonce_ctx.nonce();

            let gas_price = self.oracle.gas_price().await;
            let tx = TypedTransaction::Legacy(
                TransactionRequest::new()
                    .from(self.signer.address())
                    .to(to)
                    .gas(GAS_LIMIT)
                    .gas_price(gas_price)
                    .data(calldata.clone())
                    .nonce(nonce)
                    .chain_id(self.chain_id),
            );
            let signature = match self.signer.sign_transaction(&tx).await {
                Ok(signature) => signature,
                Err(report) => {
                    cancel_reservation(nonce_ctx).await;
                    return Err(BlockchainError::new(&report));
                }
            };
            let raw = tx.rlp_signed(&signature);

            let submitted_at = Instant::now();
            self.metrics.increment_transaction_submission_count();
            let hash = match self.client.send_raw_transaction(raw).await {
                Ok(hash) => {
                    self.metrics
                        .record_transaction_submission_latency(submitted_at.elapsed());
                    hash
                }
                Err(report) => {
                    self.metrics.increment_transaction_submission_failure_count();
                    let error = BlockchainError::new(&report);
                    match retry::classify(&error.to_string()) {
                        Classification::NonceConsumed => {
                            debug!(
                                nonce,
                                error = &error as &dyn std::error::Error,
                                "nonce already used on chain; consuming and retrying",
                            );
                            self.metrics.increment_nonce_consumed_retry_count();
                            nonce_ctx.consume().await.map_err(into_blockchain_error)?;
                            continue;
                        }
                        Classification::Backoff => {
                            debug!(
                                nonce,
                                error = &error as &dyn std::error::Error,
                                "nonce ahead of the node's pending count; backing off",
                            );
                            self.metrics.increment_nonce_backoff_count();
                            cancel_reservation(nonce_ctx).await;
                            let wait = Duration::from_millis(
                                rand::thread_rng().gen_range(0..=MAX_NONCE_BACKOFF_MILLIS),
                            );
                            tokio::time::sleep(wait).await;
                            continue;
                        }
                        Classification::Fatal => {
                            cancel_reservation(nonce_ctx).await;
                            return Err(error);
                        }
                    }
                }
            };

            let receipt = match self.wait_for_receipt(hash).await {
                Ok(receipt) => receipt,
                Err(report) => {
                    // the nonce may still end up consumed on chain; the next
                    // broadcast on it will be classified and retried
                    cancel_reservation(nonce_ctx).await;
                    return Err(BlockchainError::new(&report));
                }
            };
            let value = match decode(&receipt) {
                Ok(value) => value,
                Err(error) => {
                    cancel_reservation(nonce_ctx).await;
                    return Err(into_blockchain_error(error));
                }
            };
            self.metrics
                .record_confirmation_latency(submitted_at.elapsed());
            nonce_ctx.consume().await.map_err(into_blockchain_error)?;
            return Ok(value);
        }
    }

    async fn wait_for_receipt(&self, hash: H256) -> eyre::Result<TransactionReceipt> {
        let deadline = Instant::now() + CONFIRMATION_TIMEOUT;
        loop {
            if let Some(receipt) = self.client.transaction_receipt(hash).await? {
                ensure!(
                    receipt.status == Some(1.into()),
                    "transaction {hash:#x} reverted on chain",
                );
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                bail!("timed out waiting for receipt of transaction {hash:#x}");
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

/// Tops up the nonce pool from the chain's pending nonce until cancelled.
async fn replenish_loop<C: ChainClient>(
    client: Arc<C>,
    sequencer: NonceSequencer,
    address: Address,
    shutdown_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(REPLENISH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => {
                debug!("replenish task shutting down");
                break;
            }
            _ = interval.tick() => {}
        }
        let pending_nonce = match client.pending_nonce(address).await {
            Ok(nonce) => nonce,
            Err(report) => {
                warn!(
                    error = AsRef::<dyn std::error::Error>::as_ref(&report),
                    "failed reading pending nonce for replenish; will retry next tick",
                );
                continue;
            }
        };
        if let Err(error) = sequencer.replenish(pending_nonce).await {
            warn!(
                pending_nonce,
                error = &error as &dyn std::error::Error,
                "failed replenishing nonce pool; will retry next tick",
            );
        }
    }
}

async fn retry_startup_rpc<T, F, Fut>(request: &'static str, f: F) -> eyre::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = eyre::Result<T>>,
{
    let retry_config = tryhard::RetryFutureConfig::new(1024)
        .exponential_backoff(Duration::from_millis(200))
        .max_delay(Duration::from_secs(60))
        .on_retry(
            move |attempt, next_delay: Option<Duration>, error: &eyre::Report| {
                let wait_duration = next_delay
                    .map(humantime::format_duration)
                    .map(tracing::field::display);
                warn!(
                    attempt,
                    wait_duration,
                    error = AsRef::<dyn std::error::Error>::as_ref(error),
                    request,
                    "startup chain request failed; retrying after backoff",
                );
                futures::future::ready(())
            },
        );
    tryhard::retry_fn(f).with_config(retry_config).await
}

async fn cancel_reservation(nonce_ctx: NonceContext) {
    let nonce = nonce_ctx.nonce();
    if let Err(error) = nonce_ctx.cancel().await {
        warn!(
            nonce,
            error = &error as &dyn std::error::Error,
            "failed returning nonce reservation to the pool",
        );
    }
}

fn single_event<E>(receipt: &TransactionReceipt) -> Result<E, EventError>
where
    E: ethers::contract::EthEvent,
{
    let mut events = extract_events::<E>(receipt, 1)?;
    events.pop().ok_or(EventError::NoLogsFound)
}

fn validate_batch(lengths: &[usize]) -> Result<(), BlockchainError> {
    if lengths.iter().any(|len| *len == 0) {
        return Err(BlockchainError::from_message(
            "batch inputs must not be empty".to_string(),
        ));
    }
    if lengths.windows(2).any(|pair| pair[0] != pair[1]) {
        return Err(BlockchainError::from_message(
            "batch inputs must all have the same length".to_string(),
        ));
    }
    Ok(())
}

fn into_blockchain_error<E>(error: E) -> BlockchainError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BlockchainError::new(&eyre::Report::new(error))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ethers::{
        abi::{
            AbiEncode as _,
            Token,
        },
        contract::EthEvent as _,
        types::{
            Address,
            Log,
            Signature,
            TransactionReceipt,
            H256,
            U256,
            U64,
        },
    };
    use quill_contracts::{
        message_broadcaster::MessageSentFilter,
        parameter_registry::ParameterSetFilter,
    };
    use tokio_util::sync::CancellationToken;

    use super::{
        Builder,
        Publisher,
    };
    use crate::{
        metrics::Metrics,
        nonce::{
            NoncePool,
            NonceSequencer,
        },
        params::{
            ParamKind,
            ParamValue,
        },
        signer::TransactionSigner,
        test_utils::MockChainClient,
    };

    /// A signer producing syntactically valid but meaningless signatures;
    /// the mock client never recovers them.
    struct StaticSigner(Address);

    #[async_trait::async_trait]
    impl TransactionSigner for StaticSigner {
        fn address(&self) -> Address {
            self.0
        }

        async fn sign_transaction(
            &self,
            _tx: &ethers::types::transaction::eip2718::TypedTransaction,
        ) -> quill_eyre::eyre::Result<Signature> {
            Ok(Signature {
                r: U256::one(),
                s: U256::one(),
                v: 27,
            })
        }
    }

    fn metrics() -> &'static Metrics {
        Metrics::register()
    }

    async fn publisher(client: Arc<MockChainClient>) -> Publisher<MockChainClient> {
        Builder {
            client,
            signer: Arc::new(StaticSigner(Address::repeat_byte(0xaa))),
            sequencer: NonceSequencer::new(Arc::new(NoncePool::open_in_memory().unwrap())),
            message_broadcaster: Address::repeat_byte(0x01),
            identity_update_broadcaster: Address::repeat_byte(0x02),
            parameter_registry: Address::repeat_byte(0x03),
            fallback_gas_price: U256::from(10_000_000_000u64),
            shutdown_token: CancellationToken::new(),
            metrics: metrics(),
        }
        .build()
        .await
        .unwrap()
    }

    fn message_sent_log(group_id: [u8; 16], sequence_id: u64, message: &[u8]) -> Log {
        let mut group_topic = [0u8; 32];
        group_topic[..16].copy_from_slice(&group_id);
        Log {
            address: Address::repeat_byte(0x01),
            topics: vec![
                MessageSentFilter::signature(),
                H256::from(group_topic),
                H256::from_low_u64_be(sequence_id),
            ],
            data: ethers::abi::encode(&[Token::Bytes(message.to_vec())]).into(),
            ..Log::default()
        }
    }

    fn successful_receipt(logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            status: Some(U64::one()),
            logs,
            ..TransactionReceipt::default()
        }
    }

    #[tokio::test]
    async fn publish_message_returns_decoded_event() {
        let client = Arc::new(MockChainClient::default());
        let hash = H256::repeat_byte(0x11);
        client.enqueue_send(Ok(hash));
        client.insert_receipt(
            hash,
            successful_receipt(vec![message_sent_log([7u8; 16], 42, b"hello")]),
        );

        let publisher = publisher(client.clone()).await;
        let event = publisher
            .publish_message([7u8; 16], b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(event.group_id, [7u8; 16]);
        assert_eq!(event.sequence_id, 42);
        assert_eq!(event.message.as_ref(), b"hello");
        assert_eq!(client.sent_transactions().len(), 1);
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn nonce_too_low_consumes_and_retries_with_next_nonce() {
        let client = Arc::new(MockChainClient::default());
        client.set_pending_nonce(5);
        let hash = H256::repeat_byte(0x22);
        client.enqueue_send(Err("(code: -32000, message: nonce too low, data: None)"));
        client.enqueue_send(Ok(hash));
        client.insert_receipt(
            hash,
            successful_receipt(vec![message_sent_log([1u8; 16], 1, b"m")]),
        );

        let pool = Arc::new(NoncePool::open_in_memory().unwrap());
        let publisher = Builder {
            client: client.clone(),
            signer: Arc::new(StaticSigner(Address::repeat_byte(0xaa))),
            sequencer: NonceSequencer::new(pool.clone()),
            message_broadcaster: Address::repeat_byte(0x01),
            identity_update_broadcaster: Address::repeat_byte(0x02),
            parameter_registry: Address::repeat_byte(0x03),
            fallback_gas_price: U256::from(10_000_000_000u64),
            shutdown_token: CancellationToken::new(),
            metrics: metrics(),
        }
        .build()
        .await
        .unwrap();
        publisher
            .publish_message([1u8; 16], b"m".to_vec())
            .await
            .unwrap();
        // first attempt rejected, second broadcast with the next nonce; both
        // nonces are gone from the pool
        assert_eq!(client.sent_transactions().len(), 2);
        assert!(!pool.contains(5).unwrap());
        assert!(!pool.contains(6).unwrap());
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn nonce_too_high_cancels_backs_off_and_retries() {
        let client = Arc::new(MockChainClient::default());
        let hash = H256::repeat_byte(0x33);
        client.enqueue_send(Err("(code: -32000, message: nonce too high, data: None)"));
        client.enqueue_send(Ok(hash));
        client.insert_receipt(
            hash,
            successful_receipt(vec![message_sent_log([1u8; 16], 1, b"m")]),
        );

        let publisher = publisher(client.clone()).await;
        publisher
            .publish_message([1u8; 16], b"m".to_vec())
            .await
            .unwrap();
        assert_eq!(client.sent_transactions().len(), 2);
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn fatal_broadcast_error_is_surfaced() {
        let client = Arc::new(MockChainClient::default());
        client.enqueue_send(Err(
            "(code: -32000, message: insufficient funds for transfer, data: None)",
        ));

        let publisher = publisher(client.clone()).await;
        let error = publisher
            .publish_message([1u8; 16], b"m".to_vec())
            .await
            .unwrap_err();
        assert!(error.to_string().contains("insufficient funds"));
        assert_eq!(client.sent_transactions().len(), 1);
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn reverted_receipt_is_an_error() {
        let client = Arc::new(MockChainClient::default());
        let hash = H256::repeat_byte(0x44);
        client.enqueue_send(Ok(hash));
        client.insert_receipt(
            hash,
            TransactionReceipt {
                status: Some(U64::zero()),
                ..TransactionReceipt::default()
            },
        );

        let publisher = publisher(client.clone()).await;
        let error = publisher
            .publish_message([1u8; 16], b"m".to_vec())
            .await
            .unwrap_err();
        assert!(error.to_string().contains("reverted"));
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_mismatched_batch_lengths() {
        let client = Arc::new(MockChainClient::default());
        let publisher = publisher(client.clone()).await;

        let error = publisher
            .bootstrap_messages(vec![[0u8; 16]], vec![], vec![1])
            .await
            .unwrap_err();
        assert!(error.to_string().contains("must not be empty"));

        let error = publisher
            .bootstrap_messages(vec![[0u8; 16]], vec![b"a".to_vec(), b"b".to_vec()], vec![1])
            .await
            .unwrap_err();
        assert!(error.to_string().contains("same length"));
        assert!(client.sent_transactions().is_empty());
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn get_parameter_unpacks_canonical_word() {
        let client = Arc::new(MockChainClient::default());
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&77u64.to_be_bytes());
        client.enqueue_call(Ok(word.to_vec().into()));

        let publisher = publisher(client.clone()).await;
        let value = publisher
            .get_parameter("quill.maxPayloadSize", ParamKind::Uint64)
            .await
            .unwrap();
        assert_eq!(value, ParamValue::Uint64(77));
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn set_parameter_no_change_revert_is_success_without_broadcast() {
        let client = Arc::new(MockChainClient::default());
        client.fail_estimate_gas(
            "execution reverted (code: 3, message: execution reverted, data: 0xa88ee577)",
        );

        let publisher = publisher(client.clone()).await;
        let result = publisher
            .set_parameter("quill.paused", ParamValue::Bool(false))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(client.sent_transactions().is_empty());
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn set_parameter_surfaces_recognized_protocol_revert() {
        let client = Arc::new(MockChainClient::default());
        client.fail_estimate_gas(
            "execution reverted (code: 3, message: execution reverted, data: 0x7bfa4b9f)",
        );

        let publisher = publisher(client.clone()).await;
        let error = publisher
            .set_parameter("quill.paused", ParamValue::Bool(true))
            .await
            .unwrap_err();
        assert_eq!(
            error.protocol(),
            Some(crate::errors::ProtocolError::NotAdmin)
        );
        assert!(client.sent_transactions().is_empty());
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn set_parameter_rejects_zero_balance_before_broadcast() {
        let client = Arc::new(MockChainClient::default());
        client.set_balance(U256::zero());

        let publisher = publisher(client.clone()).await;
        let error = publisher
            .set_parameter("quill.paused", ParamValue::Bool(true))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("zero balance"));
        assert!(client.sent_transactions().is_empty());
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn set_parameter_broadcasts_and_returns_event() {
        let client = Arc::new(MockChainClient::default());
        let hash = H256::repeat_byte(0x55);
        client.enqueue_send(Ok(hash));
        let key = "quill.maxPayloadSize";
        let mut value = [0u8; 32];
        value[24..].copy_from_slice(&4_194_304u64.to_be_bytes());
        let log = Log {
            address: Address::repeat_byte(0x03),
            topics: vec![
                ParameterSetFilter::signature(),
                H256::from(ethers::utils::keccak256(key.as_bytes())),
            ],
            data: ethers::abi::encode(&[
                Token::String(key.to_string()),
                Token::FixedBytes(value.to_vec()),
            ])
            .into(),
            ..Log::default()
        };
        client.insert_receipt(hash, successful_receipt(vec![log]));

        let publisher = publisher(client.clone()).await;
        let event = publisher
            .set_parameter(key, ParamValue::Uint64(4_194_304))
            .await
            .unwrap()
            .expect("a change should have been broadcast");
        assert_eq!(event.key, key);
        assert_eq!(event.value, value);
        assert_eq!(client.sent_transactions().len(), 1);
        publisher.shutdown().await;
    }

    #[test]
    fn add_message_calldata_roundtrips() {
        use ethers::abi::AbiDecode as _;
        let call = quill_contracts::message_broadcaster::AddMessageCall {
            group_id: [9u8; 16],
            message: b"payload".to_vec().into(),
        };
        let encoded = call.clone().encode();
        let decoded =
            quill_contracts::message_broadcaster::AddMessageCall::decode(&encoded).unwrap();
        assert_eq!(call, decoded);
    }
}
