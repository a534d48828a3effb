//! In-process [`ChainClient`] fake used across the crate's unit tests.

use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Mutex,
    },
};

use async_trait::async_trait;
use ethers::types::{
    transaction::eip2718::TypedTransaction,
    Address,
    Bytes,
    Filter,
    Log,
    TransactionReceipt,
    H256,
    U256,
};
use quill_eyre::eyre::{
    self,
    Result,
};

use crate::client::ChainClient;

/// Scripted chain client. Every response is either a fixed value set by a
/// test or an entry popped from a per-method queue; queue underflow falls
/// back to a sensible default so tests only script what they care about.
pub(crate) struct MockChainClient {
    block_number: AtomicU64,
    gas_price: Mutex<Result<U256, String>>,
    gas_price_calls: AtomicU64,
    pending_nonce: AtomicU64,
    chain_id: AtomicU64,
    balance: Mutex<U256>,
    estimate_gas: Mutex<Result<U256, String>>,
    send_results: Mutex<VecDeque<Result<H256, String>>>,
    sent_raw: Mutex<Vec<Bytes>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    call_results: Mutex<VecDeque<Result<Bytes, String>>>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self {
            block_number: AtomicU64::new(0),
            gas_price: Mutex::new(Ok(U256::from(1_000_000_000u64))),
            gas_price_calls: AtomicU64::new(0),
            pending_nonce: AtomicU64::new(0),
            chain_id: AtomicU64::new(31_337),
            balance: Mutex::new(U256::from(u128::MAX)),
            estimate_gas: Mutex::new(Ok(U256::from(100_000u64))),
            send_results: Mutex::new(VecDeque::new()),
            sent_raw: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
            call_results: Mutex::new(VecDeque::new()),
        }
    }
}

impl MockChainClient {
    pub(crate) fn set_block_number(&self, number: u64) {
        self.block_number.store(number, Ordering::SeqCst);
    }

    pub(crate) fn set_gas_price(&self, price: u64) {
        *lock(&self.gas_price) = Ok(U256::from(price));
    }

    pub(crate) fn fail_gas_price(&self, message: &str) {
        *lock(&self.gas_price) = Err(message.to_string());
    }

    pub(crate) fn gas_price_calls(&self) -> usize {
        self.gas_price_calls.load(Ordering::SeqCst) as usize
    }

    pub(crate) fn set_pending_nonce(&self, nonce: u64) {
        self.pending_nonce.store(nonce, Ordering::SeqCst);
    }

    pub(crate) fn set_balance(&self, balance: U256) {
        *lock(&self.balance) = balance;
    }

    pub(crate) fn fail_estimate_gas(&self, message: &str) {
        *lock(&self.estimate_gas) = Err(message.to_string());
    }

    /// Scripts the outcome of the next `eth_sendRawTransaction`.
    pub(crate) fn enqueue_send(&self, result: Result<H256, &str>) {
        lock(&self.send_results).push_back(result.map_err(str::to_string));
    }

    pub(crate) fn sent_transactions(&self) -> Vec<Bytes> {
        lock(&self.sent_raw).clone()
    }

    pub(crate) fn insert_receipt(&self, hash: H256, receipt: TransactionReceipt) {
        lock(&self.receipts).insert(hash, receipt);
    }

    pub(crate) fn enqueue_call(&self, result: Result<Bytes, &str>) {
        lock(&self.call_results).push_back(result.map_err(str::to_string));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.block_number.load(Ordering::SeqCst))
    }

    async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>> {
        Ok(Vec::new())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        lock(&self.sent_raw).push(raw);
        match lock(&self.send_results).pop_front() {
            Some(Ok(hash)) => Ok(hash),
            Some(Err(message)) => Err(eyre::eyre!(message)),
            None => Ok(H256::zero()),
        }
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(lock(&self.receipts).get(&hash).cloned())
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64> {
        Ok(self.pending_nonce.load(Ordering::SeqCst))
    }

    async fn call(&self, _tx: &TypedTransaction) -> Result<Bytes> {
        match lock(&self.call_results).pop_front() {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(message)) => Err(eyre::eyre!(message)),
            None => Ok(Bytes::new()),
        }
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<U256> {
        match &*lock(&self.estimate_gas) {
            Ok(gas) => Ok(*gas),
            Err(message) => Err(eyre::eyre!(message.clone())),
        }
    }

    async fn balance(&self, _address: Address) -> Result<U256> {
        Ok(*lock(&self.balance))
    }

    async fn gas_price(&self) -> Result<U256> {
        self.gas_price_calls.fetch_add(1, Ordering::SeqCst);
        match &*lock(&self.gas_price) {
            Ok(price) => Ok(*price),
            Err(message) => Err(eyre::eyre!(message.clone())),
        }
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id.load(Ordering::SeqCst))
    }
}
