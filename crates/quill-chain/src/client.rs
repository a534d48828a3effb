use async_trait::async_trait;
use ethers::{
    providers::{
        JsonRpcClient,
        Middleware,
        Provider,
    },
    types::{
        transaction::eip2718::TypedTransaction,
        Address,
        BlockId,
        BlockNumber,
        Bytes,
        Filter,
        Log,
        TransactionReceipt,
        H256,
        U256,
    },
};
use quill_eyre::eyre::{
    Result,
    WrapErr as _,
};

/// The narrow execution-layer RPC surface used by the publisher and the log
/// streamer.
///
/// Exists as a seam so that the submission and streaming logic can be driven
/// by in-process fakes in tests; production code goes through the blanket
/// [`Provider`] implementation.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    async fn block_number(&self) -> Result<u64>;
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>>;
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;
    async fn pending_nonce(&self, address: Address) -> Result<u64>;
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes>;
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256>;
    async fn balance(&self, address: Address) -> Result<U256>;
    async fn gas_price(&self) -> Result<U256>;
    async fn chain_id(&self) -> Result<u64>;
}

#[async_trait]
impl<P> ChainClient for Provider<P>
where
    P: JsonRpcClient + 'static,
{
    async fn block_number(&self) -> Result<u64> {
        let number = Middleware::get_block_number(self)
            .await
            .wrap_err("eth_blockNumber request failed")?;
        Ok(number.as_u64())
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        Middleware::get_logs(self, filter)
            .await
            .wrap_err("eth_getLogs request failed")
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = Middleware::send_raw_transaction(self, raw)
            .await
            .wrap_err("eth_sendRawTransaction request failed")?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        Middleware::get_transaction_receipt(self, hash)
            .await
            .wrap_err("eth_getTransactionReceipt request failed")
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let nonce = Middleware::get_transaction_count(
            self,
            address,
            Some(BlockId::Number(BlockNumber::Pending)),
        )
        .await
        .wrap_err("eth_getTransactionCount request failed")?;
        Ok(nonce.as_u64())
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes> {
        Middleware::call(self, tx, None)
            .await
            .wrap_err("eth_call request failed")
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        Middleware::estimate_gas(self, tx, None)
            .await
            .wrap_err("eth_estimateGas request failed")
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Middleware::get_balance(self, address, None)
            .await
            .wrap_err("eth_getBalance request failed")
    }

    async fn gas_price(&self) -> Result<U256> {
        Middleware::get_gas_price(self)
            .await
            .wrap_err("eth_gasPrice request failed")
    }

    async fn chain_id(&self) -> Result<u64> {
        let chain_id = Middleware::get_chainid(self)
            .await
            .wrap_err("eth_chainId request failed")?;
        Ok(chain_id.as_u64())
    }
}
