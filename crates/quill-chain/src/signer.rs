use async_trait::async_trait;
use ethers::{
    signers::{
        LocalWallet,
        Signer,
    },
    types::{
        transaction::eip2718::TypedTransaction,
        Address,
        Signature,
    },
};
use quill_eyre::eyre::{
    Result,
    WrapErr as _,
};

/// Signs transactions submitted by the publisher.
///
/// A seam over the concrete wallet so the publisher can be exercised with a
/// deterministic signer in tests.
#[async_trait]
pub trait TransactionSigner: Send + Sync + 'static {
    fn address(&self) -> Address;

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature>;
}

#[async_trait]
impl TransactionSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature> {
        Signer::sign_transaction(self, tx)
            .await
            .wrap_err("failed signing transaction")
    }
}
