//! Chain-facing plumbing for quill services: a narrow RPC client trait, a
//! durable nonce sequencer, a gas price oracle and the transaction publisher
//! that drives the broadcast contracts.

pub mod client;
pub mod errors;
pub mod gas_oracle;
pub(crate) mod metrics;
pub mod nonce;
pub mod params;
pub mod publisher;
pub mod signer;

pub use client::ChainClient;
pub use errors::BlockchainError;
pub use gas_oracle::GasOracle;
pub use metrics::Metrics;
pub use nonce::{
    NonceContext,
    NoncePool,
    NonceSequencer,
};
pub use publisher::Publisher;
pub use signer::TransactionSigner;

#[cfg(test)]
pub(crate) mod test_utils;
