//! Bindings for the `ParameterRegistry` contract.
//!
//! `set` is overloaded on-chain; the batch form gets its own call struct with
//! the same ABI name and a distinct selector.

use ethers::{
    contract::{
        EthCall,
        EthDisplay,
        EthEvent,
    },
    core::types::H256,
};

///Container type for all input parameters for the `get` function with signature `get(string)`
#[derive(Clone, EthCall, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(name = "get", abi = "get(string)")]
pub struct GetCall {
    pub key: String,
}

///Container type for all input parameters for the `set` function with signature `set(string,bytes32)`
#[derive(Clone, EthCall, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(name = "set", abi = "set(string,bytes32)")]
pub struct SetCall {
    pub key: String,
    pub value: [u8; 32],
}

///Container type for all input parameters for the `set` function with signature `set(string[],bytes32[])`
#[derive(Clone, EthCall, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(name = "set", abi = "set(string[],bytes32[])")]
pub struct SetManyCall {
    pub keys: Vec<String>,
    pub values: Vec<[u8; 32]>,
}

///Custom Event type `ParameterSet` with signature `ParameterSet(string,string,bytes32)`
///
///The first `string` is the indexed key hash; the full key is carried
///non-indexed so it can be recovered from the log data.
#[derive(Clone, EthEvent, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethevent(name = "ParameterSet", abi = "ParameterSet(string,string,bytes32)")]
pub struct ParameterSetFilter {
    #[ethevent(indexed)]
    pub key_hash: H256,
    pub key: String,
    pub value: [u8; 32],
}
