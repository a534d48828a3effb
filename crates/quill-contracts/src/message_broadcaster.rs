//! Bindings for the `MessageBroadcaster` contract.
//!
//! Written by hand against the deployed ABI; only the calls and events this
//! workspace uses are bound.

use ethers::{
    contract::{
        EthCall,
        EthDisplay,
        EthEvent,
    },
    core::types::Bytes,
};

///Container type for all input parameters for the `addMessage` function with signature `addMessage(bytes16,bytes)`
#[derive(Clone, EthCall, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(name = "addMessage", abi = "addMessage(bytes16,bytes)")]
pub struct AddMessageCall {
    pub group_id: [u8; 16],
    pub message: Bytes,
}

///Container type for all input parameters for the `bootstrapMessages` function with signature `bootstrapMessages(bytes16[],bytes[],uint64[])`
#[derive(Clone, EthCall, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(
    name = "bootstrapMessages",
    abi = "bootstrapMessages(bytes16[],bytes[],uint64[])"
)]
pub struct BootstrapMessagesCall {
    pub group_ids: Vec<[u8; 16]>,
    pub messages: Vec<Bytes>,
    pub sequence_ids: Vec<u64>,
}

///Custom Event type `MessageSent` with signature `MessageSent(bytes16,bytes,uint64)`
#[derive(Clone, EthEvent, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethevent(name = "MessageSent", abi = "MessageSent(bytes16,bytes,uint64)")]
pub struct MessageSentFilter {
    #[ethevent(indexed)]
    pub group_id: [u8; 16],
    pub message: Bytes,
    #[ethevent(indexed)]
    pub sequence_id: u64,
}
