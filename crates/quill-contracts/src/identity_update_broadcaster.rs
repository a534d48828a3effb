//! Bindings for the `IdentityUpdateBroadcaster` contract.

use ethers::{
    contract::{
        EthCall,
        EthDisplay,
        EthEvent,
    },
    core::types::Bytes,
};

///Container type for all input parameters for the `addIdentityUpdate` function with signature `addIdentityUpdate(bytes32,bytes)`
#[derive(Clone, EthCall, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(name = "addIdentityUpdate", abi = "addIdentityUpdate(bytes32,bytes)")]
pub struct AddIdentityUpdateCall {
    pub inbox_id: [u8; 32],
    pub update: Bytes,
}

///Container type for all input parameters for the `bootstrapIdentityUpdates` function with signature `bootstrapIdentityUpdates(bytes32[],bytes[],uint64[])`
#[derive(Clone, EthCall, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(
    name = "bootstrapIdentityUpdates",
    abi = "bootstrapIdentityUpdates(bytes32[],bytes[],uint64[])"
)]
pub struct BootstrapIdentityUpdatesCall {
    pub inbox_ids: Vec<[u8; 32]>,
    pub updates: Vec<Bytes>,
    pub sequence_ids: Vec<u64>,
}

///Custom Event type `IdentityUpdateCreated` with signature `IdentityUpdateCreated(bytes32,bytes,uint64)`
#[derive(Clone, EthEvent, EthDisplay, Default, Debug, PartialEq, Eq, Hash)]
#[ethevent(
    name = "IdentityUpdateCreated",
    abi = "IdentityUpdateCreated(bytes32,bytes,uint64)"
)]
pub struct IdentityUpdateCreatedFilter {
    #[ethevent(indexed)]
    pub inbox_id: [u8; 32],
    pub update: Bytes,
    #[ethevent(indexed)]
    pub sequence_id: u64,
}
