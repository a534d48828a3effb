use serde::{
    Deserialize,
    Serialize,
};

#[allow(clippy::struct_excessive_bools)] // container for deserialization
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
/// The single config for creating a quill node.
pub struct Config {
    /// The http rpc endpoint of the execution node.
    pub rpc_endpoint: String,
    /// Path of the sqlite database holding the nonce pool.
    pub database_path: String,
    /// Hex encoded private key used to sign broadcast transactions.
    pub private_key: String,
    /// The address of the MessageBroadcaster contract.
    pub message_broadcaster_address: String,
    /// The address of the IdentityUpdateBroadcaster contract.
    pub identity_update_broadcaster_address: String,
    /// The address of the ParameterRegistry contract.
    pub parameter_registry_address: String,
    /// The block to start indexing contract logs from.
    pub start_block: u64,
    /// Blocks withheld from the chain tip when indexing.
    pub block_lag: u64,
    pub log: String,
    /// Forces writing trace data to stdout no matter if connected to a tty or not.
    pub force_stdout: bool,
    /// Set to true to disable the metrics server.
    pub no_metrics: bool,
    /// The endpoint which will be listened on for serving prometheus metrics.
    pub metrics_http_listener_addr: String,
    /// Writes a human readable format to stdout instead of JSON formatted logs.
    pub pretty_print: bool,
}

impl quill_config::Config for Config {
    const PREFIX: &'static str = "QUILL_NODE_";
}
