//! The quill node: publishes ledger payloads to the broadcast contracts and
//! indexes the events they emit.

pub mod config;
mod node;

pub use config::Config;
pub use node::{
    Node,
    ShutdownHandle,
};
