//! RPC access to the chain.
//!
//! - [`http`]: alloy HTTP provider creation and head queries
//! - [`client`]: the [`ChainClient`] trait the sync cursor reads logs through,
//!   and its alloy-backed implementation

pub mod client;
pub mod http;

// Re-export commonly used types
pub use client::{is_range_limit_message, AlloyChainClient, ChainClient};
pub use http::{check_connection, create_provider, get_latest_block, Provider};
