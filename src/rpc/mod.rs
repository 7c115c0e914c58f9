pub mod client;
pub mod pool;

pub use client::{LedgerRpc, RpcConnector, RpcFailure, SolanaConnector, SolanaRpc};
pub use pool::{Endpoint, EndpointPool};
