//! RPC Server - JSON-RPC and WebSocket for the staking ledger
//!
//! - HTTP JSON-RPC: sendRequest, getStake, getBalance, getConfirmations, etc.
//! - WebSocket: eventSubscribe, eventUnsubscribe

pub mod http_server;
pub mod methods;
pub mod subscriptions;
pub mod ws_server;

pub use http_server::HttpRpcServer;
pub use methods::{RpcContext, RpcError};
pub use subscriptions::SubscriptionManager;
pub use ws_server::WebSocketServer;

// Re-export types that consumers might need
pub use ledger_runtime::{RequestSender, TickUpdate};

/// RPC Server configuration
#[derive(Clone, Debug)]
pub struct RpcServerConfig {
    /// HTTP RPC bind address
    pub http_addr: String,
    /// WebSocket bind address
    pub ws_addr: String,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8899".to_string(),
            ws_addr: "127.0.0.1:8900".to_string(),
        }
    }
}
