//! Ledger Runtime - serialized execution of staking requests
//!
//! This crate hosts the staking service behind a single mailbox:
//! - Signed, nonce-ordered requests
//! - In-memory token ledger the staking pool draws from and pays out of
//! - Fixed-rate tick production; every request runs at the tick it lands in
//! - Optional sled persistence of the ledger and balances

pub mod persistence;
pub mod processor;
pub mod request;
pub mod tick_producer;
pub mod token_store;


pub use persistence::{LedgerMetadata, LedgerPersistence, PersistentStore};
pub use processor::{LedgerProcessor, RequestResult, RuntimeSnapshot, SharedService};
pub use request::{identity_of, LedgerInstruction, RequestError, SignedRequest, TokenInstruction};
pub use tick_producer::{RequestSender, TickProducer, TickProducerConfig, TickUpdate};
pub use token_store::{PoolAccount, TokenMetadata, TokenStore};

/// Tick time in milliseconds
pub const TICK_TIME_MS: u64 = 1000;

/// Maximum requests executed per tick
pub const MAX_REQUESTS_PER_TICK: usize = 64;
