//! Node Configuration
//!
//! Loaded from a JSON file; every field has a default so partial files work.

use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;
use std::{path::{Path, PathBuf}, str::FromStr};
use thiserror::Error;

/// Token PDA seed
const TOKEN_SEED: &[u8] = b"token";

/// Longest symbol usable as a PDA seed
const MAX_SYMBOL_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum NodeConfigError {
    #[error("Invalid {field} pubkey: {value}")]
    InvalidPubkey { field: &'static str, value: String },

    #[error("Owner must be set")]
    MissingOwner,

    #[error("Token symbol must be 1-32 bytes, got {0:?}")]
    InvalidSymbol(String),

    #[error("Tick time must be greater than zero")]
    ZeroTickTime,
}

/// Genesis token parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenGenesis {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Whole tokens minted to the owner on first start
    pub initial_supply: u64,
}

impl Default for TokenGenesis {
    fn default() -> Self {
        Self {
            name: "MyToken".to_string(),
            symbol: "MT".to_string(),
            decimals: 18,
            initial_supply: 1_000_000,
        }
    }
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP RPC bind address
    pub rpc_addr: String,
    /// WebSocket bind address
    pub ws_addr: String,
    /// Tick time in milliseconds
    pub tick_time_ms: u64,
    /// Data directory for persistent state
    pub data_dir: PathBuf,
    /// Save state every N ticks (0 = only on shutdown)
    pub save_interval: u64,
    pub token: TokenGenesis,
    /// Base58 identity receiving the initial supply
    pub owner: Option<String>,
    /// Base58 manager identities
    pub managers: Vec<String>,
    /// Reward per tick in whole tokens
    pub reward_per_tick: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "127.0.0.1:8899".to_string(),
            ws_addr: "127.0.0.1:8900".to_string(),
            tick_time_ms: ledger_runtime::TICK_TIME_MS,
            data_dir: PathBuf::from("./data"),
            save_interval: 300,
            token: TokenGenesis::default(),
            owner: None,
            managers: Vec::new(),
            reward_per_tick: 1,
        }
    }
}

impl NodeConfig {
    /// Read a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(&path)?;
        let config = serde_json::from_str(&text)?;
        tracing::info!("Loaded config from {:?}", path.as_ref());
        Ok(config)
    }

    /// Check the fields the node cannot start without
    pub fn validate(&self) -> Result<(), NodeConfigError> {
        if self.tick_time_ms == 0 {
            return Err(NodeConfigError::ZeroTickTime);
        }
        let symbol_len = self.token.symbol.len();
        if symbol_len == 0 || symbol_len > MAX_SYMBOL_LEN {
            return Err(NodeConfigError::InvalidSymbol(self.token.symbol.clone()));
        }
        self.owner()?;
        self.managers()?;
        Ok(())
    }

    pub fn owner(&self) -> Result<Pubkey, NodeConfigError> {
        let value = self.owner.as_deref().ok_or(NodeConfigError::MissingOwner)?;
        parse_pubkey("owner", value)
    }

    pub fn managers(&self) -> Result<Vec<Pubkey>, NodeConfigError> {
        self.managers
            .iter()
            .map(|value| parse_pubkey("manager", value))
            .collect()
    }

    /// Token identity, derived from the symbol
    pub fn token_address(&self) -> Pubkey {
        Pubkey::find_program_address(&[TOKEN_SEED, self.token.symbol.as_bytes()], &staking_program::id()).0
    }
}

fn parse_pubkey(field: &'static str, value: &str) -> Result<Pubkey, NodeConfigError> {
    Pubkey::from_str(value).map_err(|_| NodeConfigError::InvalidPubkey {
        field,
        value: value.to_string(),
    })
}
