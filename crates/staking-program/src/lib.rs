//! Staking Program - tick-weighted staking ledger
//!
//! Participants deposit tokens into a shared pool and earn a fixed reward per
//! elapsed tick. The reward rate can only change after every manager has
//! confirmed the change.
//!
//! Components:
//! - RewardClock: elapsed ticks -> reward amount
//! - StakeLedger: per-participant stake records and the aggregate total
//! - ConfirmationGate: unanimous confirmation round over a fixed manager set
//! - StakingService: token movement + ledger updates + gated rate change

use solana_program::pubkey::Pubkey;

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod instruction;
pub mod ledger;
pub mod processor;
pub mod service;
pub mod state;
pub mod token;

pub use clock::RewardClock;
pub use config::{ConfigError, StakingConfig};
pub use error::StakingError;
pub use events::StakingEvent;
pub use gate::{ConfirmationGate, GateState};
pub use instruction::StakingInstruction;
pub use ledger::{LedgerUpdate, StakeLedger, StakePlan, WithdrawPlan};
pub use service::{ServiceSnapshot, StakingService};
pub use state::{LedgerState, StakeRecord};
pub use token::{TokenError, TokenLedger};

/// Token amount in the token's smallest unit
pub type Amount = u128;

/// Discrete accrual time
pub type Tick = u64;

// Staking Program ID
solana_program::declare_id!("TickStake1111111111111111111111111111111111");

/// Derive the pool identity that holds staked tokens for a given token
pub fn pool_address(token_address: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[constants::POOL_SEED, token_address.as_ref()], &id()).0
}

/// Constants
pub mod constants {
    use crate::Amount;

    /// Smallest manager set that still removes single-party control
    pub const MIN_MANAGERS: usize = 3;

    /// Reward per tick used when the configuration does not set one
    pub const DEFAULT_REWARD_PER_TICK: Amount = 1;

    /// Pool PDA seed
    pub const POOL_SEED: &[u8] = b"stake_pool";
}
