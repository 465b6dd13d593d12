//! Staking Program Errors

use solana_program::pubkey::Pubkey;
use thiserror::Error;

use crate::{token::TokenError, Amount, Tick};

/// Staking program errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("Stake amount must be greater than zero")]
    ZeroAmount,

    #[error("Insufficient stake: requested {requested}, staked {staked}")]
    InsufficientStake { requested: Amount, staked: Amount },

    #[error("You are not a manager: {0}")]
    NotAManager(Pubkey),

    #[error("Not all confirmed yet ({confirmed}/{required})")]
    NotUnanimous { confirmed: usize, required: usize },

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Reward unfunded: token cannot supply payout of {payout}")]
    RewardUnfunded { payout: Amount },

    #[error("Precondition violated: {0}")]
    PreconditionViolated(&'static str),

    #[error("Tick {current} precedes accrual checkpoint {checkpoint}")]
    TickRegression { checkpoint: Tick, current: Tick },

    #[error("Invalid instruction data")]
    InvalidInstructionData,

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl StakingError {
    /// Stable numeric code, surfaced by the RPC layer
    pub fn code(&self) -> u32 {
        match self {
            StakingError::ZeroAmount => 0,
            StakingError::InsufficientStake { .. } => 1,
            StakingError::NotAManager(_) => 2,
            StakingError::NotUnanimous { .. } => 3,
            StakingError::Overflow => 4,
            StakingError::RewardUnfunded { .. } => 5,
            StakingError::PreconditionViolated(_) => 6,
            StakingError::TickRegression { .. } => 7,
            StakingError::InvalidInstructionData => 8,
            StakingError::Token(TokenError::InsufficientBalance { .. }) => 100,
            StakingError::Token(TokenError::InsufficientAllowance { .. }) => 101,
            StakingError::Token(TokenError::Overflow) => 102,
        }
    }
}
