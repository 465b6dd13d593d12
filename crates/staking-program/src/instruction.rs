//! Staking Program Instructions

use borsh::{BorshDeserialize, BorshSerialize};

use crate::Amount;

/// Staking program instructions
///
/// The caller identity and the current tick are supplied by the runtime that
/// executes the instruction, never by the instruction itself.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum StakingInstruction {
    /// Stake tokens into the pool
    ///
    /// Caller: participant; must have approved the pool for `amount`
    Stake {
        amount: Amount,
    },

    /// Withdraw principal plus all unpaid reward
    ///
    /// Caller: participant
    Withdraw {
        amount: Amount,
    },

    /// Confirm the pending reward rate change
    ///
    /// Caller: manager
    Confirm,

    /// Change the reward per tick (all managers must have confirmed)
    ///
    /// Caller: manager
    SetRewardRate {
        new_rate: Amount,
    },
}
