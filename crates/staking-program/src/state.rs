//! Staking Program State

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;

use crate::{Amount, Tick};

/// Per-participant stake record
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct StakeRecord {
    /// Principal currently in the pool
    pub amount_staked: Amount,
    /// Tick at which reward was last settled for this participant
    pub last_accrual_tick: Tick,
    /// Settled reward not yet paid out
    pub accrued_reward: Amount,
}

impl StakeRecord {
    /// Check if the record carries neither stake nor unpaid reward
    pub fn is_empty(&self) -> bool {
        self.amount_staked == 0 && self.accrued_reward == 0
    }
}

/// Serializable view of the whole ledger
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerState {
    /// Current reward per tick
    pub reward_per_tick: Amount,
    /// Sum of every record's `amount_staked`
    pub total_staked: Amount,
    /// Records keyed by participant
    pub records: BTreeMap<Pubkey, StakeRecord>,
}

impl LedgerState {
    /// Recompute the total from the records
    pub fn sum_of_records(&self) -> Option<Amount> {
        self.records
            .values()
            .try_fold(0 as Amount, |acc, r| acc.checked_add(r.amount_staked))
    }
}
