//! Stake ledger
//!
//! Tracks per-participant stake and the pool total, and settles reward
//! through the [`RewardClock`]. Mutations are two-phase: a `plan_*` call
//! computes the full post-state without touching the ledger, and
//! [`StakeLedger::commit`] applies it. Callers that must bind a ledger change
//! to an external transfer plan first, transfer, then commit.

use std::collections::BTreeMap;

use solana_program::pubkey::Pubkey;

use crate::{
    clock::RewardClock,
    error::StakingError,
    state::{LedgerState, StakeRecord},
    Amount, Tick,
};

/// Post-state for one participant, ready to be committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    participant: Pubkey,
    record: StakeRecord,
    total_staked: Amount,
}

impl LedgerUpdate {
    pub fn participant(&self) -> &Pubkey {
        &self.participant
    }

    pub fn record(&self) -> &StakeRecord {
        &self.record
    }
}

/// Planned stake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakePlan {
    /// Principal being added
    pub amount: Amount,
    /// Reward settled into the accumulator before the principal was added
    pub settled_reward: Amount,
    update: LedgerUpdate,
}

/// Planned withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawPlan {
    /// Principal leaving the pool
    pub principal: Amount,
    /// Reward paid with it (accumulator plus the span just settled)
    pub reward: Amount,
    /// `principal + reward`
    pub payout: Amount,
    update: LedgerUpdate,
}

impl From<StakePlan> for LedgerUpdate {
    fn from(plan: StakePlan) -> Self {
        plan.update
    }
}

impl From<WithdrawPlan> for LedgerUpdate {
    fn from(plan: WithdrawPlan) -> Self {
        plan.update
    }
}

/// Per-participant and aggregate stake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StakeLedger {
    records: BTreeMap<Pubkey, StakeRecord>,
    total_staked: Amount,
    reward_per_tick: Amount,
}

impl StakeLedger {
    /// Create an empty ledger accruing at `reward_per_tick`
    pub fn new(reward_per_tick: Amount) -> Self {
        Self {
            records: BTreeMap::new(),
            total_staked: 0,
            reward_per_tick,
        }
    }

    /// Rebuild a ledger from a snapshot, checking the total invariant
    pub fn from_state(state: LedgerState) -> Result<Self, StakingError> {
        let sum = state.sum_of_records().ok_or(StakingError::Overflow)?;
        if sum != state.total_staked {
            return Err(StakingError::PreconditionViolated(
                "snapshot total does not match the sum of stake records",
            ));
        }
        Ok(Self {
            records: state.records,
            total_staked: state.total_staked,
            reward_per_tick: state.reward_per_tick,
        })
    }

    /// Snapshot the ledger
    pub fn to_state(&self) -> LedgerState {
        LedgerState {
            reward_per_tick: self.reward_per_tick,
            total_staked: self.total_staked,
            records: self.records.clone(),
        }
    }

    /// Reward pending for `participant` since its last checkpoint.
    ///
    /// Participants with nothing staked accrue nothing.
    pub fn settle(&self, participant: &Pubkey, current_tick: Tick) -> Result<Amount, StakingError> {
        match self.records.get(participant) {
            Some(record) => self.settle_record(record, current_tick),
            None => Ok(0),
        }
    }

    fn settle_record(&self, record: &StakeRecord, current_tick: Tick) -> Result<Amount, StakingError> {
        if record.amount_staked == 0 {
            return Ok(0);
        }
        let elapsed = RewardClock::elapsed(record.last_accrual_tick, current_tick)?;
        RewardClock::accrue(self.reward_per_tick, elapsed)
    }

    /// Compute the effect of staking `amount` at `current_tick`
    pub fn plan_stake(
        &self,
        participant: &Pubkey,
        amount: Amount,
        current_tick: Tick,
    ) -> Result<StakePlan, StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }

        let mut record = self.records.get(participant).cloned().unwrap_or_default();
        let settled_reward = self.settle_record(&record, current_tick)?;

        record.accrued_reward = record
            .accrued_reward
            .checked_add(settled_reward)
            .ok_or(StakingError::Overflow)?;
        record.amount_staked = record
            .amount_staked
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        record.last_accrual_tick = current_tick;

        let total_staked = self
            .total_staked
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;

        Ok(StakePlan {
            amount,
            settled_reward,
            update: LedgerUpdate {
                participant: *participant,
                record,
                total_staked,
            },
        })
    }

    /// Compute the effect of withdrawing `amount` at `current_tick`
    pub fn plan_withdraw(
        &self,
        participant: &Pubkey,
        amount: Amount,
        current_tick: Tick,
    ) -> Result<WithdrawPlan, StakingError> {
        let mut record = self.records.get(participant).cloned().unwrap_or_default();
        if amount > record.amount_staked {
            return Err(StakingError::InsufficientStake {
                requested: amount,
                staked: record.amount_staked,
            });
        }

        let settled = self.settle_record(&record, current_tick)?;
        let reward = record
            .accrued_reward
            .checked_add(settled)
            .ok_or(StakingError::Overflow)?;
        let payout = amount.checked_add(reward).ok_or(StakingError::Overflow)?;

        record.amount_staked -= amount;
        record.accrued_reward = 0;
        record.last_accrual_tick = current_tick;

        Ok(WithdrawPlan {
            principal: amount,
            reward,
            payout,
            update: LedgerUpdate {
                participant: *participant,
                record,
                total_staked: self.total_staked - amount,
            },
        })
    }

    /// Apply a planned update
    pub fn commit(&mut self, update: impl Into<LedgerUpdate>) {
        let LedgerUpdate {
            participant,
            record,
            total_staked,
        } = update.into();

        if record.is_empty() && !self.records.contains_key(&participant) {
            // Zero withdrawal by someone who never staked
            return;
        }
        self.records.insert(participant, record);
        self.total_staked = total_staked;
    }

    /// Stake `amount` for `participant`
    pub fn stake(
        &mut self,
        participant: &Pubkey,
        amount: Amount,
        current_tick: Tick,
    ) -> Result<(), StakingError> {
        let plan = self.plan_stake(participant, amount, current_tick)?;
        self.commit(plan);
        Ok(())
    }

    /// Withdraw `amount`, returning principal plus all unpaid reward
    pub fn withdraw(
        &mut self,
        participant: &Pubkey,
        amount: Amount,
        current_tick: Tick,
    ) -> Result<Amount, StakingError> {
        let plan = self.plan_withdraw(participant, amount, current_tick)?;
        let payout = plan.payout;
        self.commit(plan);
        Ok(payout)
    }

    pub fn staked_of(&self, participant: &Pubkey) -> Amount {
        self.records
            .get(participant)
            .map(|r| r.amount_staked)
            .unwrap_or(0)
    }

    pub fn total_staked(&self) -> Amount {
        self.total_staked
    }

    pub fn reward_per_tick(&self) -> Amount {
        self.reward_per_tick
    }

    /// Only reachable through the service's gated path
    pub(crate) fn set_reward_per_tick(&mut self, rate: Amount) {
        self.reward_per_tick = rate;
    }

    pub fn record(&self, participant: &Pubkey) -> Option<&StakeRecord> {
        self.records.get(participant)
    }

    /// Reward a withdrawal at `current_tick` would pay
    pub fn pending_reward(&self, participant: &Pubkey, current_tick: Tick) -> Result<Amount, StakingError> {
        let accrued = self
            .records
            .get(participant)
            .map(|r| r.accrued_reward)
            .unwrap_or(0);
        accrued
            .checked_add(self.settle(participant, current_tick)?)
            .ok_or(StakingError::Overflow)
    }

    /// Number of participants with a record
    pub fn participant_count(&self) -> usize {
        self.records.len()
    }
}
