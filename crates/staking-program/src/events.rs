//! Observable staking events

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;

use crate::{Amount, Tick};

/// Emitted once per successful operation
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum StakingEvent {
    Staked {
        participant: Pubkey,
        amount: Amount,
        /// Reward moved into the accumulator by this stake
        settled_reward: Amount,
        tick: Tick,
    },

    Withdrawn {
        participant: Pubkey,
        principal: Amount,
        reward: Amount,
        payout: Amount,
        tick: Tick,
    },

    Confirmed {
        manager: Pubkey,
        confirmations: u32,
        required: u32,
    },

    RewardRateChanged {
        manager: Pubkey,
        previous_rate: Amount,
        new_rate: Amount,
    },

    /// Token moved by a direct transfer request
    Transferred {
        from: Pubkey,
        to: Pubkey,
        amount: Amount,
    },

    /// Allowance set by a direct approve request
    Approved {
        owner: Pubkey,
        spender: Pubkey,
        amount: Amount,
    },
}

impl StakingEvent {
    /// Identity that caused the event
    pub fn actor(&self) -> &Pubkey {
        match self {
            StakingEvent::Staked { participant, .. } => participant,
            StakingEvent::Withdrawn { participant, .. } => participant,
            StakingEvent::Confirmed { manager, .. } => manager,
            StakingEvent::RewardRateChanged { manager, .. } => manager,
            StakingEvent::Transferred { from, .. } => from,
            StakingEvent::Approved { owner, .. } => owner,
        }
    }

    /// Whether `identity` caused or received the event
    pub fn involves(&self, identity: &Pubkey) -> bool {
        match self {
            StakingEvent::Transferred { from, to, .. } => from == identity || to == identity,
            StakingEvent::Approved { owner, spender, .. } => owner == identity || spender == identity,
            _ => self.actor() == identity,
        }
    }

    /// Event name as shown to external consumers
    pub fn name(&self) -> &'static str {
        match self {
            StakingEvent::Staked { .. } => "staked",
            StakingEvent::Withdrawn { .. } => "withdrawn",
            StakingEvent::Confirmed { .. } => "confirmed",
            StakingEvent::RewardRateChanged { .. } => "rewardRateChanged",
            StakingEvent::Transferred { .. } => "transfer",
            StakingEvent::Approved { .. } => "approval",
        }
    }
}
