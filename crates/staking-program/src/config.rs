//! Creation-time configuration

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;
use thiserror::Error;

use crate::{constants::{DEFAULT_REWARD_PER_TICK, MIN_MANAGERS}, Amount};

/// Configuration rejected at creation time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least {min} managers required, got {count}")]
    TooFewManagers { count: usize, min: usize },

    #[error("Duplicate manager: {0}")]
    DuplicateManager(Pubkey),

    #[error("Confirmation threshold {threshold} must equal the manager count {managers}")]
    ThresholdMismatch { threshold: u32, managers: usize },
}

/// Staking service configuration
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct StakingConfig {
    /// Token ledger the pool holds
    pub token_address: Pubkey,
    /// Initial administrative identity
    pub owner: Pubkey,
    /// Fixed manager set
    pub managers: Vec<Pubkey>,
    /// Confirmations required for a rate change; must equal `managers.len()`
    pub confirmation_threshold: u32,
    /// Initial reward per tick
    pub reward_per_tick: Amount,
}

impl StakingConfig {
    /// Unanimous configuration over `managers` at the default rate
    pub fn new(token_address: Pubkey, owner: Pubkey, managers: Vec<Pubkey>) -> Self {
        let confirmation_threshold = managers.len() as u32;
        Self {
            token_address,
            owner,
            managers,
            confirmation_threshold,
            reward_per_tick: DEFAULT_REWARD_PER_TICK,
        }
    }

    pub fn with_reward_per_tick(mut self, reward_per_tick: Amount) -> Self {
        self.reward_per_tick = reward_per_tick;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.managers.len() < MIN_MANAGERS {
            return Err(ConfigError::TooFewManagers {
                count: self.managers.len(),
                min: MIN_MANAGERS,
            });
        }

        let mut seen = BTreeSet::new();
        for manager in &self.managers {
            if !seen.insert(*manager) {
                return Err(ConfigError::DuplicateManager(*manager));
            }
        }

        if self.confirmation_threshold as usize != self.managers.len() {
            return Err(ConfigError::ThresholdMismatch {
                threshold: self.confirmation_threshold,
                managers: self.managers.len(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn managers(n: usize) -> Vec<Pubkey> {
        (0..n).map(|_| Pubkey::new_unique()).collect()
    }

    #[test]
    fn test_three_managers_accepted() {
        let config = StakingConfig::new(Pubkey::new_unique(), Pubkey::new_unique(), managers(3));
        assert_eq!(config.confirmation_threshold, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fewer_than_three_rejected() {
        let config = StakingConfig::new(Pubkey::new_unique(), Pubkey::new_unique(), managers(2));
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooFewManagers { count: 2, min: 3 })
        );
    }

    #[test]
    fn test_duplicate_manager_rejected() {
        let mut list = managers(3);
        list.push(list[0]);
        let config = StakingConfig::new(Pubkey::new_unique(), Pubkey::new_unique(), list.clone());
        assert_eq!(config.validate(), Err(ConfigError::DuplicateManager(list[0])));
    }

    #[test]
    fn test_threshold_below_unanimity_rejected() {
        let mut config = StakingConfig::new(Pubkey::new_unique(), Pubkey::new_unique(), managers(4));
        config.confirmation_threshold = 3;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdMismatch { threshold: 3, managers: 4 })
        );
    }
}
