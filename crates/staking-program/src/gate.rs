//! Confirmation gate
//!
//! Unanimous confirmation over a fixed manager set. A round collects distinct
//! manager confirmations; once every manager has confirmed the gate is
//! `Unanimous` and the protected action may run, consuming the round.

use std::collections::BTreeSet;

use solana_program::pubkey::Pubkey;

use crate::{config::ConfigError, constants::MIN_MANAGERS, error::StakingError};

/// Gate state, derived from the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Round empty or partially confirmed
    Open,
    /// Every manager has confirmed
    Unanimous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationGate {
    managers: BTreeSet<Pubkey>,
    confirmed: BTreeSet<Pubkey>,
}

impl ConfirmationGate {
    /// Create a gate over `managers`
    pub fn new(managers: impl IntoIterator<Item = Pubkey>) -> Result<Self, ConfigError> {
        let mut set = BTreeSet::new();
        for manager in managers {
            if !set.insert(manager) {
                return Err(ConfigError::DuplicateManager(manager));
            }
        }
        if set.len() < MIN_MANAGERS {
            return Err(ConfigError::TooFewManagers {
                count: set.len(),
                min: MIN_MANAGERS,
            });
        }

        Ok(Self {
            managers: set,
            confirmed: BTreeSet::new(),
        })
    }

    pub fn is_manager(&self, identity: &Pubkey) -> bool {
        self.managers.contains(identity)
    }

    /// Record a confirmation from `caller`.
    ///
    /// Returns `true` if this confirmation was new to the round. Confirming
    /// twice is not an error.
    pub fn confirm(&mut self, caller: &Pubkey) -> Result<bool, StakingError> {
        if !self.is_manager(caller) {
            return Err(StakingError::NotAManager(*caller));
        }
        Ok(self.confirmed.insert(*caller))
    }

    pub fn is_unanimous(&self) -> bool {
        self.confirmed.len() == self.managers.len()
    }

    pub fn state(&self) -> GateState {
        if self.is_unanimous() {
            GateState::Unanimous
        } else {
            GateState::Open
        }
    }

    /// Clear the round after the protected action ran
    pub fn consume_and_reset(&mut self) -> Result<(), StakingError> {
        if !self.is_unanimous() {
            return Err(StakingError::PreconditionViolated(
                "confirmation round consumed before unanimity",
            ));
        }
        self.confirmed.clear();
        Ok(())
    }

    /// Managers who confirmed the current round
    pub fn confirmations(&self) -> impl Iterator<Item = &Pubkey> {
        self.confirmed.iter()
    }

    pub fn confirmation_count(&self) -> usize {
        self.confirmed.len()
    }

    pub fn managers(&self) -> impl Iterator<Item = &Pubkey> {
        self.managers.iter()
    }

    /// Confirmations needed for unanimity
    pub fn required(&self) -> usize {
        self.managers.len()
    }

    /// Reload a persisted round
    pub fn restore_round(&mut self, confirmed: impl IntoIterator<Item = Pubkey>) -> Result<(), StakingError> {
        let mut round = BTreeSet::new();
        for identity in confirmed {
            if !self.is_manager(&identity) {
                return Err(StakingError::NotAManager(identity));
            }
            round.insert(identity);
        }
        self.confirmed = round;
        Ok(())
    }
}
