//! Token interface consumed by the staking service
//!
//! The token ledger itself lives outside this crate. The service only pulls
//! stake into the pool and pushes payouts back out.

use solana_program::pubkey::Pubkey;
use thiserror::Error;

use crate::Amount;

/// Errors raised by a token ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("insufficient allowance: approved {approved}, required {required}")]
    InsufficientAllowance { approved: Amount, required: Amount },

    #[error("token arithmetic overflow")]
    Overflow,
}

/// Pool-side view of a fungible token ledger
pub trait TokenLedger {
    /// Balance held by `identity`
    fn balance_of(&self, identity: &Pubkey) -> Amount;

    /// Pull `amount` from `owner` into the pool
    fn transfer_from(&mut self, owner: &Pubkey, amount: Amount) -> Result<(), TokenError>;

    /// Push `amount` from the pool to `recipient`.
    ///
    /// Implementations that can mint may create the part of `amount` the pool
    /// does not hold; otherwise they fail with `InsufficientBalance`.
    fn transfer_to(&mut self, recipient: &Pubkey, amount: Amount) -> Result<(), TokenError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;

    use super::*;

    /// Minimal in-memory token for unit tests
    #[derive(Debug, Clone, Default)]
    pub struct MockToken {
        pub pool: Pubkey,
        pub balances: HashMap<Pubkey, Amount>,
        /// Allowance each owner granted the pool
        pub allowances: HashMap<Pubkey, Amount>,
        /// Whether payouts may mint the pool's shortfall
        pub can_mint: bool,
    }

    impl MockToken {
        pub fn new(can_mint: bool) -> Self {
            Self {
                pool: Pubkey::new_unique(),
                can_mint,
                ..Default::default()
            }
        }

        pub fn fund(&mut self, owner: &Pubkey, amount: Amount) {
            *self.balances.entry(*owner).or_default() += amount;
            *self.allowances.entry(*owner).or_default() += amount;
        }
    }

    impl TokenLedger for MockToken {
        fn balance_of(&self, identity: &Pubkey) -> Amount {
            self.balances.get(identity).copied().unwrap_or(0)
        }

        fn transfer_from(&mut self, owner: &Pubkey, amount: Amount) -> Result<(), TokenError> {
            let approved = self.allowances.get(owner).copied().unwrap_or(0);
            if approved < amount {
                return Err(TokenError::InsufficientAllowance { approved, required: amount });
            }
            let available = self.balance_of(owner);
            if available < amount {
                return Err(TokenError::InsufficientBalance { available, required: amount });
            }
            self.allowances.insert(*owner, approved - amount);
            self.balances.insert(*owner, available - amount);
            *self.balances.entry(self.pool).or_default() += amount;
            Ok(())
        }

        fn transfer_to(&mut self, recipient: &Pubkey, amount: Amount) -> Result<(), TokenError> {
            let available = self.balance_of(&self.pool);
            if available < amount {
                if !self.can_mint {
                    return Err(TokenError::InsufficientBalance { available, required: amount });
                }
                self.balances.insert(self.pool, amount);
            }
            *self.balances.get_mut(&self.pool).expect("pool funded above") -= amount;
            *self.balances.entry(*recipient).or_default() += amount;
            Ok(())
        }
    }
}
