//! In-memory fungible token ledger using DashMap for concurrent reads

use dashmap::DashMap;
use parking_lot::RwLock;
use solana_program::pubkey::Pubkey;
use staking_program::{Amount, TokenError, TokenLedger};
use std::sync::Arc;

/// Token name, symbol and precision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Thread-safe token ledger
///
/// Cloning shares the underlying maps. Writes are expected to come from the
/// tick producer only; readers (RPC) may look at balances at any time.
#[derive(Clone)]
pub struct TokenStore {
    /// Identity of the token itself
    address: Pubkey,
    metadata: Arc<TokenMetadata>,
    balances: Arc<DashMap<Pubkey, Amount>>,
    /// (owner, spender) -> approved amount
    allowances: Arc<DashMap<(Pubkey, Pubkey), Amount>>,
    /// Only this identity may create supply on payout
    minter: Arc<RwLock<Option<Pubkey>>>,
}

impl TokenStore {
    /// Create an empty token
    pub fn new(address: Pubkey, metadata: TokenMetadata) -> Self {
        Self {
            address,
            metadata: Arc::new(metadata),
            balances: Arc::new(DashMap::new()),
            allowances: Arc::new(DashMap::new()),
            minter: Arc::new(RwLock::new(None)),
        }
    }

    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    /// `whole` tokens expressed in the smallest unit
    pub fn units(&self, whole: u64) -> Result<Amount, TokenError> {
        (10 as Amount)
            .checked_pow(u32::from(self.metadata.decimals))
            .and_then(|scale| scale.checked_mul(Amount::from(whole)))
            .ok_or(TokenError::Overflow)
    }

    pub fn balance_of(&self, owner: &Pubkey) -> Amount {
        self.balances.get(owner).map(|b| *b).unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Pubkey, spender: &Pubkey) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .map(|a| *a)
            .unwrap_or(0)
    }

    pub fn total_supply(&self) -> Result<Amount, TokenError> {
        self.balances.iter().try_fold(0 as Amount, |acc, entry| {
            acc.checked_add(*entry.value()).ok_or(TokenError::Overflow)
        })
    }

    pub fn minter(&self) -> Option<Pubkey> {
        *self.minter.read()
    }

    /// Hand minting rights to `minter` (the staking pool)
    pub fn set_minter(&self, minter: Option<Pubkey>) {
        *self.minter.write() = minter;
        tracing::info!("Token {} minter set to {:?}", self.metadata.symbol, minter);
    }

    /// Create `amount` new tokens for `to`
    pub fn mint(&self, to: &Pubkey, amount: Amount) -> Result<(), TokenError> {
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        self.balances.insert(*to, balance);
        tracing::debug!("Minted {} {} to {}", amount, self.metadata.symbol, to);
        Ok(())
    }

    /// Set `spender`'s allowance over `owner`'s balance
    pub fn approve(&self, owner: &Pubkey, spender: &Pubkey, amount: Amount) {
        self.allowances.insert((*owner, *spender), amount);
        tracing::debug!("{} approved {} for {}", owner, amount, spender);
    }

    /// Move `amount` from `from` to `to`
    pub fn transfer(&self, from: &Pubkey, to: &Pubkey, amount: Amount) -> Result<(), TokenError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;

        // No map guard is held across these inserts
        self.balances.insert(*from, available - amount);
        self.balances.insert(*to, credited);
        Ok(())
    }

    /// Move `amount` from `from` to `to` on behalf of `spender`
    pub fn transfer_from(
        &self,
        spender: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let approved = self.allowance(from, spender);
        if approved < amount {
            return Err(TokenError::InsufficientAllowance {
                approved,
                required: amount,
            });
        }
        self.transfer(from, to, amount)?;
        self.allowances.insert((*from, *spender), approved - amount);
        Ok(())
    }

    /// All non-zero balances (for persistence)
    pub fn balances(&self) -> Vec<(Pubkey, Amount)> {
        self.balances
            .iter()
            .filter(|r| *r.value() > 0)
            .map(|r| (*r.key(), *r.value()))
            .collect()
    }

    /// All non-zero allowances (for persistence)
    pub fn allowances(&self) -> Vec<((Pubkey, Pubkey), Amount)> {
        self.allowances
            .iter()
            .filter(|r| *r.value() > 0)
            .map(|r| (*r.key(), *r.value()))
            .collect()
    }

    /// Replace all balances and allowances
    pub fn restore(&self, balances: Vec<(Pubkey, Amount)>, allowances: Vec<((Pubkey, Pubkey), Amount)>) {
        self.balances.clear();
        self.allowances.clear();
        for (owner, amount) in balances {
            self.balances.insert(owner, amount);
        }
        for (key, amount) in allowances {
            self.allowances.insert(key, amount);
        }
    }

    /// Number of holders with a balance entry
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

/// The staking pool's handle on a [`TokenStore`]
#[derive(Clone)]
pub struct PoolAccount {
    store: TokenStore,
    pool: Pubkey,
}

impl PoolAccount {
    pub fn new(store: TokenStore, pool: Pubkey) -> Self {
        Self { store, pool }
    }

    pub fn pool(&self) -> &Pubkey {
        &self.pool
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }
}

impl TokenLedger for PoolAccount {
    fn balance_of(&self, identity: &Pubkey) -> Amount {
        self.store.balance_of(identity)
    }

    fn transfer_from(&mut self, owner: &Pubkey, amount: Amount) -> Result<(), TokenError> {
        self.store.transfer_from(&self.pool, owner, &self.pool, amount)
    }

    fn transfer_to(&mut self, recipient: &Pubkey, amount: Amount) -> Result<(), TokenError> {
        let held = self.store.balance_of(&self.pool);
        if held < amount {
            if self.store.minter() != Some(self.pool) {
                return Err(TokenError::InsufficientBalance {
                    available: held,
                    required: amount,
                });
            }
            // No supply is created unless the recipient can be credited
            if *recipient != self.pool {
                self.store
                    .balance_of(recipient)
                    .checked_add(amount)
                    .ok_or(TokenError::Overflow)?;
            }
            self.store.mint(&self.pool, amount - held)?;
        }
        self.store.transfer(&self.pool, recipient, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> TokenStore {
        TokenStore::new(
            Pubkey::new_unique(),
            TokenMetadata {
                name: "MyToken".to_string(),
                symbol: "MT".to_string(),
                decimals: 18,
            },
        )
    }

    #[test]
    fn test_units_scale_by_decimals() {
        let token = token();
        assert_eq!(token.units(100).unwrap(), 100 * 10u128.pow(18));
        assert_eq!(token.units(0).unwrap(), 0);
    }

    #[test]
    fn test_transfer_and_insufficient_balance() {
        let token = token();
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        token.mint(&a, 100).unwrap();

        token.transfer(&a, &b, 40).unwrap();
        assert_eq!(token.balance_of(&a), 60);
        assert_eq!(token.balance_of(&b), 40);

        assert_eq!(
            token.transfer(&a, &b, 61),
            Err(TokenError::InsufficientBalance { available: 60, required: 61 })
        );
        assert_eq!(token.total_supply(), Ok(100));
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let token = token();
        let (owner, spender, to) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        token.mint(&owner, 10).unwrap();

        assert_eq!(
            token.transfer_from(&spender, &owner, &to, 1),
            Err(TokenError::InsufficientAllowance { approved: 0, required: 1 })
        );

        token.approve(&owner, &spender, 5);
        token.transfer_from(&spender, &owner, &to, 3).unwrap();
        assert_eq!(token.allowance(&owner, &spender), 2);
        assert_eq!(token.balance_of(&owner), 7);
        assert_eq!(token.balance_of(&to), 3);
    }

    #[test]
    fn test_pool_mints_shortfall_only_as_minter() {
        let token = token();
        let pool = Pubkey::new_unique();
        let user = Pubkey::new_unique();
        token.mint(&pool, 50).unwrap();
        let mut account = PoolAccount::new(token.clone(), pool);

        assert_eq!(
            account.transfer_to(&user, 55),
            Err(TokenError::InsufficientBalance { available: 50, required: 55 })
        );
        assert_eq!(token.balance_of(&pool), 50);

        token.set_minter(Some(pool));
        account.transfer_to(&user, 55).unwrap();
        assert_eq!(token.balance_of(&user), 55);
        assert_eq!(token.balance_of(&pool), 0);
        assert_eq!(token.total_supply(), Ok(55));
    }

    #[test]
    fn test_pool_mints_nothing_when_recipient_would_overflow() {
        let token = token();
        let pool = Pubkey::new_unique();
        let user = Pubkey::new_unique();
        token.mint(&pool, 50).unwrap();
        token.mint(&user, u128::MAX - 100).unwrap();
        token.set_minter(Some(pool));
        let mut account = PoolAccount::new(token.clone(), pool);

        assert_eq!(account.transfer_to(&user, 250), Err(TokenError::Overflow));
        assert_eq!(token.balance_of(&pool), 50);
        assert_eq!(token.balance_of(&user), u128::MAX - 100);
        assert_eq!(token.total_supply(), Ok(u128::MAX - 50));
    }

    #[test]
    fn test_total_supply_reports_overflow() {
        let token = token();
        token.mint(&Pubkey::new_unique(), u128::MAX).unwrap();
        token.mint(&Pubkey::new_unique(), 1).unwrap();

        assert_eq!(token.total_supply(), Err(TokenError::Overflow));
    }

    #[test]
    fn test_restore_replaces_state() {
        let token = token();
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        token.mint(&a, 1).unwrap();

        token.restore(vec![(b, 9)], vec![((b, a), 4)]);
        assert_eq!(token.balance_of(&a), 0);
        assert_eq!(token.balance_of(&b), 9);
        assert_eq!(token.allowance(&b, &a), 4);
    }
}
