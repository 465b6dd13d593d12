//! Persistence Layer for ledger state
//!
//! Uses sled embedded database to persist the staking ledger and token
//! balances across restarts. State is saved periodically and on shutdown.

use crate::{processor::RuntimeSnapshot, token_store::TokenStore, LedgerProcessor};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sled::Db;
use solana_program::pubkey::Pubkey;
use staking_program::{Amount, Tick};
use std::path::Path;

const SNAPSHOT_KEY: &str = "snapshot";
const ALLOWANCES_KEY: &str = "allowances";
const METADATA_KEY: &str = "ledger";

/// Metadata about the persisted ledger
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerMetadata {
    /// Next tick to execute
    pub tick: Tick,
    /// State digest at save time
    pub state_root: [u8; 32],
    /// Participants with a stake record
    pub participant_count: u64,
    /// Last save timestamp
    pub last_save_ts: i64,
}

/// Persistent storage for ledger state
pub struct PersistentStore {
    /// Sled database instance
    db: Db,
    /// Runtime snapshot tree
    ledger: sled::Tree,
    /// Token balances tree, keyed by owner
    balances: sled::Tree,
    /// Metadata tree
    metadata: sled::Tree,
}

impl PersistentStore {
    /// Open or create a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        let ledger = db.open_tree("ledger")?;
        let balances = db.open_tree("balances")?;
        let metadata = db.open_tree("metadata")?;

        tracing::info!("Opened persistent store at {:?}", path.as_ref());

        Ok(Self {
            db,
            ledger,
            balances,
            metadata,
        })
    }

    /// Store the runtime snapshot
    pub fn save_snapshot(&self, snapshot: &RuntimeSnapshot) -> anyhow::Result<()> {
        let bytes = borsh::to_vec(snapshot)?;
        self.ledger.insert(SNAPSHOT_KEY, bytes)?;
        Ok(())
    }

    /// Load the runtime snapshot, if one was saved
    pub fn load_snapshot(&self) -> anyhow::Result<Option<RuntimeSnapshot>> {
        match self.ledger.get(SNAPSHOT_KEY)? {
            Some(bytes) => Ok(Some(RuntimeSnapshot::try_from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Replace the stored balances and allowances
    pub fn save_balances(
        &self,
        balances: &[(Pubkey, Amount)],
        allowances: &[((Pubkey, Pubkey), Amount)],
    ) -> anyhow::Result<()> {
        self.balances.clear()?;
        for (owner, amount) in balances {
            self.balances.insert(owner.as_ref(), &amount.to_le_bytes())?;
        }

        let allowance_bytes = borsh::to_vec(&AllowanceTable(allowances.to_vec()))?;
        self.ledger.insert(ALLOWANCES_KEY, allowance_bytes)?;
        Ok(())
    }

    /// Load all balances and allowances
    #[allow(clippy::type_complexity)]
    pub fn load_balances(
        &self,
    ) -> anyhow::Result<(Vec<(Pubkey, Amount)>, Vec<((Pubkey, Pubkey), Amount)>)> {
        let mut balances = Vec::new();

        for result in self.balances.iter() {
            let (key, value) = result?;

            let pubkey_bytes: [u8; 32] = key
                .as_ref()
                .try_into()
                .map_err(|_| anyhow::anyhow!("Invalid pubkey length"))?;
            let amount_bytes: [u8; 16] = value
                .as_ref()
                .try_into()
                .map_err(|_| anyhow::anyhow!("Invalid balance length"))?;

            balances.push((
                Pubkey::new_from_array(pubkey_bytes),
                Amount::from_le_bytes(amount_bytes),
            ));
        }

        let allowances = match self.ledger.get(ALLOWANCES_KEY)? {
            Some(bytes) => AllowanceTable::try_from_slice(&bytes)?.0,
            None => Vec::new(),
        };

        Ok((balances, allowances))
    }

    /// Save ledger metadata
    pub fn save_metadata(&self, metadata: &LedgerMetadata) -> anyhow::Result<()> {
        let bytes = bincode::serialize(metadata)?;
        self.metadata.insert(METADATA_KEY, bytes)?;
        Ok(())
    }

    /// Load ledger metadata
    pub fn load_metadata(&self) -> anyhow::Result<Option<LedgerMetadata>> {
        match self.metadata.get(METADATA_KEY)? {
            Some(bytes) => {
                let metadata: LedgerMetadata = bincode::deserialize(&bytes)?;
                Ok(Some(metadata))
            }
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored balance entries
    pub fn balance_count(&self) -> usize {
        self.balances.len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) -> anyhow::Result<()> {
        self.ledger.clear()?;
        self.balances.clear()?;
        self.metadata.clear()?;
        Ok(())
    }
}

#[derive(BorshSerialize, BorshDeserialize)]
struct AllowanceTable(Vec<((Pubkey, Pubkey), Amount)>);

/// Extension trait to add persistence to the ledger processor
pub trait LedgerPersistence {
    /// Save ledger and token state, returning the metadata written
    fn save_to_disk(&self, store: &PersistentStore, timestamp: i64) -> anyhow::Result<LedgerMetadata>;

    /// Load ledger and token state; `false` if nothing was saved yet
    fn load_from_disk(&mut self, store: &PersistentStore) -> anyhow::Result<bool>;
}

impl LedgerPersistence for LedgerProcessor {
    fn save_to_disk(&self, store: &PersistentStore, timestamp: i64) -> anyhow::Result<LedgerMetadata> {
        // Hold the service lock so ledger and balances are captured together
        let service = self.service().lock();
        let snapshot = RuntimeSnapshot {
            tick: self.current_tick(),
            service: service.snapshot(),
            nonces: self.nonces(),
        };
        let token: &TokenStore = self.token();
        let balances = token.balances();
        let allowances = token.allowances();
        drop(service);

        store.save_snapshot(&snapshot)?;
        store.save_balances(&balances, &allowances)?;

        let metadata = LedgerMetadata {
            tick: snapshot.tick,
            state_root: snapshot.state_root(),
            participant_count: snapshot.service.ledger.records.len() as u64,
            last_save_ts: timestamp,
        };
        store.save_metadata(&metadata)?;
        store.flush()?;

        tracing::info!(
            "Saved ledger at tick {} ({} participants, {} balances)",
            metadata.tick,
            metadata.participant_count,
            balances.len()
        );

        Ok(metadata)
    }

    fn load_from_disk(&mut self, store: &PersistentStore) -> anyhow::Result<bool> {
        let Some(snapshot) = store.load_snapshot()? else {
            return Ok(false);
        };
        let (balances, allowances) = store.load_balances()?;
        let balance_count = balances.len();

        self.token().restore(balances, allowances);
        self.restore(snapshot)?;

        if let Some(metadata) = store.load_metadata()? {
            if metadata.state_root != self.state_root() {
                tracing::warn!("Loaded ledger state root does not match saved metadata");
            }
        }

        tracing::info!(
            "Loaded ledger at tick {} ({} balances)",
            self.current_tick(),
            balance_count
        );

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staking_program::{LedgerState, ServiceSnapshot, StakeRecord};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_store_and_load_snapshot() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        assert!(store.load_snapshot().unwrap().is_none());

        let staker = Pubkey::new_unique();
        let mut records = BTreeMap::new();
        records.insert(
            staker,
            StakeRecord {
                amount_staked: 50,
                last_accrual_tick: 7,
                accrued_reward: 3,
            },
        );
        let snapshot = RuntimeSnapshot {
            tick: 12,
            service: ServiceSnapshot {
                ledger: LedgerState {
                    reward_per_tick: 1,
                    total_staked: 50,
                    records,
                },
                confirmed: vec![Pubkey::new_unique()],
            },
            nonces: vec![(staker, 4)],
        };

        store.save_snapshot(&snapshot).unwrap();
        store.flush().unwrap();

        assert_eq!(store.load_snapshot().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_balances_replace_previous_save() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());

        store.save_balances(&[(a, 1), (b, u128::MAX)], &[((a, b), 9)]).unwrap();
        store.save_balances(&[(b, 5)], &[]).unwrap();

        let (balances, allowances) = store.load_balances().unwrap();
        assert_eq!(balances, vec![(b, 5)]);
        assert!(allowances.is_empty());
        assert_eq!(store.balance_count(), 1);
    }

    #[test]
    fn test_metadata() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();

        let metadata = LedgerMetadata {
            tick: 1000,
            state_root: [42u8; 32],
            participant_count: 3,
            last_save_ts: 12345,
        };

        store.save_metadata(&metadata).unwrap();

        let loaded = store.load_metadata().unwrap().unwrap();
        assert_eq!(loaded, metadata);

        store.clear().unwrap();
        assert!(store.load_metadata().unwrap().is_none());
    }
}
