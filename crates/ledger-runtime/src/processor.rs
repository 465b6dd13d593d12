//! Ledger request processor
//!
//! Verifies signed requests and executes them one at a time against the
//! staking service and the token store at the current tick.

use crate::{
    request::{LedgerInstruction, RequestError, SignedRequest, TokenInstruction},
    token_store::{PoolAccount, TokenStore},
};
use borsh::{BorshDeserialize, BorshSerialize};
use parking_lot::Mutex;
use solana_program::pubkey::Pubkey;
use staking_program::{
    processor as staking_processor, ServiceSnapshot, StakingEvent, StakingService, Tick,
};
use std::{collections::BTreeMap, sync::Arc};

/// The staking service as shared between the tick producer and readers.
///
/// The mutex is the single serialization point for every ledger mutation.
pub type SharedService = Arc<Mutex<StakingService<PoolAccount>>>;

/// Result of processing a single request
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub caller: Pubkey,
    pub nonce: u64,
    pub tick: Tick,
    pub success: bool,
    pub error: Option<RequestError>,
    pub events: Vec<StakingEvent>,
}

/// Everything the runtime needs to resume after a restart (token state aside)
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub tick: Tick,
    pub service: ServiceSnapshot,
    /// Last accepted nonce per caller
    pub nonces: Vec<(Pubkey, u64)>,
}

impl RuntimeSnapshot {
    /// blake3 digest of the encoded snapshot
    pub fn state_root(&self) -> [u8; 32] {
        let bytes = borsh::to_vec(self).expect("RuntimeSnapshot serialization should not fail");
        *blake3::hash(&bytes).as_bytes()
    }
}

pub struct LedgerProcessor {
    service: SharedService,
    token: TokenStore,
    current_tick: Tick,
    nonces: BTreeMap<Pubkey, u64>,
}

impl LedgerProcessor {
    /// Create a processor starting at tick 0
    pub fn new(service: SharedService, token: TokenStore) -> Self {
        Self {
            service,
            token,
            current_tick: 0,
            nonces: BTreeMap::new(),
        }
    }

    pub fn service(&self) -> &SharedService {
        &self.service
    }

    pub fn token(&self) -> &TokenStore {
        &self.token
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Advance to the next tick
    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
    }

    /// Process a batch in order
    pub fn process_requests(&mut self, requests: &[SignedRequest]) -> Vec<RequestResult> {
        requests.iter().map(|r| self.process_request(r)).collect()
    }

    /// Process a single request at the current tick
    pub fn process_request(&mut self, request: &SignedRequest) -> RequestResult {
        let tick = self.current_tick;
        let outcome = self.execute(request, tick);

        let (success, error, events) = match outcome {
            Ok(events) => (true, None, events),
            Err(e) => {
                tracing::warn!(
                    "Request from {} (nonce {}) failed at tick {}: {}",
                    request.caller,
                    request.nonce,
                    tick,
                    e
                );
                (false, Some(e), Vec::new())
            }
        };

        RequestResult {
            caller: request.caller,
            nonce: request.nonce,
            tick,
            success,
            error,
            events,
        }
    }

    fn execute(&mut self, request: &SignedRequest, tick: Tick) -> Result<Vec<StakingEvent>, RequestError> {
        request.verify()?;

        let last = self.nonces.get(&request.caller).copied().unwrap_or(0);
        if request.nonce <= last {
            return Err(RequestError::StaleNonce {
                last,
                got: request.nonce,
            });
        }
        // A verified request consumes its nonce even if the instruction fails
        self.nonces.insert(request.caller, request.nonce);

        match &request.instruction {
            LedgerInstruction::Staking(instruction) => {
                let mut service = self.service.lock();
                staking_processor::execute(&mut *service, &request.caller, tick, instruction.clone())?;
                Ok(service.drain_events())
            }
            LedgerInstruction::Token(TokenInstruction::Approve { spender, amount }) => {
                self.token.approve(&request.caller, spender, *amount);
                Ok(vec![StakingEvent::Approved {
                    owner: request.caller,
                    spender: *spender,
                    amount: *amount,
                }])
            }
            LedgerInstruction::Token(TokenInstruction::Transfer { to, amount }) => {
                self.token.transfer(&request.caller, to, *amount)?;
                Ok(vec![StakingEvent::Transferred {
                    from: request.caller,
                    to: *to,
                    amount: *amount,
                }])
            }
        }
    }

    /// Last accepted nonce for `caller` (0 if none, so nonces start at 1)
    pub fn last_nonce(&self, caller: &Pubkey) -> u64 {
        self.nonces.get(caller).copied().unwrap_or(0)
    }

    /// Last accepted nonce of every caller seen so far
    pub fn nonces(&self) -> Vec<(Pubkey, u64)> {
        self.nonces.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            tick: self.current_tick,
            service: self.service.lock().snapshot(),
            nonces: self.nonces(),
        }
    }

    /// Resume from a persisted snapshot
    pub fn restore(&mut self, snapshot: RuntimeSnapshot) -> Result<(), RequestError> {
        self.service.lock().restore(snapshot.service)?;
        self.current_tick = snapshot.tick;
        self.nonces = snapshot.nonces.into_iter().collect();
        tracing::info!("Processor resumed at tick {}", self.current_tick);
        Ok(())
    }

    pub fn state_root(&self) -> [u8; 32] {
        self.snapshot().state_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        request::identity_of,
        token_store::TokenMetadata,
    };
    use ed25519_dalek::SigningKey;
    use staking_program::{StakingConfig, StakingError, StakingInstruction, TokenError};

    fn signer() -> SigningKey {
        SigningKey::from_bytes(&rand::random::<[u8; 32]>())
    }

    fn setup(managers: Vec<Pubkey>) -> LedgerProcessor {
        let token = TokenStore::new(
            Pubkey::new_unique(),
            TokenMetadata {
                name: "MyToken".to_string(),
                symbol: "MT".to_string(),
                decimals: 0,
            },
        );
        let pool = staking_program::pool_address(token.address());
        token.set_minter(Some(pool));
        let config = StakingConfig::new(*token.address(), managers[0], managers);
        let service = StakingService::new(config, PoolAccount::new(token.clone(), pool)).unwrap();
        LedgerProcessor::new(Arc::new(Mutex::new(service)), token)
    }

    #[test]
    fn test_stale_nonce_rejected_but_consumed_on_failure() {
        let managers: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let mut processor = setup(managers);
        let key = signer();

        // Stake without balance or allowance fails, nonce still advances
        let failing = SignedRequest::sign(
            &key,
            1,
            LedgerInstruction::Staking(StakingInstruction::Stake { amount: 5 }),
        );
        let result = processor.process_request(&failing);
        assert!(!result.success);
        assert_eq!(
            result.error,
            Some(RequestError::Staking(StakingError::Token(TokenError::InsufficientAllowance {
                approved: 0,
                required: 5,
            })))
        );
        assert_eq!(processor.last_nonce(&identity_of(&key)), 1);

        let replay = processor.process_request(&failing);
        assert_eq!(replay.error, Some(RequestError::StaleNonce { last: 1, got: 1 }));
    }

    #[test]
    fn test_token_requests_and_state_root() {
        let managers: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let mut processor = setup(managers);
        let key = signer();
        let caller = identity_of(&key);
        let recipient = Pubkey::new_unique();
        processor.token().mint(&caller, 10).unwrap();

        let root_before = processor.state_root();
        let results = processor.process_requests(&[
            SignedRequest::sign(
                &key,
                1,
                LedgerInstruction::Token(TokenInstruction::Transfer { to: recipient, amount: 4 }),
            ),
            SignedRequest::sign(
                &key,
                2,
                LedgerInstruction::Token(TokenInstruction::Approve { spender: recipient, amount: 3 }),
            ),
        ]);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(
            results[0].events,
            vec![StakingEvent::Transferred { from: caller, to: recipient, amount: 4 }]
        );
        assert_eq!(
            results[1].events,
            vec![StakingEvent::Approved { owner: caller, spender: recipient, amount: 3 }]
        );
        assert_eq!(processor.token().balance_of(&recipient), 4);
        assert_eq!(processor.token().allowance(&caller, &recipient), 3);

        // Nonces are part of the digest
        assert_ne!(processor.state_root(), root_before);
    }

    #[test]
    fn test_nonce_zero_is_never_accepted() {
        let managers: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let mut processor = setup(managers);
        let key = signer();
        let claim = |nonce| {
            SignedRequest::sign(
                &key,
                nonce,
                LedgerInstruction::Staking(StakingInstruction::Withdraw { amount: 0 }),
            )
        };

        let result = processor.process_request(&claim(0));
        assert_eq!(result.error, Some(RequestError::StaleNonce { last: 0, got: 0 }));
        assert_eq!(processor.last_nonce(&identity_of(&key)), 0);

        assert!(processor.process_request(&claim(1)).success);
        assert_eq!(processor.last_nonce(&identity_of(&key)), 1);
    }

    #[test]
    fn test_snapshot_restore_resumes_tick_and_nonces() {
        let managers: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let mut processor = setup(managers.clone());
        let key = signer();
        processor.advance_tick();
        processor.advance_tick();
        processor.process_request(&SignedRequest::sign(
            &key,
            7,
            LedgerInstruction::Staking(StakingInstruction::Withdraw { amount: 0 }),
        ));
        let snapshot = processor.snapshot();

        let mut fresh = setup(managers);
        fresh.restore(snapshot.clone()).unwrap();
        assert_eq!(fresh.current_tick(), 2);
        assert_eq!(fresh.last_nonce(&identity_of(&key)), 7);
        assert_eq!(fresh.snapshot(), snapshot);
    }
}
