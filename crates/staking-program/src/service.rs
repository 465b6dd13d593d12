//! Staking service
//!
//! Owns the ledger, the confirmation gate and the pool's token handle. Each
//! operation validates and plans against the ledger first, moves tokens
//! second and commits last, so a failure at any step leaves no trace.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;

use crate::{
    config::{ConfigError, StakingConfig},
    error::StakingError,
    events::StakingEvent,
    gate::ConfirmationGate,
    ledger::StakeLedger,
    state::LedgerState,
    token::{TokenError, TokenLedger},
    Amount, Tick,
};

/// Persistable service state (configuration excluded)
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub ledger: LedgerState,
    /// Managers who confirmed the open round
    pub confirmed: Vec<Pubkey>,
}

pub struct StakingService<T: TokenLedger> {
    config: StakingConfig,
    ledger: StakeLedger,
    gate: ConfirmationGate,
    token: T,
    events: Vec<StakingEvent>,
}

impl<T: TokenLedger> StakingService<T> {
    /// Create a service; the configuration is validated here
    pub fn new(config: StakingConfig, token: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let gate = ConfirmationGate::new(config.managers.iter().copied())?;
        let ledger = StakeLedger::new(config.reward_per_tick);

        tracing::info!(
            "Staking service created: {} managers, {} per tick",
            gate.required(),
            config.reward_per_tick
        );

        Ok(Self {
            config,
            ledger,
            gate,
            token,
            events: Vec::new(),
        })
    }

    /// Stake `amount` of `caller`'s tokens at `tick`
    pub fn stake(&mut self, caller: &Pubkey, amount: Amount, tick: Tick) -> Result<(), StakingError> {
        let plan = self.ledger.plan_stake(caller, amount, tick)?;

        // Token errors pass through unchanged
        self.token.transfer_from(caller, amount)?;

        let settled_reward = plan.settled_reward;
        self.ledger.commit(plan);

        tracing::info!("Staked {} for {} at tick {}", amount, caller, tick);
        self.events.push(StakingEvent::Staked {
            participant: *caller,
            amount,
            settled_reward,
            tick,
        });
        Ok(())
    }

    /// Withdraw `amount` of principal plus all unpaid reward; returns the payout
    pub fn withdraw(&mut self, caller: &Pubkey, amount: Amount, tick: Tick) -> Result<Amount, StakingError> {
        let plan = self.ledger.plan_withdraw(caller, amount, tick)?;
        let (principal, reward, payout) = (plan.principal, plan.reward, plan.payout);

        self.token
            .transfer_to(caller, payout)
            .map_err(|e| match e {
                TokenError::InsufficientBalance { .. } => StakingError::RewardUnfunded { payout },
                other => StakingError::Token(other),
            })?;

        self.ledger.commit(plan);

        tracing::info!(
            "Withdrew {} + {} reward for {} at tick {}",
            principal,
            reward,
            caller,
            tick
        );
        self.events.push(StakingEvent::Withdrawn {
            participant: *caller,
            principal,
            reward,
            payout,
            tick,
        });
        Ok(payout)
    }

    /// Confirm the pending rate change
    pub fn confirm(&mut self, caller: &Pubkey) -> Result<(), StakingError> {
        let newly_confirmed = self.gate.confirm(caller)?;
        let confirmations = self.gate.confirmation_count() as u32;
        let required = self.gate.required() as u32;

        if newly_confirmed {
            tracing::info!("Manager {} confirmed ({}/{})", caller, confirmations, required);
        } else {
            tracing::debug!("Manager {} already confirmed this round", caller);
        }
        self.events.push(StakingEvent::Confirmed {
            manager: *caller,
            confirmations,
            required,
        });
        Ok(())
    }

    /// Change the reward rate once every manager has confirmed
    pub fn set_reward_rate(&mut self, caller: &Pubkey, new_rate: Amount) -> Result<(), StakingError> {
        if !self.gate.is_manager(caller) {
            return Err(StakingError::NotAManager(*caller));
        }
        if !self.gate.is_unanimous() {
            return Err(StakingError::NotUnanimous {
                confirmed: self.gate.confirmation_count(),
                required: self.gate.required(),
            });
        }

        let previous_rate = self.ledger.reward_per_tick();
        self.ledger.set_reward_per_tick(new_rate);
        if let Err(e) = self.gate.consume_and_reset() {
            self.ledger.set_reward_per_tick(previous_rate);
            return Err(e);
        }

        tracing::info!("Reward per tick changed {} -> {} by {}", previous_rate, new_rate, caller);
        self.events.push(StakingEvent::RewardRateChanged {
            manager: *caller,
            previous_rate,
            new_rate,
        });
        Ok(())
    }

    pub fn staked_of(&self, participant: &Pubkey) -> Amount {
        self.ledger.staked_of(participant)
    }

    pub fn total_staked(&self) -> Amount {
        self.ledger.total_staked()
    }

    pub fn reward_per_tick(&self) -> Amount {
        self.ledger.reward_per_tick()
    }

    pub fn pending_reward(&self, participant: &Pubkey, tick: Tick) -> Result<Amount, StakingError> {
        self.ledger.pending_reward(participant, tick)
    }

    pub fn ledger(&self) -> &StakeLedger {
        &self.ledger
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    /// Take the events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<StakingEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            ledger: self.ledger.to_state(),
            confirmed: self.gate.confirmations().copied().collect(),
        }
    }

    /// Replace ledger and round with a persisted snapshot
    pub fn restore(&mut self, snapshot: ServiceSnapshot) -> Result<(), StakingError> {
        let ledger = StakeLedger::from_state(snapshot.ledger)?;
        let mut gate = self.gate.clone();
        gate.restore_round(snapshot.confirmed)?;

        self.ledger = ledger;
        self.gate = gate;
        tracing::info!(
            "Restored {} stake records, total staked {}",
            self.ledger.participant_count(),
            self.ledger.total_staked()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::mock::MockToken;

    struct Fixture {
        service: StakingService<MockToken>,
        managers: Vec<Pubkey>,
        staker: Pubkey,
    }

    fn fixture(can_mint: bool) -> Fixture {
        let managers: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let staker = Pubkey::new_unique();
        let mut token = MockToken::new(can_mint);
        token.fund(&staker, 100);

        let config = StakingConfig::new(Pubkey::new_unique(), managers[0], managers.clone());
        let service = StakingService::new(config, token).unwrap();
        Fixture { service, managers, staker }
    }

    #[test]
    fn test_stake_moves_tokens_into_pool() {
        let Fixture { mut service, staker, .. } = fixture(true);

        service.stake(&staker, 50, 0).unwrap();

        assert_eq!(service.staked_of(&staker), 50);
        assert_eq!(service.total_staked(), 50);
        let pool = service.token().pool;
        assert_eq!(service.token().balance_of(&pool), service.total_staked());
        assert_eq!(service.token().balance_of(&staker), 50);
    }

    #[test]
    fn test_stake_then_withdraw_five_ticks_later() {
        let Fixture { mut service, staker, .. } = fixture(true);

        service.stake(&staker, 50, 0).unwrap();
        let payout = service.withdraw(&staker, 50, 5).unwrap();

        assert_eq!(payout, 55);
        assert_eq!(service.token().balance_of(&staker), 105);
        assert_eq!(service.staked_of(&staker), 0);
    }

    #[test]
    fn test_token_error_propagates_and_ledger_untouched() {
        let Fixture { mut service, .. } = fixture(true);
        let poor = Pubkey::new_unique();

        let err = service.stake(&poor, 10, 0).unwrap_err();
        assert_eq!(
            err,
            StakingError::Token(TokenError::InsufficientAllowance { approved: 0, required: 10 })
        );
        assert_eq!(service.staked_of(&poor), 0);
        assert_eq!(service.total_staked(), 0);
        assert!(service.drain_events().is_empty());
    }

    #[test]
    fn test_short_balance_propagates_with_allowance_in_place() {
        let managers: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let staker = Pubkey::new_unique();
        let mut token = MockToken::new(true);
        token.balances.insert(staker, 5);
        token.allowances.insert(staker, 100);
        let config = StakingConfig::new(Pubkey::new_unique(), managers[0], managers);
        let mut service = StakingService::new(config, token).unwrap();
        let before = service.snapshot();

        assert_eq!(
            service.stake(&staker, 10, 0),
            Err(StakingError::Token(TokenError::InsufficientBalance { available: 5, required: 10 }))
        );
        assert_eq!(service.snapshot(), before);
        let pool = service.token().pool;
        assert_eq!(service.token().balance_of(&pool), 0);
        assert_eq!(service.token().balance_of(&staker), 5);
        assert_eq!(service.token().allowances[&staker], 100);
        assert!(service.drain_events().is_empty());
    }

    #[test]
    fn test_unfunded_reward_rolls_back_withdraw() {
        let Fixture { mut service, staker, .. } = fixture(false);

        service.stake(&staker, 50, 0).unwrap();
        let before = service.snapshot();

        assert_eq!(
            service.withdraw(&staker, 50, 5),
            Err(StakingError::RewardUnfunded { payout: 55 })
        );
        assert_eq!(service.snapshot(), before);
        assert_eq!(service.token().balance_of(&staker), 50);

        // Same-tick withdraw needs no reward and succeeds without minting
        let mut same_tick = fixture(false);
        same_tick.service.stake(&same_tick.staker, 50, 3).unwrap();
        assert_eq!(same_tick.service.withdraw(&same_tick.staker, 50, 3).unwrap(), 50);
    }

    #[test]
    fn test_over_withdraw_fails() {
        let Fixture { mut service, staker, .. } = fixture(true);
        service.stake(&staker, 50, 0).unwrap();
        service.drain_events();

        assert_eq!(
            service.withdraw(&staker, 60, 1),
            Err(StakingError::InsufficientStake { requested: 60, staked: 50 })
        );
        assert_eq!(service.staked_of(&staker), 50);
        assert_eq!(service.token().balance_of(&staker), 50);
        assert!(service.drain_events().is_empty());
    }

    #[test]
    fn test_rate_change_needs_every_manager() {
        let Fixture { mut service, managers, .. } = fixture(true);
        let new_rate = 10_000;

        service.confirm(&managers[0]).unwrap();
        assert_eq!(
            service.set_reward_rate(&managers[0], new_rate),
            Err(StakingError::NotUnanimous { confirmed: 1, required: 3 })
        );

        service.confirm(&managers[1]).unwrap();
        assert_eq!(
            service.set_reward_rate(&managers[0], new_rate),
            Err(StakingError::NotUnanimous { confirmed: 2, required: 3 })
        );

        service.confirm(&managers[2]).unwrap();
        service.set_reward_rate(&managers[0], new_rate).unwrap();
        assert_eq!(service.reward_per_tick(), new_rate);

        // Round consumed: a repeat change needs fresh unanimity
        assert_eq!(
            service.set_reward_rate(&managers[0], 1),
            Err(StakingError::NotUnanimous { confirmed: 0, required: 3 })
        );
        assert_eq!(service.reward_per_tick(), new_rate);
    }

    #[test]
    fn test_non_manager_cannot_change_rate_or_confirm() {
        let Fixture { mut service, managers, .. } = fixture(true);
        let hacker = Pubkey::new_unique();

        for m in &managers {
            service.confirm(m).unwrap();
        }
        assert_eq!(
            service.set_reward_rate(&hacker, 10_000),
            Err(StakingError::NotAManager(hacker))
        );
        assert_eq!(service.confirm(&hacker), Err(StakingError::NotAManager(hacker)));
        assert_eq!(service.gate().confirmation_count(), 3);
        assert_eq!(service.reward_per_tick(), 1);
    }

    #[test]
    fn test_zero_rate_stops_accrual() {
        let Fixture { mut service, managers, staker } = fixture(true);
        service.stake(&staker, 50, 0).unwrap();

        for m in &managers {
            service.confirm(m).unwrap();
        }
        service.set_reward_rate(&managers[1], 0).unwrap();

        assert_eq!(service.withdraw(&staker, 50, 40).unwrap(), 50);
    }

    #[test]
    fn test_events_carry_breakdown() {
        let Fixture { mut service, managers, staker } = fixture(true);

        service.stake(&staker, 20, 0).unwrap();
        service.withdraw(&staker, 20, 4).unwrap();
        service.confirm(&managers[2]).unwrap();

        let events = service.drain_events();
        assert_eq!(
            events,
            vec![
                StakingEvent::Staked { participant: staker, amount: 20, settled_reward: 0, tick: 0 },
                StakingEvent::Withdrawn { participant: staker, principal: 20, reward: 4, payout: 24, tick: 4 },
                StakingEvent::Confirmed { manager: managers[2], confirmations: 1, required: 3 },
            ]
        );
        assert!(service.drain_events().is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let Fixture { mut service, managers, staker } = fixture(true);
        service.stake(&staker, 30, 2).unwrap();
        service.confirm(&managers[1]).unwrap();
        let snapshot = service.snapshot();

        let mut fresh = StakingService::new(service.config().clone(), MockToken::new(true)).unwrap();
        fresh.restore(snapshot.clone()).unwrap();

        assert_eq!(fresh.staked_of(&staker), 30);
        assert_eq!(fresh.gate().confirmation_count(), 1);
        assert_eq!(fresh.snapshot(), snapshot);
    }

    #[test]
    fn test_rejects_small_manager_set() {
        let managers: Vec<Pubkey> = (0..2).map(|_| Pubkey::new_unique()).collect();
        let config = StakingConfig::new(Pubkey::new_unique(), managers[0], managers);
        assert!(matches!(
            StakingService::new(config, MockToken::new(true)),
            Err(ConfigError::TooFewManagers { count: 2, .. })
        ));
    }
}
