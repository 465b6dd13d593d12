//! Reward clock

use crate::{error::StakingError, Amount, Tick};

/// Converts elapsed ticks into a reward amount.
///
/// Stateless: the rate is always supplied by the caller, so the same inputs
/// always produce the same reward.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardClock;

impl RewardClock {
    /// Reward owed for `elapsed_ticks` at `rate` per tick
    pub fn accrue(rate: Amount, elapsed_ticks: Tick) -> Result<Amount, StakingError> {
        rate.checked_mul(Amount::from(elapsed_ticks))
            .ok_or(StakingError::Overflow)
    }

    /// Ticks between a checkpoint and the current tick.
    ///
    /// The checkpoint tick itself is excluded and the current tick included.
    pub fn elapsed(checkpoint: Tick, current: Tick) -> Result<Tick, StakingError> {
        current
            .checked_sub(checkpoint)
            .ok_or(StakingError::TickRegression { checkpoint, current })
    }
}
