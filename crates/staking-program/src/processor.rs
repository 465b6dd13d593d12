//! Staking Program Processor
//!
//! Decodes instruction bytes and dispatches them to the service.

use borsh::BorshDeserialize;
use solana_program::pubkey::Pubkey;

use crate::{
    error::StakingError, instruction::StakingInstruction, service::StakingService,
    token::TokenLedger, Tick,
};

/// Process raw instruction data from `caller` at `tick`
pub fn process<T: TokenLedger>(
    service: &mut StakingService<T>,
    caller: &Pubkey,
    tick: Tick,
    instruction_data: &[u8],
) -> Result<(), StakingError> {
    let instruction = StakingInstruction::try_from_slice(instruction_data)
        .map_err(|_| StakingError::InvalidInstructionData)?;

    execute(service, caller, tick, instruction)
}

/// Execute a decoded instruction
pub fn execute<T: TokenLedger>(
    service: &mut StakingService<T>,
    caller: &Pubkey,
    tick: Tick,
    instruction: StakingInstruction,
) -> Result<(), StakingError> {
    tracing::trace!("staking process_instruction: {:?} from {}", instruction, caller);

    match instruction {
        StakingInstruction::Stake { amount } => service.stake(caller, amount, tick),

        StakingInstruction::Withdraw { amount } => service.withdraw(caller, amount, tick).map(|_| ()),

        StakingInstruction::Confirm => service.confirm(caller),

        StakingInstruction::SetRewardRate { new_rate } => service.set_reward_rate(caller, new_rate),
    }
}
