//! RPC Methods - JSON-RPC method handlers
//!
//! Amounts are rendered as decimal strings since they exceed the range
//! JSON numbers represent exactly.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ledger_runtime::{RequestSender, SharedService, SignedRequest, TokenStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;
use staking_program::{GateState, StakingError, Tick};
use std::{str::FromStr, sync::Arc};

/// RPC context shared across handlers
pub struct RpcContext {
    pub service: SharedService,
    pub token: TokenStore,
    pub request_sender: RequestSender,
    pub current_tick: Arc<RwLock<Tick>>,
    pub state_root: Arc<RwLock<[u8; 32]>>,
}

// ============ Request/Response Types ============

#[derive(Debug, Serialize, Deserialize)]
pub struct SendRequestRequest {
    pub request: String, // Base64 encoded
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequestResponse {
    pub signature: String,
    pub caller: String,
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcTickContext {
    pub tick: Tick,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfo {
    pub amount_staked: String,
    pub last_accrual_tick: Tick,
    pub accrued_reward: String,
    /// Reward owed if the participant withdrew at the current tick
    pub pending_reward: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetStakeResponse {
    pub context: RpcTickContext,
    pub value: Option<StakeInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmationsInfo {
    pub state: String,
    pub confirmed: Vec<String>,
    pub required: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickInfo {
    pub tick: Tick,
    pub state_root: String,
}

// ============ RPC Handlers ============

/// Handle sendRequest RPC method
pub fn handle_send_request(
    ctx: &RpcContext,
    params: SendRequestRequest,
) -> Result<SendRequestResponse, RpcError> {
    let bytes = BASE64
        .decode(&params.request)
        .map_err(|_| RpcError::InvalidParams("Invalid base64 encoding".to_string()))?;

    let request = SignedRequest::from_bytes(&bytes)
        .map_err(|_| RpcError::InvalidParams("Invalid request format".to_string()))?;

    // Reject forgeries before they take a queue slot
    request
        .verify()
        .map_err(|e| RpcError::InvalidParams(e.to_string()))?;

    let response = SendRequestResponse {
        signature: bs58::encode(request.signature).into_string(),
        caller: request.caller.to_string(),
        nonce: request.nonce,
    };

    ctx.request_sender
        .send(request)
        .map_err(RpcError::InternalError)?;

    Ok(response)
}

/// Handle getStake RPC method
pub fn handle_get_stake(ctx: &RpcContext, participant: &str) -> Result<GetStakeResponse, RpcError> {
    let participant = parse_pubkey(participant)?;
    let tick = *ctx.current_tick.read();

    let service = ctx.service.lock();
    let value = match service.ledger().record(&participant) {
        Some(record) => {
            let pending = service.pending_reward(&participant, tick)?;
            Some(StakeInfo {
                amount_staked: record.amount_staked.to_string(),
                last_accrual_tick: record.last_accrual_tick,
                accrued_reward: record.accrued_reward.to_string(),
                pending_reward: pending.to_string(),
            })
        }
        None => None,
    };

    Ok(GetStakeResponse {
        context: RpcTickContext { tick },
        value,
    })
}

/// Handle getTotalStaked RPC method
pub fn handle_get_total_staked(ctx: &RpcContext) -> Result<String, RpcError> {
    Ok(ctx.service.lock().total_staked().to_string())
}

/// Handle getRewardPerTick RPC method
pub fn handle_get_reward_per_tick(ctx: &RpcContext) -> Result<String, RpcError> {
    Ok(ctx.service.lock().reward_per_tick().to_string())
}

/// Handle getBalance RPC method
pub fn handle_get_balance(ctx: &RpcContext, owner: &str) -> Result<String, RpcError> {
    let owner = parse_pubkey(owner)?;
    Ok(ctx.token.balance_of(&owner).to_string())
}

/// Handle getAllowance RPC method
pub fn handle_get_allowance(ctx: &RpcContext, owner: &str, spender: &str) -> Result<String, RpcError> {
    let owner = parse_pubkey(owner)?;
    let spender = parse_pubkey(spender)?;
    Ok(ctx.token.allowance(&owner, &spender).to_string())
}

/// Handle getConfirmations RPC method
pub fn handle_get_confirmations(ctx: &RpcContext) -> Result<ConfirmationsInfo, RpcError> {
    let service = ctx.service.lock();
    let gate = service.gate();

    let state = match gate.state() {
        GateState::Open => "open",
        GateState::Unanimous => "unanimous",
    };

    let confirmed = gate.confirmations().map(|m| m.to_string()).collect();

    Ok(ConfirmationsInfo {
        state: state.to_string(),
        confirmed,
        required: gate.required(),
    })
}

/// Handle getManagers RPC method
pub fn handle_get_managers(ctx: &RpcContext) -> Result<Vec<String>, RpcError> {
    let service = ctx.service.lock();
    let managers = service.gate().managers().map(|m| m.to_string()).collect();
    Ok(managers)
}

/// Handle getTick RPC method
pub fn handle_get_tick(ctx: &RpcContext) -> Result<TickInfo, RpcError> {
    Ok(TickInfo {
        tick: *ctx.current_tick.read(),
        state_root: bs58::encode(*ctx.state_root.read()).into_string(),
    })
}

/// Handle getHealth RPC method
pub fn handle_get_health() -> Result<String, RpcError> {
    Ok("ok".to_string())
}

fn parse_pubkey(value: &str) -> Result<Pubkey, RpcError> {
    Pubkey::from_str(value).map_err(|_| RpcError::InvalidParams(format!("Invalid pubkey: {}", value)))
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error(transparent)]
    Staking(#[from] StakingError),
}
